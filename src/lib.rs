//! # axum-relay
//!
//! An Express-style routing and middleware kernel for Rust, served through
//! Axum and Tokio and configured through simple TOML.
//!
//! Handlers are async functions over cheap request/response handles. They
//! steer dispatch by returning a [`Next`] value instead of calling a
//! continuation, so the whole middleware chain is plain `async` code.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum_relay::{Application, Config, Next, Request, Response, Result, handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load();  // config/{RUST_ENV}.toml, or defaults
//!     config.setup_tracing();
//!
//!     let app = Application::from_config(&config)?;
//!     app.middleware("/", |req: Request, _res: Response| async move {
//!         tracing::info!(method = %req.method(), url = %req.url(), "request");
//!         Next::Continue
//!     })?;
//!     app.get("/users/:id", handler(|req: Request, res: Response| async move {
//!         res.json(&serde_json::json!({ "id": req.param("id") }))
//!     }))?;
//!
//!     app.listen(&config.http).await
//! }
//! ```
//!
//! With `config/dev.toml`:
//! ```toml
//! [http]
//! bind_port = 3000
//!
//! [settings]
//! "trust proxy" = "loopback"
//! ```
//!
//! Run with `RUST_ENV=dev cargo run`.
//!
//! # Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | `application` | [`Application`], settings, views, finalizer and serving |
//! | `routing` | [`Layer`], [`Route`], [`Router`] and the handler contracts |
//! | `context` | [`Request`] and [`Response`] handles |
//! | `config` | Configuration loading and validation ([`Config`]) |
//! | `error` | Error types and handling ([`Error`]) |
//!
//! # Dispatch
//!
//! | Handler returns | Effect |
//! |-----------------|--------|
//! | `Next::Continue` | run the next matching layer |
//! | `Next::Route` | skip the rest of the current route |
//! | `Next::Router` | leave the current router |
//! | `Next::Done` or `()` | the request was handled |
//! | `Err(e)` or a panic | skip to the next error handler |
//!
//! # Error Handling
//!
//! The library uses a custom [`Result`] type. Errors nobody handles are
//! turned into structured JSON responses:
//!
//! ```json
//! {
//!   "error_code": "HANDLER_ERROR",
//!   "message": "database unavailable"
//! }
//! ```
mod application;
mod config;
mod context;
mod error;
mod routing;
mod utils;

pub use application::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use routing::*;
pub use utils::{decode_param, encode_url, replace_handlebars_with_env, split_path_query};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests;
