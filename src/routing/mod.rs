//! Path matching and the middleware dispatch engine.
//!
//! | Type | Role |
//! |------|------|
//! | [`Layer`] | One stack entry: a compiled path pattern plus a handler |
//! | [`Route`] | A fixed path with a handler chain per HTTP method |
//! | [`Router`] | An ordered stack of layers, walked once per request |
//!
//! Handlers steer dispatch by returning [`Next`]; errors are carried forward
//! to the next handler registered through [`error_handler`].

/// Generates the per-method registration helpers.
///
/// `route` expands to `fn get(&self, handlers)` style helpers on [`Route`];
/// `path` expands to `fn get(&self, path, handlers) -> Result<&Self>` helpers
/// forwarding to the type's own `register`.
macro_rules! method_helpers {
    (route) => {
        $crate::routing::method_helpers!(@route
            get => GET, post => POST, put => PUT, delete => DELETE, patch => PATCH,
            head => HEAD, options => OPTIONS, trace => TRACE, connect => CONNECT
        );
    };
    (path) => {
        $crate::routing::method_helpers!(@path
            get => GET, post => POST, put => PUT, delete => DELETE, patch => PATCH,
            head => HEAD, options => OPTIONS, trace => TRACE, connect => CONNECT
        );
    };
    (@route $($name:ident => $method:ident),*) => {
        $(
            #[doc = concat!("Handlers for `", stringify!($method), "` requests.")]
            pub fn $name(&self, handlers: impl $crate::IntoHandlers) -> &Self {
                self.register(Some(::http::Method::$method), handlers)
            }
        )*
    };
    (@path $($name:ident => $method:ident),*) => {
        $(
            #[doc = concat!("Registers a route answering `", stringify!($method), "` requests on `path`.")]
            pub fn $name(
                &self,
                path: &str,
                handlers: impl $crate::IntoHandlers,
            ) -> $crate::Result<&Self> {
                self.register(::http::Method::$method, path, handlers)
            }
        )*
    };
}
pub(crate) use method_helpers;

mod handler;
mod layer;
mod params;
mod path;
mod route;
mod router;

pub use handler::*;
pub use layer::*;
pub use params::*;
pub use path::*;
pub use route::*;
pub use router::*;
