//!
//! Configuration for building and serving an application.
//!
//! A `Config` comes from TOML, either a string (`Config::from_toml`, or
//! `str::parse`), a file (`Config::from_path`), or the file for the current
//! environment, `config/{RUST_ENV}.toml` (`Config::from_rust_env`). It can
//! also be built in code with the `with_*` methods.
//!
//! TOML sources may reference environment variables as `{{ VAR_NAME }}`;
//! they are substituted before parsing, so secrets never have to live in
//! the files themselves.
//!
//! | Section | Type | Used by |
//! |---------|------|---------|
//! | `env` | `Option<String>` | the application's `env` setting |
//! | `[http]` | `HttpConfig` | `Application::listen` |
//! | `[routing]` | `RouterOptions` | the application's root router |
//! | `[settings]` | TOML table | `Application::set`, one call per key |
//! | `[logging]` | `LoggingConfig` | `Config::setup_tracing` |
//!
mod http;
mod logging;
mod routing;

pub use http::*;
pub use logging::*;
pub use routing::*;

use {
    crate::{Error, Result, utils::replace_handlebars_with_env},
    serde::Deserialize,
    std::{env, fs, path::Path, str::FromStr, time::Duration},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Application environment (`development`, `production`, `test`, ...).
    /// Falls back to the `RUST_ENV` the file was selected with.
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub routing: RouterOptions,
    /// Application settings keyed by setting name (`"trust proxy"`, `"etag"`, ...).
    #[serde(default)]
    pub settings: toml::Table,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    ///
    /// Loads `config/{RUST_ENV}.toml`, or returns the built-in defaults when
    /// `RUST_ENV` is unset or the file cannot be loaded.
    ///
    pub fn load() -> Self {
        Self::from_rust_env().unwrap_or_default()
    }

    /// Loads `config/{RUST_ENV}.toml`. Fails when `RUST_ENV` is not set.
    pub fn from_rust_env() -> Result<Config> {
        let rust_env = env::var("RUST_ENV")?;
        let mut config = Self::from_toml_file(&rust_env)?;
        config.env.get_or_insert(rust_env);
        Ok(config)
    }

    ///
    /// Loads `config/{env}.toml` relative to the working directory,
    /// e.g. `config/production.toml`.
    ///
    pub fn from_toml_file(env: impl AsRef<str>) -> Result<Config> {
        Self::from_path(format!("config/{}.toml", env.as_ref()))
    }

    /// Loads a TOML file, substituting `{{ VAR }}` placeholders.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot read {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        text.parse()
    }

    pub fn from_toml(toml_str: &str) -> Result<Config> {
        toml_str.parse()
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_bind_addr<S: AsRef<str>>(mut self, addr: S) -> Self {
        self.http.bind_addr = addr.as_ref().into();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.http.bind_port = port;
        self
    }

    /// How long in-flight requests may run once shutdown starts.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.http.shutdown_timeout = timeout;
        self
    }

    pub fn with_router_options(mut self, options: RouterOptions) -> Self {
        self.routing = options;
        self
    }

    /// Adds an application setting, applied by `Application::from_config`.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.logging.format = format;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.logging.filter = filter.into();
        self
    }

    /// Checks every section. Setting values are only checked for shape here;
    /// `Application::from_config` rejects values a key does not accept.
    pub fn validate(&self) -> Result<()> {
        self.http.validate()?;
        self.logging.validate()?;
        match self.settings.iter().find(|(_, value)| value.is_datetime()) {
            Some((key, _)) => Err(Error::config(format!(
                "setting '{key}' cannot be a TOML datetime"
            ))),
            None => Ok(()),
        }
    }

    ///
    /// Installs the global tracing subscriber described by `[logging]`.
    ///
    /// Call this before building the application so registration is logged.
    /// Later calls, or calls after another subscriber was installed, do nothing.
    ///
    pub fn setup_tracing(&self) {
        if !self.logging.install() {
            tracing::debug!("tracing subscriber already installed");
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(&replace_handlebars_with_env(s))?)
    }
}
