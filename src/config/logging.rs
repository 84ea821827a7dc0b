use {
    crate::{Error, Result},
    serde::Deserialize,
    tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*},
};

/// Output of the tracing subscriber installed by [`Config::setup_tracing`](crate::Config::setup_tracing).
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Line format: `default` (full, human-readable), `json`, `compact` or `pretty`.
    #[serde(default)]
    pub format: LogFormat,

    /// Filter directive used when `RUST_LOG` is not set, e.g. `"info,axum_relay=debug"`.
    #[serde(default = "LoggingConfig::default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: Self::default_filter(),
        }
    }
}

impl LoggingConfig {
    fn default_filter() -> String {
        "info".into()
    }

    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.filter)
            .map(|_| ())
            .map_err(|e| Error::config(format!("invalid logging filter '{}': {e}", self.filter)))
    }

    /// `RUST_LOG` when present, else the configured filter.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = tracing_subscriber::fmt::layer();
        match self.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Default => layer.boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
        }
    }

    /// Installs the global subscriber. Returns false if one was already set.
    pub(crate) fn install(&self) -> bool {
        tracing_subscriber::registry()
            .with(self.fmt_layer())
            .with(self.env_filter())
            .try_init()
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Default,
    Compact,
    Pretty,
}
