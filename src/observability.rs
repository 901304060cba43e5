//! Logging setup
//!
//! Settings come from environment variables:
//! - `RUST_LOG`: filter directives (default: `info`)
//! - `DOC_MAPPER_LOG_JSON`: `true`/`1` for JSON lines

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        LoggingConfig {
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            json: std::env::var("DOC_MAPPER_LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber; returns false if one was already set
pub fn init_tracing(json: bool) -> bool {
    let config = LoggingConfig {
        json,
        ..LoggingConfig::from_env()
    };
    init_with(&config)
}

pub fn init_with(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(config.env_filter());
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
