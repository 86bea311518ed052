//! Structured logging setup on top of `tracing-subscriber`.
//!
//! Filter precedence, highest first: the `ASSETFLOW_LOG` environment
//! variable, then the configured level plus per-module overrides.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Environment variable that overrides the configured filter.
pub const LOG_ENV_VAR: &str = "ASSETFLOW_LOG";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off.
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Colored output (text format only).
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Module-specific levels, e.g. `{"assetflow::retry": "debug"}`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            ansi: true,
            modules: HashMap::new(),
        }
    }
}

/// Installs the global tracing subscriber.
///
/// Fails if a subscriber is already installed or a directive does not parse.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = build_env_filter(config, std::env::var(LOG_ENV_VAR).ok().as_deref())?;

    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_target(true)
            .with_ansi(config.ansi)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    Registry::default()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Builds the filter from an optional override string and the config.
pub fn build_env_filter(
    config: &LoggingConfig,
    env_override: Option<&str>,
) -> Result<EnvFilter, ConfigError> {
    if let Some(directives) = env_override.filter(|s| !s.trim().is_empty()) {
        return EnvFilter::try_new(directives)
            .map_err(|e| ConfigError::Logging(format!("Invalid {LOG_ENV_VAR} value: {e}")));
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| ConfigError::Logging(format!("Invalid log level '{}': {e}", config.level)))?;

    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        let directive = format!("{module}={level}");
        let parsed = directive.parse().map_err(|e| {
            ConfigError::Logging(format!("Invalid log directive '{directive}': {e}"))
        })?;
        filter = filter.add_directive(parsed);
    }

    Ok(filter)
}
