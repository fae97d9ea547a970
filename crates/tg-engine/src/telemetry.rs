//! Logging bootstrap.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingConfig};
use crate::{EngineError, EngineResult};

/// Build the filter: `RUST_LOG` when set, otherwise the configured level.
///
/// # Errors
/// Returns [`EngineError::Logging`] if the configured directive is invalid.
pub fn env_filter(config: &LoggingConfig) -> EngineResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EngineError::Logging(format!("invalid filter '{}': {e}", config.level)))
}

/// Install the global subscriber. Logs go to stderr.
///
/// # Errors
/// Returns [`EngineError::Logging`] if the filter is invalid or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> EngineResult<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Plain => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    result.map_err(|e| EngineError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directive_rejected() {
        let config = LoggingConfig {
            level: "trustgate=loud".into(),
            format: LogFormat::Plain,
        };
        // RUST_LOG may be set by the harness; only assert when it is not.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(env_filter(&config), Err(EngineError::Logging(_))));
        }
    }

    #[test]
    fn valid_directive_accepted() {
        let config = LoggingConfig {
            level: "info,trustgate::audit=warn".into(),
            format: LogFormat::Json,
        };
        assert!(env_filter(&config).is_ok());
    }
}
