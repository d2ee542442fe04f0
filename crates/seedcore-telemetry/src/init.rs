use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default logging target when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit human-readable, pretty-printed logs.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build: pretty in debug
    /// builds, JSON in release, matching every other binary in the
    /// workspace.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Logging configuration shared by `seedcore-app` and the integration
/// tests in `seedcore-testkit`.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level string (e.g. `info`, `debug`), overridden by `RUST_LOG`
    /// when set.
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
        }
    }
}

/// Install the global tracing subscriber. Safe to call more than once per
/// process (subsequent calls are no-ops) since tests across the workspace
/// each want logging available without fighting over a single subscriber
/// slot.
///
/// # Errors
///
/// Returns an error only if the underlying subscriber registry reports a
/// configuration failure; a subscriber already being installed is treated
/// as success.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level));
    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false).with_thread_ids(false))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .try_init(),
    };
    match result {
        Ok(()) => Ok(()),
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(err) => Err(anyhow!("failed to install tracing subscriber: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_picks_a_format_without_panicking() {
        let _ = LogFormat::infer();
    }

    #[test]
    fn init_logging_does_not_error_when_called_repeatedly() {
        let config = LoggingConfig {
            level: "info",
            format: LogFormat::Pretty,
        };
        init_logging(&config).expect("first install should succeed or already be installed");
        init_logging(&config).expect("second install should be treated as already installed");
    }
}
