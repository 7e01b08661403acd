//! Logging initialisation and format selection.
//!
//! # Design
//! - A single entry point installs the global subscriber on stderr so that
//!   command output on stdout stays machine-consumable.
//! - `RUST_LOG` wins over the configured level when present.
//! - The plain format prints bare messages; the verbose format adds time,
//!   level and target for debugging sessions.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Default logging level when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Level used when debugging output is requested.
pub const DEBUG_LOG_LEVEL: &str = "debug";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level string (e.g., `info`, `debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::Plain,
        }
    }
}

impl LoggingConfig<'_> {
    /// Select level and format from the debug toggle.
    #[must_use]
    pub const fn for_verbosity(debug: bool) -> Self {
        if debug {
            Self {
                level: DEBUG_LOG_LEVEL,
                format: LogFormat::Verbose,
            }
        } else {
            Self {
                level: DEFAULT_LOG_LEVEL,
                format: LogFormat::Plain,
            }
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Bare messages, one per line.
    Plain,
    /// Timestamped lines carrying level and target.
    Verbose,
}

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed (for example,
/// because another subscriber has already been set globally).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_env_filter(config.level);
    let installed = match config.format {
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .without_time()
                    .with_level(false)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Verbose => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init(),
    };
    installed.map_err(|source| TelemetryError::SubscriberInstall { source })
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
