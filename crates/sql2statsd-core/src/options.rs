//! Per-process run options.

use std::time::Duration;

use crate::config::ConfigError;

/// Interval used when `--every` is passed without a value.
pub const EVERY_DEFAULT_SECS: u64 = 5;

/// Options that shape how the poll engine behaves.
///
/// Built once at startup from the command line and the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Verbose tracing of statements, rows and sends (log level DEBUG).
    pub debug: bool,
    /// Skip delivery to the sink; tracing still happens.
    pub no_send: bool,
    /// Run a single cycle and stop.
    pub once: bool,
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            debug: false,
            no_send: false,
            once: false,
            interval: Duration::from_secs(crate::config::DEFAULT_SLEEP_SECS),
        }
    }
}

/// Picks the polling interval: the command-line override wins over the
/// configuration's `sleep` value. The resulting interval must be positive.
pub fn resolve_interval(
    cli_every: Option<u64>,
    config_sleep: u64,
) -> Result<Duration, ConfigError> {
    match cli_every.unwrap_or(config_sleep) {
        0 => Err(ConfigError::Invalid {
            key: "sleep",
            reason: "polling interval must be a positive number of seconds".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
