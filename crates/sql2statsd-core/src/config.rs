//! Configuration file loading.
//!
//! The configuration is a flat TOML table:
//!
//! ```toml
//! statsd_hostname = "localhost"
//! statsd_port = 8125
//! dsn = "host=db.internal dbname=app"
//! user = "monitor"
//! pass = "secret"
//! query_csv_file = "queries.csv"
//! sleep = 60
//! ```
//!
//! It is resolved once at startup into an immutable [`Config`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default statsd port when `statsd_port` is absent or zero.
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Default polling interval in seconds when `sleep` is absent.
pub const DEFAULT_SLEEP_SECS: u64 = 60;

/// Directory (relative to the installation base) holding statement files.
const SQL_DIR: &str = "sql";

/// Errors raised while reading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required config key `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Configuration as it appears on disk; every key is optional here and
/// checked in [`Config::from_raw`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    statsd_hostname: Option<String>,
    statsd_port: Option<u16>,
    dsn: Option<String>,
    user: Option<String>,
    pass: Option<String>,
    query_csv_file: Option<PathBuf>,
    sleep: Option<u64>,
    connect_timeout: Option<u64>,
    statement_timeout: Option<u64>,
    send_timeout: Option<u64>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub statsd_hostname: String,
    pub statsd_port: u16,
    /// Database connection descriptor.
    pub dsn: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Statement set path as written in the file (see [`Config::query_file_path`]).
    pub query_csv_file: PathBuf,
    /// Seconds between cycles, before any command-line override.
    pub sleep: u64,
    /// Bound on establishing the database connection.
    pub connect_timeout: Option<Duration>,
    /// Server-side bound on each statement.
    pub statement_timeout: Option<Duration>,
    /// Bound on a single datagram send to statsd.
    pub send_timeout: Option<Duration>,
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let statsd_hostname = required(raw.statsd_hostname, "statsd_hostname")?;
        let dsn = required(raw.dsn, "dsn")?;
        let query_csv_file = raw
            .query_csv_file
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::Missing("query_csv_file"))?;

        // 0 is treated like an absent port.
        let statsd_port = match raw.statsd_port {
            Some(port) if port != 0 => port,
            _ => DEFAULT_STATSD_PORT,
        };

        // A zero `sleep` is only an error if nothing overrides it; see
        // `options::resolve_interval`.
        let sleep = raw.sleep.unwrap_or(DEFAULT_SLEEP_SECS);

        Ok(Self {
            statsd_hostname,
            statsd_port,
            dsn,
            user: raw.user.filter(|u| !u.is_empty()),
            pass: raw.pass.filter(|p| !p.is_empty()),
            query_csv_file,
            sleep,
            connect_timeout: timeout(raw.connect_timeout, "connect_timeout")?,
            statement_timeout: timeout(raw.statement_timeout, "statement_timeout")?,
            send_timeout: timeout(raw.send_timeout, "send_timeout")?,
        })
    }

    /// Returns the statement set path.
    ///
    /// Relative paths are resolved against `<base_dir>/sql/`, where `base_dir`
    /// is the installation directory (usually the directory of the executable).
    pub fn query_file_path(&self, base_dir: &Path) -> PathBuf {
        if self.query_csv_file.is_absolute() {
            self.query_csv_file.clone()
        } else {
            base_dir.join(SQL_DIR).join(&self.query_csv_file)
        }
    }

    /// Returns `host:port` of the statsd collector.
    pub fn statsd_address(&self) -> String {
        format!("{}:{}", self.statsd_hostname, self.statsd_port)
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn timeout(secs: Option<u64>, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match secs {
        Some(0) => Err(ConfigError::Invalid {
            key,
            reason: "timeout must be positive; omit the key to disable it".to_string(),
        }),
        Some(s) => Ok(Some(Duration::from_secs(s))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        statsd_hostname = "stats.local"
        dsn = "host=localhost dbname=app"
        query_csv_file = "queries.csv"
    "#;

    #[test]
    fn defaults_applied_for_minimal_config() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.statsd_port, DEFAULT_STATSD_PORT);
        assert_eq!(config.sleep, DEFAULT_SLEEP_SECS);
        assert_eq!(config.user, None);
        assert_eq!(config.connect_timeout, None);
        assert_eq!(config.statsd_address(), "stats.local:8125");
    }

    #[test]
    fn zero_port_falls_back_to_default() {
        let content = format!("{MINIMAL}\nstatsd_port = 0\n");
        let config = Config::from_toml_str(&content).unwrap();
        assert_eq!(config.statsd_port, 8125);
    }

    #[test]
    fn explicit_values_are_kept() {
        let content = format!(
            "{MINIMAL}\nstatsd_port = 9125\nuser = \"monitor\"\npass = \"pw\"\nsleep = 15\nstatement_timeout = 30\n"
        );
        let config = Config::from_toml_str(&content).unwrap();
        assert_eq!(config.statsd_port, 9125);
        assert_eq!(config.user.as_deref(), Some("monitor"));
        assert_eq!(config.pass.as_deref(), Some("pw"));
        assert_eq!(config.sleep, 15);
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_required_keys_are_reported() {
        let err = Config::from_toml_str("dsn = \"x\"\nquery_csv_file = \"q.csv\"").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("statsd_hostname")));

        let err = Config::from_toml_str("statsd_hostname = \"h\"\nquery_csv_file = \"q.csv\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("dsn")));

        let err = Config::from_toml_str("statsd_hostname = \"h\"\ndsn = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("query_csv_file")));
    }

    #[test]
    fn zero_sleep_is_left_to_interval_resolution() {
        let content = format!("{MINIMAL}\nsleep = 0\n");
        let config = Config::from_toml_str(&content).unwrap();
        assert_eq!(config.sleep, 0);
    }

    #[test]
    fn unknown_key_is_a_parse_error() {
        let content = format!("{MINIMAL}\nstatsd_host = \"typo\"\n");
        assert!(matches!(
            Config::from_toml_str(&content),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn relative_query_file_resolves_under_sql_dir() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(
            config.query_file_path(Path::new("/opt/sql2statsd")),
            PathBuf::from("/opt/sql2statsd/sql/queries.csv")
        );
    }

    #[test]
    fn absolute_query_file_is_used_as_is() {
        let content = MINIMAL.replace("\"queries.csv\"", "\"/etc/sql2statsd/q.csv\"");
        let config = Config::from_toml_str(&content).unwrap();
        assert_eq!(
            config.query_file_path(Path::new("/opt/sql2statsd")),
            PathBuf::from("/etc/sql2statsd/q.csv")
        );
    }

    #[test]
    fn load_reads_file_and_reports_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.statsd_hostname, "stats.local");

        let err = Config::load("/nonexistent/sql2statsd.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
