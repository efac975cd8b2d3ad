//! sql2statsd-core — polling bridge from SQL result sets to statsd gauges.
//!
//! Provides:
//! - `config` — TOML configuration file and its validation
//! - `options` — per-process run options (debug, no-send, once, interval)
//! - `statements` — `;`-separated statement set loader
//! - `db` — database gateway abstraction and the PostgreSQL implementation
//! - `sink` — metrics sink abstraction and the statsd UDP client
//! - `metric` — name/value extraction from result rows
//! - `engine` — the poll loop tying everything together
//! - `mock` — in-memory collaborators for tests

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod metric;
pub mod mock;
pub mod options;
pub mod sink;
pub mod statements;

pub use config::{Config, ConfigError};
pub use engine::{CycleReport, PollEngine};
pub use error::CycleError;
pub use metric::Metric;
pub use options::RunOptions;
