//! sql2statsd - SQL to statsd gauge bridge.
//!
//! Periodically runs a set of SQL statements against PostgreSQL and sends
//! every `name`/`value` row of their results to statsd as a gauge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use sql2statsd_core::db::PostgresDatabase;
use sql2statsd_core::options::resolve_interval;
use sql2statsd_core::sink::StatsdClient;
use sql2statsd_core::statements::CsvStatementFile;
use sql2statsd_core::{Config, ConfigError, PollEngine, RunOptions};

/// SQL to statsd gauge bridge.
#[derive(Debug, Parser)]
#[command(name = "sql2statsd", about = "Send SQL query results to statsd as gauges", version)]
struct Args {
    /// Path to the TOML configuration file.
    config: PathBuf,

    /// Trace statements, rows and metric sends.
    #[arg(long)]
    debug: bool,

    /// Do not send metrics to statsd (still traced with --debug).
    #[arg(long = "no_send_metric")]
    no_send_metric: bool,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between cycles; overrides `sleep` from the configuration.
    /// Without a value, 5 seconds. Put the config path first or use
    /// `--every=N`, otherwise a following path is read as the value.
    #[arg(
        long,
        value_name = "SECONDS",
        num_args = 0..=1,
        default_missing_value = EVERY_DEFAULT_SECS_STR,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    every: Option<u64>,
}

const EVERY_DEFAULT_SECS_STR: &str = "5";

/// Initializes the tracing subscriber.
/// Default level is INFO; `--debug` switches to DEBUG.
fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };

    let mut filter = EnvFilter::from_default_env();
    for target in ["sql2statsd", "sql2statsd_core"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Combines command-line flags with the configuration.
fn run_options(args: &Args, config: &Config) -> Result<RunOptions, ConfigError> {
    Ok(RunOptions {
        debug: args.debug,
        no_send: args.no_send_metric,
        once: args.once,
        interval: resolve_interval(args.every, config.sleep)?,
    })
}

/// Directory the statement file path is resolved against.
fn install_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() {
    let args = Args::parse();

    init_logging(args.debug);

    info!("sql2statsd {} starting", env!("CARGO_PKG_VERSION"));

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Config {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    let options = match run_options(&args, &config) {
        Ok(options) => options,
        Err(e) => {
            error!("Config {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    let query_file = config.query_file_path(&install_dir());

    info!(
        "Config: statsd={}, statements={}, interval={}s, once={}, send={}",
        config.statsd_address(),
        query_file.display(),
        options.interval.as_secs(),
        options.once,
        !options.no_send
    );

    let database = match PostgresDatabase::new(
        &config.dsn,
        config.user.as_deref(),
        config.pass.as_deref(),
    ) {
        Ok(db) => db
            .with_connect_timeout(config.connect_timeout)
            .with_statement_timeout(config.statement_timeout),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let sink = match StatsdClient::new(
        &config.statsd_hostname,
        config.statsd_port,
        config.send_timeout,
    ) {
        Ok(sink) => sink,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // Setup graceful shutdown (SIGINT, plus SIGTERM/SIGHUP via the `termination` feature)
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let engine = PollEngine::new(CsvStatementFile::new(query_file), database, sink, options)
        .with_running_flag(running);

    match engine.run_forever() {
        Ok(cycles) => info!("Stopped after {} cycles", cycles),
        Err(e) => {
            error!("Cycle failed: {}", e);
            std::process::exit(1);
        }
    }
}
