//! Poll engine.
//!
//! One cycle loads the statement set, opens a database connection, runs every
//! statement in file order and forwards each eligible row to the metrics sink
//! as a gauge. Cycles repeat with a fixed pause between the end of one cycle
//! and the start of the next.
//!
//! ## Failure handling
//!
//! | failure | effect |
//! |---|---|
//! | statement set unreadable | cycle aborted, error returned |
//! | connection or liveness check | cycle aborted, error returned |
//! | single statement fails | logged with its identifier, next statement runs |
//! | row without `name`/`value` | skipped, traced in debug mode |
//! | metric rejected by the sink | logged, row skipped |
//! | sink I/O failure | cycle aborted, error returned |

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::db::{Connection, Database, ResultRow};
use crate::error::CycleError;
use crate::metric::Metric;
use crate::options::RunOptions;
use crate::sink::{MetricsSink, SinkError};
use crate::statements::StatementSource;

/// Granularity of shutdown checks while sleeping between cycles.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Counters for a single cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Statements executed successfully.
    pub statements_run: usize,
    /// Statements without identifier or SQL.
    pub statements_skipped: usize,
    /// Statements whose execution failed.
    pub statements_failed: usize,
    pub metrics_sent: usize,
    /// Metrics traced but not sent because of `no_send`.
    pub metrics_suppressed: usize,
    /// Rows without a usable `name`/`value` pair.
    pub rows_skipped: usize,
    /// Rows the sink refused as malformed.
    pub rows_rejected: usize,
    pub elapsed: Duration,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} statements ({} failed, {} skipped), {} metrics sent",
            self.statements_run + self.statements_failed,
            self.statements_failed,
            self.statements_skipped,
            self.metrics_sent
        )?;
        if self.metrics_suppressed > 0 {
            write!(f, ", {} suppressed", self.metrics_suppressed)?;
        }
        if self.rows_skipped > 0 || self.rows_rejected > 0 {
            write!(
                f,
                ", {} rows skipped, {} rejected",
                self.rows_skipped, self.rows_rejected
            )?;
        }
        write!(f, " in {:.3}s", self.elapsed.as_secs_f64())
    }
}

/// Drives the fetch, execute, extract and emit loop.
pub struct PollEngine<S, D, K> {
    source: S,
    database: D,
    sink: K,
    options: RunOptions,
    running: Arc<AtomicBool>,
}

impl<S, D, K> PollEngine<S, D, K>
where
    S: StatementSource,
    D: Database,
    K: MetricsSink,
{
    /// Creates an engine from its three collaborators.
    ///
    /// # Arguments
    /// * `source` - Statement set, reloaded every cycle
    /// * `database` - Connection factory, one connection per cycle
    /// * `sink` - Destination for gauges
    /// * `options` - Run mode and interval
    pub fn new(source: S, database: D, sink: K, options: RunOptions) -> Self {
        Self {
            source,
            database,
            sink,
            options,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Uses an externally owned running flag; clearing it stops
    /// [`run_forever`](Self::run_forever) before the next cycle.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Runs one cycle: load statements, connect, execute all, emit metrics.
    ///
    /// The connection is dropped when the cycle ends, successful or not.
    pub fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let statements = self.source.load()?;
        let mut conn = self.database.connect()?;
        let version = conn.server_version()?;
        if self.options.debug {
            debug!(version = %version, "connected to database");
        }

        for statement in &statements {
            if !statement.is_runnable() {
                report.statements_skipped += 1;
                continue;
            }

            if self.options.debug {
                debug!("Executing {}: {}", statement.id, statement.sql);
            }

            let rows = match conn.query(&statement.sql) {
                Ok(rows) => rows,
                Err(e) => {
                    error!(statement = %statement.id, error = %e, "statement failed");
                    report.statements_failed += 1;
                    continue;
                }
            };
            report.statements_run += 1;

            for row in &rows {
                self.emit_row(&statement.id, row, &mut report)?;
            }
        }

        drop(conn);
        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Turns one row into a gauge, or skips it.
    fn emit_row(
        &self,
        statement_id: &str,
        row: &ResultRow,
        report: &mut CycleReport,
    ) -> Result<(), CycleError> {
        let Some(metric) = Metric::from_row(row) else {
            if self.options.debug {
                debug!("Row without name/value in {}: {}", statement_id, row);
            }
            report.rows_skipped += 1;
            return Ok(());
        };

        if self.options.debug {
            debug!("Sending: name {}, value: {}", metric.name, metric.value);
        }
        if self.options.no_send {
            report.metrics_suppressed += 1;
            return Ok(());
        }

        match self.sink.gauge(&metric.name, &metric.value) {
            Ok(()) => report.metrics_sent += 1,
            Err(e @ SinkError::InvalidMetric { .. }) => {
                warn!(statement = %statement_id, error = %e, "metric rejected");
                report.rows_rejected += 1;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Runs cycles until `once` is satisfied, the running flag is cleared, or
    /// a cycle fails.
    ///
    /// Returns the number of completed cycles. The interval is measured from
    /// the end of one cycle; there is no wall-clock alignment.
    pub fn run_forever(&self) -> Result<u64, CycleError> {
        let mut cycles: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            let report = self.run_cycle()?;
            cycles += 1;
            info!("Cycle #{}: {}", cycles, report);

            if self.options.once {
                break;
            }
            self.sleep(self.options.interval);
        }

        Ok(cycles)
    }

    /// Sleeps in short slices so a cleared running flag is noticed quickly.
    fn sleep(&self, interval: Duration) {
        let mut remaining = interval;
        while remaining > Duration::ZERO && self.running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(SLEEP_SLICE);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }
}
