//! Errors that end a poll cycle.

use thiserror::Error;

use crate::db::DbError;
use crate::sink::SinkError;
use crate::statements::StatementSourceError;

/// A failure that aborts the current cycle and, through
/// [`PollEngine::run_forever`](crate::PollEngine::run_forever), the process.
///
/// Failures of individual statements and rows never surface here; they are
/// logged and counted in the cycle report instead.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    StatementSource(#[from] StatementSourceError),
    #[error(transparent)]
    Connection(#[from] DbError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
