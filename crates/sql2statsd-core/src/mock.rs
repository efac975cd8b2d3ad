//! In-memory collaborators for exercising the poll engine without a database
//! server or a statsd daemon.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::db::{Connection, Database, DbError, ResultRow};
use crate::metric::Metric;
use crate::sink::{MetricsSink, SinkError};
use crate::statements::{Statement, StatementSource, StatementSourceError};

/// Fixed statement set that counts how often it was loaded.
#[derive(Debug, Default)]
pub struct StaticStatements {
    statements: Vec<Statement>,
    loads: Cell<usize>,
}

impl StaticStatements {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            loads: Cell::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.get()
    }
}

impl StatementSource for StaticStatements {
    fn load(&self) -> Result<Vec<Statement>, StatementSourceError> {
        self.loads.set(self.loads.get() + 1);
        Ok(self.statements.clone())
    }
}

/// Database answering statements from a table of canned results.
///
/// Statements without a canned result fail with [`DbError::Query`].
/// Every executed statement is recorded in order.
#[derive(Debug, Default)]
pub struct MockDatabase {
    results: Rc<HashMap<String, Result<Vec<ResultRow>, DbError>>>,
    executed: Rc<RefCell<Vec<String>>>,
    connects: Cell<usize>,
    refuse_connections: bool,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the rows returned for `sql`.
    pub fn with_rows(mut self, sql: &str, rows: Vec<ResultRow>) -> Self {
        Rc::make_mut(&mut self.results).insert(sql.to_string(), Ok(rows));
        self
    }

    /// Registers a failure for `sql`.
    pub fn with_error(mut self, sql: &str, message: &str) -> Self {
        Rc::make_mut(&mut self.results)
            .insert(sql.to_string(), Err(DbError::Query(message.to_string())));
        self
    }

    /// Makes every `connect` fail.
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    /// Statements executed so far, across all connections.
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.get()
    }
}

impl Database for MockDatabase {
    type Conn = MockConnection;

    fn connect(&self) -> Result<MockConnection, DbError> {
        if self.refuse_connections {
            return Err(DbError::Connection("connection refused".to_string()));
        }
        self.connects.set(self.connects.get() + 1);
        Ok(MockConnection {
            results: Rc::clone(&self.results),
            executed: Rc::clone(&self.executed),
        })
    }
}

/// Connection handed out by [`MockDatabase`].
#[derive(Debug)]
pub struct MockConnection {
    results: Rc<HashMap<String, Result<Vec<ResultRow>, DbError>>>,
    executed: Rc<RefCell<Vec<String>>>,
}

impl Connection for MockConnection {
    fn server_version(&mut self) -> Result<String, DbError> {
        Ok("16.0 (mock)".to_string())
    }

    fn query(&mut self, sql: &str) -> Result<Vec<ResultRow>, DbError> {
        self.executed.borrow_mut().push(sql.to_string());
        match self.results.get(sql) {
            Some(result) => result.clone(),
            None => Err(DbError::Query(format!("relation for '{sql}' does not exist"))),
        }
    }
}

/// Sink that records every gauge it receives.
///
/// Values that do not parse as numbers are rejected like the statsd client
/// rejects them.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: RefCell<Vec<Metric>>,
    broken: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail with an I/O error.
    pub fn broken() -> Self {
        Self {
            sent: RefCell::default(),
            broken: true,
        }
    }

    pub fn sent(&self) -> Vec<Metric> {
        self.sent.borrow().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn gauge(&self, name: &str, value: &str) -> Result<(), SinkError> {
        if self.broken {
            return Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "sink unreachable",
            )));
        }
        if value.trim().parse::<f64>().is_err() {
            return Err(SinkError::InvalidMetric {
                name: name.to_string(),
                value: value.to_string(),
                reason: "value is not a finite number",
            });
        }
        self.sent.borrow_mut().push(Metric::new(name, value));
        Ok(())
    }
}
