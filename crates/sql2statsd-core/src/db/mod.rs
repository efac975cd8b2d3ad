//! Database gateway.
//!
//! The engine talks to the database through two small traits: a [`Database`]
//! hands out a fresh [`Connection`] per cycle, and a connection runs one
//! statement at a time and returns its rows in server order.
//!
//! Rows are driver-independent [`ResultRow`]s whose values are kept as the
//! text the server sent, so they can be forwarded without coercion.

mod pg;

pub use self::pg::{PostgresDatabase, format_postgres_error, normalize_dsn};

use std::fmt;

use thiserror::Error;

/// Error type for database access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Server unreachable, credentials rejected, or liveness check failed.
    #[error("database connection failed: {0}")]
    Connection(String),
    /// A single statement failed to execute.
    #[error("query failed: {0}")]
    Query(String),
}

/// One row of a result set: ordered `(column, value)` pairs.
///
/// `None` stands for SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRow {
    columns: Vec<(String, Option<String>)>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column, builder style.
    pub fn with(mut self, column: impl Into<String>, value: Option<&str>) -> Self {
        self.push(column, value.map(str::to_string));
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: Option<String>) {
        self.columns.push((column.into(), value));
    }

    /// Returns the non-NULL value of `column` (case-sensitive lookup).
    ///
    /// If the column appears more than once, the first occurrence wins.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (name, value)) in self.columns().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            match value {
                Some(v) => write!(f, "{name}: {v:?}")?,
                None => write!(f, "{name}: NULL")?,
            }
        }
        f.write_str("}")
    }
}

/// An open database session used for the duration of one cycle.
pub trait Connection {
    /// Returns the server version; doubles as a liveness check.
    fn server_version(&mut self) -> Result<String, DbError>;

    /// Runs one statement and returns every row it produced, in order.
    fn query(&mut self, sql: &str) -> Result<Vec<ResultRow>, DbError>;
}

/// Factory for connections.
pub trait Database {
    type Conn: Connection;

    fn connect(&self) -> Result<Self::Conn, DbError>;
}

impl<T: Database + ?Sized> Database for &T {
    type Conn = T::Conn;

    fn connect(&self) -> Result<T::Conn, DbError> {
        (**self).connect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_skips_null_and_is_case_sensitive() {
        let row = ResultRow::new()
            .with("name", Some("queue.depth"))
            .with("value", None);
        assert_eq!(row.get("name"), Some("queue.depth"));
        assert_eq!(row.get("value"), None);
        assert_eq!(row.get("Name"), None);
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn display_lists_all_columns() {
        let row = ResultRow::new()
            .with("host", Some("db1"))
            .with("lag", None);
        assert_eq!(row.to_string(), "{host: \"db1\", lag: NULL}");
    }
}
