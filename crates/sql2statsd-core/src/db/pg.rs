//! PostgreSQL gateway on top of the synchronous `postgres` client.
//!
//! Statements run over the simple query protocol, so every column value comes
//! back as text (or `NULL`) regardless of its SQL type. That keeps the gateway
//! free of per-type decoding and lets `numeric`, `bigint` and `float8` values
//! reach statsd exactly as the server rendered them.

use std::time::Duration;

use postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::debug;

use super::{Connection, Database, DbError, ResultRow};

/// Prefix of Perl DBI style descriptors, e.g. `dbi:Pg:dbname=app;host=db`.
const DBI_PG_PREFIX: &str = "dbi:pg:";

/// Opens a fresh PostgreSQL connection on every [`connect`](Database::connect).
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    config: Config,
    statement_timeout: Option<Duration>,
}

impl PostgresDatabase {
    /// Builds the gateway from a connection descriptor and optional credentials.
    ///
    /// `dsn` may be a libpq `key=value` string, a `postgres://` URL, or a DBI
    /// descriptor. `user` and `pass`, when given, override the descriptor.
    pub fn new(dsn: &str, user: Option<&str>, pass: Option<&str>) -> Result<Self, DbError> {
        let normalized = normalize_dsn(dsn)?;
        let mut config: Config = normalized
            .parse()
            .map_err(|e: postgres::Error| DbError::Connection(format!("invalid dsn: {e}")))?;

        if let Some(user) = user {
            config.user(user);
        }
        if let Some(pass) = pass {
            config.password(pass);
        }

        Ok(Self {
            config,
            statement_timeout: None,
        })
    }

    /// Bounds the time spent establishing a connection.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let Some(timeout) = timeout {
            self.config.connect_timeout(timeout);
        }
        self
    }

    /// Sets `statement_timeout` on every new session.
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

impl Database for PostgresDatabase {
    type Conn = PostgresConnection;

    fn connect(&self) -> Result<PostgresConnection, DbError> {
        let mut client = self
            .config
            .connect(NoTls)
            .map_err(|e| DbError::Connection(format_postgres_error(&e)))?;

        if let Some(timeout) = self.statement_timeout {
            client
                .batch_execute(&format!(
                    "SET statement_timeout = {}",
                    timeout.as_millis()
                ))
                .map_err(|e| DbError::Connection(format_postgres_error(&e)))?;
        }

        debug!(
            host = ?self.config.get_hosts(),
            user = ?self.config.get_user(),
            "database connection established"
        );

        Ok(PostgresConnection { client })
    }
}

/// Session handed out by [`PostgresDatabase`]; closed when dropped.
pub struct PostgresConnection {
    client: Client,
}

impl Connection for PostgresConnection {
    fn server_version(&mut self) -> Result<String, DbError> {
        self.client
            .query_one("SHOW server_version", &[])
            .and_then(|row| row.try_get::<_, String>(0))
            .map_err(|e| DbError::Connection(format_postgres_error(&e)))
    }

    fn query(&mut self, sql: &str) -> Result<Vec<ResultRow>, DbError> {
        let messages = self
            .client
            .simple_query(sql)
            .map_err(|e| DbError::Query(format_postgres_error(&e)))?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut result = ResultRow::new();
                for (idx, column) in row.columns().iter().enumerate() {
                    result.push(column.name(), row.get(idx).map(str::to_string));
                }
                rows.push(result);
            }
        }
        Ok(rows)
    }
}

/// Converts a DBI style descriptor (`dbi:Pg:dbname=app;host=db`) into a libpq
/// `key=value` string. Other descriptors are returned unchanged.
pub fn normalize_dsn(dsn: &str) -> Result<String, DbError> {
    let dsn = dsn.trim();
    if !dsn
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("dbi:"))
    {
        return Ok(dsn.to_string());
    }

    let Some(params) = dsn
        .get(..DBI_PG_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(DBI_PG_PREFIX))
        .map(|_| &dsn[DBI_PG_PREFIX.len()..])
    else {
        return Err(DbError::Connection(format!(
            "unsupported DBI driver in dsn '{dsn}'"
        )));
    };

    // DBI uses `database`/`db` as aliases for libpq's `dbname`.
    let parts: Vec<String> = params
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some(("database" | "db", value)) => format!("dbname={}", value.trim()),
            Some((key, value)) => format!("{}={}", key.trim(), value.trim()),
            None => part.to_string(),
        })
        .collect();

    Ok(parts.join(" "))
}

/// Formats PostgreSQL error message for display.
pub fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}
