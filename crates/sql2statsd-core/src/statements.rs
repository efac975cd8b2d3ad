//! Statement set loading.
//!
//! A statement set is a `;`-separated text file with two columns per line:
//! an identifier and the SQL to run.
//!
//! ```text
//! name;sql
//! queue_depth;SELECT 'queue.depth' AS name, count(*) AS value FROM jobs
//! # lines starting with '#' are ignored
//! "lag";"SELECT 'repl.lag' AS name, 0 AS value; -- quoted, may contain ;"
//! ```
//!
//! A first line whose first cell is `name` (any case) is a header and dropped.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use csv::{ReaderBuilder, Trim};
use thiserror::Error;
use tracing::debug;

/// One entry of the statement set.
///
/// The identifier is only used for tracing; statements with an empty
/// identifier or empty SQL are skipped by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub id: String,
    pub sql: String,
}

impl Statement {
    pub fn new(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
        }
    }

    /// Returns true if both the identifier and the SQL are present.
    pub fn is_runnable(&self) -> bool {
        !self.id.is_empty() && !self.sql.is_empty()
    }
}

/// Errors raised while loading a statement set.
#[derive(Debug, Error)]
pub enum StatementSourceError {
    #[error("cannot open statement file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed statement file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Anything that can hand out an ordered statement set.
pub trait StatementSource {
    fn load(&self) -> Result<Vec<Statement>, StatementSourceError>;
}

impl<T: StatementSource + ?Sized> StatementSource for &T {
    fn load(&self) -> Result<Vec<Statement>, StatementSourceError> {
        (**self).load()
    }
}

/// Statement set backed by a file on disk, re-read on every [`load`](StatementSource::load).
#[derive(Debug, Clone)]
pub struct CsvStatementFile {
    path: PathBuf,
}

impl CsvStatementFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StatementSource for CsvStatementFile {
    fn load(&self) -> Result<Vec<Statement>, StatementSourceError> {
        let file = File::open(&self.path).map_err(|source| StatementSourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        let statements =
            parse_statements(file).map_err(|source| StatementSourceError::Parse {
                path: self.path.clone(),
                source,
            })?;
        debug!(
            path = %self.path.display(),
            count = statements.len(),
            "statement set loaded"
        );
        Ok(statements)
    }
}

/// Parses a statement set from any reader.
pub fn parse_statements<R: Read>(reader: R) -> Result<Vec<Statement>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut statements = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let id = record.get(0).unwrap_or_default();
        if idx == 0 && id.eq_ignore_ascii_case("name") {
            continue;
        }
        let sql = record.get(1).unwrap_or_default();
        statements.push(Statement::new(id, sql));
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(content: &str) -> Vec<Statement> {
        parse_statements(content.as_bytes()).unwrap()
    }

    #[test]
    fn header_row_is_dropped() {
        let statements = parse("name;sql\nget_count;SELECT 1\n");
        assert_eq!(statements, vec![Statement::new("get_count", "SELECT 1")]);
    }

    #[test]
    fn header_detection_ignores_case() {
        let statements = parse("NAME;SQL\nget_count;SELECT 1\n");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn first_row_kept_without_header() {
        let statements = parse("get_count;SELECT 1\nother;SELECT 2\n");
        assert_eq!(
            statements,
            vec![
                Statement::new("get_count", "SELECT 1"),
                Statement::new("other", "SELECT 2"),
            ]
        );
    }

    #[test]
    fn only_first_row_can_be_header() {
        let statements = parse("a;SELECT 1\nname;SELECT 2\n");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].id, "name");
    }

    #[test]
    fn order_and_duplicates_preserved() {
        let statements = parse("b;SELECT 2\na;SELECT 1\nb;SELECT 2\n");
        let ids: Vec<&str> = statements.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "b"]);
    }

    #[test]
    fn quoted_sql_may_contain_delimiter() {
        let statements = parse("lag;\"SELECT 'a;b' AS name, 1 AS value\"\n");
        assert_eq!(statements[0].sql, "SELECT 'a;b' AS name, 1 AS value");
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let statements = parse("# comment\n\nq1;SELECT 1\n");
        assert_eq!(statements, vec![Statement::new("q1", "SELECT 1")]);
    }

    #[test]
    fn short_rows_yield_unrunnable_statements() {
        let statements = parse("lonely\n;SELECT 1\n");
        assert_eq!(statements.len(), 2);
        assert!(!statements[0].is_runnable());
        assert!(!statements[1].is_runnable());
    }

    #[test]
    fn fields_are_trimmed() {
        let statements = parse("  q1 ;  SELECT 1  \n");
        assert_eq!(statements[0], Statement::new("q1", "SELECT 1"));
    }

    #[test]
    fn file_source_reloads_on_each_call() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "q1;SELECT 1").unwrap();
        file.flush().unwrap();

        let source = CsvStatementFile::new(file.path());
        assert_eq!(source.load().unwrap().len(), 1);

        writeln!(file, "q2;SELECT 2").unwrap();
        file.flush().unwrap();
        assert_eq!(source.load().unwrap().len(), 2);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let source = CsvStatementFile::new("/nonexistent/queries.csv");
        assert!(matches!(
            source.load(),
            Err(StatementSourceError::Open { .. })
        ));
    }
}
