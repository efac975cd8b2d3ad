//! Metric extraction from result rows.

use crate::db::ResultRow;

/// Column holding the metric name.
pub const NAME_COLUMN: &str = "name";
/// Column holding the metric value.
pub const VALUE_COLUMN: &str = "value";

/// A gauge sample ready for the sink.
///
/// The value is kept as the text the database returned; numeric checks are
/// left to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub name: String,
    pub value: String,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Builds a metric from a row that exposes non-empty `name` and `value`
    /// columns. Extra columns are ignored; anything else yields `None`.
    pub fn from_row(row: &ResultRow) -> Option<Self> {
        let name = row.get(NAME_COLUMN).filter(|n| !n.is_empty())?;
        let value = row.get(VALUE_COLUMN).filter(|v| !v.is_empty())?;
        Some(Self::new(name, value))
    }
}
