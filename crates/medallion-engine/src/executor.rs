//! Query execution seam.
//!
//! The engine never talks to a warehouse directly; it goes through a
//! [`QueryExecutor`]. [`BigQueryExecutor`](crate::warehouse::BigQueryExecutor)
//! is the production implementation, tests use scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::result::ErrorKind;

/// Statistics reported for a completed query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub bytes_processed: u64,
    pub bytes_billed: u64,
}

/// Column names and cell values of a query result.
///
/// Cells keep the warehouse's JSON encoding: BigQuery returns every scalar
/// as a string and NULL as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A failed query as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct QueryError {
    pub kind: ErrorKind,
    pub message: String,
}

impl QueryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Executes SQL against the warehouse.
///
/// Both methods resolve only once the remote query has reached a terminal
/// state. There is no cancellation once a query has been submitted.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a statement (DDL or DML) and return its statistics.
    async fn execute_sql(&self, sql: &str) -> Result<ExecutionStats, QueryError>;

    /// Count the rows of a fully qualified table.
    async fn count_rows(&self, table: &str) -> Result<i64, QueryError>;

    /// Run a read-only query and return its rows.
    async fn fetch_rows(&self, sql: &str) -> Result<QueryRows, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::new(ErrorKind::SyntaxError, "Unrecognized name: foo");
        assert_eq!(err.to_string(), "SYNTAX_ERROR: Unrecognized name: foo");
    }

    #[test]
    fn test_execution_stats_default() {
        let stats = ExecutionStats::default();
        assert_eq!(stats.bytes_processed, 0);
        assert_eq!(stats.bytes_billed, 0);
    }
}
