//! In-memory executor with scripted outcomes, for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::executor::{ExecutionStats, QueryError, QueryExecutor, QueryRows};
use crate::result::ErrorKind;

/// Executor whose responses are configured up front.
///
/// Statements match rules by substring, first rule wins. Tables without a
/// configured count report `NOT_FOUND`, like a table that was never built.
/// Row queries with no matching rule return an empty result.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    sql_failures: Vec<(String, QueryError)>,
    sql_stats: Vec<(String, ExecutionStats)>,
    counts: HashMap<String, Result<i64, QueryError>>,
    default_count: Option<i64>,
    row_results: Vec<(String, Result<QueryRows, QueryError>)>,
    executed: Mutex<Vec<String>>,
    counted: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any statement containing `fragment`.
    pub fn fail_sql(mut self, fragment: impl Into<String>, err: QueryError) -> Self {
        self.sql_failures.push((fragment.into(), err));
        self
    }

    /// Report `stats` for any statement containing `fragment`.
    pub fn with_stats(mut self, fragment: impl Into<String>, stats: ExecutionStats) -> Self {
        self.sql_stats.push((fragment.into(), stats));
        self
    }

    pub fn with_count(mut self, table: impl Into<String>, count: i64) -> Self {
        self.counts.insert(table.into(), Ok(count));
        self
    }

    pub fn fail_count(mut self, table: impl Into<String>, err: QueryError) -> Self {
        self.counts.insert(table.into(), Err(err));
        self
    }

    /// Count returned for tables with no explicit rule.
    pub fn with_default_count(mut self, count: i64) -> Self {
        self.default_count = Some(count);
        self
    }

    /// Return `rows` for any row query containing `fragment`.
    pub fn with_rows(mut self, fragment: impl Into<String>, rows: QueryRows) -> Self {
        self.row_results.push((fragment.into(), Ok(rows)));
        self
    }

    pub fn fail_rows(mut self, fragment: impl Into<String>, err: QueryError) -> Self {
        self.row_results.push((fragment.into(), Err(err)));
        self
    }

    /// Statements submitted so far, in submission order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Row queries submitted so far, in submission order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Tables counted so far, in request order.
    pub fn counted(&self) -> Vec<String> {
        self.counted.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute_sql(&self, sql: &str) -> Result<ExecutionStats, QueryError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        if let Some((_, err)) = self.sql_failures.iter().find(|(f, _)| sql.contains(f.as_str())) {
            return Err(err.clone());
        }

        Ok(self
            .sql_stats
            .iter()
            .find(|(f, _)| sql.contains(f.as_str()))
            .map(|(_, stats)| *stats)
            .unwrap_or_default())
    }

    async fn count_rows(&self, table: &str) -> Result<i64, QueryError> {
        if let Ok(mut counted) = self.counted.lock() {
            counted.push(table.to_string());
        }

        match self.counts.get(table) {
            Some(outcome) => outcome.clone(),
            None => self.default_count.ok_or_else(|| {
                QueryError::new(ErrorKind::NotFound, format!("Not found: Table {}", table))
            }),
        }
    }

    async fn fetch_rows(&self, sql: &str) -> Result<QueryRows, QueryError> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(sql.to_string());
        }

        self.row_results
            .iter()
            .find(|(f, _)| sql.contains(f.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| Ok(QueryRows::default()))
    }
}
