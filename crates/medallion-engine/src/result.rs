//! Per-step and per-table result types.

use serde::{Deserialize, Serialize};

use crate::executor::{ExecutionStats, QueryError, QueryRows};
use crate::step::PipelineStep;

/// Failure taxonomy reported by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    SyntaxError,
    PermissionDenied,
    NotFound,
    QuotaExceeded,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Returns true for failures that may succeed on a later attempt.
    ///
    /// Nothing in the engine retries on this; callers and schedulers can.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::QuotaExceeded | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::SyntaxError => write!(f, "SYNTAX_ERROR"),
            ErrorKind::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            ErrorKind::NotFound => write!(f, "NOT_FOUND"),
            ErrorKind::QuotaExceeded => write!(f, "QUOTA_EXCEEDED"),
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
            ErrorKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Which phase of a run a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// A transformation step failed to run. Fatal to the run.
    StepExecutionError,
    /// A post-run row count failed. Non-fatal.
    VerificationError,
    /// One or both counts of a layer comparison failed. Non-fatal.
    ComparisonError,
    /// A post-build sample query failed. Non-fatal.
    SampleQueryError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::StepExecutionError => write!(f, "STEP_EXECUTION_ERROR"),
            ErrorCategory::VerificationError => write!(f, "VERIFICATION_ERROR"),
            ErrorCategory::ComparisonError => write!(f, "COMPARISON_ERROR"),
            ErrorCategory::SampleQueryError => write!(f, "SAMPLE_QUERY_ERROR"),
        }
    }
}

/// A failure captured as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub category: ErrorCategory,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    /// Attach a phase to an executor failure.
    pub fn from_query(category: ErrorCategory, err: QueryError) -> Self {
        Self {
            category,
            kind: err.kind,
            message: err.message,
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.category, self.kind, self.message)
    }
}

/// Outcome of one attempted step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: PipelineStep,

    pub succeeded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_processed: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_billed: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,

    /// Wall-clock time spent waiting on the warehouse.
    pub duration_ms: u64,
}

impl StepResult {
    /// Create a successful result from executor statistics.
    pub fn success(step: PipelineStep, stats: ExecutionStats, duration_ms: u64) -> Self {
        Self {
            step,
            succeeded: true,
            bytes_processed: Some(stats.bytes_processed),
            bytes_billed: Some(stats.bytes_billed),
            error: None,
            duration_ms,
        }
    }

    /// Create a failed result.
    pub fn failure(step: PipelineStep, err: QueryError, duration_ms: u64) -> Self {
        Self {
            step,
            succeeded: false,
            bytes_processed: None,
            bytes_billed: None,
            error: Some(ErrorInfo::from_query(ErrorCategory::StepExecutionError, err)),
            duration_ms,
        }
    }
}

/// Row count of one verified table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEntry {
    pub table_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl VerificationEntry {
    pub fn counted(table_name: impl Into<String>, row_count: i64) -> Self {
        Self {
            table_name: table_name.into(),
            row_count: Some(row_count),
            error: None,
        }
    }

    pub fn failed(table_name: impl Into<String>, err: QueryError) -> Self {
        Self {
            table_name: table_name.into(),
            row_count: None,
            error: Some(ErrorInfo::from_query(ErrorCategory::VerificationError, err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Row counts of one table in two adjacent layers.
///
/// `delta` is `downstream_count - upstream_count`; a negative value means the
/// downstream layer holds fewer rows (filtering, dedup or an incomplete load).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub table_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_count: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_count: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ComparisonEntry {
    pub fn counted(table_name: impl Into<String>, upstream_count: i64, downstream_count: i64) -> Self {
        Self {
            table_name: table_name.into(),
            upstream_count: Some(upstream_count),
            downstream_count: Some(downstream_count),
            delta: Some(downstream_count - upstream_count),
            error: None,
        }
    }

    /// Entry for a pair where at least one count failed. Whichever count did
    /// succeed is kept for display; no delta is computed.
    pub fn failed(
        table_name: impl Into<String>,
        upstream_count: Option<i64>,
        downstream_count: Option<i64>,
        err: QueryError,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            upstream_count,
            downstream_count,
            delta: None,
            error: Some(ErrorInfo::from_query(ErrorCategory::ComparisonError, err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Rows returned by a post-build sample query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    pub name: String,

    pub title: String,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl SampleEntry {
    pub fn fetched(name: impl Into<String>, title: impl Into<String>, rows: QueryRows) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            columns: rows.columns,
            rows: rows.rows,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, title: impl Into<String>, err: QueryError) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(ErrorInfo::from_query(ErrorCategory::SampleQueryError, err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> PipelineStep {
        PipelineStep::new("02_orders", "Orders", "SELECT 1")
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::SyntaxError.to_string(), "SYNTAX_ERROR");
        assert_eq!(ErrorKind::PermissionDenied.to_string(), "PERMISSION_DENIED");
        assert_eq!(ErrorKind::QuotaExceeded.to_string(), "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_error_kind_transient() {
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::QuotaExceeded.is_transient());
        assert!(!ErrorKind::NotFound.is_transient());
    }

    #[test]
    fn test_step_result_success() {
        let stats = ExecutionStats {
            bytes_processed: 1024,
            bytes_billed: 10_485_760,
        };
        let result = StepResult::success(step(), stats, 1500);
        assert!(result.succeeded);
        assert_eq!(result.bytes_processed, Some(1024));
        assert_eq!(result.bytes_billed, Some(10_485_760));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_step_result_failure() {
        let err = QueryError::new(ErrorKind::PermissionDenied, "Access Denied");
        let result = StepResult::failure(step(), err, 20);
        assert!(!result.succeeded);
        assert!(result.bytes_processed.is_none());

        let info = result.error.unwrap();
        assert_eq!(info.category, ErrorCategory::StepExecutionError);
        assert_eq!(info.kind, ErrorKind::PermissionDenied);
        assert_eq!(info.message, "Access Denied");
    }

    #[test]
    fn test_comparison_delta_sign() {
        let shrunk = ComparisonEntry::counted("orders", 100, 80);
        assert_eq!(shrunk.delta, Some(-20));

        let grown = ComparisonEntry::counted("orders", 100, 120);
        assert_eq!(grown.delta, Some(20));
    }

    #[test]
    fn test_comparison_failed_has_no_delta() {
        let err = QueryError::new(ErrorKind::NotFound, "Not found: Table units");
        let entry = ComparisonEntry::failed("units", Some(12), None, err);
        assert!(!entry.is_ok());
        assert_eq!(entry.upstream_count, Some(12));
        assert!(entry.delta.is_none());
        assert_eq!(entry.error.unwrap().category, ErrorCategory::ComparisonError);
    }

    #[test]
    fn test_verification_entry_serialization() {
        let entry = VerificationEntry::counted("orders", 42);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"row_count\":42"));
        assert!(!json.contains("error"));

        let err = QueryError::new(ErrorKind::NotFound, "missing");
        let entry = VerificationEntry::failed("products", err);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"kind\":\"NOT_FOUND\""));
        assert!(json.contains("\"category\":\"VERIFICATION_ERROR\""));
    }

    #[test]
    fn test_sample_entry_failure_is_tagged() {
        let err = QueryError::new(ErrorKind::NotFound, "Not found: Table fact_sales");
        let entry = SampleEntry::failed("star_schema_join", "Star Schema Join Test", err);
        assert!(!entry.is_ok());
        assert!(entry.rows.is_empty());
        assert_eq!(entry.error.unwrap().category, ErrorCategory::SampleQueryError);
    }
}
