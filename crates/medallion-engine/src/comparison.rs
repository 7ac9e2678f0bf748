//! Layer-to-layer row-count comparison.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::executor::{QueryError, QueryExecutor};
use crate::result::ComparisonEntry;

/// One table counted in two layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonPair {
    /// Display name, usually the unqualified table name.
    pub table_name: String,
    /// Fully qualified upstream table (e.g. the bronze copy).
    pub upstream: String,
    /// Fully qualified downstream table (e.g. the silver copy).
    pub downstream: String,
}

impl ComparisonPair {
    pub fn new(
        table_name: impl Into<String>,
        upstream: impl Into<String>,
        downstream: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            upstream: upstream.into(),
            downstream: downstream.into(),
        }
    }
}

/// Computes signed row-count deltas between layers.
///
/// Same best-effort policy as verification: a failed pair is recorded and
/// the remaining pairs are still compared.
pub struct ComparisonReporter {
    executor: Arc<dyn QueryExecutor>,
}

impl ComparisonReporter {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    pub async fn compare(&self, pairs: &[ComparisonPair]) -> Vec<ComparisonEntry> {
        let mut entries = Vec::with_capacity(pairs.len());

        for pair in pairs {
            // Both sides are counted even if the first fails, so the entry
            // shows whatever could be measured.
            let upstream = self.executor.count_rows(&pair.upstream).await;
            let downstream = self.executor.count_rows(&pair.downstream).await;

            let entry = match (upstream, downstream) {
                (Ok(up), Ok(down)) => {
                    tracing::debug!(
                        table = %pair.table_name,
                        upstream = up,
                        downstream = down,
                        delta = down - up,
                        "Layers compared"
                    );
                    ComparisonEntry::counted(&pair.table_name, up, down)
                }
                (up, down) => {
                    let up_count = up.as_ref().ok().copied();
                    let down_count = down.as_ref().ok().copied();
                    let err = combine_errors(up.err(), down.err());
                    tracing::warn!(
                        table = %pair.table_name,
                        kind = %err.kind,
                        error = %err.message,
                        "Comparison failed"
                    );
                    ComparisonEntry::failed(&pair.table_name, up_count, down_count, err)
                }
            };
            entries.push(entry);
        }

        entries
    }
}

fn combine_errors(upstream: Option<QueryError>, downstream: Option<QueryError>) -> QueryError {
    match (upstream, downstream) {
        (Some(up), Some(down)) => QueryError::new(
            up.kind,
            format!("upstream: {}; downstream: {}", up.message, down.message),
        ),
        (Some(up), None) => QueryError::new(up.kind, format!("upstream: {}", up.message)),
        (None, Some(down)) => QueryError::new(down.kind, format!("downstream: {}", down.message)),
        // Only reached when both sides succeeded, which the caller handles.
        (None, None) => QueryError::new(crate::result::ErrorKind::Unknown, "comparison failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{ErrorCategory, ErrorKind};
    use crate::warehouse::ScriptedExecutor;

    fn pair(name: &str) -> ComparisonPair {
        ComparisonPair::new(
            name,
            format!("p.bronze.{}", name),
            format!("p.silver.{}", name),
        )
    }

    #[tokio::test]
    async fn test_compare_signed_delta() {
        let executor = ScriptedExecutor::new()
            .with_count("p.bronze.orders", 100)
            .with_count("p.silver.orders", 80)
            .with_count("p.bronze.units", 100)
            .with_count("p.silver.units", 120);
        let reporter = ComparisonReporter::new(Arc::new(executor));

        let entries = reporter.compare(&[pair("orders"), pair("units")]).await;
        assert_eq!(entries[0].delta, Some(-20));
        assert_eq!(entries[1].delta, Some(20));
        assert_eq!(entries[1].upstream_count, Some(100));
        assert_eq!(entries[1].downstream_count, Some(120));
    }

    #[tokio::test]
    async fn test_compare_failed_pair_continues() {
        let executor = ScriptedExecutor::new()
            .with_count("p.bronze.orders", 10)
            .fail_count(
                "p.silver.orders",
                QueryError::new(ErrorKind::NotFound, "Not found: Table p:silver.orders"),
            )
            .with_count("p.bronze.products", 5)
            .with_count("p.silver.products", 5);
        let reporter = ComparisonReporter::new(Arc::new(executor));

        let entries = reporter.compare(&[pair("orders"), pair("products")]).await;
        assert_eq!(entries.len(), 2);

        let failed = &entries[0];
        assert_eq!(failed.upstream_count, Some(10));
        assert_eq!(failed.downstream_count, None);
        assert_eq!(failed.delta, None);
        let info = failed.error.as_ref().unwrap();
        assert_eq!(info.category, ErrorCategory::ComparisonError);
        assert_eq!(info.kind, ErrorKind::NotFound);
        assert!(info.message.starts_with("downstream:"));

        assert_eq!(entries[1].delta, Some(0));
    }

    #[tokio::test]
    async fn test_compare_both_sides_fail() {
        let executor = ScriptedExecutor::new()
            .fail_count("p.bronze.units", QueryError::new(ErrorKind::PermissionDenied, "denied"))
            .fail_count("p.silver.units", QueryError::new(ErrorKind::NotFound, "missing"));
        let reporter = ComparisonReporter::new(Arc::new(executor));

        let entries = reporter.compare(&[pair("units")]).await;
        let info = entries[0].error.as_ref().unwrap();
        assert_eq!(info.kind, ErrorKind::PermissionDenied);
        assert_eq!(info.message, "upstream: denied; downstream: missing");
    }
}
