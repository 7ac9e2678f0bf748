//! Post-run row-count verification.

use std::sync::Arc;

use crate::executor::QueryExecutor;
use crate::result::VerificationEntry;

/// Counts rows of a list of tables.
///
/// Best-effort: a failed count is recorded on its entry and the next table
/// is still checked. Output order always matches input order.
pub struct VerificationReporter {
    executor: Arc<dyn QueryExecutor>,
}

impl VerificationReporter {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    pub async fn verify<S: AsRef<str>>(&self, table_names: &[S]) -> Vec<VerificationEntry> {
        let mut entries = Vec::with_capacity(table_names.len());

        for table in table_names {
            let table = table.as_ref();
            let entry = match self.executor.count_rows(table).await {
                Ok(count) => {
                    tracing::debug!(table = %table, row_count = count, "Table verified");
                    VerificationEntry::counted(table, count)
                }
                Err(err) => {
                    tracing::warn!(table = %table, kind = %err.kind, error = %err.message, "Verification failed");
                    VerificationEntry::failed(table, err)
                }
            };
            entries.push(entry);
        }

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::QueryError;
    use crate::result::ErrorKind;
    use crate::warehouse::ScriptedExecutor;

    #[tokio::test]
    async fn test_verify_missing_table_does_not_stop() {
        let executor = ScriptedExecutor::new()
            .with_count("orders", 42)
            .fail_count("products", QueryError::new(ErrorKind::NotFound, "Not found: Table products"))
            .with_count("units", 7);
        let reporter = VerificationReporter::new(Arc::new(executor));

        let entries = reporter.verify(&["orders", "products", "units"]).await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], VerificationEntry::counted("orders", 42));
        assert_eq!(entries[1].table_name, "products");
        assert_eq!(entries[1].row_count, None);
        assert_eq!(entries[1].error.as_ref().unwrap().kind, ErrorKind::NotFound);
        assert_eq!(entries[2].row_count, Some(7));
    }

    #[tokio::test]
    async fn test_verify_preserves_input_order() {
        let executor = ScriptedExecutor::new()
            .with_count("a", 1)
            .with_count("b", 2)
            .with_count("c", 3)
            .with_count("d", 4);
        let reporter = VerificationReporter::new(Arc::new(executor));

        let input = ["c", "a", "d", "b"];
        let entries = reporter.verify(&input).await;
        let names: Vec<&str> = entries.iter().map(|e| e.table_name.as_str()).collect();
        assert_eq!(names, input);
        assert_eq!(entries[0].row_count, Some(3));
        assert_eq!(entries[3].row_count, Some(2));
    }

    #[tokio::test]
    async fn test_verify_empty_input() {
        let reporter = VerificationReporter::new(Arc::new(ScriptedExecutor::new()));
        let entries = reporter.verify::<&str>(&[]).await;
        assert!(entries.is_empty());
    }
}
