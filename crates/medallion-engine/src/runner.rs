//! Single-step execution.

use std::sync::Arc;
use std::time::Instant;

use crate::executor::QueryExecutor;
use crate::result::StepResult;
use crate::step::PipelineStep;

/// Runs one step and folds its outcome into a [`StepResult`].
///
/// Executor failures never escape as `Err`; they become a failed result so
/// the orchestrator can apply one uniform stop rule.
pub struct StepRunner {
    executor: Arc<dyn QueryExecutor>,
}

impl StepRunner {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    pub async fn run(&self, step: &PipelineStep) -> StepResult {
        tracing::info!(step = %step.name, description = %step.description, "Executing step");

        let start = Instant::now();
        let outcome = self.executor.execute_sql(&step.sql).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(stats) => {
                tracing::info!(
                    step = %step.name,
                    bytes_processed = stats.bytes_processed,
                    bytes_billed = stats.bytes_billed,
                    duration_ms,
                    "Step completed"
                );
                StepResult::success(step.clone(), stats, duration_ms)
            }
            Err(err) => {
                tracing::error!(
                    step = %step.name,
                    kind = %err.kind,
                    error = %err.message,
                    duration_ms,
                    "Step failed"
                );
                StepResult::failure(step.clone(), err, duration_ms)
            }
        }
    }
}

impl std::fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionStats, QueryError};
    use crate::result::{ErrorCategory, ErrorKind};
    use crate::warehouse::ScriptedExecutor;

    #[tokio::test]
    async fn test_run_success_records_stats() {
        let executor = ScriptedExecutor::new().with_stats(
            "CREATE OR REPLACE TABLE",
            ExecutionStats {
                bytes_processed: 2048,
                bytes_billed: 10_485_760,
            },
        );
        let runner = StepRunner::new(Arc::new(executor));
        let step = PipelineStep::new("02_orders", "Orders", "CREATE OR REPLACE TABLE x AS SELECT 1");

        let result = runner.run(&step).await;
        assert!(result.succeeded);
        assert_eq!(result.bytes_processed, Some(2048));
        assert_eq!(result.bytes_billed, Some(10_485_760));
        assert_eq!(result.step, step);
    }

    #[tokio::test]
    async fn test_run_ddl_defaults_to_zero_bytes() {
        let runner = StepRunner::new(Arc::new(ScriptedExecutor::new()));
        let step = PipelineStep::new("01_schema", "Schema", "CREATE SCHEMA IF NOT EXISTS silver");

        let result = runner.run(&step).await;
        assert!(result.succeeded);
        assert_eq!(result.bytes_processed, Some(0));
        assert_eq!(result.bytes_billed, Some(0));
    }

    #[tokio::test]
    async fn test_run_failure_is_data() {
        let executor = ScriptedExecutor::new().fail_sql(
            "orders",
            QueryError::new(ErrorKind::SyntaxError, "Syntax error: Unexpected end of script"),
        );
        let runner = StepRunner::new(Arc::new(executor));
        let step = PipelineStep::new("02_orders", "Orders", "SELECT * FROM orders WHERE");

        let result = runner.run(&step).await;
        assert!(!result.succeeded);
        assert!(result.bytes_processed.is_none());

        let info = result.error.unwrap();
        assert_eq!(info.category, ErrorCategory::StepExecutionError);
        assert_eq!(info.kind, ErrorKind::SyntaxError);
    }
}
