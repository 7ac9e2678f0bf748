//! Pipeline orchestration.
//!
//! Runs steps strictly in order and stops at the first failure. Only a
//! fully successful build moves on to the diagnostic phase (verification
//! and layer comparison), which is best-effort and never stops early.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::comparison::{ComparisonPair, ComparisonReporter};
use crate::executor::QueryExecutor;
use crate::report::{RunReport, RunState};
use crate::result::{ComparisonEntry, SampleEntry, VerificationEntry};
use crate::runner::StepRunner;
use crate::sample::{SampleQuery, SampleReporter};
use crate::step::PipelineStep;
use crate::verification::VerificationReporter;

/// Diagnostics to run after a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRunChecks {
    /// Fully qualified tables to count, in display order.
    #[serde(default)]
    pub verify_tables: Vec<String>,

    /// Upstream/downstream pairs to compare. Empty for pipelines that have
    /// no layer-to-layer correspondence.
    #[serde(default)]
    pub comparisons: Vec<ComparisonPair>,

    /// Read-only queries whose rows are shown after the counts.
    #[serde(default)]
    pub samples: Vec<SampleQuery>,
}

/// Everything the diagnostic phase produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResults {
    pub verification: Vec<VerificationEntry>,
    pub comparison: Vec<ComparisonEntry>,
    pub samples: Vec<SampleEntry>,
}

impl CheckResults {
    /// True when no entry carries an error.
    pub fn all_ok(&self) -> bool {
        self.verification.iter().all(|e| e.is_ok())
            && self.comparison.iter().all(|e| e.is_ok())
            && self.samples.iter().all(|e| e.is_ok())
    }
}

/// Sequences pipeline steps and assembles the run report.
pub struct PipelineOrchestrator {
    name: String,
    runner: StepRunner,
    verifier: VerificationReporter,
    comparer: ComparisonReporter,
    sampler: SampleReporter,
    checks: PostRunChecks,
}

impl PipelineOrchestrator {
    pub fn new(name: impl Into<String>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            name: name.into(),
            runner: StepRunner::new(Arc::clone(&executor)),
            verifier: VerificationReporter::new(Arc::clone(&executor)),
            comparer: ComparisonReporter::new(Arc::clone(&executor)),
            sampler: SampleReporter::new(executor),
            checks: PostRunChecks::default(),
        }
    }

    pub fn with_checks(mut self, checks: PostRunChecks) -> Self {
        self.checks = checks;
        self
    }

    /// Run `steps` in order.
    ///
    /// Every call builds a fresh report; nothing is carried between
    /// invocations.
    pub async fn execute(&self, steps: &[PipelineStep]) -> RunReport {
        let mut report = RunReport::new(&self.name, steps.len());
        report.state = RunState::Running;

        tracing::info!(pipeline = %self.name, steps = steps.len(), "Starting pipeline");

        for step in steps {
            let result = self.runner.run(step).await;
            let succeeded = result.succeeded;
            report.steps.push(result);

            if !succeeded {
                break;
            }
        }

        report.all_succeeded = report.steps.len() == steps.len()
            && report.steps.iter().all(|r| r.succeeded);

        if report.all_succeeded {
            let checks = self.run_checks().await;
            report.verification = Some(checks.verification);
            report.comparison = Some(checks.comparison);
            report.samples = Some(checks.samples);
            report.state = RunState::Succeeded;

            tracing::info!(
                pipeline = %self.name,
                bytes_processed = report.total_bytes_processed(),
                bytes_billed = report.total_bytes_billed(),
                "Pipeline succeeded"
            );
        } else {
            report.state = RunState::Failed;

            tracing::error!(
                pipeline = %self.name,
                failed_step = report.failed_step().map(|r| r.step.name.as_str()).unwrap_or(""),
                unsuccessful = report.unsuccessful_step_count(),
                "Pipeline failed"
            );
        }

        report.finished_at = Some(Utc::now());
        report
    }

    /// Run only the diagnostic phase against whatever tables exist now.
    pub async fn run_checks(&self) -> CheckResults {
        CheckResults {
            verification: self.verifier.verify(&self.checks.verify_tables).await,
            comparison: self.comparer.compare(&self.checks.comparisons).await,
            samples: self.sampler.run(&self.checks.samples).await,
        }
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("name", &self.name)
            .field("checks", &self.checks)
            .finish_non_exhaustive()
    }
}
