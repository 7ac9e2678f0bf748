//! Medallion Engine
//!
//! Builds a layered (bronze, silver, gold) BigQuery warehouse by running
//! ordered SQL steps.
//!
//! This crate provides:
//! - Pipeline orchestration with fail-fast step sequencing
//! - Best-effort post-run verification, layer-to-layer comparison and
//!   sample queries
//! - A `QueryExecutor` seam with a BigQuery REST implementation
//! - Project configuration, SQL templating and the built-in pipeline catalog

pub mod auth;
pub mod catalog;
pub mod comparison;
pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod report;
pub mod result;
pub mod runner;
pub mod sample;
pub mod step;
pub mod template;
pub mod verification;
pub mod warehouse;

pub use catalog::{PipelineSpec, PIPELINES};
pub use comparison::{ComparisonPair, ComparisonReporter};
pub use config::{Layer, ProjectConfig, ResolvedConfig};
pub use error::EngineError;
pub use executor::{ExecutionStats, QueryError, QueryExecutor, QueryRows};
pub use orchestrator::{CheckResults, PipelineOrchestrator, PostRunChecks};
pub use report::{RunReport, RunState};
pub use result::{
    ComparisonEntry, ErrorCategory, ErrorInfo, ErrorKind, SampleEntry, StepResult,
    VerificationEntry,
};
pub use runner::StepRunner;
pub use sample::{SampleQuery, SampleReporter};
pub use step::PipelineStep;
pub use verification::VerificationReporter;
