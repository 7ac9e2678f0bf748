//! Medallion CLI.
//!
//! Builds the silver, gold and aggregation layers of a BigQuery warehouse
//! from ordered SQL files, then verifies the result.

mod logging;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use medallion_engine::auth::GcpAuth;
use medallion_engine::catalog::PipelineSpec;
use medallion_engine::config::default_sql_dir;
use medallion_engine::template::SqlTemplateEngine;
use medallion_engine::warehouse::{BigQueryConfig, BigQueryExecutor};
use medallion_engine::{PipelineOrchestrator, ProjectConfig, ResolvedConfig, PIPELINES};

use logging::LogFormat;

#[derive(Parser)]
#[command(name = "medallion")]
#[command(version, about = "Build and verify layered BigQuery warehouses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

/// Options shared by commands that talk to a project.
#[derive(clap::Args, Debug)]
struct TargetArgs {
    /// Pipeline name (silver, gold, aggregations)
    pipeline: String,

    /// GCP project id (overrides the config file)
    #[arg(short, long)]
    project: Option<String>,

    /// Dataset of the layer being built (overrides the config file)
    #[arg(short, long)]
    dataset: Option<String>,

    /// Path to project_config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline's SQL steps, then verify and compare the result
    Build {
        #[command(flatten)]
        target: TargetArgs,

        /// Directory holding <layer>/<file>.sql
        #[arg(long)]
        sql_dir: Option<PathBuf>,

        /// Print the rendered SQL without contacting BigQuery
        #[arg(long)]
        dry_run: bool,
    },
    /// Count rows and compare layers for tables a pipeline builds
    Verify {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List built-in pipelines
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    logging::init(cli.log_format);

    let code = match cli.command {
        Commands::Build {
            target,
            sql_dir,
            dry_run,
        } => build(target, sql_dir, dry_run).await?,
        Commands::Verify { target } => verify(target).await?,
        Commands::List => {
            print!("{}", render::catalog(PIPELINES));
            0
        }
    };

    std::process::exit(code);
}

fn resolve(target: &TargetArgs) -> Result<(PipelineSpec, ResolvedConfig)> {
    let spec: PipelineSpec = target.pipeline.parse()?;

    let path = target
        .config
        .clone()
        .unwrap_or_else(ProjectConfig::default_path);
    let config = ProjectConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    let resolved = config
        .expand()
        .with_project(target.project.clone())
        .with_dataset(spec.target, target.dataset.clone());
    resolved.validate()?;

    tracing::info!(
        pipeline = spec.name,
        project = %resolved.project_id,
        dataset = resolved.datasets.get(spec.target),
        "Configuration loaded"
    );

    Ok((spec, resolved))
}

fn connect(spec: &PipelineSpec, config: &ResolvedConfig) -> Result<PipelineOrchestrator> {
    let bq_config =
        BigQueryConfig::new(&config.project_id).with_location(config.location.clone());
    let executor = BigQueryExecutor::new(bq_config, GcpAuth::from_env())?;
    let checks = spec.checks(config, &SqlTemplateEngine::new())?;

    Ok(PipelineOrchestrator::new(spec.name, Arc::new(executor)).with_checks(checks))
}

async fn build(target: TargetArgs, sql_dir: Option<PathBuf>, dry_run: bool) -> Result<i32> {
    let (spec, config) = resolve(&target)?;

    let sql_dir = sql_dir.unwrap_or_else(default_sql_dir);
    let steps = spec
        .load_steps(&sql_dir, &config, &SqlTemplateEngine::new())
        .with_context(|| format!("Failed to load {} steps from {}", spec.name, sql_dir.display()))?;

    if dry_run {
        if target.json {
            println!("{}", serde_json::to_string_pretty(&steps)?);
        } else {
            print!("{}", render::banner(&spec, &config, chrono::Utc::now()));
            print!("{}", render::plan(&steps));
        }
        return Ok(0);
    }

    let orchestrator = connect(&spec, &config)?;

    if !target.json {
        print!("{}", render::banner(&spec, &config, chrono::Utc::now()));
    }

    let report = orchestrator.execute(&steps).await;

    if target.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render::report(&spec, &report));
    }

    Ok(report.exit_code())
}

async fn verify(target: TargetArgs) -> Result<i32> {
    let (spec, config) = resolve(&target)?;
    let orchestrator = connect(&spec, &config)?;

    let results = orchestrator.run_checks().await;

    if target.json {
        let body = serde_json::json!({
            "pipeline": spec.name,
            "verification": results.verification,
            "comparison": results.comparison,
            "samples": results.samples,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print!("{}", render::banner(&spec, &config, chrono::Utc::now()));
        print!("{}", render::verification(&spec, &results.verification));
        if let Some((upstream, _)) = spec.compare_with {
            print!("{}", render::comparison(upstream, spec.target, &results.comparison));
        }
        print!("{}", render::samples(&spec, &results.samples));
    }

    Ok(if results.all_ok() { 0 } else { 1 })
}
