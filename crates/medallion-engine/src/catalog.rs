//! Built-in pipeline catalog and SQL loading.
//!
//! Each pipeline is an ordered list of SQL files under
//! `<sql_dir>/<layer>/`, plus the tables to verify, the layer pairs to
//! compare and the sample queries to show once the build succeeds.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::comparison::ComparisonPair;
use crate::config::{Layer, ResolvedConfig};
use crate::error::EngineError;
use crate::orchestrator::PostRunChecks;
use crate::sample::SampleQuery;
use crate::step::PipelineStep;
use crate::template::SqlTemplateEngine;

/// A SQL file and what it builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepFile {
    pub file: &'static str,
    pub description: &'static str,
}

impl StepFile {
    /// Step name: the file name without its extension.
    pub fn name(&self) -> &'static str {
        self.file.strip_suffix(".sql").unwrap_or(self.file)
    }
}

/// Tables verified after a build, grouped for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableGroup {
    pub label: Option<&'static str>,
    pub tables: &'static [&'static str],
}

/// A read-only query shown after a successful build.
///
/// `sql` is a template over the same variables as the step files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleSpec {
    pub name: &'static str,
    pub title: &'static str,
    pub sql: &'static str,
    /// Printed instead of a table when the query returns no rows.
    pub empty_message: &'static str,
}

/// Definition of one built-in pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineSpec {
    pub name: &'static str,
    pub title: &'static str,
    /// Layer the pipeline writes to; also the SQL subdirectory.
    pub target: Layer,
    pub steps: &'static [StepFile],
    pub verify: &'static [TableGroup],
    /// Tables counted in `target` and in the previous layer.
    pub compare_with: Option<(Layer, &'static [&'static str])>,
    pub samples: &'static [SampleSpec],
    /// Hint printed after a successful build.
    pub next_hint: &'static str,
}

const STAR_SCHEMA_JOIN_SQL: &str = "\
SELECT
  d.year_month,
  u.state_name,
  u.unit_name,
  COUNT(DISTINCT f.order_id) AS total_orders,
  SUM(f.order_value) AS total_revenue,
  ROUND(AVG(f.order_value), 2) AS avg_order_value
FROM `{{ project_id }}.{{ dataset }}.fact_sales` f
JOIN `{{ project_id }}.{{ dataset }}.dim_date` d
  ON f.date_key = d.date_key
JOIN `{{ project_id }}.{{ dataset }}.dim_unit` u
  ON f.unit_key = u.unit_key
GROUP BY d.year_month, u.state_name, u.unit_name
ORDER BY total_revenue DESC
LIMIT 10";

const DAILY_SALES_SAMPLE_SQL: &str = "\
SELECT
  order_date,
  total_orders,
  total_revenue,
  avg_order_value,
  online_pct,
  cancellation_rate
FROM `{{ project_id }}.{{ dataset }}.agg_daily_sales`
ORDER BY order_date DESC
LIMIT 5";

pub const SILVER: PipelineSpec = PipelineSpec {
    name: "silver",
    title: "Build Silver Layer",
    target: Layer::Silver,
    steps: &[
        StepFile {
            file: "01_reference_tables.sql",
            description: "Reference tables (products, units, states, countries)",
        },
        StepFile {
            file: "02_orders.sql",
            description: "Orders with date enrichment and normalization",
        },
        StepFile {
            file: "03_order_items.sql",
            description: "Order items with calculated totals",
        },
    ],
    verify: &[TableGroup {
        label: None,
        tables: &["products", "units", "states", "countries", "orders", "order_items"],
    }],
    compare_with: Some((Layer::Bronze, &["orders", "order_items", "products", "units"])),
    samples: &[],
    next_hint: "Build Gold layer (star schema)",
};

pub const GOLD: PipelineSpec = PipelineSpec {
    name: "gold",
    title: "Build Gold Layer (Star Schema)",
    target: Layer::Gold,
    steps: &[
        StepFile {
            file: "01_dim_date.sql",
            description: "Date dimension (2025-2027)",
        },
        StepFile {
            file: "02_dim_product.sql",
            description: "Product dimension",
        },
        StepFile {
            file: "03_dim_unit.sql",
            description: "Unit dimension with geography",
        },
        StepFile {
            file: "04_dim_geography.sql",
            description: "Geography dimension",
        },
        StepFile {
            file: "05_fact_sales.sql",
            description: "Sales fact table (order-level)",
        },
        StepFile {
            file: "06_fact_order_items.sql",
            description: "Order items fact table (line-level)",
        },
    ],
    verify: &[
        TableGroup {
            label: Some("Dimensions"),
            tables: &["dim_date", "dim_product", "dim_unit", "dim_geography"],
        },
        TableGroup {
            label: Some("Facts"),
            tables: &["fact_sales", "fact_order_items"],
        },
    ],
    compare_with: None,
    samples: &[SampleSpec {
        name: "star_schema_join",
        title: "Star Schema Join Test",
        sql: STAR_SCHEMA_JOIN_SQL,
        empty_message: "(No data - tables are empty, awaiting ingestion)",
    }],
    next_hint: "Set up scheduled queries for automated refresh",
};

pub const AGGREGATIONS: PipelineSpec = PipelineSpec {
    name: "aggregations",
    title: "Build KPI Aggregations",
    target: Layer::Gold,
    steps: &[
        StepFile {
            file: "07_agg_daily_sales.sql",
            description: "Daily sales aggregation",
        },
        StepFile {
            file: "08_agg_unit_performance.sql",
            description: "Unit performance aggregation",
        },
        StepFile {
            file: "09_agg_product_performance.sql",
            description: "Product performance aggregation",
        },
    ],
    verify: &[TableGroup {
        label: None,
        tables: &["agg_daily_sales", "agg_unit_performance", "agg_product_performance"],
    }],
    compare_with: None,
    samples: &[SampleSpec {
        name: "daily_sales",
        title: "Sample Data - Daily Sales",
        sql: DAILY_SALES_SAMPLE_SQL,
        empty_message: "(No rows in agg_daily_sales)",
    }],
    next_hint: "Create dashboards on the aggregation tables",
};

/// All built-in pipelines, in build order.
pub const PIPELINES: &[PipelineSpec] = &[SILVER, GOLD, AGGREGATIONS];

impl FromStr for PipelineSpec {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PIPELINES
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| EngineError::PipelineNotFound(s.to_string()))
    }
}

impl PipelineSpec {
    /// Directory holding this pipeline's SQL files.
    pub fn sql_dir(&self, base: &Path) -> PathBuf {
        base.join(self.target.as_str())
    }

    /// Verification tables, qualified, in display order.
    pub fn verify_tables(&self, config: &ResolvedConfig) -> Vec<String> {
        self.verify
            .iter()
            .flat_map(|group| group.tables.iter())
            .map(|table| config.qualified(self.target, table))
            .collect()
    }

    pub fn comparison_pairs(&self, config: &ResolvedConfig) -> Vec<ComparisonPair> {
        match self.compare_with {
            Some((upstream, tables)) => tables
                .iter()
                .map(|table| {
                    ComparisonPair::new(
                        *table,
                        config.qualified(upstream, table),
                        config.qualified(self.target, table),
                    )
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Sample queries rendered against `config`.
    pub fn sample_queries(
        &self,
        config: &ResolvedConfig,
        templates: &SqlTemplateEngine,
    ) -> Result<Vec<SampleQuery>, EngineError> {
        let ctx = config.template_context(self.target);
        self.samples
            .iter()
            .map(|sample| {
                let sql = templates.render_sql(sample.sql, &ctx)?;
                Ok(SampleQuery::new(sample.name, sample.title, sql))
            })
            .collect()
    }

    pub fn sample(&self, name: &str) -> Option<&SampleSpec> {
        self.samples.iter().find(|s| s.name == name)
    }

    pub fn checks(
        &self,
        config: &ResolvedConfig,
        templates: &SqlTemplateEngine,
    ) -> Result<PostRunChecks, EngineError> {
        Ok(PostRunChecks {
            verify_tables: self.verify_tables(config),
            comparisons: self.comparison_pairs(config),
            samples: self.sample_queries(config, templates)?,
        })
    }

    /// Read and render every step, in order.
    ///
    /// Fails before anything runs if a file is missing or does not render,
    /// so a broken checkout never produces a half-built layer.
    pub fn load_steps(
        &self,
        sql_base: &Path,
        config: &ResolvedConfig,
        templates: &SqlTemplateEngine,
    ) -> Result<Vec<PipelineStep>, EngineError> {
        let dir = self.sql_dir(sql_base);
        let ctx = config.template_context(self.target);

        self.steps
            .iter()
            .map(|step| {
                let path = dir.join(step.file);
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    EngineError::Io(format!("Failed to read {}: {}", path.display(), e))
                })?;
                let sql = templates.render_sql(&raw, &ctx).map_err(|e| {
                    EngineError::Template(format!("{}: {}", path.display(), e))
                })?;

                tracing::debug!(step = step.name(), path = %path.display(), "Loaded SQL");
                Ok(PipelineStep::new(step.name(), step.description, sql))
            })
            .collect()
    }
}
