//! Project configuration.
//!
//! Loaded from a YAML file into an explicit value and passed to whatever
//! needs it. Nothing here is cached process-wide.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::EngineError;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "MEDALLION_CONFIG_PATH";

/// Environment variable overriding the SQL directory.
pub const SQL_PATH_ENV: &str = "MEDALLION_SQL_PATH";

const DEFAULT_CONFIG_PATH: &str = "config/project_config.yaml";
const DEFAULT_SQL_PATH: &str = "sql";

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex")
});

/// Warehouse layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw contents of `project_config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectSection,

    #[serde(default)]
    pub bigquery: BigQuerySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// GCP project id, or a `${VAR}` placeholder resolved from the environment.
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BigQuerySection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default)]
    pub datasets: LayerDatasets,
}

/// Dataset id per layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDatasets {
    #[serde(default = "default_bronze")]
    pub bronze: String,

    #[serde(default = "default_silver")]
    pub silver: String,

    #[serde(default = "default_gold")]
    pub gold: String,
}

fn default_bronze() -> String {
    "case_ficticio_bronze".to_string()
}

fn default_silver() -> String {
    "case_ficticio_silver".to_string()
}

fn default_gold() -> String {
    "case_ficticio_gold".to_string()
}

impl Default for LayerDatasets {
    fn default() -> Self {
        Self {
            bronze: default_bronze(),
            silver: default_silver(),
            gold: default_gold(),
        }
    }
}

impl LayerDatasets {
    pub fn get(&self, layer: Layer) -> &str {
        match layer {
            Layer::Bronze => &self.bronze,
            Layer::Silver => &self.silver,
            Layer::Gold => &self.gold,
        }
    }

    pub fn set(&mut self, layer: Layer, dataset: impl Into<String>) {
        let dataset = dataset.into();
        match layer {
            Layer::Bronze => self.bronze = dataset,
            Layer::Silver => self.silver = dataset,
            Layer::Gold => self.gold = dataset,
        }
    }
}

impl ProjectConfig {
    /// Config path from [`CONFIG_PATH_ENV`], or the conventional default.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, EngineError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Expand environment placeholders and validate.
    pub fn resolve(&self) -> Result<ResolvedConfig, EngineError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// [`resolve`](Self::resolve) with an explicit variable lookup.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedConfig, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = self.expand_with(lookup);
        resolved.validate()?;
        Ok(resolved)
    }

    /// Expand environment placeholders without validating.
    ///
    /// Callers that apply overrides afterwards must call
    /// [`ResolvedConfig::validate`] themselves.
    pub fn expand(&self) -> ResolvedConfig {
        self.expand_with(|name| std::env::var(name).ok())
    }

    pub fn expand_with<F>(&self, lookup: F) -> ResolvedConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_id = expand_env(&self.project.id, &lookup);
        let location = self
            .bigquery
            .location
            .as_deref()
            .map(|l| expand_env(l, &lookup))
            .filter(|l| !l.is_empty());

        ResolvedConfig {
            project_id,
            location,
            datasets: self.bigquery.datasets.clone(),
        }
    }
}

/// Replace `${VAR}` placeholders; unset variables expand to "".
fn expand_env<F>(value: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER_RE
        .replace_all(value, |caps: &regex::Captures| {
            lookup(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Configuration with placeholders expanded and CLI overrides applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub project_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    pub datasets: LayerDatasets,
}

impl ResolvedConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: None,
            datasets: LayerDatasets::default(),
        }
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        if let Some(project_id) = project_id {
            self.project_id = project_id;
        }
        self
    }

    pub fn with_dataset(mut self, layer: Layer, dataset: Option<String>) -> Self {
        if let Some(dataset) = dataset {
            self.datasets.set(layer, dataset);
        }
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.project_id.trim().is_empty() {
            return Err(EngineError::Configuration(
                "project.id is empty (set it in the config file or via GCP_PROJECT_ID)"
                    .to_string(),
            ));
        }
        for layer in [Layer::Bronze, Layer::Silver, Layer::Gold] {
            if self.datasets.get(layer).trim().is_empty() {
                return Err(EngineError::Configuration(format!(
                    "bigquery.datasets.{} is empty",
                    layer
                )));
            }
        }
        Ok(())
    }

    /// `project.dataset.table` for a table in `layer`.
    pub fn qualified(&self, layer: Layer, table: &str) -> String {
        format!("{}.{}.{}", self.project_id, self.datasets.get(layer), table)
    }

    /// Variables available to SQL templates for a pipeline targeting `target`.
    pub fn template_context(&self, target: Layer) -> HashMap<String, serde_json::Value> {
        let mut ctx = HashMap::new();
        ctx.insert("project_id".to_string(), serde_json::json!(self.project_id));
        ctx.insert("bronze_dataset".to_string(), serde_json::json!(self.datasets.bronze));
        ctx.insert("silver_dataset".to_string(), serde_json::json!(self.datasets.silver));
        ctx.insert("gold_dataset".to_string(), serde_json::json!(self.datasets.gold));
        ctx.insert("dataset".to_string(), serde_json::json!(self.datasets.get(target)));
        if let Some(ref location) = self.location {
            ctx.insert("location".to_string(), serde_json::json!(location));
        }
        ctx
    }
}

/// SQL base directory from [`SQL_PATH_ENV`], or `sql`.
pub fn default_sql_dir() -> PathBuf {
    std::env::var(SQL_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SQL_PATH))
}
