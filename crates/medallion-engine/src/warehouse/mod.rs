//! Query executor implementations.
//!
//! - `bigquery` - BigQuery REST API executor
//! - `scripted` - in-memory executor with scripted outcomes

mod bigquery;
mod scripted;

pub use self::bigquery::{count_query, BigQueryConfig, BigQueryExecutor};
pub use self::scripted::ScriptedExecutor;
