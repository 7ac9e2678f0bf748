//! Post-build sample queries.
//!
//! Small read-only queries run after a successful build to show that the
//! new tables join and aggregate as expected.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::executor::QueryExecutor;
use crate::result::SampleEntry;

/// A rendered sample query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleQuery {
    pub name: String,
    pub title: String,
    pub sql: String,
}

impl SampleQuery {
    pub fn new(name: impl Into<String>, title: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            sql: sql.into(),
        }
    }
}

/// Runs sample queries, best-effort and in order.
pub struct SampleReporter {
    executor: Arc<dyn QueryExecutor>,
}

impl SampleReporter {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    pub async fn run(&self, queries: &[SampleQuery]) -> Vec<SampleEntry> {
        let mut entries = Vec::with_capacity(queries.len());

        for query in queries {
            let entry = match self.executor.fetch_rows(&query.sql).await {
                Ok(rows) => {
                    tracing::debug!(sample = %query.name, rows = rows.rows.len(), "Sample query returned");
                    SampleEntry::fetched(&query.name, &query.title, rows)
                }
                Err(err) => {
                    tracing::warn!(sample = %query.name, kind = %err.kind, error = %err.message, "Sample query failed");
                    SampleEntry::failed(&query.name, &query.title, err)
                }
            };
            entries.push(entry);
        }

        entries
    }
}
