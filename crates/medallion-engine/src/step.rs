//! Pipeline step definition.

use serde::{Deserialize, Serialize};

/// One named SQL transformation.
///
/// Steps are executed in the order they appear in a pipeline; a step may
/// read any table written by an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub name: String,
    pub description: String,
    pub sql: String,
}

impl PipelineStep {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sql: sql.into(),
        }
    }
}
