//! Template engine implementation using minijinja.

use minijinja::{Environment, UndefinedBehavior, Value};
use std::collections::HashMap;

use crate::error::EngineError;

/// Renders SQL text containing `{{ ... }}` placeholders.
///
/// Undefined variables are an error: a typo in a dataset name must not
/// silently render as an empty identifier.
pub struct SqlTemplateEngine {
    env: Environment<'static>,
}

impl SqlTemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.add_filter("quote_ident", filter_quote_ident);
        env.add_filter("sql_string", filter_sql_string);
        env.add_function("table", function_table);

        Self { env }
    }

    /// Render a template string with the given context.
    pub fn render(
        &self,
        template: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<String, EngineError> {
        let tmpl = self.env.template_from_str(template)?;
        let ctx = context_to_value(context);
        tmpl.render(ctx).map_err(|e| EngineError::Template(e.to_string()))
    }

    /// Render only if the text contains template syntax.
    ///
    /// Plain SQL is returned unchanged, which keeps literal `{` in string
    /// constants or JSON paths safe.
    pub fn render_sql(
        &self,
        sql: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<String, EngineError> {
        if Self::is_template(sql) {
            self.render(sql, context)
        } else {
            Ok(sql.to_string())
        }
    }

    /// Check if a string contains template syntax.
    pub fn is_template(s: &str) -> bool {
        s.contains("{{") || s.contains("{%")
    }
}

impl Default for SqlTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SqlTemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTemplateEngine").finish_non_exhaustive()
    }
}

fn context_to_value(context: &HashMap<String, serde_json::Value>) -> Value {
    let json = serde_json::Value::Object(
        context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    Value::from_serialize(&json)
}

// Custom filters

/// Wrap an identifier in backticks.
fn filter_quote_ident(value: Value) -> String {
    format!("`{}`", value.to_string().replace('`', ""))
}

/// Single-quoted SQL string literal.
fn filter_sql_string(value: Value) -> String {
    format!("'{}'", value.to_string().replace('\\', "\\\\").replace('\'', "\\'"))
}

/// `table(project, dataset, name)` -> `` `project.dataset.name` ``
fn function_table(project: String, dataset: String, name: String) -> String {
    format!("`{}.{}.{}`", project, dataset, name)
}
