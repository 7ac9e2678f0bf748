//! SQL templating.
//!
//! SQL files may reference the project and layer datasets with
//! Jinja2-compatible syntax, rendered with minijinja.

mod engine;

pub use engine::SqlTemplateEngine;
