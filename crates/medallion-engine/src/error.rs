//! Engine error types.
//!
//! Query failures during a run are not errors at this level: they are
//! captured as [`ErrorInfo`](crate::result::ErrorInfo) values inside the
//! report. `EngineError` covers everything that prevents a run from being
//! assembled in the first place.

use thiserror::Error;

/// Errors raised while loading configuration, SQL files or credentials.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unknown pipeline name.
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::Yaml(e.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Http(e.to_string())
    }
}

impl From<minijinja::Error> for EngineError {
    fn from(e: minijinja::Error) -> Self {
        EngineError::Template(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::PipelineNotFound("platinum".to_string());
        assert_eq!(err.to_string(), "Pipeline not found: platinum");

        let err = EngineError::Configuration("missing project.id".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing project.id");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_error_from_yaml() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let err: EngineError = yaml_err.into();
        assert!(matches!(err, EngineError::Yaml(_)));
    }
}
