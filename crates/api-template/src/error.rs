//! Error types for API templates

use thiserror::Error;

/// Result type alias for template operations
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// Template error types
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Duplicate endpoint: {method} {path}")]
    DuplicateEndpoint { method: String, path: String },

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
