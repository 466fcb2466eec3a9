//! Error types for api-executor

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::envelope::ErrorCode;

/// Result type alias for executor operations
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Executor error types
///
/// None of these ever escape [`crate::ApiExecutor::execute`]; they are folded
/// into the error envelope there.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(Uuid),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to read response: {0}")]
    ResponseRead(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ExecutorError {
    /// Code reported in the error envelope
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecutorError::InvalidRequest(_) | ExecutorError::Client(_) => ErrorCode::InvalidRequest,
            ExecutorError::Authentication(_) => ErrorCode::AuthenticationError,
            ExecutorError::CredentialNotFound(_) => ErrorCode::CredentialNotFound,
            ExecutorError::Timeout(_) => ErrorCode::Timeout,
            ExecutorError::Connection(_) => ErrorCode::ConnectionFailed,
            ExecutorError::Request(_) => ErrorCode::RequestFailed,
            ExecutorError::ResponseRead(_) => ErrorCode::ResponseReadFailed,
        }
    }

    /// Classify a transport failure. The URL is stripped so query-string
    /// credentials cannot end up in the message.
    pub(crate) fn from_transport(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            ExecutorError::Timeout(timeout)
        } else if error.is_connect() {
            ExecutorError::Connection(error.without_url().to_string())
        } else {
            ExecutorError::Request(error.without_url().to_string())
        }
    }
}
