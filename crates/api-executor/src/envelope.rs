//! Normalized execution results
//!
//! Callers tell the two shapes apart by the presence of `status` or `error`:
//!
//! ```json
//! {"status": 200, "statusText": "OK", "headers": {}, "data": {},
//!  "meta": {"url": "...", "method": "GET", "responseTime": 12, "timestamp": "..."}}
//!
//! {"error": {"message": "...", "code": "TIMEOUT"}, "meta": {"timestamp": "..."}}
//! ```

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutorError;

/// Failure codes carried by the error envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Timeout,
    ConnectionFailed,
    RequestFailed,
    ResponseReadFailed,
    AuthenticationError,
    CredentialNotFound,
    InvalidRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessMeta {
    /// URL the request was sent to, with query-string credentials redacted
    pub url: String,
    pub method: String,
    /// Wall-clock time in milliseconds
    pub response_time: u64,
    pub timestamp: DateTime<Utc>,
}

/// Upstream responded, whatever the status code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEnvelope {
    pub status: u16,
    pub status_text: String,
    pub headers: IndexMap<String, String>,
    /// Parsed JSON body, or the raw text when it is not JSON
    pub data: Value,
    pub meta: SuccessMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMeta {
    pub timestamp: DateTime<Utc>,
}

/// The call could not be made or completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
    pub meta: ErrorMeta,
}

/// Outcome of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    Success(SuccessEnvelope),
    Error(ErrorEnvelope),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    /// Upstream status code, if the call completed
    pub fn status(&self) -> Option<u16> {
        match self {
            ExecutionResult::Success(s) => Some(s.status),
            ExecutionResult::Error(_) => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Error(e) => Some(e.error.code),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ExecutionResult::Success(s) => s.meta.timestamp,
            ExecutionResult::Error(e) => e.meta.timestamp,
        }
    }
}

impl From<ExecutorError> for ExecutionResult {
    fn from(error: ExecutorError) -> Self {
        ExecutionResult::Error(ErrorEnvelope {
            error: ErrorBody {
                message: error.to_string(),
                code: error.code(),
            },
            meta: ErrorMeta {
                timestamp: Utc::now(),
            },
        })
    }
}

impl From<SuccessEnvelope> for ExecutionResult {
    fn from(envelope: SuccessEnvelope) -> Self {
        ExecutionResult::Success(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_envelope_shape() {
        let result = ExecutionResult::from(ExecutorError::Connection("refused".into()));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["error"]["code"], "CONNECTION_FAILED");
        assert_eq!(json["error"]["message"], "Connection failed: refused");
        assert!(json["meta"]["timestamp"].is_string());
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_success_envelope_shape() {
        let result = ExecutionResult::from(SuccessEnvelope {
            status: 404,
            status_text: "Not Found".to_string(),
            headers: IndexMap::new(),
            data: json!({"message": "missing"}),
            meta: SuccessMeta {
                url: "https://api.example.com/users/1".to_string(),
                method: "GET".to_string(),
                response_time: 12,
                timestamp: Utc::now(),
            },
        });
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["status"], 404);
        assert_eq!(json["statusText"], "Not Found");
        assert_eq!(json["meta"]["responseTime"], 12);
        assert!(json.get("error").is_none());
        assert_eq!(result.status(), Some(404));
    }

    #[test]
    fn test_untagged_roundtrip_distinguishes_shapes() {
        let raw = json!({
            "error": {"message": "timed out", "code": "TIMEOUT"},
            "meta": {"timestamp": "2024-01-01T00:00:00Z"}
        });
        let result: ExecutionResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.error_code(), Some(ErrorCode::Timeout));
    }
}
