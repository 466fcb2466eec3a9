//! # api-executor
//!
//! Executes API template endpoints for API Vault:
//! builds the request, applies the template's authentication with a
//! decrypted credential, sends it and normalizes the outcome into a
//! success or error envelope.

pub mod auth;
pub mod envelope;
pub mod error;
mod executor;
pub mod headers;
pub mod request;

pub use auth::{ApplyAuth, AuthStrategy, CustomAuthHandler, HeaderCopyHandler, PreparedTemplate};
pub use envelope::{ErrorCode, ErrorEnvelope, ExecutionResult, SuccessEnvelope};
pub use error::{ExecutorError, Result};
pub use executor::{ApiExecutor, EndpointSelector, ExecutionRequest};
pub use headers::HeaderSet;
pub use request::{build_body, build_headers, build_request, build_url, BuiltRequest, RequestBody};
