//! # api-template
//!
//! API template model for API Vault.
//! Describes external API surfaces, validates them at authoring time and
//! exports them as OpenAPI 3.0 documents.

mod types;
mod auth;
mod validate;
mod openapi;
mod error;

pub use types::*;
pub use auth::{
    ApiKeyLocation, AuthenticationDescriptor, DEFAULT_API_KEY_HEADER,
    DEFAULT_API_KEY_QUERY_PARAM, DEFAULT_BEARER_PREFIX,
};
pub use validate::{path_placeholders, TemplateValidator};
pub use openapi::{OpenApiDocument, OpenApiExporter, SecuritySchemeObject, OPENAPI_VERSION};
pub use error::{TemplateError, TemplateResult};
