//! Authentication strategies
//!
//! A template's [`AuthenticationDescriptor`] is turned into an [`AuthStrategy`]
//! once, when the template is prepared. Each execution then applies that
//! strategy to the built request with the decrypted credential. A strategy
//! that finds the credential lacking the material it needs fails with an
//! authentication error, so a request never goes out half-authenticated.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ExecutorError, Result};
use crate::request::BuiltRequest;
use api_template::{ApiKeyLocation, ApiTemplate, AuthenticationDescriptor};
use vault_core::CredentialMaterial;

const AUTHORIZATION: &str = "Authorization";

fn missing(what: &str) -> ExecutorError {
    ExecutorError::Authentication(format!("credential has no {}", what))
}

/// Puts a decrypted credential onto a request
pub trait ApplyAuth {
    fn apply_to(&self, request: &mut BuiltRequest, material: &CredentialMaterial) -> Result<()>;
}

/// Caller-supplied logic for templates declaring `custom` authentication
pub trait CustomAuthHandler: Send + Sync {
    fn apply(&self, request: &mut BuiltRequest, data: &Map<String, Value>) -> Result<()>;
}

/// Sends every string entry of the custom data as a header of the same name
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderCopyHandler;

impl CustomAuthHandler for HeaderCopyHandler {
    fn apply(&self, request: &mut BuiltRequest, data: &Map<String, Value>) -> Result<()> {
        for (name, value) in data {
            if let Value::String(value) = value {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    pub header_name: String,
    pub location: ApiKeyLocation,
    pub query_param: String,
}

impl ApplyAuth for ApiKeyAuth {
    fn apply_to(&self, request: &mut BuiltRequest, material: &CredentialMaterial) -> Result<()> {
        let key = material.api_key.as_ref().ok_or_else(|| missing("API key"))?;

        match self.location {
            ApiKeyLocation::Header => request.headers.insert(self.header_name.clone(), key.expose()),
            ApiKeyLocation::Query => request.append_secret_query(&self.query_param, key.expose()),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BasicAuth;

impl ApplyAuth for BasicAuth {
    fn apply_to(&self, request: &mut BuiltRequest, material: &CredentialMaterial) -> Result<()> {
        let basic = material.basic.as_ref().ok_or_else(|| missing("basic section"))?;
        let password = basic.password.as_ref().ok_or_else(|| missing("password"))?;

        let encoded = STANDARD.encode(format!("{}:{}", basic.username, password.expose()));
        request
            .headers
            .insert(AUTHORIZATION, format!("Basic {}", encoded));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BearerAuth {
    pub prefix: String,
}

impl ApplyAuth for BearerAuth {
    fn apply_to(&self, request: &mut BuiltRequest, material: &CredentialMaterial) -> Result<()> {
        let token = material.api_key.as_ref().ok_or_else(|| missing("token"))?;
        request
            .headers
            .insert(AUTHORIZATION, format!("{} {}", self.prefix, token.expose()));
        Ok(())
    }
}

/// Sends the stored access token. Expired tokens are sent anyway and
/// surface as an upstream 401; no refresh is attempted.
#[derive(Debug, Clone, Copy)]
pub struct OAuth2Auth;

impl ApplyAuth for OAuth2Auth {
    fn apply_to(&self, request: &mut BuiltRequest, material: &CredentialMaterial) -> Result<()> {
        let oauth2 = material.oauth2.as_ref().ok_or_else(|| missing("oauth2 section"))?;
        let token = oauth2
            .access_token
            .as_ref()
            .ok_or_else(|| missing("access token"))?;

        if oauth2.is_token_expired() {
            warn!(
                "OAuth2 access token for client {} has expired, sending it anyway",
                oauth2.client_id
            );
        }

        request
            .headers
            .insert(AUTHORIZATION, format!("Bearer {}", token.expose()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct CustomAuth {
    handler: Option<Arc<dyn CustomAuthHandler>>,
}

impl CustomAuth {
    pub fn new(handler: Option<Arc<dyn CustomAuthHandler>>) -> Self {
        Self { handler }
    }
}

impl std::fmt::Debug for CustomAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomAuth")
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl ApplyAuth for CustomAuth {
    fn apply_to(&self, request: &mut BuiltRequest, material: &CredentialMaterial) -> Result<()> {
        let data = material.custom.as_ref().ok_or_else(|| missing("custom data"))?;

        let Some(handler) = &self.handler else {
            debug!("No custom auth handler registered, request left unchanged");
            return Ok(());
        };
        handler.apply(request, data)
    }
}

/// The one authentication strategy a template uses
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    None,
    ApiKey(ApiKeyAuth),
    Basic(BasicAuth),
    Bearer(BearerAuth),
    OAuth2(OAuth2Auth),
    Custom(CustomAuth),
}

impl AuthStrategy {
    pub fn from_descriptor(
        descriptor: &AuthenticationDescriptor,
        custom_handler: Option<Arc<dyn CustomAuthHandler>>,
    ) -> Self {
        match descriptor {
            AuthenticationDescriptor::None => AuthStrategy::None,
            AuthenticationDescriptor::ApiKey {
                header_name,
                location,
                query_param,
            } => AuthStrategy::ApiKey(ApiKeyAuth {
                header_name: header_name.clone(),
                location: *location,
                query_param: query_param.clone(),
            }),
            AuthenticationDescriptor::Basic => AuthStrategy::Basic(BasicAuth),
            AuthenticationDescriptor::Bearer { prefix } => AuthStrategy::Bearer(BearerAuth {
                prefix: prefix.clone(),
            }),
            AuthenticationDescriptor::OAuth2 { .. } => AuthStrategy::OAuth2(OAuth2Auth),
            AuthenticationDescriptor::Custom { .. } => {
                AuthStrategy::Custom(CustomAuth::new(custom_handler))
            }
        }
    }
}

impl ApplyAuth for AuthStrategy {
    fn apply_to(&self, request: &mut BuiltRequest, material: &CredentialMaterial) -> Result<()> {
        match self {
            AuthStrategy::None => Ok(()),
            AuthStrategy::ApiKey(s) => s.apply_to(request, material),
            AuthStrategy::Basic(s) => s.apply_to(request, material),
            AuthStrategy::Bearer(s) => s.apply_to(request, material),
            AuthStrategy::OAuth2(s) => s.apply_to(request, material),
            AuthStrategy::Custom(s) => s.apply_to(request, material),
        }
    }
}

/// A template with its authentication strategy resolved
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    pub template: ApiTemplate,
    pub auth: AuthStrategy,
}

impl PreparedTemplate {
    pub fn new(template: ApiTemplate) -> Self {
        Self::with_custom_handler(template, None)
    }

    pub fn with_custom_handler(
        template: ApiTemplate,
        custom_handler: Option<Arc<dyn CustomAuthHandler>>,
    ) -> Self {
        let auth = AuthStrategy::from_descriptor(&template.authentication, custom_handler);
        debug!(
            "Prepared {} auth for template {}",
            template.authentication.auth_type(),
            template.id
        );
        Self { template, auth }
    }
}
