//! Authentication descriptors declared by templates

use serde::{Deserialize, Serialize};

/// Header used for API keys when the template does not name one
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Query parameter used for API keys sent in the query string
pub const DEFAULT_API_KEY_QUERY_PARAM: &str = "api_key";

/// Scheme word placed before bearer tokens
pub const DEFAULT_BEARER_PREFIX: &str = "Bearer";

/// Where an API key is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Authentication requirements of a template
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthenticationDescriptor {
    /// No authentication required
    #[default]
    None,
    /// Static API key
    ApiKey {
        #[serde(rename = "headerName", default = "default_api_key_header")]
        header_name: String,
        #[serde(default)]
        location: ApiKeyLocation,
        #[serde(rename = "queryParam", default = "default_api_key_query_param")]
        query_param: String,
    },
    /// HTTP Basic authentication
    Basic,
    /// Static token sent as `Authorization: <prefix> <token>`
    Bearer {
        #[serde(default = "default_bearer_prefix")]
        prefix: String,
    },
    /// OAuth2 access token
    #[serde(rename = "oauth2")]
    OAuth2 {
        #[serde(rename = "authorizationUrl", default, skip_serializing_if = "Option::is_none")]
        authorization_url: Option<String>,
        #[serde(rename = "tokenUrl", default, skip_serializing_if = "Option::is_none")]
        token_url: Option<String>,
        #[serde(default)]
        scopes: Vec<String>,
    },
    /// Application-specific scheme applied by a registered handler
    Custom {
        #[serde(rename = "headerName", default, skip_serializing_if = "Option::is_none")]
        header_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

fn default_api_key_query_param() -> String {
    DEFAULT_API_KEY_QUERY_PARAM.to_string()
}

fn default_bearer_prefix() -> String {
    DEFAULT_BEARER_PREFIX.to_string()
}

impl AuthenticationDescriptor {
    /// API key sent in the default header
    pub fn api_key_header(header_name: &str) -> Self {
        AuthenticationDescriptor::ApiKey {
            header_name: header_name.to_string(),
            location: ApiKeyLocation::Header,
            query_param: default_api_key_query_param(),
        }
    }

    /// Bearer token with the standard prefix
    pub fn bearer() -> Self {
        AuthenticationDescriptor::Bearer {
            prefix: default_bearer_prefix(),
        }
    }

    /// The `type` discriminator as written in template documents
    pub fn auth_type(&self) -> &'static str {
        match self {
            AuthenticationDescriptor::None => "none",
            AuthenticationDescriptor::ApiKey { .. } => "api_key",
            AuthenticationDescriptor::Basic => "basic",
            AuthenticationDescriptor::Bearer { .. } => "bearer",
            AuthenticationDescriptor::OAuth2 { .. } => "oauth2",
            AuthenticationDescriptor::Custom { .. } => "custom",
        }
    }

    /// Name of the security scheme in exported OpenAPI documents
    pub fn scheme_name(&self) -> Option<&'static str> {
        match self {
            AuthenticationDescriptor::None => None,
            AuthenticationDescriptor::ApiKey { .. } => Some("apiKeyAuth"),
            AuthenticationDescriptor::Basic => Some("basicAuth"),
            AuthenticationDescriptor::Bearer { .. } => Some("bearerAuth"),
            AuthenticationDescriptor::OAuth2 { .. } => Some("oauth2Auth"),
            AuthenticationDescriptor::Custom { .. } => Some("customAuth"),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_defaults() {
        let auth: AuthenticationDescriptor =
            serde_json::from_str(r#"{"type": "api_key"}"#).unwrap();

        match auth {
            AuthenticationDescriptor::ApiKey {
                header_name,
                location,
                query_param,
            } => {
                assert_eq!(header_name, "X-API-Key");
                assert_eq!(location, ApiKeyLocation::Header);
                assert_eq!(query_param, "api_key");
            }
            _ => panic!("Expected ApiKey auth"),
        }
    }

    #[test]
    fn test_bearer_default_prefix() {
        let auth: AuthenticationDescriptor =
            serde_json::from_str(r#"{"type": "bearer"}"#).unwrap();
        assert_eq!(auth, AuthenticationDescriptor::bearer());
        assert_eq!(auth.auth_type(), "bearer");
    }

    #[test]
    fn test_oauth2_descriptor() {
        let auth: AuthenticationDescriptor = serde_json::from_str(
            r#"{"type": "oauth2", "tokenUrl": "https://auth.example.com/token", "scopes": ["read"]}"#,
        )
        .unwrap();

        assert_eq!(auth.auth_type(), "oauth2");
        assert_eq!(auth.scheme_name(), Some("oauth2Auth"));
        match auth {
            AuthenticationDescriptor::OAuth2 { token_url, scopes, .. } => {
                assert_eq!(token_url.as_deref(), Some("https://auth.example.com/token"));
                assert_eq!(scopes, vec!["read".to_string()]);
            }
            _ => panic!("Expected OAuth2 auth"),
        }
    }
}
