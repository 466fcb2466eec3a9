//! OpenAPI 3.0 export of API templates
//!
//! The export is a pure function of the template. All maps are ordered, so the
//! same template always renders to the same document.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::AuthenticationDescriptor;
use crate::error::TemplateResult;
use crate::types::{ApiTemplate, Endpoint, ParameterDefinition, ParameterLocation, ParameterType};

/// OpenAPI version written to exported documents
pub const OPENAPI_VERSION: &str = "3.0.3";

/// Exported OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    pub servers: Vec<Server>,
    pub paths: IndexMap<String, IndexMap<String, Operation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<IndexMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Info {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Server {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: IndexMap<String, Response>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBody {
    pub required: bool,
    pub content: IndexMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaType {
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    pub security_schemes: IndexMap<String, SecuritySchemeObject>,
}

/// Security scheme entry under `components.securitySchemes`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SecuritySchemeObject {
    #[serde(rename = "apiKey")]
    ApiKey {
        name: String,
        #[serde(rename = "in")]
        location: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    #[serde(rename = "http")]
    Http { scheme: String },
    #[serde(rename = "oauth2")]
    OAuth2 { flows: OAuthFlows },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthFlows {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<OAuthFlow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_credentials: Option<OAuthFlow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthFlow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    pub token_url: String,
    pub scopes: IndexMap<String, String>,
}

impl OpenApiDocument {
    /// Render as a JSON value
    pub fn to_value(&self) -> TemplateResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Render as pretty-printed JSON
    pub fn to_json_pretty(&self) -> TemplateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> TemplateResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Converts templates to OpenAPI documents
pub struct OpenApiExporter;

impl OpenApiExporter {
    /// Export a template
    pub fn export(template: &ApiTemplate) -> OpenApiDocument {
        let mut paths: IndexMap<String, IndexMap<String, Operation>> = IndexMap::new();

        for endpoint in &template.endpoints {
            let path = if endpoint.path.starts_with('/') {
                endpoint.path.clone()
            } else {
                format!("/{}", endpoint.path)
            };

            paths
                .entry(path)
                .or_default()
                .insert(endpoint.method.as_lowercase().to_string(), Self::operation(endpoint));
        }

        let auth = &template.authentication;
        let (components, security) = match (auth.scheme_name(), Self::security_scheme(auth)) {
            (Some(name), Some(scheme)) => {
                let scopes = match auth {
                    AuthenticationDescriptor::OAuth2 { scopes, .. } => scopes.clone(),
                    _ => Vec::new(),
                };
                let mut schemes = IndexMap::new();
                schemes.insert(name.to_string(), scheme);
                let mut requirement = IndexMap::new();
                requirement.insert(name.to_string(), scopes);
                (
                    Some(Components {
                        security_schemes: schemes,
                    }),
                    vec![requirement],
                )
            }
            _ => (None, Vec::new()),
        };

        debug!(
            "Exported template {} with {} paths",
            template.name,
            paths.len()
        );

        OpenApiDocument {
            openapi: OPENAPI_VERSION.to_string(),
            info: Info {
                title: template.name.clone(),
                description: template.description.clone(),
                version: template.version.clone(),
            },
            servers: vec![Server {
                url: template.base_url.trim_end_matches('/').to_string(),
            }],
            paths,
            components,
            security,
        }
    }

    fn operation(endpoint: &Endpoint) -> Operation {
        let parameters = endpoint
            .parameters
            .iter()
            .filter_map(Self::parameter)
            .collect();

        let body_params: Vec<&ParameterDefinition> =
            endpoint.parameters_in(ParameterLocation::Body).collect();

        let request_body = if body_params.is_empty() {
            None
        } else if !endpoint.method.has_body() {
            debug!(
                "Ignoring body parameters on {} for export",
                endpoint.label()
            );
            None
        } else {
            Some(Self::request_body(&body_params))
        };

        let mut responses = IndexMap::new();
        responses.insert(
            "200".to_string(),
            Response {
                description: "Successful response".to_string(),
            },
        );

        Operation {
            operation_id: endpoint
                .name
                .clone()
                .unwrap_or_else(|| Self::generate_operation_id(endpoint)),
            summary: endpoint.name.clone(),
            description: endpoint.description.clone(),
            tags: endpoint.tags.clone(),
            parameters,
            request_body,
            responses,
        }
    }

    fn parameter(param: &ParameterDefinition) -> Option<Parameter> {
        let location = match param.location {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Body => return None,
        };

        Some(Parameter {
            name: param.name.clone(),
            location: location.to_string(),
            // OpenAPI requires path parameters to be marked required
            required: param.required || param.location == ParameterLocation::Path,
            description: param.description.clone(),
            schema: Self::schema(param),
        })
    }

    fn request_body(params: &[&ParameterDefinition]) -> RequestBody {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in params {
            properties.insert(param.name.clone(), Self::schema(param));
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }

        let mut content = IndexMap::new();
        content.insert("application/json".to_string(), MediaType { schema });

        RequestBody {
            required: params.iter().any(|p| p.required),
            content,
        }
    }

    fn schema(param: &ParameterDefinition) -> Value {
        let mut schema = json!({ "type": param.param_type.schema_type() });
        if param.param_type == ParameterType::Array {
            schema["items"] = json!({ "type": "string" });
        }
        if let Some(default) = &param.default {
            schema["default"] = default.clone();
        }
        if let Some(description) = &param.description {
            schema["description"] = Value::String(description.clone());
        }
        schema
    }

    fn security_scheme(auth: &AuthenticationDescriptor) -> Option<SecuritySchemeObject> {
        match auth {
            AuthenticationDescriptor::None => None,
            AuthenticationDescriptor::ApiKey {
                header_name,
                location,
                query_param,
            } => {
                let (name, location) = match location {
                    crate::auth::ApiKeyLocation::Header => (header_name.clone(), "header"),
                    crate::auth::ApiKeyLocation::Query => (query_param.clone(), "query"),
                };
                Some(SecuritySchemeObject::ApiKey {
                    name,
                    location: location.to_string(),
                    description: None,
                })
            }
            AuthenticationDescriptor::Basic => Some(SecuritySchemeObject::Http {
                scheme: "basic".to_string(),
            }),
            AuthenticationDescriptor::Bearer { .. } => Some(SecuritySchemeObject::Http {
                scheme: "bearer".to_string(),
            }),
            AuthenticationDescriptor::OAuth2 {
                authorization_url,
                token_url,
                scopes,
            } => {
                let scopes: IndexMap<String, String> = scopes
                    .iter()
                    .map(|s| (s.clone(), String::new()))
                    .collect();

                let flows = match authorization_url {
                    Some(authorization_url) => OAuthFlows {
                        authorization_code: Some(OAuthFlow {
                            authorization_url: Some(authorization_url.clone()),
                            token_url: token_url
                                .clone()
                                .unwrap_or_else(|| authorization_url.clone()),
                            scopes,
                        }),
                        client_credentials: None,
                    },
                    None => OAuthFlows {
                        authorization_code: None,
                        client_credentials: Some(OAuthFlow {
                            authorization_url: None,
                            token_url: token_url.clone().unwrap_or_default(),
                            scopes,
                        }),
                    },
                };

                Some(SecuritySchemeObject::OAuth2 { flows })
            }
            // Closest OpenAPI shape for an application-defined scheme
            AuthenticationDescriptor::Custom {
                header_name,
                description,
            } => Some(SecuritySchemeObject::ApiKey {
                name: header_name
                    .clone()
                    .unwrap_or_else(|| "Authorization".to_string()),
                location: "header".to_string(),
                description: Some(
                    description
                        .clone()
                        .unwrap_or_else(|| "Custom authentication scheme".to_string()),
                ),
            }),
        }
    }

    /// Generate an operation ID from method and path
    fn generate_operation_id(endpoint: &Endpoint) -> String {
        // GET /users/{id}/posts -> get_users_id_posts
        let path_part = endpoint
            .path
            .trim_start_matches('/')
            .replace(['/', '-', '.'], "_")
            .replace(['{', '}'], "");

        if path_part.is_empty() {
            endpoint.method.as_lowercase().to_string()
        } else {
            format!("{}_{}", endpoint.method.as_lowercase(), path_part)
        }
    }
}

impl ApiTemplate {
    /// Export this template as an OpenAPI 3.0 document
    pub fn to_openapi(&self) -> OpenApiDocument {
        OpenApiExporter::export(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKeyLocation;
    use crate::types::HttpMethod;

    fn users_template() -> ApiTemplate {
        let mut get_user = Endpoint::new(HttpMethod::Get, "/users/{id}")
            .with_parameter(ParameterDefinition::new("id", ParameterLocation::Path))
            .with_parameter(
                ParameterDefinition::new("active", ParameterLocation::Query)
                    .with_type(ParameterType::Boolean),
            )
            .with_parameter(
                ParameterDefinition::new("X-Trace", ParameterLocation::Header)
                    .with_default(json!("on")),
            );
        get_user.name = Some("getUser".to_string());

        let create_user = Endpoint::new(HttpMethod::Post, "/users")
            .with_parameter(ParameterDefinition::new("name", ParameterLocation::Body).required(true))
            .with_parameter(
                ParameterDefinition::new("age", ParameterLocation::Body)
                    .with_type(ParameterType::Integer),
            );

        ApiTemplate::new("Users API", "https://api.example.com/")
            .with_endpoint(get_user)
            .with_endpoint(create_user)
            .with_authentication(AuthenticationDescriptor::bearer())
    }

    #[test]
    fn test_export_info_and_servers() {
        let doc = users_template().to_openapi();

        assert_eq!(doc.openapi, "3.0.3");
        assert_eq!(doc.info.title, "Users API");
        assert_eq!(doc.info.version, "1.0.0");
        assert_eq!(doc.servers[0].url, "https://api.example.com");
    }

    #[test]
    fn test_export_parameters() {
        let doc = users_template().to_openapi();
        let op = &doc.paths["/users/{id}"]["get"];

        assert_eq!(op.operation_id, "getUser");
        assert_eq!(op.parameters.len(), 3);

        let id = &op.parameters[0];
        assert_eq!(id.location, "path");
        assert!(id.required);
        assert_eq!(id.schema, json!({"type": "string"}));

        let active = &op.parameters[1];
        assert_eq!(active.location, "query");
        assert!(!active.required);
        assert_eq!(active.schema["type"], "boolean");

        let trace = &op.parameters[2];
        assert_eq!(trace.location, "header");
        assert_eq!(trace.schema["default"], "on");
    }

    #[test]
    fn test_export_request_body() {
        let doc = users_template().to_openapi();
        let op = &doc.paths["/users"]["post"];

        assert_eq!(op.operation_id, "post_users");
        assert!(op.parameters.is_empty());

        let body = op.request_body.as_ref().unwrap();
        assert!(body.required);
        let schema = &body.content["application/json"].schema;
        assert_eq!(schema["properties"]["age"]["type"], "integer");
        assert_eq!(schema["required"], json!(["name"]));
    }

    #[test]
    fn test_export_bearer_security() {
        let value = users_template().to_openapi().to_value().unwrap();

        assert_eq!(
            value["components"]["securitySchemes"]["bearerAuth"],
            json!({"type": "http", "scheme": "bearer"})
        );
        assert_eq!(value["security"], json!([{"bearerAuth": []}]));
    }

    #[test]
    fn test_export_api_key_security() {
        let template = users_template().with_authentication(AuthenticationDescriptor::ApiKey {
            header_name: "X-Token".to_string(),
            location: ApiKeyLocation::Header,
            query_param: "api_key".to_string(),
        });
        let value = template.to_openapi().to_value().unwrap();

        assert_eq!(
            value["components"]["securitySchemes"]["apiKeyAuth"],
            json!({"type": "apiKey", "name": "X-Token", "in": "header"})
        );
    }

    #[test]
    fn test_export_basic_and_custom_security() {
        let basic = users_template()
            .with_authentication(AuthenticationDescriptor::Basic)
            .to_openapi()
            .to_value()
            .unwrap();
        assert_eq!(
            basic["components"]["securitySchemes"]["basicAuth"]["scheme"],
            "basic"
        );

        let custom = users_template()
            .with_authentication(AuthenticationDescriptor::Custom {
                header_name: Some("X-Signature".to_string()),
                description: None,
            })
            .to_openapi()
            .to_value()
            .unwrap();
        let scheme = &custom["components"]["securitySchemes"]["customAuth"];
        assert_eq!(scheme["type"], "apiKey");
        assert_eq!(scheme["name"], "X-Signature");
    }

    #[test]
    fn test_export_oauth2_security() {
        let template = users_template().with_authentication(AuthenticationDescriptor::OAuth2 {
            authorization_url: Some("https://auth.example.com/authorize".to_string()),
            token_url: Some("https://auth.example.com/token".to_string()),
            scopes: vec!["users:read".to_string()],
        });
        let value = template.to_openapi().to_value().unwrap();

        let flow = &value["components"]["securitySchemes"]["oauth2Auth"]["flows"]["authorizationCode"];
        assert_eq!(flow["tokenUrl"], "https://auth.example.com/token");
        assert!(flow["scopes"].get("users:read").is_some());
        assert_eq!(value["security"], json!([{"oauth2Auth": ["users:read"]}]));
    }

    #[test]
    fn test_export_without_auth() {
        let template = users_template().with_authentication(AuthenticationDescriptor::None);
        let value = template.to_openapi().to_value().unwrap();

        assert!(value.get("components").is_none());
        assert!(value.get("security").is_none());
    }

    #[test]
    fn test_export_is_deterministic() {
        let template = users_template();
        let first = template.to_openapi().to_json_pretty().unwrap();
        let second = template.to_openapi().to_json_pretty().unwrap();
        assert_eq!(first, second);

        let yaml = template.to_openapi().to_yaml().unwrap();
        assert!(yaml.contains("openapi: 3.0.3"));
    }
}
