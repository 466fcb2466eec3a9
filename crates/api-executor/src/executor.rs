//! Execute template endpoints against upstream APIs

use chrono::Utc;
use indexmap::IndexMap;
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{ApplyAuth, PreparedTemplate};
use crate::envelope::{ExecutionResult, SuccessEnvelope, SuccessMeta};
use crate::error::{ExecutorError, Result};
use crate::request::{build_request, BuiltRequest, RequestBody, CONTENT_TYPE};
use api_template::{ApiTemplate, Endpoint, HttpMethod};
use vault_core::{CredentialMaterial, CredentialVault, Settings, VaultError, DEFAULT_TIMEOUT_MS};

/// Which endpoint of the template to call
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointSelector {
    Route { method: HttpMethod, path: String },
    Name(String),
}

impl EndpointSelector {
    pub fn route(method: HttpMethod, path: &str) -> Self {
        EndpointSelector::Route {
            method,
            path: path.to_string(),
        }
    }

    fn resolve<'a>(&self, template: &'a ApiTemplate) -> Result<&'a Endpoint> {
        let endpoint = match self {
            EndpointSelector::Route { method, path } => template.find_endpoint(*method, path),
            EndpointSelector::Name(name) => template.find_endpoint_by_name(name),
        };
        endpoint.ok_or_else(|| {
            ExecutorError::InvalidRequest(format!(
                "template {} has no endpoint {}",
                template.name, self
            ))
        })
    }
}

impl std::fmt::Display for EndpointSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointSelector::Route { method, path } => write!(f, "{} {}", method, path),
            EndpointSelector::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Caller input for one execution
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub endpoint: EndpointSelector,
    pub params: Map<String, Value>,
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
    pub credential_id: Option<Uuid>,
}

impl ExecutionRequest {
    pub fn new(endpoint: EndpointSelector) -> Self {
        Self {
            endpoint,
            params: Map::new(),
            headers: IndexMap::new(),
            body: None,
            credential_id: None,
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_credential(mut self, credential_id: Uuid) -> Self {
        self.credential_id = Some(credential_id);
        self
    }
}

/// Builds, authenticates and sends template requests
pub struct ApiExecutor {
    vault: Arc<CredentialVault>,
    client: Client,
    default_timeout: Duration,
}

impl ApiExecutor {
    pub fn new(vault: Arc<CredentialVault>, settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ExecutorError::Client(e.to_string()))?;

        let default_timeout = match settings.default_timeout_ms {
            0 => Duration::from_millis(DEFAULT_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        };

        Ok(Self {
            vault,
            client,
            default_timeout,
        })
    }

    /// Execute a request. Never fails: every outcome is an envelope.
    pub async fn execute(
        &self,
        template: &PreparedTemplate,
        request: ExecutionRequest,
    ) -> ExecutionResult {
        match self.try_execute(template, request).await {
            Ok(envelope) => envelope.into(),
            Err(e) => {
                warn!("Execution against {} failed: {}", template.template.name, e);
                e.into()
            }
        }
    }

    async fn try_execute(
        &self,
        template: &PreparedTemplate,
        request: ExecutionRequest,
    ) -> Result<SuccessEnvelope> {
        let endpoint = request.endpoint.resolve(&template.template)?;

        let mut built = build_request(
            &template.template,
            endpoint,
            &request.params,
            &request.headers,
            request.body.as_ref(),
        )?;

        if let Some(credential_id) = request.credential_id {
            let material = self.load_credential(credential_id).await?;
            template.auth.apply_to(&mut built, &material)?;
        }

        let timeout = self.resolve_timeout(&template.template, endpoint);
        self.send(built, timeout).await
    }

    async fn load_credential(&self, credential_id: Uuid) -> Result<CredentialMaterial> {
        match self.vault.decrypt_credentials(credential_id).await {
            Ok(Some(material)) => Ok(material),
            Ok(None) => Err(ExecutorError::Authentication(format!(
                "credential {} could not be decrypted",
                credential_id
            ))),
            Err(VaultError::CredentialNotFound(id)) => Err(ExecutorError::CredentialNotFound(id)),
            Err(e) => Err(ExecutorError::Authentication(e.to_string())),
        }
    }

    /// Endpoint timeout, then template default, then settings
    fn resolve_timeout(&self, template: &ApiTemplate, endpoint: &Endpoint) -> Duration {
        let positive = |ms: &u64| *ms > 0;
        endpoint
            .timeout_ms
            .filter(positive)
            .or(template.default_timeout_ms.filter(positive))
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }

    async fn send(&self, built: BuiltRequest, timeout: Duration) -> Result<SuccessEnvelope> {
        let method = built.method;
        let display_url = built.display_url();

        let mut request = self
            .client
            .request(to_reqwest_method(method), &built.url)
            .timeout(timeout);

        for (name, value) in built.headers.iter() {
            request = request.header(name, value);
        }

        match built.body {
            Some(RequestBody::Json(body)) => {
                // the Content-Type header set by the builder is kept
                let payload = serde_json::to_vec(&body)
                    .map_err(|e| ExecutorError::InvalidRequest(e.to_string()))?;
                request = request.body(payload);
            }
            Some(RequestBody::Form(encoded)) => request = request.body(encoded),
            None => {}
        }

        info!("Executing {} {}", method, display_url);
        debug!(
            "Request headers: {:?}, content type: {:?}",
            built.headers.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            built.headers.get(CONTENT_TYPE)
        );

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ExecutorError::from_transport(e, timeout))?;

        let status = response.status();
        let headers = response_headers(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutorError::Timeout(timeout)
                } else {
                    ExecutorError::ResponseRead(e.without_url().to_string())
                }
            })?;
        let elapsed = started.elapsed();

        debug!(
            "Response {} from {} in {}ms",
            status,
            display_url,
            elapsed.as_millis()
        );

        let data = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(SuccessEnvelope {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            data,
            meta: SuccessMeta {
                url: display_url,
                method: method.to_string(),
                response_time: elapsed.as_millis() as u64,
                timestamp: Utc::now(),
            },
        })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

/// Flatten response headers; repeated headers are comma-joined
fn response_headers(headers: &reqwest::header::HeaderMap) -> IndexMap<String, String> {
    let mut flattened: IndexMap<String, String> = IndexMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        flattened
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    flattened
}
