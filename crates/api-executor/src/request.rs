//! Build concrete HTTP requests from a template endpoint and caller input
//!
//! Nothing here performs I/O. Identical inputs always give an identical URL
//! and header set.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ExecutorError, Result};
use crate::headers::HeaderSet;
use api_template::{path_placeholders, ApiTemplate, Endpoint, HttpMethod, ParameterLocation};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

const REDACTED: &str = "REDACTED";

/// Request payload after content negotiation
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Already url-encoded
    Form(String),
}

/// Fully resolved request, ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderSet,
    pub body: Option<RequestBody>,
    /// Query parameter names whose values must not be shown
    sensitive_query: Vec<String>,
}

impl BuiltRequest {
    pub fn new(method: HttpMethod, url: String, headers: HeaderSet) -> Self {
        Self {
            method,
            url,
            headers,
            body: None,
            sensitive_query: Vec::new(),
        }
    }

    /// Append a query parameter carrying a secret
    pub fn append_secret_query(&mut self, name: &str, value: &str) {
        append_query(&mut self.url, &[(name.to_string(), value.to_string())]);
        self.sensitive_query.push(name.to_string());
    }

    /// URL safe to log or return, secret query values replaced
    pub fn display_url(&self) -> String {
        if self.sensitive_query.is_empty() {
            return self.url.clone();
        }

        let Some((base, query)) = self.url.split_once('?') else {
            return self.url.clone();
        };

        let pairs: Vec<String> = query
            .split('&')
            .map(|pair| {
                let name = pair.split('=').next().unwrap_or_default();
                let decoded = urlencoding::decode(name).map(|n| n.into_owned());
                match decoded {
                    Ok(n) if self.sensitive_query.contains(&n) => format!("{}={}", name, REDACTED),
                    _ => pair.to_string(),
                }
            })
            .collect();

        format!("{}?{}", base, pairs.join("&"))
    }
}

/// Render a parameter value for a path segment or query string.
///
/// `null` yields nothing; arrays are comma-joined; objects become JSON.
fn param_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(param_to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

fn append_query(url: &mut String, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        return;
    }
    // serde_urlencoded cannot fail on a list of string pairs
    let query = serde_urlencoded::to_string(pairs).unwrap_or_default();
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&query);
}

/// Join `base_url` and `path`, substitute `{name}` placeholders from
/// `params` and append every other param as the query string.
pub fn build_url(base_url: &str, path: &str, params: &Map<String, Value>) -> String {
    let mut resolved = String::with_capacity(base_url.len() + path.len());
    resolved.push_str(base_url.trim_end_matches('/'));
    if !path.starts_with('/') {
        resolved.push('/');
    }

    let placeholders = path_placeholders(path);
    let mut path = path.to_string();

    for name in &placeholders {
        match params.get(*name).and_then(param_to_string) {
            Some(value) => {
                path = path.replace(&format!("{{{}}}", name), &urlencoding::encode(&value));
            }
            None => warn!("Unresolved path placeholder {{{}}}", name),
        }
    }
    resolved.push_str(&path);

    let query: Vec<(String, String)> = params
        .iter()
        .filter(|(name, _)| !placeholders.contains(&name.as_str()))
        .filter_map(|(name, value)| param_to_string(value).map(|v| (name.clone(), v)))
        .collect();
    append_query(&mut resolved, &query);

    resolved
}

/// Layer template defaults, endpoint header defaults and caller headers.
/// The caller always wins.
pub fn build_headers(
    template: &ApiTemplate,
    endpoint: &Endpoint,
    caller: &IndexMap<String, String>,
) -> HeaderSet {
    let mut headers = HeaderSet::new();
    headers.extend(&template.default_headers);

    for param in endpoint.parameters_in(ParameterLocation::Header) {
        if let Some(value) = param.default.as_ref().and_then(param_to_string) {
            headers.insert(param.name.clone(), value);
        }
    }

    headers.extend(caller);

    if endpoint.method.has_body() && !headers.contains(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, JSON_CONTENT_TYPE);
    }

    headers
}

/// Encode the body according to the resolved Content-Type
pub fn build_body(
    method: HttpMethod,
    headers: &HeaderSet,
    body: Option<&Value>,
) -> Result<Option<RequestBody>> {
    let Some(body) = body else {
        return Ok(None);
    };

    let empty = match body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Ok(None);
    }

    if !method.has_body() {
        debug!("Ignoring body for {} request", method);
        return Ok(None);
    }

    let is_form = headers
        .get(CONTENT_TYPE)
        .map(|ct| ct.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false);

    if !is_form {
        return Ok(Some(RequestBody::Json(body.clone())));
    }

    let Value::Object(fields) = body else {
        return Err(ExecutorError::InvalidRequest(
            "form-encoded body must be an object".to_string(),
        ));
    };

    let pairs: Vec<(String, String)> = fields
        .iter()
        .filter_map(|(name, value)| param_to_string(value).map(|v| (name.clone(), v)))
        .collect();
    let encoded = serde_urlencoded::to_string(&pairs)
        .map_err(|e| ExecutorError::InvalidRequest(e.to_string()))?;

    Ok(Some(RequestBody::Form(encoded)))
}

/// Build the complete request for `endpoint` of `template`
pub fn build_request(
    template: &ApiTemplate,
    endpoint: &Endpoint,
    params: &Map<String, Value>,
    headers: &IndexMap<String, String>,
    body: Option<&Value>,
) -> Result<BuiltRequest> {
    let url = build_url(&template.base_url, &endpoint.path, params);
    let headers = build_headers(template, endpoint, headers);
    let body = build_body(endpoint.method, &headers, body)?;

    let mut request = BuiltRequest::new(endpoint.method, url, headers);
    request.body = body;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_template::ParameterDefinition;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn test_build_url_example() {
        let url = build_url(
            "https://api.example.com",
            "/users/{id}",
            &params(json!({"id": "42", "active": "true"})),
        );
        assert_eq!(url, "https://api.example.com/users/42?active=true");
    }

    #[test]
    fn test_build_url_is_deterministic() {
        let p = params(json!({"id": 7, "b": "2", "a": "1", "tags": ["x", "y"]}));
        let first = build_url("https://api.example.com/", "/items/{id}", &p);
        let second = build_url("https://api.example.com/", "/items/{id}", &p);

        assert_eq!(first, second);
        assert!(first.starts_with("https://api.example.com/items/7?"));
        assert!(first.contains("tags=x%2Cy"));
    }

    #[test]
    fn test_path_param_never_in_query() {
        let url = build_url(
            "https://api.example.com",
            "/orgs/{org}/users/{id}",
            &params(json!({"org": "acme", "id": "1", "q": "x"})),
        );
        assert_eq!(url, "https://api.example.com/orgs/acme/users/1?q=x");
    }

    #[test]
    fn test_path_values_are_encoded() {
        let url = build_url(
            "https://api.example.com",
            "/files/{name}",
            &params(json!({"name": "a b/c"})),
        );
        assert_eq!(url, "https://api.example.com/files/a%20b%2Fc");
    }

    #[test]
    fn test_missing_leading_slash_and_unresolved_placeholder() {
        let url = build_url("https://api.example.com", "users/{id}", &Map::new());
        assert_eq!(url, "https://api.example.com/users/{id}");
    }

    #[test]
    fn test_null_params_skipped() {
        let url = build_url(
            "https://api.example.com",
            "/search",
            &params(json!({"q": "rust", "page": null})),
        );
        assert_eq!(url, "https://api.example.com/search?q=rust");
    }

    #[test]
    fn test_header_precedence() {
        let template = ApiTemplate::new("T", "https://api.example.com")
            .with_default_header("Accept", "text/plain")
            .with_default_header("X-Client", "vault");
        let endpoint = Endpoint::new(HttpMethod::Get, "/").with_parameter(
            ParameterDefinition::new("X-Client", ParameterLocation::Header)
                .with_default(json!("endpoint")),
        );

        let mut caller = IndexMap::new();
        caller.insert("accept".to_string(), "application/json".to_string());

        let headers = build_headers(&template, &endpoint, &caller);
        assert_eq!(headers.get("Accept"), Some("application/json"));
        assert_eq!(headers.get("X-Client"), Some("endpoint"));
        assert!(!headers.contains(CONTENT_TYPE));

        caller.insert("X-Client".to_string(), "caller".to_string());
        let headers = build_headers(&template, &endpoint, &caller);
        assert_eq!(headers.get("x-client"), Some("caller"));
    }

    #[test]
    fn test_default_content_type_for_body_methods() {
        let template = ApiTemplate::new("T", "https://api.example.com");
        let endpoint = Endpoint::new(HttpMethod::Post, "/users");

        let headers = build_headers(&template, &endpoint, &IndexMap::new());
        assert_eq!(headers.get("content-type"), Some(JSON_CONTENT_TYPE));
    }

    #[test]
    fn test_form_body() {
        let mut headers = HeaderSet::new();
        headers.insert(CONTENT_TYPE, FORM_CONTENT_TYPE);

        let body = build_body(
            HttpMethod::Post,
            &headers,
            Some(&json!({"grant_type": "client_credentials", "scope": "a b"})),
        )
        .unwrap();

        assert_eq!(
            body,
            Some(RequestBody::Form(
                "grant_type=client_credentials&scope=a+b".to_string()
            ))
        );
    }

    #[test]
    fn test_form_body_must_be_object() {
        let mut headers = HeaderSet::new();
        headers.insert(CONTENT_TYPE, FORM_CONTENT_TYPE);

        let result = build_body(HttpMethod::Put, &headers, Some(&json!(["a"])));
        assert!(matches!(result, Err(ExecutorError::InvalidRequest(_))));
    }

    #[test]
    fn test_json_body_and_ignored_cases() {
        let headers = HeaderSet::new();
        let body = json!({"name": "Ada"});

        assert_eq!(
            build_body(HttpMethod::Patch, &headers, Some(&body)).unwrap(),
            Some(RequestBody::Json(body.clone()))
        );
        assert_eq!(build_body(HttpMethod::Get, &headers, Some(&body)).unwrap(), None);
        assert_eq!(build_body(HttpMethod::Post, &headers, Some(&json!({}))).unwrap(), None);
    }

    #[test]
    fn test_display_url_redacts_secret_query() {
        let mut request = BuiltRequest::new(
            HttpMethod::Get,
            "https://api.example.com/data?page=2".to_string(),
            HeaderSet::new(),
        );
        request.append_secret_query("api_key", "sk_live_abc");

        assert_eq!(request.url, "https://api.example.com/data?page=2&api_key=sk_live_abc");
        assert_eq!(
            request.display_url(),
            "https://api.example.com/data?page=2&api_key=REDACTED"
        );
    }
}
