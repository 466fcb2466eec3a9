//! Authoring-time validation of templates

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

use crate::error::{TemplateError, TemplateResult};
use crate::types::{ApiTemplate, Endpoint, ParameterLocation};

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}/]+)\}").expect("placeholder pattern is valid"))
}

/// Names of the `{param}` placeholders in a path, in order of appearance
pub fn path_placeholders(path: &str) -> Vec<&str> {
    placeholder_regex()
        .captures_iter(path)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Validates templates before they are stored
pub struct TemplateValidator;

impl TemplateValidator {
    /// Check every template-level and endpoint-level invariant
    pub fn validate(template: &ApiTemplate) -> TemplateResult<()> {
        if template.name.trim().is_empty() {
            return Err(TemplateError::MissingField("name".to_string()));
        }

        Self::validate_base_url(&template.base_url)?;

        let mut seen = HashSet::new();
        for endpoint in &template.endpoints {
            Self::validate_endpoint(endpoint)?;

            if !seen.insert((endpoint.method, endpoint.path.as_str())) {
                return Err(TemplateError::DuplicateEndpoint {
                    method: endpoint.method.to_string(),
                    path: endpoint.path.clone(),
                });
            }
        }

        Ok(())
    }

    fn validate_base_url(base_url: &str) -> TemplateResult<()> {
        if base_url.trim().is_empty() {
            return Err(TemplateError::MissingField("baseUrl".to_string()));
        }

        let url = Url::parse(base_url)
            .map_err(|e| TemplateError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(TemplateError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                base_url, other
            ))),
        }
    }

    fn validate_endpoint(endpoint: &Endpoint) -> TemplateResult<()> {
        let invalid = |reason: String| TemplateError::InvalidEndpoint {
            endpoint: endpoint.label(),
            reason,
        };

        if !endpoint.path.starts_with('/') {
            return Err(invalid("path must start with '/'".to_string()));
        }

        let placeholders = path_placeholders(&endpoint.path);
        let mut names = HashSet::new();

        for param in &endpoint.parameters {
            if param.name.trim().is_empty() {
                return Err(invalid("parameter without a name".to_string()));
            }
            if !names.insert(param.name.as_str()) {
                return Err(invalid(format!("duplicate parameter {}", param.name)));
            }
            if param.location == ParameterLocation::Path
                && !placeholders.contains(&param.name.as_str())
            {
                return Err(invalid(format!(
                    "path parameter {} has no {{{}}} placeholder",
                    param.name, param.name
                )));
            }
        }

        Ok(())
    }
}

impl ApiTemplate {
    /// Validate this template, see [`TemplateValidator::validate`]
    pub fn validate(&self) -> TemplateResult<()> {
        TemplateValidator::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HttpMethod, ParameterDefinition};

    fn template() -> ApiTemplate {
        ApiTemplate::new("Users", "https://api.example.com").with_endpoint(
            Endpoint::new(HttpMethod::Get, "/users/{id}")
                .with_parameter(ParameterDefinition::new("id", ParameterLocation::Path)),
        )
    }

    #[test]
    fn test_valid_template() {
        assert!(template().validate().is_ok());
    }

    #[test]
    fn test_path_placeholders() {
        assert_eq!(
            path_placeholders("/orgs/{org}/repos/{repo}"),
            vec!["org", "repo"]
        );
        assert!(path_placeholders("/health").is_empty());
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let template = template().with_endpoint(Endpoint::new(HttpMethod::Get, "/users/{id}"));

        match template.validate() {
            Err(TemplateError::DuplicateEndpoint { method, path }) => {
                assert_eq!(method, "GET");
                assert_eq!(path, "/users/{id}");
            }
            other => panic!("Expected duplicate endpoint error, got {:?}", other),
        }
    }

    #[test]
    fn test_same_path_different_method_allowed() {
        let template = template().with_endpoint(Endpoint::new(HttpMethod::Delete, "/users/{id}"));
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut no_name = template();
        no_name.name = "  ".to_string();
        assert!(matches!(no_name.validate(), Err(TemplateError::MissingField(_))));

        let mut no_url = template();
        no_url.base_url = String::new();
        assert!(matches!(no_url.validate(), Err(TemplateError::MissingField(_))));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let mut bad = template();
        bad.base_url = "ftp://files.example.com".to_string();
        assert!(matches!(bad.validate(), Err(TemplateError::InvalidUrl(_))));

        bad.base_url = "not a url".to_string();
        assert!(matches!(bad.validate(), Err(TemplateError::InvalidUrl(_))));
    }

    #[test]
    fn test_path_parameter_without_placeholder_rejected() {
        let template = ApiTemplate::new("Users", "https://api.example.com").with_endpoint(
            Endpoint::new(HttpMethod::Get, "/users")
                .with_parameter(ParameterDefinition::new("id", ParameterLocation::Path)),
        );
        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_relative_path_rejected() {
        let template = ApiTemplate::new("Users", "https://api.example.com")
            .with_endpoint(Endpoint::new(HttpMethod::Get, "users"));
        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidEndpoint { .. })
        ));
    }
}
