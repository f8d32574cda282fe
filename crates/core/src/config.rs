//! Controller configuration.
//!
//! Built once at startup and handed to the resource manager by value.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ObjectMeta;
use crate::error::{Error, Result};
use crate::tags::{Provenance, Tags};

const PLACEHOLDER_SERVICE: &str = "%CONTROLLER_SERVICE%";
const PLACEHOLDER_VERSION: &str = "%CONTROLLER_VERSION%";
const PLACEHOLDER_NAMESPACE: &str = "%K8S_NAMESPACE%";
const PLACEHOLDER_RESOURCE_NAME: &str = "%K8S_RESOURCE_NAME%";

/// Spec fields the backend may fill with defaults when the user leaves them
/// unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateInitField {
    ApiKeySelectionExpression,
    RouteSelectionExpression,
    DisableExecuteApiEndpoint,
    Description,
    Version,
}

/// Configuration for the gateway API controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Account that owns the managed resources.
    #[serde(default)]
    pub account_id: String,

    /// Region the controller targets.
    #[serde(default)]
    pub region: String,

    /// Service alias used in ARNs and default tags.
    #[serde(default = "default_controller_service")]
    pub controller_service: String,

    #[serde(default = "default_controller_version")]
    pub controller_version: String,

    /// Tags injected into every resource, in order. Values may use the
    /// `%CONTROLLER_SERVICE%`, `%CONTROLLER_VERSION%`, `%K8S_NAMESPACE%`
    /// and `%K8S_RESOURCE_NAME%` placeholders.
    #[serde(default = "default_tags")]
    pub default_tags: IndexMap<String, String>,

    /// Key prefix of tags the backend injects out-of-band.
    #[serde(default = "default_system_tag_prefix")]
    pub system_tag_prefix: String,

    /// Fields discovered from the backend after creation.
    #[serde(default)]
    pub late_init_fields: Vec<LateInitField>,

    /// Backend error codes treated as terminal on top of the built-in table.
    #[serde(default)]
    pub terminal_codes: Vec<String>,
}

fn default_controller_service() -> String {
    "apigatewayv2".to_string()
}

fn default_controller_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_tags() -> IndexMap<String, String> {
    IndexMap::from([
        (
            "services.k8s.aws/controller-version".to_string(),
            format!("{PLACEHOLDER_SERVICE}-{PLACEHOLDER_VERSION}"),
        ),
        (
            "services.k8s.aws/namespace".to_string(),
            PLACEHOLDER_NAMESPACE.to_string(),
        ),
    ])
}

fn default_system_tag_prefix() -> String {
    "aws:".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            region: String::new(),
            controller_service: default_controller_service(),
            controller_version: default_controller_version(),
            default_tags: default_tags(),
            system_tag_prefix: default_system_tag_prefix(),
            late_init_fields: Vec::new(),
            terminal_codes: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Create a config for the given account and region.
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            ..Default::default()
        }
    }

    /// Set the late-initialized fields.
    #[must_use]
    pub fn late_init_fields(mut self, fields: impl IntoIterator<Item = LateInitField>) -> Self {
        self.late_init_fields = fields.into_iter().collect();
        self
    }

    /// Replace the default tag set.
    #[must_use]
    pub fn default_tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.default_tags = tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Add backend error codes that must be treated as terminal.
    #[must_use]
    pub fn terminal_codes(mut self, codes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.terminal_codes
            .extend(codes.into_iter().map(Into::into));
        self
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlParseFailed` on malformed input and
    /// `Error::InvalidConfig` when validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config = Self::parse(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::toml_parse_failed(e.to_string()))
    }

    /// Load and validate a TOML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileReadFailed` when the file cannot be read, plus
    /// the errors of [`Self::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        debug!(path = %path.display(), "Loaded controller configuration");
        let config = Self::parse(&raw)?.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `GATEWAYCTL_*` environment variables.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(account) = std::env::var("GATEWAYCTL_ACCOUNT_ID") {
            self.account_id = account;
        }

        if let Ok(region) = std::env::var("GATEWAYCTL_REGION") {
            self.region = region;
        }

        if let Ok(prefix) = std::env::var("GATEWAYCTL_SYSTEM_TAG_PREFIX") {
            self.system_tag_prefix = prefix;
        }

        if let Ok(version) = std::env::var("GATEWAYCTL_CONTROLLER_VERSION") {
            self.controller_version = version;
        }

        self
    }

    /// Check the fields every reconcile depends on.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(Error::invalid_config("account_id must not be empty"));
        }
        if self.region.trim().is_empty() {
            return Err(Error::invalid_config("region must not be empty"));
        }
        if self.system_tag_prefix.is_empty() {
            return Err(Error::invalid_config("system_tag_prefix must not be empty"));
        }
        Ok(())
    }

    /// Resolve the default tags for one resource.
    #[must_use]
    pub fn resolve_default_tags(&self, meta: &ObjectMeta) -> Tags {
        let pairs = self.default_tags.iter().map(|(key, template)| {
            let value = template
                .replace(PLACEHOLDER_SERVICE, &self.controller_service)
                .replace(PLACEHOLDER_VERSION, &self.controller_version)
                .replace(PLACEHOLDER_NAMESPACE, &meta.namespace)
                .replace(PLACEHOLDER_RESOURCE_NAME, &meta.name);
            (key.clone(), value)
        });
        Tags::from_pairs(pairs, Provenance::ControllerDefault)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.controller_service, "apigatewayv2");
        assert_eq!(config.system_tag_prefix, "aws:");
        assert!(config.late_init_fields.is_empty());
        assert_eq!(config.default_tags.len(), 2);
    }

    #[test]
    fn test_validate_requires_account_and_region() {
        assert!(ControllerConfig::default().validate().is_err());
        assert!(ControllerConfig::new("123456789012", "").validate().is_err());
        assert!(ControllerConfig::new("123456789012", "us-west-2").validate().is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let raw = r#"
            account_id = "123456789012"
            region = "eu-central-1"
            late_init_fields = ["route_selection_expression", "version"]
            terminal_codes = ["LimitExceededException"]

            [default_tags]
            "owner" = "%K8S_NAMESPACE%"
        "#;
        let config = ControllerConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(
            config.late_init_fields,
            vec![LateInitField::RouteSelectionExpression, LateInitField::Version]
        );
        assert_eq!(config.terminal_codes, vec!["LimitExceededException"]);
        assert_eq!(config.default_tags.len(), 1);
    }

    #[test]
    fn test_from_toml_str_rejects_garbage() {
        let err = ControllerConfig::from_toml_str("account_id = [").unwrap_err();
        assert!(matches!(err, Error::TomlParseFailed { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "account_id = \"1\"\nregion = \"us-east-1\"").unwrap();
        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.account_id, "1");
    }

    #[test]
    fn test_from_file_missing() {
        let err = ControllerConfig::from_file("/nonexistent/gatewayctl.toml").unwrap_err();
        assert!(matches!(err, Error::FileReadFailed { .. }));
    }

    #[test]
    fn test_resolve_default_tags() {
        let config = ControllerConfig {
            controller_version: "1.2.3".into(),
            ..ControllerConfig::new("1", "us-east-1")
        }
        .default_tags([
            ("managed-by", "%CONTROLLER_SERVICE%-%CONTROLLER_VERSION%"),
            ("origin", "%K8S_NAMESPACE%/%K8S_RESOURCE_NAME%"),
        ]);
        let meta = ObjectMeta {
            name: "pets".into(),
            namespace: "prod".into(),
            ..ObjectMeta::default()
        };

        let tags = config.resolve_default_tags(&meta);
        assert_eq!(tags.keys().collect::<Vec<_>>(), vec!["managed-by", "origin"]);
        assert_eq!(tags.value("managed-by"), Some("apigatewayv2-1.2.3"));
        assert_eq!(tags.value("origin"), Some("prod/pets"));
        assert!(tags.iter().all(|(_, t)| t.provenance == Provenance::ControllerDefault));
    }
}
