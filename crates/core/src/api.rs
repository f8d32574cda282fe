//! The API resource: user-declared spec plus backend-observed status.
//!
//! Every spec field is optional. Presence, not value, drives operation
//! selection: `Some(String::new())` is a present field.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::{Conditions, HasConditions};
use crate::tags::Tags;

/// Cross-origin settings for HTTP APIs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_headers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_origins: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_headers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
}

/// Desired state of an API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_selection_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basepath: Option<String>,
    /// Bulk API definition document (OpenAPI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_configuration: Option<Cors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_execute_api_endpoint: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_schema_validation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_warnings: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `HTTP` or `WEBSOCKET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_selection_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Spec field names, used in validation messages and delta paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecField {
    ApiKeySelectionExpression,
    Basepath,
    Body,
    CorsConfiguration,
    CredentialsArn,
    Description,
    DisableExecuteApiEndpoint,
    DisableSchemaValidation,
    FailOnWarnings,
    Name,
    ProtocolType,
    RouteKey,
    RouteSelectionExpression,
    Tags,
    Target,
    Version,
}

impl SpecField {
    /// Every spec field in declaration order.
    pub const ALL: [Self; 16] = [
        Self::ApiKeySelectionExpression,
        Self::Basepath,
        Self::Body,
        Self::CorsConfiguration,
        Self::CredentialsArn,
        Self::Description,
        Self::DisableExecuteApiEndpoint,
        Self::DisableSchemaValidation,
        Self::FailOnWarnings,
        Self::Name,
        Self::ProtocolType,
        Self::RouteKey,
        Self::RouteSelectionExpression,
        Self::Tags,
        Self::Target,
        Self::Version,
    ];

    /// Name as shown to users.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKeySelectionExpression => "APIKeySelectionExpression",
            Self::Basepath => "Basepath",
            Self::Body => "Body",
            Self::CorsConfiguration => "CORSConfiguration",
            Self::CredentialsArn => "CredentialsARN",
            Self::Description => "Description",
            Self::DisableExecuteApiEndpoint => "DisableExecuteAPIEndpoint",
            Self::DisableSchemaValidation => "DisableSchemaValidation",
            Self::FailOnWarnings => "FailOnWarnings",
            Self::Name => "Name",
            Self::ProtocolType => "ProtocolType",
            Self::RouteKey => "RouteKey",
            Self::RouteSelectionExpression => "RouteSelectionExpression",
            Self::Tags => "Tags",
            Self::Target => "Target",
            Self::Version => "Version",
        }
    }

    /// Whether `spec` sets this field. Empty tags count as absent.
    #[must_use]
    pub fn is_present(self, spec: &ApiSpec) -> bool {
        match self {
            Self::ApiKeySelectionExpression => spec.api_key_selection_expression.is_some(),
            Self::Basepath => spec.basepath.is_some(),
            Self::Body => spec.body.is_some(),
            Self::CorsConfiguration => spec.cors_configuration.is_some(),
            Self::CredentialsArn => spec.credentials_arn.is_some(),
            Self::Description => spec.description.is_some(),
            Self::DisableExecuteApiEndpoint => spec.disable_execute_api_endpoint.is_some(),
            Self::DisableSchemaValidation => spec.disable_schema_validation.is_some(),
            Self::FailOnWarnings => spec.fail_on_warnings.is_some(),
            Self::Name => spec.name.is_some(),
            Self::ProtocolType => spec.protocol_type.is_some(),
            Self::RouteKey => spec.route_key.is_some(),
            Self::RouteSelectionExpression => spec.route_selection_expression.is_some(),
            Self::Tags => !spec.tags.is_empty(),
            Self::Target => spec.target.is_some(),
            Self::Version => spec.version.is_some(),
        }
    }
}

impl fmt::Display for SpecField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ApiSpec {
    /// Fields this spec sets, in declaration order.
    #[must_use]
    pub fn present_fields(&self) -> Vec<SpecField> {
        SpecField::ALL
            .into_iter()
            .filter(|field| field.is_present(self))
            .collect()
    }
}

/// Backend-observed state of an API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_gateway_managed: Option<bool>,
    /// Backend-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_info: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Generation last applied to the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Conditions,
}

impl ApiStatus {
    /// Status for a resource whose backend counterpart is gone. Everything
    /// the backend assigned is dropped; conditions are kept.
    #[must_use]
    pub fn without_backend_state(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            ..Self::default()
        }
    }
}

/// Identity of a resource instance in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub generation: i64,
    /// Set once deletion of the resource has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// An API custom resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Api {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApiSpec,
    #[serde(default)]
    pub status: ApiStatus,
}

impl Api {
    /// Create an API resource with the given name and namespace.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: ApiSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..ObjectMeta::default()
            },
            spec,
            status: ApiStatus::default(),
        }
    }

    /// Backend identifier, if one has been assigned.
    #[must_use]
    pub fn api_id(&self) -> Option<&str> {
        self.status.api_id.as_deref()
    }

    /// Whether deletion has been requested.
    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// `namespace/name`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

impl HasConditions for Api {
    fn conditions(&self) -> &Conditions {
        &self.status.conditions
    }

    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.status.conditions
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::condition::{ConditionStatus, ConditionType};

    #[test]
    fn test_present_fields_follow_declaration_order() {
        let spec = ApiSpec {
            version: Some("v1".into()),
            body: Some("{}".into()),
            name: Some(String::new()),
            ..ApiSpec::default()
        };
        assert_eq!(
            spec.present_fields(),
            vec![SpecField::Body, SpecField::Name, SpecField::Version]
        );
    }

    #[test]
    fn test_empty_tags_count_as_absent() {
        let spec = ApiSpec::default();
        assert!(!SpecField::Tags.is_present(&spec));
        assert!(spec.present_fields().is_empty());
    }

    #[test]
    fn test_spec_round_trips_through_json() {
        let raw = r#"{"name":"pets","protocolType":"HTTP","tags":{"team":"api"}}"#;
        let spec: ApiSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.name.as_deref(), Some("pets"));
        assert_eq!(spec.tags.value("team"), Some("api"));
        assert!(spec.body.is_none());
    }

    #[test]
    fn test_without_backend_state_keeps_conditions() {
        let mut status = ApiStatus {
            api_id: Some("gone".into()),
            arn: Some("arn:aws:apigatewayv2:us-west-2:1:/apis/gone".into()),
            observed_generation: Some(3),
            ..ApiStatus::default()
        };
        status.conditions.set(
            ConditionType::Synced,
            ConditionStatus::False,
            Some("boom"),
            None,
            Utc::now(),
        );

        let cleared = status.without_backend_state();

        assert!(cleared.api_id.is_none());
        assert!(cleared.arn.is_none());
        assert!(cleared.observed_generation.is_none());
        assert_eq!(cleared.conditions, status.conditions);
    }

    #[test]
    fn test_key_joins_namespace_and_name() {
        let api = Api::new("pets", "prod", ApiSpec::default());
        assert_eq!(api.key(), "prod/pets");
        assert!(api.api_id().is_none());
    }
}
