//! Backend client contract.
//!
//! The reconciler talks to the gateway service only through [`ApiBackend`].
//! Requests and responses are plain data; [`crate::mapping`] converts them
//! to and from the resource model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatewayctl_core::Cors;
use indexmap::IndexMap;

use crate::error::BackendError;

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Settings shared by the create and update requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiAttributes {
    pub api_key_selection_expression: Option<String>,
    pub cors_configuration: Option<Cors>,
    pub credentials_arn: Option<String>,
    pub description: Option<String>,
    pub disable_execute_api_endpoint: Option<bool>,
    pub disable_schema_validation: Option<bool>,
    pub name: Option<String>,
    pub route_key: Option<String>,
    pub route_selection_expression: Option<String>,
    pub target: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateApiInput {
    pub protocol_type: Option<String>,
    pub attributes: ApiAttributes,
    pub tags: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateApiInput {
    pub api_id: Option<String>,
    pub attributes: ApiAttributes,
    /// Full desired tag set; `None` leaves tags untouched.
    pub tags: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportApiInput {
    pub body: Option<String>,
    pub basepath: Option<String>,
    pub fail_on_warnings: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReimportApiInput {
    pub api_id: String,
    pub body: Option<String>,
    pub basepath: Option<String>,
    pub fail_on_warnings: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetApiInput {
    pub api_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteApiInput {
    pub api_id: String,
}

/// API description returned by create, get, update, import and reimport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiOutput {
    pub api_endpoint: Option<String>,
    pub api_gateway_managed: Option<bool>,
    pub api_id: Option<String>,
    pub api_key_selection_expression: Option<String>,
    pub cors_configuration: Option<Cors>,
    pub created_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub disable_execute_api_endpoint: Option<bool>,
    pub disable_schema_validation: Option<bool>,
    pub import_info: Option<Vec<String>>,
    pub name: Option<String>,
    pub protocol_type: Option<String>,
    pub route_selection_expression: Option<String>,
    pub tags: Option<IndexMap<String, String>>,
    pub version: Option<String>,
    pub warnings: Option<Vec<String>>,
}

/// Verbs of the gateway service used by the reconciler.
#[async_trait]
pub trait ApiBackend: Send + Sync {
    async fn create(&self, input: CreateApiInput) -> BackendResult<ApiOutput>;

    async fn read(&self, input: GetApiInput) -> BackendResult<ApiOutput>;

    async fn update(&self, input: UpdateApiInput) -> BackendResult<ApiOutput>;

    async fn delete(&self, input: DeleteApiInput) -> BackendResult<()>;

    async fn import(&self, input: ImportApiInput) -> BackendResult<ApiOutput>;

    async fn reimport(&self, input: ReimportApiInput) -> BackendResult<ApiOutput>;
}
