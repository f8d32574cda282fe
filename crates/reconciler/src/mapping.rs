//! Field mapping between the resource model and backend requests/responses.
//!
//! Pure and total: no decisions are made here.

use gatewayctl_core::{Api, ApiSpec, ApiStatus, Provenance, Tags};
use indexmap::IndexMap;

use crate::backend::{
    ApiAttributes, ApiOutput, CreateApiInput, DeleteApiInput, GetApiInput, ImportApiInput,
    ReimportApiInput, UpdateApiInput,
};

fn tag_pairs(tags: &Tags) -> IndexMap<String, String> {
    tags.pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn attributes(spec: &ApiSpec) -> ApiAttributes {
    ApiAttributes {
        api_key_selection_expression: spec.api_key_selection_expression.clone(),
        cors_configuration: spec.cors_configuration.clone(),
        credentials_arn: spec.credentials_arn.clone(),
        description: spec.description.clone(),
        disable_execute_api_endpoint: spec.disable_execute_api_endpoint,
        disable_schema_validation: spec.disable_schema_validation,
        name: spec.name.clone(),
        route_key: spec.route_key.clone(),
        route_selection_expression: spec.route_selection_expression.clone(),
        target: spec.target.clone(),
        version: spec.version.clone(),
    }
}

#[must_use]
pub fn create_input(spec: &ApiSpec) -> CreateApiInput {
    CreateApiInput {
        protocol_type: spec.protocol_type.clone(),
        attributes: attributes(spec),
        tags: tag_pairs(&spec.tags),
    }
}

#[must_use]
pub fn update_input(api: &Api) -> UpdateApiInput {
    UpdateApiInput {
        api_id: api.status.api_id.clone(),
        attributes: attributes(&api.spec),
        tags: (!api.spec.tags.is_empty()).then(|| tag_pairs(&api.spec.tags)),
    }
}

#[must_use]
pub fn import_input(spec: &ApiSpec) -> ImportApiInput {
    ImportApiInput {
        body: spec.body.clone(),
        basepath: spec.basepath.clone(),
        fail_on_warnings: spec.fail_on_warnings,
    }
}

#[must_use]
pub fn reimport_input(api_id: &str, spec: &ApiSpec) -> ReimportApiInput {
    ReimportApiInput {
        api_id: api_id.to_string(),
        body: spec.body.clone(),
        basepath: spec.basepath.clone(),
        fail_on_warnings: spec.fail_on_warnings,
    }
}

#[must_use]
pub fn get_input(api_id: &str) -> GetApiInput {
    GetApiInput {
        api_id: api_id.to_string(),
    }
}

#[must_use]
pub fn delete_input(api_id: &str) -> DeleteApiInput {
    DeleteApiInput {
        api_id: api_id.to_string(),
    }
}

/// Copy every status field the response carries. Fields the response leaves
/// empty keep their current value.
pub fn merge_status(status: &mut ApiStatus, output: &ApiOutput) {
    if let Some(endpoint) = &output.api_endpoint {
        status.api_endpoint = Some(endpoint.clone());
    }
    if let Some(managed) = output.api_gateway_managed {
        status.api_gateway_managed = Some(managed);
    }
    if let Some(id) = &output.api_id {
        status.api_id = Some(id.clone());
    }
    if let Some(created) = output.created_date {
        status.created_date = Some(created);
    }
    if let Some(info) = &output.import_info {
        status.import_info = Some(info.clone());
    }
    if let Some(warnings) = &output.warnings {
        status.warnings = Some(warnings.clone());
    }
}

/// Overlay a read response onto a copy of the resource: spec fields the
/// service reports replace the local ones, status fields merge.
pub fn merge_observed(api: &mut Api, output: &ApiOutput) {
    let spec = &mut api.spec;
    spec.api_key_selection_expression
        .clone_from(&output.api_key_selection_expression);
    spec.cors_configuration.clone_from(&output.cors_configuration);
    spec.description.clone_from(&output.description);
    spec.disable_execute_api_endpoint = output.disable_execute_api_endpoint;
    spec.disable_schema_validation = output.disable_schema_validation;
    spec.name.clone_from(&output.name);
    spec.protocol_type.clone_from(&output.protocol_type);
    spec.route_selection_expression
        .clone_from(&output.route_selection_expression);
    spec.version.clone_from(&output.version);
    spec.tags = output.tags.as_ref().map_or_else(Tags::new, |tags| {
        Tags::from_pairs(tags.iter(), Provenance::BackendSystem)
    });

    merge_status(&mut api.status, output);
}
