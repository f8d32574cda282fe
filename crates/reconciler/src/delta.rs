//! Differences between desired and latest observed state.
//!
//! Fields the backend reports back are compared by value, but only when the
//! desired spec sets them: an unset field accepts whatever default the
//! backend chose. Fields the backend never reports (the import document,
//! credentials, quick-create route settings) cannot be compared, so they
//! count as different whenever the spec generation has not been applied yet.

use gatewayctl_core::{Api, ApiSpec, SpecField};

use crate::selector::import_fields_present;

/// Fields the backend echoes back on read.
const REPORTED_FIELDS: [SpecField; 9] = [
    SpecField::ApiKeySelectionExpression,
    SpecField::CorsConfiguration,
    SpecField::Description,
    SpecField::DisableExecuteApiEndpoint,
    SpecField::DisableSchemaValidation,
    SpecField::Name,
    SpecField::ProtocolType,
    SpecField::RouteSelectionExpression,
    SpecField::Version,
];

/// Create-class fields the backend accepts but never reports.
const WRITE_ONLY_FIELDS: [SpecField; 3] = [
    SpecField::CredentialsArn,
    SpecField::RouteKey,
    SpecField::Target,
];

/// Import document fields.
const DOCUMENT_FIELDS: [SpecField; 3] = [
    SpecField::Body,
    SpecField::Basepath,
    SpecField::FailOnWarnings,
];

/// Spec fields that differ between two snapshots of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    differences: Vec<SpecField>,
}

impl Delta {
    /// Compare `desired` against `latest`.
    ///
    /// Import-class specs are compared on their document only; the document
    /// owns the API definition and tags are not part of it.
    #[must_use]
    pub fn compare(desired: &Api, latest: &Api) -> Self {
        let spec = &desired.spec;
        let unapplied = latest.status.observed_generation != Some(desired.metadata.generation);

        let mut differences: Vec<SpecField> = Vec::new();
        if import_fields_present(spec) {
            if unapplied {
                differences.extend(DOCUMENT_FIELDS.into_iter().filter(|f| f.is_present(spec)));
            }
        } else {
            differences.extend(
                REPORTED_FIELDS
                    .into_iter()
                    .filter(|f| f.is_present(spec) && !same_value(*f, spec, &latest.spec)),
            );
            if unapplied {
                differences.extend(WRITE_ONLY_FIELDS.into_iter().filter(|f| f.is_present(spec)));
            }
            if spec.tags != latest.spec.tags {
                differences.push(SpecField::Tags);
            }
        }
        differences.sort_unstable();
        Self { differences }
    }

    /// Differing fields, in declaration order.
    #[must_use]
    pub fn differences(&self) -> &[SpecField] {
        &self.differences
    }

    #[must_use]
    pub fn different_at(&self, field: SpecField) -> bool {
        self.differences.contains(&field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }
}

fn same_value(field: SpecField, a: &ApiSpec, b: &ApiSpec) -> bool {
    match field {
        SpecField::ApiKeySelectionExpression => {
            a.api_key_selection_expression == b.api_key_selection_expression
        }
        SpecField::Basepath => a.basepath == b.basepath,
        SpecField::Body => a.body == b.body,
        SpecField::CorsConfiguration => a.cors_configuration == b.cors_configuration,
        SpecField::CredentialsArn => a.credentials_arn == b.credentials_arn,
        SpecField::Description => a.description == b.description,
        SpecField::DisableExecuteApiEndpoint => {
            a.disable_execute_api_endpoint == b.disable_execute_api_endpoint
        }
        SpecField::DisableSchemaValidation => {
            a.disable_schema_validation == b.disable_schema_validation
        }
        SpecField::FailOnWarnings => a.fail_on_warnings == b.fail_on_warnings,
        SpecField::Name => a.name == b.name,
        SpecField::ProtocolType => a.protocol_type == b.protocol_type,
        SpecField::RouteKey => a.route_key == b.route_key,
        SpecField::RouteSelectionExpression => {
            a.route_selection_expression == b.route_selection_expression
        }
        SpecField::Tags => a.tags == b.tags,
        SpecField::Target => a.target == b.target,
        SpecField::Version => a.version == b.version,
    }
}
