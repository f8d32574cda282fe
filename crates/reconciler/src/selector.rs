//! Operation selection and field co-occurrence validation.
//!
//! Selection never touches the backend: any error here ends the reconcile
//! before a call is made.

use gatewayctl_core::{ApiSpec, ApiStatus, SpecField};
use tracing::debug;

use crate::error::ValidationError;
use crate::types::Operation;

/// Fields whose presence selects the import-class operations.
pub const IMPORT_FIELDS: [SpecField; 3] = [
    SpecField::Body,
    SpecField::Basepath,
    SpecField::FailOnWarnings,
];

/// Import fields that are only valid alongside the document, in the order
/// validation messages name them.
const SECONDARY_IMPORT_FIELDS: [SpecField; 2] = [SpecField::FailOnWarnings, SpecField::Basepath];

/// Fields a create-class spec must set.
const REQUIRED_CREATE_FIELDS: [SpecField; 2] = [SpecField::Name, SpecField::ProtocolType];

/// Whether any import-indicating field is set.
#[must_use]
pub fn import_fields_present(spec: &ApiSpec) -> bool {
    IMPORT_FIELDS.iter().any(|field| field.is_present(spec))
}

/// Choose the operation for `spec`.
///
/// `observed` is `None` on first creation and the latest observed status on
/// updates.
///
/// # Errors
///
/// Returns a `ValidationError` when the spec's field combination does not
/// fit the inferred operation, or when reimport is selected without an
/// identifier.
pub fn select_operation(
    spec: &ApiSpec,
    observed: Option<&ApiStatus>,
) -> Result<Operation, ValidationError> {
    let operation = match (import_fields_present(spec), observed) {
        (true, None) => {
            validate_import(spec)?;
            Operation::Import
        }
        (true, Some(status)) => {
            validate_import(spec)?;
            if status.api_id.is_none() {
                return Err(ValidationError::MissingApiId);
            }
            Operation::Reimport
        }
        (false, None) => {
            validate_create(spec)?;
            Operation::Create
        }
        (false, Some(_)) => {
            validate_create(spec)?;
            Operation::Update
        }
    };
    debug!(%operation, "Selected operation");
    Ok(operation)
}

/// Validate an import-class spec.
///
/// # Errors
///
/// `ImportFieldsWithoutBody` names the secondary fields that caused import
/// to be inferred; `ConflictingImportFields` names fields import does not
/// accept. Tags are always accepted since default tags are injected
/// upstream.
pub fn validate_import(spec: &ApiSpec) -> Result<(), ValidationError> {
    if spec.body.is_none() {
        let fields: Vec<SpecField> = SECONDARY_IMPORT_FIELDS
            .into_iter()
            .filter(|field| field.is_present(spec))
            .collect();
        return Err(ValidationError::ImportFieldsWithoutBody { fields });
    }

    let conflicting: Vec<SpecField> = spec
        .present_fields()
        .into_iter()
        .filter(|field| !IMPORT_FIELDS.contains(field) && *field != SpecField::Tags)
        .collect();
    if conflicting.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::ConflictingImportFields {
            fields: conflicting,
        })
    }
}

/// Validate a create-class spec.
///
/// # Errors
///
/// `MissingCreateFields` when the name or protocol type is absent.
pub fn validate_create(spec: &ApiSpec) -> Result<(), ValidationError> {
    let missing: Vec<SpecField> = REQUIRED_CREATE_FIELDS
        .into_iter()
        .filter(|field| !field.is_present(spec))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingCreateFields { missing })
    }
}

#[cfg(test)]
mod tests {
    use gatewayctl_core::{Provenance, Tags};

    use super::*;

    fn http_api(name: &str) -> ApiSpec {
        ApiSpec {
            name: Some(name.into()),
            protocol_type: Some("HTTP".into()),
            ..ApiSpec::default()
        }
    }

    fn openapi(body: &str) -> ApiSpec {
        ApiSpec {
            body: Some(body.into()),
            ..ApiSpec::default()
        }
    }

    fn with_id(id: &str) -> ApiStatus {
        ApiStatus {
            api_id: Some(id.into()),
            ..ApiStatus::default()
        }
    }

    #[test]
    fn test_create_when_no_import_fields() {
        assert_eq!(select_operation(&http_api("a"), None), Ok(Operation::Create));
    }

    #[test]
    fn test_update_when_observed() {
        let status = with_id("abc123");
        assert_eq!(
            select_operation(&http_api("a"), Some(&status)),
            Ok(Operation::Update)
        );
    }

    #[test]
    fn test_create_requires_name_and_protocol() {
        let spec = ApiSpec {
            name: Some("a".into()),
            ..ApiSpec::default()
        };
        assert_eq!(
            select_operation(&spec, None),
            Err(ValidationError::MissingCreateFields {
                missing: vec![SpecField::ProtocolType]
            })
        );
        assert_eq!(
            validate_create(&ApiSpec::default()),
            Err(ValidationError::MissingCreateFields {
                missing: vec![SpecField::Name, SpecField::ProtocolType]
            })
        );
    }

    #[test]
    fn test_import_with_document_basepath_warnings_and_tags() {
        let spec = ApiSpec {
            basepath: Some("/v1".into()),
            fail_on_warnings: Some(true),
            tags: Tags::from_pairs([("team", "api")], Provenance::User),
            ..openapi("openapi: 3.0.1")
        };
        assert_eq!(select_operation(&spec, None), Ok(Operation::Import));
    }

    #[test]
    fn test_secondary_fields_without_document() {
        let spec = ApiSpec {
            basepath: Some("/v1".into()),
            ..ApiSpec::default()
        };
        assert_eq!(
            select_operation(&spec, None),
            Err(ValidationError::ImportFieldsWithoutBody {
                fields: vec![SpecField::Basepath]
            })
        );

        let both = ApiSpec {
            fail_on_warnings: Some(false),
            ..spec
        };
        assert_eq!(
            validate_import(&both),
            Err(ValidationError::ImportFieldsWithoutBody {
                fields: vec![SpecField::FailOnWarnings, SpecField::Basepath]
            })
        );
    }

    #[test]
    fn test_document_with_create_fields_conflicts() {
        let spec = ApiSpec {
            name: Some("a".into()),
            description: Some(String::new()),
            ..openapi("{}")
        };
        let err = select_operation(&spec, None);
        assert_eq!(
            err,
            Err(ValidationError::ConflictingImportFields {
                fields: vec![SpecField::Description, SpecField::Name]
            })
        );
    }

    #[test]
    fn test_reimport_with_identifier() {
        let spec = ApiSpec {
            basepath: Some("/v1".into()),
            ..openapi("openapi: 3.0.1")
        };
        let status = with_id("abc123");
        assert_eq!(select_operation(&spec, Some(&status)), Ok(Operation::Reimport));
    }

    #[test]
    fn test_reimport_without_identifier_never_falls_back_to_import() {
        let spec = openapi("openapi: 3.0.1");
        let status = ApiStatus::default();
        assert_eq!(
            select_operation(&spec, Some(&status)),
            Err(ValidationError::MissingApiId)
        );
    }
}
