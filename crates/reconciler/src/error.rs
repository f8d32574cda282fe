//! Error types for the reconciler crate.

use gatewayctl_core::{Api, SpecField};
use itertools::Itertools;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Quote and join field names: `'A'`, `'A' and 'B'`.
fn quoted(fields: &[SpecField]) -> String {
    fields.iter().map(|f| format!("'{f}'")).join(" and ")
}

/// Bad field combination in the desired spec. Never reaches the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Secondary import fields were set without the import document.
    #[error("{} field(s) can only be used with 'Body' field for import-api operation", quoted(.fields))]
    ImportFieldsWithoutBody { fields: Vec<SpecField> },

    /// The import document was set alongside fields import does not accept.
    #[error("only 'FailOnWarnings' and 'Basepath' fields can be used with 'Body' field, found {}", quoted(.fields))]
    ConflictingImportFields { fields: Vec<SpecField> },

    /// A create-class spec lacks required fields.
    #[error("'Name' and 'ProtocolType' are required properties if 'Body' field is not present (missing {})", quoted(.missing))]
    MissingCreateFields { missing: Vec<SpecField> },

    /// Reimport was selected before any identifier was assigned.
    #[error("'APIID' is required input parameter for 'ReimportApi' operation")]
    MissingApiId,
}

/// How a backend failure should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryClass {
    /// Transient, retry with backoff.
    Retryable,
    /// Permanent, stop until the spec changes.
    Terminal,
    /// Not in the classification table, handled as retryable.
    Unknown,
}

/// Error reported by the backend client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    /// Service error code, e.g. `BadRequestException`.
    pub code: String,
    pub message: String,
    /// Explicit classification; overrides the code table when set.
    pub class: Option<RetryClass>,
}

impl BackendError {
    /// Create an error classified by its code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            class: None,
        }
    }

    /// Create an error that is always retried.
    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: Some(RetryClass::Retryable),
            ..Self::new(code, message)
        }
    }

    /// Create an error that is never retried.
    pub fn terminal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: Some(RetryClass::Terminal),
            ..Self::new(code, message)
        }
    }

    /// The call was abandoned because the reconcile was cancelled.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::retryable("Cancelled", "reconcile cancelled before the backend call completed")
    }

    /// The backend has no resource with the requested identifier.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NOT_FOUND_CODE, message)
    }

    /// Whether this is the backend's not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND_CODE
    }
}

pub(crate) const NOT_FOUND_CODE: &str = "NotFoundException";

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The desired spec failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The resource does not exist in the backend.
    #[error("resource not found")]
    NotFound,

    /// Classified terminal: reconciliation stops until the spec changes.
    #[error("terminal error: {0}")]
    Terminal(Box<Error>),

    /// Invalid reconciler configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Wrap an error as terminal. Already-terminal errors are returned as is.
    #[must_use]
    pub fn terminal(self) -> Self {
        match self {
            Self::Terminal(_) => self,
            other => Self::Terminal(Box::new(other)),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// The backend error underneath, if any.
    #[must_use]
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(err) => Some(err),
            Self::Terminal(inner) => inner.backend(),
            _ => None,
        }
    }
}

/// A failed resource manager call, with the snapshot the failure is
/// attributed to.
///
/// The snapshot is `None` only when no resource object exists to carry
/// status, e.g. a create that failed before anything was built.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct Failure {
    pub snapshot: Option<Box<Api>>,
    #[source]
    pub error: Error,
}

impl Failure {
    pub fn new(snapshot: Option<Api>, error: Error) -> Self {
        Self {
            snapshot: snapshot.map(Box::new),
            error,
        }
    }

    /// Failure attributed to the given resource.
    pub fn on(snapshot: Api, error: Error) -> Self {
        Self::new(Some(snapshot), error)
    }

    /// The snapshot, or `fallback` when there is none.
    #[must_use]
    pub fn snapshot_or(self, fallback: &Api) -> (Api, Error) {
        let snapshot = self.snapshot.map_or_else(|| fallback.clone(), |b| *b);
        (snapshot, self.error)
    }
}
