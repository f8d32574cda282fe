//! Core types for the reconciler.

use std::fmt;
use std::time::Duration;

use gatewayctl_core::Api;

use crate::error::Error;

/// Imperative operation implied by a desired spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create from individual fields.
    Create,
    /// Create from a bulk definition document.
    Import,
    /// Update individual fields of an existing API.
    Update,
    /// Replace an existing API from a bulk definition document.
    Reimport,
}

impl Operation {
    /// Backend verb that carries out this operation.
    #[must_use]
    pub const fn verb(self) -> Verb {
        match self {
            Self::Create => Verb::CreateApi,
            Self::Import => Verb::ImportApi,
            Self::Update => Verb::UpdateApi,
            Self::Reimport => Verb::ReimportApi,
        }
    }

    /// Metric class of this operation.
    #[must_use]
    pub const fn class(self) -> OperationClass {
        match self {
            Self::Create | Self::Import => OperationClass::Create,
            Self::Update | Self::Reimport => OperationClass::Update,
        }
    }

    /// Whether the operation is driven by the import document.
    #[must_use]
    pub const fn is_import(self) -> bool {
        matches!(self, Self::Import | Self::Reimport)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Import => "import",
            Self::Update => "update",
            Self::Reimport => "reimport",
        };
        f.write_str(name)
    }
}

/// Resource manager phase a backend call belongs to, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Create,
    ReadOne,
    Update,
    Delete,
}

impl OperationClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::ReadOne => "READ_ONE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend client verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    CreateApi,
    GetApi,
    UpdateApi,
    DeleteApi,
    ImportApi,
    ReimportApi,
}

impl Verb {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateApi => "CreateApi",
            Self::GetApi => "GetApi",
            Self::UpdateApi => "UpdateApi",
            Self::DeleteApi => "DeleteApi",
            Self::ImportApi => "ImportApi",
            Self::ReimportApi => "ReimportApi",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the control loop should do after a reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Converged; wait for the next change.
    Done,
    /// Reconcile again after the delay.
    RequeueAfter(Duration),
    /// Retry with the loop's standard backoff.
    Retry(Error),
    /// Stop retrying until the desired spec changes.
    Terminal(Error),
}

impl Decision {
    /// Map a classified error to a decision.
    #[must_use]
    pub fn from_error(error: Error) -> Self {
        if error.is_terminal() {
            Self::Terminal(error)
        } else {
            Self::Retry(error)
        }
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Result of one reconcile pass for one resource.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Snapshot the control loop persists.
    pub resource: Api,
    pub decision: Decision,
}

impl ReconcileOutcome {
    pub const fn new(resource: Api, decision: Decision) -> Self {
        Self { resource, decision }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    #[test]
    fn test_operation_verbs_and_classes() {
        assert_eq!(Operation::Import.verb(), Verb::ImportApi);
        assert_eq!(Operation::Import.class(), OperationClass::Create);
        assert_eq!(Operation::Reimport.class(), OperationClass::Update);
        assert!(Operation::Reimport.is_import());
        assert!(!Operation::Update.is_import());
    }

    #[test]
    fn test_decision_from_error() {
        let retry = Decision::from_error(BackendError::retryable("Throttled", "slow down").into());
        assert!(matches!(retry, Decision::Retry(_)));

        let terminal = Decision::from_error(Error::NotFound.terminal());
        assert!(matches!(terminal, Decision::Terminal(_)));
    }

    #[test]
    fn test_class_names() {
        assert_eq!(OperationClass::ReadOne.to_string(), "READ_ONE");
        assert_eq!(Verb::ReimportApi.to_string(), "ReimportApi");
    }
}
