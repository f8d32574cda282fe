//! Outcome classification into status conditions.
//!
//! This is the single place that decides retryable versus terminal, and it
//! records the decision on the resource so operators can see it.

use chrono::{DateTime, Utc};
use gatewayctl_core::{ConditionStatus, ConditionType, HasConditions};
use tracing::debug;

use crate::error::{BackendError, Error, RetryClass};

/// Backend error codes that are never worth retrying.
pub const TERMINAL_CODES: [&str; 4] = [
    "BadRequestException",
    "ValidationException",
    "InvalidParameterValueException",
    "UnsupportedOperationException",
];

/// Backend error codes that are transient.
pub const RETRYABLE_CODES: [&str; 8] = [
    "TooManyRequestsException",
    "ThrottlingException",
    "ServiceUnavailableException",
    "InternalServerException",
    "RequestTimeout",
    "ConflictException",
    "NotFoundException",
    "Cancelled",
];

const TERMINAL_MESSAGE: &str = "Resource cannot be reconciled until its spec changes";

/// Maps errors to a retry class.
#[derive(Debug, Clone, Default)]
pub struct ClassificationTable {
    extra_terminal_codes: Vec<String>,
}

impl ClassificationTable {
    /// Table with additional terminal codes on top of [`TERMINAL_CODES`].
    pub fn new(extra_terminal_codes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            extra_terminal_codes: extra_terminal_codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Retry class of a backend error. An explicit class on the error wins
    /// over the code table.
    #[must_use]
    pub fn retry_class(&self, err: &BackendError) -> RetryClass {
        if let Some(class) = err.class {
            return class;
        }
        let code = err.code.as_str();
        if TERMINAL_CODES.contains(&code) || self.extra_terminal_codes.iter().any(|c| c == code) {
            RetryClass::Terminal
        } else if RETRYABLE_CODES.contains(&code) {
            RetryClass::Retryable
        } else {
            RetryClass::Unknown
        }
    }

    /// Whether an error must stop the control loop.
    ///
    /// Validation errors are terminal: retrying the same spec cannot succeed.
    #[must_use]
    pub fn is_terminal(&self, err: &Error) -> bool {
        match err {
            Error::Terminal(_) | Error::Validation(_) | Error::InvalidConfig { .. } => true,
            Error::Backend(backend) => self.retry_class(backend) == RetryClass::Terminal,
            Error::NotFound => false,
        }
    }
}

/// What the control loop should do with a classified outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// Retry with backoff; carries the unmodified error.
    Retry(Error),
    /// Stop retrying; carries the error wrapped as terminal.
    Terminal(Error),
}

impl Verdict {
    /// The error to hand back to the caller, if any.
    #[must_use]
    pub fn into_error(self) -> Option<Error> {
        match self {
            Self::Success => None,
            Self::Retry(err) | Self::Terminal(err) => Some(err),
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Whether any condition changed.
    pub changed: bool,
    pub verdict: Verdict,
}

/// Updates conditions from call outcomes.
#[derive(Debug, Clone, Default)]
pub struct ConditionClassifier {
    table: ClassificationTable,
}

impl ConditionClassifier {
    #[must_use]
    pub const fn new(table: ClassificationTable) -> Self {
        Self { table }
    }

    #[must_use]
    pub const fn table(&self) -> &ClassificationTable {
        &self.table
    }

    /// Record the outcome of one call on `resource`.
    ///
    /// Success flips a standing `Terminal=True` or `Synced=False`, and is
    /// otherwise a no-op. A terminal failure sets `Terminal=True`; any other
    /// failure sets `Synced=False`. Not-found errors leave conditions alone.
    /// Reclassifying an identical outcome changes nothing.
    pub fn classify<R: HasConditions>(
        &self,
        resource: &mut R,
        error: Option<Error>,
        now: DateTime<Utc>,
    ) -> Classification {
        let Some(error) = error else {
            return Classification {
                changed: Self::clear_failures(resource, now),
                verdict: Verdict::Success,
            };
        };

        let (changed, error) = self.record_failure(resource, error, now);
        let verdict = if error.is_terminal() {
            Verdict::Terminal(error)
        } else {
            Verdict::Retry(error)
        };
        Classification { changed, verdict }
    }

    /// Record a failed call on `resource`.
    ///
    /// Returns whether any condition changed, and the error to propagate:
    /// wrapped as terminal when the table says so, unchanged otherwise.
    pub fn record_failure<R: HasConditions>(
        &self,
        resource: &mut R,
        error: Error,
        now: DateTime<Utc>,
    ) -> (bool, Error) {
        if error.is_not_found() {
            return (false, error);
        }

        let reason = error.to_string();
        let conditions = resource.conditions_mut();
        if self.table.is_terminal(&error) {
            let changed = conditions.set(
                ConditionType::Terminal,
                ConditionStatus::True,
                Some(&reason),
                Some(TERMINAL_MESSAGE),
                now,
            );
            debug!(reason = %reason, changed, "Classified terminal failure");
            (changed, error.terminal())
        } else {
            let changed = conditions.set(
                ConditionType::Synced,
                ConditionStatus::False,
                Some(&reason),
                None,
                now,
            );
            debug!(reason = %reason, changed, "Classified retryable failure");
            (changed, error)
        }
    }

    fn clear_failures<R: HasConditions>(resource: &mut R, now: DateTime<Utc>) -> bool {
        let conditions = resource.conditions_mut();
        let mut changed = false;
        if conditions.has(ConditionType::Terminal, ConditionStatus::True) {
            changed |=
                conditions.set(ConditionType::Terminal, ConditionStatus::False, None, None, now);
        }
        if conditions.has(ConditionType::Synced, ConditionStatus::False) {
            changed |=
                conditions.set(ConditionType::Synced, ConditionStatus::True, None, None, now);
        }
        changed
    }
}
