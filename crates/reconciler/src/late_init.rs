//! Late initialization of backend-defaulted fields.
//!
//! After a create-class call the backend may fill fields the user left
//! unset. Late initialization reads the resource back and copies those
//! defaults into the desired spec so later diffs do not fight them.
//!
//! Everything here is pure: whether a pass is complete depends only on which
//! configured fields are still unset.

use std::fmt;
use std::time::Duration;

use gatewayctl_core::{ApiSpec, LateInitField};

/// Delay before re-running an incomplete late initialization.
pub const LATE_INIT_REQUEUE_DELAY: Duration = Duration::from_secs(5);

pub const FAILURE_REASON: &str = "Late Initialization Failure";
pub const FAILURE_MESSAGE: &str =
    "Unable to complete Read operation required for late initialization";
pub const DELAYED_REASON: &str = "Delayed Late Initialization";
pub const DELAYED_MESSAGE: &str =
    "Late initialization did not complete, requeuing with delay of 5 seconds";
pub const SUCCESS_REASON: &str = "Late initialization successful";
pub const SUCCESS_MESSAGE: &str = "Late initialization successful";

/// Late initialization state machine.
///
/// `NotNeeded` short-circuits without a backend read. `Reading` is the
/// in-flight state between entering the workflow and assessing the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LateInitState {
    NotNeeded,
    Reading,
    Incomplete,
    Complete,
}

impl LateInitState {
    /// Entry state for a pass over `fields`.
    #[must_use]
    pub const fn enter(fields: &[LateInitField]) -> Self {
        if fields.is_empty() {
            Self::NotNeeded
        } else {
            Self::Reading
        }
    }

    /// State after the read, given the late-initialized spec.
    #[must_use]
    pub fn assess(fields: &[LateInitField], spec: &ApiSpec) -> Self {
        if fields.is_empty() {
            Self::NotNeeded
        } else if missing_fields(fields, spec).is_empty() {
            Self::Complete
        } else {
            Self::Incomplete
        }
    }

    /// Requeue delay this state asks the control loop for.
    #[must_use]
    pub const fn requeue_after(self) -> Option<Duration> {
        match self {
            Self::Incomplete => Some(LATE_INIT_REQUEUE_DELAY),
            Self::NotNeeded | Self::Reading | Self::Complete => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Reading)
    }
}

impl fmt::Display for LateInitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotNeeded => "not-needed",
            Self::Reading => "reading",
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Whether `spec` sets `field`.
#[must_use]
pub const fn is_set(field: LateInitField, spec: &ApiSpec) -> bool {
    match field {
        LateInitField::ApiKeySelectionExpression => spec.api_key_selection_expression.is_some(),
        LateInitField::RouteSelectionExpression => spec.route_selection_expression.is_some(),
        LateInitField::DisableExecuteApiEndpoint => spec.disable_execute_api_endpoint.is_some(),
        LateInitField::Description => spec.description.is_some(),
        LateInitField::Version => spec.version.is_some(),
    }
}

/// Configured fields `spec` leaves unset, in configuration order.
#[must_use]
pub fn missing_fields(fields: &[LateInitField], spec: &ApiSpec) -> Vec<LateInitField> {
    fields
        .iter()
        .copied()
        .filter(|field| !is_set(*field, spec))
        .collect()
}

/// Copy `observed` values into `latest` for configured fields that
/// `latest` leaves unset. Values the user set are never replaced.
pub fn fill_from_observed(fields: &[LateInitField], latest: &mut ApiSpec, observed: &ApiSpec) {
    for field in fields {
        match field {
            LateInitField::ApiKeySelectionExpression => {
                if latest.api_key_selection_expression.is_none() {
                    latest
                        .api_key_selection_expression
                        .clone_from(&observed.api_key_selection_expression);
                }
            }
            LateInitField::RouteSelectionExpression => {
                if latest.route_selection_expression.is_none() {
                    latest
                        .route_selection_expression
                        .clone_from(&observed.route_selection_expression);
                }
            }
            LateInitField::DisableExecuteApiEndpoint => {
                if latest.disable_execute_api_endpoint.is_none() {
                    latest.disable_execute_api_endpoint = observed.disable_execute_api_endpoint;
                }
            }
            LateInitField::Description => {
                if latest.description.is_none() {
                    latest.description.clone_from(&observed.description);
                }
            }
            LateInitField::Version => {
                if latest.version.is_none() {
                    latest.version.clone_from(&observed.version);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: [LateInitField; 2] = [
        LateInitField::RouteSelectionExpression,
        LateInitField::DisableExecuteApiEndpoint,
    ];

    #[test]
    fn test_no_fields_is_not_needed() {
        assert_eq!(LateInitState::enter(&[]), LateInitState::NotNeeded);
        assert_eq!(LateInitState::assess(&[], &ApiSpec::default()), LateInitState::NotNeeded);
        assert_eq!(LateInitState::NotNeeded.requeue_after(), None);
    }

    #[test]
    fn test_assess_is_a_function_of_missing_fields() {
        let mut spec = ApiSpec {
            route_selection_expression: Some("$request.method $request.path".into()),
            ..ApiSpec::default()
        };
        assert_eq!(LateInitState::enter(&FIELDS), LateInitState::Reading);
        assert_eq!(LateInitState::assess(&FIELDS, &spec), LateInitState::Incomplete);
        assert_eq!(LateInitState::assess(&FIELDS, &spec), LateInitState::Incomplete);
        assert_eq!(
            LateInitState::Incomplete.requeue_after(),
            Some(Duration::from_secs(5))
        );

        spec.disable_execute_api_endpoint = Some(false);
        assert_eq!(LateInitState::assess(&FIELDS, &spec), LateInitState::Complete);
    }

    #[test]
    fn test_fill_keeps_user_values() {
        let mut latest = ApiSpec {
            route_selection_expression: Some("${request.body.action}".into()),
            ..ApiSpec::default()
        };
        let observed = ApiSpec {
            route_selection_expression: Some("$request.method $request.path".into()),
            disable_execute_api_endpoint: Some(false),
            version: Some("v9".into()),
            ..ApiSpec::default()
        };

        fill_from_observed(&FIELDS, &mut latest, &observed);

        assert_eq!(
            latest.route_selection_expression.as_deref(),
            Some("${request.body.action}")
        );
        assert_eq!(latest.disable_execute_api_endpoint, Some(false));
        assert_eq!(latest.version, None);
        assert!(missing_fields(&FIELDS, &latest).is_empty());
    }
}
