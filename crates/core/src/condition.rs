//! Status conditions.
//!
//! A resource holds an ordered list of conditions keyed by type. Conditions
//! are created on first use, mutated in place afterwards and never removed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of condition recorded on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// The backend resource matches the desired spec.
    Synced,
    /// Backend-defaulted fields have been copied into the spec.
    LateInitialized,
    /// Reconciliation stopped until the spec changes.
    Terminal,
}

impl ConditionType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "Synced",
            Self::LateInitialized => "LateInitialized",
            Self::Terminal => "Terminal",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub const fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation about a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: ConditionType,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Whether this condition already records the given status and reason.
    #[must_use]
    pub fn matches(&self, status: ConditionStatus, reason: Option<&str>) -> bool {
        self.status == status && self.reason.as_deref() == reason
    }
}

/// Ordered condition list, at most one entry per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the condition of a given type.
    #[must_use]
    pub fn get(&self, kind: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.r#type == kind)
    }

    /// Whether a condition of this type is present with this status.
    #[must_use]
    pub fn has(&self, kind: ConditionType, status: ConditionStatus) -> bool {
        self.get(kind).is_some_and(|c| c.status == status)
    }

    /// Record a condition. Returns whether the list changed.
    ///
    /// Setting a condition whose type, status and reason are already recorded
    /// is a no-op, so the transition time only moves on a real transition.
    pub fn set(
        &mut self,
        kind: ConditionType,
        status: ConditionStatus,
        reason: Option<&str>,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.0.iter_mut().find(|c| c.r#type == kind) {
            Some(existing) if existing.matches(status, reason) => false,
            Some(existing) => {
                existing.status = status;
                existing.reason = reason.map(str::to_string);
                existing.message = message.map(str::to_string);
                existing.last_transition_time = now;
                true
            }
            None => {
                self.0.push(Condition {
                    r#type: kind,
                    status,
                    reason: reason.map(str::to_string),
                    message: message.map(str::to_string),
                    last_transition_time: now,
                });
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Anything carrying a condition list.
pub trait HasConditions {
    fn conditions(&self) -> &Conditions;
    fn conditions_mut(&mut self) -> &mut Conditions;
}
