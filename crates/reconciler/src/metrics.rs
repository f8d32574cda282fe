//! Backend call metrics.
//!
//! Recording is fire-and-forget: a sink must never block or fail the
//! reconcile that reports to it.

use dashmap::DashMap;
use tracing::trace;

use crate::error::BackendError;
use crate::types::{OperationClass, Verb};

/// Receives one record per backend call.
pub trait MetricsSink: Send + Sync {
    fn record_call(&self, class: OperationClass, verb: Verb, error: Option<&BackendError>);
}

/// Sink that discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_call(&self, _class: OperationClass, _verb: Verb, _error: Option<&BackendError>) {}
}

/// Counter key: one series per class, verb and outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub class: OperationClass,
    pub verb: Verb,
    pub success: bool,
}

/// In-process call counters, shared by all reconciles.
#[derive(Debug, Default)]
pub struct CallMetrics {
    calls: DashMap<CallKey, u64>,
}

impl CallMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded calls for one series.
    #[must_use]
    pub fn count(&self, class: OperationClass, verb: Verb, success: bool) -> u64 {
        self.calls
            .get(&CallKey {
                class,
                verb,
                success,
            })
            .map_or(0, |entry| *entry)
    }

    /// Number of recorded calls across all series.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.calls
            .iter()
            .fold(0_u64, |acc, entry| acc.saturating_add(*entry.value()))
    }
}

impl MetricsSink for CallMetrics {
    fn record_call(&self, class: OperationClass, verb: Verb, error: Option<&BackendError>) {
        let key = CallKey {
            class,
            verb,
            success: error.is_none(),
        };
        let mut counter = self.calls.entry(key).or_insert(0);
        let next = counter.saturating_add(1);
        *counter = next;
        trace!(class = %class, verb = %verb, success = key.success, "Recorded backend call");
    }
}
