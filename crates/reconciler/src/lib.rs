//! Reconciliation decision engine for gateway API resources.
//!
//! This crate keeps a declared API resource in line with an eventually
//! consistent backend service, one resource and one pass at a time:
//!
//! - **Selection**: infer create, import, update or reimport from which spec
//!   fields are present, and validate the field combination
//! - **Tags**: merge controller defaults, mirror backend-injected tags, and
//!   filter system tags, all order-preserving
//! - **Execution**: run the backend verb, record a metric, merge the response
//! - **Late initialization**: read back backend defaults, requeue after a
//!   fixed delay while they are missing
//! - **Classification**: record terminal or retryable outcomes as status
//!   conditions
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use gatewayctl_core::{Api, ApiSpec, ControllerConfig};
//! use gatewayctl_reconciler::{Decision, InMemoryBackend, Reconciler};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let reconciler = Reconciler::builder()
//!         .with_config(ControllerConfig::new("123456789012", "us-west-2"))
//!         .with_backend(Arc::new(InMemoryBackend::new()))
//!         .build()
//!         .expect("valid configuration");
//!
//!     let api = Api::new("pets", "prod", ApiSpec {
//!         name: Some("pets".into()),
//!         protocol_type: Some("HTTP".into()),
//!         ..ApiSpec::default()
//!     });
//!
//!     let outcome = reconciler.reconcile(&CancellationToken::new(), &api).await;
//!     assert_eq!(outcome.decision, Decision::Done);
//! }
//! ```

pub mod backend;
pub mod classifier;
pub mod delta;
pub mod error;
pub mod executor;
pub mod late_init;
pub mod manager;
pub mod mapping;
pub mod memory;
pub mod metrics;
pub mod reconciler;
pub mod selector;
pub mod tags;
pub mod types;

// Re-export main types
pub use backend::{ApiBackend, ApiOutput, BackendResult};
pub use classifier::{Classification, ClassificationTable, ConditionClassifier, Verdict};
pub use delta::Delta;
pub use error::{BackendError, Error, Failure, Result, RetryClass, ValidationError};
pub use executor::Executor;
pub use late_init::{LATE_INIT_REQUEUE_DELAY, LateInitState};
pub use manager::{LateInitialized, ReadOne, ResourceManager};
pub use memory::InMemoryBackend;
pub use metrics::{CallMetrics, MetricsSink, NoopMetrics};
pub use reconciler::{Reconciler, ReconcilerBuilder};
pub use selector::select_operation;
pub use tags::{ensure_tags, filter_system_tags, mirror_tags};
pub use types::{Decision, Operation, OperationClass, ReconcileOutcome, Verb};
