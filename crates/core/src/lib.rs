//! Shared model for the gateway API controller.
//!
//! - [`api`]: the API custom resource (spec, status, metadata)
//! - [`condition`]: status conditions keyed by type
//! - [`tags`]: insertion-ordered tags with provenance
//! - [`config`]: controller configuration, built once and passed by value

#![forbid(unsafe_code)]

pub mod api;
pub mod condition;
pub mod config;
pub mod error;
pub mod tags;

pub use api::{Api, ApiSpec, ApiStatus, Cors, ObjectMeta, SpecField};
pub use condition::{Condition, ConditionStatus, ConditionType, Conditions, HasConditions};
pub use config::{ControllerConfig, LateInitField};
pub use error::{Error, Result};
pub use tags::{Provenance, Tag, Tags};
