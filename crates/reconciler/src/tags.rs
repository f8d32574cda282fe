//! Tag reconciliation across user, controller and backend provenance.
//!
//! All three operations are pure, return a new map, and keep the existing
//! key order of their first argument. New keys are appended in the order of
//! the map they come from.

use gatewayctl_core::{Provenance, Tag, Tags};

/// Merge controller default tags into the desired tags.
///
/// Keys the user already set are never overridden.
#[must_use]
pub fn ensure_tags(desired: &Tags, defaults: &Tags) -> Tags {
    let mut merged = desired.clone();
    for (key, tag) in defaults.iter() {
        merged.insert_if_absent(key, tag.clone());
    }
    merged
}

/// Drop tags whose key starts with the backend's reserved prefix.
///
/// Run on backend state before diffing, so tags the controller does not own
/// never show up as tags to remove.
#[must_use]
pub fn filter_system_tags(tags: &Tags, system_prefix: &str) -> Tags {
    let mut filtered = tags.clone();
    filtered.retain(|key, _| !key.starts_with(system_prefix));
    filtered
}

/// Copy tags present in `observed` but absent from `desired` into a copy of
/// `desired`, marked as backend-injected.
///
/// Only adds keys, never overrides one.
#[must_use]
pub fn mirror_tags(desired: &Tags, observed: &Tags) -> Tags {
    let mut mirrored = desired.clone();
    for (key, tag) in observed.iter() {
        mirrored.insert_if_absent(key, Tag::new(tag.value.clone(), Provenance::BackendSystem));
    }
    mirrored
}
