//! Per-resource reconcile driver.

use std::sync::Arc;

use chrono::Utc;
use gatewayctl_core::{Api, ConditionStatus, ConditionType, ControllerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::ApiBackend;
use crate::delta::Delta;
use crate::error::{Error, Failure, Result};
use crate::manager::{LateInitialized, ReadOne, ResourceManager};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::types::{Decision, ReconcileOutcome};

/// Drives one reconcile pass for one API resource.
///
/// The control loop guarantees at most one pass per resource at a time;
/// passes for different resources may run concurrently on one `Reconciler`.
#[derive(Debug)]
pub struct Reconciler {
    manager: ResourceManager,
}

impl Reconciler {
    /// Create a new reconciler.
    pub const fn new(manager: ResourceManager) -> Self {
        Self { manager }
    }

    #[must_use]
    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::new()
    }

    /// Get the resource manager.
    pub const fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    /// Reconcile `api` once.
    ///
    /// Deleting resources are removed from the backend. Otherwise default
    /// tags are merged in, the resource is created or read and updated, and
    /// late initialization runs. The returned snapshot is what the control
    /// loop should persist; the decision tells it what to do next.
    #[instrument(skip_all, fields(resource = %api.key()))]
    pub async fn reconcile(&self, cancel: &CancellationToken, api: &Api) -> ReconcileOutcome {
        if api.is_deleting() {
            return self.finalize(cancel, api).await;
        }

        let desired = self.manager.ensure_tags(api);
        let result = if desired.api_id().is_none() {
            self.create(cancel, &desired).await
        } else {
            self.sync(cancel, &desired).await
        };

        match result {
            Ok(outcome) => outcome,
            Err(failure) => self.failed(failure, &desired),
        }
    }

    async fn finalize(&self, cancel: &CancellationToken, api: &Api) -> ReconcileOutcome {
        match self.manager.delete(cancel, api).await {
            Ok(()) => ReconcileOutcome::new(api.clone(), Decision::Done),
            Err(failure) => self.failed(failure, api),
        }
    }

    async fn create(
        &self,
        cancel: &CancellationToken,
        desired: &Api,
    ) -> std::result::Result<ReconcileOutcome, Failure> {
        let created = self.manager.create(cancel, desired).await?;
        self.late_initialize(cancel, &created).await
    }

    async fn sync(
        &self,
        cancel: &CancellationToken,
        desired: &Api,
    ) -> std::result::Result<ReconcileOutcome, Failure> {
        let ReadOne {
            desired: mirrored,
            latest,
        } = match self.manager.read_one(cancel, desired).await {
            Ok(read) => read,
            Err(failure) if failure.error.is_not_found() => {
                warn!(api_id = ?desired.status.api_id, "API missing from backend, recreating");
                let mut orphan = desired.clone();
                orphan.status = desired.status.without_backend_state();
                return self.create(cancel, &orphan).await;
            }
            Err(failure) => return Err(failure),
        };

        let delta = Delta::compare(&mirrored, &latest);
        let resource = if delta.is_empty() {
            debug!("No differences");
            let mut resource = desired.clone();
            resource.status = latest.status;
            resource
        } else {
            let mut updated = self.manager.update(cancel, &mirrored, &latest, &delta).await?;
            updated.spec = desired.spec.clone();
            updated
        };
        self.late_initialize(cancel, &resource).await
    }

    async fn late_initialize(
        &self,
        cancel: &CancellationToken,
        resource: &Api,
    ) -> std::result::Result<ReconcileOutcome, Failure> {
        let LateInitialized {
            resource: mut current,
            state,
        } = self.manager.late_initialize(cancel, resource).await?;

        if let Some(delay) = state.requeue_after() {
            info!(?delay, "Late initialization incomplete, requeuing");
            let current = self.manager.filter_system_tags(&current);
            return Ok(ReconcileOutcome::new(current, Decision::RequeueAfter(delay)));
        }

        let synced = self.manager.is_synced(&current);
        current.status.conditions.set(
            ConditionType::Synced,
            ConditionStatus::from_bool(synced),
            None,
            None,
            Utc::now(),
        );
        info!(api_id = ?current.status.api_id, synced, "Reconciled");
        let current = self.manager.filter_system_tags(&current);
        Ok(ReconcileOutcome::new(current, Decision::Done))
    }

    fn failed(&self, failure: Failure, fallback: &Api) -> ReconcileOutcome {
        let (resource, error) = failure.snapshot_or(fallback);
        warn!(error = %error, terminal = error.is_terminal(), "Reconcile failed");
        let resource = self.manager.filter_system_tags(&resource);
        ReconcileOutcome::new(resource, Decision::from_error(error))
    }
}

/// Builder for Reconciler.
#[derive(Default)]
pub struct ReconcilerBuilder {
    config: Option<ControllerConfig>,
    backend: Option<Arc<dyn ApiBackend>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the controller configuration.
    #[must_use]
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the backend client.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn ApiBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the metrics sink. Defaults to [`NoopMetrics`].
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when the backend is missing or the
    /// configuration does not validate.
    pub fn build(self) -> Result<Reconciler> {
        let backend = self
            .backend
            .ok_or_else(|| Error::invalid_config("Backend is required"))?;

        let config = self.config.unwrap_or_else(ControllerConfig::from_env);
        config
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;

        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));

        Ok(Reconciler::new(ResourceManager::new(config, backend, metrics)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use gatewayctl_core::ApiSpec;

    use super::*;
    use crate::memory::InMemoryBackend;
    use crate::types::Verb;

    fn setup_reconciler() -> (Reconciler, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let reconciler = Reconciler::builder()
            .with_config(ControllerConfig::new("123456789012", "us-west-2"))
            .with_backend(Arc::clone(&backend) as Arc<dyn ApiBackend>)
            .build()
            .unwrap();
        (reconciler, backend)
    }

    fn http_api() -> Api {
        Api::new(
            "pets",
            "prod",
            ApiSpec {
                name: Some("pets".into()),
                protocol_type: Some("HTTP".into()),
                ..ApiSpec::default()
            },
        )
    }

    #[tokio::test]
    async fn test_reconcile_creates_then_converges() {
        let (reconciler, backend) = setup_reconciler();
        let cancel = CancellationToken::new();

        let first = reconciler.reconcile(&cancel, &http_api()).await;
        assert!(first.decision.is_done());
        assert!(first.resource.api_id().is_some());
        assert!(
            first
                .resource
                .status
                .conditions
                .has(ConditionType::Synced, ConditionStatus::True)
        );

        let second = reconciler.reconcile(&cancel, &first.resource).await;
        assert!(second.decision.is_done());
        assert_eq!(backend.calls().await, vec![Verb::CreateApi, Verb::GetApi]);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_reconcile_updates_changed_field() {
        let (reconciler, backend) = setup_reconciler();
        let cancel = CancellationToken::new();
        let created = reconciler.reconcile(&cancel, &http_api()).await.resource;

        let mut changed = created.clone();
        changed.spec.description = Some("pet store".into());
        changed.metadata.generation = 1;
        let outcome = reconciler.reconcile(&cancel, &changed).await;

        assert!(outcome.decision.is_done());
        assert_eq!(outcome.resource.status.observed_generation, Some(1));
        let stored = backend.api(created.api_id().unwrap()).await.unwrap();
        assert_eq!(stored.description.as_deref(), Some("pet store"));
        assert_eq!(backend.calls().await.last(), Some(&Verb::UpdateApi));
    }

    #[tokio::test]
    async fn test_reconcile_deleting_resource() {
        let (reconciler, backend) = setup_reconciler();
        let cancel = CancellationToken::new();
        let mut created = reconciler.reconcile(&cancel, &http_api()).await.resource;
        created.metadata.deletion_timestamp = Some(Utc::now());

        let outcome = reconciler.reconcile(&cancel, &created).await;

        assert!(outcome.decision.is_done());
        assert_eq!(backend.len().await, 0);
    }

    #[tokio::test]
    async fn test_reconcile_recreates_missing_api() {
        let (reconciler, backend) = setup_reconciler();
        let mut api = http_api();
        api.status.api_id = Some("vanished".into());

        let outcome = reconciler.reconcile(&CancellationToken::new(), &api).await;

        assert!(outcome.decision.is_done());
        assert_ne!(outcome.resource.api_id(), Some("vanished"));
        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.calls().await, vec![Verb::GetApi, Verb::CreateApi]);
    }

    #[test]
    fn test_builder_requires_backend() {
        let result = ReconcilerBuilder::new()
            .with_config(ControllerConfig::new("1", "us-east-1"))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_validates_config() {
        let result = ReconcilerBuilder::new()
            .with_config(ControllerConfig::new("", "us-east-1"))
            .with_backend(Arc::new(InMemoryBackend::new()))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
