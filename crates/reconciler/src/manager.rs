//! Resource manager for API resources.
//!
//! Wraps the executor with everything a reconcile needs around a backend
//! call: operation selection, status defaults, tag handling, late
//! initialization, and condition classification. Every verb routes its
//! result through [`ResourceManager::on_success`] or
//! [`ResourceManager::on_error`].

use std::sync::Arc;

use chrono::Utc;
use gatewayctl_core::{Api, ConditionStatus, ConditionType, ControllerConfig, Tags};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::backend::ApiBackend;
use crate::classifier::{ClassificationTable, ConditionClassifier};
use crate::delta::Delta;
use crate::error::Failure;
use crate::executor::Executor;
use crate::late_init::{self, LateInitState};
use crate::metrics::MetricsSink;
use crate::selector::select_operation;
use crate::tags;

/// Result of [`ResourceManager::read_one`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOne {
    /// Copy of the desired resource with backend-injected tags mirrored in.
    pub desired: Api,
    /// Latest observed state.
    pub latest: Api,
}

/// Result of [`ResourceManager::late_initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LateInitialized {
    pub resource: Api,
    pub state: LateInitState,
}

/// Manages API resources against one backend, for one account and region.
pub struct ResourceManager {
    config: ControllerConfig,
    backend: Arc<dyn ApiBackend>,
    metrics: Arc<dyn MetricsSink>,
    classifier: ConditionClassifier,
}

impl ResourceManager {
    /// Create a manager. Terminal codes from the configuration extend the
    /// built-in classification table.
    pub fn new(
        config: ControllerConfig,
        backend: Arc<dyn ApiBackend>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let table = ClassificationTable::new(config.terminal_codes.iter().cloned());
        let classifier = ConditionClassifier::new(table);
        Self {
            config,
            backend,
            metrics,
            classifier,
        }
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub const fn classifier(&self) -> &ConditionClassifier {
        &self.classifier
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(self.backend.as_ref(), self.metrics.as_ref())
    }

    /// Read the latest state of `desired` from the backend.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when the resource has no identifier yet or the
    /// backend does not know it; otherwise the classified backend error.
    #[instrument(skip_all, fields(resource = %desired.key()))]
    pub async fn read_one(
        &self,
        cancel: &CancellationToken,
        desired: &Api,
    ) -> Result<ReadOne, Failure> {
        match self.executor().read(cancel, desired).await {
            Ok(latest) => {
                let injected = self.system_tags_of(&latest.spec.tags);
                let mut mirrored = desired.clone();
                mirrored.spec.tags = tags::mirror_tags(&desired.spec.tags, &injected);
                Ok(ReadOne {
                    desired: mirrored,
                    latest: self.on_success(latest),
                })
            }
            Err(failure) => Err(self.on_error(failure, desired)),
        }
    }

    /// Create the backend resource for `desired`, by field or by import.
    ///
    /// # Errors
    ///
    /// Validation errors (terminal) and classified backend errors, with
    /// conditions recorded on the returned snapshot.
    #[instrument(skip_all, fields(resource = %desired.key()))]
    pub async fn create(&self, cancel: &CancellationToken, desired: &Api) -> Result<Api, Failure> {
        let operation = select_operation(&desired.spec, None)
            .map_err(|err| self.on_error(Failure::on(desired.clone(), err.into()), desired))?;

        match self.executor().execute(cancel, operation, desired).await {
            Ok(mut created) => {
                created.status.observed_generation = Some(desired.metadata.generation);
                info!(api_id = ?created.status.api_id, %operation, "Created API");
                Ok(self.on_success(created))
            }
            Err(failure) => Err(self.on_error(failure, desired)),
        }
    }

    /// Bring the backend resource in line with `desired`.
    ///
    /// The request carries the desired spec and the latest status, so the
    /// backend identifier comes from what was observed. System tags are
    /// left out of the request. Failures are attributed to that same
    /// desired-spec-plus-latest-status snapshot.
    ///
    /// # Errors
    ///
    /// Validation errors (terminal), `ValidationError::MissingApiId` for a
    /// reimport before creation, and classified backend errors.
    #[instrument(skip_all, fields(resource = %desired.key()))]
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        desired: &Api,
        latest: &Api,
        delta: &Delta,
    ) -> Result<Api, Failure> {
        debug!(differences = ?delta.differences(), "Updating API");
        let mut target = desired.clone();
        target.status = latest.status.clone();
        target.spec.tags =
            tags::filter_system_tags(&desired.spec.tags, &self.config.system_tag_prefix);

        let operation = select_operation(&desired.spec, Some(&latest.status))
            .map_err(|err| self.on_error(Failure::on(target.clone(), err.into()), &target))?;

        match self.executor().execute(cancel, operation, &target).await {
            Ok(mut updated) => {
                updated.status.observed_generation = Some(desired.metadata.generation);
                info!(api_id = ?updated.status.api_id, %operation, "Updated API");
                Ok(self.on_success(updated))
            }
            Err(failure) => Err(self.on_error(failure, &target)),
        }
    }

    /// Delete the backend resource.
    ///
    /// # Errors
    ///
    /// Classified backend errors other than not-found.
    #[instrument(skip_all, fields(resource = %api.key()))]
    pub async fn delete(&self, cancel: &CancellationToken, api: &Api) -> Result<(), Failure> {
        self.executor()
            .delete(cancel, api)
            .await
            .map_err(|failure| self.on_error(failure, api))?;
        info!(api_id = ?api.status.api_id, "Deleted API");
        Ok(())
    }

    /// Fill backend-defaulted fields into a copy of `latest`.
    ///
    /// With no configured late-init fields this returns immediately without
    /// a backend read.
    ///
    /// # Errors
    ///
    /// The read error, with `LateInitialized=False` and `Synced=False`
    /// recorded on the snapshot. A `Synced=False` left by the classifier
    /// keeps its reason.
    #[instrument(skip_all, fields(resource = %latest.key()))]
    pub async fn late_initialize(
        &self,
        cancel: &CancellationToken,
        latest: &Api,
    ) -> Result<LateInitialized, Failure> {
        let fields = self.config.late_init_fields.as_slice();
        if LateInitState::enter(fields) == LateInitState::NotNeeded {
            debug!("No late initialization required");
            return Ok(LateInitialized {
                resource: latest.clone(),
                state: LateInitState::NotNeeded,
            });
        }

        let observed = match self.read_one(cancel, latest).await {
            Ok(read) => read.latest,
            Err(failure) => {
                let (mut snapshot, error) = failure.snapshot_or(latest);
                let now = Utc::now();
                let conditions = &mut snapshot.status.conditions;
                conditions.set(
                    ConditionType::LateInitialized,
                    ConditionStatus::False,
                    Some(late_init::FAILURE_REASON),
                    Some(late_init::FAILURE_MESSAGE),
                    now,
                );
                if !conditions.has(ConditionType::Synced, ConditionStatus::False) {
                    conditions.set(ConditionType::Synced, ConditionStatus::False, None, None, now);
                }
                return Err(Failure::on(snapshot, error));
            }
        };

        let mut resource = latest.clone();
        late_init::fill_from_observed(fields, &mut resource.spec, &observed.spec);
        let state = LateInitState::assess(fields, &resource.spec);
        let now = Utc::now();
        let conditions = &mut resource.status.conditions;
        if state == LateInitState::Incomplete {
            conditions.set(
                ConditionType::LateInitialized,
                ConditionStatus::False,
                Some(late_init::DELAYED_REASON),
                Some(late_init::DELAYED_MESSAGE),
                now,
            );
            conditions.set(ConditionType::Synced, ConditionStatus::False, None, None, now);
        } else {
            conditions.set(
                ConditionType::LateInitialized,
                ConditionStatus::True,
                Some(late_init::SUCCESS_REASON),
                Some(late_init::SUCCESS_MESSAGE),
                now,
            );
        }
        debug!(%state, "Late initialization finished");
        Ok(LateInitialized { resource, state })
    }

    /// Copy of `desired` with the controller default tags merged in.
    #[must_use]
    pub fn ensure_tags(&self, desired: &Api) -> Api {
        let defaults = self.config.resolve_default_tags(&desired.metadata);
        let mut ensured = desired.clone();
        ensured.spec.tags = tags::ensure_tags(&desired.spec.tags, &defaults);
        ensured
    }

    /// Copy of `api` without backend system tags.
    #[must_use]
    pub fn filter_system_tags(&self, api: &Api) -> Api {
        let mut filtered = api.clone();
        filtered.spec.tags =
            tags::filter_system_tags(&api.spec.tags, &self.config.system_tag_prefix);
        filtered
    }

    fn system_tags_of(&self, observed: &Tags) -> Tags {
        let mut injected = observed.clone();
        injected.retain(|key, _| key.starts_with(&self.config.system_tag_prefix));
        injected
    }

    /// Whether `api` exists in the backend and is not stuck on a terminal
    /// error.
    #[must_use]
    pub fn is_synced(&self, api: &Api) -> bool {
        api.api_id().is_some()
            && !api
                .status
                .conditions
                .has(ConditionType::Terminal, ConditionStatus::True)
    }

    /// ARN for a resource path in this manager's account and region.
    #[must_use]
    pub fn arn_from_name(&self, name: &str) -> String {
        format!(
            "arn:aws:{}:{}:{}:{}",
            self.config.controller_service, self.config.region, self.config.account_id, name
        )
    }

    /// Fill ownership fields where unset. The ARN always follows the
    /// current api id.
    pub fn set_status_defaults(&self, api: &mut Api) {
        let status = &mut api.status;
        if status.owner_account_id.is_none() {
            status.owner_account_id = Some(self.config.account_id.clone());
        }
        if status.region.is_none() {
            status.region = Some(self.config.region.clone());
        }
        if let Some(api_id) = &status.api_id {
            status.arn = Some(self.arn_from_name(&format!("/apis/{api_id}")));
        }
    }

    /// Finish a successful call: status defaults, then clear failure
    /// conditions.
    #[must_use]
    pub fn on_success(&self, mut api: Api) -> Api {
        self.set_status_defaults(&mut api);
        self.classifier.classify(&mut api, None, Utc::now());
        api
    }

    /// Finish a failed call: record the failure on its snapshot, or on
    /// `fallback` when the call left none. A terminal classification comes
    /// back as `Error::Terminal`.
    #[must_use]
    pub fn on_error(&self, failure: Failure, fallback: &Api) -> Failure {
        let (mut snapshot, error) = failure.snapshot_or(fallback);
        let (changed, error) = self.classifier.record_failure(&mut snapshot, error, Utc::now());
        debug!(changed, terminal = error.is_terminal(), "Recorded failure");
        Failure::on(snapshot, error)
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("config", &self.config)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use gatewayctl_core::{ApiSpec, LateInitField, Provenance};

    use super::*;
    use crate::error::BackendError;
    use crate::memory::{DEFAULT_ROUTE_SELECTION_EXPRESSION, InMemoryBackend};
    use crate::metrics::{CallMetrics, NoopMetrics};
    use crate::types::{OperationClass, Verb};

    fn config() -> ControllerConfig {
        ControllerConfig::new("123456789012", "us-west-2")
    }

    fn manager_with(config: ControllerConfig, backend: Arc<InMemoryBackend>) -> ResourceManager {
        ResourceManager::new(config, backend, Arc::new(NoopMetrics))
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
    async fn test_create_sets_status_defaults() {
        let manager = manager_with(config(), Arc::new(InMemoryBackend::new()));

        let created = manager
            .create(&CancellationToken::new(), &http_api())
            .await
            .unwrap();

        let api_id = created.status.api_id.clone().unwrap();
        assert_eq!(created.status.owner_account_id.as_deref(), Some("123456789012"));
        assert_eq!(created.status.region.as_deref(), Some("us-west-2"));
        assert_eq!(
            created.status.arn,
            Some(format!("arn:aws:apigatewayv2:us-west-2:123456789012:/apis/{api_id}"))
        );
        assert_eq!(created.status.observed_generation, Some(0));
        assert!(manager.is_synced(&created));
    }

    #[tokio::test]
    async fn test_create_validation_failure_is_terminal() {
        let backend = Arc::new(InMemoryBackend::new());
        let manager = manager_with(config(), Arc::clone(&backend));
        let desired = Api::new("pets", "prod", ApiSpec::default());

        let failure = manager
            .create(&CancellationToken::new(), &desired)
            .await
            .unwrap_err();

        assert!(failure.error.is_terminal());
        let snapshot = failure.snapshot.unwrap();
        assert!(snapshot.status.conditions.has(ConditionType::Terminal, ConditionStatus::True));
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_configured_terminal_code() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .fail_next(Verb::CreateApi, BackendError::new("LimitExceededException", "quota"))
            .await;
        let manager = manager_with(
            config().terminal_codes(["LimitExceededException"]),
            Arc::clone(&backend),
        );

        let failure = manager
            .create(&CancellationToken::new(), &http_api())
            .await
            .unwrap_err();

        assert!(failure.error.is_terminal());
    }

    #[tokio::test]
    async fn test_read_one_mirrors_only_system_tags() {
        let backend = Arc::new(
            InMemoryBackend::new().with_system_tags([("aws:cloudformation:stack", "s")]),
        );
        let manager = manager_with(config(), Arc::clone(&backend));
        let created = manager
            .create(&CancellationToken::new(), &http_api())
            .await
            .unwrap();

        let read = manager
            .read_one(&CancellationToken::new(), &created)
            .await
            .unwrap();

        assert_eq!(read.desired.spec.tags.value("aws:cloudformation:stack"), Some("s"));
        assert_eq!(
            read.desired.spec.tags.get("aws:cloudformation:stack").map(|t| t.provenance),
            Some(Provenance::BackendSystem)
        );
        assert_eq!(
            read.latest.spec.route_selection_expression.as_deref(),
            Some(DEFAULT_ROUTE_SELECTION_EXPRESSION)
        );
        assert!(Delta::compare(&read.desired, &read.latest).is_empty());
    }

    #[tokio::test]
    async fn test_read_one_without_identifier() {
        let manager = manager_with(config(), Arc::new(InMemoryBackend::new()));
        let failure = manager
            .read_one(&CancellationToken::new(), &http_api())
            .await
            .unwrap_err();
        assert!(failure.error.is_not_found());
        assert!(failure.snapshot.unwrap().status.conditions.is_empty());
    }

    #[tokio::test]
    async fn test_late_initialize_without_fields_skips_read() {
        let backend = Arc::new(InMemoryBackend::new());
        let metrics = Arc::new(CallMetrics::new());
        let manager = ResourceManager::new(
            config(),
            backend,
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        );

        let result = manager
            .late_initialize(&CancellationToken::new(), &http_api())
            .await
            .unwrap();

        assert_eq!(result.state, LateInitState::NotNeeded);
        assert_eq!(result.resource, http_api());
        assert_eq!(metrics.total(), 0);
    }

    #[tokio::test]
    async fn test_late_initialize_fills_defaults() {
        let backend = Arc::new(InMemoryBackend::new());
        let metrics = Arc::new(CallMetrics::new());
        let manager = ResourceManager::new(
            config().late_init_fields([LateInitField::RouteSelectionExpression]),
            backend,
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        );
        let created = manager
            .create(&CancellationToken::new(), &http_api())
            .await
            .unwrap();

        let result = manager
            .late_initialize(&CancellationToken::new(), &created)
            .await
            .unwrap();

        assert_eq!(result.state, LateInitState::Complete);
        assert_eq!(
            result.resource.spec.route_selection_expression.as_deref(),
            Some(DEFAULT_ROUTE_SELECTION_EXPRESSION)
        );
        assert!(
            result
                .resource
                .status
                .conditions
                .has(ConditionType::LateInitialized, ConditionStatus::True)
        );
        assert_eq!(metrics.count(OperationClass::ReadOne, Verb::GetApi, true), 1);
    }

    #[tokio::test]
    async fn test_late_initialize_read_failure() {
        let backend = Arc::new(InMemoryBackend::new());
        let manager = manager_with(
            config().late_init_fields([LateInitField::Version]),
            Arc::clone(&backend),
        );
        let created = manager
            .create(&CancellationToken::new(), &http_api())
            .await
            .unwrap();
        backend
            .fail_next(Verb::GetApi, BackendError::new("ServiceUnavailableException", "down"))
            .await;

        let failure = manager
            .late_initialize(&CancellationToken::new(), &created)
            .await
            .unwrap_err();

        assert!(!failure.error.is_terminal());
        let conditions = &failure.snapshot.as_ref().unwrap().status.conditions;
        let late = conditions.get(ConditionType::LateInitialized).unwrap();
        assert_eq!(late.status, ConditionStatus::False);
        assert_eq!(late.reason.as_deref(), Some(late_init::FAILURE_REASON));
        let synced = conditions.get(ConditionType::Synced).unwrap();
        assert_eq!(synced.status, ConditionStatus::False);
        assert_eq!(synced.reason, Some(failure.error.to_string()));
    }

    #[tokio::test]
    async fn test_update_sends_no_system_tags() {
        let backend = Arc::new(
            InMemoryBackend::new().with_system_tags([("aws:cloudformation:stack", "s")]),
        );
        let manager = manager_with(config(), Arc::clone(&backend));
        let cancel = CancellationToken::new();
        let created = manager.create(&cancel, &http_api()).await.unwrap();
        let mut read = manager.read_one(&cancel, &created).await.unwrap();
        read.desired.spec.description = Some("pet store".into());
        read.desired.spec.tags.insert("team", gatewayctl_core::Tag::new("api", Provenance::User));
        let delta = Delta::compare(&read.desired, &read.latest);

        let updated = manager
            .update(&cancel, &read.desired, &read.latest, &delta)
            .await
            .unwrap();

        assert!(manager.is_synced(&updated));
        let stored = backend.api(created.api_id().unwrap()).await.unwrap();
        let tags = stored.tags.unwrap();
        assert_eq!(tags.get("aws:cloudformation:stack").map(String::as_str), Some("s"));
        assert_eq!(tags.get("team").map(String::as_str), Some("api"));
    }

    #[tokio::test]
    async fn test_update_selection_failure_keeps_desired_spec() {
        let backend = Arc::new(InMemoryBackend::new());
        let manager = manager_with(config(), Arc::clone(&backend));
        let cancel = CancellationToken::new();
        let created = manager.create(&cancel, &http_api()).await.unwrap();
        let read = manager.read_one(&cancel, &created).await.unwrap();
        let mut desired = read.desired.clone();
        desired.spec.name = None;
        desired.spec.description = Some("user wrote this".into());

        let failure = manager
            .update(&cancel, &desired, &read.latest, &Delta::default())
            .await
            .unwrap_err();

        assert!(failure.error.is_terminal());
        let snapshot = failure.snapshot.unwrap();
        assert_eq!(snapshot.spec, desired.spec);
        assert_eq!(snapshot.api_id(), created.api_id());
        assert!(snapshot.status.conditions.has(ConditionType::Terminal, ConditionStatus::True));
        assert_eq!(backend.calls().await, vec![Verb::CreateApi, Verb::GetApi]);
    }

    #[test]
    fn test_status_defaults_follow_current_api_id() {
        let manager = manager_with(config(), Arc::new(InMemoryBackend::new()));
        let mut api = http_api();
        api.status.api_id = Some("fresh".into());
        api.status.arn = Some(manager.arn_from_name("/apis/vanished"));

        manager.set_status_defaults(&mut api);

        assert_eq!(
            api.status.arn.as_deref(),
            Some("arn:aws:apigatewayv2:us-west-2:123456789012:/apis/fresh")
        );
    }

    #[test]
    fn test_ensure_tags_resolves_defaults() {
        let manager = manager_with(config(), Arc::new(InMemoryBackend::new()));
        let mut desired = http_api();
        desired.spec.tags =
            Tags::from_pairs([("services.k8s.aws/namespace", "mine")], Provenance::User);

        let ensured = manager.ensure_tags(&desired);

        assert_eq!(ensured.spec.tags.value("services.k8s.aws/namespace"), Some("mine"));
        assert!(ensured.spec.tags.contains_key("services.k8s.aws/controller-version"));
        assert_eq!(desired.spec.tags.len(), 1);
    }

    #[test]
    fn test_filter_system_tags_uses_configured_prefix() {
        let manager = manager_with(config(), Arc::new(InMemoryBackend::new()));
        let mut api = http_api();
        api.spec.tags =
            Tags::from_pairs([("aws:origin", "cfn"), ("team", "api")], Provenance::User);

        let filtered = manager.filter_system_tags(&api);
        assert_eq!(filtered.spec.tags.keys().collect::<Vec<_>>(), vec!["team"]);
    }
}
