//! Backend operation execution.
//!
//! Every backend call goes through [`Executor::call`], which races the call
//! against cancellation and records exactly one metric per call.

use std::future::Future;

use gatewayctl_core::Api;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{ApiBackend, ApiOutput, BackendResult};
use crate::error::{BackendError, Error, Failure, ValidationError};
use crate::mapping;
use crate::metrics::MetricsSink;
use crate::types::{Operation, OperationClass, Verb};

/// Runs backend verbs for one reconcile.
pub struct Executor<'a> {
    backend: &'a dyn ApiBackend,
    metrics: &'a dyn MetricsSink,
}

impl<'a> Executor<'a> {
    pub const fn new(backend: &'a dyn ApiBackend, metrics: &'a dyn MetricsSink) -> Self {
        Self { backend, metrics }
    }

    /// Await a backend call unless the reconcile is cancelled first.
    ///
    /// Cancellation surfaces as [`BackendError::cancelled`], which is always
    /// retryable.
    async fn call<T>(
        &self,
        cancel: &CancellationToken,
        class: OperationClass,
        verb: Verb,
        call: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BackendError::cancelled()),
            result = call => result,
        };
        self.metrics.record_call(class, verb, result.as_ref().err());
        if let Err(err) = &result {
            warn!(class = %class, verb = %verb, error = %err, "Backend call failed");
        }
        result
    }

    /// Run a create- or update-class operation for `desired`.
    ///
    /// On success the response's status fields are merged into a copy of
    /// `desired`. On failure the error is returned unchanged; update-class
    /// failures are attributed to `desired`, create-class failures to no
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns a `Failure` carrying the backend error, or
    /// `ValidationError::MissingApiId` for a reimport without identifier.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        operation: Operation,
        desired: &Api,
    ) -> Result<Api, Failure> {
        let class = operation.class();
        let verb = operation.verb();
        info!(resource = %desired.key(), %operation, "Executing backend operation");

        let output: BackendResult<ApiOutput> = match operation {
            Operation::Create => {
                let input = mapping::create_input(&desired.spec);
                self.call(cancel, class, verb, self.backend.create(input)).await
            }
            Operation::Import => {
                let input = mapping::import_input(&desired.spec);
                self.call(cancel, class, verb, self.backend.import(input)).await
            }
            Operation::Update => {
                let input = mapping::update_input(desired);
                self.call(cancel, class, verb, self.backend.update(input)).await
            }
            Operation::Reimport => {
                let Some(api_id) = desired.api_id() else {
                    return Err(Failure::on(desired.clone(), ValidationError::MissingApiId.into()));
                };
                let input = mapping::reimport_input(api_id, &desired.spec);
                self.call(cancel, class, verb, self.backend.reimport(input)).await
            }
        };

        match output {
            Ok(output) => {
                let mut merged = desired.clone();
                mapping::merge_status(&mut merged.status, &output);
                debug!(api_id = ?merged.status.api_id, "Merged backend response");
                Ok(merged)
            }
            Err(err) => {
                let snapshot = match class {
                    OperationClass::Create => None,
                    _ => Some(desired.clone()),
                };
                Err(Failure::new(snapshot, err.into()))
            }
        }
    }

    /// Read the backend state of `desired`.
    ///
    /// The response is overlaid on a copy of `desired`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when no identifier is assigned or the backend does
    /// not know it; otherwise the backend error.
    pub async fn read(&self, cancel: &CancellationToken, desired: &Api) -> Result<Api, Failure> {
        let Some(api_id) = desired.api_id() else {
            return Err(Failure::on(desired.clone(), Error::NotFound));
        };
        let input = mapping::get_input(api_id);
        let verb = Verb::GetApi;
        match self
            .call(cancel, OperationClass::ReadOne, verb, self.backend.read(input))
            .await
        {
            Ok(output) => {
                let mut observed = desired.clone();
                mapping::merge_observed(&mut observed, &output);
                Ok(observed)
            }
            Err(err) if err.is_not_found() => Err(Failure::on(desired.clone(), Error::NotFound)),
            Err(err) => Err(Failure::on(desired.clone(), err.into())),
        }
    }

    /// Delete the backend resource. A resource without identifier, or one
    /// the backend no longer knows, is already deleted.
    ///
    /// # Errors
    ///
    /// Returns the backend error attributed to `api`.
    pub async fn delete(&self, cancel: &CancellationToken, api: &Api) -> Result<(), Failure> {
        let Some(api_id) = api.api_id() else {
            debug!(resource = %api.key(), "Nothing to delete");
            return Ok(());
        };
        let input = mapping::delete_input(api_id);
        match self
            .call(cancel, OperationClass::Delete, Verb::DeleteApi, self.backend.delete(input))
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(Failure::on(api.clone(), err.into())),
        }
    }
}
