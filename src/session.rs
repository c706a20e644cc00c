//! Session orchestration: key lifecycle and operation dispatch.
//!
//! Owns the first-run flow (no stored key means key entry), validates
//! candidate keys against the service, and applies the one cross-cutting
//! effect an operation can have: an Unauthorized outcome clears the stored
//! key so the next submission forces re-entry.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ServiceApi;
use crate::common::ConfigStore;
use crate::errors::AppError;
use crate::workflow::{FailureKind, OperationRequest, OperationWorkflow, Outcome, Phase};

/// Result of validating a candidate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    Accepted,
    Rejected,
    Unreachable { message: String },
}

pub struct SessionController<S: ServiceApi> {
    store: Arc<ConfigStore>,
    service: Arc<S>,
}

impl<S: ServiceApi + 'static> SessionController<S> {
    pub fn new(store: Arc<ConfigStore>, service: Arc<S>) -> Self {
        Self { store, service }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// First-run condition: no credential stored yet.
    pub fn needs_key(&self) -> bool {
        !self.store.has_key()
    }

    /// Validate a candidate key with a lightweight authenticated probe and
    /// persist it only when the service accepts it.
    pub async fn submit_key(&self, candidate: &str) -> Result<KeyCheck, AppError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(AppError::InvalidSettings(
                "API key must not be empty".to_string(),
            ));
        }

        let target = self.store.get();
        match self.service.probe_key(&target.base_url, candidate).await {
            Ok(true) => {
                self.store.set_key(candidate)?;
                tracing::info!("API key accepted and stored");
                Ok(KeyCheck::Accepted)
            }
            Ok(false) => Ok(KeyCheck::Rejected),
            Err(err) => Ok(KeyCheck::Unreachable {
                message: err.to_string(),
            }),
        }
    }

    /// Change the endpoint; takes effect for all subsequent operations and
    /// probes. Empty input resets to the default.
    pub fn set_endpoint(&self, url: &str) -> Result<(), AppError> {
        self.store.set_endpoint(url)
    }

    /// Start an operation in the background, returning its phase feed and
    /// join handle. Call `conclude` with the outcome afterwards.
    pub fn start(
        &self,
        request: OperationRequest,
    ) -> Result<(watch::Receiver<Phase>, JoinHandle<Outcome>), AppError> {
        if self.needs_key() {
            return Err(AppError::MissingKey);
        }
        let engine = OperationWorkflow::new(self.service.clone(), self.store.clone());
        let phases = engine.phases();
        let handle = tokio::spawn(engine.run(request));
        Ok((phases, handle))
    }

    /// Run an operation to completion and apply cross-cutting effects.
    pub async fn run_operation(&self, request: OperationRequest) -> Result<Outcome, AppError> {
        if self.needs_key() {
            return Err(AppError::MissingKey);
        }
        let engine = OperationWorkflow::new(self.service.clone(), self.store.clone());
        let outcome = engine.run(request).await;
        self.conclude(&outcome)?;
        Ok(outcome)
    }

    /// Apply the session-level side effect of a finished operation: an
    /// Unauthorized failure invalidates the stored key.
    pub fn conclude(&self, outcome: &Outcome) -> Result<(), AppError> {
        if matches!(outcome, Outcome::Failed(FailureKind::Unauthorized)) {
            tracing::warn!("Service rejected the API key; clearing stored credential");
            self.store.clear_key()?;
        }
        Ok(())
    }
}
