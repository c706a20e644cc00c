//! Periodic service liveness monitor.
//!
//! Publishes a tri-state status over a watch channel for a passive
//! indicator. It never gates an operation: a submission attempted while
//! the monitor shows Offline simply fails through the normal network or
//! server error paths.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ServiceApi;
use crate::common::ConfigStore;

pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Checking,
    Online,
    Offline,
}

pub struct HealthMonitor<S: ServiceApi> {
    service: Arc<S>,
    store: Arc<ConfigStore>,
}

impl<S: ServiceApi + 'static> HealthMonitor<S> {
    pub fn new(service: Arc<S>, store: Arc<ConfigStore>) -> Self {
        Self { service, store }
    }

    /// One probe against the currently configured endpoint. The endpoint
    /// is re-read on every cycle so a reconfiguration applies to the next
    /// probe without restarting the monitor.
    pub async fn probe_once(&self) -> HealthStatus {
        let target = self.store.get();
        match self.service.health(&target.base_url).await {
            Ok(true) => HealthStatus::Online,
            Ok(false) => {
                tracing::debug!(endpoint = %target.base_url, "Service reported degraded");
                HealthStatus::Offline
            }
            Err(err) => {
                tracing::debug!(endpoint = %target.base_url, %err, "Health probe failed");
                HealthStatus::Offline
            }
        }
    }

    /// Spawn the recurring probe loop. The task stops once every receiver
    /// is dropped.
    pub fn spawn(self, interval: Duration) -> (watch::Receiver<HealthStatus>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(HealthStatus::Checking);

        let handle = tokio::spawn(async move {
            loop {
                let _ = tx.send(HealthStatus::Checking);
                let status = self.probe_once().await;
                if tx.send(status).is_err() {
                    break;
                }
                tokio::time::sleep(interval).await;
                if tx.is_closed() {
                    break;
                }
            }
        });

        (rx, handle)
    }
}
