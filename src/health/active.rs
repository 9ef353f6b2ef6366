//! Active health checking of the backing store.
//!
//! # Responsibilities
//! - Periodically probe the store connection
//! - Drive reconnect attempts while the connection is marked unhealthy
//! - Refresh the store health gauge

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::store::{BackingMode, ResilientClient};

pub struct StoreHealthMonitor {
    client: Arc<ResilientClient>,
    config: HealthCheckConfig,
}

impl StoreHealthMonitor {
    pub fn new(client: Arc<ResilientClient>, config: HealthCheckConfig) -> Self {
        Self { client, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Store health checks disabled; client reconnects on demand");
            return;
        }
        if self.client.mode() != BackingMode::Remote {
            tracing::info!(
                mode = ?self.client.mode(),
                "No remote store to probe; health monitor idle"
            );
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Store health monitor starting");

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Store health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One probe; returns whether the store is reachable.
    pub async fn check(&self) -> bool {
        let healthy = self.client.check_connection().await;
        let status = self.client.health_status();
        tracing::debug!(
            healthy,
            state = %status.state,
            reconnect_attempts = status.reconnect_attempts,
            "Store health probe finished"
        );
        healthy
    }
}
