//! Heartbeat-based health monitoring
//!
//! A background task that scans the registry on a fixed interval. Instances
//! silent for longer than the unhealthy threshold are demoted to `degraded`;
//! instances silent past the eviction threshold are removed.

use crate::services::server_registry::{RegistryError, SharedRegistry, SweepReport};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub scan_interval: Duration,
    pub unhealthy_after: Duration,
    pub evict_after: Duration,
}

impl HealthConfig {
    /// Thresholds derived from the expected heartbeat period
    ///
    /// Demote after two missed periods, evict after three, scan twice per period.
    pub fn from_heartbeat_interval(heartbeat_interval: Duration) -> Self {
        Self {
            scan_interval: (heartbeat_interval / 2).max(Duration::from_millis(1)),
            unhealthy_after: heartbeat_interval * 2,
            evict_after: heartbeat_interval * 3,
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[derive(Clone)]
pub struct HealthMonitor {
    registry: SharedRegistry,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(registry: SharedRegistry, config: HealthConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Runs one sweep as if the current time were `now`
    pub fn scan_at(&self, now: DateTime<Utc>) -> Result<SweepReport, RegistryError> {
        self.registry.sweep(
            now,
            to_chrono(self.config.unhealthy_after),
            to_chrono(self.config.evict_after),
        )
    }

    /// One scheduled scan; failures are logged and left for the next tick
    pub fn tick(&self) -> Option<SweepReport> {
        match self.scan_at(Utc::now()) {
            Ok(report) => {
                if !report.is_empty() {
                    tracing::info!(
                        demoted = report.demoted.len(),
                        evicted = report.evicted.len(),
                        "Health scan updated registry"
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::warn!("Health scan failed, retrying next tick: {}", e);
                None
            }
        }
    }

    /// Scans on every interval until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            scan_interval_ms = self.config.scan_interval.as_millis() as u64,
            unhealthy_after_ms = self.config.unhealthy_after.as_millis() as u64,
            evict_after_ms = self.config.evict_after.as_millis() as u64,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Health monitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
