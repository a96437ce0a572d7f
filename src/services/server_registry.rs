//! Thread-safe service instance registry
//!
//! Single source of truth for which backend instances exist, what they can
//! do and how busy they are. Every mutation goes through a method on
//! [`ServerRegistry`] and is applied under one write lock, so heartbeat
//! updates and load bookkeeping on the same instance never interleave.

use crate::models::{
    canonical_base_url, HeartbeatRequest, InstanceStatus, ServiceInstance, ServiceType,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Instance already registered: {service_type} at {address} ({existing_id})")]
    DuplicateRegistration {
        service_type: ServiceType,
        address: String,
        existing_id: Uuid,
    },

    #[error("Instance not found: {0}")]
    UnknownInstance(Uuid),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Instances touched by one health sweep
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub demoted: Vec<Uuid>,
    pub evicted: Vec<Uuid>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.demoted.is_empty() && self.evicted.is_empty()
    }
}

/// Registry of [`ServiceInstance`]s indexed by instance id
///
/// Created once at startup and shared as [`SharedRegistry`] with the router,
/// the health monitor and the request controller.
///
/// # Examples
///
/// ```rust
/// use mcphub::models::ServiceType;
/// use mcphub::services::ServerRegistry;
/// use std::collections::BTreeSet;
///
/// let registry = ServerRegistry::shared();
/// let instance = registry
///     .register(
///         ServiceType::Reasoning,
///         "127.0.0.1:9001",
///         BTreeSet::from(["reasoning".to_string()]),
///     )
///     .unwrap();
///
/// let found = registry.list_by_capability("reasoning").unwrap();
/// assert_eq!(found[0].instance_id, instance.instance_id);
/// ```
#[derive(Debug, Default)]
pub struct ServerRegistry {
    instances: RwLock<HashMap<Uuid, ServiceInstance>>,
}

pub type SharedRegistry = Arc<ServerRegistry>;

impl ServerRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, ServiceInstance>>, RegistryError> {
        self.instances
            .read()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, ServiceInstance>>, RegistryError> {
        self.instances
            .write()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    }

    /// Registers a new instance as `healthy` with no load
    ///
    /// # Returns
    ///
    /// * `Ok(ServiceInstance)` - Snapshot of the new record
    /// * `Err(RegistryError::DuplicateRegistration)` - The same `(service_type, address)`
    ///   pair is registered and still healthy
    ///
    /// # Behavior
    ///
    /// The address is stored in canonical form (see [`canonical_base_url`]),
    /// so `host:port` and `http://host:port` are the same instance. A matching
    /// record that is no longer healthy is treated as stale and replaced by
    /// the new registration.
    pub fn register(
        &self,
        service_type: ServiceType,
        address: &str,
        capabilities: BTreeSet<String>,
    ) -> Result<ServiceInstance, RegistryError> {
        let address = canonical_base_url(address);
        let mut instances = self.write()?;

        let existing = instances
            .values()
            .find(|i| i.service_type == service_type && i.address == address)
            .map(|i| (i.instance_id, i.status));

        if let Some((existing_id, status)) = existing {
            if status == InstanceStatus::Healthy {
                return Err(RegistryError::DuplicateRegistration {
                    service_type,
                    address,
                    existing_id,
                });
            }
            instances.remove(&existing_id);
            tracing::info!(
                "Replacing stale {} instance {} at {} ({})",
                service_type,
                existing_id,
                address,
                status
            );
        }

        let instance = ServiceInstance::new(service_type, address, capabilities);
        instances.insert(instance.instance_id, instance.clone());

        tracing::info!(
            instance_id = %instance.instance_id,
            service_type = %instance.service_type,
            address = %instance.address,
            "Registered instance"
        );

        Ok(instance)
    }

    /// Removes an instance; unknown ids are a no-op
    ///
    /// Returns whether a record was actually removed.
    pub fn deregister(&self, instance_id: Uuid) -> Result<bool, RegistryError> {
        let removed = self.write()?.remove(&instance_id);

        match removed {
            Some(instance) => {
                tracing::info!(
                    instance_id = %instance_id,
                    address = %instance.address,
                    "Deregistered instance"
                );
                Ok(true)
            }
            None => {
                tracing::debug!("Deregister ignored for unknown instance {}", instance_id);
                Ok(false)
            }
        }
    }

    /// Records a liveness signal
    ///
    /// Refreshes `last_heartbeat` and overwrites the reported load and latency
    /// when present. The instance returns to `healthy` unless it reports a
    /// different status itself.
    pub fn heartbeat(
        &self,
        instance_id: Uuid,
        report: &HeartbeatRequest,
    ) -> Result<ServiceInstance, RegistryError> {
        let mut instances = self.write()?;
        let instance = instances
            .get_mut(&instance_id)
            .ok_or(RegistryError::UnknownInstance(instance_id))?;

        instance.last_heartbeat = Utc::now();
        if let Some(load) = report.load {
            instance.current_load = load;
        }
        if let Some(latency) = report.latency_ms {
            if latency.is_finite() {
                instance.recent_latency_ms = latency.max(0.0);
                instance.latency_samples = instance.latency_samples.max(1);
            }
        }

        let status = report.status.unwrap_or(InstanceStatus::Healthy);
        if instance.status != status {
            tracing::info!(
                "Instance {} status {} -> {} on heartbeat",
                instance_id,
                instance.status,
                status
            );
            instance.status = status;
        }

        Ok(instance.clone())
    }

    /// All instances advertising `capability`, whatever their health
    ///
    /// Ordered by registration time.
    pub fn list_by_capability(&self, capability: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let mut found: Vec<ServiceInstance> = self
            .read()?
            .values()
            .filter(|i| i.has_capability(capability))
            .cloned()
            .collect();
        found.sort_by_key(|i| (i.registered_at, i.instance_id));
        Ok(found)
    }

    pub fn list_all(&self) -> Result<Vec<ServiceInstance>, RegistryError> {
        let mut all: Vec<ServiceInstance> = self.read()?.values().cloned().collect();
        all.sort_by_key(|i| (i.registered_at, i.instance_id));
        Ok(all)
    }

    pub fn get(&self, instance_id: Uuid) -> Result<Option<ServiceInstance>, RegistryError> {
        Ok(self.read()?.get(&instance_id).cloned())
    }

    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }

    /// Picks a healthy instance and claims one unit of load on it atomically
    ///
    /// `choose` receives the healthy candidates advertising `capability`
    /// (minus `excluded`, ordered by registration time) and returns the index
    /// of the winner plus any context it wants handed back. The winner's
    /// `current_load` is incremented before the lock is released; the
    /// returned [`LoadGuard`] gives it back.
    ///
    /// Returns `Ok(None)` when there is no candidate or `choose` declines.
    pub fn checkout<T, F>(
        self: &Arc<Self>,
        capability: &str,
        excluded: &[Uuid],
        choose: F,
    ) -> Result<Option<(ServiceInstance, LoadGuard, T)>, RegistryError>
    where
        F: FnOnce(&[&ServiceInstance]) -> Option<(usize, T)>,
    {
        let mut instances = self.write()?;

        let mut candidates: Vec<&ServiceInstance> = instances
            .values()
            .filter(|i| i.is_healthy() && i.has_capability(capability))
            .filter(|i| !excluded.contains(&i.instance_id))
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        candidates.sort_by_key(|i| (i.registered_at, i.instance_id));

        let (index, context) = match choose(candidates.as_slice()) {
            Some(choice) => choice,
            None => return Ok(None),
        };
        let chosen_id = match candidates.get(index) {
            Some(instance) => instance.instance_id,
            None => return Ok(None),
        };

        let chosen = instances
            .get_mut(&chosen_id)
            .ok_or(RegistryError::UnknownInstance(chosen_id))?;
        chosen.current_load = chosen.current_load.saturating_add(1);
        let snapshot = chosen.clone();

        let guard = LoadGuard {
            registry: Arc::clone(self),
            instance_id: chosen_id,
            active: true,
        };

        Ok(Some((snapshot, guard, context)))
    }

    /// Gives back one unit of load; instances evicted mid-flight are ignored
    pub fn release(&self, instance_id: Uuid) -> Result<(), RegistryError> {
        if let Some(instance) = self.write()?.get_mut(&instance_id) {
            instance.current_load = instance.current_load.saturating_sub(1);
        }
        Ok(())
    }

    /// Folds an observed latency into the moving average
    ///
    /// `alpha` is the weight of the new sample. The first sample on an
    /// instance with no history is taken as-is; a latency reported by
    /// heartbeat counts as history, even when it is zero.
    pub fn record_latency(
        &self,
        instance_id: Uuid,
        observed_ms: f64,
        alpha: f64,
    ) -> Result<(), RegistryError> {
        if !observed_ms.is_finite() {
            return Ok(());
        }
        let observed_ms = observed_ms.max(0.0);

        if let Some(instance) = self.write()?.get_mut(&instance_id) {
            instance.recent_latency_ms = if instance.latency_samples == 0 {
                observed_ms
            } else {
                (1.0 - alpha) * instance.recent_latency_ms + alpha * observed_ms
            };
            instance.latency_samples = instance.latency_samples.saturating_add(1);
        }
        Ok(())
    }

    pub fn mark_status(&self, instance_id: Uuid, status: InstanceStatus) -> Result<(), RegistryError> {
        let mut instances = self.write()?;
        let instance = instances
            .get_mut(&instance_id)
            .ok_or(RegistryError::UnknownInstance(instance_id))?;

        if instance.status != status {
            tracing::warn!(
                "Instance {} at {} marked {} (was {})",
                instance_id,
                instance.address,
                status,
                instance.status
            );
            instance.status = status;
        }
        Ok(())
    }

    /// Demotes silent instances and evicts the ones silent for too long
    ///
    /// An instance whose last heartbeat is older than `evict_after` is removed.
    /// One older than `unhealthy_after` is set to `degraded` if it was healthy.
    pub fn sweep(
        &self,
        now: DateTime<Utc>,
        unhealthy_after: ChronoDuration,
        evict_after: ChronoDuration,
    ) -> Result<SweepReport, RegistryError> {
        let mut instances = self.write()?;
        let mut report = SweepReport::default();

        for instance in instances.values_mut() {
            let silence = now - instance.last_heartbeat;
            if silence > evict_after {
                report.evicted.push(instance.instance_id);
            } else if silence > unhealthy_after && instance.status == InstanceStatus::Healthy {
                instance.status = InstanceStatus::Degraded;
                report.demoted.push(instance.instance_id);
            }
        }

        for id in &report.evicted {
            if let Some(instance) = instances.remove(id) {
                tracing::info!(
                    instance_id = %id,
                    address = %instance.address,
                    "Evicted instance after missing heartbeats"
                );
            }
        }
        for id in &report.demoted {
            tracing::warn!("Instance {} missed heartbeats, marked degraded", id);
        }

        Ok(report)
    }
}

/// One unit of `current_load` claimed on an instance
///
/// Released exactly once, either explicitly or when dropped, so load
/// bookkeeping survives errors and cancelled futures alike.
#[derive(Debug)]
pub struct LoadGuard {
    registry: SharedRegistry,
    instance_id: Uuid,
    active: bool,
}

impl LoadGuard {
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = self.registry.release(self.instance_id) {
            tracing::error!("Failed to release load on {}: {}", self.instance_id, e);
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
