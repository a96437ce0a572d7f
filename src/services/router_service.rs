//! Capability-based instance selection
//!
//! The router filters the registry down to healthy instances advertising the
//! requested capability and draws one at random, with probability proportional
//! to a [`WeightingStrategy`] score. Traffic spreads across instances instead
//! of piling onto whichever one looks least loaded at that instant.

use crate::models::{RoutingDecision, ServiceInstance};
use crate::services::server_registry::{LoadGuard, RegistryError, SharedRegistry};
use chrono::Utc;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("No healthy instance for capability: {0}")]
    NoHealthyInstance(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Scores an instance for weighted random selection
///
/// Higher is better. Scores must be finite and non-negative; anything else
/// is treated as zero.
pub trait WeightingStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn weight(&self, instance: &ServiceInstance) -> f64;
}

/// `1 / (1 + load) * 1 / (1 + latency / scale)`
///
/// An idle instance with no observed latency scores 1.0, and the score
/// strictly decreases as either load or latency grows.
#[derive(Debug, Clone)]
pub struct InverseLoadLatency {
    latency_scale_ms: f64,
}

impl InverseLoadLatency {
    pub fn new(latency_scale_ms: f64) -> Self {
        let latency_scale_ms = if latency_scale_ms.is_finite() && latency_scale_ms > 0.0 {
            latency_scale_ms
        } else {
            1.0
        };
        Self { latency_scale_ms }
    }
}

impl Default for InverseLoadLatency {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl WeightingStrategy for InverseLoadLatency {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn weight(&self, instance: &ServiceInstance) -> f64 {
        let load_term = 1.0 / (1.0 + instance.current_load as f64);
        let latency = instance.recent_latency_ms.max(0.0) / self.latency_scale_ms;
        let latency_term = 1.0 / (1.0 + latency);
        load_term * latency_term
    }
}

/// Every healthy instance is equally likely
#[derive(Debug, Clone, Default)]
pub struct Uniform;

impl WeightingStrategy for Uniform {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn weight(&self, _instance: &ServiceInstance) -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    Weighted,
    Uniform,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::Weighted => "weighted",
            RoutingStrategy::Uniform => "uniform",
        }
    }

    pub fn build(self, latency_scale_ms: f64) -> Arc<dyn WeightingStrategy> {
        match self {
            RoutingStrategy::Weighted => Arc::new(InverseLoadLatency::new(latency_scale_ms)),
            RoutingStrategy::Uniform => Arc::new(Uniform),
        }
    }
}

impl FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" => Ok(RoutingStrategy::Weighted),
            "uniform" => Ok(RoutingStrategy::Uniform),
            other => Err(format!("Unknown routing strategy: {}", other)),
        }
    }
}

/// Chooses an index with probability proportional to `weights`
///
/// Falls back to a uniform draw when all weights are equal or none of them
/// is usable.
pub fn pick_weighted<R: Rng>(weights: &[f64], rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }

    let first = weights[0];
    let all_equal = weights.iter().all(|w| (w - first).abs() < f64::EPSILON);
    if all_equal {
        return Some(rng.gen_range(0..weights.len()));
    }

    match WeightedIndex::new(weights) {
        Ok(dist) => Some(dist.sample(rng)),
        Err(_) => Some(rng.gen_range(0..weights.len())),
    }
}

fn sanitize(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// A routed instance with one unit of load claimed on it
///
/// Dropping the selection gives the load back.
#[derive(Debug)]
pub struct Selection {
    pub instance: ServiceInstance,
    pub decision: RoutingDecision,
    guard: LoadGuard,
}

impl Selection {
    pub fn instance_id(&self) -> Uuid {
        self.instance.instance_id
    }

    pub fn release(self) {
        self.guard.release();
    }
}

#[derive(Clone)]
pub struct RouterService {
    registry: SharedRegistry,
    strategy: Arc<dyn WeightingStrategy>,
}

impl RouterService {
    pub fn new(registry: SharedRegistry, strategy: Arc<dyn WeightingStrategy>) -> Self {
        Self { registry, strategy }
    }

    pub fn with_default_strategy(registry: SharedRegistry) -> Self {
        Self::new(registry, Arc::new(InverseLoadLatency::default()))
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn select(&self, required_capability: &str) -> Result<Selection, RouterError> {
        self.select_excluding(required_capability, &[])
    }

    /// Selects a healthy instance, skipping the ids in `excluded`
    ///
    /// The chosen instance's `current_load` is incremented before this
    /// returns, so concurrent selections see it immediately.
    pub fn select_excluding(
        &self,
        required_capability: &str,
        excluded: &[Uuid],
    ) -> Result<Selection, RouterError> {
        let strategy = Arc::clone(&self.strategy);

        let outcome = self
            .registry
            .checkout(required_capability, excluded, |candidates| {
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|c| sanitize(strategy.weight(c)))
                    .collect();
                let pool: Vec<Uuid> = candidates.iter().map(|c| c.instance_id).collect();
                let index = pick_weighted(&weights, &mut rand::thread_rng())?;
                Some((index, (pool, weights)))
            })?;

        let (instance, guard, (candidate_pool, selection_weights)) = outcome
            .ok_or_else(|| RouterError::NoHealthyInstance(required_capability.to_string()))?;

        let decision = RoutingDecision {
            chosen_instance_id: instance.instance_id,
            chosen_address: instance.address.clone(),
            candidate_pool,
            selection_weights,
            timestamp: Utc::now(),
        };

        tracing::debug!(
            capability = required_capability,
            strategy = self.strategy.name(),
            chosen = %decision.chosen_instance_id,
            pool = ?decision.candidate_pool,
            weights = ?decision.selection_weights,
            "Routing decision"
        );

        Ok(Selection {
            instance,
            decision,
            guard,
        })
    }
}
