use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Category of backend service an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Reasoning,
    Memory,
    Personality,
    Knowledge,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Reasoning => "reasoning",
            ServiceType::Memory => "memory",
            ServiceType::Personality => "personality",
            ServiceType::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reasoning" => Ok(ServiceType::Reasoning),
            "memory" => Ok(ServiceType::Memory),
            "personality" => Ok(ServiceType::Personality),
            "knowledge" => Ok(ServiceType::Knowledge),
            other => Err(format!("Unknown service type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Healthy,
    Degraded,
    Unreachable,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Healthy => "healthy",
            InstanceStatus::Degraded => "degraded",
            InstanceStatus::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered backend process offering one or more capabilities
///
/// Records are owned by the [`ServerRegistry`](crate::services::ServerRegistry);
/// everything handed out to callers is a snapshot clone.
///
/// # Fields
///
/// * `address` - `host:port` or a full base URL used for dispatch
/// * `current_load` - requests currently in flight through the hub
/// * `recent_latency_ms` - exponential moving average of observed response times
/// * `latency_samples` - how many observations `recent_latency_ms` is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance_id: Uuid,
    pub service_type: ServiceType,
    pub address: String,
    pub capabilities: BTreeSet<String>,
    pub status: InstanceStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub current_load: u32,
    pub recent_latency_ms: f64,
    #[serde(default)]
    pub latency_samples: u64,
}

impl ServiceInstance {
    pub fn new(service_type: ServiceType, address: String, capabilities: BTreeSet<String>) -> Self {
        let now = Utc::now();
        Self {
            instance_id: Uuid::new_v4(),
            service_type,
            address,
            capabilities,
            status: InstanceStatus::Healthy,
            registered_at: now,
            last_heartbeat: now,
            current_load: 0,
            recent_latency_ms: 0.0,
            latency_samples: 0,
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == InstanceStatus::Healthy
    }

    /// Base URL for outbound calls, assuming `http://` when no scheme is given
    pub fn base_url(&self) -> String {
        canonical_base_url(&self.address)
    }

    pub fn endpoint_url(&self, capability: &str) -> String {
        format!("{}/{}", self.base_url(), capability.trim_start_matches('/'))
    }
}

/// Canonical form of an instance address
///
/// `host:port`, `HTTP://Host:port/` and `http://host:port` all map to
/// `http://host:port`. The scheme and authority are lower-cased; any path is
/// kept as written, minus trailing slashes.
pub fn canonical_base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("http".to_string(), trimmed),
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    format!("{}://{}{}", scheme, authority.to_ascii_lowercase(), path)
}
