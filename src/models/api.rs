//! Request and response bodies of the hub's HTTP API
//!
//! Shared by the handlers and the `hub-cli` client.

use crate::models::instance::{InstanceStatus, ServiceType};
use crate::models::routing::{Payload, RoutingRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub service_type: ServiceType,
    pub address: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub instance_id: Uuid,
    pub registered_at: DateTime<Utc>,
    /// How often the hub expects heartbeats, in milliseconds
    pub heartbeat_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub load: Option<u32>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    /// Self-reported status; an instance shedding load may send `degraded`
    #[serde(default)]
    pub status: Option<InstanceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub capability: String,
    #[serde(default)]
    pub payload: Option<Value>,
    /// Base64-encoded body for non-JSON payloads
    #[serde(default)]
    pub raw_payload: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl DispatchRequest {
    /// Validates the body and converts it into a [`RoutingRequest`]
    ///
    /// Exactly one of `payload` or `raw_payload` may be present; a missing
    /// payload forwards JSON `null`.
    pub fn into_routing_request(self) -> Result<RoutingRequest, String> {
        let capability = self.capability.trim().to_string();
        if capability.is_empty() {
            return Err("capability must not be empty".to_string());
        }

        let payload = match (self.payload, self.raw_payload) {
            (Some(_), Some(_)) => {
                return Err("payload and raw_payload are mutually exclusive".to_string())
            }
            (Some(value), None) => Payload::Json(value),
            (None, Some(encoded)) => Payload::from_base64(&encoded)
                .map_err(|e| format!("raw_payload is not valid base64: {}", e))?,
            (None, None) => Payload::Json(Value::Null),
        };

        let mut request = RoutingRequest::new(capability, payload);
        if let Some(ms) = self.timeout_ms {
            if ms == 0 {
                return Err("timeout_ms must be greater than zero".to_string());
            }
            request = request.with_timeout(Duration::from_millis(ms));
        }

        Ok(request)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListInstancesQuery {
    pub capability: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(payload: Option<Value>, raw: Option<&str>) -> DispatchRequest {
        DispatchRequest {
            capability: "reasoning".to_string(),
            payload,
            raw_payload: raw.map(str::to_string),
            timeout_ms: None,
        }
    }

    #[test]
    fn test_json_payload_conversion() {
        let routing = request(Some(json!({"prompt": "hi"})), None)
            .into_routing_request()
            .expect("valid request");
        assert_eq!(routing.required_capability, "reasoning");
        assert_eq!(routing.payload, Payload::Json(json!({"prompt": "hi"})));
        assert!(routing.timeout.is_none());
    }

    #[test]
    fn test_both_payload_kinds_rejected() {
        let result = request(Some(json!(1)), Some("AA==")).into_routing_request();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_capability_rejected() {
        let mut req = request(None, None);
        req.capability = "  ".to_string();
        assert!(req.into_routing_request().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut req = request(None, None);
        req.timeout_ms = Some(0);
        assert!(req.into_routing_request().is_err());
    }
}
