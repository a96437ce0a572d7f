use crate::models::routing::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Why a dispatch ended in a fallback instead of a real answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NoHealthyInstance,
    DownstreamTimeout,
    DownstreamError,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackReason::NoHealthyInstance => "no_healthy_instance",
            FallbackReason::DownstreamTimeout => "downstream_timeout",
            FallbackReason::DownstreamError => "downstream_error",
        };
        f.write_str(s)
    }
}

/// Result of `POST /dispatch`
///
/// Always returned with HTTP 200. `degraded` tells real answers apart from
/// fallbacks, and `reason` says which failure produced the fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FallbackReason>,
    pub capability: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Uuid>,
    /// Downstream HTTP status for real answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Base64 body when the instance answered with non-JSON content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Downstream calls attempted, zero when nothing was routable
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl DispatchResponse {
    pub fn success(
        capability: &str,
        instance_id: Uuid,
        status: u16,
        payload: Payload,
        attempts: u32,
    ) -> Self {
        let (body, raw_body) = payload.into_wire();
        Self {
            degraded: false,
            reason: None,
            capability: capability.to_string(),
            instance_id: Some(instance_id),
            status: Some(status),
            body,
            raw_body,
            message: None,
            attempts,
            timestamp: Utc::now(),
        }
    }

    pub fn fallback(capability: &str, reason: FallbackReason, attempts: u32) -> Self {
        let message = match reason {
            FallbackReason::NoHealthyInstance => {
                format!("No healthy instance available for '{}'", capability)
            }
            FallbackReason::DownstreamTimeout => {
                format!("All instances for '{}' timed out", capability)
            }
            FallbackReason::DownstreamError => {
                format!("All instances for '{}' failed", capability)
            }
        };

        Self {
            degraded: true,
            reason: Some(reason),
            capability: capability.to_string(),
            instance_id: None,
            status: None,
            body: None,
            raw_body: None,
            message: Some(message),
            attempts,
            timestamp: Utc::now(),
        }
    }
}
