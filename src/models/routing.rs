use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Opaque request or response body forwarded between the caller and an instance
///
/// The hub never interprets the contents. JSON bodies stay structured so they
/// can be embedded in the dispatch response; anything else travels as bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw(Vec<u8>),
}

impl Payload {
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded.trim()).map(Payload::Raw)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Payload::Json(_) => "application/json",
            Payload::Raw(_) => "application/octet-stream",
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Json(value) => value.to_string().into_bytes(),
            Payload::Raw(bytes) => bytes.clone(),
        }
    }

    /// Splits into the `(body, raw_body)` pair used on the wire
    pub fn into_wire(self) -> (Option<Value>, Option<String>) {
        match self {
            Payload::Json(value) => (Some(value), None),
            Payload::Raw(bytes) => (None, Some(STANDARD.encode(bytes))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutingRequest {
    pub required_capability: String,
    pub payload: Payload,
    /// Overrides the configured dispatch timeout when set
    pub timeout: Option<Duration>,
}

impl RoutingRequest {
    pub fn new(required_capability: impl Into<String>, payload: Payload) -> Self {
        Self {
            required_capability: required_capability.into(),
            payload,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a single router selection, kept only for logging
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub chosen_instance_id: Uuid,
    pub chosen_address: String,
    pub candidate_pool: Vec<Uuid>,
    pub selection_weights: Vec<f64>,
    pub timestamp: DateTime<Utc>,
}
