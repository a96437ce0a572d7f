//! Outbound calls to registered instances
//!
//! The hub forwards payloads without interpreting them. The only things it
//! cares about are whether the call finished in time, whether a connection
//! could be made, and whether the instance answered with a server error.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcphub::models::{Payload, ServiceInstance, ServiceType};
//! use mcphub::services::{HttpServiceClient, ServiceClient};
//! use serde_json::json;
//! use std::collections::BTreeSet;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpServiceClient::new();
//! let instance = ServiceInstance::new(
//!     ServiceType::Reasoning,
//!     "127.0.0.1:9001".to_string(),
//!     BTreeSet::from(["reasoning".to_string()]),
//! );
//!
//! let payload = Payload::Json(json!({"prompt": "hello"}));
//! let response = client
//!     .call(&instance, "reasoning", &payload, Duration::from_secs(5))
//!     .await?;
//! println!("Status: {}", response.status);
//! # Ok(())
//! # }
//! ```

use crate::models::{Payload, ServiceInstance};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while calling an instance
#[derive(Debug, thiserror::Error)]
pub enum ServiceClientError {
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Instance returned status {0}")]
    UpstreamStatus(u16),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Response body read failed: {0}")]
    ResponseBody(String),

    #[error("HTTP client setup failed: {0}")]
    ClientBuild(String),
}

impl ServiceClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceClientError::Timeout(_))
    }
}

/// Answer from an instance, passed back to the caller untouched
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamResponse {
    pub status: u16,
    pub body: Payload,
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ServiceClient: Send + Sync {
    /// Forwards `payload` to `instance` for `capability`, bounded by `timeout`
    async fn call(
        &self,
        instance: &ServiceInstance,
        capability: &str,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<DownstreamResponse, ServiceClientError>;
}

/// [`ServiceClient`] that POSTs to `{instance base url}/{capability}`
///
/// # Thread Safety
///
/// Cheap to clone and safe to share; the underlying reqwest::Client pools
/// connections across calls.
#[derive(Clone)]
pub struct HttpServiceClient {
    client: reqwest::Client,
}

impl Default for HttpServiceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServiceClient {
    /// Builds the client, falling back to reqwest defaults (no connect
    /// timeout) when the TLS backend cannot be set up.
    pub fn new() -> Self {
        Self::try_new().unwrap_or_else(|e| {
            tracing::warn!(
                "{}; using default HTTP client without connect timeout",
                e
            );
            Self {
                client: reqwest::Client::new(),
            }
        })
    }

    pub fn try_new() -> Result<Self, ServiceClientError> {
        Self::from_builder(reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT))
    }

    fn from_builder(builder: reqwest::ClientBuilder) -> Result<Self, ServiceClientError> {
        let client = builder
            .build()
            .map_err(|e| ServiceClientError::ClientBuild(e.to_string()))?;
        Ok(Self { client })
    }

    fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> Payload {
        if bytes.is_empty() {
            return Payload::Json(Value::Null);
        }

        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);

        if is_json {
            if let Ok(value) = serde_json::from_slice(bytes) {
                return Payload::Json(value);
            }
        }

        Payload::Raw(bytes.to_vec())
    }

    fn classify(err: reqwest::Error, timeout: Duration) -> ServiceClientError {
        if err.is_timeout() {
            ServiceClientError::Timeout(timeout.as_millis() as u64)
        } else {
            ServiceClientError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn call(
        &self,
        instance: &ServiceInstance,
        capability: &str,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<DownstreamResponse, ServiceClientError> {
        let url = instance.endpoint_url(capability);
        let url = reqwest::Url::parse(&url)
            .map_err(|e| ServiceClientError::InvalidAddress(format!("{}: {}", url, e)))?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, payload.content_type())
            .body(payload.to_bytes())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(e, timeout))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ServiceClientError::UpstreamStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ServiceClientError::Timeout(timeout.as_millis() as u64)
            } else {
                ServiceClientError::ResponseBody(e.to_string())
            }
        })?;

        Ok(DownstreamResponse {
            status: status.as_u16(),
            body: Self::decode_body(content_type.as_deref(), &bytes),
        })
    }
}
