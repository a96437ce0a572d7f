//! Dispatch with bounded latency and graceful degradation
//!
//! Per request the controller walks a small state machine:
//!
//! ```text
//! SELECTING -> CALLING -> SUCCEEDED
//!                      -> RETRYING -> CALLING -> SUCCEEDED | FALLBACK
//!                      -> FALLBACK
//! SELECTING (no healthy instance) -> FALLBACK
//! ```
//!
//! Every path ends in a [`DispatchResponse`]; failures never escape as errors.

use crate::models::{DispatchResponse, FallbackReason, InstanceStatus, Payload, RoutingRequest};
use crate::services::router_service::{RouterError, RouterService, Selection};
use crate::services::server_registry::{RegistryError, SharedRegistry};
use crate::services::service_client::{DownstreamResponse, ServiceClient, ServiceClientError};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Used when the request does not carry its own timeout
    pub default_timeout: Duration,
    /// Reroutes allowed after the first failed call
    pub max_retries: u32,
    /// Weight of a new latency sample in the moving average
    pub latency_ema_alpha: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            max_retries: 1,
            latency_ema_alpha: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Selecting,
    Calling,
    Retrying,
    Succeeded,
    Fallback,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchState::Selecting => "SELECTING",
            DispatchState::Calling => "CALLING",
            DispatchState::Retrying => "RETRYING",
            DispatchState::Succeeded => "SUCCEEDED",
            DispatchState::Fallback => "FALLBACK",
        };
        f.write_str(s)
    }
}

fn fallback_reason(err: &ServiceClientError) -> FallbackReason {
    if err.is_timeout() {
        FallbackReason::DownstreamTimeout
    } else {
        FallbackReason::DownstreamError
    }
}

pub struct RequestController {
    registry: SharedRegistry,
    router: RouterService,
    client: Arc<dyn ServiceClient>,
    config: DispatchConfig,
}

impl RequestController {
    pub fn new(
        registry: SharedRegistry,
        router: RouterService,
        client: Arc<dyn ServiceClient>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            router,
            client,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Routes `request` to a healthy instance and returns its answer
    ///
    /// On a timeout or failed call the instance is marked `degraded` and the
    /// request is rerouted to a different instance, up to `max_retries` times.
    /// When nothing is routable or every attempt failed, a fallback response
    /// with `degraded: true` is returned instead.
    pub async fn dispatch(&self, request: RoutingRequest) -> DispatchResponse {
        let capability = request.required_capability.as_str();
        let timeout = request.timeout.unwrap_or(self.config.default_timeout);
        let max_attempts = self.config.max_retries.saturating_add(1);

        let mut excluded: Vec<Uuid> = Vec::new();
        let mut attempts: u32 = 0;
        let mut last_failure: Option<FallbackReason> = None;

        loop {
            let state = if attempts == 0 {
                DispatchState::Selecting
            } else {
                DispatchState::Retrying
            };
            tracing::debug!(capability, attempts, "Dispatch {}", state);

            let selection = match self.router.select_excluding(capability, &excluded) {
                Ok(selection) => selection,
                Err(RouterError::NoHealthyInstance(_)) => {
                    let reason = last_failure.unwrap_or(FallbackReason::NoHealthyInstance);
                    return self.fallback(capability, reason, attempts);
                }
                Err(RouterError::Registry(e)) => {
                    tracing::error!("Registry unavailable while routing {}: {}", capability, e);
                    let reason = last_failure.unwrap_or(FallbackReason::NoHealthyInstance);
                    return self.fallback(capability, reason, attempts);
                }
            };

            attempts += 1;
            let instance_id = selection.instance_id();

            match self.call(&selection, capability, &request.payload, timeout).await {
                Ok((response, elapsed)) => {
                    self.record_latency(instance_id, elapsed);
                    selection.release();

                    tracing::debug!(
                        capability,
                        instance_id = %instance_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Dispatch {}",
                        DispatchState::Succeeded
                    );
                    return DispatchResponse::success(
                        capability,
                        instance_id,
                        response.status,
                        response.body,
                        attempts,
                    );
                }
                Err(err) => {
                    selection.release();
                    self.mark_degraded(instance_id);

                    let reason = fallback_reason(&err);
                    tracing::warn!(
                        capability,
                        instance_id = %instance_id,
                        attempt = attempts,
                        "Downstream call failed: {}",
                        err
                    );

                    excluded.push(instance_id);
                    last_failure = Some(reason);

                    if attempts >= max_attempts {
                        return self.fallback(capability, reason, attempts);
                    }
                }
            }
        }
    }

    async fn call(
        &self,
        selection: &Selection,
        capability: &str,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<(DownstreamResponse, Duration), ServiceClientError> {
        tracing::debug!(
            capability,
            instance_id = %selection.instance_id(),
            address = %selection.instance.address,
            "Dispatch {}",
            DispatchState::Calling
        );

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            timeout,
            self.client
                .call(&selection.instance, capability, payload, timeout),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => Ok((response, started.elapsed())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ServiceClientError::Timeout(timeout.as_millis() as u64)),
        }
    }

    fn record_latency(&self, instance_id: Uuid, elapsed: Duration) {
        let observed_ms = elapsed.as_secs_f64() * 1000.0;
        if let Err(e) =
            self.registry
                .record_latency(instance_id, observed_ms, self.config.latency_ema_alpha)
        {
            tracing::warn!("Failed to record latency for {}: {}", instance_id, e);
        }
    }

    fn mark_degraded(&self, instance_id: Uuid) {
        match self
            .registry
            .mark_status(instance_id, InstanceStatus::Degraded)
        {
            Ok(()) => {}
            Err(RegistryError::UnknownInstance(_)) => {
                tracing::debug!("Instance {} already gone, not marking degraded", instance_id);
            }
            Err(e) => tracing::warn!("Failed to mark {} degraded: {}", instance_id, e),
        }
    }

    fn fallback(&self, capability: &str, reason: FallbackReason, attempts: u32) -> DispatchResponse {
        tracing::warn!(
            capability,
            attempts,
            reason = %reason,
            "Dispatch {}",
            DispatchState::Fallback
        );
        DispatchResponse::fallback(capability, reason, attempts)
    }
}
