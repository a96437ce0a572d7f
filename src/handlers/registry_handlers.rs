use super::extract::{ApiJson, InstanceId};
use crate::error::{AppError, Result};
use crate::models::{
    HeartbeatRequest, ListInstancesQuery, RegisterRequest, RegisterResponse, ServiceInstance,
};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;

// Capabilities are trimmed; an instance that names none serves its own type
fn normalize_capabilities(request: &RegisterRequest) -> BTreeSet<String> {
    let capabilities: BTreeSet<String> = request
        .capabilities
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if capabilities.is_empty() {
        BTreeSet::from([request.service_type.as_str().to_string()])
    } else {
        capabilities
    }
}

/// `POST /register`
pub async fn register_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>> {
    if request.address.trim().is_empty() {
        return Err(AppError::Validation("address must not be empty".to_string()));
    }

    let capabilities = normalize_capabilities(&request);
    let instance = state
        .registry
        .register(request.service_type, &request.address, capabilities)?;

    Ok(Json(RegisterResponse {
        instance_id: instance.instance_id,
        registered_at: instance.registered_at,
        heartbeat_interval_ms: state.config.heartbeat_interval.as_millis() as u64,
    }))
}

/// `POST /heartbeat/{instance_id}`
///
/// The body is optional; an empty body is a bare liveness signal.
pub async fn heartbeat_handler(
    State(state): State<AppState>,
    InstanceId(instance_id): InstanceId,
    body: Bytes,
) -> Result<Json<ServiceInstance>> {
    let report: HeartbeatRequest = if body.iter().all(u8::is_ascii_whitespace) {
        HeartbeatRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid heartbeat body: {}", e)))?
    };

    if let Some(latency) = report.latency_ms {
        if !latency.is_finite() || latency < 0.0 {
            return Err(AppError::Validation(
                "latency_ms must be a non-negative number".to_string(),
            ));
        }
    }

    let instance = state.registry.heartbeat(instance_id, &report)?;
    Ok(Json(instance))
}

/// `DELETE /instances/{instance_id}`
///
/// Always 204, including for ids that were never registered.
pub async fn deregister_handler(
    State(state): State<AppState>,
    InstanceId(instance_id): InstanceId,
) -> Result<StatusCode> {
    state.registry.deregister(instance_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /instances?capability=`
pub async fn list_instances_handler(
    State(state): State<AppState>,
    Query(query): Query<ListInstancesQuery>,
) -> Result<Json<Vec<ServiceInstance>>> {
    let instances = match query.capability.as_deref() {
        Some(capability) => state.registry.list_by_capability(capability)?,
        None => state.registry.list_all()?,
    };
    Ok(Json(instances))
}

/// `GET /instances/{instance_id}`
pub async fn get_instance_handler(
    State(state): State<AppState>,
    InstanceId(instance_id): InstanceId,
) -> Result<Json<ServiceInstance>> {
    state
        .registry
        .get(instance_id)?
        .map(Json)
        .ok_or(AppError::UnknownInstance(instance_id))
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let instances = state.registry.list_all()?;
    let healthy = instances.iter().filter(|i| i.is_healthy()).count();

    Ok(Json(json!({
        "status": "ok",
        "instances": instances.len(),
        "healthy_instances": healthy,
        "routing_strategy": state.config.routing_strategy.as_str(),
    })))
}
