use super::extract::ApiJson;
use crate::error::{AppError, Result};
use crate::models::{DispatchRequest, DispatchResponse};
use crate::AppState;
use axum::{extract::State, response::Json};

/// `POST /dispatch`
///
/// Malformed requests are rejected with 400. Once a request is valid the
/// answer is always 200: either the instance's response or a fallback with
/// `degraded: true`.
pub async fn dispatch_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DispatchRequest>,
) -> Result<Json<DispatchResponse>> {
    let routing_request = request
        .into_routing_request()
        .map_err(AppError::Validation)?;

    let response = state.controller.dispatch(routing_request).await;
    Ok(Json(response))
}
