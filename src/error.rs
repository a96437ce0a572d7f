use crate::services::RegistryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors returned to direct API callers
///
/// Only registration and heartbeat failures surface here. Dispatch failures
/// are absorbed into fallback responses and never reach this type.
///
/// | Variant               | Status | `error` code             |
/// |-----------------------|--------|--------------------------|
/// | DuplicateRegistration | 409    | `duplicate_registration` |
/// | UnknownInstance       | 404    | `unknown_instance`       |
/// | Validation            | 400    | `invalid_request`        |
/// | Internal              | 500    | `internal_error`         |
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Instance already registered: {service_type} at {address}")]
    DuplicateRegistration {
        service_type: String,
        address: String,
        existing_id: Uuid,
    },

    #[error("Instance not found: {0}")]
    UnknownInstance(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DuplicateRegistration { .. } => "duplicate_registration",
            AppError::UnknownInstance(_) => "unknown_instance",
            AppError::Validation(_) => "invalid_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DuplicateRegistration { .. } => StatusCode::CONFLICT,
            AppError::UnknownInstance(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateRegistration {
                service_type,
                address,
                existing_id,
            } => AppError::DuplicateRegistration {
                service_type: service_type.to_string(),
                address,
                existing_id,
            },
            RegistryError::UnknownInstance(id) => AppError::UnknownInstance(id),
            RegistryError::Unavailable(msg) => AppError::Internal(msg),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let description = match &self {
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": code,
            "error_description": description,
        });
        if let AppError::DuplicateRegistration { existing_id, .. } = &self {
            body["existing_instance_id"] = json!(existing_id);
        }

        (status, Json(body)).into_response()
    }
}
