use crate::error::AppError;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// JSON body extractor whose rejections use the API error shape
///
/// Missing content type, syntax errors and unknown enum values all come back
/// as 400 `invalid_request` instead of axum's plain-text 400/415/422.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}

/// `{instance_id}` path segment parsed as a UUID
pub struct InstanceId(pub Uuid);

impl<S> FromRequestParts<S> for InstanceId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                AppError::Validation(format!("Invalid instance id: {}", e.body_text()))
            })?;
        Ok(InstanceId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{self, StatusCode},
        response::IntoResponse,
    };
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Named {
        #[allow(dead_code)]
        name: String,
    }

    #[tokio::test]
    async fn test_json_rejection_is_validation_error() {
        let req = http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from("{\"name\": 5}"))
            .unwrap();

        let result = ApiJson::<Named>::from_request(req, &()).await;

        match result {
            Err(err) => {
                assert_eq!(err.code(), "invalid_request");
                assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
            }
            Ok(_) => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn test_missing_content_type_is_validation_error() {
        let req = http::Request::builder()
            .method("POST")
            .body(Body::from("{\"name\": \"x\"}"))
            .unwrap();

        let result = ApiJson::<Named>::from_request(req, &()).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
