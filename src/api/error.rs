//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::ServiceError;
use crate::models::ErrorKind;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("{message}")]
    Classified { kind: ErrorKind, message: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Classified { kind, .. } => match kind {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorKind::MalformedTabularInput => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::DuplicateContent => StatusCode::CONFLICT,
                ErrorKind::BackendUnreachable | ErrorKind::RecognitionEngineUnavailable => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ErrorKind::TaskTimeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::StorageCorruption | ErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            ApiError::BadRequest(detail) => ("BAD_REQUEST".to_string(), detail),
            ApiError::Classified { kind, message } => (kind.as_str().to_ascii_uppercase(), message),
        };
        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::Internal => {
                tracing::error!(error = %err, "API internal error");
                "An internal error occurred".to_string()
            }
            ErrorKind::StorageCorruption => {
                tracing::error!(error = %err, "Stored content failed to decode");
                "Stored content is corrupted".to_string()
            }
            _ => err.to_string(),
        };
        ApiError::Classified { kind, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::StorageError;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn not_found_keeps_detail() {
        let err = ApiError::from(ServiceError::Storage(StorageError::DocumentNotFound("abc".into())));
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert!(json["error"]["message"].as_str().unwrap().contains("abc"));
    }

    #[tokio::test]
    async fn internal_detail_is_hidden() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk path /secret");
        let err = ApiError::from(ServiceError::Storage(StorageError::Compression(io)));
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "INTERNAL");
        assert!(!json["error"]["message"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn corruption_is_classified() {
        let err = ApiError::from(ServiceError::Storage(StorageError::Corruption {
            document_id: "abc".into(),
            reason: "bad gzip".into(),
        }));
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "STORAGE_CORRUPTION");
    }
}
