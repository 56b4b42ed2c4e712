use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::forecast::validation::{MAX_STORE_NBR, MIN_STORE_NBR};

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error envelope returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Need at least 37 historical entries",
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Human-readable error description (the raw failure text for 500s)
    #[schema(example = "Need at least 37 historical entries")]
    pub error: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    #[schema(example = "2024-12-09T10:30:00.000Z")]
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Missing '{0}' field")]
    MissingField(&'static str),

    #[error("Need at least {0} historical entries")]
    InsufficientHistory(usize),

    #[error(
        "Invalid store_nbr found. Must be between {} and {}.",
        MIN_STORE_NBR,
        MAX_STORE_NBR
    )]
    InvalidStoreNumber,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    InvalidObservation(String),

    #[error("Unknown category '{label}' for '{column}'")]
    UnknownCategory { column: String, label: String },

    #[error("{0}")]
    Dataset(String),

    #[error("{0}")]
    Model(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServiceError::PayloadTooLarge(format!(
                "Request body too large: {}",
                rejection.body_text()
            ))
        } else {
            ServiceError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("inference task failed: {}", err))
    }
}

impl ServiceError {
    pub fn unknown_category(column: impl Into<String>, label: impl Into<String>) -> Self {
        ServiceError::UnknownCategory {
            column: column.into(),
            label: label.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingField(_)
            | Self::InsufficientHistory(_)
            | Self::InvalidStoreNumber
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidObservation(_)
            | Self::UnknownCategory { .. }
            | Self::Dataset(_)
            | Self::Model(_)
            | Self::Internal(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = current_request_id();

        if status.is_server_error() {
            tracing::error!(
                request_id = request_id.as_deref().unwrap_or("-"),
                status = status.as_u16(),
                error = %self,
                "forecast request failed"
            );
        } else {
            tracing::warn!(
                request_id = request_id.as_deref().unwrap_or("-"),
                status = status.as_u16(),
                error = %self,
                "forecast request rejected"
            );
        }

        let err = ErrorResponse {
            error: self.to_string(),
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::InsufficientHistory(37).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.error, "Need at least 37 historical entries");
    }

    #[tokio::test]
    async fn server_error_carries_raw_message() {
        let response = ServiceError::Model("output tensor has rank 4".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.error, "output tensor has rank 4");
        assert!(payload.request_id.is_none());
    }

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::MissingField("timeseries").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientHistory(37).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidStoreNumber.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::PayloadTooLarge("too big".into()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert!(ServiceError::PayloadTooLarge("too big".into()).is_client_error());
        assert_eq!(
            ServiceError::unknown_category("item_nbr", "42").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Dataset("gap".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Other(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn client_messages_match_contract() {
        assert_eq!(
            ServiceError::MissingField("timeseries").to_string(),
            "Missing 'timeseries' field"
        );
        assert_eq!(
            ServiceError::InvalidStoreNumber.to_string(),
            "Invalid store_nbr found. Must be between 1 and 54."
        );
        assert_eq!(
            ServiceError::unknown_category("item_nbr", "42").to_string(),
            "Unknown category '42' for 'item_nbr'"
        );
    }
}
