//! HTTP error handling
//!
//! Every failed request answers with a JSON body `{message, code, details?}`;
//! the status code is derived from `code`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use kbase_core::services::CollectionServiceError;
use serde::{Deserialize, Serialize};

/// JSON error response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpError {
    /// User-facing error message
    pub message: String,
    /// Machine-readable error code
    pub code: String,
    /// Optional detailed error information for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpError {
    /// Create a new HTTP error
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Create a new HTTP error with details
    pub fn with_details(
        message: impl Into<String>,
        code: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            details: Some(details.into()),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(message, "UNAUTHENTICATED")
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "NODE_NOT_FOUND" | "EDGE_NOT_FOUND" => StatusCode::NOT_FOUND,
            "INVALID_INPUT" => StatusCode::BAD_REQUEST,
            "UNAUTHENTICATED" => StatusCode::UNAUTHORIZED,
            "CONFLICT" => StatusCode::CONFLICT,
            "STORE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<CollectionServiceError> for HttpError {
    fn from(err: CollectionServiceError) -> Self {
        match &err {
            CollectionServiceError::NodeNotFound { .. } => {
                HttpError::new(err.to_string(), "NODE_NOT_FOUND")
            }
            CollectionServiceError::EdgeNotFound { .. } => {
                HttpError::new(err.to_string(), "EDGE_NOT_FOUND")
            }
            CollectionServiceError::Conflict { .. } => HttpError::new(err.to_string(), "CONFLICT"),
            CollectionServiceError::ValidationFailed(_) => {
                HttpError::new(err.to_string(), "INVALID_INPUT")
            }
            CollectionServiceError::StoreUnavailable(source) => {
                tracing::error!("Graph store failure: {}", source);
                HttpError::with_details(
                    "Graph store unavailable",
                    "STORE_UNAVAILABLE",
                    format!("{:?}", source),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbase_core::db::StoreError;

    #[test]
    fn test_service_errors_map_to_status() {
        let cases = [
            (CollectionServiceError::node_not_found("c1"), StatusCode::NOT_FOUND),
            (
                CollectionServiceError::edge_not_found("n1", "c1"),
                StatusCode::NOT_FOUND,
            ),
            (
                CollectionServiceError::conflict("e1", "taken"),
                StatusCode::CONFLICT,
            ),
            (
                StoreError::transaction_failed("io").into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(HttpError::from(err).status(), status);
        }
    }

    #[test]
    fn test_store_details_are_kept_out_of_message() {
        let err = HttpError::from(CollectionServiceError::from(StoreError::transaction_failed(
            "rocksdb lock",
        )));
        assert_eq!(err.message, "Graph store unavailable");
        assert!(err.details.unwrap().contains("rocksdb lock"));
    }
}
