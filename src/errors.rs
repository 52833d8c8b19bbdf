use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error payload returned to HTTP clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Conflict", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Unified error type for all service operations.
///
/// Every variant maps to exactly one HTTP status via [`ServiceError::status_code`],
/// so handlers never improvise status codes. The settlement engine distinguishes
/// client-input errors (no shared state touched), resource conflicts (compensated
/// before surfacing), and gateway outages (503, retryable).
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Product {0} not found or inactive")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Coupon {0} usage limit reached")]
    CouponLimitReached(String),

    #[error("Cannot transition order from terminal status {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Payment signature verification failed")]
    SignatureMismatch,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<strum::ParseError> for ServiceError {
    fn from(err: strum::ParseError) -> Self {
        ServiceError::InternalError(format!("Stored enum value is invalid: {}", err))
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::ProductNotFound(_)
            | Self::InvalidTransition { .. }
            | Self::SignatureMismatch => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InsufficientStock { .. } | Self::CouponLimitReached(_) => StatusCode::CONFLICT,
            Self::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_class_maps_to_409() {
        let stock = ServiceError::InsufficientStock {
            product_id: Uuid::new_v4(),
            requested: 3,
            available: 1,
        };
        assert_eq!(stock.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ServiceError::CouponLimitReached("SAVE10".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn gateway_outage_is_503() {
        let err = ServiceError::GatewayUnavailable("connect timeout".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn validation_class_is_400_and_keeps_message() {
        let err = ServiceError::ValidationError("Coupon SAVE10 has expired".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.response_message().contains("SAVE10"));
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ServiceError::InternalError("pool exhausted at worker 3".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Internal server error");
    }

    #[test]
    fn insufficient_stock_names_product_and_quantities() {
        let id = Uuid::new_v4();
        let err = ServiceError::InsufficientStock {
            product_id: id,
            requested: 5,
            available: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("requested 5"));
        assert!(msg.contains("available 2"));
    }
}
