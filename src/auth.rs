//! Identity extraction for the settlement API.
//!
//! Authentication proper (credential verification, token issuance) is an
//! external collaborator that fronts this service; by the time a request
//! arrives here the gateway has already verified the caller and attached
//! trusted identity headers. These extractors only read that contract.

use crate::{errors::ServiceError, AppState};
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";
pub const CUSTOMER_NAME_HEADER: &str = "x-customer-name";
pub const MERCHANT_KEY_HEADER: &str = "x-api-key";

/// Authenticated shopper identity, trusted as-is from the auth gateway.
#[derive(Debug, Clone)]
pub struct AuthenticatedCustomer {
    pub id: Uuid,
    pub name: String,
}

impl<S> FromRequestParts<S> for AuthenticatedCustomer
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(CUSTOMER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing customer identity".to_string()))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| ServiceError::Unauthorized("Malformed customer identity".to_string()))?;

        let name = parts
            .headers
            .get(CUSTOMER_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(AuthenticatedCustomer { id, name })
    }
}

/// Marker extractor for merchant-side endpoints: the merchant dashboard
/// presents a shared key in `x-api-key`.
#[derive(Debug, Clone, Copy)]
pub struct MerchantAuth;

impl FromRequestParts<AppState> for MerchantAuth {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(MERCHANT_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing merchant API key".to_string()))?;

        if !crate::services::payments::constant_time_eq(presented, &state.config.merchant_api_key) {
            return Err(ServiceError::Forbidden("Invalid merchant API key".to_string()));
        }

        Ok(MerchantAuth)
    }
}
