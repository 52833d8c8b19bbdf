//! Payment gateway adapter.
//!
//! The settlement engine never talks to the processor's wire format
//! directly; everything goes through [`PaymentGateway`] so tests can
//! substitute a scripted gateway. The production implementation targets
//! Razorpay's orders API and its HMAC signature scheme.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, instrument};

use crate::config::AppConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Handle for a payment the processor is expecting.
#[derive(Debug, Clone)]
pub struct GatewayIntent {
    pub gateway_order_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers an amount with the processor ahead of customer checkout.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, ServiceError>;

    /// Checks the signature the processor returned after the customer paid.
    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool;
}

/// hex(HMAC-SHA256(secret, "{gateway_order_id}|{payment_id}")), the
/// processor's post-payment signature scheme.
pub fn compute_signature(secret: &str, gateway_order_id: &str, payment_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{}|{}", gateway_order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison for signatures and API keys.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct RazorpayGateway {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrderResponse {
    id: String,
}

impl RazorpayGateway {
    pub fn new(
        key_id: String,
        key_secret: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            http,
            key_id,
            key_secret,
            base_url,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.gateway_key_id.clone(),
            config.gateway_key_secret.clone(),
            config.gateway_base_url.clone(),
            Duration::from_secs(config.gateway_timeout_secs),
        )
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, ServiceError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(ServiceError::GatewayUnavailable(
                "Payment gateway credentials are not configured".to_string(),
            ));
        }

        let response = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount_minor,
                "currency": currency,
                "receipt": receipt,
            }))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gateway order creation request failed");
                ServiceError::GatewayUnavailable(format!("Gateway unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(%status, "Gateway rejected order creation");
            return Err(ServiceError::GatewayUnavailable(format!(
                "Gateway returned status {}",
                status
            )));
        }

        let body: RazorpayOrderResponse = response.json().await.map_err(|e| {
            ServiceError::GatewayUnavailable(format!("Malformed gateway response: {}", e))
        })?;

        Ok(GatewayIntent {
            gateway_order_id: body.id,
        })
    }

    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        let expected = compute_signature(&self.key_secret, gateway_order_id, payment_id);
        constant_time_eq(&expected, signature)
    }
}
