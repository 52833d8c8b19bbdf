//! Merchant notification on new orders. Strictly best-effort: the caller
//! logs and swallows failures, a dead webhook never blocks settlement.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize)]
pub struct NewOrderSummary {
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub total_minor: i64,
    pub payment_method: String,
}

#[async_trait]
pub trait MerchantNotifier: Send + Sync {
    async fn notify_new_order(&self, summary: &NewOrderSummary) -> Result<(), ServiceError>;
}

/// POSTs the order summary to the merchant's configured webhook URL.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl MerchantNotifier for WebhookNotifier {
    #[instrument(skip(self, summary), fields(order_id = %summary.order_id))]
    async fn notify_new_order(&self, summary: &NewOrderSummary) -> Result<(), ServiceError> {
        let response = self
            .http
            .post(&self.url)
            .json(summary)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("Webhook unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewayUnavailable(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Used when no webhook URL is configured.
pub struct NullNotifier;

#[async_trait]
impl MerchantNotifier for NullNotifier {
    async fn notify_new_order(&self, _summary: &NewOrderSummary) -> Result<(), ServiceError> {
        Ok(())
    }
}
