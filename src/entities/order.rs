use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order aggregate root. Line items and the status history live in their
/// own tables; monetary fields and item snapshots are immutable once the
/// order is persisted. Only the payment-confirmation handler may change
/// `payment_status` and only the fulfillment transition operation may
/// change `fulfillment_status`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub subtotal_minor: i64,
    pub discount_minor: i64,
    pub delivery_minor: i64,
    pub total_minor: i64,
    /// JSON array of the applied coupon codes (0-2), recorded for audit
    pub coupon_codes: Option<String>,
    /// JSON snapshot of the delivery address at order time
    pub delivery_address: String,
    /// One of [`PaymentMethod`], stored as its string form
    pub payment_method: String,
    /// One of [`PaymentStatus`], stored as its string form
    pub payment_status: String,
    /// One of [`FulfillmentStatus`], stored as its string form
    pub fulfillment_status: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::order_status_history::Entity")]
    StatusHistory,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::order_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Merchant-driven fulfillment state machine. Intentionally permissive:
/// any transition is allowed except out of a terminal state, so the
/// merchant can correct mistakes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    Ordered,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FulfillmentStatus::Delivered | FulfillmentStatus::Cancelled)
    }
}

/// Payment axis, independent of fulfillment. `Paid` and `Failed` are
/// terminal; a terminal order absorbs replayed confirmations unchanged.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cod,
    Online,
}

impl Model {
    pub fn fulfillment_status(&self) -> Result<FulfillmentStatus, strum::ParseError> {
        self.fulfillment_status.parse()
    }

    pub fn payment_status(&self) -> Result<PaymentStatus, strum::ParseError> {
        self.payment_status.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_fulfillment_states() {
        assert!(FulfillmentStatus::Delivered.is_terminal());
        assert!(FulfillmentStatus::Cancelled.is_terminal());
        assert!(!FulfillmentStatus::Ordered.is_terminal());
        assert!(!FulfillmentStatus::Shipped.is_terminal());
    }

    #[test]
    fn terminal_payment_states() {
        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }

    #[test]
    fn statuses_serialize_screaming_snake() {
        assert_eq!(FulfillmentStatus::Processing.to_string(), "PROCESSING");
        assert_eq!(PaymentMethod::Cod.to_string(), "COD");
        assert_eq!(PaymentMethod::Online.to_string(), "ONLINE");
        assert_eq!(
            "CANCELLED".parse::<FulfillmentStatus>().unwrap(),
            FulfillmentStatus::Cancelled
        );
    }
}
