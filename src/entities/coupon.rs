use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Discount coupon. `used_count` is written only through the redemption
/// tracker's conditional updates, which enforce `used_count <= usage_limit`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Stored uppercase; lookups normalize before matching
    #[sea_orm(unique)]
    pub code: String,
    /// One of [`DiscountKind`], stored as its string form
    pub kind: String,
    /// Percent for `PERCENTAGE`, minor currency units for `FIXED`,
    /// ignored for `FREE_DELIVERY`
    pub value: i64,
    /// Cap on the computed discount, percentage coupons only
    pub max_discount_minor: Option<i64>,
    /// Minimum cart subtotal required to apply this coupon
    pub min_order_minor: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// None means unlimited redemptions
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// What a coupon does to the pricing breakdown.
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
pub enum DiscountKind {
    Percentage,
    Fixed,
    FreeDelivery,
}

impl Model {
    pub fn kind(&self) -> Result<DiscountKind, strum::ParseError> {
        self.kind.parse()
    }

    pub fn usage_exhausted(&self) -> bool {
        self.usage_limit
            .map(|limit| self.used_count >= limit)
            .unwrap_or(false)
    }
}
