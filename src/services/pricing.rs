//! Pricing and discount resolution.
//!
//! Pure arithmetic over already-loaded catalog rows: no database access,
//! no side effects. The orchestrator feeds it trusted product prices and
//! coupon rows and receives a quote that it either persists or discards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::coupon::{self, DiscountKind};
use crate::errors::ServiceError;

/// A line item after catalog resolution: the unit price comes from the
/// products table, never from the request.
#[derive(Debug, Clone)]
pub struct ResolvedLineItem {
    pub product_id: Uuid,
    pub name: String,
    pub price_minor: i64,
    pub quantity: i32,
}

impl ResolvedLineItem {
    pub fn line_total(&self) -> i64 {
        self.price_minor * i64::from(self.quantity)
    }
}

/// The settled money breakdown for an order or a dry-run quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PricingQuote {
    pub subtotal_minor: i64,
    pub discount_minor: i64,
    pub delivery_minor: i64,
    pub total_minor: i64,
}

/// Applies coupon rules to a resolved cart and produces the final quote.
///
/// Coupon slots: at most one free-delivery coupon and at most one
/// amount-discount coupon (percentage or fixed). The caller has already
/// normalized and de-duplicated the codes and loaded the rows; this
/// function enforces per-coupon eligibility and the slot rule, failing on
/// the first violation in request order.
pub fn resolve(
    items: &[ResolvedLineItem],
    coupons: &[coupon::Model],
    base_delivery_minor: i64,
    now: DateTime<Utc>,
) -> Result<PricingQuote, ServiceError> {
    let subtotal_minor: i64 = items.iter().map(ResolvedLineItem::line_total).sum();

    let mut delivery_minor = base_delivery_minor;
    let mut discount_minor: i64 = 0;
    let mut free_delivery_code: Option<&str> = None;
    let mut discount_code: Option<&str> = None;

    for c in coupons {
        let kind = check_coupon(c, subtotal_minor, now)?;

        match kind {
            DiscountKind::FreeDelivery => {
                if let Some(prior) = free_delivery_code {
                    return Err(ServiceError::ValidationError(format!(
                        "Coupons {} and {} cannot combine: only one free-delivery coupon may be applied",
                        prior, c.code
                    )));
                }
                free_delivery_code = Some(&c.code);
                delivery_minor = 0;
            }
            DiscountKind::Percentage | DiscountKind::Fixed => {
                if let Some(prior) = discount_code {
                    return Err(ServiceError::ValidationError(format!(
                        "Coupons {} and {} cannot combine: only one discount coupon may be applied",
                        prior, c.code
                    )));
                }
                discount_code = Some(&c.code);
                discount_minor = compute_discount(c, kind, subtotal_minor);
            }
        }
    }

    // A discount can never push the goods value below zero.
    discount_minor = discount_minor.min(subtotal_minor);

    Ok(PricingQuote {
        subtotal_minor,
        discount_minor,
        delivery_minor,
        total_minor: subtotal_minor + delivery_minor - discount_minor,
    })
}

/// Eligibility checks for a single coupon against the cart subtotal.
fn check_coupon(
    c: &coupon::Model,
    subtotal_minor: i64,
    now: DateTime<Utc>,
) -> Result<DiscountKind, ServiceError> {
    let kind = c.kind().map_err(|_| {
        ServiceError::InternalError(format!("Coupon {} has unknown kind {}", c.code, c.kind))
    })?;

    if !c.is_active {
        return Err(ServiceError::ValidationError(format!(
            "Coupon {} is not active",
            c.code
        )));
    }
    if now < c.valid_from || now > c.valid_to {
        return Err(ServiceError::ValidationError(format!(
            "Coupon {} is outside its validity window",
            c.code
        )));
    }
    if subtotal_minor < c.min_order_minor {
        return Err(ServiceError::ValidationError(format!(
            "Coupon {} requires a minimum order of {}",
            c.code, c.min_order_minor
        )));
    }
    if c.usage_exhausted() {
        return Err(ServiceError::CouponLimitReached(c.code.clone()));
    }

    Ok(kind)
}

fn compute_discount(c: &coupon::Model, kind: DiscountKind, subtotal_minor: i64) -> i64 {
    match kind {
        DiscountKind::Percentage => {
            // Integer floor of subtotal * pct / 100, then the per-coupon cap.
            let raw = subtotal_minor * c.value / 100;
            match c.max_discount_minor {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        DiscountKind::Fixed => c.value,
        DiscountKind::FreeDelivery => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(price_minor: i64, quantity: i32) -> ResolvedLineItem {
        ResolvedLineItem {
            product_id: Uuid::new_v4(),
            name: "Test product".to_string(),
            price_minor,
            quantity,
        }
    }

    fn coupon(code: &str, kind: DiscountKind, value: i64) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: code.to_string(),
            kind: kind.to_string(),
            value,
            max_discount_minor: None,
            min_order_minor: 0,
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(1),
            usage_limit: None,
            used_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn no_coupons_charges_delivery() {
        let quote = resolve(&[item(500, 2)], &[], 40, Utc::now()).unwrap();
        assert_eq!(
            quote,
            PricingQuote {
                subtotal_minor: 1000,
                discount_minor: 0,
                delivery_minor: 40,
                total_minor: 1040,
            }
        );
    }

    #[test]
    fn percentage_discount_is_capped() {
        let mut c = coupon("SAVE15", DiscountKind::Percentage, 15);
        c.max_discount_minor = Some(120);
        // 15% of 1000 = 150, capped at 120; total = 1000 + 40 - 120.
        let quote = resolve(&[item(1000, 1)], &[c], 40, Utc::now()).unwrap();
        assert_eq!(quote.discount_minor, 120);
        assert_eq!(quote.total_minor, 920);
    }

    #[test]
    fn percentage_discount_floors() {
        let c = coupon("SAVE33", DiscountKind::Percentage, 33);
        let quote = resolve(&[item(101, 1)], &[c], 0, Utc::now()).unwrap();
        assert_eq!(quote.discount_minor, 33); // floor(101 * 33 / 100)
    }

    #[test]
    fn free_delivery_stacks_with_fixed_discount() {
        let free = coupon("SHIPFREE", DiscountKind::FreeDelivery, 0);
        let fixed = coupon("FLAT200", DiscountKind::Fixed, 200);
        let quote = resolve(&[item(1000, 1)], &[free, fixed], 40, Utc::now()).unwrap();
        assert_eq!(quote.delivery_minor, 0);
        assert_eq!(quote.discount_minor, 200);
        assert_eq!(quote.total_minor, 800);
    }

    #[test]
    fn two_discount_coupons_rejected() {
        let a = coupon("FLAT100", DiscountKind::Fixed, 100);
        let b = coupon("SAVE10", DiscountKind::Percentage, 10);
        let err = resolve(&[item(1000, 1)], &[a, b], 40, Utc::now()).unwrap_err();
        match err {
            ServiceError::ValidationError(msg) => assert!(msg.contains("SAVE10")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn two_free_delivery_coupons_rejected() {
        let a = coupon("SHIP1", DiscountKind::FreeDelivery, 0);
        let b = coupon("SHIP2", DiscountKind::FreeDelivery, 0);
        assert!(resolve(&[item(1000, 1)], &[a, b], 40, Utc::now()).is_err());
    }

    #[test]
    fn discount_clamped_to_subtotal() {
        let c = coupon("FLAT5000", DiscountKind::Fixed, 5000);
        let quote = resolve(&[item(300, 1)], &[c], 40, Utc::now()).unwrap();
        assert_eq!(quote.discount_minor, 300);
        assert_eq!(quote.total_minor, 40); // delivery still owed
    }

    #[test]
    fn inactive_coupon_rejected() {
        let mut c = coupon("OLD", DiscountKind::Fixed, 100);
        c.is_active = false;
        assert!(resolve(&[item(1000, 1)], &[c], 40, Utc::now()).is_err());
    }

    #[test]
    fn expired_coupon_rejected() {
        let mut c = coupon("EXPIRED", DiscountKind::Fixed, 100);
        c.valid_to = Utc::now() - Duration::hours(1);
        assert!(resolve(&[item(1000, 1)], &[c], 40, Utc::now()).is_err());
    }

    #[test]
    fn min_order_enforced() {
        let mut c = coupon("BIG", DiscountKind::Fixed, 100);
        c.min_order_minor = 2000;
        let err = resolve(&[item(1000, 1)], &[c], 40, Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn exhausted_coupon_maps_to_limit_error() {
        let mut c = coupon("LIMITED", DiscountKind::Fixed, 100);
        c.usage_limit = Some(5);
        c.used_count = 5;
        let err = resolve(&[item(1000, 1)], &[c], 40, Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::CouponLimitReached(code) if code == "LIMITED"));
    }

    #[test]
    fn first_failing_coupon_wins() {
        let mut bad = coupon("DEAD", DiscountKind::Fixed, 100);
        bad.is_active = false;
        let good = coupon("SHIPFREE", DiscountKind::FreeDelivery, 0);
        let err = resolve(&[item(1000, 1)], &[bad, good], 40, Utc::now()).unwrap_err();
        match err {
            ServiceError::ValidationError(msg) => assert!(msg.contains("DEAD")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
