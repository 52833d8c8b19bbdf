//! Coupon redemption tracker.
//!
//! Usage counts move through conditional increments that carry the
//! limit check in the WHERE clause, mirroring the inventory ledger: a
//! coupon's `used_count` can never exceed its `usage_limit` no matter how
//! many settlements race for the last redemption.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::entities::coupon::{self, Entity as Coupon};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Loads coupon rows for already-normalized codes, preserving request
    /// order. Unknown or inactive codes fail by name.
    pub async fn find_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<coupon::Model>, ServiceError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = Coupon::find()
            .filter(coupon::Column::Code.is_in(codes.iter().cloned()))
            .all(&*self.db)
            .await?;

        let mut ordered = Vec::with_capacity(codes.len());
        for code in codes {
            match rows.iter().find(|c| &c.code == code) {
                Some(row) => ordered.push(row.clone()),
                None => {
                    return Err(ServiceError::ValidationError(format!(
                        "Coupon {} does not exist",
                        code
                    )))
                }
            }
        }

        Ok(ordered)
    }

    /// Atomically claims one redemption. The increment only lands when the
    /// coupon is active and either unlimited or still under its limit;
    /// zero rows affected means the claim lost.
    #[instrument(skip(self))]
    pub async fn claim(&self, code: &str) -> Result<(), ServiceError> {
        let under_limit = Condition::any()
            .add(coupon::Column::UsageLimit.is_null())
            .add(
                Expr::col(coupon::Column::UsedCount)
                    .lt(Expr::col(coupon::Column::UsageLimit)),
            );

        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(under_limit)
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let current = Coupon::find()
                .filter(coupon::Column::Code.eq(code))
                .one(&*self.db)
                .await?;
            return match current {
                Some(c) if c.is_active => Err(ServiceError::CouponLimitReached(code.to_string())),
                _ => Err(ServiceError::ValidationError(format!(
                    "Coupon {} does not exist",
                    code
                ))),
            };
        }

        info!(code, "Claimed coupon redemption");
        let _ = self
            .event_sender
            .send(Event::CouponClaimed { code: code.to_string() })
            .await;

        Ok(())
    }

    /// Returns a claimed redemption. The floor guard keeps `used_count`
    /// from going negative if a release is replayed.
    #[instrument(skip(self))]
    pub async fn release(&self, code: &str) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).sub(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::UsedCount.gt(0))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ValidationError(format!(
                "Coupon {} has no redemption to release",
                code
            )));
        }

        info!(code, "Released coupon redemption");
        let _ = self
            .event_sender
            .send(Event::CouponReleased { code: code.to_string() })
            .await;

        Ok(())
    }

    /// Claims every code or none of them. On the first failure the
    /// already-claimed codes are released in reverse order.
    pub async fn claim_all(&self, codes: &[String]) -> Result<(), ServiceError> {
        let mut claimed: Vec<&str> = Vec::with_capacity(codes.len());

        for code in codes {
            match self.claim(code).await {
                Ok(()) => claimed.push(code),
                Err(err) => {
                    self.release_all(&claimed).await;
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Best-effort bulk release for the unwind path.
    pub async fn release_all(&self, codes: &[&str]) {
        for code in codes.iter().rev() {
            if let Err(err) = self.release(code).await {
                error!(code, error = %err, "Failed to release coupon claim");
            }
        }
    }
}
