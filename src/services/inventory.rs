//! Inventory ledger.
//!
//! Stock is only ever changed through conditional updates that carry the
//! non-negativity guard in the WHERE clause, so concurrent settlements can
//! never oversell regardless of interleaving.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::product::{self, Entity as Product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// A successful stock deduction, held by the settlement saga until the
/// order either persists or unwinds.
#[derive(Debug, Clone, Copy)]
pub struct StockReservation {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Atomically deducts `quantity` from the product's stock. The guard
    /// `stock >= quantity` lives in the UPDATE itself; zero rows affected
    /// means the product is missing, inactive, or short on stock.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<StockReservation, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Reservation quantity must be positive".to_string(),
            ));
        }

        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::Stock.gte(quantity))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Distinguish the not-found case from the short-stock case.
            let current = Product::find_by_id(product_id).one(&*self.db).await?;
            return match current {
                Some(p) if p.is_active => Err(ServiceError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: p.stock,
                }),
                _ => Err(ServiceError::ProductNotFound(product_id)),
            };
        }

        info!(%product_id, quantity, "Reserved stock");
        let _ = self
            .event_sender
            .send(Event::StockReserved { product_id, quantity })
            .await;

        Ok(StockReservation { product_id, quantity })
    }

    /// Finalizes a reservation. The deduction already happened in
    /// [`reserve`](Self::reserve), so committing only retires the handle;
    /// a committed reservation must never be released.
    pub fn commit(&self, reservation: StockReservation) {
        debug!(
            product_id = %reservation.product_id,
            quantity = reservation.quantity,
            "Committed stock reservation"
        );
    }

    /// Returns a previously reserved quantity to stock.
    #[instrument(skip(self))]
    pub async fn release(&self, reservation: StockReservation) -> Result<(), ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(reservation.quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(reservation.product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(
                product_id = %reservation.product_id,
                "Release targeted a missing product"
            );
            return Err(ServiceError::ProductNotFound(reservation.product_id));
        }

        info!(
            product_id = %reservation.product_id,
            quantity = reservation.quantity,
            "Released stock"
        );
        let _ = self
            .event_sender
            .send(Event::StockReleased {
                product_id: reservation.product_id,
                quantity: reservation.quantity,
            })
            .await;

        Ok(())
    }

    /// Reserves every requested line or none of them. On the first failure
    /// the already-taken reservations are returned in reverse order.
    pub async fn reserve_all(
        &self,
        requests: &[(Uuid, i32)],
    ) -> Result<Vec<StockReservation>, ServiceError> {
        let mut taken: Vec<StockReservation> = Vec::with_capacity(requests.len());

        for &(product_id, quantity) in requests {
            match self.reserve(product_id, quantity).await {
                Ok(reservation) => taken.push(reservation),
                Err(err) => {
                    self.release_all(taken).await;
                    return Err(err);
                }
            }
        }

        Ok(taken)
    }

    /// Best-effort bulk release used on the unwind path. Individual
    /// failures are logged and skipped so later releases still run.
    pub async fn release_all(&self, reservations: Vec<StockReservation>) {
        for reservation in reservations.into_iter().rev() {
            if let Err(err) = self.release(reservation).await {
                error!(
                    product_id = %reservation.product_id,
                    quantity = reservation.quantity,
                    error = %err,
                    "Failed to release stock reservation"
                );
            }
        }
    }

    /// Loads active catalog rows for the requested ids. Missing or inactive
    /// products surface as `ProductNotFound`.
    pub async fn load_products(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<product::Model>, ServiceError> {
        let rows = Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .filter(product::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?;

        for id in ids {
            if !rows.iter().any(|p| p.id == *id) {
                return Err(ServiceError::ProductNotFound(*id));
            }
        }

        Ok(rows)
    }
}
