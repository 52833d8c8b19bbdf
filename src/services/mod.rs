pub mod coupons;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod pricing;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::events::EventSender;
use coupons::CouponService;
use inventory::InventoryService;
use notifications::MerchantNotifier;
use orders::OrderSettlementService;
use payments::PaymentGateway;

/// All settlement services wired together, shared via the app state.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: InventoryService,
    pub coupons: CouponService,
    pub orders: Arc<OrderSettlementService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn MerchantNotifier>,
        currency: String,
        delivery_charge_minor: i64,
    ) -> Self {
        let inventory = InventoryService::new(db.clone(), event_sender.clone());
        let coupons = CouponService::new(db.clone(), event_sender.clone());
        let orders = Arc::new(OrderSettlementService::new(
            db,
            inventory.clone(),
            coupons.clone(),
            gateway,
            notifier,
            event_sender,
            currency,
            delivery_charge_minor,
        ));

        Self {
            inventory,
            coupons,
            orders,
        }
    }
}
