#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::db::{establish_connection_with_config, run_migrations, DbConfig};
use storefront_api::entities::coupon::{self, DiscountKind};
use storefront_api::entities::order::PaymentMethod;
use storefront_api::entities::product;
use storefront_api::errors::ServiceError;
use storefront_api::events::{process_events, EventSender};
use storefront_api::services::notifications::NullNotifier;
use storefront_api::services::orders::{
    DeliveryAddress, OrderItemRequest, PlaceOrderRequest,
};
use storefront_api::services::payments::{
    compute_signature, constant_time_eq, GatewayIntent, PaymentGateway,
};
use storefront_api::services::AppServices;

pub const TEST_GATEWAY_SECRET: &str = "test_gateway_secret";
pub const TEST_DELIVERY_CHARGE: i64 = 40;

/// In-process stand-in for the payment processor. Issues sequential
/// gateway order ids and verifies signatures with the same HMAC scheme as
/// the real gateway, so tests can mint valid and invalid signatures.
pub struct ScriptedGateway {
    pub fail_next: AtomicBool,
    counter: AtomicU64,
    secret: String,
}

impl ScriptedGateway {
    pub fn new(secret: &str) -> Self {
        Self {
            fail_next: AtomicBool::new(false),
            counter: AtomicU64::new(1),
            secret: secret.to_string(),
        }
    }

    pub fn sign(&self, gateway_order_id: &str, payment_id: &str) -> String {
        compute_signature(&self.secret, gateway_order_id, payment_id)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_intent(
        &self,
        _amount_minor: i64,
        _currency: &str,
        _receipt: &str,
    ) -> Result<GatewayIntent, ServiceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::GatewayUnavailable(
                "scripted gateway failure".to_string(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayIntent {
            gateway_order_id: format!("gw_order_{}", n),
        })
    }

    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        let expected = compute_signature(&self.secret, gateway_order_id, payment_id);
        constant_time_eq(&expected, signature)
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub gateway: Arc<ScriptedGateway>,
}

/// Fresh in-memory database plus fully wired services. The pool is pinned
/// to a single connection so every handle sees the same SQLite memory db.
pub async fn setup() -> TestApp {
    let db_config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(600),
    };
    let db = Arc::new(
        establish_connection_with_config(&db_config)
            .await
            .expect("connect to in-memory database"),
    );
    run_migrations(&db).await.expect("run migrations");

    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(process_events(rx));
    let event_sender = Arc::new(EventSender::new(tx));

    let gateway = Arc::new(ScriptedGateway::new(TEST_GATEWAY_SECRET));
    let services = AppServices::new(
        db.clone(),
        event_sender,
        gateway.clone(),
        Arc::new(NullNotifier),
        "INR".to_string(),
        TEST_DELIVERY_CHARGE,
    );

    TestApp {
        db,
        services,
        gateway,
    }
}

pub async fn seed_product(db: &DatabaseConnection, name: &str, price_minor: i64, stock: i32) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        price_minor: Set(price_minor),
        stock: Set(stock),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert product")
}

/// A valid, currently-active coupon; tests mutate fields before inserting.
pub fn coupon_fixture(code: &str, kind: DiscountKind, value: i64) -> coupon::Model {
    let now = Utc::now();
    coupon::Model {
        id: Uuid::new_v4(),
        code: code.to_string(),
        kind: kind.to_string(),
        value,
        max_discount_minor: None,
        min_order_minor: 0,
        valid_from: now - ChronoDuration::days(1),
        valid_to: now + ChronoDuration::days(30),
        usage_limit: None,
        used_count: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub async fn insert_coupon(db: &DatabaseConnection, model: coupon::Model) -> coupon::Model {
    let active: coupon::ActiveModel = model.into();
    active.insert(db).await.expect("insert coupon")
}

pub async fn reload_product(db: &DatabaseConnection, id: Uuid) -> product::Model {
    product::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("query product")
        .expect("product exists")
}

pub async fn reload_coupon(db: &DatabaseConnection, id: Uuid) -> coupon::Model {
    coupon::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("query coupon")
        .expect("coupon exists")
}

pub fn address_fixture() -> DeliveryAddress {
    DeliveryAddress {
        street: "12 MG Road".to_string(),
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        pincode: "560001".to_string(),
        landmark: None,
    }
}

pub fn order_request(
    items: Vec<(Uuid, i32)>,
    coupon_codes: Vec<&str>,
    payment_method: PaymentMethod,
) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: items
            .into_iter()
            .map(|(product_id, quantity)| OrderItemRequest {
                product_id,
                quantity,
            })
            .collect(),
        delivery_address: address_fixture(),
        payment_method,
        coupon_codes: coupon_codes.into_iter().map(String::from).collect(),
    }
}
