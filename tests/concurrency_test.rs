mod common;

use assert_matches::assert_matches;
use uuid::Uuid;

use common::{coupon_fixture, insert_coupon, order_request, reload_coupon, reload_product, seed_product, setup};
use storefront_api::entities::coupon::DiscountKind;
use storefront_api::entities::order::{FulfillmentStatus, PaymentMethod, PaymentStatus};
use storefront_api::errors::ServiceError;
use storefront_api::services::orders::ConfirmPaymentRequest;

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let app = setup().await;
    let product = seed_product(&app.db, "Limited print", 500, 10).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let inventory = app.services.inventory.clone();
        let product_id = product.id;
        handles.push(tokio::spawn(async move {
            inventory.reserve(product_id, 1).await
        }));
    }

    let mut successes = 0;
    let mut shortfalls = 0;
    for handle in handles {
        match handle.await.expect("task completed") {
            Ok(_) => successes += 1,
            Err(ServiceError::InsufficientStock { .. }) => shortfalls += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 10);
    assert_eq!(shortfalls, 10);
    assert_eq!(reload_product(&app.db, product.id).await.stock, 0);
}

#[tokio::test]
async fn last_unit_has_a_single_winner() {
    let app = setup().await;
    let product = seed_product(&app.db, "Final piece", 900, 1).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let orders = app.services.orders.clone();
        let product_id = product.id;
        handles.push(tokio::spawn(async move {
            orders
                .place_order(
                    Uuid::new_v4(),
                    "Racer",
                    order_request(vec![(product_id, 1)], vec![], PaymentMethod::Cod),
                )
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.expect("task completed"));
    }

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.into_iter().find(|r| r.is_err()).unwrap().unwrap_err();
    assert_matches!(loser, ServiceError::InsufficientStock { available: 0, .. });
    assert_eq!(reload_product(&app.db, product.id).await.stock, 0);
}

#[tokio::test]
async fn last_coupon_redemption_has_a_single_winner() {
    let app = setup().await;
    let product = seed_product(&app.db, "Festival hamper", 2000, 10).await;
    let mut coupon = coupon_fixture("ONEUSE", DiscountKind::Fixed, 500);
    coupon.usage_limit = Some(1);
    let coupon = insert_coupon(&app.db, coupon).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let orders = app.services.orders.clone();
        let product_id = product.id;
        handles.push(tokio::spawn(async move {
            orders
                .place_order(
                    Uuid::new_v4(),
                    "Racer",
                    order_request(vec![(product_id, 1)], vec!["ONEUSE"], PaymentMethod::Cod),
                )
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.expect("task completed"));
    }

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.into_iter().find(|r| r.is_err()).unwrap().unwrap_err();
    assert_matches!(loser, ServiceError::CouponLimitReached(code) if code == "ONEUSE");

    // exactly one claim and one unit of stock consumed
    assert_eq!(reload_coupon(&app.db, coupon.id).await.used_count, 1);
    assert_eq!(reload_product(&app.db, product.id).await.stock, 9);
}

#[tokio::test]
async fn racing_confirmations_cannot_overwrite_a_settled_payment() {
    let app = setup().await;
    let customer = Uuid::new_v4();
    let product = seed_product(&app.db, "Raga record", 700, 10).await;

    let detail = app
        .services
        .orders
        .place_order(
            customer,
            "Racer",
            order_request(vec![(product.id, 1)], vec![], PaymentMethod::Online),
        )
        .await
        .unwrap();
    let order_id = detail.order.id;
    let gateway_order_id = detail.order.gateway_order_id.clone().unwrap();

    let valid = {
        let orders = app.services.orders.clone();
        let signature = app.gateway.sign(&gateway_order_id, "pay_race");
        let gateway_order_id = gateway_order_id.clone();
        tokio::spawn(async move {
            orders
                .confirm_payment(
                    customer,
                    order_id,
                    ConfirmPaymentRequest {
                        gateway_order_id,
                        payment_id: "pay_race".to_string(),
                        signature,
                    },
                )
                .await
        })
    };
    let forged = {
        let orders = app.services.orders.clone();
        let gateway_order_id = gateway_order_id.clone();
        tokio::spawn(async move {
            orders
                .confirm_payment(
                    customer,
                    order_id,
                    ConfirmPaymentRequest {
                        gateway_order_id,
                        payment_id: "pay_race".to_string(),
                        signature: "forged".to_string(),
                    },
                )
                .await
        })
    };

    let valid_result = valid.await.expect("task completed");
    let forged_result = forged.await.expect("task completed");

    let settled = app
        .services
        .orders
        .get_order(Some(customer), order_id)
        .await
        .unwrap()
        .order;

    // Whichever confirmation landed first decided the terminal state; the
    // loser was absorbed without rewriting it.
    assert!(
        settled.payment_status == PaymentStatus::Paid.to_string()
            || settled.payment_status == PaymentStatus::Failed.to_string()
    );
    if let Ok(model) = &valid_result {
        if model.payment_status == PaymentStatus::Paid.to_string() {
            assert_eq!(settled.payment_status, PaymentStatus::Paid.to_string());
            assert_eq!(settled.gateway_payment_id.as_deref(), Some("pay_race"));
        }
    }
    if forged_result.is_err() {
        // the forged delivery only errors when it won the race
        assert_eq!(settled.payment_status, PaymentStatus::Failed.to_string());
        assert_matches!(
            valid_result,
            Ok(model) if model.payment_status == PaymentStatus::Failed.to_string()
        );
    }
}

#[tokio::test]
async fn racing_terminal_transitions_have_a_single_winner() {
    let app = setup().await;
    let customer = Uuid::new_v4();
    let product = seed_product(&app.db, "Marble coaster", 300, 5).await;

    let detail = app
        .services
        .orders
        .place_order(
            customer,
            "Racer",
            order_request(vec![(product.id, 1)], vec![], PaymentMethod::Cod),
        )
        .await
        .unwrap();
    let order_id = detail.order.id;

    let mut handles = Vec::new();
    for target in [FulfillmentStatus::Delivered, FulfillmentStatus::Cancelled] {
        let orders = app.services.orders.clone();
        handles.push(tokio::spawn(async move {
            orders.transition_fulfillment(order_id, target).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.expect("task completed"));
    }

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.into_iter().find(|r| r.is_err()).unwrap().unwrap_err();
    assert_matches!(loser, ServiceError::InvalidTransition { .. });

    // only the winning transition appended history
    let reloaded = app
        .services
        .orders
        .get_order(Some(customer), order_id)
        .await
        .unwrap();
    assert_eq!(reloaded.status_history.len(), 2);
    assert!(reloaded
        .order
        .fulfillment_status()
        .unwrap()
        .is_terminal());
}
