use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted by the settlement engine. Delivery is best-effort and
/// in-process; a dropped event never fails the operation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        customer_id: Uuid,
        total_minor: i64,
    },
    OrderFulfillmentChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentConfirmed {
        order_id: Uuid,
        payment_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
    },
    StockReserved {
        product_id: Uuid,
        quantity: i32,
    },
    StockReleased {
        product_id: Uuid,
        quantity: i32,
    },
    CouponClaimed {
        code: String,
    },
    CouponReleased {
        code: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Consumes events from the channel until all senders are dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                customer_id,
                total_minor,
            } => {
                info!(%order_id, %customer_id, total_minor, "Order placed");
            }
            Event::OrderFulfillmentChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Fulfillment status changed");
            }
            Event::PaymentConfirmed { order_id, payment_id } => {
                info!(%order_id, %payment_id, "Payment confirmed");
            }
            Event::PaymentFailed { order_id } => {
                info!(%order_id, "Payment failed");
            }
            other => {
                debug!(event = ?other, "Settlement event");
            }
        }
    }
    debug!("Event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_processor() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        sender
            .send(Event::CouponClaimed { code: "SAVE10".into() })
            .await
            .expect("send");
        match rx.recv().await {
            Some(Event::CouponClaimed { code }) => assert_eq!(code, "SAVE10"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        let result = sender.send(Event::PaymentFailed { order_id: Uuid::new_v4() }).await;
        assert!(result.is_err());
    }
}
