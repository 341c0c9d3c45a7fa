//! Domain events and the background processor that consumes them.
//!
//! Events are strictly best-effort side channels: nothing transactional may
//! depend on delivery, and the processor never writes back into checkout
//! state.

use crate::notifications::{Notifier, OrderConfirmation};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the storefront core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemUpdated { cart_id: Uuid, item_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),

    // Checkout events
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        user_email: Option<String>,
        total_amount: Decimal,
    },

    // Payment events
    PaymentInitiated { order_id: Uuid, method: String },
    PaymentCompleted(Uuid),
    PaymentFailed(Uuid),

    // Coupon events
    CouponRedeemed { order_id: Uuid, code: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failures to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort send: a full or closed channel is logged, never propagated.
    /// Post-commit notifications use this path so an event failure can never
    /// unwind an already-committed transaction.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Consumes events from the channel until all senders are dropped.
///
/// The only event with an external side effect is `OrderCreated`, which drives
/// the order-confirmation notification. Notification failures are logged and
/// swallowed.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>, notifier: Arc<dyn Notifier>) {
    while let Some(event) = receiver.recv().await {
        match event {
            Event::OrderCreated {
                order_id,
                user_id,
                user_email,
                total_amount,
            } => {
                info!(%order_id, %user_id, %total_amount, "order created");
                let Some(email) = user_email else {
                    continue;
                };
                let confirmation = OrderConfirmation {
                    order_id,
                    total_amount,
                };
                if let Err(e) = notifier.order_confirmation(&email, &confirmation).await {
                    warn!(%order_id, "failed to send order confirmation: {}", e);
                }
            }
            Event::PaymentCompleted(order_id) => {
                info!(%order_id, "payment completed");
            }
            Event::PaymentFailed(order_id) => {
                info!(%order_id, "payment failed");
            }
            other => {
                tracing::debug!(event = ?other, "event processed");
            }
        }
    }
}
