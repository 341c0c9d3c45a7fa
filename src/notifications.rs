//! Order notifications.
//!
//! Email delivery is an external collaborator; the checkout core only needs a
//! fire-and-forget seam. Every implementation must be safe to fail: callers
//! log and continue, a committed order is never invalidated by a notification
//! error.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Summary of a freshly committed order, enough for a confirmation message.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub total_amount: Decimal,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_confirmation(
        &self,
        email: &str,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError>;
}

/// Default notifier: records the confirmation in the log stream. Stands in for
/// the SMTP integration, which stays outside this core.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn order_confirmation(
        &self,
        email: &str,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        info!(
            order_id = %confirmation.order_id,
            total_amount = %confirmation.total_amount,
            recipient = %email,
            "order confirmation queued"
        );
        Ok(())
    }
}
