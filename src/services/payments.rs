//! Payment gateway: a simulated processor with the redirect flow of a real
//! one.
//!
//! Initiation is authenticated and owned by the order's user; the processor
//! callback (`process`) is public, keyed only by order id, exactly like a
//! real gateway webhook. Settlement is a random draw against the configured
//! success rate.

use crate::{
    cache::EphemeralStore,
    entities::{order, Order, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;
use validator::Validate;

/// Accepted payment methods. Anything else is rejected at initiation and
/// stored as NULL at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Bkash,
    Nagad,
    Rocket,
    Cod,
    Card,
}

impl PaymentMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bkash" => Some(Self::Bkash),
            "nagad" => Some(Self::Nagad),
            "rocket" => Some(Self::Rocket),
            "cod" => Some(Self::Cod),
            "card" => Some(Self::Card),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bkash => "bkash",
            Self::Nagad => "nagad",
            Self::Rocket => "rocket",
            Self::Cod => "cod",
            Self::Card => "card",
        }
    }
}

/// Source of the settlement draw, injectable so tests can force either
/// outcome.
pub trait RandomSource: Send + Sync {
    /// Uniform draw in `[0, 1)`.
    fn draw(&self) -> f64;
}

/// Production source backed by the thread-local RNG.
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn draw(&self) -> f64 {
        rand::Rng::gen(&mut rand::thread_rng())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentInput {
    pub order_id: Uuid,
    #[validate(length(min = 1))]
    pub payment_method: String,
}

/// Outcome of initiation: COD settles in place, gateway methods redirect.
#[derive(Debug, Serialize)]
pub struct InitiateOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub payment_status: PaymentStatus,
    pub message: String,
}

/// Outcome of processing: where to send the shopper's browser.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub redirect_url: String,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusView {
    pub order_id: Uuid,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    rng: Arc<dyn RandomSource>,
    intents: Arc<dyn EphemeralStore>,
    frontend_url: String,
    success_rate: f64,
    intent_ttl: Duration,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        rng: Arc<dyn RandomSource>,
        intents: Arc<dyn EphemeralStore>,
        frontend_url: String,
        success_rate: f64,
        intent_ttl: Duration,
    ) -> Self {
        Self {
            db,
            event_sender,
            rng,
            intents,
            frontend_url,
            success_rate,
            intent_ttl,
        }
    }

    /// Starts payment for an order the user owns.
    ///
    /// COD settles immediately. Gateway methods move the order to
    /// `processing`, record a short-lived payment intent and hand back the
    /// provider redirect URL.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn initiate(
        &self,
        user_id: Uuid,
        input: InitiatePaymentInput,
    ) -> Result<InitiateOutcome, ServiceError> {
        let method = PaymentMethod::parse(&input.payment_method)
            .ok_or_else(|| ServiceError::InvalidPaymentMethod(input.payment_method.clone()))?;

        let order = self.find_owned_order(user_id, input.order_id).await?;

        if order.payment_status == PaymentStatus::Completed {
            return Err(ServiceError::InvalidOperation(
                "Payment already completed for this order".to_string(),
            ));
        }

        let order_id = order.id;
        let mut active: order::ActiveModel = order.into();
        active.payment_method = Set(Some(method.as_str().to_string()));
        active.updated_at = Set(Utc::now());

        let outcome = if method == PaymentMethod::Cod {
            // Settlement only; fulfillment status stays with vendor order
            // management.
            active.payment_status = Set(PaymentStatus::Completed);
            active.update(&*self.db).await?;

            self.event_sender
                .send_or_log(Event::PaymentCompleted(order_id))
                .await;

            InitiateOutcome {
                redirect_url: None,
                payment_status: PaymentStatus::Completed,
                message: "Order confirmed with cash on delivery".to_string(),
            }
        } else {
            active.payment_status = Set(PaymentStatus::Processing);
            active.update(&*self.db).await?;

            self.intents
                .put(
                    intent_key(order_id),
                    method.as_str().to_string(),
                    self.intent_ttl,
                )
                .await;

            let redirect_url = self.provider_url(method, order_id)?;
            InitiateOutcome {
                redirect_url: Some(redirect_url),
                payment_status: PaymentStatus::Processing,
                message: format!("Redirecting to {} payment", method.as_str()),
            }
        };

        self.event_sender
            .send_or_log(Event::PaymentInitiated {
                order_id,
                method: method.as_str().to_string(),
            })
            .await;

        info!(%order_id, method = method.as_str(), "payment initiated");
        Ok(outcome)
    }

    /// Processor callback: settles the payment with a draw against the
    /// configured success rate and redirects the shopper back to the
    /// storefront.
    ///
    /// Idempotent for completed orders; replaying the callback never
    /// re-settles or flips a completed payment.
    #[instrument(skip(self))]
    pub async fn process(&self, order_id: Uuid) -> Result<ProcessOutcome, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("No order found related to this ID".to_string())
            })?;

        if order.payment_status == PaymentStatus::Completed {
            return Ok(ProcessOutcome {
                redirect_url: self.callback_url(
                    order_id,
                    PaymentStatus::Completed,
                    "Payment already completed",
                )?,
                payment_status: PaymentStatus::Completed,
            });
        }

        // The intent is single-use; a missing or expired intent falls back to
        // the method recorded on the order.
        if self.intents.take(&intent_key(order_id)).await.is_none() {
            warn!(%order_id, "no live payment intent; settling from order record");
        }

        let success = self.rng.draw() < self.success_rate;
        let settled = if success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };

        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(settled);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        let (event, message) = if success {
            (Event::PaymentCompleted(order_id), "Payment successful")
        } else {
            (
                Event::PaymentFailed(order_id),
                "Payment failed, please try again",
            )
        };
        self.event_sender.send_or_log(event).await;

        info!(%order_id, status = settled.as_str(), "payment processed");
        Ok(ProcessOutcome {
            redirect_url: self.callback_url(order_id, settled, message)?,
            payment_status: settled,
        })
    }

    /// Current payment state of an order the user owns.
    #[instrument(skip(self))]
    pub async fn status(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<PaymentStatusView, ServiceError> {
        let order = self.find_owned_order(user_id, order_id).await?;
        Ok(PaymentStatusView {
            order_id: order.id,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
        })
    }

    async fn find_owned_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No order found related to this ID".to_string()))
    }

    /// `{frontend}/payment/{method}?orderId={id}` — the simulated provider's
    /// hosted page.
    fn provider_url(&self, method: PaymentMethod, order_id: Uuid) -> Result<String, ServiceError> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::InternalError("frontend URL cannot be a base".to_string()))?
            .push("payment")
            .push(method.as_str());
        url.query_pairs_mut()
            .append_pair("orderId", &order_id.to_string());
        Ok(url.into())
    }

    /// `{frontend}/payment/callback?orderId=&status=&message=` — where the
    /// storefront client picks up the settlement result.
    fn callback_url(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        message: &str,
    ) -> Result<String, ServiceError> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::InternalError("frontend URL cannot be a base".to_string()))?
            .push("payment")
            .push("callback");
        url.query_pairs_mut()
            .append_pair("orderId", &order_id.to_string())
            .append_pair("status", status.as_str())
            .append_pair("message", message);
        Ok(url.into())
    }

    fn base_url(&self) -> Result<Url, ServiceError> {
        Url::parse(&self.frontend_url).map_err(|e| {
            ServiceError::InternalError(format!("invalid frontend URL {}: {}", self.frontend_url, e))
        })
    }
}

fn intent_key(order_id: Uuid) -> String {
    format!("payment_intent:{order_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_the_allow_list_case_insensitively() {
        assert_eq!(PaymentMethod::parse("bkash"), Some(PaymentMethod::Bkash));
        assert_eq!(PaymentMethod::parse("  CARD "), Some(PaymentMethod::Card));
        assert_eq!(PaymentMethod::parse("CoD"), Some(PaymentMethod::Cod));
        assert_eq!(PaymentMethod::parse("paypal"), None);
        assert_eq!(PaymentMethod::parse(""), None);
    }

    #[test]
    fn method_round_trips_through_as_str() {
        for method in [
            PaymentMethod::Bkash,
            PaymentMethod::Nagad,
            PaymentMethod::Rocket,
            PaymentMethod::Cod,
            PaymentMethod::Card,
        ] {
            assert_eq!(PaymentMethod::parse(method.as_str()), Some(method));
        }
    }

    #[test]
    fn thread_rng_draws_in_unit_interval() {
        let source = ThreadRngSource;
        for _ in 0..100 {
            let x = source.draw();
            assert!((0.0..1.0).contains(&x));
        }
    }
}
