//! HTTP handlers: thin translation between the wire and the service layer.
//!
//! Handlers never touch the database directly; they validate input, call one
//! service method and shape the response.

pub mod carts;
pub mod common;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod payments;

use crate::{
    cache::EphemeralStore,
    config::AppConfig,
    events::EventSender,
    services::{
        payments::RandomSource, CartService, CouponService, OrderService, PaymentService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

/// All domain services, wired once at startup and shared through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub carts: CartService,
    pub coupons: CouponService,
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl AppServices {
    /// Wires the service graph. The random source and intent store are
    /// injected so tests can force payment outcomes and inspect intents.
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        rng: Arc<dyn RandomSource>,
        intents: Arc<dyn EphemeralStore>,
    ) -> Self {
        let coupons = CouponService::new(db.clone());
        let carts = CartService::new(db.clone(), event_sender.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone(), coupons.clone());
        let payments = PaymentService::new(
            db,
            event_sender,
            rng,
            intents,
            config.frontend_url.clone(),
            config.payment_success_rate,
            Duration::from_secs(config.payment_intent_ttl_secs),
        );
        Self {
            carts,
            coupons,
            orders,
            payments,
        }
    }
}
