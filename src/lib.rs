//! Storefront API Library
//!
//! Core of a multi-vendor storefront backend: carts, coupons, atomic
//! checkout, and a simulated payment gateway over a relational store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Builds the full API router against a prepared state.
///
/// Outer middleware (CORS, compression) is layered by the binary; tests mount
/// this router directly.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/health", handlers::health::health_routes())
        .nest("/api/cart", handlers::carts::cart_routes())
        .nest("/api/orders", handlers::orders::order_routes())
        .nest("/api/payments", handlers::payments::payment_routes())
        .nest("/api/coupons", handlers::coupons::coupon_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
