//! Coupon engine: validation and discount computation.
//!
//! The quote path (`apply`) is read-only; redemption accounting happens only
//! inside the checkout transaction via `redeem_for_checkout`, which holds a
//! row lock while it increments `used_count`.

use crate::{
    entities::{coupon, Coupon, CouponType},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend,
    EntityTrait, QueryFilter, QuerySelect, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of a successful coupon application.
#[derive(Debug, Clone, Serialize)]
pub struct CouponQuote {
    pub discount_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<Decimal>,
    pub message: String,
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validates a code against a subtotal and quotes the discount. Read-only
    /// and informational: checkout re-runs the validation server-side.
    #[instrument(skip(self))]
    pub async fn apply(&self, code: &str, subtotal: Decimal) -> Result<CouponQuote, ServiceError> {
        if code.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code is required".to_string(),
            ));
        }
        if subtotal < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Valid subtotal is required".to_string(),
            ));
        }

        let coupon = find_by_code(&*self.db, code)
            .await?
            .ok_or(ServiceError::CouponNotFound)?;

        validate(&coupon, Utc::now())?;
        Ok(quote(&coupon, subtotal))
    }

    /// Checkout-path redemption: validates under a row lock, increments
    /// `used_count` and returns the discount. Must run inside the order
    /// transaction so the usage cap binds under concurrent checkouts.
    pub async fn redeem_for_checkout(
        &self,
        txn: &DatabaseTransaction,
        code: &str,
        subtotal: Decimal,
    ) -> Result<Decimal, ServiceError> {
        let mut query = Coupon::find().filter(code_matches(code));
        if txn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let coupon = query.one(txn).await?.ok_or(ServiceError::CouponNotFound)?;

        validate(&coupon, Utc::now())?;
        let discount = compute_discount(&coupon, subtotal);

        let used = coupon.used_count + 1;
        let code = coupon.code.clone();
        let mut active: coupon::ActiveModel = coupon.into();
        active.used_count = Set(used);
        active.update(txn).await?;

        info!(%code, %discount, "coupon redeemed");
        Ok(discount)
    }
}

fn code_matches(code: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::expr(Func::upper(Expr::col((
        coupon::Entity,
        coupon::Column::Code,
    ))))
    .eq(code.trim().to_uppercase())
}

async fn find_by_code<C: sea_orm::ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<coupon::Model>, ServiceError> {
    Ok(Coupon::find().filter(code_matches(code)).one(conn).await?)
}

/// Validation order is part of the contract: unknown code, then window start,
/// then window end, then usage cap — each a distinct failure.
fn validate(coupon: &coupon::Model, now: DateTime<Utc>) -> Result<(), ServiceError> {
    if let Some(valid_from) = coupon.valid_from {
        if now < valid_from {
            return Err(ServiceError::CouponNotYetValid);
        }
    }
    if let Some(valid_until) = coupon.valid_until {
        if now > valid_until {
            return Err(ServiceError::CouponExpired);
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(ServiceError::CouponUsageLimitReached);
        }
    }
    Ok(())
}

/// Percent coupons take a fraction of the subtotal; fixed coupons are clamped
/// to the subtotal so the remainder can never go negative. Rounded to the
/// cent, midpoint away from zero, and always carried at two-decimal scale.
fn compute_discount(coupon: &coupon::Model, subtotal: Decimal) -> Decimal {
    let raw = match coupon.discount_type {
        CouponType::Percent => subtotal * coupon.discount_value / Decimal::from(100),
        CouponType::Fixed => coupon.discount_value.min(subtotal),
    };
    let mut amount = raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    amount.rescale(2);
    amount
}

fn quote(coupon: &coupon::Model, subtotal: Decimal) -> CouponQuote {
    let discount_amount = compute_discount(coupon, subtotal);
    match coupon.discount_type {
        CouponType::Percent => CouponQuote {
            discount_amount,
            discount_percent: Some(coupon.discount_value),
            message: format!("{}% off applied", coupon.discount_value),
        },
        CouponType::Fixed => CouponQuote {
            discount_amount,
            discount_percent: None,
            message: format!("${:.2} discount applied", discount_amount),
        },
    }
}
