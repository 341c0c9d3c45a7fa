use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    handlers::common::{map_service_error, success_response, validate_input},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
struct ApplyCouponRequest {
    #[validate(length(min = 1))]
    code: String,
    subtotal: Decimal,
}

/// Quotes the discount for a code against a subtotal. Informational only;
/// checkout re-validates the code and does the redemption accounting.
async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let quote = state
        .services
        .coupons
        .apply(&payload.code, payload.subtotal)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(quote))
}

pub fn coupon_routes() -> Router<Arc<AppState>> {
    Router::new().route("/apply", post(apply_coupon))
}
