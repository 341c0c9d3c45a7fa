use axum::{
    extract::{Json, Path, Query, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    handlers::common::{map_service_error, success_response, validate_input},
    services::payments::InitiatePaymentInput,
    AppState,
};

async fn initiate_payment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<InitiatePaymentInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .payments
        .initiate(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(outcome))
}

#[derive(Debug, Deserialize)]
struct ProcessParams {
    /// Method hint echoed back by the provider page; the recorded payment
    /// intent stays authoritative.
    #[serde(rename = "paymentMethod")]
    payment_method: Option<String>,
}

/// Simulated processor callback. Unauthenticated: the shopper's browser lands
/// here from the provider page, exactly like a real gateway return URL.
async fn process_payment(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Query(params): Query<ProcessParams>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(method) = params.payment_method.as_deref() {
        debug!(%order_id, method, "processor callback carried a method hint");
    }
    let outcome = state
        .services
        .payments
        .process(order_id)
        .await
        .map_err(map_service_error)?;
    Ok(Redirect::to(&outcome.redirect_url))
}

async fn payment_status(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .services
        .payments
        .status(user.user_id, order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(status))
}

pub fn payment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/initiate", post(initiate_payment))
        .route("/process/:order_id", get(process_payment))
        .route("/status/:order_id", get(payment_status))
}
