use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, success_response, PaginatedResponse, PaginationParams,
    },
    services::orders::CreateOrderInput,
    AppState,
};

/// Checkout: converts the caller's cart into an order in one transaction.
async fn create_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order_id = state
        .services
        .orders
        .create_order_from_cart(user.user_id, user.email.clone(), payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(
        json!({"order_id": order_id, "message": "Order placed successfully"}),
    ))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(user.user_id, params.page, params.per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::new(
        orders,
        params.page,
        params.per_page,
        total,
    )))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(user.user_id, order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

pub fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/:order_id", get(get_order))
}
