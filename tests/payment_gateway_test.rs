mod common;

use axum::http::{header, Method, StatusCode};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;
use storefront_api::entities::{Order, OrderStatus, PaymentStatus};
use uuid::Uuid;

use common::{read_json, TestApp};

/// Seeds a product, fills the cart and checks out; returns the order id.
async fn place_order(app: &TestApp) -> Uuid {
    let vendor = app.seed_vendor("Acme Supplies").await;
    let desk = app
        .seed_product(vendor.id, "Walnut Desk", dec!(100.00), 10)
        .await;
    app.request(
        Method::POST,
        "/api/cart/items",
        Some(json!({"product_id": desk.id, "quantity": 1})),
    )
    .await;
    let response = app
        .request(Method::POST, "/api/orders", Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await["order_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

async fn order_state(app: &TestApp, order_id: Uuid) -> (OrderStatus, PaymentStatus) {
    let order = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    (order.status, order.payment_status)
}

#[tokio::test]
async fn cash_on_delivery_settles_immediately() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/initiate",
            Some(json!({"order_id": order_id, "payment_method": "cod"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["payment_status"], "completed");
    assert!(body.get("redirect_url").is_none());

    let (status, payment_status) = order_state(&app, order_id).await;
    assert_eq!(status, OrderStatus::Pending);
    assert_eq!(payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn gateway_method_redirects_to_the_provider_page() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/initiate",
            Some(json!({"order_id": order_id, "payment_method": "bkash"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["payment_status"], "processing");
    let redirect = body["redirect_url"].as_str().unwrap();
    assert!(redirect.contains("/payment/bkash"));
    assert!(redirect.contains(&format!("orderId={order_id}")));

    let (_, payment_status) = order_state(&app, order_id).await;
    assert_eq!(payment_status, PaymentStatus::Processing);
}

#[tokio::test]
async fn unknown_method_is_rejected_at_initiation() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/initiate",
            Some(json!({"order_id": order_id, "payment_method": "paypal"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["message"], "Invalid payment method: paypal");
}

#[tokio::test]
async fn initiation_requires_order_ownership() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;

    let intruder = app.token_for(Uuid::new_v4());
    let response = app
        .request_with_token(
            Method::POST,
            "/api/payments/initiate",
            Some(json!({"order_id": order_id, "payment_method": "card"})),
            Some(&intruder),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn successful_draw_completes_and_redirects_back() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;
    app.request(
        Method::POST,
        "/api/payments/initiate",
        Some(json!({"order_id": order_id, "payment_method": "card"})),
    )
    .await;

    app.draw.set(0.0); // below any success rate
    let response = app
        .request_unauthenticated(
            Method::GET,
            &format!("/api/payments/process/{order_id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.contains("/payment/callback"));
    assert!(location.contains("status=completed"));

    let (status, payment_status) = order_state(&app, order_id).await;
    assert_eq!(status, OrderStatus::Pending);
    assert_eq!(payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn settlement_never_touches_fulfillment_status() {
    // Fulfillment transitions belong to vendor order management; the gateway
    // may only move payment_status.
    let app = TestApp::new().await;

    let order_id = place_order(&app).await;
    app.request(
        Method::POST,
        "/api/payments/initiate",
        Some(json!({"order_id": order_id, "payment_method": "cod"})),
    )
    .await;
    let (status, payment_status) = order_state(&app, order_id).await;
    assert_eq!(status, OrderStatus::Pending);
    assert_eq!(payment_status, PaymentStatus::Completed);

    let order_id = place_order(&app).await;
    app.request(
        Method::POST,
        "/api/payments/initiate",
        Some(json!({"order_id": order_id, "payment_method": "card"})),
    )
    .await;
    app.draw.set(0.0);
    app.request_unauthenticated(
        Method::GET,
        &format!("/api/payments/process/{order_id}"),
        None,
    )
    .await;
    let (status, payment_status) = order_state(&app, order_id).await;
    assert_eq!(status, OrderStatus::Pending);
    assert_eq!(payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn failed_draw_marks_the_payment_failed() {
    let app = TestApp::with_payment_draw(1.0).await; // above any success rate
    let order_id = place_order(&app).await;
    app.request(
        Method::POST,
        "/api/payments/initiate",
        Some(json!({"order_id": order_id, "payment_method": "nagad"})),
    )
    .await;

    let response = app
        .request_unauthenticated(
            Method::GET,
            &format!("/api/payments/process/{order_id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.contains("status=failed"));

    let (status, payment_status) = order_state(&app, order_id).await;
    // A failed settlement leaves the order itself pending
    assert_eq!(status, OrderStatus::Pending);
    assert_eq!(payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn replayed_callback_is_idempotent_after_completion() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;
    app.request(
        Method::POST,
        "/api/payments/initiate",
        Some(json!({"order_id": order_id, "payment_method": "card"})),
    )
    .await;

    app.draw.set(0.0);
    app.request_unauthenticated(
        Method::GET,
        &format!("/api/payments/process/{order_id}"),
        None,
    )
    .await;

    // Even a draw that would fail cannot flip a completed payment
    app.draw.set(1.0);
    let response = app
        .request_unauthenticated(
            Method::GET,
            &format!("/api/payments/process/{order_id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.contains("status=completed"));

    let (_, payment_status) = order_state(&app, order_id).await;
    assert_eq!(payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn callback_accepts_a_method_query_parameter() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;
    app.request(
        Method::POST,
        "/api/payments/initiate",
        Some(json!({"order_id": order_id, "payment_method": "card"})),
    )
    .await;

    app.draw.set(0.0);
    let response = app
        .request_unauthenticated(
            Method::GET,
            &format!("/api/payments/process/{order_id}?paymentMethod=card"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let (_, payment_status) = order_state(&app, order_id).await;
    assert_eq!(payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn processing_an_unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request_unauthenticated(
            Method::GET,
            &format!("/api/payments/process/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_reports_method_and_state_to_the_owner() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;
    app.request(
        Method::POST,
        "/api/payments/initiate",
        Some(json!({"order_id": order_id, "payment_method": "rocket"})),
    )
    .await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/payments/status/{order_id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["payment_method"], "rocket");
    assert_eq!(body["payment_status"], "processing");

    let intruder = app.token_for(Uuid::new_v4());
    let response = app
        .request_with_token(
            Method::GET,
            &format!("/api/payments/status/{order_id}"),
            None,
            Some(&intruder),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn initiating_on_a_completed_payment_is_rejected() {
    let app = TestApp::new().await;
    let order_id = place_order(&app).await;
    app.request(
        Method::POST,
        "/api/payments/initiate",
        Some(json!({"order_id": order_id, "payment_method": "cod"})),
    )
    .await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/initiate",
            Some(json!({"order_id": order_id, "payment_method": "card"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
