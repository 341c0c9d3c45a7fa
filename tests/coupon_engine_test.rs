mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;
use storefront_api::entities::{coupon, CouponType};

use common::{read_json, TestApp};

#[tokio::test]
async fn percent_coupon_quotes_a_discount() {
    let app = TestApp::new().await;
    app.seed_coupon("SAVE20", CouponType::Percent, dec!(20), None)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(json!({"code": "SAVE20", "subtotal": "150.00"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["discount_amount"], "30.00");
    assert_eq!(body["discount_percent"], "20");
    assert_eq!(body["message"], "20% off applied");
}

#[tokio::test]
async fn fixed_coupon_is_clamped_to_the_subtotal() {
    let app = TestApp::new().await;
    app.seed_coupon("TENOFF", CouponType::Fixed, dec!(10), None)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(json!({"code": "TENOFF", "subtotal": "4.00"})),
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body["discount_amount"], "4.00");
    assert_eq!(body["message"], "$4.00 discount applied");
}

#[tokio::test]
async fn lookup_ignores_case_and_surrounding_whitespace() {
    let app = TestApp::new().await;
    app.seed_coupon("SAVE20", CouponType::Percent, dec!(20), None)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(json!({"code": "  save20 ", "subtotal": "100.00"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(json!({"code": "NOPE", "subtotal": "100.00"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["message"], "Invalid coupon code");
}

#[tokio::test]
async fn expired_and_not_yet_valid_windows_are_rejected() {
    let app = TestApp::new().await;

    let seeded = app
        .seed_coupon("EXPIRED", CouponType::Percent, dec!(10), None)
        .await;
    let mut expired: coupon::ActiveModel = seeded.into();
    expired.valid_until = Set(Some(Utc::now() - Duration::days(1)));
    expired.update(&*app.state.db).await.unwrap();

    let seeded = app
        .seed_coupon("UPCOMING", CouponType::Percent, dec!(10), None)
        .await;
    let mut upcoming: coupon::ActiveModel = seeded.into();
    upcoming.valid_from = Set(Some(Utc::now() + Duration::days(1)));
    upcoming.update(&*app.state.db).await.unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(json!({"code": "EXPIRED", "subtotal": "100.00"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["message"], "This coupon has expired");

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(json!({"code": "UPCOMING", "subtotal": "100.00"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(response).await["message"],
        "This coupon is not yet valid"
    );
}

#[tokio::test]
async fn usage_cap_blocks_further_quotes() {
    let app = TestApp::new().await;
    let seeded = app
        .seed_coupon("CAPPED", CouponType::Percent, dec!(10), Some(3))
        .await;
    let mut capped: coupon::ActiveModel = seeded.into();
    capped.used_count = Set(3);
    capped.update(&*app.state.db).await.unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(json!({"code": "CAPPED", "subtotal": "100.00"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json(response).await["message"],
        "This coupon has reached its usage limit"
    );
}

#[tokio::test]
async fn blank_code_is_a_validation_error() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(json!({"code": "   ", "subtotal": "100.00"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn quoting_does_not_consume_usage() {
    let app = TestApp::new().await;
    let seeded = app
        .seed_coupon("SAVE20", CouponType::Percent, dec!(20), Some(5))
        .await;

    for _ in 0..3 {
        let response = app
            .request(
                Method::POST,
                "/api/coupons/apply",
                Some(json!({"code": "SAVE20", "subtotal": "100.00"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let coupon = storefront_api::entities::Coupon::find_by_id(seeded.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon.used_count, 0);
}
