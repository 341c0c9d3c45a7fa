mod common;

use axum::http::{Method, StatusCode};

use common::{read_json, TestApp};

#[tokio::test]
async fn health_reports_database_status() {
    let app = TestApp::new().await;

    let response = app
        .request_unauthenticated(Method::GET, "/health", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "up");
}
