#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth,
    cache::InMemoryEphemeralStore,
    config::AppConfig,
    db,
    entities::{coupon, product, vendor, CouponType, ProductStatus},
    events::{self, EventSender},
    handlers::AppServices,
    services::payments::RandomSource,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Deterministic stand-in for the payment settlement draw. The stored value
/// can be swapped mid-test to force either outcome.
pub struct ForcedDraw(AtomicU64);

impl ForcedDraw {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::SeqCst);
    }
}

impl RandomSource for ForcedDraw {
    fn draw(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }
}

/// Test harness: the full router backed by a throwaway SQLite database.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub user_id: Uuid,
    pub draw: Arc<ForcedDraw>,
    token: String,
    db_file: PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        // A draw of 0.0 settles every payment successfully under the default
        // success rate; tests force failures by raising it past 1.0.
        Self::with_payment_draw(0.0).await
    }

    pub async fn with_payment_draw(draw_value: f64) -> Self {
        let db_file = std::env::temp_dir().join(format!("storefront_test_{}.db", Uuid::new_v4()));

        let cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "test".to_string(),
        );

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            Arc::new(storefront_api::notifications::LoggingNotifier),
        ));

        let draw = Arc::new(ForcedDraw::new(draw_value));
        let services = AppServices::new(
            db.clone(),
            Arc::new(event_sender.clone()),
            &cfg,
            draw.clone(),
            Arc::new(InMemoryEphemeralStore::new()),
        );

        let state = Arc::new(AppState {
            db,
            config: cfg,
            event_sender,
            services,
        });
        let router = storefront_api::router(state.clone());

        let user_id = Uuid::new_v4();
        let token = auth::issue_token(
            user_id,
            Some("shopper@example.com".to_string()),
            &state.config.jwt_secret,
            3600,
        )
        .expect("failed to issue test token");

        Self {
            router,
            state,
            user_id,
            draw,
            token,
            db_file,
            _event_task: event_task,
        }
    }

    /// Token for a second shopper, to exercise ownership checks.
    pub fn token_for(&self, user_id: Uuid) -> String {
        auth::issue_token(user_id, None, &self.state.config.jwt_secret, 3600)
            .expect("failed to issue test token")
    }

    pub async fn seed_vendor(&self, business_name: &str) -> vendor::Model {
        vendor::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_name: Set(business_name.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed vendor")
    }

    pub async fn seed_product(
        &self,
        vendor_id: Uuid,
        name: &str,
        price: Decimal,
        stock_quantity: i32,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(price),
            stock_quantity: Set(stock_quantity),
            status: Set(ProductStatus::Active),
            image_url: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: CouponType,
        discount_value: Decimal,
        usage_limit: Option<i32>,
    ) -> coupon::Model {
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            valid_from: Set(None),
            valid_until: Set(None),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed coupon")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.request_with_token(method, uri, body, Some(self.token.as_str()))
            .await
    }

    pub async fn request_unauthenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.request_with_token(method, uri, body, None).await
    }

    pub async fn request_with_token(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Reads and parses a JSON response body.
pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body is not valid JSON")
}
