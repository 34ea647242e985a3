// Not every test binary exercises every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header::CONTENT_TYPE, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use sha2::Sha256;
use storefront_api::{
    config::AppConfig,
    db,
    entities::{order, product},
    events::{self, EventSender},
    gateway::{CreateRemoteOrder, GatewayClient, GatewayError, RemoteOrder},
    handlers::webhooks::GATEWAY_SIGNATURE_HEADER,
    AppServices, AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const GATEWAY_KEY_SECRET: &str = "kq7XwJ2mN8pR4tVy6zAcE1gH";
pub const GATEWAY_WEBHOOK_SECRET: &str = "wh5DsF8jK2mP7qTu3vXb9yCe";

type HmacSha256 = Hmac<Sha256>;

/// Payment confirmation signature the hosted widget would hand the browser.
pub fn compute_payment_signature(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
    let mut mac = HmacSha256::new_from_slice(GATEWAY_KEY_SECRET.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Webhook signature over the raw delivery body.
pub fn compute_webhook_signature(body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(GATEWAY_WEBHOOK_SECRET.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Gateway double: mints deterministic remote order ids, records calls, and
/// can be told to fail like an unreachable provider.
pub struct MockGateway {
    calls: AtomicUsize,
    fail: AtomicBool,
    last_request: Mutex<Option<CreateRemoteOrder>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            last_request: Mutex::new(None),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CreateRemoteOrder> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    async fn create_remote_order(
        &self,
        request: CreateRemoteOrder,
    ) -> Result<RemoteOrder, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);

        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }

        Ok(RemoteOrder {
            id: format!("order_mock{:04}", n),
        })
    }
}

/// Helper harness wiring the real router over an in-memory SQLite database
/// and a mock gateway.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "key_test_4X9mQ2".to_string(),
            GATEWAY_KEY_SECRET.to_string(),
            GATEWAY_WEBHOOK_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::ensure_schema(&pool)
            .await
            .expect("failed to bootstrap schema in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(MockGateway::new());
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            gateway.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .layer(axum::middleware::from_fn(
                storefront_api::middleware_helpers::request_id::request_id_middleware,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).expect("serializable body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response")
    }

    /// Posts a raw webhook body with an optional signature header.
    pub async fn post_webhook(&self, body: Vec<u8>, signature: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/gateway")
            .header(CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(GATEWAY_SIGNATURE_HEADER, signature);
        }

        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).expect("request"))
            .await
            .expect("response")
    }

    pub async fn seed_product(&self, sku: &str, price_minor: i64, stock: i32) -> product::Model {
        self.seed_product_with(sku, price_minor, stock, true).await
    }

    pub async fn seed_product_with(
        &self,
        sku: &str,
        price_minor: i64,
        stock: i32,
        is_active: bool,
    ) -> product::Model {
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("{} test product", sku)),
            description: Set(None),
            price_minor: Set(price_minor),
            currency: Set("INR".to_string()),
            stock: Set(stock),
            is_active: Set(is_active),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        model
            .insert(&*self.state.db)
            .await
            .expect("failed to seed product")
    }

    /// Fresh stock read, bypassing the catalog cache.
    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("product query")
            .expect("product exists")
            .stock
    }

    /// Raw order row for asserting persisted state.
    pub async fn order_row(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("order query")
            .expect("order exists")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
