pub mod common;
pub mod orders;
pub mod payments;
pub mod webhooks;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::GatewayClient;
use std::sync::Arc;
use std::time::Duration;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<crate::services::catalog::ProductCatalogService>,
    pub orders: Arc<crate::services::orders::OrderService>,
    pub payments: Arc<crate::services::payments::PaymentService>,
    pub webhooks: Arc<crate::services::webhooks::WebhookService>,
}

impl AppServices {
    /// Wire the service graph from the shared pool, event channel and
    /// gateway client.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn GatewayClient>,
        config: &AppConfig,
    ) -> Self {
        let catalog = Arc::new(crate::services::catalog::ProductCatalogService::new(
            db_pool.clone(),
            config.catalog_cache_capacity,
            Duration::from_secs(config.catalog_cache_ttl_secs),
        ));

        let orders = Arc::new(crate::services::orders::OrderService::new(
            db_pool,
            catalog.clone(),
            gateway,
            Some(event_sender.clone()),
            config.gateway_key_id.clone(),
            config.currency.clone(),
        ));

        let payments = Arc::new(crate::services::payments::PaymentService::new(
            orders.clone(),
            config.gateway_key_secret.clone(),
        ));

        let webhooks = Arc::new(crate::services::webhooks::WebhookService::new(
            orders.clone(),
            config.gateway_webhook_secret.clone(),
            Some(event_sender),
        ));

        Self {
            catalog,
            orders,
            payments,
            webhooks,
        }
    }
}
