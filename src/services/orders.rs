use crate::{
    db::DbPool,
    entities::order::{
        self, Entity as OrderEntity, Model as OrderModel, OrderStatus,
    },
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{CreateRemoteOrder, GatewayClient},
    services::catalog::ProductCatalogService,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Buyer details captured on the order; may or may not map to a registered
/// customer account.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BuyerInfo {
    #[validate(length(min = 1, max = 255, message = "Buyer name is required"))]
    pub name: String,
    #[validate(email(message = "Buyer email must be a valid email address"))]
    pub email: String,
    pub phone: Option<String>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    /// Requested quantity; prices are never accepted from the client
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate]
    pub buyer: BuyerInfo,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
}

/// Returned to the storefront so it can open the hosted payment widget.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderIntakeResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub gateway_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    /// Public key id the widget is initialized with
    pub gateway_key_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub customer_id: Option<Uuid>,
    pub status: OrderStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub duplicate_event_count: i32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub items: Vec<OrderItemResponse>,
}

/// Result of a capture attempt against the order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// This caller performed the transition; side effects ran exactly once
    Captured,
    /// A previous caller already captured with the same payment id
    AlreadyCaptured,
}

/// Result of a failure-transition attempt against the order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Failed,
    AlreadyFailed,
    /// The order was captured before the failure event arrived
    AlreadyCaptured,
}

/// Order intake plus the order-store state transitions shared by the
/// payment confirmation and webhook paths.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    catalog: Arc<ProductCatalogService>,
    gateway: Arc<dyn GatewayClient>,
    event_sender: Option<Arc<EventSender>>,
    gateway_key_id: String,
    currency: String,
}

/// Sums line totals with overflow detection. Quantities are validated
/// positive before this runs.
fn checked_order_total<I>(lines: I) -> Result<i64, ServiceError>
where
    I: IntoIterator<Item = (i64, i32)>,
{
    let mut total: i64 = 0;
    for (unit_price_minor, quantity) in lines {
        let line = unit_price_minor
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| ServiceError::ValidationError("Order total overflow".into()))?;
        total = total
            .checked_add(line)
            .ok_or_else(|| ServiceError::ValidationError("Order total overflow".into()))?;
    }
    Ok(total)
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        catalog: Arc<ProductCatalogService>,
        gateway: Arc<dyn GatewayClient>,
        event_sender: Option<Arc<EventSender>>,
        gateway_key_id: String,
        currency: String,
    ) -> Self {
        Self {
            db_pool,
            catalog,
            gateway,
            event_sender,
            gateway_key_id,
            currency,
        }
    }

    async fn send_event(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send order event");
            }
        }
    }

    /// Validates the cart against the catalog, computes the total from
    /// server-side prices, persists the pending order, and mints the remote
    /// gateway order. A gateway failure marks the order failed so no
    /// payable order without a gateway order id is left behind.
    #[instrument(skip(self, request), fields(buyer_email = %request.buyer.email))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderIntakeResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        // Resolve every line against the catalog before writing anything
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be at least 1",
                    item.product_id
                )));
            }

            let product = self
                .catalog
                .get_product(item.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Product {} not found or inactive",
                        item.product_id
                    ))
                })?;

            if product.currency != self.currency {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} is not priced in {}",
                    product.sku, self.currency
                )));
            }

            // Advisory availability check; stock is committed at capture,
            // not reserved here, so abandoned checkouts hold nothing
            if product.stock < item.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Product {} has {} in stock, {} requested",
                    product.sku, product.stock, item.quantity
                )));
            }

            lines.push((product, item.quantity));
        }

        let amount_minor =
            checked_order_total(lines.iter().map(|(p, qty)| (p.price_minor, *qty)))?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = format!("ORD-{}", order_id.to_string()[..8].to_uppercase());

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_active_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            buyer_name: Set(request.buyer.name.clone()),
            buyer_email: Set(request.buyer.email.clone()),
            buyer_phone: Set(request.buyer.phone.clone()),
            customer_id: Set(request.buyer.customer_id),
            status: Set(OrderStatus::Created),
            amount_minor: Set(amount_minor),
            currency: Set(self.currency.clone()),
            gateway_order_id: Set(None),
            gateway_payment_id: Set(None),
            duplicate_event_count: Set(0),
            failure_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };

        let order_model = order_active_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order");
            ServiceError::DatabaseError(e)
        })?;

        for (product, quantity) in &lines {
            let line_total = product.price_minor * i64::from(*quantity);
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                sku: Set(product.sku.clone()),
                name: Set(product.name.clone()),
                quantity: Set(*quantity),
                unit_price_minor: Set(product.price_minor),
                line_total_minor: Set(line_total),
                created_at: Set(now),
            };
            item.insert(&txn).await.map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to create order item");
                ServiceError::DatabaseError(e)
            })?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        // Mint the remote order. The local order only becomes payable once
        // the gateway order id is recorded.
        let remote = match self
            .gateway
            .create_remote_order(CreateRemoteOrder {
                amount_minor,
                currency: self.currency.clone(),
                receipt: order_number.clone(),
            })
            .await
        {
            Ok(remote) => remote,
            Err(e) => {
                error!(error = %e, order_id = %order_id, "Gateway order creation failed");
                counter!("storefront_orders.gateway_failures", 1);
                self.fail_order(order_id, "gateway order creation failed", "intake")
                    .await?;
                return Err(e.into());
            }
        };

        let mut update: order::ActiveModel = order_model.into();
        update.gateway_order_id = Set(Some(remote.id.clone()));
        update.updated_at = Set(Some(Utc::now()));
        update.version = Set(2);
        update.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to record gateway order id");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            gateway_order_id = %remote.id,
            amount_minor,
            "Order created"
        );
        counter!("storefront_orders.created", 1);

        self.send_event(Event::OrderCreated {
            order_id,
            amount_minor,
        })
        .await;

        Ok(OrderIntakeResponse {
            order_id,
            order_number,
            gateway_order_id: remote.id,
            amount_minor,
            currency: self.currency.clone(),
            gateway_key_id: self.gateway_key_id.clone(),
        })
    }

    /// Atomically transitions `created -> captured` and commits the stock
    /// decrement in the same transaction. Exactly one caller wins the race;
    /// everyone else observes the stored payment id and either agrees
    /// (idempotent no-op) or surfaces a conflict.
    #[instrument(skip(self), fields(order_id = %order_id, source))]
    pub async fn capture_order(
        &self,
        order_id: Uuid,
        gateway_payment_id: &str,
        source: &'static str,
    ) -> Result<CaptureOutcome, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to start capture transaction");
            ServiceError::DatabaseError(e)
        })?;

        let update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Captured))
            .col_expr(
                order::Column::GatewayPaymentId,
                Expr::value(Some(gateway_payment_id.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Created))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Capture update failed");
                ServiceError::DatabaseError(e)
            })?;

        if update.rows_affected == 1 {
            // This caller won; the stock commit rides the same transaction
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;

            for item in &items {
                self.catalog
                    .decrement_stock(&txn, item.product_id, item.quantity)
                    .await?;
            }

            txn.commit().await.map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to commit capture");
                ServiceError::DatabaseError(e)
            })?;

            info!(
                order_id = %order_id,
                gateway_payment_id,
                source,
                "Order captured"
            );
            counter!("storefront_orders.captured", 1);

            self.send_event(Event::OrderCaptured {
                order_id,
                gateway_payment_id: gateway_payment_id.to_string(),
                source,
            })
            .await;

            return Ok(CaptureOutcome::Captured);
        }

        // Lost the race or the order was already terminal; nothing was
        // written, so release the transaction and inspect the stored state.
        txn.rollback().await.map_err(ServiceError::DatabaseError)?;

        let current = self
            .find_model(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        match current.status {
            OrderStatus::Captured => {
                if current.gateway_payment_id.as_deref() == Some(gateway_payment_id) {
                    self.record_duplicate(order_id).await?;
                    counter!("storefront_orders.duplicate_finalizations", 1);
                    self.send_event(Event::DuplicateFinalization { order_id, source })
                        .await;
                    Ok(CaptureOutcome::AlreadyCaptured)
                } else {
                    warn!(
                        order_id = %order_id,
                        stored = current.gateway_payment_id.as_deref().unwrap_or(""),
                        supplied = gateway_payment_id,
                        "Capture attempted with a different payment id"
                    );
                    Err(ServiceError::Conflict(
                        "Order already captured with a different payment id".into(),
                    ))
                }
            }
            OrderStatus::Failed => Err(ServiceError::Conflict(
                "Order already failed; capture rejected".into(),
            )),
            OrderStatus::Created => Err(ServiceError::InternalError(
                "Capture lost the race but the order is still pending".into(),
            )),
        }
    }

    /// Atomically transitions `created -> failed`. Terminal orders are left
    /// untouched; repeat failures are audited no-ops, and a failure event
    /// for a captured order reports that capture won.
    #[instrument(skip(self), fields(order_id = %order_id, source))]
    pub async fn fail_order(
        &self,
        order_id: Uuid,
        reason: &str,
        source: &'static str,
    ) -> Result<FailOutcome, ServiceError> {
        let update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Failed))
            .col_expr(
                order::Column::FailureReason,
                Expr::value(Some(reason.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Created))
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failure update failed");
                ServiceError::DatabaseError(e)
            })?;

        if update.rows_affected == 1 {
            info!(order_id = %order_id, reason, source, "Order failed");
            counter!("storefront_orders.failed", 1);
            self.send_event(Event::OrderFailed {
                order_id,
                reason: reason.to_string(),
            })
            .await;
            return Ok(FailOutcome::Failed);
        }

        let current = self
            .find_model(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        match current.status {
            OrderStatus::Failed => {
                self.record_duplicate(order_id).await?;
                self.send_event(Event::DuplicateFinalization { order_id, source })
                    .await;
                Ok(FailOutcome::AlreadyFailed)
            }
            OrderStatus::Captured => {
                warn!(
                    order_id = %order_id,
                    reason,
                    source,
                    "Failure event for an already-captured order; capture stands"
                );
                self.record_duplicate(order_id).await?;
                Ok(FailOutcome::AlreadyCaptured)
            }
            OrderStatus::Created => Err(ServiceError::InternalError(
                "Failure transition lost the race but the order is still pending".into(),
            )),
        }
    }

    /// Audit-only update for duplicate deliveries; financial fields are
    /// never touched once an order is terminal.
    async fn record_duplicate(&self, order_id: Uuid) -> Result<(), ServiceError> {
        OrderEntity::update_many()
            .col_expr(
                order::Column::DuplicateEventCount,
                Expr::col(order::Column::DuplicateEventCount).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok(())
    }

    pub async fn find_model(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })
    }

    /// Webhook lookups come keyed by the gateway's order id; the gateway
    /// never learns the local primary key.
    pub async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, gateway_order_id, "Failed to fetch order by gateway id");
                ServiceError::DatabaseError(e)
            })
    }

    /// Retrieves an order with its line items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<OrderResponse>, ServiceError> {
        let order = match self.find_model(order_id).await? {
            Some(order) => order,
            None => return Ok(None),
        };

        let items = order
            .find_related(OrderItemEntity)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(Some(Self::model_to_response(order, items)))
    }

    /// Lists orders with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let page = page.max(1);
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page.clamp(1, 100));

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;

        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, per_page, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        let responses = orders
            .into_iter()
            .map(|order| Self::model_to_response(order, Vec::new()))
            .collect();

        Ok((responses, total))
    }

    fn model_to_response(model: OrderModel, items: Vec<OrderItemModel>) -> OrderResponse {
        OrderResponse {
            id: model.id,
            order_number: model.order_number,
            buyer_name: model.buyer_name,
            buyer_email: model.buyer_email,
            buyer_phone: model.buyer_phone,
            customer_id: model.customer_id,
            status: model.status,
            amount_minor: model.amount_minor,
            currency: model.currency,
            gateway_order_id: model.gateway_order_id,
            gateway_payment_id: model.gateway_payment_id,
            duplicate_event_count: model.duplicate_event_count,
            failure_reason: model.failure_reason,
            created_at: model.created_at,
            updated_at: model.updated_at,
            version: model.version,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    sku: item.sku,
                    name: item.name,
                    quantity: item.quantity,
                    unit_price_minor: item.unit_price_minor,
                    line_total_minor: item.line_total_minor,
                })
                .collect(),
        }
    }
}
