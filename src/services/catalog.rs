use crate::{
    cache::BoundedCache,
    db::DbPool,
    entities::product::{self, Entity as ProductEntity, Model as ProductModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// Catalog store boundary: price/stock/availability lookups for order
/// intake and the authoritative stock commit at capture time. Lookups go
/// through a bounded TTL cache; the commit path always hits the database.
#[derive(Clone)]
pub struct ProductCatalogService {
    db_pool: Arc<DbPool>,
    cache: BoundedCache<Uuid, ProductModel>,
}

impl ProductCatalogService {
    pub fn new(db_pool: Arc<DbPool>, cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            db_pool,
            cache: BoundedCache::new(cache_capacity, cache_ttl),
        }
    }

    /// Reads a product, serving recent lookups from the cache.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<ProductModel>, ServiceError> {
        if let Some(product) = self.cache.get(&product_id) {
            return Ok(Some(product));
        }

        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })?;

        if let Some(product) = &product {
            self.cache.insert(product_id, product.clone());
        }

        Ok(product)
    }

    /// Commits a stock decrement inside the caller's capture transaction.
    ///
    /// The decrement is unconditional: by the time this runs the payment is
    /// already captured at the gateway, so overselling surfaces as negative
    /// stock for reconciliation rather than a failed capture.
    #[instrument(skip(self, conn), fields(product_id = %product_id, quantity))]
    pub async fn decrement_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = ProductEntity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Stock decrement failed");
                ServiceError::DatabaseError(e)
            })?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found for stock commit",
                product_id
            )));
        }

        let remaining = ProductEntity::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .map(|p| p.stock);
        if let Some(stock) = remaining {
            if stock < 0 {
                warn!(
                    product_id = %product_id,
                    stock,
                    "Stock went negative at capture; flagging for reconciliation"
                );
            }
        }

        self.cache.invalidate(&product_id);
        Ok(())
    }
}
