use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait, EntityTrait};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
};

/// Catalog lookup collaborator: resolves products and maintains their
/// standing purchase price.
///
/// Methods are generic over the connection so callers can run them inside
/// their own transactions.
#[derive(Debug, Clone, Default)]
pub struct CatalogService;

impl CatalogService {
    pub fn new() -> Self {
        Self
    }

    /// Resolves a product by id.
    pub async fn get_product<C: ConnectionTrait>(
        &self,
        db: &C,
        product_id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError> {
        ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Updates a product's standing purchase price.
    #[instrument(skip(self, db))]
    pub async fn set_purchase_price<C: ConnectionTrait>(
        &self,
        db: &C,
        product_id: Uuid,
        price: Decimal,
    ) -> Result<(), ServiceError> {
        let product = self
            .get_product(db, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if product.purchase_price == price {
            return Ok(());
        }

        let mut active: product::ActiveModel = product.into();
        active.purchase_price = Set(price);
        active.updated_at = Set(Utc::now());
        active
            .update(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        info!(product_id = %product_id, price = %price, "Standing purchase price updated");
        Ok(())
    }
}
