use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    entities::stock_movement::{self, Entity as StockMovementEntity, StockMovementType},
    errors::ServiceError,
};

/// Reason recorded on movements that originate from merchandise receiving.
pub const REASON_PURCHASE: &str = "PURCHASE";
pub const REFERENCE_PURCHASE_ORDER: &str = "PURCHASE_ORDER";

/// An inbound movement to be recorded against the ledger.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Stock ledger collaborator: append-only record of inventory movements,
/// each carrying a reference back to the document that caused it.
///
/// Connection-generic so receiving can write movements inside the same
/// transaction as the order lines they justify.
#[derive(Debug, Clone, Default)]
pub struct StockLedgerService;

impl StockLedgerService {
    pub fn new() -> Self {
        Self
    }

    /// Records an inbound movement.
    #[instrument(skip(self, db, record), fields(product_id = %record.product_id, quantity = record.quantity))]
    pub async fn record_entry<C: ConnectionTrait>(
        &self,
        db: &C,
        record: EntryRecord,
    ) -> Result<stock_movement::Model, ServiceError> {
        self.record(db, StockMovementType::Entry, record).await
    }

    /// Records an outbound movement.
    #[instrument(skip(self, db, record), fields(product_id = %record.product_id, quantity = record.quantity))]
    pub async fn record_exit<C: ConnectionTrait>(
        &self,
        db: &C,
        record: EntryRecord,
    ) -> Result<stock_movement::Model, ServiceError> {
        self.record(db, StockMovementType::Exit, record).await
    }

    async fn record<C: ConnectionTrait>(
        &self,
        db: &C,
        movement_type: StockMovementType,
        record: EntryRecord,
    ) -> Result<stock_movement::Model, ServiceError> {
        if record.quantity <= 0 {
            return Err(ServiceError::InventoryError(format!(
                "Movement quantity must be positive, got {}",
                record.quantity
            )));
        }

        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(record.product_id),
            movement_type: Set(movement_type),
            quantity: Set(record.quantity),
            unit_price: Set(record.unit_price),
            reason: Set(record.reason),
            reference_id: Set(record.reference_id),
            reference_type: Set(record.reference_type),
            batch_number: Set(record.batch_number),
            expiry_date: Set(record.expiry_date),
            created_at: Set(Utc::now()),
        };

        movement.insert(db).await.map_err(|e| {
            error!("Failed to record stock movement: {}", e);
            ServiceError::DatabaseError(e)
        })
    }

    /// All movements recorded against a reference document, oldest first.
    pub async fn movements_for_reference<C: ConnectionTrait>(
        &self,
        db: &C,
        reference_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        StockMovementEntity::find()
            .filter(stock_movement::Column::ReferenceId.eq(reference_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}
