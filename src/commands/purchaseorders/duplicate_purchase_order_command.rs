use crate::{
    commands::purchaseorders::{CreatePurchaseOrderCommand, PurchaseOrderLineRequest},
    commands::Command,
    db::DbPool,
    entities::{
        purchase_order::Entity as PurchaseOrderEntity,
        purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Copies an existing order into a brand-new one: same supplier, voucher
/// type and line items, fresh order number, nothing received yet.
///
/// Implemented by re-running the create flow with copied inputs, so a
/// duplicate passes the same validation and gets the same atomicity as any
/// other new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatePurchaseOrderCommand {
    pub source_order_id: Uuid,
    pub requested_by: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DuplicatePurchaseOrderResult {
    pub source_order_id: Uuid,
    pub new_order_id: Uuid,
    pub new_order_number: String,
}

#[async_trait::async_trait]
impl Command for DuplicatePurchaseOrderCommand {
    type Result = DuplicatePurchaseOrderResult;

    #[instrument(skip(self, db_pool, event_sender), fields(source_order_id = %self.source_order_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let db = db_pool.as_ref();

        let source = PurchaseOrderEntity::find_by_id(self.source_order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Purchase order {} not found",
                    self.source_order_id
                ))
            })?;

        let source_lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(source.id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let create = CreatePurchaseOrderCommand {
            supplier_id: source.supplier_id,
            created_by: self.requested_by,
            lines: source_lines
                .iter()
                .map(|line| PurchaseOrderLineRequest {
                    product_id: line.product_id,
                    quantity: line.quantity_ordered,
                    unit_price: line.unit_price,
                    discount_pct: Some(line.discount_pct),
                    discount_amount: Some(line.discount_amount),
                    tax_pct: Some(line.tax_pct),
                    tax_amount: Some(line.tax_amount),
                    batch_number: None,
                    expiry_date: None,
                })
                .collect(),
            order_date: None,
            invoice_date: None,
            due_date: None,
            discount_amount: Some(source.discount_amount),
            tax_amount: Some(source.tax_amount),
            voucher_type: source.voucher_type.clone(),
            notes: Some(format!("Duplicated from order {}", source.order_number)),
        };

        let created = create.execute(db_pool.clone(), event_sender.clone()).await?;

        info!(
            source_order_id = %source.id,
            new_order_id = %created.id,
            new_order_number = %created.order_number,
            "Purchase order duplicated"
        );
        event_sender
            .send_or_log(Event::PurchaseOrderDuplicated {
                source_order_id: source.id,
                new_order_id: created.id,
            })
            .await;

        Ok(DuplicatePurchaseOrderResult {
            source_order_id: source.id,
            new_order_id: created.id,
            new_order_number: created.order_number,
        })
    }
}
