use crate::{
    commands::Command,
    db::DbPool,
    entities::{
        purchase_order::Entity as PurchaseOrderEntity,
        purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Permanently removes an order and its lines.
///
/// Refused once any quantity has been received: merchandise already in the
/// stock ledger must not lose its originating order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePurchaseOrderCommand {
    pub purchase_order_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletePurchaseOrderResult {
    pub purchase_order_id: Uuid,
    pub order_number: String,
}

#[async_trait::async_trait]
impl Command for DeletePurchaseOrderCommand {
    type Result = DeletePurchaseOrderResult;

    #[instrument(skip(self, db_pool, event_sender), fields(purchase_order_id = %self.purchase_order_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let db = db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = PurchaseOrderEntity::find_by_id(self.purchase_order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Purchase order {} not found",
                    self.purchase_order_id
                ))
            })?;

        let received: i32 = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order.id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .iter()
            .map(|l| l.quantity_received)
            .sum();
        if received > 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} has {} units received and cannot be deleted",
                order.order_number, received
            )));
        }

        PurchaseOrderLineEntity::delete_many()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order.id))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let order_number = order.order_number.clone();
        let order_id = order.id;
        order
            .delete(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            purchase_order_id = %order_id,
            order_number = %order_number,
            "Purchase order deleted"
        );
        event_sender
            .send_or_log(Event::PurchaseOrderDeleted(order_id))
            .await;

        Ok(DeletePurchaseOrderResult {
            purchase_order_id: order_id,
            order_number,
        })
    }
}
