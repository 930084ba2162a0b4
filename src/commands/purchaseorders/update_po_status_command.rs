use crate::{
    commands::Command,
    db::DbPool,
    entities::{
        purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus},
        purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Explicit status transition.
///
/// PARTIAL and RECEIVED are normally reached through receiving; this
/// command allows them anyway as a correction path, but never permits
/// moving backwards or out of a terminal state. Edge layers parse the
/// target from text via `PurchaseOrderStatus::from_str`, so an unknown
/// status name never reaches this command.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdatePoStatusCommand {
    pub purchase_order_id: Uuid,
    pub new_status: PurchaseOrderStatus,
    pub changed_by: Uuid,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatePoStatusResult {
    pub purchase_order_id: Uuid,
    pub old_status: PurchaseOrderStatus,
    pub new_status: PurchaseOrderStatus,
}

#[async_trait::async_trait]
impl Command for UpdatePoStatusCommand {
    type Result = UpdatePoStatusResult;

    #[instrument(skip(self, db_pool, event_sender), fields(purchase_order_id = %self.purchase_order_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

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

        let old_status = order.status;
        if self.new_status == old_status {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is already {}",
                order.order_number, old_status
            )));
        }
        if !old_status.can_transition(self.new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition order {} from {} to {}",
                order.order_number, old_status, self.new_status
            )));
        }

        if self.new_status == PurchaseOrderStatus::Cancelled {
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
                    "Order {} has {} units received and cannot be cancelled",
                    order.order_number, received
                )));
            }
        }

        let note_entry = match self.reason.as_deref() {
            Some(reason) => format!(
                "[{}] {} -> {} by {}: {}",
                Utc::now().to_rfc3339(),
                old_status,
                self.new_status,
                self.changed_by,
                reason
            ),
            None => format!(
                "[{}] {} -> {} by {}",
                Utc::now().to_rfc3339(),
                old_status,
                self.new_status,
                self.changed_by
            ),
        };
        let notes = order.appended_note(&note_entry);

        let mut active: purchase_order::ActiveModel = order.clone().into();
        active.status = Set(self.new_status);
        active.notes = Set(Some(notes));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await.map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            purchase_order_id = %order.id,
            order_number = %order.order_number,
            old_status = %old_status,
            new_status = %self.new_status,
            "Purchase order status changed"
        );
        event_sender
            .send_or_log(Event::PurchaseOrderStatusChanged {
                purchase_order_id: order.id,
                old_status: old_status.to_string(),
                new_status: self.new_status.to_string(),
            })
            .await;

        Ok(UpdatePoStatusResult {
            purchase_order_id: order.id,
            old_status,
            new_status: self.new_status,
        })
    }
}
