use crate::{
    commands::purchaseorders::{
        CreatePurchaseOrderCommand, CreatePurchaseOrderResult, DeletePurchaseOrderCommand,
        DeletePurchaseOrderResult, DuplicatePurchaseOrderCommand, DuplicatePurchaseOrderResult,
        ReceiveMerchandiseCommand, ReceiveMerchandiseResult, UpdatePoStatusCommand,
        UpdatePoStatusResult,
    },
    commands::Command,
    db::DbPool,
    entities::{
        purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus},
        purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
    },
    errors::ServiceError,
    events::EventSender,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use slog::Logger;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Aggregate receiving position of one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptProgress {
    pub purchase_order_id: Uuid,
    pub total_ordered: i32,
    pub total_received: i32,
    pub remaining: i32,
    pub state: String,
}

/// Service owning the purchase order lifecycle: creation, merchandise
/// receiving, status transitions, duplication and deletion.
///
/// The logger is injected once at service start; the service holds no other
/// state beyond its database pool and event channel.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    logger: Logger,
}

impl PurchaseOrderService {
    /// Creates a new purchase order service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, logger: Logger) -> Self {
        Self {
            db_pool,
            event_sender,
            logger,
        }
    }

    /// Creates a new purchase order with its lines as one atomic unit.
    #[instrument(skip(self, command))]
    pub async fn create_purchase_order(
        &self,
        command: CreatePurchaseOrderCommand,
    ) -> Result<CreatePurchaseOrderResult, ServiceError> {
        let result = command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await?;
        slog::info!(self.logger, "purchase order created";
            "order_number" => &result.order_number,
            "supplier_id" => %result.supplier_id
        );
        Ok(result)
    }

    /// Reconciles a batch of received merchandise against an order.
    #[instrument(skip(self, command))]
    pub async fn receive_merchandise(
        &self,
        command: ReceiveMerchandiseCommand,
    ) -> Result<ReceiveMerchandiseResult, ServiceError> {
        let result = command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await?;
        slog::info!(self.logger, "merchandise receipt reconciled";
            "purchase_order_id" => %result.purchase_order_id,
            "lines_applied" => result.lines_applied,
            "issues" => result.issues.len()
        );
        Ok(result)
    }

    /// Applies an explicit status transition.
    #[instrument(skip(self, command))]
    pub async fn update_status(
        &self,
        command: UpdatePoStatusCommand,
    ) -> Result<UpdatePoStatusResult, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Copies an order into a brand-new one via the create flow.
    #[instrument(skip(self, command))]
    pub async fn duplicate_purchase_order(
        &self,
        command: DuplicatePurchaseOrderCommand,
    ) -> Result<DuplicatePurchaseOrderResult, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Permanently removes an order that has received nothing.
    #[instrument(skip(self, command))]
    pub async fn delete_purchase_order(
        &self,
        command: DeletePurchaseOrderCommand,
    ) -> Result<DeletePurchaseOrderResult, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Gets a purchase order by ID
    #[instrument(skip(self))]
    pub async fn get_purchase_order(
        &self,
        po_id: Uuid,
    ) -> Result<Option<purchase_order::Model>, ServiceError> {
        let db = &*self.db_pool;
        PurchaseOrderEntity::find_by_id(po_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Gets the lines of a purchase order.
    #[instrument(skip(self))]
    pub async fn get_order_lines(
        &self,
        po_id: Uuid,
    ) -> Result<Vec<purchase_order_line::Model>, ServiceError> {
        let db = &*self.db_pool;
        PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(po_id))
            .order_by_asc(purchase_order_line::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Gets purchase orders for a supplier
    #[instrument(skip(self))]
    pub async fn get_purchase_orders_by_supplier(
        &self,
        supplier_id: Uuid,
    ) -> Result<Vec<purchase_order::Model>, ServiceError> {
        let db = &*self.db_pool;
        PurchaseOrderEntity::find()
            .filter(purchase_order::Column::SupplierId.eq(supplier_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Gets purchase orders by status
    #[instrument(skip(self))]
    pub async fn get_purchase_orders_by_status(
        &self,
        status: PurchaseOrderStatus,
    ) -> Result<Vec<purchase_order::Model>, ServiceError> {
        let db = &*self.db_pool;
        PurchaseOrderEntity::find()
            .filter(purchase_order::Column::Status.eq(status))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Aggregate ordered/received totals for an order.
    #[instrument(skip(self))]
    pub async fn get_receipt_progress(
        &self,
        po_id: Uuid,
    ) -> Result<ReceiptProgress, ServiceError> {
        let lines = self.get_order_lines(po_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "Purchase order {} has no lines",
                po_id
            )));
        }

        let total_ordered: i32 = lines.iter().map(|l| l.quantity_ordered).sum();
        let total_received: i32 = lines.iter().map(|l| l.quantity_received).sum();

        let state = if total_received == 0 {
            "NOT_RECEIVED"
        } else if total_received < total_ordered {
            "PARTIALLY_RECEIVED"
        } else {
            "FULLY_RECEIVED"
        };

        Ok(ReceiptProgress {
            purchase_order_id: po_id,
            total_ordered,
            total_received,
            remaining: total_ordered - total_received,
            state: state.to_string(),
        })
    }
}
