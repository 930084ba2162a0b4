use crate::{
    commands::Command,
    db::DbPool,
    entities::{
        purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus},
        purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::CatalogService,
        stock_ledger::{EntryRecord, StockLedgerService, REASON_PURCHASE, REFERENCE_PURCHASE_ORDER},
    },
};
use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref RECEIPT_BATCHES: IntCounter = IntCounter::new(
        "merchandise_receipt_batches_total",
        "Total number of merchandise receiving batches processed"
    )
    .expect("metric can be created");
    static ref RECEIPT_LINE_ISSUES: IntCounter = IntCounter::new(
        "merchandise_receipt_line_issues_total",
        "Total number of receiving lines rejected by business rules"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveMerchandiseCommand {
    pub purchase_order_id: Uuid,
    pub received_by: Uuid,
    #[validate(length(min = 1, message = "At least one received line is required"))]
    pub lines: Vec<ReceivedLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub product_id: Uuid,
    /// Quantity arriving in this delivery, not the cumulative total.
    pub quantity: i32,
    /// Overrides the ordered unit price for the ledger entry and, when it
    /// differs, updates the product's standing purchase price.
    pub unit_price: Option<Decimal>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Business-rule rejection of a single line within an otherwise successful
/// batch. Soft by definition: the rest of the batch still commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceivingIssueKind {
    UnknownProduct,
    OverReceipt,
    StockLedgerFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivingIssue {
    pub product_id: Uuid,
    pub kind: ReceivingIssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveMerchandiseResult {
    pub purchase_order_id: Uuid,
    /// Order status after reconciliation.
    pub status: PurchaseOrderStatus,
    /// Lines whose receipt was applied in this batch.
    pub lines_applied: usize,
    /// Itemized soft errors; empty means the batch applied cleanly.
    pub issues: Vec<ReceivingIssue>,
}

impl ReceiveMerchandiseResult {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[async_trait::async_trait]
impl Command for ReceiveMerchandiseCommand {
    type Result = ReceiveMerchandiseResult;

    #[instrument(skip(self, db_pool, event_sender), fields(purchase_order_id = %self.purchase_order_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid input: {}", e)))?;
        for line in &self.lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Received quantity for product {} must be positive",
                    line.product_id
                )));
            }
        }

        let db = db_pool.as_ref();
        let ledger = StockLedgerService::new();
        let catalog = CatalogService::new();

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

        if order.status == PurchaseOrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(format!(
                "Purchase order {} is cancelled and cannot receive merchandise",
                order.order_number
            )));
        }

        // Serialization point: take the header row's write lock before
        // reading lines, so concurrent receipts against the same order
        // cannot both reconcile from the same stale quantities.
        let mut touch: purchase_order::ActiveModel = order.clone().into();
        touch.updated_at = Set(Utc::now());
        let order = touch.update(&txn).await.map_err(ServiceError::DatabaseError)?;

        let mut stored_lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order.id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let index_by_product: HashMap<Uuid, usize> = stored_lines
            .iter()
            .enumerate()
            .map(|(i, l)| (l.product_id, i))
            .collect();

        let mut issues = Vec::new();
        let mut applied: Vec<(Uuid, i32)> = Vec::new();

        for received in &self.lines {
            let Some(&idx) = index_by_product.get(&received.product_id) else {
                issues.push(ReceivingIssue {
                    product_id: received.product_id,
                    kind: ReceivingIssueKind::UnknownProduct,
                    message: format!(
                        "Product {} is not part of order {}",
                        received.product_id, order.order_number
                    ),
                });
                continue;
            };
            let stored = &stored_lines[idx];

            let new_total = stored.quantity_received + received.quantity;
            if new_total > stored.quantity_ordered {
                issues.push(ReceivingIssue {
                    product_id: received.product_id,
                    kind: ReceivingIssueKind::OverReceipt,
                    message: format!(
                        "Cannot receive more than ordered. Ordered: {}, already received: {}, trying to receive: {}",
                        stored.quantity_ordered, stored.quantity_received, received.quantity
                    ),
                });
                continue;
            }

            let unit_price = received.unit_price.unwrap_or(stored.unit_price);

            // Ledger first: a line only advances once its inventory entry
            // is in. A ledger failure skips the line, not the batch.
            let entry = ledger
                .record_entry(
                    &txn,
                    EntryRecord {
                        product_id: received.product_id,
                        quantity: received.quantity,
                        unit_price,
                        reason: REASON_PURCHASE.to_string(),
                        reference_id: Some(order.id),
                        reference_type: Some(REFERENCE_PURCHASE_ORDER.to_string()),
                        batch_number: received.batch_number.clone(),
                        expiry_date: received.expiry_date,
                    },
                )
                .await;
            if let Err(e) = entry {
                warn!(
                    product_id = %received.product_id,
                    "Stock ledger rejected entry, skipping line: {}", e
                );
                issues.push(ReceivingIssue {
                    product_id: received.product_id,
                    kind: ReceivingIssueKind::StockLedgerFailure,
                    message: format!("Stock ledger entry failed: {}", e),
                });
                continue;
            }

            let mut active: purchase_order_line::ActiveModel = stored.clone().into();
            active.quantity_received = Set(new_total);
            if received.batch_number.is_some() {
                active.batch_number = Set(received.batch_number.clone());
            }
            if received.expiry_date.is_some() {
                active.expiry_date = Set(received.expiry_date);
            }
            active.updated_at = Set(Utc::now());
            let updated = active.update(&txn).await.map_err(ServiceError::DatabaseError)?;
            stored_lines[idx] = updated;

            // Standing price follows the latest receipt. Best effort only.
            if let Some(override_price) = received.unit_price {
                if override_price != stored_lines[idx].unit_price {
                    if let Err(e) = catalog
                        .set_purchase_price(&txn, received.product_id, override_price)
                        .await
                    {
                        warn!(
                            product_id = %received.product_id,
                            "Purchase price update failed: {}", e
                        );
                    }
                }
            }

            applied.push((received.product_id, received.quantity));
        }

        // Status is derived from line state, never incremented in place.
        let old_status = order.status;
        let new_status = PurchaseOrderStatus::recompute(&stored_lines).unwrap_or(old_status);
        if new_status != old_status {
            let mut header: purchase_order::ActiveModel = order.clone().into();
            header.status = Set(new_status);
            header.updated_at = Set(Utc::now());
            header.update(&txn).await.map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        RECEIPT_BATCHES.inc();
        RECEIPT_LINE_ISSUES.inc_by(issues.len() as u64);

        for (product_id, quantity) in &applied {
            event_sender
                .send_or_log(Event::MerchandiseReceived {
                    purchase_order_id: order.id,
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .await;
        }
        if new_status != old_status {
            event_sender
                .send_or_log(Event::PurchaseOrderStatusChanged {
                    purchase_order_id: order.id,
                    old_status: old_status.to_string(),
                    new_status: new_status.to_string(),
                })
                .await;
        }

        info!(
            purchase_order_id = %order.id,
            order_number = %order.order_number,
            lines_applied = applied.len(),
            issues = issues.len(),
            status = %new_status,
            "Merchandise receipt reconciled"
        );

        Ok(ReceiveMerchandiseResult {
            purchase_order_id: order.id,
            status: new_status,
            lines_applied: applied.len(),
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_fails_validation() {
        let cmd = ReceiveMerchandiseCommand {
            purchase_order_id: Uuid::new_v4(),
            received_by: Uuid::new_v4(),
            lines: vec![],
        };
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn issues_serialize_for_api_consumers() {
        let issue = ReceivingIssue {
            product_id: Uuid::new_v4(),
            kind: ReceivingIssueKind::OverReceipt,
            message: "Cannot receive more than ordered".to_string(),
        };
        let json = serde_json::to_string(&issue).expect("issue should serialize");
        assert!(json.contains("OverReceipt"));
    }

    #[test]
    fn clean_result_has_no_issues() {
        let result = ReceiveMerchandiseResult {
            purchase_order_id: Uuid::new_v4(),
            status: PurchaseOrderStatus::Partial,
            lines_applied: 2,
            issues: vec![],
        };
        assert!(result.is_clean());
    }
}
