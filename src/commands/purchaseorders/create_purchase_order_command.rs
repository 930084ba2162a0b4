use crate::{
    commands::Command,
    db::DbPool,
    entities::{
        purchase_order::{self, PurchaseOrderStatus},
        purchase_order_line,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{catalog::CatalogService, order_numbers::OrderNumberGenerator},
};
use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, TransactionError, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref PO_CREATIONS: IntCounter = IntCounter::new(
        "purchase_order_creations_total",
        "Total number of purchase orders created"
    )
    .expect("metric can be created");
    static ref PO_CREATION_FAILURES: IntCounter = IntCounter::new(
        "purchase_order_creation_failures_total",
        "Total number of failed purchase order creations"
    )
    .expect("metric can be created");
}

/// How many order numbers to try before giving up on the per-day sequence.
/// The last attempt always uses the timestamp fallback form.
const MAX_NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderCommand {
    pub supplier_id: Uuid,
    pub created_by: Uuid,
    #[validate(length(min = 1, message = "At least one line item is required"))]
    pub lines: Vec<PurchaseOrderLineRequest>,
    pub order_date: Option<DateTime<Utc>>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Header-level discount; defaults to zero.
    pub discount_amount: Option<Decimal>,
    /// Header-level tax; defaults to zero.
    pub tax_amount: Option<Decimal>,
    pub voucher_type: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_pct: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_pct: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Line amounts after resolving explicit values against percentages.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineAmounts {
    pub discount_pct: Decimal,
    pub discount_amount: Decimal,
    pub tax_pct: Decimal,
    pub tax_amount: Decimal,
    pub subtotal: Decimal,
}

impl PurchaseOrderLineRequest {
    /// Resolves this line's money amounts. An explicit amount wins over its
    /// percentage; the percentage is applied to the gross (tax after
    /// discount) when no amount is given.
    pub(crate) fn amounts(&self) -> LineAmounts {
        let hundred = Decimal::ONE_HUNDRED;
        let gross = Decimal::from(self.quantity) * self.unit_price;
        let discount_pct = self.discount_pct.unwrap_or(Decimal::ZERO);
        let discount_amount = self
            .discount_amount
            .unwrap_or_else(|| (gross * discount_pct / hundred).round_dp(2));
        let tax_pct = self.tax_pct.unwrap_or(Decimal::ZERO);
        let tax_amount = self
            .tax_amount
            .unwrap_or_else(|| ((gross - discount_amount) * tax_pct / hundred).round_dp(2));
        LineAmounts {
            discount_pct,
            discount_amount,
            tax_pct,
            tax_amount,
            subtotal: gross - discount_amount + tax_amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePurchaseOrderResult {
    pub id: Uuid,
    pub order_number: String,
    pub supplier_id: Uuid,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl Command for CreatePurchaseOrderCommand {
    type Result = CreatePurchaseOrderResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate().map_err(|e| {
            PO_CREATION_FAILURES.inc();
            let msg = format!("Invalid input: {}", e);
            error!("{}", msg);
            ServiceError::ValidationError(msg)
        })?;
        self.validate_amounts().map_err(|e| {
            PO_CREATION_FAILURES.inc();
            e
        })?;

        let db = db_pool.as_ref();
        let generator = OrderNumberGenerator::new();

        let mut saved: Option<purchase_order::Model> = None;
        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let order_number = if attempt == MAX_NUMBER_ATTEMPTS {
                generator.fallback_number()
            } else {
                generator.generate(db).await
            };

            match self.insert_order(db, order_number.clone()).await {
                Ok(model) => {
                    saved = Some(model);
                    break;
                }
                Err(e) if e.is_unique_violation() && attempt < MAX_NUMBER_ATTEMPTS => {
                    warn!(
                        order_number = %order_number,
                        attempt,
                        "Order number collided with a concurrent creation, regenerating"
                    );
                }
                Err(e) => {
                    PO_CREATION_FAILURES.inc();
                    return Err(e);
                }
            }
        }

        let saved = saved.ok_or_else(|| {
            PO_CREATION_FAILURES.inc();
            ServiceError::InternalError("order number attempts exhausted".to_string())
        })?;

        self.log_and_trigger_event(&event_sender, &saved).await;
        PO_CREATIONS.inc();

        Ok(CreatePurchaseOrderResult {
            id: saved.id,
            order_number: saved.order_number,
            supplier_id: saved.supplier_id,
            status: saved.status.to_string(),
            subtotal: saved.subtotal,
            discount_amount: saved.discount_amount,
            tax_amount: saved.tax_amount,
            total_amount: saved.total_amount,
            created_at: saved.created_at,
        })
    }
}

impl CreatePurchaseOrderCommand {
    /// Money checks the validator derive cannot express for `Decimal`.
    fn validate_amounts(&self) -> Result<(), ServiceError> {
        if self.supplier_id.is_nil() {
            return Err(ServiceError::ValidationError(
                "Supplier is required".to_string(),
            ));
        }
        for amount in [self.discount_amount, self.tax_amount].into_iter().flatten() {
            if amount < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(
                    "Header discount and tax must not be negative".to_string(),
                ));
            }
        }
        for line in &self.lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "Unit price for product {} must not be negative",
                    line.product_id
                )));
            }
            for amount in [
                line.discount_pct,
                line.discount_amount,
                line.tax_pct,
                line.tax_amount,
            ]
            .into_iter()
            .flatten()
            {
                if amount < Decimal::ZERO {
                    return Err(ServiceError::InvalidInput(format!(
                        "Discount and tax for product {} must not be negative",
                        line.product_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Order subtotal over the gross line values.
    pub(crate) fn subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .map(|line| Decimal::from(line.quantity) * line.unit_price)
            .sum()
    }

    /// One atomic attempt: header plus every line, or nothing. A product
    /// that fails catalog resolution aborts the whole transaction; there is
    /// no partial-success concept at creation time.
    async fn insert_order(
        &self,
        db: &DbPool,
        order_number: String,
    ) -> Result<purchase_order::Model, ServiceError> {
        let subtotal = self.subtotal();
        let discount_amount = self.discount_amount.unwrap_or(Decimal::ZERO);
        let tax_amount = self.tax_amount.unwrap_or(Decimal::ZERO);
        let total_amount = subtotal - discount_amount + tax_amount;

        let supplier_id = self.supplier_id;
        let created_by = self.created_by;
        let order_date = self.order_date.unwrap_or_else(Utc::now);
        let invoice_date = self.invoice_date;
        let due_date = self.due_date;
        let voucher_type = self.voucher_type.clone();
        let notes = self.notes.clone();
        let lines = self.lines.clone();
        let catalog = CatalogService::new();

        db.transaction::<_, purchase_order::Model, ServiceError>(move |txn| {
            Box::pin(async move {
                let now = Utc::now();
                let new_po = purchase_order::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_number: Set(order_number.clone()),
                    supplier_id: Set(supplier_id),
                    created_by: Set(created_by),
                    status: Set(PurchaseOrderStatus::Ordered),
                    order_date: Set(order_date),
                    invoice_date: Set(invoice_date),
                    due_date: Set(due_date),
                    subtotal: Set(subtotal),
                    discount_amount: Set(discount_amount),
                    tax_amount: Set(tax_amount),
                    total_amount: Set(total_amount),
                    voucher_type: Set(voucher_type),
                    notes: Set(notes),
                    created_at: Set(now),
                    updated_at: Set(now),
                };

                let saved_po = new_po.insert(txn).await.map_err(|e| {
                    error!(
                        "Failed to create purchase order {} for supplier {}: {}",
                        order_number, supplier_id, e
                    );
                    ServiceError::DatabaseError(e)
                })?;

                for line in &lines {
                    let product = catalog
                        .get_product(txn, line.product_id)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Product {} not found in catalog",
                                line.product_id
                            ))
                        })?;
                    if !product.active {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Product {} is inactive and cannot be ordered",
                            product.sku
                        )));
                    }

                    let amounts = line.amounts();
                    let new_line = purchase_order_line::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        purchase_order_id: Set(saved_po.id),
                        product_id: Set(line.product_id),
                        quantity_ordered: Set(line.quantity),
                        quantity_received: Set(0),
                        unit_price: Set(line.unit_price),
                        discount_pct: Set(amounts.discount_pct),
                        discount_amount: Set(amounts.discount_amount),
                        tax_pct: Set(amounts.tax_pct),
                        tax_amount: Set(amounts.tax_amount),
                        line_subtotal: Set(amounts.subtotal),
                        batch_number: Set(line.batch_number.clone()),
                        expiry_date: Set(line.expiry_date),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    new_line.insert(txn).await.map_err(|e| {
                        error!(
                            "Failed to create line for order {} (product {}): {}",
                            order_number, line.product_id, e
                        );
                        ServiceError::DatabaseError(e)
                    })?;
                }

                Ok(saved_po)
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
    }

    async fn log_and_trigger_event(
        &self,
        event_sender: &EventSender,
        saved_po: &purchase_order::Model,
    ) {
        info!(
            purchase_order_id = %saved_po.id,
            order_number = %saved_po.order_number,
            supplier_id = %self.supplier_id,
            line_count = %self.lines.len(),
            total_amount = %saved_po.total_amount,
            "Purchase order created"
        );
        event_sender
            .send_or_log(Event::PurchaseOrderCreated(saved_po.id))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, unit_price: Decimal) -> PurchaseOrderLineRequest {
        PurchaseOrderLineRequest {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
            discount_pct: None,
            discount_amount: None,
            tax_pct: None,
            tax_amount: None,
            batch_number: None,
            expiry_date: None,
        }
    }

    fn command(lines: Vec<PurchaseOrderLineRequest>) -> CreatePurchaseOrderCommand {
        CreatePurchaseOrderCommand {
            supplier_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            lines,
            order_date: None,
            invoice_date: None,
            due_date: None,
            discount_amount: None,
            tax_amount: None,
            voucher_type: None,
            notes: None,
        }
    }

    #[test]
    fn subtotal_sums_gross_line_values() {
        let cmd = command(vec![line(10, dec!(2.50)), line(3, dec!(4.00))]);
        assert_eq!(cmd.subtotal(), dec!(37.00));
    }

    #[test]
    fn line_amounts_prefer_explicit_over_percentage() {
        let mut l = line(10, dec!(10.00));
        l.discount_pct = Some(dec!(10));
        l.discount_amount = Some(dec!(5.00));
        l.tax_pct = Some(dec!(20));
        let amounts = l.amounts();
        // Explicit discount wins; tax is derived from gross minus discount.
        assert_eq!(amounts.discount_amount, dec!(5.00));
        assert_eq!(amounts.tax_amount, dec!(19.00));
        assert_eq!(amounts.subtotal, dec!(114.00));
    }

    #[test]
    fn line_amounts_derive_from_percentages() {
        let mut l = line(4, dec!(25.00));
        l.discount_pct = Some(dec!(10));
        l.tax_pct = Some(dec!(21));
        let amounts = l.amounts();
        assert_eq!(amounts.discount_amount, dec!(10.00));
        assert_eq!(amounts.tax_amount, dec!(18.90));
        assert_eq!(amounts.subtotal, dec!(108.90));
    }

    #[test]
    fn empty_line_list_fails_validation() {
        let cmd = command(vec![]);
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn nil_supplier_rejected() {
        let mut cmd = command(vec![line(1, dec!(1.00))]);
        cmd.supplier_id = Uuid::nil();
        assert!(matches!(
            cmd.validate_amounts(),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn negative_unit_price_rejected() {
        let cmd = command(vec![line(1, dec!(-1.00))]);
        assert!(matches!(
            cmd.validate_amounts(),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
