use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::purchase_order_line;

/// Lifecycle states of a purchase order.
///
/// ORDERED → CONFIRMED → PARTIAL → RECEIVED is forward-only; CANCELLED is
/// reachable from ORDERED or CONFIRMED while nothing has been received.
/// RECEIVED and CANCELLED are terminal.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PurchaseOrderStatus {
    #[sea_orm(string_value = "ORDERED")]
    #[strum(serialize = "ORDERED")]
    Ordered,
    #[sea_orm(string_value = "CONFIRMED")]
    #[strum(serialize = "CONFIRMED")]
    Confirmed,
    #[sea_orm(string_value = "PARTIAL")]
    #[strum(serialize = "PARTIAL")]
    Partial,
    #[sea_orm(string_value = "RECEIVED")]
    #[strum(serialize = "RECEIVED")]
    Received,
    #[sea_orm(string_value = "CANCELLED")]
    #[strum(serialize = "CANCELLED")]
    Cancelled,
}

impl PurchaseOrderStatus {
    /// Whether an explicit transition from `self` to `to` is legal.
    ///
    /// PARTIAL and RECEIVED are normally reached through receiving, but
    /// manual jumps forward are allowed as a correction path. The zero
    /// quantity received guard on cancellation lives with the command that
    /// can see the lines.
    pub fn can_transition(self, to: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        match (self, to) {
            (Ordered, Confirmed) | (Ordered, Partial) | (Ordered, Received) => true,
            (Ordered, Cancelled) | (Confirmed, Cancelled) => true,
            (Confirmed, Partial) | (Confirmed, Received) => true,
            (Partial, Received) => true,
            _ => false,
        }
    }

    /// Derives the receipt status an order should carry from its lines.
    ///
    /// Returns `None` when no quantity has been received at all, in which
    /// case the stored status (ORDERED or CONFIRMED) is left alone. The
    /// stored column is only a cache of this function's result.
    pub fn recompute(lines: &[purchase_order_line::Model]) -> Option<PurchaseOrderStatus> {
        if lines.is_empty() || lines.iter().all(|l| l.quantity_received == 0) {
            return None;
        }
        if lines.iter().all(|l| l.quantity_received >= l.quantity_ordered) {
            Some(PurchaseOrderStatus::Received)
        } else {
            Some(PurchaseOrderStatus::Partial)
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub supplier_id: Uuid,
    pub created_by: Uuid,
    pub status: PurchaseOrderStatus,
    pub order_date: DateTime<Utc>,
    pub invoice_date: Option<Date>,
    pub due_date: Option<Date>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub voucher_type: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::entities::purchase_order_line::Entity")]
    PurchaseOrderLine,
}

impl Related<crate::entities::purchase_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Appends an entry to the order's audit trail without disturbing what
    /// is already there.
    pub fn appended_note(&self, entry: &str) -> String {
        match self.notes.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, entry),
            _ => entry.to_string(),
        }
    }
}
