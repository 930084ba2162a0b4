use chrono::{NaiveDate, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use tracing::{instrument, warn};

use crate::entities::purchase_order::{self, Entity as PurchaseOrderEntity};

const ORDER_NUMBER_PREFIX: &str = "ORD";
const SEQUENCE_WIDTH: usize = 4;

/// Produces human-readable, date-scoped purchase order numbers of the form
/// `ORD<YYYYMMDD><NNNN>`, where the 4-digit sequence restarts each calendar
/// day.
///
/// The scan-max-increment scheme can race between two concurrent creators;
/// the unique index on `order_number` plus the caller's bounded retry close
/// that window.
#[derive(Debug, Clone, Default)]
pub struct OrderNumberGenerator;

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Next order number for today.
    pub async fn generate<C: ConnectionTrait>(&self, db: &C) -> String {
        self.generate_for_date(db, Utc::now().date_naive()).await
    }

    /// Next order number for the given calendar day.
    ///
    /// A failed lookup never fails order creation: it degrades to the
    /// coarser timestamp form, which stays unique at second granularity.
    #[instrument(skip(self, db))]
    pub async fn generate_for_date<C: ConnectionTrait>(&self, db: &C, date: NaiveDate) -> String {
        let prefix = format!("{}{}", ORDER_NUMBER_PREFIX, date.format("%Y%m%d"));

        let existing: Result<Vec<String>, _> = PurchaseOrderEntity::find()
            .select_only()
            .column(purchase_order::Column::OrderNumber)
            .filter(purchase_order::Column::OrderNumber.starts_with(prefix.as_str()))
            .into_tuple()
            .all(db)
            .await;

        match existing {
            Ok(numbers) => {
                let max_seq = numbers
                    .iter()
                    .filter_map(|n| Self::parse_sequence(n, &prefix))
                    .max()
                    .unwrap_or(0);
                format!("{}{:0width$}", prefix, max_seq + 1, width = SEQUENCE_WIDTH)
            }
            Err(e) => {
                warn!(
                    "Order number lookup failed, falling back to timestamp numbering: {}",
                    e
                );
                self.fallback_number()
            }
        }
    }

    /// Timestamp-form number used when the per-day sequence cannot be
    /// determined or keeps colliding.
    pub fn fallback_number(&self) -> String {
        format!(
            "{}{}",
            ORDER_NUMBER_PREFIX,
            Utc::now().format("%Y%m%d%H%M%S")
        )
    }

    /// Numeric suffix of an order number under the given date prefix.
    /// Numbers that do not parse (for example timestamp fallbacks from a
    /// previous outage) are skipped rather than poisoning the sequence.
    fn parse_sequence(order_number: &str, prefix: &str) -> Option<u32> {
        let suffix = order_number.strip_prefix(prefix)?;
        if suffix.len() != SEQUENCE_WIDTH {
            return None;
        }
        suffix.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sequence_accepts_well_formed_suffixes() {
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ORD202401010007", "ORD20240101"),
            Some(7)
        );
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ORD202401019999", "ORD20240101"),
            Some(9999)
        );
    }

    #[test]
    fn parse_sequence_skips_foreign_shapes() {
        // Wrong day.
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ORD202401020001", "ORD20240101"),
            None
        );
        // Timestamp fallback is longer than the 4-digit sequence.
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ORD20240101123059", "ORD20240101"),
            None
        );
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ORD20240101ABCD", "ORD20240101"),
            None
        );
    }

    #[test]
    fn fallback_number_has_timestamp_shape() {
        let n = OrderNumberGenerator::new().fallback_number();
        assert!(n.starts_with("ORD"));
        assert_eq!(n.len(), "ORD".len() + 14);
        assert!(n["ORD".len()..].chars().all(|c| c.is_ascii_digit()));
    }
}
