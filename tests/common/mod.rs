use std::sync::Arc;

use chrono::Utc;
use procurement_core::{
    commands::purchaseorders::{CreatePurchaseOrderCommand, PurchaseOrderLineRequest},
    db::{self, DbConfig, DbPool},
    entities::product,
    events::{self, EventSender},
    services::purchase_orders::PurchaseOrderService,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use uuid::Uuid;

/// Helper harness backed by an in-memory SQLite database.
///
/// A single pooled connection keeps the in-memory database alive for the
/// duration of the test.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub service: PurchaseOrderService,
    #[allow(dead_code)]
    pub event_sender: Arc<EventSender>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, mut rx) = events::channel(64);
        let event_task = tokio::spawn(async move { while rx.recv().await.is_some() {} });

        let db = Arc::new(pool);
        let event_sender = Arc::new(event_sender);
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let service = PurchaseOrderService::new(db.clone(), event_sender.clone(), logger);

        Self {
            db,
            service,
            event_sender,
            _event_task: event_task,
        }
    }

    /// Inserts a catalog product and returns its model.
    pub async fn seed_product(&self, sku: &str, purchase_price: Decimal) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Product {}", sku)),
            purchase_price: Set(purchase_price),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product")
    }

    /// A plain line request with no discounts or taxes.
    pub fn line(product_id: Uuid, quantity: i32, unit_price: Decimal) -> PurchaseOrderLineRequest {
        PurchaseOrderLineRequest {
            product_id,
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

    /// A minimal create command around the given lines.
    pub fn create_command(lines: Vec<PurchaseOrderLineRequest>) -> CreatePurchaseOrderCommand {
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
}
