//! End-to-end tests for the purchase order lifecycle: creation with
//! computed totals, date-scoped numbering, duplication, deletion guards and
//! explicit status transitions.

mod common;

use chrono::Utc;
use common::TestApp;
use procurement_core::{
    commands::purchaseorders::{
        DeletePurchaseOrderCommand, DuplicatePurchaseOrderCommand, ReceiveMerchandiseCommand,
        ReceivedLine, UpdatePoStatusCommand,
    },
    entities::purchase_order::PurchaseOrderStatus,
    errors::ServiceError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn received(product_id: Uuid, quantity: i32) -> ReceivedLine {
    ReceivedLine {
        product_id,
        quantity,
        unit_price: None,
        batch_number: None,
        expiry_date: None,
    }
}

#[tokio::test]
async fn create_computes_totals_and_starts_ordered() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET", dec!(2.50)).await;
    let gadget = app.seed_product("GADGET", dec!(4.00)).await;

    let mut cmd = TestApp::create_command(vec![
        TestApp::line(widget.id, 10, dec!(2.50)),
        TestApp::line(gadget.id, 3, dec!(4.00)),
    ]);
    cmd.discount_amount = Some(dec!(5.00));
    cmd.tax_amount = Some(dec!(7.77));

    let result = app
        .service
        .create_purchase_order(cmd)
        .await
        .expect("create should succeed");

    assert_eq!(result.subtotal, dec!(37.00));
    assert_eq!(result.total_amount, dec!(39.77));
    assert_eq!(
        result.total_amount,
        result.subtotal - result.discount_amount + result.tax_amount
    );
    assert_eq!(result.status, "ORDERED");

    let order = app
        .service
        .get_purchase_order(result.id)
        .await
        .unwrap()
        .expect("order should be persisted");
    assert_eq!(order.status, PurchaseOrderStatus::Ordered);
    assert_eq!(order.total_amount, dec!(39.77));

    let lines = app.service.get_order_lines(result.id).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.quantity_received == 0));
    let widget_line = lines.iter().find(|l| l.product_id == widget.id).unwrap();
    assert_eq!(widget_line.line_subtotal, dec!(25.00));
}

#[tokio::test]
async fn same_day_orders_get_sequential_numbers() {
    let app = TestApp::new().await;
    let product = app.seed_product("SEQ-SKU", dec!(1.00)).await;

    let first = app
        .service
        .create_purchase_order(TestApp::create_command(vec![TestApp::line(
            product.id,
            1,
            dec!(1.00),
        )]))
        .await
        .unwrap();
    let second = app
        .service
        .create_purchase_order(TestApp::create_command(vec![TestApp::line(
            product.id,
            2,
            dec!(1.00),
        )]))
        .await
        .unwrap();

    let prefix = format!("ORD{}", Utc::now().format("%Y%m%d"));
    assert!(first.order_number.starts_with(&prefix));
    assert!(second.order_number.starts_with(&prefix));
    assert_eq!(first.order_number, format!("{}0001", prefix));
    assert_eq!(second.order_number, format!("{}0002", prefix));
}

#[tokio::test]
async fn create_rejects_unknown_product_atomically() {
    let app = TestApp::new().await;
    let known = app.seed_product("KNOWN", dec!(3.00)).await;

    let cmd = TestApp::create_command(vec![
        TestApp::line(known.id, 5, dec!(3.00)),
        TestApp::line(Uuid::new_v4(), 2, dec!(1.00)),
    ]);
    let supplier_id = cmd.supplier_id;

    let err = app.service.create_purchase_order(cmd).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    // The whole transaction rolled back; not even the header survives.
    let orders = app
        .service
        .get_purchase_orders_by_supplier(supplier_id)
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn create_rejects_empty_line_list() {
    let app = TestApp::new().await;
    let err = app
        .service
        .create_purchase_order(TestApp::create_command(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn duplicate_copies_lines_but_not_receipts() {
    let app = TestApp::new().await;
    let widget = app.seed_product("DUP-A", dec!(2.00)).await;
    let gadget = app.seed_product("DUP-B", dec!(6.00)).await;

    let mut cmd = TestApp::create_command(vec![
        TestApp::line(widget.id, 10, dec!(2.00)),
        TestApp::line(gadget.id, 4, dec!(6.00)),
    ]);
    cmd.voucher_type = Some("INVOICE".to_string());
    let source = app.service.create_purchase_order(cmd).await.unwrap();

    // Partially receive the source before duplicating.
    app.service
        .receive_merchandise(ReceiveMerchandiseCommand {
            purchase_order_id: source.id,
            received_by: Uuid::new_v4(),
            lines: vec![received(widget.id, 5)],
        })
        .await
        .unwrap();

    let duplicate = app
        .service
        .duplicate_purchase_order(DuplicatePurchaseOrderCommand {
            source_order_id: source.id,
            requested_by: Uuid::new_v4(),
        })
        .await
        .unwrap();

    assert_ne!(duplicate.new_order_number, source.order_number);

    let copy = app
        .service
        .get_purchase_order(duplicate.new_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copy.status, PurchaseOrderStatus::Ordered);
    assert_eq!(copy.voucher_type.as_deref(), Some("INVOICE"));
    assert!(copy
        .notes
        .as_deref()
        .unwrap()
        .contains(&source.order_number));

    let source_lines = app.service.get_order_lines(source.id).await.unwrap();
    let copy_lines = app.service.get_order_lines(copy.id).await.unwrap();
    assert_eq!(copy_lines.len(), source_lines.len());
    for source_line in &source_lines {
        let copied = copy_lines
            .iter()
            .find(|l| l.product_id == source_line.product_id)
            .expect("duplicate should carry every product");
        assert_eq!(copied.quantity_ordered, source_line.quantity_ordered);
        assert_eq!(copied.unit_price, source_line.unit_price);
        assert_eq!(copied.quantity_received, 0);
    }
}

#[tokio::test]
async fn delete_removes_untouched_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("DEL-SKU", dec!(1.50)).await;
    let order = app
        .service
        .create_purchase_order(TestApp::create_command(vec![TestApp::line(
            product.id,
            3,
            dec!(1.50),
        )]))
        .await
        .unwrap();

    app.service
        .delete_purchase_order(DeletePurchaseOrderCommand {
            purchase_order_id: order.id,
        })
        .await
        .expect("delete should succeed");

    assert!(app
        .service
        .get_purchase_order(order.id)
        .await
        .unwrap()
        .is_none());
    assert!(app.service.get_order_lines(order.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_rejected_once_merchandise_arrived() {
    let app = TestApp::new().await;
    let product = app.seed_product("DEL-RCV", dec!(1.50)).await;
    let order = app
        .service
        .create_purchase_order(TestApp::create_command(vec![TestApp::line(
            product.id,
            3,
            dec!(1.50),
        )]))
        .await
        .unwrap();

    app.service
        .receive_merchandise(ReceiveMerchandiseCommand {
            purchase_order_id: order.id,
            received_by: Uuid::new_v4(),
            lines: vec![received(product.id, 1)],
        })
        .await
        .unwrap();

    let err = app
        .service
        .delete_purchase_order(DeletePurchaseOrderCommand {
            purchase_order_id: order.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    // Still there, untouched.
    assert!(app
        .service
        .get_purchase_order(order.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn explicit_transitions_follow_the_state_machine() {
    let app = TestApp::new().await;
    let product = app.seed_product("ST-SKU", dec!(9.99)).await;
    let order = app
        .service
        .create_purchase_order(TestApp::create_command(vec![TestApp::line(
            product.id,
            2,
            dec!(9.99),
        )]))
        .await
        .unwrap();
    let actor = Uuid::new_v4();

    // Forward is fine.
    let result = app
        .service
        .update_status(UpdatePoStatusCommand {
            purchase_order_id: order.id,
            new_status: PurchaseOrderStatus::Confirmed,
            changed_by: actor,
            reason: Some("supplier confirmed by phone".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(result.old_status, PurchaseOrderStatus::Ordered);
    assert_eq!(result.new_status, PurchaseOrderStatus::Confirmed);

    // No-op transition is an error.
    let err = app
        .service
        .update_status(UpdatePoStatusCommand {
            purchase_order_id: order.id,
            new_status: PurchaseOrderStatus::Confirmed,
            changed_by: actor,
            reason: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatus(_)));

    // Backwards is rejected.
    let err = app
        .service
        .update_status(UpdatePoStatusCommand {
            purchase_order_id: order.id,
            new_status: PurchaseOrderStatus::Ordered,
            changed_by: actor,
            reason: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatus(_)));

    // Cancellation of a clean order succeeds and appends to the trail.
    app.service
        .update_status(UpdatePoStatusCommand {
            purchase_order_id: order.id,
            new_status: PurchaseOrderStatus::Cancelled,
            changed_by: actor,
            reason: Some("budget cut".to_string()),
        })
        .await
        .unwrap();

    let cancelled = app
        .service
        .get_purchase_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, PurchaseOrderStatus::Cancelled);
    let notes = cancelled.notes.unwrap();
    assert!(notes.contains("ORDERED -> CONFIRMED"));
    assert!(notes.contains("supplier confirmed by phone"));
    assert!(notes.contains("CONFIRMED -> CANCELLED"));
    assert!(notes.contains("budget cut"));

    // Terminal: receiving against a cancelled order is refused outright.
    let err = app
        .service
        .receive_merchandise(ReceiveMerchandiseCommand {
            purchase_order_id: order.id,
            received_by: actor,
            lines: vec![received(product.id, 1)],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn cancellation_rejected_after_any_receipt() {
    let app = TestApp::new().await;
    let product = app.seed_product("CXL-SKU", dec!(5.00)).await;
    let order = app
        .service
        .create_purchase_order(TestApp::create_command(vec![TestApp::line(
            product.id,
            4,
            dec!(5.00),
        )]))
        .await
        .unwrap();

    app.service
        .receive_merchandise(ReceiveMerchandiseCommand {
            purchase_order_id: order.id,
            received_by: Uuid::new_v4(),
            lines: vec![received(product.id, 1)],
        })
        .await
        .unwrap();

    let err = app
        .service
        .update_status(UpdatePoStatusCommand {
            purchase_order_id: order.id,
            new_status: PurchaseOrderStatus::Cancelled,
            changed_by: Uuid::new_v4(),
            reason: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatus(_) | ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn receipt_progress_reports_aggregate_position() {
    let app = TestApp::new().await;
    let product = app.seed_product("PRG-SKU", dec!(2.00)).await;
    let order = app
        .service
        .create_purchase_order(TestApp::create_command(vec![TestApp::line(
            product.id,
            10,
            dec!(2.00),
        )]))
        .await
        .unwrap();

    let progress = app.service.get_receipt_progress(order.id).await.unwrap();
    assert_eq!(progress.state, "NOT_RECEIVED");
    assert_eq!(progress.total_ordered, 10);
    assert_eq!(progress.remaining, 10);

    app.service
        .receive_merchandise(ReceiveMerchandiseCommand {
            purchase_order_id: order.id,
            received_by: Uuid::new_v4(),
            lines: vec![received(product.id, 4)],
        })
        .await
        .unwrap();

    let progress = app.service.get_receipt_progress(order.id).await.unwrap();
    assert_eq!(progress.state, "PARTIALLY_RECEIVED");
    assert_eq!(progress.total_received, 4);
    assert_eq!(progress.remaining, 6);
}

#[tokio::test]
async fn decimal_money_survives_storage() {
    let app = TestApp::new().await;
    let product = app.seed_product("DEC-SKU", dec!(0.10)).await;
    let order = app
        .service
        .create_purchase_order(TestApp::create_command(vec![TestApp::line(
            product.id,
            3,
            dec!(0.10),
        )]))
        .await
        .unwrap();

    let stored = app
        .service
        .get_purchase_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.subtotal, dec!(0.30));
    assert_eq!(stored.discount_amount, Decimal::ZERO);
}
