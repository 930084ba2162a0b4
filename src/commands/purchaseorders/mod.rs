pub mod create_purchase_order_command;
pub mod delete_purchase_order_command;
pub mod duplicate_purchase_order_command;
pub mod receive_merchandise_command;
pub mod update_po_status_command;

pub use create_purchase_order_command::{
    CreatePurchaseOrderCommand, CreatePurchaseOrderResult, PurchaseOrderLineRequest,
};
pub use delete_purchase_order_command::{DeletePurchaseOrderCommand, DeletePurchaseOrderResult};
pub use duplicate_purchase_order_command::{
    DuplicatePurchaseOrderCommand, DuplicatePurchaseOrderResult,
};
pub use receive_merchandise_command::{
    ReceiveMerchandiseCommand, ReceiveMerchandiseResult, ReceivedLine, ReceivingIssue,
    ReceivingIssueKind,
};
pub use update_po_status_command::{UpdatePoStatusCommand, UpdatePoStatusResult};
