pub mod product;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod stock_movement;

pub use purchase_order::PurchaseOrderStatus;
pub use stock_movement::StockMovementType;
