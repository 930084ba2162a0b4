pub mod catalog;
pub mod order_numbers;
pub mod purchase_orders;
pub mod stock_ledger;

pub use catalog::CatalogService;
pub use order_numbers::OrderNumberGenerator;
pub use purchase_orders::PurchaseOrderService;
pub use stock_ledger::StockLedgerService;
