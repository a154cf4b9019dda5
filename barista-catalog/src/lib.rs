pub mod usage;
pub mod inventory;

pub use usage::{InventoryUsage, RecipeLine, StockItem};
pub use inventory::{plan_deduction, DeductedEntry, DeductedMap, InventoryError, Shortage, StockEntry, StockLedger};
