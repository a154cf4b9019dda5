pub mod models;
pub mod repository;
pub mod notify;
pub mod memory;

pub use models::{Order, OrderStatus, PriceOverflow, Suborder, SuborderAdditive, SuborderStatus};
pub use repository::{InventoryScope, OrderScope, OrderStore, StoreError, StoreResult, StoreScope};
pub use notify::{LowStockAlert, LowStockNotifier, NotifyError};
pub use memory::MemoryOrderStore;
