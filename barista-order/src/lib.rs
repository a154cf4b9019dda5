pub mod status;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod low_stock;

pub use status::{aggregate_order_status, plan_order_status, OrderStatusChange};
pub use error::{LifecycleError, LifecycleResult};
pub use lifecycle::{AdvanceOutcome, LifecycleManager};
pub use notifier::OrderNotifier;
pub use low_stock::LowStockDispatcher;
