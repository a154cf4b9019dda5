use barista_catalog::Shortage;
use barista_core::{OrderStatus, StoreError, SuborderStatus};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Suborder not found: {0}")]
    SuborderNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Suborder {suborder_id} cannot advance past {from}")]
    InvalidTransition {
        suborder_id: Uuid,
        from: SuborderStatus,
    },

    #[error("Order {order_id} is {status} and can no longer change")]
    OrderClosed {
        order_id: Uuid,
        status: OrderStatus,
    },

    #[error(
        "Insufficient stock to complete suborder {suborder_id} of order {order_id}: {}",
        .shortages.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    InsufficientStock {
        suborder_id: Uuid,
        order_id: Uuid,
        shortages: Vec<Shortage>,
    },

    #[error("Order {order_id} rejected: {reason}")]
    InvalidOrder { order_id: Uuid, reason: String },

    #[error("Store failure on {entity} {id}: {source}")]
    TransientStore {
        entity: &'static str,
        id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("Operation on {entity} {id} timed out after {after:?} and was rolled back")]
    Timeout {
        entity: &'static str,
        id: Uuid,
        after: Duration,
    },
}

impl LifecycleError {
    pub(crate) fn store(entity: &'static str, id: Uuid, source: StoreError) -> Self {
        LifecycleError::TransientStore { entity, id, source }
    }

    /// Only store failures are worth retrying as a whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::TransientStore { .. })
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
