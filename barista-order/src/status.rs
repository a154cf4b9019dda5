use barista_core::{Order, OrderStatus, Suborder, SuborderStatus};
use chrono::{DateTime, Utc};

/// Order status derived from its line items.
///
/// Any PREPARING line makes the order PREPARING; all COMPLETED makes it
/// COMPLETED (IN_DELIVERY when it ships); all PENDING keeps it PENDING; any
/// other mix is reported as PREPARING.
pub fn aggregate_order_status<I>(statuses: I, has_delivery: bool) -> OrderStatus
where
    I: IntoIterator<Item = SuborderStatus>,
{
    let mut total = 0usize;
    let mut completed = 0usize;
    let mut pending = 0usize;

    for status in statuses {
        total += 1;
        match status {
            SuborderStatus::Preparing => return OrderStatus::Preparing,
            SuborderStatus::Completed => completed += 1,
            SuborderStatus::Pending => pending += 1,
        }
    }

    if total == 0 || pending == total {
        OrderStatus::Pending
    } else if completed == total {
        if has_delivery {
            OrderStatus::InDelivery
        } else {
            OrderStatus::Completed
        }
    } else {
        OrderStatus::Preparing
    }
}

/// A status write the order needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderStatusChange {
    pub status: OrderStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

/// `None` when the stored status already matches, or when the order was
/// cancelled (which line items never override).
pub fn plan_order_status(order: &Order, suborders: &[Suborder], now: DateTime<Utc>) -> Option<OrderStatusChange> {
    if order.status == OrderStatus::Cancelled {
        return None;
    }

    let status = aggregate_order_status(suborders.iter().map(|s| s.status), order.has_delivery());
    if status == order.status {
        return None;
    }

    Some(OrderStatusChange {
        status,
        completed_at: status.is_fulfilled().then_some(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use barista_core::SuborderStatus::{Completed, Pending, Preparing};

    #[test]
    fn test_any_preparing_wins() {
        assert_eq!(aggregate_order_status([Completed, Preparing, Pending], false), OrderStatus::Preparing);
        assert_eq!(aggregate_order_status([Preparing], true), OrderStatus::Preparing);
    }

    #[test]
    fn test_all_completed() {
        assert_eq!(aggregate_order_status([Completed, Completed], false), OrderStatus::Completed);
        assert_eq!(aggregate_order_status([Completed, Completed], true), OrderStatus::InDelivery);
    }

    #[test]
    fn test_mixture_defaults_to_preparing() {
        assert_eq!(aggregate_order_status([Completed, Pending], false), OrderStatus::Preparing);
        assert_eq!(aggregate_order_status([Pending, Pending], false), OrderStatus::Pending);
    }

    fn order_with(statuses: &[SuborderStatus], status: OrderStatus) -> Order {
        let mut order = Order::new(Uuid::new_v4(), None);
        for s in statuses {
            let mut suborder = Suborder::new(Uuid::new_v4(), 1, 275);
            suborder.status = *s;
            order.add_suborder(suborder).unwrap();
        }
        order.status = status;
        order
    }

    #[test]
    fn test_plan_is_none_when_status_matches() {
        let order = order_with(&[Completed, Pending], OrderStatus::Preparing);
        assert_eq!(plan_order_status(&order, &order.suborders, Utc::now()), None);
    }

    #[test]
    fn test_plan_sets_completion_time() {
        let now = Utc::now();
        let order = order_with(&[Completed, Completed], OrderStatus::Preparing);
        let change = plan_order_status(&order, &order.suborders, now).unwrap();
        assert_eq!(change.status, OrderStatus::Completed);
        assert_eq!(change.completed_at, Some(now));
    }

    #[test]
    fn test_cancelled_order_is_never_recomputed() {
        let order = order_with(&[Completed, Completed], OrderStatus::Cancelled);
        assert_eq!(plan_order_status(&order, &order.suborders, Utc::now()), None);
    }
}
