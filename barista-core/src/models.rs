use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Line-item status. Moves strictly forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuborderStatus {
    Pending,
    Preparing,
    Completed,
}

impl SuborderStatus {
    /// The only status this one may advance to; `None` for the terminal state.
    pub fn next(self) -> Option<Self> {
        match self {
            SuborderStatus::Pending => Some(SuborderStatus::Preparing),
            SuborderStatus::Preparing => Some(SuborderStatus::Completed),
            SuborderStatus::Completed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuborderStatus::Pending => "PENDING",
            SuborderStatus::Preparing => "PREPARING",
            SuborderStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for SuborderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuborderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SuborderStatus::Pending),
            "PREPARING" => Ok(SuborderStatus::Preparing),
            "COMPLETED" => Ok(SuborderStatus::Completed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Aggregate order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Completed,
    InDelivery,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::InDelivery => "IN_DELIVERY",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Every suborder is done (picked up or handed to delivery).
    pub fn is_fulfilled(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::InDelivery)
    }

    /// Still shown on the store's live board.
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Preparing)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PREPARING" => Ok(OrderStatus::Preparing),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "IN_DELIVERY" => Ok(OrderStatus::InDelivery),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status: {0}")]
pub struct ParseStatusError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Order total exceeds the largest representable amount")]
pub struct PriceOverflow;

/// A customer order placed at one store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub store_id: Uuid,
    pub delivery_address_id: Option<Uuid>,
    pub status: OrderStatus,
    pub total_price_cents: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub suborders: Vec<Suborder>,
}

impl Order {
    pub fn new(store_id: Uuid, delivery_address_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            delivery_address_id,
            status: OrderStatus::Pending,
            total_price_cents: 0,
            completed_at: None,
            created_at: Utc::now(),
            suborders: Vec::new(),
        }
    }

    /// Adds a line item, re-parenting it onto this order. The order is left
    /// untouched when the running total would overflow.
    pub fn add_suborder(&mut self, mut suborder: Suborder) -> Result<(), PriceOverflow> {
        let line = suborder.line_total_cents()?;
        self.total_price_cents = self.total_price_cents.checked_add(line).ok_or(PriceOverflow)?;
        suborder.order_id = self.id;
        self.suborders.push(suborder);
        Ok(())
    }

    pub fn calculate_total(&self) -> Result<i64, PriceOverflow> {
        self.suborders.iter().try_fold(0i64, |total, suborder| {
            total.checked_add(suborder.line_total_cents()?).ok_or(PriceOverflow)
        })
    }

    pub fn has_delivery(&self) -> bool {
        self.delivery_address_id.is_some()
    }
}

/// One line item: a product size, its quantity and its additives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suborder {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_size_id: Uuid,
    pub quantity: u32,
    pub price_cents: i64,
    pub status: SuborderStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub additives: Vec<SuborderAdditive>,
    pub created_at: DateTime<Utc>,
}

impl Suborder {
    pub fn new(product_size_id: Uuid, quantity: u32, price_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: Uuid::nil(),
            product_size_id,
            quantity,
            price_cents,
            status: SuborderStatus::Pending,
            completed_at: None,
            additives: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_additive(mut self, additive_id: Uuid, name: impl Into<String>, price_cents: i64) -> Self {
        self.additives.push(SuborderAdditive {
            id: Uuid::new_v4(),
            additive_id,
            name: name.into(),
            price_cents,
        });
        self
    }

    /// Size price times quantity plus every additive.
    pub fn line_total_cents(&self) -> Result<i64, PriceOverflow> {
        let base = self.price_cents.checked_mul(i64::from(self.quantity)).ok_or(PriceOverflow)?;
        self.additives
            .iter()
            .try_fold(base, |total, a| total.checked_add(a.price_cents).ok_or(PriceOverflow))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuborderAdditive {
    pub id: Uuid,
    pub additive_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suborder_path_is_linear() {
        let mut status = SuborderStatus::Pending;
        let mut path = vec![status];
        while let Some(next) = status.next() {
            status = next;
            path.push(status);
        }
        assert_eq!(path, vec![SuborderStatus::Pending, SuborderStatus::Preparing, SuborderStatus::Completed]);
        assert!(SuborderStatus::Completed.is_terminal());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [OrderStatus::Pending, OrderStatus::Preparing, OrderStatus::Completed, OrderStatus::InDelivery, OrderStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!(serde_json::to_string(&OrderStatus::InDelivery).unwrap(), "\"IN_DELIVERY\"");
        assert!("SHIPPED".parse::<SuborderStatus>().is_err());
    }

    #[test]
    fn test_order_total_includes_additives() {
        let mut order = Order::new(Uuid::new_v4(), None);
        order.add_suborder(Suborder::new(Uuid::new_v4(), 1, 275)).unwrap();
        order
            .add_suborder(Suborder::new(Uuid::new_v4(), 1, 275).with_additive(Uuid::new_v4(), "Oat milk", 55))
            .unwrap();

        assert_eq!(order.total_price_cents, 605);
        assert_eq!(order.calculate_total(), Ok(605));
        assert!(order.suborders.iter().all(|s| s.order_id == order.id));
    }

    #[test]
    fn test_oversized_lines_are_rejected() {
        let mut order = Order::new(Uuid::new_v4(), None);
        assert_eq!(order.add_suborder(Suborder::new(Uuid::new_v4(), 3, i64::MAX / 2)), Err(PriceOverflow));
        assert!(order.suborders.is_empty());
        assert_eq!(order.total_price_cents, 0);

        order.add_suborder(Suborder::new(Uuid::new_v4(), 1, i64::MAX - 10)).unwrap();
        let extra = Suborder::new(Uuid::new_v4(), 1, 5).with_additive(Uuid::new_v4(), "Extra shot", 60);
        assert_eq!(order.add_suborder(extra), Err(PriceOverflow));
        assert_eq!(order.total_price_cents, i64::MAX - 10);
        assert_eq!(order.calculate_total(), Ok(i64::MAX - 10));
    }
}
