use crate::usage::{InventoryUsage, RecipeLine, StockItem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Current stock of one item in one store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    pub item: StockItem,
    pub name: String,
    pub quantity: f64,
    pub low_stock_threshold: f64,
}

impl StockEntry {
    pub fn new(item: StockItem, name: impl Into<String>, quantity: f64, low_stock_threshold: f64) -> Self {
        Self {
            item,
            name: name.into(),
            quantity,
            low_stock_threshold,
        }
    }
}

/// Result of deducting one item: how much was taken and what is left.
#[derive(Debug, Clone, PartialEq)]
pub struct DeductedEntry {
    pub item: StockItem,
    pub name: String,
    pub deducted: f64,
    pub remaining: f64,
    pub low_stock_threshold: f64,
}

impl DeductedEntry {
    pub fn is_low(&self) -> bool {
        self.remaining <= self.low_stock_threshold
    }
}

pub type DeductedMap = BTreeMap<StockItem, DeductedEntry>;

#[derive(Debug, Clone, PartialEq)]
pub struct Shortage {
    pub item: StockItem,
    pub required: f64,
    pub available: f64,
}

impl fmt::Display for Shortage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (required {}, available {})", self.item, self.required, self.available)
    }
}

/// Checks `usage` against `entries` without touching them.
///
/// Every short item is reported, including items the store does not stock at
/// all. On success the returned map holds the post-deduction quantities.
pub fn plan_deduction(usage: &InventoryUsage, entries: &HashMap<StockItem, StockEntry>) -> Result<DeductedMap, InventoryError> {
    let mut shortages = Vec::new();
    let mut planned = DeductedMap::new();

    for (item, required) in usage.iter() {
        match entries.get(item) {
            Some(entry) if entry.quantity >= *required => {
                planned.insert(*item, DeductedEntry {
                    item: *item,
                    name: entry.name.clone(),
                    deducted: *required,
                    remaining: entry.quantity - required,
                    low_stock_threshold: entry.low_stock_threshold,
                });
            }
            Some(entry) => shortages.push(Shortage {
                item: *item,
                required: *required,
                available: entry.quantity,
            }),
            None => shortages.push(Shortage {
                item: *item,
                required: *required,
                available: 0.0,
            }),
        }
    }

    if !shortages.is_empty() {
        return Err(InventoryError::InsufficientStock { shortages });
    }

    Ok(planned)
}

/// Stock held by a single store.
#[derive(Debug, Clone, Default)]
pub struct StockLedger {
    entries: HashMap<StockItem, StockEntry>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: StockEntry) {
        self.entries.insert(entry.item, entry);
    }

    pub fn quantity(&self, item: &StockItem) -> f64 {
        self.entries.get(item).map(|e| e.quantity).unwrap_or(0.0)
    }

    /// All-or-nothing: when any item is short nothing is deducted.
    pub fn deduct(&mut self, usage: &InventoryUsage) -> Result<DeductedMap, InventoryError> {
        let planned = plan_deduction(usage, &self.entries)?;

        for deducted in planned.values() {
            if let Some(entry) = self.entries.get_mut(&deducted.item) {
                entry.quantity = deducted.remaining;
            }
        }

        Ok(planned)
    }

    /// A recipe can be produced when every line is covered by current stock.
    pub fn can_produce(&self, recipe: &[RecipeLine]) -> bool {
        recipe.iter().all(|line| self.quantity(&line.item) >= line.quantity)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Insufficient stock: {}", format_shortages(.shortages))]
    InsufficientStock { shortages: Vec<Shortage> },
}

fn format_shortages(shortages: &[Shortage]) -> String {
    shortages.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ledger_with(entries: &[(StockItem, f64, f64)]) -> StockLedger {
        let mut ledger = StockLedger::new();
        for (item, quantity, threshold) in entries {
            ledger.insert(StockEntry::new(*item, item.to_string(), *quantity, *threshold));
        }
        ledger
    }

    #[test]
    fn test_deduction_lifecycle() {
        let milk = StockItem::Ingredient(Uuid::new_v4());
        let cup = StockItem::Provision(Uuid::new_v4());
        let mut ledger = ledger_with(&[(milk, 1000.0, 200.0), (cup, 10.0, 2.0)]);

        let mut usage = InventoryUsage::new();
        usage.add(milk, 300.0);
        usage.add(cup, 1.0);

        let deducted = ledger.deduct(&usage).unwrap();
        assert_eq!(ledger.quantity(&milk), 700.0);
        assert_eq!(ledger.quantity(&cup), 9.0);
        assert_eq!(deducted[&milk].deducted, 300.0);
        assert_eq!(deducted[&milk].remaining, 700.0);
        assert!(!deducted[&milk].is_low());
    }

    #[test]
    fn test_shortage_leaves_every_entry_untouched() {
        let milk = StockItem::Ingredient(Uuid::new_v4());
        let beans = StockItem::Ingredient(Uuid::new_v4());
        let mut ledger = ledger_with(&[(milk, 1000.0, 0.0), (beans, 1.0, 0.0)]);

        let mut usage = InventoryUsage::new();
        usage.add(milk, 100.0);
        usage.add(beans, 2.0);

        let err = ledger.deduct(&usage).unwrap_err();
        let InventoryError::InsufficientStock { shortages } = err;
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].item, beans);
        assert_eq!(shortages[0].available, 1.0);

        assert_eq!(ledger.quantity(&milk), 1000.0);
        assert_eq!(ledger.quantity(&beans), 1.0);
    }

    #[test]
    fn test_unstocked_item_is_a_shortage() {
        let mut ledger = StockLedger::new();
        let mut usage = InventoryUsage::new();
        let lid = StockItem::Provision(Uuid::new_v4());
        usage.add(lid, 1.0);

        assert!(matches!(
            ledger.deduct(&usage),
            Err(InventoryError::InsufficientStock { ref shortages }) if shortages[0].item == lid
        ));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let syrup = StockItem::Ingredient(Uuid::new_v4());
        let mut ledger = ledger_with(&[(syrup, 30.0, 20.0)]);
        let mut usage = InventoryUsage::new();
        usage.add(syrup, 10.0);

        let deducted = ledger.deduct(&usage).unwrap();
        assert!(deducted[&syrup].is_low());
        assert_eq!(ledger.quantity(&syrup), 20.0);
    }

    #[test]
    fn test_can_produce() {
        let milk = StockItem::Ingredient(Uuid::new_v4());
        let ledger = ledger_with(&[(milk, 100.0, 0.0)]);
        assert!(ledger.can_produce(&[RecipeLine::new(milk, 100.0)]));
        assert!(!ledger.can_produce(&[RecipeLine::new(milk, 100.5)]));
    }
}
