use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Something a store keeps on hand and consumes while preparing products.
///
/// Ordering is stable (kind, then id) so callers that lock stock rows in
/// iteration order always lock them in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StockItem {
    Ingredient(Uuid),
    Provision(Uuid),
}

impl StockItem {
    pub fn id(&self) -> Uuid {
        match self {
            StockItem::Ingredient(id) | StockItem::Provision(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StockItem::Ingredient(_) => "ingredient",
            StockItem::Provision(_) => "provision",
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "ingredient" => Some(StockItem::Ingredient(id)),
            "provision" => Some(StockItem::Provision(id)),
            _ => None,
        }
    }
}

impl fmt::Display for StockItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// One line of a product-size or additive recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub item: StockItem,
    pub quantity: f64,
}

impl RecipeLine {
    pub fn new(item: StockItem, quantity: f64) -> Self {
        Self { item, quantity }
    }
}

/// Stock required to prepare a single suborder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryUsage {
    required: BTreeMap<StockItem, f64>,
}

impl InventoryUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size recipe scaled by the ordered quantity, plus each additive's recipe
    /// added once per additive line.
    pub fn for_suborder(size_recipe: &[RecipeLine], quantity: u32, additive_recipes: &[RecipeLine]) -> Self {
        let mut usage = Self::new();
        for line in size_recipe {
            usage.add(line.item, line.quantity * f64::from(quantity));
        }
        for line in additive_recipes {
            usage.add(line.item, line.quantity);
        }
        usage
    }

    pub fn add(&mut self, item: StockItem, quantity: f64) {
        if quantity <= 0.0 {
            return;
        }
        *self.required.entry(item).or_insert(0.0) += quantity;
    }

    pub fn get(&self, item: &StockItem) -> f64 {
        self.required.get(item).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StockItem, &f64)> {
        self.required.iter()
    }

    pub fn items(&self) -> impl Iterator<Item = StockItem> + '_ {
        self.required.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }
}
