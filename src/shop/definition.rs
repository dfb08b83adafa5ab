//! Shop Definition Structures
//!
//! Merchant catalogs: what a merchant sells and what it charges in.

use serde::{Deserialize, Serialize};

use crate::data::{ItemDefinition, ItemRegistry};

/// What a catalog's prices are paid in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Money, counted in copper
    #[default]
    Gold,
    BountyPoints,
    /// A stack of currency items carried in the backpack
    Item(String),
}

impl Currency {
    /// Render an amount for merchant replies
    pub fn format(&self, amount: i64, items: &ItemRegistry) -> String {
        match self {
            Currency::Gold => format_money(amount),
            Currency::BountyPoints => format!("{} bounty points", amount),
            Currency::Item(id) => {
                let name = items.get(id).map(|d| d.display_name.as_str()).unwrap_or(id);
                format!("{} {}", amount, name)
            }
        }
    }

    pub fn label(&self, items: &ItemRegistry) -> String {
        match self {
            Currency::Gold => "money".to_string(),
            Currency::BountyPoints => "bounty points".to_string(),
            Currency::Item(id) => items
                .get(id)
                .map(|d| d.display_name.clone())
                .unwrap_or_else(|| id.clone()),
        }
    }
}

/// Copper as "Xg Ys Zc", leaving out empty denominations
pub fn format_money(copper: i64) -> String {
    let gold = copper / 10_000;
    let silver = (copper % 10_000) / 100;
    let copper = copper % 100;

    let mut parts = Vec::new();
    if gold > 0 {
        parts.push(format!("{}g", gold));
    }
    if silver > 0 {
        parts.push(format!("{}s", silver));
    }
    if copper > 0 || parts.is_empty() {
        parts.push(format!("{}c", copper));
    }
    parts.join(" ")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopDefinition {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub currency: Currency,
    /// Every item in the catalog is sold one at a time
    #[serde(default)]
    pub one_per_purchase: bool,
    #[serde(default)]
    pub stock: Vec<ShopStockItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopStockItem {
    pub item_id: String,
    /// Overrides the template's base price
    pub price: Option<i64>,
}

impl ShopStockItem {
    pub fn unit_price(&self, def: &ItemDefinition) -> i64 {
        self.price.unwrap_or(def.base_price).max(0)
    }
}

/// A catalog line as shown in the merchant window
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub item_id: String,
    pub name: String,
    pub price: i64,
    pub max_stack: i32,
}

impl ShopDefinition {
    pub fn get_stock(&self, item_id: &str) -> Option<&ShopStockItem> {
        self.stock.iter().find(|s| s.item_id == item_id)
    }

    /// Catalog lines for the window. Stock without a template is left out.
    pub fn catalog(&self, items: &ItemRegistry) -> Vec<CatalogEntry> {
        self.stock
            .iter()
            .filter_map(|stock| {
                let def = items.get(&stock.item_id)?;
                Some(CatalogEntry {
                    item_id: stock.item_id.clone(),
                    name: def.display_name.clone(),
                    price: stock.unit_price(def),
                    max_stack: def.max_stack,
                })
            })
            .collect()
    }
}
