use serde::{Deserialize, Serialize};

use crate::item::InventoryItem;

// ============================================================================
// Item Categories
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Scroll,
    Book,
    Artifact,
    Token,
    Currency,
    Misc,
}

impl Default for ItemCategory {
    fn default() -> Self {
        ItemCategory::Misc
    }
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Scroll => "scroll",
            ItemCategory::Book => "book",
            ItemCategory::Artifact => "artifact",
            ItemCategory::Token => "token",
            ItemCategory::Currency => "currency",
            ItemCategory::Misc => "misc",
        }
    }
}

// ============================================================================
// Raw Item Definition (direct from TOML)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawItemDefinition {
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub category: ItemCategory,
    pub max_stack: Option<i32>,
    /// Price in the currency of whichever catalog stocks the item
    pub base_price: Option<i64>,
    /// Merchant package; buff packages are cast on purchase
    pub package: Option<String>,
}

// ============================================================================
// Resolved Item Definition
// ============================================================================

#[derive(Debug, Clone)]
pub struct ItemDefinition {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub category: ItemCategory,
    pub max_stack: i32,
    pub base_price: i64,
    pub package: String,
}

impl ItemDefinition {
    pub fn from_raw(id: &str, raw: &RawItemDefinition) -> Self {
        Self {
            id: id.to_string(),
            display_name: raw.display_name.clone()
                .unwrap_or_else(|| id.to_string()),
            description: raw.description.clone()
                .unwrap_or_default(),
            category: raw.category,
            max_stack: raw.max_stack.unwrap_or(1),
            base_price: raw.base_price.unwrap_or(0),
            package: raw.package.clone().unwrap_or_default(),
        }
    }

    /// Create a fresh, inactive instance of this template
    pub fn instantiate(&self, count: i32) -> InventoryItem {
        InventoryItem::new(&self.id, &self.display_name, count.max(1))
    }

    pub fn is_stackable(&self) -> bool {
        self.max_stack > 1
    }

    /// Buff token packages are consumed as spells instead of entering the backpack
    pub fn is_buff_package(&self) -> bool {
        self.package.contains("BuffTokens")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_defaults() {
        let raw: RawItemDefinition = toml::from_str("category = \"book\"").unwrap();
        let def = ItemDefinition::from_raw("book_of_dreamsphere", &raw);
        assert_eq!(def.display_name, "book_of_dreamsphere");
        assert_eq!(def.category, ItemCategory::Book);
        assert_eq!(def.max_stack, 1);
        assert!(!def.is_buff_package());
    }

    #[test]
    fn test_buff_package_match() {
        let raw: RawItemDefinition =
            toml::from_str("category = \"token\"\npackage = \"BPBuffTokens\"").unwrap();
        let def = ItemDefinition::from_raw("BPHaste_Buff_Token", &raw);
        assert!(def.is_buff_package());

        let item = def.instantiate(3);
        assert_eq!(item.id_nb, "BPHaste_Buff_Token");
        assert_eq!(item.count, 3);
        assert!(!item.activated);
    }
}
