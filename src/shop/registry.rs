//! Shop Registry
//!
//! Loads and caches merchant catalogs from TOML files.

use super::definition::ShopDefinition;
use crate::data::ItemRegistry;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Registry for all shop definitions
pub struct ShopRegistry {
    shops: HashMap<String, ShopDefinition>,
}

impl ShopRegistry {
    /// Create a new empty shop registry
    pub fn new() -> Self {
        Self {
            shops: HashMap::new(),
        }
    }

    /// Load all shop definitions from a directory
    pub fn load_from_directory(&mut self, path: &Path) -> Result<(), String> {
        if !path.exists() {
            warn!("Shop directory does not exist: {:?}", path);
            return Ok(());
        }

        for file_path in crate::data::toml_files(path)? {
            let contents = fs::read_to_string(&file_path)
                .map_err(|e| format!("Failed to read {:?}: {}", file_path, e))?;

            let shop: ShopDefinition = toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse {:?}: {}", file_path, e))?;

            if self.shops.contains_key(&shop.id) {
                warn!("Duplicate shop ID '{}' in {:?}, overwriting", shop.id, file_path);
            }

            self.shops.insert(shop.id.clone(), shop);
        }

        info!("Loaded {} shop definitions", self.shops.len());
        Ok(())
    }

    /// Warn about stock that names no item template
    pub fn check_stock(&self, items: &ItemRegistry) -> usize {
        let mut missing = 0;
        for shop in self.shops.values() {
            for stock in &shop.stock {
                if !items.contains(&stock.item_id) {
                    warn!("Shop '{}' stocks unknown item '{}'", shop.id, stock.item_id);
                    missing += 1;
                }
            }
        }
        missing
    }

    /// Get a shop definition by ID
    pub fn get(&self, shop_id: &str) -> Option<&ShopDefinition> {
        self.shops.get(shop_id)
    }

    /// Get the number of shops in the registry
    pub fn len(&self) -> usize {
        self.shops.len()
    }
}

impl Default for ShopRegistry {
    fn default() -> Self {
        Self::new()
    }
}
