use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use super::item_def::{ItemDefinition, RawItemDefinition};

/// Registry of item templates, keyed by their exact `Id_nb`
pub struct ItemRegistry {
    items: HashMap<String, ItemDefinition>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Load all item definitions from a directory
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<(), String> {
        let items_dir = data_dir.join("items");

        if !items_dir.exists() {
            warn!("Items directory does not exist: {:?}", items_dir);
            return Ok(());
        }

        for path in super::toml_files(&items_dir)? {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

            // Each file is a table of id -> definition
            let table: HashMap<String, RawItemDefinition> = toml::from_str(&content)
                .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

            debug!("Read {} item templates from {:?}", table.len(), path);
            for (id, raw) in table {
                if self.items.contains_key(&id) {
                    warn!("Duplicate item ID '{}' in {:?}, overwriting", id, path);
                }
                self.items.insert(id.clone(), ItemDefinition::from_raw(&id, &raw));
            }
        }

        info!("Loaded {} item definitions", self.items.len());

        Ok(())
    }

    /// Get an item definition by ID
    pub fn get(&self, id: &str) -> Option<&ItemDefinition> {
        self.items.get(id)
    }

    /// Check if an item exists
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Get the number of loaded items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Generate item definitions message for client sync
    pub fn to_client_definitions(&self) -> crate::protocol::ServerMessage {
        use crate::protocol::ClientItemDef;

        let mut items: Vec<ClientItemDef> = self.items
            .values()
            .map(|item| ClientItemDef {
                id: item.id.clone(),
                display_name: item.display_name.clone(),
                category: item.category.as_str().to_string(),
                max_stack: item.max_stack,
                description: item.description.clone(),
            })
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));

        crate::protocol::ServerMessage::ItemDefinitions { items }
    }
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ItemCategory;
    use tempfile::TempDir;

    #[test]
    fn test_load_items_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        let items_dir = temp_dir.path().join("items");
        std::fs::create_dir_all(&items_dir).unwrap();

        std::fs::write(
            items_dir.join("books.toml"),
            r#"
["book_of_bandofstars"]
display_name = "Book of Band of Stars"
category = "book"

["Egg_of_Youth,_Scroll_1_of_3"]
category = "scroll"
"#,
        ).unwrap();

        let mut registry = ItemRegistry::new();
        registry.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(registry.len(), 2);
        // Ids keep their authored case and punctuation
        assert!(registry.contains("Egg_of_Youth,_Scroll_1_of_3"));
        assert!(!registry.contains("egg_of_youth,_scroll_1_of_3"));

        let book = registry.get("book_of_bandofstars").unwrap();
        assert_eq!(book.category, ItemCategory::Book);
    }

    #[test]
    fn test_missing_directory_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = ItemRegistry::new();
        registry.load_from_directory(temp_dir.path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shipped_items_load() {
        let mut registry = ItemRegistry::new();
        registry.load_from_directory(Path::new("data")).unwrap();

        assert!(registry.contains("mlrespectoken"));
        assert!(registry.contains("atlanteanglass"));
        assert!(registry.get("Full_Buffs_Token").unwrap().is_buff_package());
    }
}
