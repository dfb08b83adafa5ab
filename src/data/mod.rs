//! Content data loaded from the `data/` directory.

pub mod item_def;
pub mod item_registry;

pub use item_def::{ItemCategory, ItemDefinition};
pub use item_registry::ItemRegistry;

use std::path::{Path, PathBuf};

/// List the `.toml` files of a directory in name order, so later files
/// deterministically override earlier ones.
pub fn toml_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
