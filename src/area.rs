//! Named areas of the world, loaded from `data/areas.toml`.

use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::player::Position;

/// A rectangle within a region
#[derive(Debug, Clone, Deserialize)]
pub struct AreaDef {
    pub name: String,
    pub region: u16,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl AreaDef {
    pub fn contains(&self, pos: &Position) -> bool {
        pos.region == self.region
            && pos.x >= self.x
            && pos.x < self.x + self.width
            && pos.y >= self.y
            && pos.y < self.y + self.height
    }
}

#[derive(Debug, Deserialize)]
struct AreasFile {
    #[serde(default)]
    area: Vec<AreaDef>,
}

#[derive(Debug, Default)]
pub struct AreaMap {
    areas: Vec<AreaDef>,
}

impl AreaMap {
    pub fn load_from_directory(data_dir: &Path) -> Result<Self, String> {
        let path = data_dir.join("areas.toml");
        if !path.exists() {
            warn!("Area file {:?} does not exist, no named areas", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let file: AreasFile = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        info!("Loaded {} named areas", file.area.len());
        Ok(Self { areas: file.area })
    }

    /// Names of every area containing the position
    pub fn names_at(&self, pos: &Position) -> Vec<String> {
        self.areas
            .iter()
            .filter(|a| a.contains(pos))
            .map(|a| a.name.clone())
            .collect()
    }
}
