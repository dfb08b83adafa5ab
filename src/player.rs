//! Player state owned by the host and mutated by NPC hooks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::class::{CharacterClass, MlLine, Realm};
use crate::item::Inventory;
use crate::script::SpellKind;

// ============================================================================
// Position
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub region: u16,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub heading: u16,
}

impl Position {
    pub fn new(region: u16, x: i32, y: i32, z: i32, heading: u16) -> Self {
        Self { region, x, y, z, heading }
    }

    /// 3D distance, or None when the positions are in different regions
    pub fn distance_to(&self, other: &Position) -> Option<f64> {
        if self.region != other.region {
            return None;
        }
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }
}

// ============================================================================
// Buffs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveBuff {
    pub spell: String,
    pub name: String,
    pub kind: SpellKind,
    pub value: f32,
    pub expires_at: u64,
}

// ============================================================================
// Player
// ============================================================================

/// Temp property holding the uid of the ML1 token handed to a trainer
pub const ML_HANDED_ITEM: &str = "ML_ATLANTEAN_GLASS_NPC_HANDED_ITEM";

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub character_id: i64,
    pub name: String,
    pub class: CharacterClass,
    pub realm: Realm,
    pub race_name: String,
    pub level: u8,
    pub priv_level: u8,
    pub position: Position,
    /// Descriptions of the areas the player currently stands in
    pub areas: Vec<String>,
    pub in_combat: bool,
    pub carrying_relic: bool,
    pub inventory: Inventory,
    /// Money in copper
    pub money: i64,
    pub bounty_points: i64,
    pub ml_line: MlLine,
    pub ml_level: u8,
    pub ml_granted: bool,
    pub ml_experience: i64,
    pub spell_lines: Vec<String>,
    pub buffs: Vec<ActiveBuff>,
    /// Session-only values, never saved
    pub temp_properties: HashMap<String, String>,
}

impl Player {
    pub fn new(id: &str, name: &str, class: CharacterClass, race_name: &str, level: u8) -> Self {
        Self {
            id: id.to_string(),
            character_id: 0,
            name: name.to_string(),
            class,
            realm: class.realm(),
            race_name: race_name.to_string(),
            level,
            priv_level: 1,
            position: Position::default(),
            areas: Vec::new(),
            in_combat: false,
            carrying_relic: false,
            inventory: Inventory::new(),
            money: 0,
            bounty_points: 0,
            ml_line: MlLine::None,
            ml_level: 0,
            ml_granted: false,
            ml_experience: 0,
            spell_lines: Vec::new(),
            buffs: Vec::new(),
            temp_properties: HashMap::new(),
        }
    }

    pub fn has_spell_line(&self, line: &str) -> bool {
        self.spell_lines.iter().any(|l| l == line)
    }

    pub fn add_spell_line(&mut self, line: &str) {
        if !self.has_spell_line(line) {
            self.spell_lines.push(line.to_string());
        }
    }

    pub fn remove_spell_line(&mut self, line: &str) -> bool {
        let before = self.spell_lines.len();
        self.spell_lines.retain(|l| l != line);
        self.spell_lines.len() != before
    }

    /// Apply a buff, replacing any active buff from the same spell
    pub fn apply_buff(&mut self, buff: ActiveBuff) {
        self.buffs.retain(|b| b.spell != buff.spell);
        self.buffs.push(buff);
    }

    /// Drop expired buffs, returning how many were removed
    pub fn expire_buffs(&mut self, now: u64) -> usize {
        let before = self.buffs.len();
        self.buffs.retain(|b| b.expires_at > now);
        before - self.buffs.len()
    }

    pub fn set_temp(&mut self, key: &str, value: String) {
        self.temp_properties.insert(key.to_string(), value);
    }

    pub fn temp(&self, key: &str) -> Option<&str> {
        self.temp_properties.get(key).map(|s| s.as_str())
    }

    pub fn take_temp(&mut self, key: &str) -> Option<String> {
        self.temp_properties.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_requires_same_region() {
        let a = Position::new(10, 0, 0, 0, 0);
        let b = Position::new(10, 300, 400, 0, 0);
        let c = Position::new(11, 0, 0, 0, 0);
        assert_eq!(a.distance_to(&b), Some(500.0));
        assert_eq!(a.distance_to(&c), None);
    }

    #[test]
    fn test_spell_lines_are_unique() {
        let mut player = Player::new("p1", "Tester", CharacterClass::Cleric, "Briton", 50);
        player.add_spell_line("ML1 Perfecter");
        player.add_spell_line("ML1 Perfecter");
        assert_eq!(player.spell_lines.len(), 1);
        assert!(player.remove_spell_line("ML1 Perfecter"));
        assert!(!player.remove_spell_line("ML1 Perfecter"));
    }

    #[test]
    fn test_recast_replaces_buff() {
        let mut player = Player::new("p1", "Tester", CharacterClass::Cleric, "Briton", 50);
        let buff = |value: f32, expires_at: u64| ActiveBuff {
            spell: "str".to_string(),
            name: "Strength of the Realm".to_string(),
            kind: SpellKind::StrengthBuff,
            value,
            expires_at,
        };
        player.apply_buff(buff(50.0, 100));
        player.apply_buff(buff(74.0, 200));
        assert_eq!(player.buffs.len(), 1);
        assert_eq!(player.buffs[0].value, 74.0);

        assert_eq!(player.expire_buffs(150), 0);
        assert_eq!(player.expire_buffs(200), 1);
    }

    #[test]
    fn test_realm_follows_class() {
        let player = Player::new("p1", "Tester", CharacterClass::Bard, "Celt", 50);
        assert_eq!(player.realm, Realm::Hibernia);
    }
}
