//! Scripted NPCs
//!
//! Spawns are read from `data/npcs.toml`. Each spawn names a kind, and the
//! kind picks the responder that answers its hooks.

mod activator;
mod buff_merchant;
mod master_level;
mod ml_respec;
mod scholar;
mod teleporter;

pub use activator::ArtifactActivator;
pub use buff_merchant::{farewell, package_buffs, selected_shop, BuffMerchant, BOUNTY_SHOP, GOLD_SHOP};
pub use master_level::{MlTrainer, TrainerCurrency};
pub use ml_respec::MlRespec;
pub use scholar::ArtifactScholar;
pub use teleporter::{summon_portable_helper, Teleporter, PORTABLE_HELPER_GUILD};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::class::Realm;
use crate::item::LootEntry;
use crate::player::{Player, Position};
use crate::responder::Responder;

/// Dead NPCs come back after a minute
pub const RESPAWN_MS: u64 = 60_000;

// ============================================================================
// NPC Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcKind {
    ArtifactScholar,
    ArtifactActivator,
    Teleporter,
    BuffMerchant,
    MlGlass,
    MlBounty,
    MlRespec,
}

impl NpcKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NpcKind::ArtifactScholar => "artifact_scholar",
            NpcKind::ArtifactActivator => "artifact_activator",
            NpcKind::Teleporter => "teleporter",
            NpcKind::BuffMerchant => "buff_merchant",
            NpcKind::MlGlass => "ml_glass",
            NpcKind::MlBounty => "ml_bounty",
            NpcKind::MlRespec => "ml_respec",
        }
    }
}

/// Catalog a buy request against this NPC is served from
pub fn shop_for(npc: &NpcInstance, player: &Player) -> Option<String> {
    let trainer_default = match npc.kind {
        NpcKind::BuffMerchant | NpcKind::Teleporter => return Some(selected_shop(player, npc)),
        NpcKind::MlGlass => Some(TrainerCurrency::Glass.default_shop()),
        NpcKind::MlBounty => Some(TrainerCurrency::BountyPoints.default_shop()),
        _ => None,
    };
    npc.shop.clone().or_else(|| trainer_default.map(str::to_string))
}

/// The responder that answers hooks for an NPC kind
pub fn responder_for(kind: NpcKind) -> &'static dyn Responder {
    match kind {
        NpcKind::ArtifactScholar => &ArtifactScholar,
        NpcKind::ArtifactActivator => &ArtifactActivator,
        NpcKind::Teleporter => &Teleporter,
        NpcKind::BuffMerchant => &BuffMerchant,
        NpcKind::MlGlass => &MlTrainer { currency: TrainerCurrency::Glass },
        NpcKind::MlBounty => &MlTrainer { currency: TrainerCurrency::BountyPoints },
        NpcKind::MlRespec => &MlRespec,
    }
}

// ============================================================================
// Spawns
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NpcSpawn {
    pub id: String,
    pub name: String,
    pub kind: NpcKind,
    #[serde(default)]
    pub guild: String,
    pub level: u8,
    #[serde(default)]
    pub realm: Realm,
    pub region: u16,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(default)]
    pub heading: u16,
    pub shop: Option<String>,
    #[serde(default)]
    pub loot: Vec<LootEntry>,
}

#[derive(Debug, Deserialize)]
struct NpcFile {
    #[serde(rename = "npc", default)]
    npcs: Vec<NpcSpawn>,
}

/// Read the spawn list. A missing file means no NPCs.
pub fn load_spawns(data_dir: &Path) -> Result<Vec<NpcSpawn>, String> {
    let path = data_dir.join("npcs.toml");
    if !path.exists() {
        tracing::warn!("NPC spawn file does not exist: {:?}", path);
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    let file: NpcFile = toml::from_str(&content)
        .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

    let mut seen = std::collections::HashSet::new();
    for spawn in &file.npcs {
        if !seen.insert(spawn.id.as_str()) {
            return Err(format!("Duplicate NPC id '{}' in {:?}", spawn.id, path));
        }
    }

    tracing::info!("Loaded {} NPC spawns", file.npcs.len());
    Ok(file.npcs)
}

// ============================================================================
// NPC Instance
// ============================================================================

pub(crate) fn max_hp_for_level(level: u8) -> i32 {
    i32::from(level) * 20 + 100
}

#[derive(Debug, Clone)]
pub struct NpcInstance {
    pub id: String,
    pub name: String,
    pub guild: String,
    pub kind: NpcKind,
    pub level: u8,
    pub realm: Realm,
    pub position: Position,
    /// Catalog opened by the merchant window
    pub shop: Option<String>,
    pub loot: Vec<LootEntry>,
    pub hp: i32,
    pub max_hp: i32,
    pub alive: bool,
    pub respawn_at: Option<u64>,
    /// Summoned NPCs are removed at this time
    pub expires_at: Option<u64>,
    pub owner_id: Option<String>,
}

impl NpcInstance {
    pub fn from_spawn(spawn: &NpcSpawn) -> Self {
        let max_hp = max_hp_for_level(spawn.level);
        Self {
            id: spawn.id.clone(),
            name: spawn.name.clone(),
            guild: spawn.guild.clone(),
            kind: spawn.kind,
            level: spawn.level,
            realm: spawn.realm,
            position: Position::new(spawn.region, spawn.x, spawn.y, spawn.z, spawn.heading),
            shop: spawn.shop.clone(),
            loot: spawn.loot.clone(),
            hp: max_hp,
            max_hp,
            alive: true,
            respawn_at: None,
            expires_at: None,
            owner_id: None,
        }
    }

    /// Apply damage, returning true when this blow kills the NPC
    pub fn take_damage(&mut self, amount: i32, now: u64) -> bool {
        if !self.alive {
            return false;
        }
        self.hp = (self.hp - amount.max(0)).max(0);
        if self.hp == 0 {
            self.alive = false;
            // Summoned NPCs don't come back
            self.respawn_at = match self.expires_at {
                Some(_) => None,
                None => Some(now + RESPAWN_MS),
            };
            return true;
        }
        false
    }

    pub fn ready_to_respawn(&self, now: u64) -> bool {
        !self.alive && self.respawn_at.is_some_and(|t| now >= t)
    }

    pub fn respawn(&mut self) {
        self.hp = self.max_hp;
        self.alive = true;
        self.respawn_at = None;
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }

    /// Summoned NPCs that died stay dead until they expire
    pub fn is_gone(&self, now: u64) -> bool {
        self.is_expired(now) || (!self.alive && self.respawn_at.is_none())
    }

    #[cfg(test)]
    pub fn for_test(id: &str, name: &str, kind: NpcKind, position: Position) -> Self {
        Self::from_spawn(&NpcSpawn {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            guild: String::new(),
            level: 50,
            realm: Realm::None,
            region: position.region,
            x: position.x,
            y: position.y,
            z: position.z,
            heading: position.heading,
            shop: None,
            loot: Vec::new(),
        })
    }
}

/// NPC state sent to clients
#[derive(Debug, Clone, Serialize)]
pub struct NpcUpdate {
    pub id: String,
    pub name: String,
    pub guild: String,
    pub kind: String,
    pub level: u8,
    pub realm: String,
    pub region: u16,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub heading: u16,
    pub hp: i32,
    pub max_hp: i32,
    pub alive: bool,
}

impl From<&NpcInstance> for NpcUpdate {
    fn from(npc: &NpcInstance) -> Self {
        Self {
            id: npc.id.clone(),
            name: npc.name.clone(),
            guild: npc.guild.clone(),
            kind: npc.kind.as_str().to_string(),
            level: npc.level,
            realm: npc.realm.as_str().to_string(),
            region: npc.position.region,
            x: npc.position.x,
            y: npc.position.y,
            z: npc.position.z,
            heading: npc.position.heading,
            hp: npc.hp,
            max_hp: npc.max_hp,
            alive: npc.alive,
        }
    }
}
