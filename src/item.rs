use serde::{Deserialize, Serialize};

// ============================================================================
// Inventory Items
// ============================================================================

/// An item instance held by a player. `id_nb` is the template key that
/// every script table matches against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub uid: String,
    pub id_nb: String,
    pub name: String,
    pub count: i32,
    #[serde(default)]
    pub activated: bool,
}

impl InventoryItem {
    pub fn new(id_nb: &str, name: &str, count: i32) -> Self {
        Self {
            uid: uuid::Uuid::new_v4().to_string(),
            id_nb: id_nb.to_string(),
            name: name.to_string(),
            count,
            activated: false,
        }
    }

    pub fn activated(mut self) -> Self {
        self.activated = true;
        self
    }
}

// ============================================================================
// Backpack
// ============================================================================

pub const BACKPACK_SIZE: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub slots: Vec<Option<InventoryItem>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            slots: vec![None; BACKPACK_SIZE],
        }
    }

    /// Restore from saved slots, padding or truncating to the backpack size
    pub fn from_slots(mut slots: Vec<Option<InventoryItem>>) -> Self {
        slots.resize(BACKPACK_SIZE, None);
        Self { slots }
    }

    pub fn get(&self, slot: usize) -> Option<&InventoryItem> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    /// First slot holding the given template
    pub fn slot_of(&self, id_nb: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|i| i.id_nb == id_nb))
    }

    pub fn first_by_id(&self, id_nb: &str) -> Option<&InventoryItem> {
        self.slot_of(id_nb).and_then(|i| self.get(i))
    }

    pub fn has(&self, id_nb: &str) -> bool {
        self.slot_of(id_nb).is_some()
    }

    /// Activation flag of the first held item with this id (false when absent)
    pub fn is_activated(&self, id_nb: &str) -> bool {
        self.first_by_id(id_nb).is_some_and(|i| i.activated)
    }

    pub fn set_activated(&mut self, id_nb: &str) -> bool {
        match self.slot_of(id_nb) {
            Some(slot) => {
                if let Some(item) = self.slots[slot].as_mut() {
                    item.activated = true;
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_slot(&mut self, slot: usize) -> Option<InventoryItem> {
        self.slots.get_mut(slot).and_then(|s| s.take())
    }

    pub fn remove_first(&mut self, id_nb: &str) -> Option<InventoryItem> {
        let slot = self.slot_of(id_nb)?;
        self.remove_slot(slot)
    }

    pub fn slot_of_uid(&self, uid: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|i| i.uid == uid))
    }

    pub fn remove_uid(&mut self, uid: &str) -> Option<InventoryItem> {
        let slot = self.slot_of_uid(uid)?;
        self.remove_slot(slot)
    }

    pub fn first_empty(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    pub fn has_space(&self) -> bool {
        self.first_empty().is_some()
    }

    /// Whether an existing stack of this template has room left
    pub fn can_merge(&self, id_nb: &str, max_stack: i32) -> bool {
        let max_stack = max_stack.max(1);
        self.slots
            .iter()
            .flatten()
            .any(|i| i.id_nb == id_nb && i.count < max_stack)
    }

    /// Place an item in the first empty slot, handing it back when full
    pub fn add_to_first_empty(&mut self, item: InventoryItem) -> Result<usize, InventoryItem> {
        match self.first_empty() {
            Some(slot) => {
                self.slots[slot] = Some(item);
                Ok(slot)
            }
            None => Err(item),
        }
    }

    /// Total count of a template across all slots
    pub fn count_of(&self, id_nb: &str) -> i32 {
        self.slots
            .iter()
            .flatten()
            .filter(|i| i.id_nb == id_nb)
            .map(|i| i.count)
            .sum()
    }

    /// Add a stackable quantity. Returns the quantity that couldn't fit.
    pub fn add_stack(&mut self, id_nb: &str, name: &str, mut quantity: i32, max_stack: i32) -> i32 {
        let max_stack = max_stack.max(1);

        // First, try to stack with existing items
        for item in self.slots.iter_mut().flatten() {
            if quantity <= 0 {
                break;
            }
            if item.id_nb == id_nb && item.count < max_stack {
                let add = quantity.min(max_stack - item.count);
                item.count += add;
                quantity -= add;
            }
        }

        // Then, try to find empty slots for remaining quantity
        for slot in &mut self.slots {
            if quantity <= 0 {
                break;
            }
            if slot.is_none() {
                let add = quantity.min(max_stack);
                *slot = Some(InventoryItem::new(id_nb, name, add));
                quantity -= add;
            }
        }

        quantity
    }

    /// Remove a quantity spread across stacks. Nothing is removed when short.
    pub fn remove_count(&mut self, id_nb: &str, mut quantity: i32) -> bool {
        if self.count_of(id_nb) < quantity {
            return false;
        }
        for slot in &mut self.slots {
            if quantity <= 0 {
                break;
            }
            if let Some(item) = slot {
                if item.id_nb == id_nb {
                    let take = quantity.min(item.count);
                    item.count -= take;
                    quantity -= take;
                    if item.count <= 0 {
                        *slot = None;
                    }
                }
            }
        }
        true
    }

    /// Get inventory as a serializable update
    pub fn to_update(&self) -> Vec<InventorySlotUpdate> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|s| InventorySlotUpdate {
                slot: i as u8,
                item_id: s.id_nb.clone(),
                name: s.name.clone(),
                quantity: s.count,
                activated: s.activated,
            })
        }).collect()
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InventorySlotUpdate {
    pub slot: u8,
    pub item_id: String,
    pub name: String,
    pub quantity: i32,
    pub activated: bool,
}

// ============================================================================
// Ground Item (dropped in world)
// ============================================================================

/// Items on the ground vanish after three minutes
pub const GROUND_ITEM_LIFETIME_MS: u64 = 180_000;
const OWNER_PERIOD_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct GroundItem {
    pub id: String,
    pub item: InventoryItem,
    pub region: u16,
    pub x: i32,
    pub y: i32,
    pub owner_id: Option<String>, // Player who can pick up (None = anyone)
    pub drop_time: u64,
}

impl GroundItem {
    pub fn new(item: InventoryItem, region: u16, x: i32, y: i32, owner_id: Option<String>, current_time: u64) -> Self {
        Self {
            id: format!("ground_{}", uuid::Uuid::new_v4()),
            item,
            region,
            x,
            y,
            owner_id,
            drop_time: current_time,
        }
    }

    pub fn is_expired(&self, current_time: u64) -> bool {
        current_time.saturating_sub(self.drop_time) > GROUND_ITEM_LIFETIME_MS
    }

    /// Check if a player can pick up this item
    pub fn can_pickup(&self, player_id: &str, current_time: u64) -> bool {
        if current_time.saturating_sub(self.drop_time) < OWNER_PERIOD_MS {
            match &self.owner_id {
                Some(owner) => owner == player_id,
                None => true,
            }
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroundItemUpdate {
    pub id: String,
    pub item_id: String,
    pub name: String,
    pub region: u16,
    pub x: i32,
    pub y: i32,
    pub quantity: i32,
}

impl From<&GroundItem> for GroundItemUpdate {
    fn from(ground: &GroundItem) -> Self {
        Self {
            id: ground.id.clone(),
            item_id: ground.item.id_nb.clone(),
            name: ground.item.name.clone(),
            region: ground.region,
            x: ground.x,
            y: ground.y,
            quantity: ground.item.count,
        }
    }
}

// ============================================================================
// Loot Tables
// ============================================================================

use crate::data::ItemRegistry;
use rand::Rng;

#[derive(Debug, Clone, Deserialize)]
pub struct LootEntry {
    pub item_id: String,
    pub drop_chance: f32,
    #[serde(default = "default_quantity")]
    pub quantity_min: i32,
    #[serde(default = "default_quantity")]
    pub quantity_max: i32,
}

fn default_quantity() -> i32 { 1 }

/// Roll a loot table into item instances
pub fn roll_loot(loot: &[LootEntry], items: &ItemRegistry) -> Vec<InventoryItem> {
    let mut rng = rand::thread_rng();
    let mut drops = Vec::new();

    for entry in loot {
        if rng.r#gen::<f32>() >= entry.drop_chance {
            continue;
        }
        let Some(def) = items.get(&entry.item_id) else {
            tracing::warn!("Loot entry references unknown item '{}'", entry.item_id);
            continue;
        };
        let (lo, hi) = if entry.quantity_min <= entry.quantity_max {
            (entry.quantity_min, entry.quantity_max)
        } else {
            (entry.quantity_max, entry.quantity_min)
        };
        let quantity = rng.gen_range(lo..=hi).max(1);
        drops.push(def.instantiate(quantity));
    }

    drops
}
