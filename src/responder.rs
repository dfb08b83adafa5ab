//! Stimulus-Keyed Responder
//!
//! Every custom NPC answers four stimuli: a player interacting, a whispered
//! keyword, an item handed over, and its own death. A responder looks the
//! stimulus key up in its table and records replies and side effects into
//! an outbox. The host owns the network and turns the outbox into messages.
//!
//! Hooks return a "continue" flag. `true` lets the host carry on with its
//! default handling; `false` means the NPC consumed the stimulus.

use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::data::ItemRegistry;
use crate::item::{roll_loot, InventoryItem};
use crate::npc::NpcInstance;
use crate::player::{ActiveBuff, Player, Position};
use crate::script::ScriptBook;

// ============================================================================
// Stimuli
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stimulus {
    Interact,
    Whisper(String),
    /// An item handed over from the given backpack slot
    ReceiveItem { slot: usize },
    /// The NPC was killed; the context player is the killer
    Die,
}

impl Stimulus {
    fn label(&self) -> &'static str {
        match self {
            Stimulus::Interact => "interact",
            Stimulus::Whisper(_) => "whisper",
            Stimulus::ReceiveItem { .. } => "receive_item",
            Stimulus::Die => "die",
        }
    }
}

// ============================================================================
// Outbox
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    Say,
    System,
    Important,
    Merchant,
    SpellResisted,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Say => "say",
            ChatType::System => "system",
            ChatType::Important => "important",
            ChatType::Merchant => "merchant",
            ChatType::SpellResisted => "spell_resisted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatLoc {
    PopupWindow,
    SystemWindow,
}

impl ChatLoc {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatLoc::PopupWindow => "popup",
            ChatLoc::SystemWindow => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub chat_type: ChatType,
    pub loc: ChatLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Teleport(Position),
    /// Item placed on the ground, owned by the context player
    GroundDrop { item: InventoryItem, at: Position },
    MerchantWindow { shop_id: String },
    BuffApplied(ActiveBuff),
    /// Backpack contents changed and should be resent
    InventoryChanged,
    /// Persist the player now
    Save,
    /// Disconnect the player
    Quit,
}

#[derive(Debug, Default, Clone)]
pub struct Outbox {
    pub replies: Vec<Reply>,
    pub effects: Vec<Effect>,
}

impl Outbox {
    #[cfg(test)]
    pub fn texts(&self) -> Vec<&str> {
        self.replies.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn has_effect(&self, pred: impl Fn(&Effect) -> bool) -> bool {
        self.effects.iter().any(pred)
    }
}

// ============================================================================
// Script Context
// ============================================================================

/// Everything a hook may read or change while handling one stimulus
pub struct ScriptContext<'a> {
    pub npc: &'a NpcInstance,
    pub player: &'a mut Player,
    pub items: &'a ItemRegistry,
    pub book: &'a ScriptBook,
    pub settings: &'a ServerConfig,
    /// Milliseconds since the epoch
    pub now: u64,
    pub out: Outbox,
}

impl<'a> ScriptContext<'a> {
    pub fn new(
        npc: &'a NpcInstance,
        player: &'a mut Player,
        items: &'a ItemRegistry,
        book: &'a ScriptBook,
        settings: &'a ServerConfig,
        now: u64,
    ) -> Self {
        Self { npc, player, items, book, settings, now, out: Outbox::default() }
    }

    pub fn reply(&mut self, text: impl Into<String>, chat_type: ChatType, loc: ChatLoc) {
        self.out.replies.push(Reply { text: text.into(), chat_type, loc });
    }

    pub fn say(&mut self, text: impl Into<String>) {
        self.reply(text, ChatType::Say, ChatLoc::PopupWindow);
    }

    pub fn system_popup(&mut self, text: impl Into<String>) {
        self.reply(text, ChatType::System, ChatLoc::PopupWindow);
    }

    pub fn system_window(&mut self, text: impl Into<String>) {
        self.reply(text, ChatType::System, ChatLoc::SystemWindow);
    }

    pub fn merchant(&mut self, text: impl Into<String>) {
        self.reply(text, ChatType::Merchant, ChatLoc::SystemWindow);
    }

    pub fn effect(&mut self, effect: Effect) {
        self.out.effects.push(effect);
    }

    pub fn inventory_changed(&mut self) {
        if !self.out.has_effect(|e| matches!(e, Effect::InventoryChanged)) {
            self.out.effects.push(Effect::InventoryChanged);
        }
    }

    /// Remove a specific item instance from the backpack
    pub fn take(&mut self, item: &InventoryItem) -> bool {
        match self.player.inventory.remove_uid(&item.uid) {
            Some(_) => {
                self.inventory_changed();
                true
            }
            None => false,
        }
    }

    /// Remove the first held item with this id. A missing item is logged and skipped.
    pub fn remove_first(&mut self, id_nb: &str) -> Option<InventoryItem> {
        match self.player.inventory.remove_first(id_nb) {
            Some(item) => {
                self.inventory_changed();
                Some(item)
            }
            None => {
                warn!(
                    "NPC {} tried to remove '{}' from {} but it is not held",
                    self.npc.id, id_nb, self.player.name
                );
                None
            }
        }
    }

    /// Put an item in the first empty slot, or on the ground when the backpack is full
    pub fn give(&mut self, item: InventoryItem, announce: bool) {
        let name = item.name.clone();
        match self.player.inventory.add_to_first_empty(item) {
            Ok(_) => {
                self.inventory_changed();
                if announce {
                    self.system_window(format!("You receive the {}.", name));
                }
            }
            Err(item) => {
                let at = self.player.position;
                self.effect(Effect::GroundDrop { item, at });
                self.reply(
                    format!(
                        "Your Inventory is full. You couldn't recieve the {}, so it's been placed on the ground. Pick it up as soon as possible or it will vanish in a few minutes.",
                        name
                    ),
                    ChatType::Important,
                    ChatLoc::PopupWindow,
                );
            }
        }
    }

    /// Give a fresh instance of a template. Unknown templates are logged and skipped.
    pub fn give_template(&mut self, id_nb: &str, announce: bool) -> bool {
        match self.items.get(id_nb) {
            Some(def) => {
                let item = def.instantiate(1);
                self.give(item, announce);
                true
            }
            None => {
                warn!("NPC {} cannot give unknown item template '{}'", self.npc.id, id_nb);
                false
            }
        }
    }

    /// Whether the player stands close enough to hand items over; replies when not
    pub fn in_range(&mut self) -> bool {
        let close = self
            .player
            .position
            .distance_to(&self.npc.position)
            .is_some_and(|d| d <= self.settings.interact_distance);
        if !close {
            self.system_window(format!(
                "You are too far away to give anything to {}.",
                self.npc.name
            ));
        }
        close
    }
}

// ============================================================================
// Responder
// ============================================================================

pub trait Responder: Send + Sync {
    fn interact(&self, _ctx: &mut ScriptContext<'_>) -> bool {
        true
    }

    fn whisper(&self, _ctx: &mut ScriptContext<'_>, _text: &str) -> bool {
        true
    }

    fn receive_item(&self, _ctx: &mut ScriptContext<'_>, _item: &InventoryItem) -> bool {
        false
    }

    /// Drops the NPC's loot at its feet for the killer
    fn die(&self, ctx: &mut ScriptContext<'_>) -> bool {
        let at = ctx.npc.position;
        for item in roll_loot(&ctx.npc.loot, ctx.items) {
            ctx.effect(Effect::GroundDrop { item, at });
        }
        true
    }
}

/// Route a stimulus to the matching hook
pub fn dispatch(responder: &dyn Responder, ctx: &mut ScriptContext<'_>, stimulus: &Stimulus) -> bool {
    debug!(
        "NPC {} handling {} from {}",
        ctx.npc.id,
        stimulus.label(),
        ctx.player.name
    );

    match stimulus {
        Stimulus::Interact => responder.interact(ctx),
        Stimulus::Whisper(text) => responder.whisper(ctx, text),
        Stimulus::ReceiveItem { slot } => {
            let Some(item) = ctx.player.inventory.get(*slot).cloned() else {
                return false;
            };
            responder.receive_item(ctx, &item)
        }
        Stimulus::Die => responder.die(ctx),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::class::CharacterClass;
    use crate::item::{LootEntry, BACKPACK_SIZE};
    use crate::npc::NpcKind;
    use crate::script::registry::load_book;
    use std::path::Path;

    /// Shipped content shared by the NPC tests
    pub(crate) struct Fixture {
        pub items: ItemRegistry,
        pub book: ScriptBook,
        pub settings: ServerConfig,
    }

    impl Fixture {
        pub(crate) fn shipped() -> Self {
            let mut items = ItemRegistry::new();
            items.load_from_directory(Path::new("data")).unwrap();
            let book = load_book(Path::new("data/scripts")).unwrap();
            Self { items, book, settings: ServerConfig::default() }
        }

        pub(crate) fn ctx<'a>(&'a self, npc: &'a NpcInstance, player: &'a mut Player) -> ScriptContext<'a> {
            ScriptContext::new(npc, player, &self.items, &self.book, &self.settings, 1_000)
        }

        pub(crate) fn item(&self, id: &str) -> InventoryItem {
            self.items.get(id).map(|d| d.instantiate(1)).unwrap_or_else(|| InventoryItem::new(id, id, 1))
        }
    }

    pub(crate) fn npc(kind: NpcKind) -> NpcInstance {
        NpcInstance::for_test("npc_1", "Tester NPC", kind, Position::new(10, 1000, 1000, 0, 0))
    }

    pub(crate) fn player(class: CharacterClass) -> Player {
        let mut player = Player::new("p1", "Hero", class, "Briton", 50);
        player.position = Position::new(10, 1000, 1100, 0, 0);
        player
    }

    struct Silent;
    impl Responder for Silent {}

    #[test]
    fn test_default_hooks() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Armsman);
        player.inventory.add_to_first_empty(fixture.item("atlanteanglass")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(dispatch(&Silent, &mut ctx, &Stimulus::Interact));
        assert!(dispatch(&Silent, &mut ctx, &Stimulus::Whisper("anything".into())));
        assert!(!dispatch(&Silent, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert!(ctx.out.replies.is_empty());
    }

    #[test]
    fn test_receive_from_empty_slot_is_refused() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Armsman);
        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!dispatch(&Silent, &mut ctx, &Stimulus::ReceiveItem { slot: 3 }));
        assert!(!dispatch(&Silent, &mut ctx, &Stimulus::ReceiveItem { slot: 999 }));
    }

    #[test]
    fn test_die_drops_guaranteed_loot() {
        let fixture = Fixture::shipped();
        let mut npc = npc(NpcKind::MlRespec);
        npc.loot = vec![LootEntry {
            item_id: "atlanteanglass".to_string(),
            drop_chance: 1.0,
            quantity_min: 5,
            quantity_max: 5,
        }];
        let mut player = player(CharacterClass::Armsman);
        let mut ctx = fixture.ctx(&npc, &mut player);

        assert!(dispatch(&Silent, &mut ctx, &Stimulus::Die));
        let drops: Vec<_> = ctx
            .out
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::GroundDrop { item, at } => Some((item, at)),
                _ => None,
            })
            .collect();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].0.count, 5);
        assert_eq!(*drops[0].1, npc.position);
    }

    #[test]
    fn test_give_to_full_backpack_drops_on_ground() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlRespec);
        let mut player = player(CharacterClass::Armsman);
        for _ in 0..BACKPACK_SIZE {
            player.inventory.add_to_first_empty(InventoryItem::new("filler", "Filler", 1)).unwrap();
        }
        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(ctx.give_template("mlrespectoken", true));

        assert!(ctx.out.has_effect(|e| matches!(e, Effect::GroundDrop { .. })));
        let reply = &ctx.out.replies[0];
        assert_eq!(reply.chat_type, ChatType::Important);
        assert!(reply.text.starts_with("Your Inventory is full."));
    }

    #[test]
    fn test_out_of_range_reply() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Armsman);
        player.position = Position::new(11, 1000, 1000, 0, 0);
        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!ctx.in_range());
        assert_eq!(
            ctx.out.texts(),
            vec!["You are too far away to give anything to Tester NPC."]
        );
    }

    #[test]
    fn test_remove_missing_item_is_skipped() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::ArtifactScholar);
        let mut player = player(CharacterClass::Armsman);
        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(ctx.remove_first("not_held").is_none());
        assert!(ctx.out.effects.is_empty());
    }
}
