//! Game room: owns the players, NPCs and ground items of one world instance,
//! routes client requests into NPC hooks and turns their outboxes into
//! protocol messages.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::area::AreaMap;
use crate::config::ServerConfig;
use crate::data::ItemRegistry;
use crate::db::Database;
use crate::item::{GroundItem, GroundItemUpdate, InventoryItem};
use crate::npc::{responder_for, shop_for, summon_portable_helper, NpcInstance, NpcSpawn, NpcUpdate};
use crate::player::{Player, Position};
use crate::protocol::ServerMessage;
use crate::responder::{dispatch, ChatLoc, ChatType, Effect, Outbox, ScriptContext, Stimulus};
use crate::script::ScriptRegistry;
use crate::shop::{purchase, PurchaseError, ShopRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Damage dealt per attack before the attacker's level is added
const BASE_DAMAGE: i32 = 10;

pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

fn attack_damage(level: u8) -> i32 {
    BASE_DAMAGE + i32::from(level) * 2
}

// ============================================================================
// Shared Content
// ============================================================================

/// Registries and settings every room reads from
#[derive(Clone)]
pub struct RoomContent {
    pub settings: Arc<ServerConfig>,
    pub items: Arc<ItemRegistry>,
    pub scripts: Arc<ScriptRegistry>,
    pub shops: Arc<ShopRegistry>,
    pub areas: Arc<AreaMap>,
    pub spawns: Arc<Vec<NpcSpawn>>,
}

// ============================================================================
// Game Room
// ============================================================================

pub struct GameRoom {
    pub id: String,
    pub name: String,
    content: RoomContent,
    db: Option<Arc<Database>>,
    players: RwLock<HashMap<String, Player>>,
    npcs: RwLock<HashMap<String, NpcInstance>>,
    ground_items: RwLock<HashMap<String, GroundItem>>,
    broadcast_tx: broadcast::Sender<ServerMessage>,
    /// Per-player message senders for unicast (NPC replies are private)
    player_senders: RwLock<HashMap<String, mpsc::Sender<Vec<u8>>>>,
}

impl GameRoom {
    pub fn new(name: &str, content: RoomContent, db: Option<Arc<Database>>) -> Self {
        let (tx, _) = broadcast::channel(256);

        let npcs: HashMap<String, NpcInstance> = content
            .spawns
            .iter()
            .map(|spawn| (spawn.id.clone(), NpcInstance::from_spawn(spawn)))
            .collect();
        tracing::info!("Room '{}' spawned {} scripted NPCs", name, npcs.len());

        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            content,
            db,
            players: RwLock::new(HashMap::new()),
            npcs: RwLock::new(npcs),
            ground_items: RwLock::new(HashMap::new()),
            broadcast_tx: tx,
            player_senders: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.broadcast_tx.subscribe()
    }

    pub async fn broadcast(&self, msg: ServerMessage) {
        // Ignore send errors (no receivers)
        let _ = self.broadcast_tx.send(msg);
    }

    /// Register a player's message sender for unicast
    pub async fn register_player_sender(&self, player_id: &str, sender: mpsc::Sender<Vec<u8>>) {
        let mut senders = self.player_senders.write().await;
        senders.insert(player_id.to_string(), sender);
        tracing::debug!("Registered sender for player {}", player_id);
    }

    /// Unregister a player's message sender. Dropping it ends the socket's send loop.
    pub async fn unregister_player_sender(&self, player_id: &str) {
        let mut senders = self.player_senders.write().await;
        senders.remove(player_id);
        tracing::debug!("Unregistered sender for player {}", player_id);
    }

    /// Send a message to a specific player (unicast)
    pub async fn send_to_player(&self, player_id: &str, msg: ServerMessage) {
        use crate::protocol::encode_server_message;

        let senders = self.player_senders.read().await;
        if let Some(sender) = senders.get(player_id) {
            match encode_server_message(&msg) {
                Ok(bytes) => {
                    if let Err(e) = sender.try_send(bytes) {
                        tracing::warn!("Failed to send unicast to {}: {}", player_id, e);
                    }
                }
                Err(e) => tracing::error!("Failed to encode {}: {}", msg.msg_type(), e),
            }
        } else {
            tracing::debug!("No sender registered for player {}", player_id);
        }
    }

    async fn send_text(&self, player_id: &str, npc: Option<&NpcInstance>, text: &str, chat_type: ChatType, loc: ChatLoc) {
        self.send_to_player(
            player_id,
            ServerMessage::NpcReply {
                npc_id: npc.map(|n| n.id.clone()).unwrap_or_default(),
                npc_name: npc.map(|n| n.name.clone()).unwrap_or_default(),
                text: text.to_string(),
                chat_type: chat_type.as_str(),
                loc: loc.as_str(),
            },
        )
        .await;
    }

    // ========================================================================
    // Players
    // ========================================================================

    /// Put a loaded character into the room ahead of its socket connecting
    pub async fn reserve_player(&self, mut player: Player) {
        player.areas = self.content.areas.names_at(&player.position);
        tracing::info!(
            "Reserved {} ({} level {}) in region {}",
            player.name,
            player.class.name(),
            player.level,
            player.position.region
        );
        self.players.write().await.insert(player.id.clone(), player);
    }

    /// Messages a client needs right after connecting
    pub async fn welcome_messages(&self, player_id: &str) -> Vec<ServerMessage> {
        let Some(player) = self.player_snapshot(player_id).await else {
            return Vec::new();
        };
        let npcs = self.npcs.read().await.values().filter(|n| n.alive).map(NpcUpdate::from).collect();

        vec![
            ServerMessage::Welcome {
                player_id: player.id.clone(),
                name: player.name.clone(),
                class: player.class.name().to_string(),
                realm: player.realm.as_str().to_string(),
                level: player.level,
                region: player.position.region,
                x: player.position.x,
                y: player.position.y,
                z: player.position.z,
                heading: player.position.heading,
            },
            self.content.items.to_client_definitions(),
            ServerMessage::NpcList { npcs },
            ServerMessage::InventoryUpdate {
                player_id: player.id.clone(),
                slots: player.inventory.to_update(),
            },
            ServerMessage::CurrencyUpdate {
                money: player.money,
                bounty_points: player.bounty_points,
            },
        ]
    }

    /// Take a player out of the room, dismissing their portable helper
    pub async fn remove_player(&self, player_id: &str) -> Option<Player> {
        let removed = self.players.write().await.remove(player_id);

        let helpers: Vec<String> = {
            let mut npcs = self.npcs.write().await;
            let ids: Vec<String> = npcs
                .values()
                .filter(|n| n.owner_id.as_deref() == Some(player_id))
                .map(|n| n.id.clone())
                .collect();
            for id in &ids {
                npcs.remove(id);
            }
            ids
        };
        for id in helpers {
            self.broadcast(ServerMessage::NpcRemoved { id }).await;
        }

        removed
    }

    pub async fn player_snapshot(&self, player_id: &str) -> Option<Player> {
        self.players.read().await.get(player_id).cloned()
    }

    pub async fn all_player_snapshots(&self) -> Vec<Player> {
        self.players.read().await.values().cloned().collect()
    }

    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }

    #[cfg(test)]
    async fn with_player<R>(&self, player_id: &str, f: impl FnOnce(&mut Player) -> R) -> Option<R> {
        self.players.write().await.get_mut(player_id).map(f)
    }

    async fn save_player(&self, player_id: &str) {
        let Some(db) = &self.db else {
            return;
        };
        if let Some(player) = self.player_snapshot(player_id).await {
            match db.save_character(&player).await {
                Ok(()) => tracing::debug!("Saved {}", player.name),
                Err(e) => tracing::error!("Failed to save {}: {}", player.name, e),
            }
        }
    }

    async fn send_inventory(&self, player_id: &str) {
        let Some((slots, money, bounty_points)) = self
            .players
            .read()
            .await
            .get(player_id)
            .map(|p| (p.inventory.to_update(), p.money, p.bounty_points))
        else {
            return;
        };
        self.send_to_player(
            player_id,
            ServerMessage::InventoryUpdate { player_id: player_id.to_string(), slots },
        )
        .await;
        self.send_to_player(player_id, ServerMessage::CurrencyUpdate { money, bounty_points }).await;
    }

    // ========================================================================
    // NPC Hooks
    // ========================================================================

    /// A live NPC by id
    async fn live_npc(&self, npc_id: &str, now: u64) -> Option<NpcInstance> {
        self.npcs
            .read()
            .await
            .get(npc_id)
            .filter(|n| n.alive && !n.is_expired(now))
            .cloned()
    }

    /// Run one stimulus through an NPC's responder and apply what it produced.
    /// Returns the hook's continue flag, or None when the NPC or player is gone.
    async fn run_hook(&self, player_id: &str, npc: &NpcInstance, stimulus: &Stimulus, now: u64) -> Option<bool> {
        let book = self.content.scripts.current().await;

        let (result, outbox, currency_before, currency_after) = {
            let mut players = self.players.write().await;
            let player = players.get_mut(player_id)?;
            let currency_before = (player.money, player.bounty_points);

            let mut ctx = ScriptContext::new(npc, player, &self.content.items, &book, &self.content.settings, now);
            let result = dispatch(responder_for(npc.kind), &mut ctx, stimulus);
            let outbox = std::mem::take(&mut ctx.out);
            drop(ctx);

            (result, outbox, currency_before, (player.money, player.bounty_points))
        };

        self.apply_outbox(player_id, npc, outbox, now).await;
        if currency_before != currency_after {
            self.send_to_player(
                player_id,
                ServerMessage::CurrencyUpdate {
                    money: currency_after.0,
                    bounty_points: currency_after.1,
                },
            )
            .await;
        }
        Some(result)
    }

    async fn apply_outbox(&self, player_id: &str, npc: &NpcInstance, outbox: Outbox, now: u64) {
        for reply in &outbox.replies {
            self.send_text(player_id, Some(npc), &reply.text, reply.chat_type, reply.loc).await;
        }

        let mut quit = false;
        for effect in outbox.effects {
            match effect {
                Effect::Teleport(target) => self.teleport(player_id, target).await,
                Effect::GroundDrop { item, at } => {
                    self.drop_on_ground(item, at, Some(player_id.to_string()), now).await;
                }
                Effect::MerchantWindow { shop_id } => self.open_merchant_window(player_id, npc, &shop_id).await,
                Effect::BuffApplied(buff) => {
                    self.send_to_player(
                        player_id,
                        ServerMessage::BuffApplied {
                            spell: buff.spell,
                            name: buff.name,
                            value: buff.value,
                            expires_at: buff.expires_at,
                        },
                    )
                    .await;
                }
                Effect::InventoryChanged => self.send_inventory(player_id).await,
                Effect::Save => self.save_player(player_id).await,
                Effect::Quit => quit = true,
            }
        }

        // Disconnect last so every earlier message is queued first
        if quit {
            self.send_to_player(
                player_id,
                ServerMessage::Kicked { reason: "Your character has been changed. Please log in again.".to_string() },
            )
            .await;
            self.unregister_player_sender(player_id).await;
        }
    }

    async fn teleport(&self, player_id: &str, target: Position) {
        {
            let mut players = self.players.write().await;
            let Some(player) = players.get_mut(player_id) else {
                return;
            };
            player.position = target;
            player.areas = self.content.areas.names_at(&target);
            tracing::info!(
                "Teleported {} to region {} ({}, {}, {})",
                player.name,
                target.region,
                target.x,
                target.y,
                target.z
            );
        }
        self.send_to_player(
            player_id,
            ServerMessage::Teleport {
                region: target.region,
                x: target.x,
                y: target.y,
                z: target.z,
                heading: target.heading,
            },
        )
        .await;
    }

    async fn drop_on_ground(&self, item: InventoryItem, at: Position, owner_id: Option<String>, now: u64) {
        let ground = GroundItem::new(item, at.region, at.x, at.y, owner_id, now);
        let update = GroundItemUpdate::from(&ground);
        self.ground_items.write().await.insert(ground.id.clone(), ground);
        self.broadcast(ServerMessage::GroundItemSpawned { item: update }).await;
    }

    async fn open_merchant_window(&self, player_id: &str, npc: &NpcInstance, shop_id: &str) {
        let Some(shop) = self.content.shops.get(shop_id) else {
            tracing::warn!("NPC {} opened unknown catalog '{}'", npc.id, shop_id);
            return;
        };
        self.send_to_player(
            player_id,
            ServerMessage::MerchantWindow {
                npc_id: npc.id.clone(),
                shop_id: shop.id.clone(),
                title: shop.display_name.clone(),
                currency: shop.currency.label(&self.content.items),
                entries: shop.catalog(&self.content.items),
            },
        )
        .await;
    }

    async fn npc_or_error(&self, player_id: &str, npc_id: &str, now: u64) -> Option<NpcInstance> {
        let npc = self.live_npc(npc_id, now).await;
        if npc.is_none() {
            self.send_to_player(
                player_id,
                ServerMessage::Error { code: 404, message: format!("NPC {} not found", npc_id) },
            )
            .await;
        }
        npc
    }

    pub async fn handle_interact(&self, player_id: &str, npc_id: &str) {
        let now = now_ms();
        if let Some(npc) = self.npc_or_error(player_id, npc_id, now).await {
            self.run_hook(player_id, &npc, &Stimulus::Interact, now).await;
        }
    }

    pub async fn handle_whisper(&self, player_id: &str, npc_id: &str, text: &str) {
        let now = now_ms();
        if let Some(npc) = self.npc_or_error(player_id, npc_id, now).await {
            self.run_hook(player_id, &npc, &Stimulus::Whisper(text.to_string()), now).await;
        }
    }

    pub async fn handle_give_item(&self, player_id: &str, npc_id: &str, slot: u8) {
        let now = now_ms();
        if let Some(npc) = self.npc_or_error(player_id, npc_id, now).await {
            let stimulus = Stimulus::ReceiveItem { slot: usize::from(slot) };
            self.run_hook(player_id, &npc, &stimulus, now).await;
        }
    }

    // ========================================================================
    // Merchants
    // ========================================================================

    pub async fn handle_buy(&self, player_id: &str, npc_id: &str, item_id: &str, quantity: i32) {
        let now = now_ms();
        let Some(npc) = self.npc_or_error(player_id, npc_id, now).await else {
            return;
        };
        let book = self.content.scripts.current().await;
        let settings = &self.content.settings;

        let result = {
            let mut players = self.players.write().await;
            let Some(player) = players.get_mut(player_id) else {
                return;
            };

            let in_range = player
                .position
                .distance_to(&npc.position)
                .is_some_and(|d| d <= settings.interact_distance);
            let shop = shop_for(&npc, player).and_then(|id| self.content.shops.get(&id));
            match shop {
                _ if !in_range => Err((
                    format!("You are too far away to buy from {}.", npc.name),
                    ChatType::Merchant,
                )),
                None => Err((format!("{} has nothing to sell.", npc.name), ChatType::Merchant)),
                Some(shop) => {
                    let expires_at = now + settings.buff_duration_secs * 1000;
                    match purchase(player, shop, &self.content.items, &book, item_id, quantity, expires_at) {
                        Ok(bought) => {
                            tracing::info!(
                                "{} bought {}x{} from {} for {}",
                                player.name,
                                bought.quantity,
                                bought.item_id,
                                npc.id,
                                bought.currency.format(bought.cost, &self.content.items)
                            );
                            Ok(bought)
                        }
                        Err(e @ PurchaseError::OneAtATime(_)) => Err((e.to_string(), ChatType::System)),
                        Err(e) => Err((e.to_string(), ChatType::Merchant)),
                    }
                }
            }
        };

        match result {
            Ok(bought) => {
                let message = bought.message(&self.content.items);
                self.send_text(player_id, Some(&npc), &message, ChatType::Merchant, ChatLoc::SystemWindow).await;
                if let Some(farewell) = &bought.farewell {
                    self.send_text(player_id, Some(&npc), farewell, ChatType::Say, ChatLoc::PopupWindow).await;
                }
                for buff in bought.buffs {
                    self.send_to_player(
                        player_id,
                        ServerMessage::BuffApplied {
                            spell: buff.spell,
                            name: buff.name,
                            value: buff.value,
                            expires_at: buff.expires_at,
                        },
                    )
                    .await;
                }
                self.send_inventory(player_id).await;
            }
            Err((message, chat_type)) => {
                self.send_text(player_id, Some(&npc), &message, chat_type, ChatLoc::SystemWindow).await;
            }
        }
    }

    // ========================================================================
    // Combat
    // ========================================================================

    pub async fn handle_attack(&self, player_id: &str, npc_id: &str) {
        let now = now_ms();
        let Some((position, level)) = self
            .players
            .read()
            .await
            .get(player_id)
            .map(|p| (p.position, p.level))
        else {
            return;
        };

        let killed = {
            let mut npcs = self.npcs.write().await;
            let Some(npc) = npcs.get_mut(npc_id).filter(|n| n.alive) else {
                return;
            };
            let in_range = position
                .distance_to(&npc.position)
                .is_some_and(|d| d <= self.content.settings.interact_distance);
            if !in_range {
                return;
            }
            if npc.take_damage(attack_damage(level), now) {
                Some(npc.clone())
            } else {
                None
            }
        };

        if let Some(npc) = killed {
            tracing::info!("NPC {} killed by {}", npc.id, player_id);
            self.broadcast(ServerMessage::NpcRemoved { id: npc.id.clone() }).await;
            self.run_hook(player_id, &npc, &Stimulus::Die, now).await;
        }
    }

    // ========================================================================
    // Ground Items
    // ========================================================================

    pub async fn handle_pickup(&self, player_id: &str, ground_item_id: &str) {
        let now = now_ms();
        let Some(position) = self.players.read().await.get(player_id).map(|p| p.position) else {
            return;
        };

        let item = {
            let mut ground_items = self.ground_items.write().await;
            let Some(ground) = ground_items.get(ground_item_id) else {
                return;
            };
            let spot = Position::new(ground.region, ground.x, ground.y, position.z, 0);
            let close = position
                .distance_to(&spot)
                .is_some_and(|d| d <= self.content.settings.interact_distance);
            if !close || !ground.can_pickup(player_id, now) {
                return;
            }

            let stack_limit = self
                .content
                .items
                .get(&ground.item.id_nb)
                .filter(|def| def.is_stackable())
                .map(|def| def.max_stack);
            let fits = self.players.read().await.get(player_id).is_some_and(|p| {
                p.inventory.has_space()
                    || stack_limit.is_some_and(|max| p.inventory.can_merge(&ground.item.id_nb, max))
            });
            if !fits {
                drop(ground_items);
                self.send_text(
                    player_id,
                    None,
                    "Your backpack is full.",
                    ChatType::System,
                    ChatLoc::SystemWindow,
                )
                .await;
                return;
            }
            match ground_items.remove(ground_item_id) {
                Some(ground) => ground.item,
                None => return,
            }
        };

        let name = item.name.clone();
        let leftover = {
            let mut players = self.players.write().await;
            let Some(player) = players.get_mut(player_id) else {
                return;
            };
            let stack = self.content.items.get(&item.id_nb).filter(|def| def.is_stackable());
            match stack {
                Some(def) => {
                    let left = player.inventory.add_stack(&def.id, &def.display_name, item.count, def.max_stack);
                    (left > 0).then(|| InventoryItem { count: left, ..item })
                }
                None => player.inventory.add_to_first_empty(item).err(),
            }
        };

        self.broadcast(ServerMessage::GroundItemRemoved { id: ground_item_id.to_string() }).await;
        tracing::debug!("Player {} picked up {}", player_id, name);
        if let Some(rest) = leftover {
            self.drop_on_ground(rest, position, Some(player_id.to_string()), now).await;
        }
        self.send_inventory(player_id).await;
    }

    // ========================================================================
    // Movement and Helpers
    // ========================================================================

    pub async fn handle_move(&self, player_id: &str, region: Option<u16>, x: i32, y: i32, z: i32, heading: u16) {
        let mut players = self.players.write().await;
        if let Some(player) = players.get_mut(player_id) {
            let region = region.unwrap_or(player.position.region);
            player.position = Position::new(region, x, y, z, heading);
            player.areas = self.content.areas.names_at(&player.position);
        }
    }

    pub async fn handle_summon_helper(&self, player_id: &str) {
        let now = now_ms();
        let Some(caster) = self.player_snapshot(player_id).await else {
            return;
        };

        match summon_portable_helper(&caster, &self.content.settings, now) {
            Ok(helper) => {
                // One helper per player
                let replaced: Vec<String> = {
                    let mut npcs = self.npcs.write().await;
                    let old: Vec<String> = npcs
                        .values()
                        .filter(|n| n.owner_id.as_deref() == Some(player_id))
                        .map(|n| n.id.clone())
                        .collect();
                    for id in &old {
                        npcs.remove(id);
                    }
                    npcs.insert(helper.id.clone(), helper.clone());
                    old
                };
                for id in replaced {
                    self.broadcast(ServerMessage::NpcRemoved { id }).await;
                }
                tracing::info!("{} summoned {}", caster.name, helper.name);
                self.broadcast(ServerMessage::NpcSpawned { npc: NpcUpdate::from(&helper) }).await;
            }
            Err(message) => {
                self.send_text(player_id, None, message, ChatType::SpellResisted, ChatLoc::SystemWindow).await;
            }
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Once-a-second upkeep: ground item decay, respawns, helper expiry, buff expiry
    pub async fn tick(&self) {
        self.maintain(now_ms()).await;
    }

    async fn maintain(&self, now: u64) {
        let expired_items: Vec<String> = {
            let mut ground_items = self.ground_items.write().await;
            let expired: Vec<String> = ground_items
                .values()
                .filter(|g| g.is_expired(now))
                .map(|g| g.id.clone())
                .collect();
            for id in &expired {
                ground_items.remove(id);
            }
            expired
        };
        for id in expired_items {
            self.broadcast(ServerMessage::GroundItemRemoved { id }).await;
        }

        let (respawned, gone) = {
            let mut npcs = self.npcs.write().await;
            let mut respawned = Vec::new();
            for npc in npcs.values_mut() {
                if npc.ready_to_respawn(now) {
                    npc.respawn();
                    respawned.push(NpcUpdate::from(&*npc));
                }
            }
            let gone: Vec<String> = npcs.values().filter(|n| n.is_gone(now)).map(|n| n.id.clone()).collect();
            for id in &gone {
                npcs.remove(id);
            }
            (respawned, gone)
        };
        for npc in respawned {
            self.broadcast(ServerMessage::NpcSpawned { npc }).await;
        }
        for id in gone {
            tracing::debug!("Removed expired NPC {}", id);
            self.broadcast(ServerMessage::NpcRemoved { id }).await;
        }

        let mut players = self.players.write().await;
        for player in players.values_mut() {
            let expired = player.expire_buffs(now);
            if expired > 0 {
                tracing::debug!("{} lost {} expired buffs", player.name, expired);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::CharacterClass;
    use crate::item::GROUND_ITEM_LIFETIME_MS;
    use crate::npc::{load_spawns, RESPAWN_MS};
    use std::path::Path;

    fn shipped_content() -> RoomContent {
        let data = Path::new("data");
        let mut items = ItemRegistry::new();
        items.load_from_directory(data).unwrap();
        let items = Arc::new(items);
        let mut shops = ShopRegistry::new();
        shops.load_from_directory(&data.join("shops")).unwrap();

        RoomContent {
            settings: Arc::new(ServerConfig::default()),
            scripts: Arc::new(ScriptRegistry::new(data, items.clone()).unwrap()),
            items,
            shops: Arc::new(shops),
            areas: Arc::new(AreaMap::load_from_directory(data).unwrap()),
            spawns: Arc::new(load_spawns(data).unwrap()),
        }
    }

    /// Room with one connected player standing next to `npc_id`
    async fn room_with_player(npc_id: &str) -> (GameRoom, mpsc::Receiver<Vec<u8>>) {
        let room = GameRoom::new("test", shipped_content(), None);
        let at = room.npcs.read().await[npc_id].position;

        let mut player = Player::new("p1", "Hero", CharacterClass::Armsman, "Briton", 50);
        player.position = Position::new(at.region, at.x + 50, at.y, at.z, 0);
        room.reserve_player(player).await;

        let (tx, rx) = mpsc::channel(64);
        room.register_player_sender("p1", tx).await;
        (room, rx)
    }

    fn drain_types(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            let value = rmpv::decode::read_value(&mut std::io::Cursor::new(bytes)).unwrap();
            types.push(value.as_array().unwrap()[1].as_str().unwrap().to_string());
        }
        types
    }

    /// Texts of the NPC replies queued for the player
    fn drain_reply_texts(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            let value = rmpv::decode::read_value(&mut std::io::Cursor::new(bytes)).unwrap();
            let frame = value.as_array().unwrap();
            if frame[1].as_str() != Some("npcReply") {
                continue;
            }
            let text = frame[2]
                .as_map()
                .unwrap()
                .iter()
                .find(|(k, _)| k.as_str() == Some("text"))
                .and_then(|(_, v)| v.as_str())
                .unwrap();
            texts.push(text.to_string());
        }
        texts
    }

    #[tokio::test]
    async fn test_spawns_shipped_npcs() {
        let room = GameRoom::new("test", shipped_content(), None);
        assert!(room.npcs.read().await.contains_key("scholar_camelot"));
    }

    #[tokio::test]
    async fn test_interact_sends_reply_and_window() {
        let (room, mut rx) = room_with_player("buffer_camelot").await;
        room.handle_interact("p1", "buffer_camelot").await;

        let types = drain_types(&mut rx);
        assert_eq!(types, vec!["npcReply", "merchantWindow"]);
    }

    #[tokio::test]
    async fn test_unknown_npc_is_an_error() {
        let (room, mut rx) = room_with_player("buffer_camelot").await;
        room.handle_whisper("p1", "nobody", "Gold").await;
        assert_eq!(drain_types(&mut rx), vec!["error"]);
    }

    #[tokio::test]
    async fn test_teleport_whisper_moves_player_and_updates_areas() {
        let (room, mut rx) = room_with_player("helper_camelot").await;
        room.handle_whisper("p1", "helper_camelot", "Ludlow").await;

        let player = room.player_snapshot("p1").await.unwrap();
        assert_eq!(player.position.region, 1);
        assert_eq!(player.areas, vec!["Ludlow".to_string()]);
        assert!(drain_types(&mut rx).contains(&"teleport".to_string()));
    }

    #[tokio::test]
    async fn test_buy_requires_range() {
        let (room, mut rx) = room_with_player("ml_bounty").await;
        room.with_player("p1", |p| {
            p.bounty_points = 100;
            p.position.x += 10_000;
        })
        .await;

        room.handle_buy("p1", "ml_bounty", "ml1token", 1).await;
        assert_eq!(room.player_snapshot("p1").await.unwrap().bounty_points, 100);
        assert_eq!(drain_types(&mut rx), vec!["npcReply"]);
    }

    #[tokio::test]
    async fn test_buy_from_bounty_trainer() {
        let (room, mut rx) = room_with_player("ml_bounty").await;
        room.with_player("p1", |p| p.bounty_points = 100).await;

        room.handle_buy("p1", "ml_bounty", "ml1token", 1).await;
        let player = room.player_snapshot("p1").await.unwrap();
        assert_eq!(player.bounty_points, 90);
        assert!(player.inventory.has("ml1token"));
        assert_eq!(drain_types(&mut rx), vec!["npcReply", "inventoryUpdate", "currencyUpdate"]);
    }

    #[tokio::test]
    async fn test_respec_kicks_player() {
        let (room, mut rx) = room_with_player("ml_respec").await;
        room.with_player("p1", |p| {
            p.ml_line = crate::class::MlLine::Warlord;
            p.ml_level = 1;
            p.add_spell_line(&crate::class::MlLine::Warlord.spell_line(1));
        })
        .await;
        room.handle_whisper("p1", "ml_respec", "mlrespectoken").await;
        drain_types(&mut rx);

        room.handle_give_item("p1", "ml_respec", 0).await;
        let types = drain_types(&mut rx);
        assert_eq!(types.last().map(String::as_str), Some("kicked"));
        assert!(room.player_senders.read().await.get("p1").is_none());
        assert_eq!(
            room.player_snapshot("p1").await.unwrap().ml_line,
            crate::class::MlLine::Battlemaster
        );
    }

    #[tokio::test]
    async fn test_kill_respawn_cycle() {
        let (room, _rx) = room_with_player("ml_respec").await;
        room.with_player("p1", |p| p.level = 255).await;

        let mut swings = 0;
        while room.npcs.read().await["ml_respec"].alive {
            room.handle_attack("p1", "ml_respec").await;
            swings += 1;
            assert!(swings < 1000);
        }
        assert!(room.live_npc("ml_respec", now_ms()).await.is_none());

        room.maintain(now_ms() + RESPAWN_MS + 1).await;
        assert!(room.npcs.read().await["ml_respec"].alive);
    }

    #[tokio::test]
    async fn test_buying_buff_package_says_farewell() {
        let (room, mut rx) = room_with_player("buffer_camelot").await;
        room.with_player("p1", |p| p.money = 500_000).await;

        room.handle_buy("p1", "buffer_camelot", "Strength_Buff_Token", 1).await;
        let texts = drain_reply_texts(&mut rx);
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("You just bought"));
        assert_eq!(texts[1], "Fight well, Briton.");
    }

    #[tokio::test]
    async fn test_full_backpack_still_takes_mergeable_currency() {
        let (room, _rx) = room_with_player("scholar_camelot").await;
        room.with_player("p1", |p| {
            p.inventory.add_stack("atlanteanglass", "Atlantean Glass", 10, 1000);
            while p.inventory.has_space() {
                p.inventory.add_to_first_empty(InventoryItem::new("filler", "Filler", 1)).unwrap();
            }
        })
        .await;
        let at = room.player_snapshot("p1").await.unwrap().position;
        let now = now_ms();

        room.drop_on_ground(InventoryItem::new("atlanteanglass", "Atlantean Glass", 5), at, Some("p1".into()), now)
            .await;
        let glass = room.ground_items.read().await.keys().next().cloned().unwrap();
        room.handle_pickup("p1", &glass).await;
        assert_eq!(room.player_snapshot("p1").await.unwrap().inventory.count_of("atlanteanglass"), 15);
        assert!(room.ground_items.read().await.is_empty());

        room.drop_on_ground(InventoryItem::new("mlrespectoken", "Respec Token", 1), at, Some("p1".into()), now)
            .await;
        let token = room.ground_items.read().await.keys().next().cloned().unwrap();
        room.handle_pickup("p1", &token).await;
        assert!(!room.player_snapshot("p1").await.unwrap().inventory.has("mlrespectoken"));
        assert!(room.ground_items.read().await.contains_key(&token));
    }

    #[tokio::test]
    async fn test_ground_items_pickup_and_decay() {
        let (room, _rx) = room_with_player("scholar_camelot").await;
        let at = room.player_snapshot("p1").await.unwrap().position;
        let now = now_ms();

        room.drop_on_ground(InventoryItem::new("mlrespectoken", "Respec Token", 1), at, Some("p1".into()), now)
            .await;
        let id = room.ground_items.read().await.keys().next().cloned().unwrap();
        room.handle_pickup("p1", &id).await;
        assert!(room.player_snapshot("p1").await.unwrap().inventory.has("mlrespectoken"));
        assert!(room.ground_items.read().await.is_empty());

        room.drop_on_ground(InventoryItem::new("junk", "Junk", 1), at, None, now).await;
        room.maintain(now + GROUND_ITEM_LIFETIME_MS + 1).await;
        assert!(room.ground_items.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_summon_helper_replaces_previous() {
        let (room, _rx) = room_with_player("scholar_camelot").await;
        room.handle_summon_helper("p1").await;
        room.handle_summon_helper("p1").await;

        let helpers = room
            .npcs
            .read()
            .await
            .values()
            .filter(|n| n.owner_id.as_deref() == Some("p1"))
            .count();
        assert_eq!(helpers, 1);

        room.remove_player("p1").await;
        assert!(room.npcs.read().await.values().all(|n| n.owner_id.is_none()));
    }

    #[tokio::test]
    async fn test_move_updates_position() {
        let (room, _rx) = room_with_player("scholar_camelot").await;
        room.handle_move("p1", Some(201), 33785, 32054, 8047, 0).await;
        let player = room.player_snapshot("p1").await.unwrap();
        assert_eq!(player.position.region, 201);
        assert_eq!(player.areas, vec!["Tir na Nog".to_string()]);
    }
}
