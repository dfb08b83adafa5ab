use rmpv::Value;
use serde::Serialize;

use crate::item::{GroundItemUpdate, InventorySlotUpdate};
use crate::npc::NpcUpdate;
use crate::shop::CatalogEntry;

/// Colyseus ROOM_DATA code that prefixes every frame
const ROOM_DATA: u64 = 13;

// ============================================================================
// Client -> Server Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Move {
        region: Option<u16>,
        x: i32,
        y: i32,
        z: i32,
        heading: u16,
    },

    /// Right-click on an NPC
    Interact { npc_id: String },

    /// Keyword whispered to an NPC, usually a clicked `[choice]`
    Whisper { npc_id: String, text: String },

    /// Hand the item in a backpack slot to an NPC
    GiveItem { npc_id: String, slot: u8 },

    Buy {
        npc_id: String,
        item_id: String,
        quantity: i32,
    },

    Attack { npc_id: String },

    Pickup { ground_item_id: String },

    SummonHelper,
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

#[derive(Debug, Clone)]
pub enum ServerMessage {
    Welcome {
        player_id: String,
        name: String,
        class: String,
        realm: String,
        level: u8,
        region: u16,
        x: i32,
        y: i32,
        z: i32,
        heading: u16,
    },
    ItemDefinitions {
        items: Vec<ClientItemDef>,
    },
    NpcList {
        npcs: Vec<NpcUpdate>,
    },
    /// Text produced by an NPC hook
    NpcReply {
        npc_id: String,
        npc_name: String,
        text: String,
        chat_type: &'static str,
        loc: &'static str,
    },
    InventoryUpdate {
        player_id: String,
        slots: Vec<InventorySlotUpdate>,
    },
    CurrencyUpdate {
        money: i64,
        bounty_points: i64,
    },
    Teleport {
        region: u16,
        x: i32,
        y: i32,
        z: i32,
        heading: u16,
    },
    MerchantWindow {
        npc_id: String,
        shop_id: String,
        title: String,
        currency: String,
        entries: Vec<CatalogEntry>,
    },
    GroundItemSpawned {
        item: GroundItemUpdate,
    },
    GroundItemRemoved {
        id: String,
    },
    NpcSpawned {
        npc: NpcUpdate,
    },
    NpcRemoved {
        id: String,
    },
    BuffApplied {
        spell: String,
        name: String,
        value: f32,
        expires_at: u64,
    },
    Kicked {
        reason: String,
    },
    Error {
        code: u32,
        message: String,
    },
}

/// Item template summary sent once on join
#[derive(Debug, Clone, Serialize)]
pub struct ClientItemDef {
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub max_stack: i32,
    pub description: String,
}

impl ServerMessage {
    pub fn msg_type(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::ItemDefinitions { .. } => "itemDefinitions",
            ServerMessage::NpcList { .. } => "npcList",
            ServerMessage::NpcReply { .. } => "npcReply",
            ServerMessage::InventoryUpdate { .. } => "inventoryUpdate",
            ServerMessage::CurrencyUpdate { .. } => "currencyUpdate",
            ServerMessage::Teleport { .. } => "teleport",
            ServerMessage::MerchantWindow { .. } => "merchantWindow",
            ServerMessage::GroundItemSpawned { .. } => "groundItemSpawned",
            ServerMessage::GroundItemRemoved { .. } => "groundItemRemoved",
            ServerMessage::NpcSpawned { .. } => "npcSpawned",
            ServerMessage::NpcRemoved { .. } => "npcRemoved",
            ServerMessage::BuffApplied { .. } => "buffApplied",
            ServerMessage::Kicked { .. } => "kicked",
            ServerMessage::Error { .. } => "error",
        }
    }
}

// ============================================================================
// Encoding/Decoding
// ============================================================================

fn s(text: &str) -> Value {
    Value::String(text.into())
}

fn int(n: impl Into<i64>) -> Value {
    Value::Integer(n.into().into())
}

fn uint(n: u64) -> Value {
    Value::Integer(n.into())
}

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (s(k), v)).collect())
}

fn npc_value(npc: &NpcUpdate) -> Value {
    map(vec![
        ("id", s(&npc.id)),
        ("name", s(&npc.name)),
        ("guild", s(&npc.guild)),
        ("kind", s(&npc.kind)),
        ("level", int(npc.level)),
        ("realm", s(&npc.realm)),
        ("region", int(npc.region)),
        ("x", int(npc.x)),
        ("y", int(npc.y)),
        ("z", int(npc.z)),
        ("heading", int(npc.heading)),
        ("hp", int(npc.hp)),
        ("maxHp", int(npc.max_hp)),
        ("alive", Value::Boolean(npc.alive)),
    ])
}

fn ground_item_value(item: &GroundItemUpdate) -> Value {
    map(vec![
        ("id", s(&item.id)),
        ("itemId", s(&item.item_id)),
        ("name", s(&item.name)),
        ("region", int(item.region)),
        ("x", int(item.x)),
        ("y", int(item.y)),
        ("quantity", int(item.quantity)),
    ])
}

/// Encode a server message to MessagePack format
/// Format: [13, "msg_type", {data}] (matching Colyseus ROOM_DATA protocol)
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, String> {
    let data = match msg {
        ServerMessage::Welcome { player_id, name, class, realm, level, region, x, y, z, heading } => map(vec![
            ("playerId", s(player_id)),
            ("name", s(name)),
            ("class", s(class)),
            ("realm", s(realm)),
            ("level", int(*level)),
            ("region", int(*region)),
            ("x", int(*x)),
            ("y", int(*y)),
            ("z", int(*z)),
            ("heading", int(*heading)),
        ]),
        ServerMessage::ItemDefinitions { items } => {
            let item_values = items
                .iter()
                .map(|item| {
                    map(vec![
                        ("id", s(&item.id)),
                        ("display_name", s(&item.display_name)),
                        ("category", s(&item.category)),
                        ("max_stack", int(item.max_stack)),
                        ("description", s(&item.description)),
                    ])
                })
                .collect();
            map(vec![("items", Value::Array(item_values))])
        }
        ServerMessage::NpcList { npcs } => {
            map(vec![("npcs", Value::Array(npcs.iter().map(npc_value).collect()))])
        }
        ServerMessage::NpcReply { npc_id, npc_name, text, chat_type, loc } => map(vec![
            ("npcId", s(npc_id)),
            ("npcName", s(npc_name)),
            ("text", s(text)),
            ("chatType", s(chat_type)),
            ("loc", s(loc)),
        ]),
        ServerMessage::InventoryUpdate { player_id, slots } => {
            let slot_values = slots
                .iter()
                .map(|slot| {
                    map(vec![
                        ("slot", int(slot.slot)),
                        ("itemId", s(&slot.item_id)),
                        ("name", s(&slot.name)),
                        ("quantity", int(slot.quantity)),
                        ("activated", Value::Boolean(slot.activated)),
                    ])
                })
                .collect();
            map(vec![("playerId", s(player_id)), ("slots", Value::Array(slot_values))])
        }
        ServerMessage::CurrencyUpdate { money, bounty_points } => map(vec![
            ("money", int(*money)),
            ("bountyPoints", int(*bounty_points)),
        ]),
        ServerMessage::Teleport { region, x, y, z, heading } => map(vec![
            ("region", int(*region)),
            ("x", int(*x)),
            ("y", int(*y)),
            ("z", int(*z)),
            ("heading", int(*heading)),
        ]),
        ServerMessage::MerchantWindow { npc_id, shop_id, title, currency, entries } => {
            let entry_values = entries
                .iter()
                .map(|entry| {
                    map(vec![
                        ("itemId", s(&entry.item_id)),
                        ("name", s(&entry.name)),
                        ("price", int(entry.price)),
                        ("maxStack", int(entry.max_stack)),
                    ])
                })
                .collect();
            map(vec![
                ("npcId", s(npc_id)),
                ("shopId", s(shop_id)),
                ("title", s(title)),
                ("currency", s(currency)),
                ("entries", Value::Array(entry_values)),
            ])
        }
        ServerMessage::GroundItemSpawned { item } => ground_item_value(item),
        ServerMessage::GroundItemRemoved { id } => map(vec![("id", s(id))]),
        ServerMessage::NpcSpawned { npc } => npc_value(npc),
        ServerMessage::NpcRemoved { id } => map(vec![("id", s(id))]),
        ServerMessage::BuffApplied { spell, name, value, expires_at } => map(vec![
            ("spell", s(spell)),
            ("name", s(name)),
            ("value", Value::F64(f64::from(*value))),
            ("expiresAt", uint(*expires_at)),
        ]),
        ServerMessage::Kicked { reason } => map(vec![("reason", s(reason))]),
        ServerMessage::Error { code, message } => map(vec![
            ("code", int(*code)),
            ("message", s(message)),
        ]),
    };

    let array = Value::Array(vec![uint(ROOM_DATA), s(msg.msg_type()), data]);

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &array)
        .map_err(|e| format!("Failed to encode message: {}", e))?;

    Ok(buf)
}

/// Decode a client message from MessagePack format
/// Expected format: [13, "msg_type", {data}]
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, String> {
    use std::io::Cursor;

    let mut cursor = Cursor::new(data);
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| format!("Failed to decode MessagePack: {}", e))?;

    let array = value.as_array().ok_or("Expected array")?;

    if array.len() < 2 {
        return Err("Array too short".to_string());
    }

    let protocol = array[0].as_u64().ok_or("Protocol code must be integer")?;

    if protocol != ROOM_DATA {
        return Err(format!("Unexpected protocol code: {}", protocol));
    }

    let msg_type = array[1].as_str().ok_or("Message type must be string")?;

    let msg_data = if array.len() > 2 { &array[2] } else { &Value::Nil };

    let npc_id = || extract_string(msg_data, "npcId").ok_or("Missing npcId");

    match msg_type {
        "move" => Ok(ClientMessage::Move {
            region: extract_i64(msg_data, "region").and_then(|r| u16::try_from(r).ok()),
            x: extract_i32(msg_data, "x").unwrap_or(0),
            y: extract_i32(msg_data, "y").unwrap_or(0),
            z: extract_i32(msg_data, "z").unwrap_or(0),
            heading: extract_i64(msg_data, "heading")
                .and_then(|h| u16::try_from(h).ok())
                .unwrap_or(0),
        }),
        "interact" => Ok(ClientMessage::Interact { npc_id: npc_id()? }),
        "whisper" => {
            let text = extract_string(msg_data, "text").unwrap_or_default();
            Ok(ClientMessage::Whisper { npc_id: npc_id()?, text })
        }
        "giveItem" => {
            let slot = extract_i64(msg_data, "slot")
                .and_then(|s| u8::try_from(s).ok())
                .ok_or("Missing slot")?;
            Ok(ClientMessage::GiveItem { npc_id: npc_id()?, slot })
        }
        "buy" => {
            let item_id = extract_string(msg_data, "itemId").ok_or("Missing itemId")?;
            let quantity = extract_i32(msg_data, "quantity").unwrap_or(1);
            Ok(ClientMessage::Buy { npc_id: npc_id()?, item_id, quantity })
        }
        "attack" => Ok(ClientMessage::Attack { npc_id: npc_id()? }),
        "pickup" => {
            let ground_item_id = extract_string(msg_data, "groundItemId").ok_or("Missing groundItemId")?;
            Ok(ClientMessage::Pickup { ground_item_id })
        }
        "summonHelper" => Ok(ClientMessage::SummonHelper),
        _ => Err(format!("Unknown message type: {}", msg_type)),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_map()
        .and_then(|map| map.iter().find(|(k, _)| k.as_str() == Some(key)))
        .map(|(_, v)| v)
}

fn extract_string(value: &Value, key: &str) -> Option<String> {
    field(value, key).and_then(|v| v.as_str().map(|s| s.to_string()))
}

fn extract_i64(value: &Value, key: &str) -> Option<i64> {
    field(value, key).and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
    })
}

fn extract_i32(value: &Value, key: &str) -> Option<i32> {
    extract_i64(value, key).and_then(|i| i32::try_from(i).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(msg_type: &str, data: Value) -> Vec<u8> {
        let array = Value::Array(vec![uint(13), s(msg_type), data]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &array).unwrap();
        buf
    }

    fn decode_frame(bytes: &[u8]) -> (String, Value) {
        let value = rmpv::decode::read_value(&mut std::io::Cursor::new(bytes)).unwrap();
        let array = value.as_array().unwrap().clone();
        assert_eq!(array[0].as_u64(), Some(13));
        (array[1].as_str().unwrap().to_string(), array[2].clone())
    }

    #[test]
    fn test_decode_whisper() {
        let bytes = frame(
            "whisper",
            map(vec![("npcId", s("helper_camelot")), ("text", s("Camelot City"))]),
        );
        assert_eq!(
            decode_client_message(&bytes).unwrap(),
            ClientMessage::Whisper {
                npc_id: "helper_camelot".to_string(),
                text: "Camelot City".to_string()
            }
        );
    }

    #[test]
    fn test_decode_give_item_and_buy() {
        let give = frame("giveItem", map(vec![("npcId", s("scholar")), ("slot", int(3))]));
        assert_eq!(
            decode_client_message(&give).unwrap(),
            ClientMessage::GiveItem { npc_id: "scholar".to_string(), slot: 3 }
        );

        let buy = frame("buy", map(vec![("npcId", s("ml_glass")), ("itemId", s("ml2token"))]));
        assert_eq!(
            decode_client_message(&buy).unwrap(),
            ClientMessage::Buy {
                npc_id: "ml_glass".to_string(),
                item_id: "ml2token".to_string(),
                quantity: 1
            }
        );
    }

    #[test]
    fn test_decode_move_without_region() {
        let bytes = frame("move", map(vec![("x", int(100)), ("y", int(-5)), ("heading", int(2048))]));
        assert_eq!(
            decode_client_message(&bytes).unwrap(),
            ClientMessage::Move { region: None, x: 100, y: -5, z: 0, heading: 2048 }
        );
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert_eq!(
            decode_client_message(&frame("dance", Value::Nil)).unwrap_err(),
            "Unknown message type: dance"
        );
        assert_eq!(
            decode_client_message(&frame("interact", map(vec![]))).unwrap_err(),
            "Missing npcId"
        );

        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &Value::Array(vec![uint(13)])).unwrap();
        assert_eq!(decode_client_message(&buf).unwrap_err(), "Array too short");

        buf.clear();
        rmpv::encode::write_value(&mut buf, &s("hello")).unwrap();
        assert_eq!(decode_client_message(&buf).unwrap_err(), "Expected array");
    }

    #[test]
    fn test_encode_npc_reply() {
        let bytes = encode_server_message(&ServerMessage::NpcReply {
            npc_id: "scholar_camelot".to_string(),
            npc_name: "Master Scholar".to_string(),
            text: "I don't want that item.".to_string(),
            chat_type: "say",
            loc: "popup",
        })
        .unwrap();

        let (msg_type, data) = decode_frame(&bytes);
        assert_eq!(msg_type, "npcReply");
        assert_eq!(field(&data, "chatType").and_then(|v| v.as_str()), Some("say"));
        assert_eq!(field(&data, "text").and_then(|v| v.as_str()), Some("I don't want that item."));
    }

    #[test]
    fn test_encode_merchant_window() {
        let bytes = encode_server_message(&ServerMessage::MerchantWindow {
            npc_id: "ml_glass".to_string(),
            shop_id: "ml_glass".to_string(),
            title: "Master Level Tokens".to_string(),
            currency: "Atlantean Glass".to_string(),
            entries: vec![CatalogEntry {
                item_id: "ml1token".to_string(),
                name: "Master Level 1 Token".to_string(),
                price: 10,
                max_stack: 1,
            }],
        })
        .unwrap();

        let (msg_type, data) = decode_frame(&bytes);
        assert_eq!(msg_type, "merchantWindow");
        let entries = field(&data, "entries").and_then(|v| v.as_array()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(field(&entries[0], "price").and_then(|v| v.as_i64()), Some(10));
    }
}
