//! Teleporter helper and the summonable portable helper.
//!
//! The teleporter is a buff merchant first: its hooks run the merchant's
//! behavior before offering region-routed destination menus.

use rand::Rng;
use tracing::info;

use super::{BuffMerchant, NpcInstance, NpcKind};
use crate::class::Realm;
use crate::config::ServerConfig;
use crate::item::InventoryItem;
use crate::player::{Player, Position};
use crate::responder::{Effect, Responder, ScriptContext};

pub const PORTABLE_HELPER_GUILD: &str = "Portable Helper";

/// `[A], [B]` with destinations the player is standing in left out
fn format_entries(entries: &[String], areas: &[String]) -> String {
    entries
        .iter()
        .filter(|name| !areas.contains(name))
        .map(|name| format!("[{}]", name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct Teleporter;

impl Responder for Teleporter {
    fn interact(&self, ctx: &mut ScriptContext<'_>) -> bool {
        BuffMerchant.interact(ctx);

        let book = ctx.book;
        let teleporter = &book.teleporter;
        let realm = ctx.player.realm;
        for menu in teleporter.menus_for(ctx.player.position.region, realm) {
            let list = format_entries(menu.entries, &ctx.player.areas);
            ctx.say(format!("{}{}", menu.header, list));
        }

        if realm != Realm::None {
            if let Some(capitals) = teleporter.capitals_for(realm) {
                let list = format_entries(capitals, &ctx.player.areas);
                if !list.is_empty() {
                    ctx.say(format!("{}{}", teleporter.messages.capitals_header, list));
                }
            }
        }
        true
    }

    fn whisper(&self, ctx: &mut ScriptContext<'_>, text: &str) -> bool {
        if !BuffMerchant.whisper(ctx, text) {
            return false;
        }

        let realm = ctx.player.realm;
        if realm == Realm::None {
            return true;
        }

        let book = ctx.book;
        let Some(dest) = book.teleporter.destination(realm, text) else {
            return false;
        };

        if ctx.player.in_combat || ctx.player.carrying_relic {
            return true;
        }

        let target = Position::new(dest.region, dest.x, dest.y, dest.z, dest.heading);
        ctx.player.position = target;
        ctx.effect(Effect::Teleport(target));
        info!("{} teleported to {} (region {})", ctx.player.name, dest.name, dest.region);
        true
    }

    fn receive_item(&self, ctx: &mut ScriptContext<'_>, item: &InventoryItem) -> bool {
        BuffMerchant.receive_item(ctx, item)
    }
}

/// Spawn a personal teleporter next to the caster
pub fn summon_portable_helper(
    caster: &Player,
    settings: &ServerConfig,
    now: u64,
) -> Result<NpcInstance, &'static str> {
    if settings
        .portable_helper_forbidden_regions
        .contains(&caster.position.region)
    {
        return Err("You can't summon Helper in this Region !");
    }

    let mut rng = rand::thread_rng();
    let mut offset = || rng.gen_range(20..=40) - rng.gen_range(20..=40);
    let origin = caster.position;
    let position = Position::new(
        origin.region,
        origin.x + offset(),
        origin.y + offset(),
        origin.z,
        ((u32::from(origin.heading) + 2048) % 4096) as u16,
    );

    let max_hp = super::max_hp_for_level(50);
    Ok(NpcInstance {
        id: format!("helper_{}", uuid::Uuid::new_v4()),
        name: format!("{}'s Helper", caster.name),
        guild: PORTABLE_HELPER_GUILD.to_string(),
        kind: NpcKind::Teleporter,
        level: 50,
        realm: caster.realm,
        position,
        shop: None,
        loot: Vec::new(),
        hp: max_hp,
        max_hp,
        alive: true,
        respawn_at: None,
        expires_at: Some(now + settings.portable_helper_secs * 1000),
        owner_id: Some(caster.id.clone()),
    })
}
