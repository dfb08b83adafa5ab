//! Buff Merchant: sells buff tokens and casts them when handed back.

use tracing::info;

use crate::class::CharacterClass;
use crate::item::InventoryItem;
use crate::npc::NpcInstance;
use crate::player::{ActiveBuff, Player};
use crate::responder::{Effect, Responder, ScriptContext};
use crate::script::{ScriptBook, BASE_AF_SPELL};

/// Catalog sold for gold
pub const GOLD_SHOP: &str = "BuffTokens";
/// Catalog sold for bounty points
pub const BOUNTY_SHOP: &str = "BPBuffTokens";

fn currency_key(npc_id: &str) -> String {
    format!("merchant_currency:{}", npc_id)
}

/// Catalog the player last picked at this merchant
pub fn selected_shop(player: &Player, npc: &NpcInstance) -> String {
    player
        .temp(&currency_key(&npc.id))
        .unwrap_or(GOLD_SHOP)
        .to_string()
}

fn buff(book: &ScriptBook, key: &str, expires_at: u64) -> Option<ActiveBuff> {
    let Some(spell) = book.buffs.spell(key) else {
        tracing::warn!("Buff table has no spell '{}'", key);
        return None;
    };
    Some(ActiveBuff {
        spell: key.to_string(),
        name: spell.name.clone(),
        kind: spell.kind,
        value: spell.value,
        expires_at,
    })
}

/// Spells a token casts for a class, or None when the id is not a token
fn token_buffs(book: &ScriptBook, class: CharacterClass, token_id: &str, expires_at: u64) -> Option<Vec<ActiveBuff>> {
    let token = book.buffs.token(token_id)?;
    let skip_base_af = token.respect_self_af && book.buffs.has_self_af(class);
    Some(
        token
            .spells
            .iter()
            .filter(|key| !(skip_base_af && key.as_str() == BASE_AF_SPELL))
            .filter_map(|key| buff(book, key, expires_at))
            .collect(),
    )
}

/// Everything a purchased buff package casts, including the always-cast spell
pub fn package_buffs(
    book: &ScriptBook,
    class: CharacterClass,
    token_id: &str,
    expires_at: u64,
) -> Option<Vec<ActiveBuff>> {
    let mut buffs = token_buffs(book, class, token_id, expires_at)?;
    if let Some(always) = buff(book, &book.buffs.always_cast, expires_at) {
        buffs.insert(0, always);
    }
    Some(buffs)
}

/// Parting line once a buff package has been cast
pub fn farewell(book: &ScriptBook, race_name: &str) -> String {
    book.buffs.messages.farewell.replace("{race}", race_name)
}

fn cast(ctx: &mut ScriptContext<'_>, buff: ActiveBuff) {
    ctx.player.apply_buff(buff.clone());
    ctx.effect(Effect::BuffApplied(buff));
}

pub struct BuffMerchant;

impl Responder for BuffMerchant {
    fn interact(&self, ctx: &mut ScriptContext<'_>) -> bool {
        let book = ctx.book;
        let greeting = book.buffs.messages.greeting.replace("{name}", &ctx.player.name);
        ctx.say(greeting);

        let key = currency_key(&ctx.npc.id);
        ctx.player.set_temp(&key, GOLD_SHOP.to_string());
        ctx.effect(Effect::MerchantWindow { shop_id: GOLD_SHOP.to_string() });
        true
    }

    fn whisper(&self, ctx: &mut ScriptContext<'_>, text: &str) -> bool {
        let shop = match text {
            "Gold" => GOLD_SHOP,
            "Bounty Points" => BOUNTY_SHOP,
            _ => return true,
        };
        let key = currency_key(&ctx.npc.id);
        ctx.player.set_temp(&key, shop.to_string());
        ctx.effect(Effect::MerchantWindow { shop_id: shop.to_string() });
        true
    }

    fn receive_item(&self, ctx: &mut ScriptContext<'_>, item: &InventoryItem) -> bool {
        if !ctx.in_range() {
            return false;
        }

        let book = ctx.book;
        let expires_at = ctx.now + ctx.settings.buff_duration_secs * 1000;
        if let Some(always) = buff(book, &book.buffs.always_cast, expires_at) {
            cast(ctx, always);
        }

        let Some(buffs) = token_buffs(book, ctx.player.class, &item.id_nb, expires_at) else {
            return false;
        };
        for buff in buffs {
            cast(ctx, buff);
        }

        ctx.say(farewell(book, &ctx.player.race_name));
        ctx.take(item);
        info!("{} redeemed buff token {}", ctx.player.name, item.id_nb);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::NpcKind;
    use crate::responder::tests::{npc, player, Fixture};
    use crate::responder::{dispatch, Stimulus};
    use crate::script::SpellKind;

    fn spells(player: &Player) -> Vec<&str> {
        player.buffs.iter().map(|b| b.spell.as_str()).collect()
    }

    #[test]
    fn test_interact_resets_currency_and_opens_gold_window() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Armsman);
        let key = currency_key(&npc.id);
        player.set_temp(&key, BOUNTY_SHOP.to_string());

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(dispatch(&BuffMerchant, &mut ctx, &Stimulus::Interact));
        assert!(ctx.out.texts()[0].starts_with("Greetings, Hero."));
        assert!(ctx.out.has_effect(|e| *e == Effect::MerchantWindow { shop_id: GOLD_SHOP.to_string() }));
        drop(ctx);
        assert_eq!(selected_shop(&player, &npc), GOLD_SHOP);
    }

    #[test]
    fn test_whisper_selects_currency() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Armsman);

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(dispatch(&BuffMerchant, &mut ctx, &Stimulus::Whisper("Bounty Points".into())));
        assert!(dispatch(&BuffMerchant, &mut ctx, &Stimulus::Whisper("bounty points".into())));
        assert_eq!(ctx.out.effects.len(), 1);
        drop(ctx);
        assert_eq!(selected_shop(&player, &npc), BOUNTY_SHOP);
    }

    #[test]
    fn test_full_token_casts_and_is_consumed() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Armsman);
        player.inventory.add_to_first_empty(fixture.item("Full_Buffs_Token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(dispatch(&BuffMerchant, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert_eq!(ctx.out.texts().last().copied(), Some("Fight well, Briton."));
        drop(ctx);

        let cast = spells(&player);
        assert_eq!(cast[0], "speed");
        assert!(cast.contains(&"base_af"));
        assert!(cast.contains(&"spec_af"));
        assert!(!player.inventory.has("Full_Buffs_Token"));

        let expected = 1_000 + fixture.settings.buff_duration_secs * 1000;
        assert!(player.buffs.iter().all(|b| b.expires_at == expected));
        // Base and spec AF are separate spells and stack
        let af = player.buffs.iter().filter(|b| b.kind == SpellKind::ArmorFactorBuff).count();
        assert_eq!(af, 2);
    }

    #[test]
    fn test_self_af_class_skips_base_af() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Wizard);
        player.inventory.add_to_first_empty(fixture.item("Baseline_Buffs_Token")).unwrap();
        player.inventory.add_to_first_empty(fixture.item("Armor_Buff_Token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        dispatch(&BuffMerchant, &mut ctx, &Stimulus::ReceiveItem { slot: 0 });
        drop(ctx);
        assert!(!spells(&player).contains(&"base_af"));

        // The armor token ignores the self-AF rule
        let mut ctx = fixture.ctx(&npc, &mut player);
        dispatch(&BuffMerchant, &mut ctx, &Stimulus::ReceiveItem { slot: 1 });
        drop(ctx);
        assert!(spells(&player).contains(&"base_af"));
    }

    #[test]
    fn test_unknown_item_still_gets_speed() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Armsman);
        player.inventory.add_to_first_empty(fixture.item("atlanteanglass")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!dispatch(&BuffMerchant, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        drop(ctx);
        assert_eq!(spells(&player), vec!["speed"]);
        assert!(player.inventory.has("atlanteanglass"));
    }

    #[test]
    fn test_too_far_away() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::BuffMerchant);
        let mut player = player(CharacterClass::Armsman);
        player.position.x += 5_000;
        player.inventory.add_to_first_empty(fixture.item("Full_Buffs_Token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!dispatch(&BuffMerchant, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        drop(ctx);
        assert!(player.buffs.is_empty());
        assert!(player.inventory.has("Full_Buffs_Token"));
    }

    #[test]
    fn test_package_buffs_leads_with_speed() {
        let fixture = Fixture::shipped();
        let buffs = package_buffs(&fixture.book, CharacterClass::Armsman, "BPStrength_Buff_Token", 10).unwrap();
        let keys: Vec<_> = buffs.iter().map(|b| b.spell.as_str()).collect();
        assert_eq!(keys, vec!["speed", "str"]);
        assert!(package_buffs(&fixture.book, CharacterClass::Armsman, "ml1token", 10).is_none());
    }
}
