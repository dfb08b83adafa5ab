//! Master Level respec: swaps a player's ML line for the other line of
//! their class pair, keeping the level.

use tracing::info;

use crate::class::MlLine;
use crate::item::InventoryItem;
use crate::responder::{Effect, Responder, ScriptContext};

pub struct MlRespec;

impl Responder for MlRespec {
    fn interact(&self, ctx: &mut ScriptContext<'_>) -> bool {
        let book = ctx.book;
        let messages = &book.master_level.messages;
        ctx.say(messages.respec_greeting.as_str());
        ctx.say(messages.respec_offer.as_str());
        true
    }

    fn whisper(&self, ctx: &mut ScriptContext<'_>, text: &str) -> bool {
        let book = ctx.book;
        if text == book.master_level.respec_token {
            ctx.give_template(&book.master_level.respec_token, true);
        }
        true
    }

    fn receive_item(&self, ctx: &mut ScriptContext<'_>, item: &InventoryItem) -> bool {
        if !ctx.in_range() {
            return false;
        }
        let book = ctx.book;
        let table = &book.master_level;

        let old = ctx.player.ml_line;
        if old == MlLine::None {
            ctx.say(table.messages.respec_no_levels.as_str());
            return false;
        }
        if item.id_nb != table.respec_token {
            return false;
        }

        let Some((a, b)) = table.pair_for(ctx.player.class) else {
            ctx.say(table.messages.respec_no_pair.as_str());
            return false;
        };
        let new = if old == a { b } else { a };

        if !ctx.take(item) {
            ctx.say(table.messages.cannot_take_item.as_str());
            return false;
        }

        let player = &mut *ctx.player;
        for level in 1..=player.ml_level {
            player.remove_spell_line(&old.spell_line(level));
            player.add_spell_line(&new.spell_line(level));
        }
        player.ml_line = new;

        info!(
            "{} respecced Master Levels from {} to {}",
            ctx.player.name,
            old.name(),
            new.name()
        );
        ctx.effect(Effect::Save);
        ctx.effect(Effect::Quit);
        true
    }
}
