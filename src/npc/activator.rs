//! Artifact Activator: claims an artifact from its book, then activates the
//! variant the player whispers.

use tracing::info;

use crate::item::InventoryItem;
use crate::responder::{Responder, ScriptContext};
use crate::script::{Activation, BookCase};

pub struct ArtifactActivator;

impl ArtifactActivator {
    fn redeem(&self, ctx: &mut ScriptContext<'_>, case: &BookCase) {
        let inventory = &ctx.player.inventory;

        if inventory.has(&case.artifact) && inventory.is_activated(&case.artifact) {
            ctx.say(case.already.as_str());
            return;
        }

        if inventory.has(&case.requires) && !inventory.is_activated(&case.inactive) {
            if !case.admits(ctx.player.class) {
                ctx.say(case.denied.as_str());
                return;
            }
            for line in &case.congrats {
                ctx.say(line.as_str());
            }
            for id in &case.consumes {
                ctx.remove_first(id);
            }
            self.claim(ctx, &case.claims);
        } else if case.deny_when_missing {
            ctx.say(case.denied.as_str());
        }
    }

    /// Offer the variants of a held artifact
    fn claim(&self, ctx: &mut ScriptContext<'_>, artifact: &str) {
        let book = ctx.book;
        let offer = ctx
            .player
            .inventory
            .first_by_id(artifact)
            .and_then(|held| book.activator.offer(&held.id_nb));

        match offer {
            Some(text) => {
                ctx.system_popup(text);
                info!("{} claimed artifact {}", ctx.player.name, artifact);
            }
            None => ctx.say(book.activator.messages.not_implemented.as_str()),
        }
    }

    fn activate(&self, ctx: &mut ScriptContext<'_>, activation: &Activation) {
        let book = ctx.book;
        if !ctx.player.inventory.has(&activation.artifact) {
            ctx.say(book.activator.messages.missing_artifact.as_str());
            return;
        }

        match &activation.grant {
            Some(grant) => {
                let Some(def) = ctx.items.get(grant) else {
                    tracing::warn!("Activation '{}' grants unknown item '{}'", activation.phrase, grant);
                    ctx.say(book.activator.messages.not_implemented.as_str());
                    return;
                };
                ctx.remove_first(&activation.artifact);
                ctx.give(def.instantiate(1).activated(), false);
            }
            None => {
                ctx.player.inventory.set_activated(&activation.artifact);
                ctx.inventory_changed();
            }
        }

        if let Some(reply) = &activation.reply {
            ctx.say(reply.as_str());
        }
        info!(
            "{} activated {} as '{}'",
            ctx.player.name, activation.artifact, activation.phrase
        );
    }
}

impl Responder for ArtifactActivator {
    fn interact(&self, ctx: &mut ScriptContext<'_>) -> bool {
        let book = ctx.book;
        ctx.system_popup(book.activator.messages.greeting.as_str());
        false
    }

    fn whisper(&self, ctx: &mut ScriptContext<'_>, text: &str) -> bool {
        let book = ctx.book;
        if let Some(activation) = book.activator.activation(text) {
            self.activate(ctx, activation);
        }
        true
    }

    fn receive_item(&self, ctx: &mut ScriptContext<'_>, item: &InventoryItem) -> bool {
        let book = ctx.book;
        if let Some(case) = book.activator.book(&item.id_nb) {
            self.redeem(ctx, case);
        }
        false
    }
}
