//! Artifact Scholar: transcribes a full scroll set into an artifact book.

use tracing::info;

use crate::item::InventoryItem;
use crate::responder::{Responder, ScriptContext};
use crate::script::ScrollCase;

pub struct ArtifactScholar;

impl ArtifactScholar {
    fn transcribe(&self, ctx: &mut ScriptContext<'_>, case: &ScrollCase) {
        let book = ctx.book;
        let inventory = &ctx.player.inventory;

        if inventory.has(&case.owned) && inventory.is_activated(&case.activated) {
            ctx.say(case.already.as_str());
            return;
        }

        let ready = inventory.has(&case.requires)
            && !inventory.is_activated(&case.requires_inactive)
            && case.checks.iter().all(|id| inventory.has(id));
        if !ready {
            ctx.say(book.scholar.messages.missing_materials.as_str());
            return;
        }

        ctx.say(book.scholar.messages.transcribed.as_str());
        for id in &case.consumes {
            ctx.remove_first(id);
        }
        ctx.give_template(&case.book, false);
        info!("{} had {} transcribed into {}", ctx.player.name, case.trigger, case.book);
    }
}

impl Responder for ArtifactScholar {
    fn receive_item(&self, ctx: &mut ScriptContext<'_>, item: &InventoryItem) -> bool {
        let book = ctx.book;
        match book.scholar.case(&item.id_nb) {
            Some(case) => self.transcribe(ctx, case),
            None => ctx.say(book.scholar.messages.unknown_item.as_str()),
        }
        false
    }
}
