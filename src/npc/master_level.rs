//! Master Level trainers. Tokens bought from the trainer's catalog are handed
//! back to open a path (ML1) or to advance along it (ML2 to ML10).

use tracing::info;

use crate::class::MlLine;
use crate::item::InventoryItem;
use crate::player::ML_HANDED_ITEM;
use crate::responder::{Effect, Responder, ScriptContext};

const ML1_TOKEN: &str = "ml1token";
const MAX_ML: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerCurrency {
    /// Catalog priced in Atlantean Glass
    Glass,
    BountyPoints,
}

impl TrainerCurrency {
    pub fn default_shop(self) -> &'static str {
        match self {
            TrainerCurrency::Glass => "ml_glass",
            TrainerCurrency::BountyPoints => "ml_bounty",
        }
    }
}

/// Level granted by an `mlNtoken`, for N in 2..=10
fn token_level(id_nb: &str) -> Option<u8> {
    let n: u8 = id_nb.strip_prefix("ml")?.strip_suffix("token")?.parse().ok()?;
    (2..=MAX_ML).contains(&n).then_some(n)
}

pub struct MlTrainer {
    pub currency: TrainerCurrency,
}

impl MlTrainer {
    fn start(&self, ctx: &mut ScriptContext<'_>, line: MlLine) {
        let player = &mut *ctx.player;
        player.ml_line = line;
        player.ml_level = 1;
        player.ml_granted = false;
        player.ml_experience = 0;
        let spell_line = line.spell_line(1);
        player.add_spell_line(&spell_line);

        ctx.say(format!("You have gained {}.", spell_line));
        ctx.effect(Effect::Save);
        info!("{} started Master Level path {}", ctx.player.name, line.name());
    }

    fn raise(&self, ctx: &mut ScriptContext<'_>, item: &InventoryItem, level: u8) {
        let Some(line) = MlLine::SEARCH_ORDER
            .iter()
            .copied()
            .find(|l| ctx.player.has_spell_line(&l.spell_line(level - 1)))
        else {
            return;
        };

        if !ctx.take(item) {
            let book = ctx.book;
            ctx.say(book.master_level.messages.cannot_take_item.as_str());
            return;
        }

        let spell_line = line.spell_line(level);
        let player = &mut *ctx.player;
        player.ml_line = line;
        player.ml_level = level;
        player.ml_granted = false;
        player.ml_experience = 0;
        player.add_spell_line(&spell_line);
        ctx.say(format!("You have gained {}.", spell_line));
        ctx.effect(Effect::Save);
        info!("{} reached {}", ctx.player.name, spell_line);
    }

    fn offer_path(&self, ctx: &mut ScriptContext<'_>, item: &InventoryItem) {
        let book = ctx.book;
        let class = ctx.player.class;
        let lines: Vec<MlLine> = match book.master_level.pair_for(class) {
            Some((a, b)) => vec![a, b],
            None => MlLine::SEARCH_ORDER
                .iter()
                .copied()
                .filter(|l| book.master_level.is_allowed(*l, class))
                .collect(),
        };
        let choices = lines
            .iter()
            .map(|l| format!("[{}]", l.name()))
            .collect::<Vec<_>>()
            .join(" or ");

        ctx.say(format!("I can grant you access to {}", choices));
        ctx.player.set_temp(ML_HANDED_ITEM, item.uid.clone());
    }
}

impl Responder for MlTrainer {
    fn interact(&self, ctx: &mut ScriptContext<'_>) -> bool {
        let book = ctx.book;
        let messages = &book.master_level.messages;
        if ctx.player.level < book.master_level.min_level {
            ctx.say(format!("{}\n\n{}", messages.intro, messages.level_too_low));
        } else {
            ctx.say(messages.intro.as_str());
        }

        let shop_id = ctx
            .npc
            .shop
            .clone()
            .unwrap_or_else(|| self.currency.default_shop().to_string());
        ctx.effect(Effect::MerchantWindow { shop_id });
        true
    }

    fn whisper(&self, ctx: &mut ScriptContext<'_>, text: &str) -> bool {
        let book = ctx.book;
        let messages = &book.master_level.messages;
        if ctx.player.level < book.master_level.min_level {
            ctx.say(messages.level_too_low.as_str());
            return false;
        }

        let Some(line) = MlLine::from_name(text) else {
            return true;
        };

        if !book.master_level.is_allowed(line, ctx.player.class) {
            ctx.say(format!(
                "Your can not learn the way of {}s, please choose another Ability.",
                line.name()
            ));
            return true;
        }

        let handed = ctx
            .player
            .temp(ML_HANDED_ITEM)
            .and_then(|uid| ctx.player.inventory.slot_of_uid(uid))
            .and_then(|slot| ctx.player.inventory.get(slot).cloned());
        match handed {
            Some(token) if ctx.take(&token) => {
                ctx.player.take_temp(ML_HANDED_ITEM);
                self.start(ctx, line);
            }
            _ => ctx.say(messages.hand_token_first.as_str()),
        }
        true
    }

    fn receive_item(&self, ctx: &mut ScriptContext<'_>, item: &InventoryItem) -> bool {
        if !ctx.in_range() {
            return false;
        }
        let book = ctx.book;
        let messages = &book.master_level.messages;

        if item.id_nb == ML1_TOKEN {
            let on_path = MlLine::SEARCH_ORDER
                .iter()
                .any(|l| ctx.player.has_spell_line(&l.spell_line(1)));
            if on_path {
                ctx.say(messages.already_on_path.as_str());
            } else {
                self.offer_path(ctx, item);
            }
            return false;
        }

        match token_level(&item.id_nb) {
            Some(level) if ctx.player.ml_level.checked_add(1) == Some(level) || ctx.player.priv_level > 1 => {
                self.raise(ctx, item, level);
                true
            }
            Some(_) => {
                ctx.say(messages.previous_incomplete.as_str());
                false
            }
            None => {
                ctx.say(messages.unwanted_item.as_str());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::CharacterClass;
    use crate::npc::NpcKind;
    use crate::player::Player;
    use crate::responder::tests::{npc, player, Fixture};
    use crate::responder::{dispatch, Stimulus};

    const GLASS: MlTrainer = MlTrainer { currency: TrainerCurrency::Glass };

    fn on_path(player: &mut Player, line: MlLine, level: u8) {
        player.ml_line = line;
        player.ml_level = level;
        for l in 1..=level {
            player.add_spell_line(&line.spell_line(l));
        }
    }

    #[test]
    fn test_token_level() {
        assert_eq!(token_level("ml2token"), Some(2));
        assert_eq!(token_level("ml10token"), Some(10));
        assert_eq!(token_level("ml1token"), None);
        assert_eq!(token_level("ml11token"), None);
        assert_eq!(token_level("ML2TOKEN"), None);
    }

    #[test]
    fn test_interact_below_min_level() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        player.level = 30;

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(dispatch(&GLASS, &mut ctx, &Stimulus::Interact));
        assert!(ctx.out.texts()[0].ends_with("\n\nPlease come back when you are over level 40."));
        assert!(ctx.out.has_effect(|e| *e == Effect::MerchantWindow { shop_id: "ml_glass".to_string() }));
    }

    #[test]
    fn test_ml1_token_offers_class_pair_then_whisper_starts_path() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        player.inventory.add_to_first_empty(fixture.item("ml1token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert_eq!(ctx.out.texts(), vec!["I can grant you access to [Warlord] or [Battlemaster]"]);

        assert!(dispatch(&GLASS, &mut ctx, &Stimulus::Whisper("Warlord".into())));
        assert_eq!(ctx.out.texts()[1], "You have gained ML1 Warlord.");
        assert!(ctx.out.has_effect(|e| *e == Effect::Save));
        drop(ctx);

        assert_eq!(player.ml_line, MlLine::Warlord);
        assert_eq!(player.ml_level, 1);
        assert!(player.has_spell_line("ML1 Warlord"));
        assert!(!player.inventory.has("ml1token"));
        assert!(player.temp(ML_HANDED_ITEM).is_none());
    }

    #[test]
    fn test_whisper_without_handed_token() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);

        let mut ctx = fixture.ctx(&npc, &mut player);
        dispatch(&GLASS, &mut ctx, &Stimulus::Whisper("Warlord".into()));
        assert_eq!(ctx.out.texts(), vec!["Hand me the ML1 Token first."]);
    }

    #[test]
    fn test_disallowed_line() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);

        let mut ctx = fixture.ctx(&npc, &mut player);
        dispatch(&GLASS, &mut ctx, &Stimulus::Whisper("Convoker".into()));
        assert_eq!(
            ctx.out.texts(),
            vec!["Your can not learn the way of Convokers, please choose another Ability."]
        );
    }

    #[test]
    fn test_already_on_path() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        on_path(&mut player, MlLine::Warlord, 1);
        player.inventory.add_to_first_empty(fixture.item("ml1token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert_eq!(ctx.out.texts(), vec!["You already have an ML path."]);
    }

    #[test]
    fn test_raise_next_level() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlBounty);
        let mut player = player(CharacterClass::Armsman);
        on_path(&mut player, MlLine::Warlord, 3);
        player.ml_granted = true;
        player.ml_experience = 12_345;
        player.inventory.add_to_first_empty(fixture.item("ml4token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert_eq!(ctx.out.texts(), vec!["You have gained ML4 Warlord."]);
        drop(ctx);
        assert_eq!(player.ml_level, 4);
        assert!(!player.ml_granted);
        assert_eq!(player.ml_experience, 0);
        assert!(!player.inventory.has("ml4token"));
    }

    #[test]
    fn test_every_raise_resets_progress() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        on_path(&mut player, MlLine::Warlord, 1);

        for level in 2..=MAX_ML {
            player.ml_granted = true;
            player.ml_experience = i64::from(level) * 1_000;
            let token = format!("ml{}token", level);
            player.inventory.add_to_first_empty(fixture.item(&token)).unwrap();
            let slot = player.inventory.slot_of(&token).unwrap();

            let mut ctx = fixture.ctx(&npc, &mut player);
            assert!(dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot }));
            drop(ctx);

            assert_eq!(player.ml_level, level);
            assert!(player.has_spell_line(&MlLine::Warlord.spell_line(level)));
            assert!(!player.ml_granted);
            assert_eq!(player.ml_experience, 0);
        }
    }

    #[test]
    fn test_privileged_player_may_skip_levels() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        player.priv_level = 3;
        on_path(&mut player, MlLine::Warlord, 4);
        player.ml_granted = true;
        player.ml_experience = 777;
        player.inventory.add_to_first_empty(fixture.item("ml5token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert_eq!(ctx.out.texts(), vec!["You have gained ML5 Warlord."]);
        drop(ctx);
        assert_eq!(player.ml_level, 5);
        assert!(!player.ml_granted);
        assert_eq!(player.ml_experience, 0);
        assert!(!player.inventory.has("ml5token"));
    }

    #[test]
    fn test_corrupt_ml_level_is_previous_incomplete() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        on_path(&mut player, MlLine::Warlord, 1);
        player.ml_level = u8::MAX;
        player.inventory.add_to_first_empty(fixture.item("ml2token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert_eq!(ctx.out.texts(), vec!["You must complete all previous MLs."]);
        drop(ctx);
        assert!(player.inventory.has("ml2token"));
    }

    #[test]
    fn test_skipping_a_level_is_refused() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        on_path(&mut player, MlLine::Warlord, 2);
        player.inventory.add_to_first_empty(fixture.item("ml5token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert_eq!(ctx.out.texts(), vec!["You must complete all previous MLs."]);
        drop(ctx);
        assert_eq!(player.ml_level, 2);
    }

    #[test]
    fn test_privileged_player_without_previous_line_gets_nothing() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        player.priv_level = 3;
        player.inventory.add_to_first_empty(fixture.item("ml5token")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert!(ctx.out.replies.is_empty());
        drop(ctx);
        assert!(player.inventory.has("ml5token"));
    }

    #[test]
    fn test_unwanted_item() {
        let fixture = Fixture::shipped();
        let npc = npc(NpcKind::MlGlass);
        let mut player = player(CharacterClass::Armsman);
        player.inventory.add_to_first_empty(fixture.item("atlanteanglass")).unwrap();

        let mut ctx = fixture.ctx(&npc, &mut player);
        assert!(!dispatch(&GLASS, &mut ctx, &Stimulus::ReceiveItem { slot: 0 }));
        assert_eq!(ctx.out.texts(), vec!["I don't want this item !"]);
    }
}
