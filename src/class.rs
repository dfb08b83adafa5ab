//! Character classes, realms and Master Level lines.
//!
//! Class ids follow the numbering the content tables were authored against,
//! so numeric class lists in `data/scripts` can be resolved directly.

use serde::{Deserialize, Serialize};

// ============================================================================
// Realms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Realm {
    #[default]
    None,
    Albion,
    Midgard,
    Hibernia,
}

impl Realm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Realm::None => "none",
            Realm::Albion => "albion",
            Realm::Midgard => "midgard",
            Realm::Hibernia => "hibernia",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Realm::None),
            "albion" => Some(Realm::Albion),
            "midgard" => Some(Realm::Midgard),
            "hibernia" => Some(Realm::Hibernia),
            _ => None,
        }
    }
}

// ============================================================================
// Character Classes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CharacterClass {
    Paladin = 1,
    Armsman = 2,
    Scout = 3,
    Minstrel = 4,
    Theurgist = 5,
    Cleric = 6,
    Wizard = 7,
    Sorcerer = 8,
    Infiltrator = 9,
    Friar = 10,
    Mercenary = 11,
    Necromancer = 12,
    Cabalist = 13,
    Fighter = 14,
    Elementalist = 15,
    Acolyte = 16,
    AlbionRogue = 17,
    Mage = 18,
    Reaver = 19,
    Disciple = 20,
    Thane = 21,
    Warrior = 22,
    Shadowblade = 23,
    Skald = 24,
    Hunter = 25,
    Healer = 26,
    Spiritmaster = 27,
    Shaman = 28,
    Runemaster = 29,
    Bonedancer = 30,
    Berserker = 31,
    Savage = 32,
    Heretic = 33,
    Valkyrie = 34,
    Viking = 35,
    Mystic = 36,
    Seer = 37,
    MidgardRogue = 38,
    Bainshee = 39,
    Eldritch = 40,
    Enchanter = 41,
    Mentalist = 42,
    Blademaster = 43,
    Hero = 44,
    Champion = 45,
    Warden = 46,
    Druid = 47,
    Bard = 48,
    Nightshade = 49,
    Ranger = 50,
    Magician = 51,
    Guardian = 52,
    Naturalist = 53,
    Stalker = 54,
    Animist = 55,
    Valewalker = 56,
    Forester = 57,
    Vampiir = 58,
    Warlock = 59,
    MaulerAlb = 60,
    MaulerMid = 61,
    MaulerHib = 62,
}

use CharacterClass::*;

const ALL_CLASSES: [CharacterClass; 62] = [
    Paladin, Armsman, Scout, Minstrel, Theurgist, Cleric, Wizard, Sorcerer, Infiltrator, Friar,
    Mercenary, Necromancer, Cabalist, Fighter, Elementalist, Acolyte, AlbionRogue, Mage, Reaver,
    Disciple, Thane, Warrior, Shadowblade, Skald, Hunter, Healer, Spiritmaster, Shaman,
    Runemaster, Bonedancer, Berserker, Savage, Heretic, Valkyrie, Viking, Mystic, Seer,
    MidgardRogue, Bainshee, Eldritch, Enchanter, Mentalist, Blademaster, Hero, Champion, Warden,
    Druid, Bard, Nightshade, Ranger, Magician, Guardian, Naturalist, Stalker, Animist,
    Valewalker, Forester, Vampiir, Warlock, MaulerAlb, MaulerMid, MaulerHib,
];

impl CharacterClass {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        ALL_CLASSES.get(usize::from(id).checked_sub(1)?).copied()
    }

    pub fn all() -> &'static [CharacterClass] {
        &ALL_CLASSES
    }

    /// Name as written in content tables
    pub fn name(self) -> &'static str {
        match self {
            Paladin => "Paladin",
            Armsman => "Armsman",
            Scout => "Scout",
            Minstrel => "Minstrel",
            Theurgist => "Theurgist",
            Cleric => "Cleric",
            Wizard => "Wizard",
            Sorcerer => "Sorcerer",
            Infiltrator => "Infiltrator",
            Friar => "Friar",
            Mercenary => "Mercenary",
            Necromancer => "Necromancer",
            Cabalist => "Cabalist",
            Fighter => "Fighter",
            Elementalist => "Elementalist",
            Acolyte => "Acolyte",
            AlbionRogue => "AlbionRogue",
            Mage => "Mage",
            Reaver => "Reaver",
            Disciple => "Disciple",
            Thane => "Thane",
            Warrior => "Warrior",
            Shadowblade => "Shadowblade",
            Skald => "Skald",
            Hunter => "Hunter",
            Healer => "Healer",
            Spiritmaster => "Spiritmaster",
            Shaman => "Shaman",
            Runemaster => "Runemaster",
            Bonedancer => "Bonedancer",
            Berserker => "Berserker",
            Savage => "Savage",
            Heretic => "Heretic",
            Valkyrie => "Valkyrie",
            Viking => "Viking",
            Mystic => "Mystic",
            Seer => "Seer",
            MidgardRogue => "MidgardRogue",
            Bainshee => "Bainshee",
            Eldritch => "Eldritch",
            Enchanter => "Enchanter",
            Mentalist => "Mentalist",
            Blademaster => "Blademaster",
            Hero => "Hero",
            Champion => "Champion",
            Warden => "Warden",
            Druid => "Druid",
            Bard => "Bard",
            Nightshade => "Nightshade",
            Ranger => "Ranger",
            Magician => "Magician",
            Guardian => "Guardian",
            Naturalist => "Naturalist",
            Stalker => "Stalker",
            Animist => "Animist",
            Valewalker => "Valewalker",
            Forester => "Forester",
            Vampiir => "Vampiir",
            Warlock => "Warlock",
            MaulerAlb => "Mauler_Alb",
            MaulerMid => "Mauler_Mid",
            MaulerHib => "Mauler_Hib",
        }
    }

    /// Exact, case-sensitive name lookup
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_CLASSES.iter().copied().find(|c| c.name() == name)
    }

    pub fn realm(self) -> Realm {
        match self.id() {
            1..=20 | 33 | 60 => Realm::Albion,
            21..=32 | 34..=38 | 59 | 61 => Realm::Midgard,
            39..=58 | 62 => Realm::Hibernia,
            _ => Realm::None,
        }
    }
}

// ============================================================================
// Master Level Lines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum MlLine {
    #[default]
    None = 0,
    Banelord = 1,
    Battlemaster = 2,
    Convoker = 3,
    Perfecter = 4,
    Sojourner = 5,
    Spymaster = 6,
    Stormlord = 7,
    Warlord = 8,
}

impl MlLine {
    /// Lines in the order they are searched when raising a level
    pub const SEARCH_ORDER: [MlLine; 8] = [
        MlLine::Banelord,
        MlLine::Battlemaster,
        MlLine::Convoker,
        MlLine::Perfecter,
        MlLine::Sojourner,
        MlLine::Spymaster,
        MlLine::Stormlord,
        MlLine::Warlord,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MlLine::None => "None",
            MlLine::Banelord => "Banelord",
            MlLine::Battlemaster => "Battlemaster",
            MlLine::Convoker => "Convoker",
            MlLine::Perfecter => "Perfecter",
            MlLine::Sojourner => "Sojourner",
            MlLine::Spymaster => "Spymaster",
            MlLine::Stormlord => "Stormlord",
            MlLine::Warlord => "Warlord",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::SEARCH_ORDER.iter().copied().find(|l| l.name() == name)
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MlLine::Banelord,
            2 => MlLine::Battlemaster,
            3 => MlLine::Convoker,
            4 => MlLine::Perfecter,
            5 => MlLine::Sojourner,
            6 => MlLine::Spymaster,
            7 => MlLine::Stormlord,
            8 => MlLine::Warlord,
            _ => MlLine::None,
        }
    }

    /// Spell line granted at a given Master Level, e.g. "ML3 Convoker"
    pub fn spell_line(self, level: u8) -> String {
        format!("ML{} {}", level, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ids_round_trip() {
        for class in CharacterClass::all() {
            assert_eq!(CharacterClass::from_id(class.id()), Some(*class));
        }
        assert_eq!(CharacterClass::from_id(0), None);
        assert_eq!(CharacterClass::from_id(63), None);
    }

    #[test]
    fn test_class_names_are_case_sensitive() {
        assert_eq!(CharacterClass::from_name("Mauler_Alb"), Some(CharacterClass::MaulerAlb));
        assert_eq!(CharacterClass::from_name("Vampiir"), Some(CharacterClass::Vampiir));
        assert_eq!(CharacterClass::from_name("vampiir"), None);
    }

    #[test]
    fn test_class_realms() {
        assert_eq!(CharacterClass::Heretic.realm(), Realm::Albion);
        assert_eq!(CharacterClass::Valkyrie.realm(), Realm::Midgard);
        assert_eq!(CharacterClass::Warlock.realm(), Realm::Midgard);
        assert_eq!(CharacterClass::Vampiir.realm(), Realm::Hibernia);
        assert_eq!(CharacterClass::MaulerHib.realm(), Realm::Hibernia);
    }

    #[test]
    fn test_ml_spell_line_names() {
        assert_eq!(MlLine::Convoker.spell_line(3), "ML3 Convoker");
        assert_eq!(MlLine::from_name("Battlemaster"), Some(MlLine::Battlemaster));
        assert_eq!(MlLine::from_name("None"), None);
        assert_eq!(MlLine::from_u8(8), MlLine::Warlord);
    }
}
