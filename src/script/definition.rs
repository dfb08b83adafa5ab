//! Script Table Definitions
//!
//! Typed forms of the TOML dispatch tables under `data/scripts`. Each table
//! keeps its entries in authored order and builds an exact-key index over
//! them. On duplicate keys the first entry wins, which is what a switch
//! statement over the same labels would do.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::class::{CharacterClass, MlLine, Realm};

fn index_by<T>(entries: &[T], keys: impl Fn(&T) -> Vec<&str>) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        for key in keys(entry) {
            index.entry(key.to_string()).or_insert(i);
        }
    }
    index
}

fn default_true() -> bool { true }

// ============================================================================
// Artifact Scholar
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ScholarMessages {
    pub transcribed: String,
    pub missing_materials: String,
    pub unknown_item: String,
}

/// One scroll set that transcribes into a book
#[derive(Debug, Clone, Deserialize)]
pub struct ScrollCase {
    pub trigger: String,
    /// Held together with `activated` means the artifact is already owned
    pub owned: String,
    pub activated: String,
    pub already: String,
    pub requires: String,
    pub requires_inactive: String,
    pub checks: Vec<String>,
    pub consumes: Vec<String>,
    pub book: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScholarFile {
    pub messages: ScholarMessages,
    #[serde(rename = "scroll", default)]
    pub scrolls: Vec<ScrollCase>,
}

#[derive(Debug, Clone)]
pub struct ScholarTable {
    pub messages: ScholarMessages,
    pub scrolls: Vec<ScrollCase>,
    index: HashMap<String, usize>,
}

impl ScholarTable {
    pub fn from_file(file: ScholarFile) -> Self {
        let index = index_by(&file.scrolls, |s| vec![s.trigger.as_str()]);
        Self { messages: file.messages, scrolls: file.scrolls, index }
    }

    pub fn case(&self, trigger: &str) -> Option<&ScrollCase> {
        self.index.get(trigger).map(|&i| &self.scrolls[i])
    }
}

// ============================================================================
// Artifact Activator
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ActivatorMessages {
    pub greeting: String,
    pub not_implemented: String,
    pub missing_artifact: String,
}

/// A book handed to the activator
#[derive(Debug, Clone, Deserialize)]
pub struct BookCase {
    pub book: String,
    pub artifact: String,
    pub requires: String,
    pub inactive: String,
    pub already: String,
    #[serde(default)]
    pub congrats: Vec<String>,
    pub denied: String,
    /// Class names allowed to claim; absent means every class
    pub classes: Option<Vec<String>>,
    #[serde(default)]
    pub consumes: Vec<String>,
    pub claims: String,
    #[serde(default)]
    pub deny_when_missing: bool,
}

impl BookCase {
    pub fn admits(&self, class: CharacterClass) -> bool {
        match &self.classes {
            Some(names) => names.iter().any(|n| n == class.name()),
            None => true,
        }
    }
}

/// A whispered phrase that activates an artifact variant
#[derive(Debug, Clone, Deserialize)]
pub struct Activation {
    pub phrase: String,
    pub artifact: String,
    /// Template swapped in for the base artifact
    pub grant: Option<String>,
    pub reply: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivatorFile {
    pub messages: ActivatorMessages,
    #[serde(rename = "book", default)]
    pub books: Vec<BookCase>,
    #[serde(rename = "activation", default)]
    pub activations: Vec<Activation>,
    #[serde(default)]
    pub offers: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ActivatorTable {
    pub messages: ActivatorMessages,
    pub books: Vec<BookCase>,
    pub activations: Vec<Activation>,
    pub offers: BTreeMap<String, String>,
    book_index: HashMap<String, usize>,
    phrase_index: HashMap<String, usize>,
}

impl ActivatorTable {
    pub fn from_file(file: ActivatorFile) -> Self {
        let book_index = index_by(&file.books, |b| vec![b.book.as_str()]);
        let phrase_index = index_by(&file.activations, |a| vec![a.phrase.as_str()]);
        Self {
            messages: file.messages,
            books: file.books,
            activations: file.activations,
            offers: file.offers,
            book_index,
            phrase_index,
        }
    }

    pub fn book(&self, id: &str) -> Option<&BookCase> {
        self.book_index.get(id).map(|&i| &self.books[i])
    }

    pub fn activation(&self, phrase: &str) -> Option<&Activation> {
        self.phrase_index.get(phrase).map(|&i| &self.activations[i])
    }

    pub fn offer(&self, artifact: &str) -> Option<&str> {
        self.offers.get(artifact).map(|s| s.as_str())
    }
}

// ============================================================================
// Teleporter
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TeleporterMessages {
    pub capitals_header: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MenuRef {
    pub header: String,
    pub list: String,
}

/// Menus shown in a set of regions
#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    pub regions: Vec<u16>,
    pub menus: Vec<MenuRef>,
}

/// Regions that show the dungeon list of the player's own realm
#[derive(Debug, Clone, Deserialize)]
pub struct RealmDungeons {
    pub regions: Vec<u16>,
    pub header: String,
    pub albion: String,
    pub midgard: String,
    pub hibernia: String,
}

impl RealmDungeons {
    pub fn list_for(&self, realm: Realm) -> Option<&str> {
        match realm {
            Realm::Albion => Some(&self.albion),
            Realm::Midgard => Some(&self.midgard),
            Realm::Hibernia => Some(&self.hibernia),
            Realm::None => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Destination {
    pub realm: Realm,
    pub name: String,
    pub region: u16,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub heading: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeleporterFile {
    pub messages: TeleporterMessages,
    pub headers: HashMap<String, String>,
    pub lists: HashMap<String, Vec<String>>,
    /// Realm name -> list name
    #[serde(default)]
    pub capitals: HashMap<String, String>,
    pub realm_dungeons: Option<RealmDungeons>,
    #[serde(rename = "route", default)]
    pub routes: Vec<Route>,
    #[serde(rename = "destination", default)]
    pub destinations: Vec<Destination>,
}

/// A resolved menu: header text plus destination names
#[derive(Debug, Clone, Copy)]
pub struct Menu<'a> {
    pub header: &'a str,
    pub entries: &'a [String],
}

#[derive(Debug, Clone)]
pub struct TeleporterTable {
    pub messages: TeleporterMessages,
    pub headers: HashMap<String, String>,
    pub lists: HashMap<String, Vec<String>>,
    pub capitals: HashMap<Realm, String>,
    pub realm_dungeons: Option<RealmDungeons>,
    pub routes: Vec<Route>,
    pub destinations: Vec<Destination>,
    region_index: HashMap<u16, usize>,
    destination_index: HashMap<(Realm, String), usize>,
}

impl TeleporterTable {
    pub fn from_file(file: TeleporterFile) -> Self {
        let mut region_index = HashMap::new();
        for (i, route) in file.routes.iter().enumerate() {
            for region in &route.regions {
                region_index.entry(*region).or_insert(i);
            }
        }
        let capitals = file
            .capitals
            .iter()
            .filter_map(|(realm, list)| match Realm::from_name(realm) {
                Some(r) => Some((r, list.clone())),
                None => {
                    tracing::warn!("Unknown realm '{}' in teleporter capitals", realm);
                    None
                }
            })
            .collect();
        let mut destination_index = HashMap::new();
        for (i, dest) in file.destinations.iter().enumerate() {
            destination_index.entry((dest.realm, dest.name.clone())).or_insert(i);
        }
        Self {
            messages: file.messages,
            headers: file.headers,
            lists: file.lists,
            capitals,
            realm_dungeons: file.realm_dungeons,
            routes: file.routes,
            destinations: file.destinations,
            region_index,
            destination_index,
        }
    }

    fn menu(&self, header: &str, list: &str) -> Menu<'_> {
        Menu {
            header: self.headers.get(header).map(|s| s.as_str()).unwrap_or(""),
            entries: self.lists.get(list).map(|v| v.as_slice()).unwrap_or(&[]),
        }
    }

    /// Menus for the region the player stands in
    pub fn menus_for(&self, region: u16, realm: Realm) -> Vec<Menu<'_>> {
        if let Some(dungeons) = &self.realm_dungeons {
            if dungeons.regions.contains(&region) {
                let list = dungeons.list_for(realm).unwrap_or("");
                return vec![self.menu(&dungeons.header, list)];
            }
        }
        match self.region_index.get(&region) {
            Some(&i) => self.routes[i]
                .menus
                .iter()
                .map(|m| self.menu(&m.header, &m.list))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn capitals_for(&self, realm: Realm) -> Option<&[String]> {
        let list = self.capitals.get(&realm)?;
        self.lists.get(list).map(|v| v.as_slice())
    }

    /// Exact, case-sensitive destination lookup within a realm
    pub fn destination(&self, realm: Realm, name: &str) -> Option<&Destination> {
        self.destination_index
            .get(&(realm, name.to_string()))
            .map(|&i| &self.destinations[i])
    }
}

// ============================================================================
// Buff Merchant
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellKind {
    ArmorFactorBuff,
    StrengthBuff,
    ConstitutionBuff,
    DexterityBuff,
    StrengthConstitutionBuff,
    DexterityQuicknessBuff,
    AcuityBuff,
    CombatSpeedBuff,
    PowerRegenBuff,
    DamageAdd,
    HealthRegenBuff,
    SpeedBuff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellLineKind {
    Base,
    Spec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpellDef {
    pub name: String,
    pub kind: SpellKind,
    pub value: f32,
    pub line: SpellLineKind,
    pub damage: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenCase {
    pub ids: Vec<String>,
    pub spells: Vec<String>,
    /// Self-AF classes skip the base AF spell unless this is false
    #[serde(default = "default_true")]
    pub respect_self_af: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuffMessages {
    pub greeting: String,
    pub farewell: String,
    pub one_at_a_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuffFile {
    pub always_cast: String,
    #[serde(default)]
    pub self_af_classes: Vec<String>,
    pub messages: BuffMessages,
    pub spells: HashMap<String, SpellDef>,
    #[serde(rename = "token", default)]
    pub tokens: Vec<TokenCase>,
}

/// The spell key skipped for self-AF classes
pub const BASE_AF_SPELL: &str = "base_af";

#[derive(Debug, Clone)]
pub struct BuffTable {
    pub always_cast: String,
    pub self_af_classes: Vec<String>,
    pub messages: BuffMessages,
    pub spells: HashMap<String, SpellDef>,
    pub tokens: Vec<TokenCase>,
    token_index: HashMap<String, usize>,
}

impl BuffTable {
    pub fn from_file(file: BuffFile) -> Self {
        let token_index = index_by(&file.tokens, |t| t.ids.iter().map(|s| s.as_str()).collect());
        Self {
            always_cast: file.always_cast,
            self_af_classes: file.self_af_classes,
            messages: file.messages,
            spells: file.spells,
            tokens: file.tokens,
            token_index,
        }
    }

    pub fn token(&self, id: &str) -> Option<&TokenCase> {
        self.token_index.get(id).map(|&i| &self.tokens[i])
    }

    pub fn spell(&self, key: &str) -> Option<&SpellDef> {
        self.spells.get(key)
    }

    pub fn has_self_af(&self, class: CharacterClass) -> bool {
        self.self_af_classes.iter().any(|n| n == class.name())
    }
}

// ============================================================================
// Master Levels
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MasterLevelMessages {
    pub intro: String,
    pub level_too_low: String,
    pub already_on_path: String,
    pub previous_incomplete: String,
    pub unwanted_item: String,
    pub hand_token_first: String,
    pub cannot_take_item: String,
    pub respec_greeting: String,
    pub respec_offer: String,
    pub respec_no_levels: String,
    pub respec_no_pair: String,
}

/// The two lines offered to a set of classes
#[derive(Debug, Clone, Deserialize)]
pub struct LinePair {
    pub lines: [MlLine; 2],
    pub classes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MasterLevelFile {
    pub min_level: u8,
    pub respec_token: String,
    pub messages: MasterLevelMessages,
    #[serde(rename = "pair", default)]
    pub pairs: Vec<LinePair>,
    /// Line name -> class ids allowed to learn it
    #[serde(default)]
    pub allowed: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct MasterLevelTable {
    pub min_level: u8,
    pub respec_token: String,
    pub messages: MasterLevelMessages,
    pub pairs: Vec<LinePair>,
    pub allowed: HashMap<MlLine, Vec<u8>>,
}

impl MasterLevelTable {
    pub fn from_file(file: MasterLevelFile) -> Self {
        let mut allowed = HashMap::new();
        for (name, ids) in file.allowed {
            match MlLine::from_name(&name) {
                Some(line) => {
                    allowed.insert(line, ids);
                }
                None => tracing::warn!("Unknown Master Level line '{}' in allowed table", name),
            }
        }
        Self {
            min_level: file.min_level,
            respec_token: file.respec_token,
            messages: file.messages,
            pairs: file.pairs,
            allowed,
        }
    }

    /// The pair of lines offered to a class
    pub fn pair_for(&self, class: CharacterClass) -> Option<(MlLine, MlLine)> {
        self.pairs
            .iter()
            .find(|p| p.classes.contains(&class.id()))
            .map(|p| (p.lines[0], p.lines[1]))
    }

    pub fn is_allowed(&self, line: MlLine, class: CharacterClass) -> bool {
        self.allowed
            .get(&line)
            .is_some_and(|ids| ids.contains(&class.id()))
    }
}

// ============================================================================
// Script Book
// ============================================================================

/// Every dispatch table, loaded together and swapped as a unit
#[derive(Debug, Clone)]
pub struct ScriptBook {
    pub scholar: ScholarTable,
    pub activator: ActivatorTable,
    pub teleporter: TeleporterTable,
    pub buffs: BuffTable,
    pub master_level: MasterLevelTable,
}
