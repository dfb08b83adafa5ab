//! Content integrity checks over a loaded script book.
//!
//! Findings are reported, never repaired: tables run exactly as authored.

use std::collections::HashSet;
use std::fmt;

use super::definition::ScriptBook;
use crate::class::{CharacterClass, Realm};
use crate::data::ItemRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentWarning {
    /// Scroll ids checked for possession differ from the ids removed
    ScrollMismatch {
        trigger: String,
        checked_only: Vec<String>,
        consumed_only: Vec<String>,
    },
    /// An offered `[choice]` has no activation phrase
    OfferWithoutActivation {
        artifact: String,
        choice: String,
        near_miss: Option<String>,
    },
    UnterminatedOffer { artifact: String },
    ClaimWithoutOffer { book: String, claims: String },
    /// A book requires an id that differs from its artifact only by case
    RequirementCaseMismatch { book: String, requires: String, artifact: String },
    UnknownClass { book: String, class: String },
    UnknownList { context: String, list: String },
    UnknownDestination { list: String, realm: Realm, name: String },
    DuplicateKey { table: &'static str, key: String },
    UnknownItem { table: &'static str, item: String },
    UnknownSpell { token: String, spell: String },
}

impl fmt::Display for ContentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentWarning::ScrollMismatch { trigger, checked_only, consumed_only } => write!(
                f,
                "scroll case '{}' checks {:?} but removes {:?}",
                trigger, checked_only, consumed_only
            ),
            ContentWarning::OfferWithoutActivation { artifact, choice, near_miss } => match near_miss {
                Some(phrase) => write!(
                    f,
                    "offer for '{}' names [{}] with no exact activation (did you mean '{}'?)",
                    artifact, choice, phrase
                ),
                None => write!(f, "offer for '{}' names [{}] with no activation", artifact, choice),
            },
            ContentWarning::UnterminatedOffer { artifact } => {
                write!(f, "offer for '{}' has an unterminated [choice]", artifact)
            }
            ContentWarning::ClaimWithoutOffer { book, claims } => {
                write!(f, "book '{}' claims '{}' which has no offer", book, claims)
            }
            ContentWarning::RequirementCaseMismatch { book, requires, artifact } => write!(
                f,
                "book '{}' requires '{}' but its artifact is '{}'",
                book, requires, artifact
            ),
            ContentWarning::UnknownClass { book, class } => {
                write!(f, "book '{}' lists unknown class '{}'", book, class)
            }
            ContentWarning::UnknownList { context, list } => {
                write!(f, "{} references unknown list '{}'", context, list)
            }
            ContentWarning::UnknownDestination { list, realm, name } => write!(
                f,
                "list '{}' names '{}' which has no {} destination",
                list, name, realm.as_str()
            ),
            ContentWarning::DuplicateKey { table, key } => {
                write!(f, "{} table repeats key '{}'; only the first entry is reachable", table, key)
            }
            ContentWarning::UnknownItem { table, item } => {
                write!(f, "{} table references item '{}' with no template", table, item)
            }
            ContentWarning::UnknownSpell { token, spell } => {
                write!(f, "token '{}' casts unknown spell '{}'", token, spell)
            }
        }
    }
}

/// Bracketed choices in an offer text, and whether a bracket is left open
pub fn offer_choices(text: &str) -> (Vec<&str>, bool) {
    let mut choices = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) => {
                choices.push(&after[..close]);
                rest = &after[close + 1..];
            }
            None => return (choices, true),
        }
    }
    (choices, false)
}

fn duplicates<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for key in keys {
        if !seen.insert(key) {
            dups.push(key.to_string());
        }
    }
    dups
}

fn missing_from(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|x| !b.contains(x)).cloned().collect()
}

pub fn validate(book: &ScriptBook, items: &ItemRegistry) -> Vec<ContentWarning> {
    let mut warnings = Vec::new();
    let unknown_item = |table: &'static str, item: &str, out: &mut Vec<ContentWarning>| {
        if !items.contains(item) {
            out.push(ContentWarning::UnknownItem { table, item: item.to_string() });
        }
    };

    // ---- Scholar ----
    let scholar = &book.scholar;
    for key in duplicates(scholar.scrolls.iter().map(|s| s.trigger.as_str())) {
        warnings.push(ContentWarning::DuplicateKey { table: "scholar", key });
    }
    for case in &scholar.scrolls {
        let mut checks = case.checks.clone();
        let mut consumes = case.consumes.clone();
        checks.sort();
        consumes.sort();
        if checks != consumes {
            warnings.push(ContentWarning::ScrollMismatch {
                trigger: case.trigger.clone(),
                checked_only: missing_from(&case.checks, &case.consumes),
                consumed_only: missing_from(&case.consumes, &case.checks),
            });
        }
        for id in case.consumes.iter().chain(std::iter::once(&case.book)) {
            unknown_item("scholar", id, &mut warnings);
        }
    }

    // ---- Activator ----
    let activator = &book.activator;
    for key in duplicates(activator.books.iter().map(|b| b.book.as_str())) {
        warnings.push(ContentWarning::DuplicateKey { table: "activator", key });
    }
    for key in duplicates(activator.activations.iter().map(|a| a.phrase.as_str())) {
        warnings.push(ContentWarning::DuplicateKey { table: "activator", key });
    }
    for case in &activator.books {
        if activator.offer(&case.claims).is_none() {
            warnings.push(ContentWarning::ClaimWithoutOffer {
                book: case.book.clone(),
                claims: case.claims.clone(),
            });
        }
        if case.requires != case.artifact && case.requires.eq_ignore_ascii_case(&case.artifact) {
            warnings.push(ContentWarning::RequirementCaseMismatch {
                book: case.book.clone(),
                requires: case.requires.clone(),
                artifact: case.artifact.clone(),
            });
        }
        for class in case.classes.iter().flatten() {
            if CharacterClass::from_name(class).is_none() {
                warnings.push(ContentWarning::UnknownClass {
                    book: case.book.clone(),
                    class: class.clone(),
                });
            }
        }
        unknown_item("activator", &case.requires, &mut warnings);
    }
    for (artifact, text) in &activator.offers {
        let (choices, unterminated) = offer_choices(text);
        if unterminated {
            warnings.push(ContentWarning::UnterminatedOffer { artifact: artifact.clone() });
        }
        for choice in choices {
            if activator.activation(choice).is_some() {
                continue;
            }
            let near_miss = activator
                .activations
                .iter()
                .find(|a| a.phrase.eq_ignore_ascii_case(choice))
                .map(|a| a.phrase.clone());
            warnings.push(ContentWarning::OfferWithoutActivation {
                artifact: artifact.clone(),
                choice: choice.to_string(),
                near_miss,
            });
        }
    }
    for activation in &activator.activations {
        if let Some(grant) = &activation.grant {
            unknown_item("activator", grant, &mut warnings);
        }
    }

    // ---- Teleporter ----
    let teleporter = &book.teleporter;
    let check_list = |context: String, list: &str, realm: Option<Realm>, out: &mut Vec<ContentWarning>| {
        let Some(entries) = teleporter.lists.get(list) else {
            out.push(ContentWarning::UnknownList { context, list: list.to_string() });
            return;
        };
        let Some(realm) = realm else { return };
        for name in entries {
            if teleporter.destination(realm, name).is_none() {
                out.push(ContentWarning::UnknownDestination {
                    list: list.to_string(),
                    realm,
                    name: name.clone(),
                });
            }
        }
    };
    for (realm, list) in &teleporter.capitals {
        check_list(format!("{} capitals", realm.as_str()), list, Some(*realm), &mut warnings);
    }
    if let Some(dungeons) = &teleporter.realm_dungeons {
        for realm in [Realm::Albion, Realm::Midgard, Realm::Hibernia] {
            if let Some(list) = dungeons.list_for(realm) {
                check_list("realm dungeons".to_string(), list, Some(realm), &mut warnings);
            }
        }
    }
    for route in &teleporter.routes {
        for menu in &route.menus {
            if !teleporter.headers.contains_key(&menu.header) {
                warnings.push(ContentWarning::UnknownList {
                    context: format!("route {:?}", route.regions),
                    list: menu.header.clone(),
                });
            }
            // Route menus are shown to every realm; membership is checked per realm list
            check_list(format!("route {:?}", route.regions), &menu.list, list_realm(&menu.list), &mut warnings);
        }
    }

    // ---- Buffs ----
    let buffs = &book.buffs;
    let token_ids = buffs.tokens.iter().flat_map(|t| t.ids.iter().map(|s| s.as_str()));
    for key in duplicates(token_ids) {
        warnings.push(ContentWarning::DuplicateKey { table: "buffs", key });
    }
    for token in &buffs.tokens {
        let label = token.ids.first().cloned().unwrap_or_default();
        for spell in token.spells.iter().chain(std::iter::once(&buffs.always_cast)) {
            if buffs.spell(spell).is_none() {
                warnings.push(ContentWarning::UnknownSpell { token: label.clone(), spell: spell.clone() });
            }
        }
        for id in &token.ids {
            unknown_item("buffs", id, &mut warnings);
        }
    }

    // ---- Master levels ----
    unknown_item("master_level", &book.master_level.respec_token, &mut warnings);

    warnings.dedup();
    warnings
}

/// Realm implied by a list name prefix; shared lists have none
fn list_realm(list: &str) -> Option<Realm> {
    if list.starts_with("alb_") {
        Some(Realm::Albion)
    } else if list.starts_with("mid_") {
        Some(Realm::Midgard)
    } else if list.starts_with("hib_") {
        Some(Realm::Hibernia)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::registry::load_book;
    use std::path::Path;

    fn shipped() -> (ScriptBook, ItemRegistry) {
        let book = load_book(Path::new("data/scripts")).unwrap();
        let mut items = ItemRegistry::new();
        items.load_from_directory(Path::new("data")).unwrap();
        (book, items)
    }

    #[test]
    fn test_offer_choices() {
        let (choices, open) = offer_choices("You can have a [A]\nYou can have a [B C]");
        assert_eq!(choices, vec!["A", "B C"]);
        assert!(!open);

        let (choices, open) = offer_choices("You can have [A]\nYou can have [B");
        assert_eq!(choices, vec!["A"]);
        assert!(open);
    }

    #[test]
    fn test_belt_of_moon_scroll_mismatch_is_reported() {
        let (book, items) = shipped();
        let warnings = validate(&book, &items);

        let belt = warnings.iter().find_map(|w| match w {
            ContentWarning::ScrollMismatch { trigger, checked_only, consumed_only }
                if trigger.starts_with("Belt_of_moon") => Some((checked_only, consumed_only)),
            _ => None,
        });
        let (checked_only, consumed_only) = belt.expect("belt of moon mismatch");
        assert!(checked_only.is_empty());
        assert_eq!(consumed_only.len(), 1);
        assert!(consumed_only[0].contains("3_of_3"));
    }

    #[test]
    fn test_braggarts_bow_case_mismatch_is_reported() {
        let (book, items) = shipped();
        let warnings = validate(&book, &items);

        assert!(warnings.contains(&ContentWarning::RequirementCaseMismatch {
            book: "book_of_braggartsbow".to_string(),
            requires: "braggarts_Bow".to_string(),
            artifact: "braggarts_bow".to_string(),
        }));
        assert!(warnings.contains(&ContentWarning::UnknownItem {
            table: "activator",
            item: "braggarts_Bow".to_string(),
        }));
    }

    #[test]
    fn test_unterminated_offer_is_reported() {
        let (book, items) = shipped();
        let warnings = validate(&book, &items);
        assert!(warnings.contains(&ContentWarning::UnterminatedOffer {
            artifact: "flamedancers_boots".to_string(),
        }));
    }

    #[test]
    fn test_near_miss_phrase_is_named() {
        let (mut book, items) = shipped();
        book.activator.offers.insert(
            "test_artifact".to_string(),
            "You can have a [braggart's longbow]".to_string(),
        );
        let warnings = validate(&book, &items);
        assert!(warnings.contains(&ContentWarning::OfferWithoutActivation {
            artifact: "test_artifact".to_string(),
            choice: "braggart's longbow".to_string(),
            near_miss: Some("Braggart's Longbow".to_string()),
        }));
    }

    #[test]
    fn test_every_terminated_offer_choice_has_an_activation() {
        let (book, _) = shipped();
        for (artifact, text) in &book.activator.offers {
            let (choices, _) = offer_choices(text);
            for choice in choices {
                assert!(
                    book.activator.activation(choice).is_some(),
                    "offer for {} names [{}] without an activation",
                    artifact,
                    choice
                );
            }
        }
    }
}
