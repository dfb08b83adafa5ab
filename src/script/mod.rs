//! NPC Script Tables
//!
//! Stimulus-keyed dispatch tables for the custom NPCs. Keys are exact,
//! case-sensitive strings and are never normalised.

pub mod definition;
pub mod registry;
pub mod validate;

pub use definition::{
    Activation, BookCase, Destination, Menu, ScriptBook, ScrollCase, SpellDef, SpellKind,
    SpellLineKind, TokenCase, BASE_AF_SPELL,
};
pub use registry::{HotReloadEvent, ScriptRegistry};
pub use validate::ContentWarning;
