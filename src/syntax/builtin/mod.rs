//! Built-in language definitions
//!
//! Grammars registered by `Highlighter::new`.

mod json;
mod rust;

use std::collections::BTreeMap;

use super::grammar::{GrammarDef, PatternDef, ScopeDef};

/// Get all built-in language definitions, keyed by registration name
pub fn all_languages() -> Vec<(&'static str, GrammarDef)> {
    vec![
        ("plaintext", GrammarDef::plaintext()),
        ("json", json::json_language()),
        ("rust", rust::rust_language()),
    ]
}

/// Scope table for a multi-part `match`
fn captures(groups: &[(usize, &str)]) -> ScopeDef {
    let table: BTreeMap<String, String> = groups
        .iter()
        .map(|(group, scope)| (group.to_string(), scope.to_string()))
        .collect();
    ScopeDef::Captures(table)
}

fn seq(pieces: &[&str]) -> PatternDef {
    PatternDef::Seq(pieces.iter().map(|p| p.to_string()).collect())
}
