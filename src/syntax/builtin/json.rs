//! JSON language definition

use std::collections::BTreeMap;

use crate::syntax::grammar::{GrammarDef, KeywordsDef, ModeDef, WordList};
use crate::syntax::modes;

const LITERALS: &str = "true false null";

/// Create JSON language definition
pub fn json_language() -> GrammarDef {
    let mut lang = GrammarDef::new("JSON");
    lang.aliases = vec!["jsonc".to_string()];

    // Object keys: a string followed by a colon
    let attribute = ModeDef::scoped("attr")
        .with_match(r#""(\\.|[^\\"\r\n])*"(?=\s*:)"#)
        .with_relevance(1);
    let punctuation = ModeDef::scoped("punctuation")
        .with_match(r"[{}\[\],:]")
        .with_relevance(0);
    let mut literals = ModeDef::scoped("literal");
    literals.begin_keywords = Some(LITERALS.to_string());

    let mut keywords = BTreeMap::new();
    keywords.insert("literal".to_string(), WordList::from(LITERALS));

    lang.root = ModeDef::default()
        .with_keywords(KeywordsDef::Categories(keywords))
        .with_illegal(r"\S")
        .with_contains(vec![
            attribute.into(),
            punctuation.into(),
            modes::quote_string().into(),
            literals.into(),
            modes::c_number_mode().into(),
            modes::c_line_comment().into(),
            modes::c_block_comment().into(),
        ]);
    lang
}
