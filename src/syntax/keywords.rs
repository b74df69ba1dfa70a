//! Keyword tables
//!
//! Maps literal words to the scope they are emitted with and the
//! relevance they contribute each time they are seen.

use std::collections::HashMap;

use super::grammar::{KeywordsDef, WordList};

/// Scope used for a plain word list with no category
pub const DEFAULT_KEYWORD_SCOPE: &str = "keyword";

/// Key of a category table that overrides the word regex
pub const PATTERN_KEY: &str = "$pattern";

/// Words so common in prose that they say nothing about the language
const COMMON_KEYWORDS: &[&str] = &[
    "of", "and", "for", "in", "not", "or", "if", "then", "parent", "list", "value",
];

/// How often one word may add relevance in a single run
pub const MAX_KEYWORD_HITS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEntry {
    pub scope: String,
    pub relevance: u32,
}

impl KeywordEntry {
    /// Categories starting with `_` count for relevance but are not highlighted
    pub fn is_hidden(&self) -> bool {
        self.scope.starts_with('_')
    }
}

/// Compiled keyword lookup for one mode
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    words: HashMap<String, KeywordEntry>,
}

impl KeywordTable {
    /// Build the table, returning it together with any `$pattern` override
    pub fn compile(def: &KeywordsDef, case_insensitive: bool) -> (Self, Option<String>) {
        let mut table = Self::default();
        let mut pattern = None;

        match def {
            KeywordsDef::Words(list) => table.add(DEFAULT_KEYWORD_SCOPE, list, case_insensitive),
            KeywordsDef::Categories(categories) => {
                for (scope, list) in categories {
                    if scope == PATTERN_KEY {
                        pattern = match list {
                            WordList::Words(source) => Some(source.clone()),
                            WordList::List(sources) => sources.first().cloned(),
                        };
                        continue;
                    }
                    table.add(scope, list, case_insensitive);
                }
            }
        }

        (table, pattern)
    }

    fn add(&mut self, scope: &str, list: &WordList, case_insensitive: bool) {
        for word in list.words() {
            let word = if case_insensitive {
                word.to_lowercase()
            } else {
                word.to_string()
            };
            let (word, explicit) = match word.split_once('|') {
                Some((w, n)) => (w.to_string(), Some(n.to_string())),
                None => (word, None),
            };
            let relevance = keyword_relevance(&word, explicit.as_deref());
            self.words.insert(
                word,
                KeywordEntry {
                    scope: scope.to_string(),
                    relevance,
                },
            );
        }
    }

    /// Look up an already case-folded word
    pub fn get(&self, word: &str) -> Option<&KeywordEntry> {
        self.words.get(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

fn keyword_relevance(word: &str, explicit: Option<&str>) -> u32 {
    if let Some(n) = explicit.and_then(|n| n.trim().parse().ok()) {
        return n;
    }
    if COMMON_KEYWORDS.contains(&word.to_lowercase().as_str()) {
        0
    } else {
        1
    }
}
