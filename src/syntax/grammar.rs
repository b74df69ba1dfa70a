//! Declarative grammar definitions
//!
//! A grammar is a tree of modes. These types are the raw, uncompiled
//! form: they deserialize from TOML or JSON with camelCase keys
//! (`beginScope`, `endsWithParent`, `on:begin`) and can also be built in Rust.
//! Nothing here is validated; see the compiler for that.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::hooks::ModeHook;
use crate::error::Result;

/// A scope tag, or a table of capture group number -> scope tag
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScopeDef {
    Name(String),
    Captures(BTreeMap<String, String>),
}

impl From<&str> for ScopeDef {
    fn from(name: &str) -> Self {
        ScopeDef::Name(name.to_string())
    }
}

/// A single regex source, or a sequence of them
///
/// As a `begin`/`end` a sequence is matched as a concatenation with one
/// scope per piece. As an `illegal` it is an alternation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PatternDef {
    One(String),
    Seq(Vec<String>),
}

impl From<&str> for PatternDef {
    fn from(source: &str) -> Self {
        PatternDef::One(source.to_string())
    }
}

impl From<String> for PatternDef {
    fn from(source: String) -> Self {
        PatternDef::One(source)
    }
}

/// Words in a keyword category
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WordList {
    /// Space separated, `word|N` sets an explicit relevance
    Words(String),
    List(Vec<String>),
}

impl WordList {
    pub fn words(&self) -> Vec<&str> {
        match self {
            WordList::Words(s) => s.split_whitespace().collect(),
            WordList::List(list) => list.iter().map(|s| s.as_str()).collect(),
        }
    }
}

impl From<&str> for WordList {
    fn from(words: &str) -> Self {
        WordList::Words(words.to_string())
    }
}

/// Keyword specification of a mode
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum KeywordsDef {
    /// All words in the `keyword` category
    Words(WordList),
    /// Category name -> words. The `$pattern` entry overrides the word regex.
    Categories(BTreeMap<String, WordList>),
}

impl From<&str> for KeywordsDef {
    fn from(words: &str) -> Self {
        KeywordsDef::Words(WordList::Words(words.to_string()))
    }
}

/// An entry of a `contains` list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContainsDef {
    /// `"self"`, or the name of an entry in the grammar's `modes` table
    Named(String),
    Mode(Box<ModeDef>),
}

impl ContainsDef {
    pub fn self_ref() -> Self {
        ContainsDef::Named("self".to_string())
    }

    pub fn named(name: &str) -> Self {
        ContainsDef::Named(name.to_string())
    }
}

impl From<ModeDef> for ContainsDef {
    fn from(mode: ModeDef) -> Self {
        ContainsDef::Mode(Box::new(mode))
    }
}

/// Embedded grammar of a mode
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SubLanguageDef {
    /// A named grammar
    One(String),
    /// Auto-detect among these (all grammars when empty)
    Any(Vec<String>),
}

/// One lexical region of a grammar
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModeDef {
    #[serde(alias = "className")]
    pub scope: Option<ScopeDef>,
    pub begin_scope: Option<ScopeDef>,
    pub end_scope: Option<ScopeDef>,
    pub begin: Option<PatternDef>,
    pub end: Option<PatternDef>,
    #[serde(rename = "match")]
    pub match_: Option<PatternDef>,
    pub before_match: Option<String>,
    pub begin_keywords: Option<String>,
    pub illegal: Option<PatternDef>,
    pub keywords: Option<KeywordsDef>,
    pub relevance: Option<u32>,
    pub contains: Vec<ContainsDef>,
    pub variants: Vec<VariantDef>,
    pub starts: Option<Box<ModeDef>>,
    pub sub_language: Option<SubLanguageDef>,
    pub ends_with_parent: bool,
    pub ends_parent: bool,
    pub exclude_begin: bool,
    pub exclude_end: bool,
    pub return_begin: bool,
    pub return_end: bool,
    pub skip: bool,
    pub end_same_as_begin: bool,
    #[serde(rename = "on:begin")]
    pub on_begin: Option<String>,
    #[serde(rename = "on:end")]
    pub on_end: Option<String>,
}

impl ModeDef {
    /// A mode with a scope and nothing else
    pub fn scoped(scope: &str) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Default::default()
        }
    }

    pub fn with_begin(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.begin = Some(pattern.into());
        self
    }

    pub fn with_end(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.end = Some(pattern.into());
        self
    }

    pub fn with_match(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.match_ = Some(pattern.into());
        self
    }

    pub fn with_illegal(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.illegal = Some(pattern.into());
        self
    }

    pub fn with_keywords(mut self, keywords: impl Into<KeywordsDef>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    pub fn with_relevance(mut self, relevance: u32) -> Self {
        self.relevance = Some(relevance);
        self
    }

    pub fn with_contains(mut self, contains: Vec<ContainsDef>) -> Self {
        self.contains = contains;
        self
    }

    pub fn ends_with_parent(mut self) -> Self {
        self.ends_with_parent = true;
        self
    }

    /// Copy of this mode with the fields set in `variant` taking precedence
    ///
    /// Used to expand `variants`: every variant shares the fields of the
    /// mode it is declared on.
    pub fn inherit(&self, variant: &VariantDef) -> ModeDef {
        fn pick<T: Clone>(variant: &Option<T>, base: &Option<T>) -> Option<T> {
            variant.as_ref().or(base.as_ref()).cloned()
        }

        ModeDef {
            scope: pick(&variant.scope, &self.scope),
            begin_scope: pick(&variant.begin_scope, &self.begin_scope),
            end_scope: pick(&variant.end_scope, &self.end_scope),
            begin: pick(&variant.begin, &self.begin),
            end: pick(&variant.end, &self.end),
            match_: pick(&variant.match_, &self.match_),
            before_match: pick(&variant.before_match, &self.before_match),
            begin_keywords: pick(&variant.begin_keywords, &self.begin_keywords),
            illegal: pick(&variant.illegal, &self.illegal),
            keywords: pick(&variant.keywords, &self.keywords),
            relevance: variant.relevance.or(self.relevance),
            contains: variant.contains.clone().unwrap_or_else(|| self.contains.clone()),
            variants: Vec::new(),
            starts: pick(&variant.starts, &self.starts),
            sub_language: pick(&variant.sub_language, &self.sub_language),
            ends_with_parent: variant.ends_with_parent.unwrap_or(self.ends_with_parent),
            ends_parent: variant.ends_parent.unwrap_or(self.ends_parent),
            exclude_begin: variant.exclude_begin.unwrap_or(self.exclude_begin),
            exclude_end: variant.exclude_end.unwrap_or(self.exclude_end),
            return_begin: variant.return_begin.unwrap_or(self.return_begin),
            return_end: variant.return_end.unwrap_or(self.return_end),
            skip: variant.skip.unwrap_or(self.skip),
            end_same_as_begin: variant.end_same_as_begin.unwrap_or(self.end_same_as_begin),
            on_begin: pick(&variant.on_begin, &self.on_begin),
            on_end: pick(&variant.on_end, &self.on_end),
        }
    }

    /// Whether compiling this mode depends on which parent contains it
    pub fn depends_on_parent(&self) -> bool {
        self.ends_with_parent || self.starts.as_ref().is_some_and(|s| s.depends_on_parent())
    }
}

/// One entry of a mode's `variants`
///
/// Every field is optional: unset fields come from the mode the variant is
/// declared on, set ones replace it, even with `false` or an empty
/// `contains`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantDef {
    #[serde(alias = "className")]
    pub scope: Option<ScopeDef>,
    pub begin_scope: Option<ScopeDef>,
    pub end_scope: Option<ScopeDef>,
    pub begin: Option<PatternDef>,
    pub end: Option<PatternDef>,
    #[serde(rename = "match")]
    pub match_: Option<PatternDef>,
    pub before_match: Option<String>,
    pub begin_keywords: Option<String>,
    pub illegal: Option<PatternDef>,
    pub keywords: Option<KeywordsDef>,
    pub relevance: Option<u32>,
    pub contains: Option<Vec<ContainsDef>>,
    pub starts: Option<Box<ModeDef>>,
    pub sub_language: Option<SubLanguageDef>,
    pub ends_with_parent: Option<bool>,
    pub ends_parent: Option<bool>,
    pub exclude_begin: Option<bool>,
    pub exclude_end: Option<bool>,
    pub return_begin: Option<bool>,
    pub return_end: Option<bool>,
    pub skip: Option<bool>,
    pub end_same_as_begin: Option<bool>,
    #[serde(rename = "on:begin")]
    pub on_begin: Option<String>,
    #[serde(rename = "on:end")]
    pub on_end: Option<String>,
}

impl VariantDef {
    pub fn with_begin(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.begin = Some(pattern.into());
        self
    }

    pub fn with_end(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.end = Some(pattern.into());
        self
    }

    pub fn with_contains(mut self, contains: Vec<ContainsDef>) -> Self {
        self.contains = Some(contains);
        self
    }
}

/// A complete, uncompiled grammar
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrammarDef {
    /// Display name, defaults to the registration name
    pub name: Option<String>,
    pub aliases: Vec<String>,
    #[serde(alias = "case_insensitive")]
    pub case_insensitive: bool,
    /// Name of a grammar this one extends; detection prefers this one on ties
    pub superset_of: Option<String>,
    pub disable_autodetect: bool,
    /// Scope renames applied when emitting
    pub class_name_aliases: HashMap<String, String>,
    /// Named modes that `contains` lists may refer to
    pub modes: HashMap<String, ModeDef>,
    /// The top-level mode
    #[serde(flatten)]
    pub root: ModeDef,
    /// Hooks referenced by name from `on:begin` / `on:end`
    #[serde(skip)]
    pub hooks: HashMap<String, Arc<dyn ModeHook>>,
}

impl fmt::Debug for GrammarDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarDef")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("case_insensitive", &self.case_insensitive)
            .field("superset_of", &self.superset_of)
            .field("disable_autodetect", &self.disable_autodetect)
            .field("modes", &self.modes.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl GrammarDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// The grammar that highlights nothing
    pub fn plaintext() -> Self {
        Self {
            name: Some("Plain text".to_string()),
            aliases: vec!["text".to_string(), "txt".to_string()],
            disable_autodetect: true,
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a grammar file; `.json` files are JSON, anything else TOML
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }

    /// Register a hook that modes can name in `on:begin` / `on:end`
    pub fn with_hook(mut self, name: &str, hook: Arc<dyn ModeHook>) -> Self {
        self.hooks.insert(name.to_string(), hook);
        self
    }

    /// Add a named mode to the repository
    pub fn with_mode(mut self, name: &str, mode: ModeDef) -> Self {
        self.modes.insert(name.to_string(), mode);
        self
    }
}
