//! Grammar compiler
//!
//! Turns a declarative `GrammarDef` into an immutable `Grammar`: every
//! shorthand is expanded, every pattern is compiled, and every mode gets
//! its combined matcher. Modes live in an arena owned by the grammar and
//! refer to each other by `ModeId`, which is how a mode can contain
//! itself without an ownership cycle.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use fancy_regex::Regex;
use tracing::debug;

use super::combine;
use super::grammar::{ContainsDef, GrammarDef, ModeDef, PatternDef, ScopeDef, SubLanguageDef};
use super::hooks::{self, EndSameAsBegin, ModeHook, SkipAfterDot};
use super::keywords::KeywordTable;
use super::matcher::{compile_pattern, MatchRule, ModeMatcher, RuleKind};
use crate::error::{HighlightError, Result};

/// Matches the empty string at any position
const MATCH_ANYWHERE: &str = r"\B|\b";

/// Default word pattern for keyword lookup
const DEFAULT_WORD_PATTERN: &str = r"\w+";

/// Nesting bound for mode compilation
const MAX_MODE_DEPTH: usize = 64;

/// Repository mode name plus the terminator it inherits (empty when the
/// mode does not depend on its parent)
type NamedKey = (String, String);

/// Index of a compiled mode in its grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeId(pub usize);

/// How the lexeme of a begin or end match is emitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CaptureScopes {
    /// Emitted as ordinary text of the mode
    #[default]
    None,
    /// The whole lexeme gets this scope
    Wrap(String),
    /// Capture group -> scope; groups without a scope are emitted as text
    Groups(BTreeMap<usize, Option<String>>),
}

impl CaptureScopes {
    pub fn is_none(&self) -> bool {
        matches!(self, CaptureScopes::None)
    }
}

/// Keyword table together with the regex that splits text into words
#[derive(Debug, Clone)]
pub struct Keywords {
    pub table: KeywordTable,
    pub pattern: Regex,
}

/// A mode after compilation
pub struct CompiledMode {
    pub scope: Option<String>,
    pub begin_scope: CaptureScopes,
    pub end_scope: CaptureScopes,
    /// Begin source, as contributed to the parent's matcher
    pub begin: Option<String>,
    /// The mode's own end, used to confirm an end event at its offset
    pub end: Option<Regex>,
    /// Own end plus inherited parent ends, as contributed to this mode's matcher
    pub terminator_end: String,
    pub illegal: Option<String>,
    pub keywords: Option<Keywords>,
    pub relevance: u32,
    pub contains: Vec<ModeId>,
    pub starts: Option<ModeId>,
    pub sub_language: Option<SubLanguageDef>,
    pub ends_with_parent: bool,
    pub ends_parent: bool,
    pub exclude_begin: bool,
    pub exclude_end: bool,
    pub return_begin: bool,
    pub return_end: bool,
    pub skip: bool,
    pub before_begin: Option<Arc<dyn ModeHook>>,
    pub on_begin: Option<Arc<dyn ModeHook>>,
    pub on_end: Option<Arc<dyn ModeHook>>,
    pub matcher: ModeMatcher,
}

impl fmt::Debug for CompiledMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMode")
            .field("scope", &self.scope)
            .field("begin", &self.begin)
            .field("terminator_end", &self.terminator_end)
            .field("illegal", &self.illegal)
            .field("relevance", &self.relevance)
            .field("contains", &self.contains)
            .field("starts", &self.starts)
            .finish_non_exhaustive()
    }
}

impl CompiledMode {
    /// Name used in error reports
    pub fn display_name(&self) -> &str {
        self.scope.as_deref().unwrap_or("<unnamed>")
    }
}

/// A compiled, immutable grammar
#[derive(Debug)]
pub struct Grammar {
    pub name: String,
    pub aliases: Vec<String>,
    pub case_insensitive: bool,
    pub superset_of: Option<String>,
    pub disable_autodetect: bool,
    class_name_aliases: HashMap<String, String>,
    modes: Vec<CompiledMode>,
}

impl Grammar {
    /// Compile a grammar definition
    ///
    /// `fallback_name` is used when the definition carries no name.
    pub fn compile(fallback_name: &str, def: &GrammarDef) -> Result<Self> {
        let name = def.name.clone().unwrap_or_else(|| fallback_name.to_string());

        if def
            .root
            .contains
            .iter()
            .any(|c| matches!(c, ContainsDef::Named(n) if n == "self"))
        {
            return Err(HighlightError::compile(
                &name,
                "contains `self` is not supported at the top-level of a language",
            ));
        }

        let mut compiler = Compiler {
            def,
            language: name.clone(),
            modes: Vec::new(),
            named: HashMap::new(),
            depth: 0,
        };
        compiler.compile_mode(def.root.clone(), None, None)?;
        debug!(language = %name, modes = compiler.modes.len(), "compiled grammar");

        Ok(Self {
            name,
            aliases: def.aliases.clone(),
            case_insensitive: def.case_insensitive,
            superset_of: def.superset_of.clone(),
            disable_autodetect: def.disable_autodetect,
            class_name_aliases: def.class_name_aliases.clone(),
            modes: compiler.modes,
        })
    }

    pub fn root(&self) -> ModeId {
        ModeId(0)
    }

    pub fn mode(&self, id: ModeId) -> &CompiledMode {
        &self.modes[id.0]
    }

    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    /// Apply the grammar's scope renames
    pub fn scope_alias<'a>(&'a self, scope: &'a str) -> &'a str {
        self.class_name_aliases
            .get(scope)
            .map(String::as_str)
            .unwrap_or(scope)
    }
}

struct Compiler<'d> {
    def: &'d GrammarDef,
    language: String,
    modes: Vec<CompiledMode>,
    /// Already compiled repository modes
    named: HashMap<NamedKey, Vec<ModeId>>,
    depth: usize,
}

impl Compiler<'_> {
    fn error(&self, message: impl Into<String>) -> HighlightError {
        HighlightError::compile(&self.language, message)
    }

    fn compile_mode(&mut self, def: ModeDef, parent: Option<ModeId>, memo: Option<&NamedKey>) -> Result<ModeId> {
        self.depth += 1;
        if self.depth > MAX_MODE_DEPTH {
            return Err(self.error("modes nest too deeply (recursive mode reference?)"));
        }
        let id = self.compile_mode_inner(def, parent, memo);
        self.depth -= 1;
        id
    }

    fn compile_mode_inner(
        &mut self,
        mut def: ModeDef,
        parent: Option<ModeId>,
        memo: Option<&NamedKey>,
    ) -> Result<ModeId> {
        let is_child = parent.is_some();

        // `scope` given as a capture table is really a begin scope
        if let Some(ScopeDef::Captures(_)) = def.scope {
            if def.begin_scope.is_none() {
                def.begin_scope = def.scope.take();
            } else {
                def.scope = None;
            }
        }

        if let Some(pattern) = def.match_.take() {
            if def.begin.is_some() || def.end.is_some() {
                return Err(self.error("begin & end are not supported with match"));
            }
            def.begin = Some(pattern);
        }

        if def.before_match.is_some() {
            def = self.expand_before_match(def)?;
        }

        let (mut begin, begin_scope) = self.capture_pattern(
            def.begin.take(),
            def.begin_scope.take(),
            def.skip || def.exclude_begin || def.return_begin,
            "beginScope",
            "skip, excludeBegin, returnBegin not compatible with beginScope",
        )?;
        let (end, end_scope) = self.capture_pattern(
            def.end.take(),
            def.end_scope.take(),
            def.skip || def.exclude_end || def.return_end,
            "endScope",
            "skip, excludeEnd, returnEnd not compatible with endScope",
        )?;
        let mut before_begin: Option<Arc<dyn ModeHook>> = None;

        if let (true, Some(words)) = (is_child, def.begin_keywords.take()) {
            let words: Vec<&str> = words.split_whitespace().collect();
            begin = Some(format!(r"\b({})(?!\.)(?=\b|\s)", words.join("|")));
            before_begin = Some(Arc::new(SkipAfterDot));
            if def.keywords.is_none() {
                def.keywords = Some(words.join(" ").as_str().into());
            }
            def.relevance.get_or_insert(0);
        }

        let illegal = match def.illegal.take() {
            Some(PatternDef::One(source)) => Some(source),
            Some(PatternDef::Seq(sources)) => Some(combine::either(&sources, false)),
            None => None,
        };

        let relevance = def.relevance.unwrap_or(1);

        let (mut on_begin, mut on_end) = (
            self.resolve_hook(def.on_begin.as_deref())?,
            self.resolve_hook(def.on_end.as_deref())?,
        );
        if def.end_same_as_begin {
            let hook: Arc<dyn ModeHook> = Arc::new(EndSameAsBegin);
            on_begin = Some(hook.clone());
            on_end = Some(hook);
        }

        let case_insensitive = self.def.case_insensitive;
        let keywords = match &def.keywords {
            Some(spec) => {
                let (table, pattern) = KeywordTable::compile(spec, case_insensitive);
                let pattern = pattern.as_deref().unwrap_or(DEFAULT_WORD_PATTERN);
                Some(Keywords {
                    table,
                    pattern: compile_pattern(pattern, case_insensitive)?,
                })
            }
            None => None,
        };

        let mut end_re = None;
        let mut terminator_end = String::new();
        if let Some(parent) = parent {
            if begin.is_none() {
                begin = Some(MATCH_ANYWHERE.to_string());
            }
            let end = match end {
                Some(end) => Some(end),
                None if !def.ends_with_parent => Some(MATCH_ANYWHERE.to_string()),
                None => None,
            };
            if let Some(end) = &end {
                end_re = Some(compile_pattern(end, case_insensitive)?);
                terminator_end.push_str(end);
            }
            let inherited = &self.modes[parent.0].terminator_end;
            if def.ends_with_parent && !inherited.is_empty() {
                if end.is_some() {
                    terminator_end.push('|');
                }
                terminator_end.push_str(inherited);
            }
        }

        let id = ModeId(self.modes.len());
        self.modes.push(CompiledMode {
            scope: match def.scope.take() {
                Some(ScopeDef::Name(scope)) => Some(scope),
                _ => None,
            },
            begin_scope,
            end_scope,
            begin,
            end: end_re,
            terminator_end,
            illegal,
            keywords,
            relevance,
            contains: Vec::new(),
            starts: None,
            sub_language: def.sub_language.take(),
            ends_with_parent: def.ends_with_parent,
            ends_parent: def.ends_parent,
            exclude_begin: def.exclude_begin,
            exclude_end: def.exclude_end,
            return_begin: def.return_begin,
            return_end: def.return_end,
            skip: def.skip,
            before_begin,
            on_begin,
            on_end,
            matcher: ModeMatcher::empty(case_insensitive),
        });
        // registered before the children so that cycles resolve to this mode
        if let Some(key) = memo {
            self.named.entry(key.clone()).or_default().push(id);
        }

        let mut contains = Vec::new();
        for entry in std::mem::take(&mut def.contains) {
            match entry {
                ContainsDef::Named(name) if name == "self" => contains.push(id),
                ContainsDef::Named(name) => contains.extend(self.compile_named(&name, id)?),
                ContainsDef::Mode(mode) => contains.extend(self.compile_entry(*mode, id)?),
            }
        }

        let starts = match def.starts.take() {
            Some(starts) => Some(self.compile_mode(*starts, parent, None)?),
            None => None,
        };

        let mut rules = Vec::with_capacity(contains.len() + 2);
        for child in &contains {
            let source = self.modes[child.0].begin.as_deref().unwrap_or(MATCH_ANYWHERE);
            rules.push(MatchRule::new(source, RuleKind::Begin(*child)));
        }
        let mode = &self.modes[id.0];
        if !mode.terminator_end.is_empty() {
            rules.push(MatchRule::new(&mode.terminator_end, RuleKind::End));
        }
        if let Some(illegal) = &mode.illegal {
            rules.push(MatchRule::new(illegal, RuleKind::Illegal));
        }
        let matcher = ModeMatcher::new(rules, case_insensitive)?;

        let mode = &mut self.modes[id.0];
        mode.contains = contains;
        mode.starts = starts;
        mode.matcher = matcher;
        Ok(id)
    }

    /// Expand an inline child, including its variants
    fn compile_entry(&mut self, mode: ModeDef, parent: ModeId) -> Result<Vec<ModeId>> {
        if mode.variants.is_empty() {
            return Ok(vec![self.compile_mode(mode, Some(parent), None)?]);
        }
        let mut ids = Vec::with_capacity(mode.variants.len());
        for variant in &mode.variants {
            ids.push(self.compile_mode(mode.inherit(variant), Some(parent), None)?);
        }
        Ok(ids)
    }

    /// Expand a reference into the grammar's mode repository
    ///
    /// A mode that ends with its parent is compiled once per inherited
    /// terminator; any other mode is compiled once.
    fn compile_named(&mut self, name: &str, parent: ModeId) -> Result<Vec<ModeId>> {
        let Some(mode) = self.def.modes.get(name) else {
            return Err(self.error(format!("unknown mode reference `{}`", name)));
        };

        let inherited = if mode.depends_on_parent() {
            self.modes[parent.0].terminator_end.clone()
        } else {
            String::new()
        };
        let key = (name.to_string(), inherited);
        if let Some(ids) = self.named.get(&key) {
            return Ok(ids.clone());
        }

        if mode.variants.is_empty() {
            return Ok(vec![self.compile_mode(mode.clone(), Some(parent), Some(&key))?]);
        }
        let mut ids = Vec::with_capacity(mode.variants.len());
        for variant in &mode.variants {
            ids.push(self.compile_mode(mode.inherit(variant), Some(parent), Some(&key))?);
        }
        Ok(ids)
    }

    /// Rewrite `beforeMatch` into a lookahead begin whose continuation is
    /// the original mode, ending its parent when it ends
    fn expand_before_match(&self, mut def: ModeDef) -> Result<ModeDef> {
        if def.starts.is_some() {
            return Err(self.error("beforeMatch cannot be used with starts"));
        }
        let Some(before) = def.before_match.take() else {
            return Ok(def);
        };
        let begin = match &def.begin {
            Some(PatternDef::One(source)) => source.clone(),
            Some(PatternDef::Seq(sources)) => combine::combine(sources, ""),
            None => MATCH_ANYWHERE.to_string(),
        };

        let keywords = def.keywords.clone();
        def.ends_parent = true;
        let continuation = ModeDef {
            relevance: Some(0),
            contains: vec![def.into()],
            ..Default::default()
        };
        Ok(ModeDef {
            keywords,
            begin: Some(PatternDef::One(combine::concat(&[before, combine::lookahead(&begin)]))),
            starts: Some(Box::new(continuation)),
            relevance: Some(0),
            ..Default::default()
        })
    }

    /// Resolve a begin/end pattern and its scope specification
    fn capture_pattern(
        &self,
        pattern: Option<PatternDef>,
        scope: Option<ScopeDef>,
        incompatible: bool,
        key: &str,
        incompatible_message: &str,
    ) -> Result<(Option<String>, CaptureScopes)> {
        match (pattern, scope) {
            (Some(PatternDef::Seq(sources)), scope) => {
                if incompatible {
                    return Err(self.error(incompatible_message));
                }
                let Some(ScopeDef::Captures(table)) = scope else {
                    return Err(self.error(format!("{} must be object", key)));
                };
                if let Some(bad) = table.keys().find(|k| k.parse::<usize>().map_or(true, |n| n == 0)) {
                    return Err(self.error(format!("{} keys must be group numbers, got `{}`", key, bad)));
                }
                let mut scopes = BTreeMap::new();
                let mut offset = 0;
                for (k, source) in sources.iter().enumerate() {
                    let group = k + 1;
                    scopes.insert(group + offset, table.get(&group.to_string()).cloned());
                    offset += combine::count_groups(source);
                }
                Ok((Some(combine::combine(&sources, "")), CaptureScopes::Groups(scopes)))
            }
            (_, Some(ScopeDef::Captures(_))) => Err(self.error(format!(
                "{} as an object requires an array pattern",
                key
            ))),
            (pattern, Some(ScopeDef::Name(name))) => {
                Ok((pattern.map(|p| single(&p)), CaptureScopes::Wrap(name)))
            }
            (pattern, None) => Ok((pattern.map(|p| single(&p)), CaptureScopes::None)),
        }
    }

    fn resolve_hook(&self, name: Option<&str>) -> Result<Option<Arc<dyn ModeHook>>> {
        let Some(name) = name else {
            return Ok(None);
        };
        if let Some(hook) = self.def.hooks.get(name) {
            return Ok(Some(hook.clone()));
        }
        match hooks::builtin(name) {
            Some(hook) => Ok(Some(hook)),
            None => Err(self.error(format!("unknown hook `{}`", name))),
        }
    }
}

fn single(pattern: &PatternDef) -> String {
    match pattern {
        PatternDef::One(source) => source.clone(),
        PatternDef::Seq(sources) => combine::concat(sources),
    }
}
