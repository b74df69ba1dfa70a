//! Mode matchers
//!
//! Every compiled mode owns one matcher: the begin patterns of its
//! children, its own effective end pattern and its illegal pattern,
//! combined into a single regex so that one search finds the next event.

use std::sync::OnceLock;

use fancy_regex::Regex;

use super::combine;
use super::compiler::ModeId;
use super::hooks::LexemeMatch;
use crate::error::{HighlightError, Result};

/// Compile a grammar pattern with the engine's flags
///
/// Patterns are multi-line (`^`/`$` match at line boundaries) and
/// optionally case-insensitive.
pub(crate) fn compile_pattern(source: &str, case_insensitive: bool) -> Result<Regex> {
    let flags = if case_insensitive { "(?mi)" } else { "(?m)" };
    Regex::new(&format!("{}{}", flags, source)).map_err(|e| HighlightError::Pattern {
        pattern: source.to_string(),
        source: Box::new(e),
    })
}

/// What a matched alternative means to the tokenizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// A child mode starts
    Begin(ModeId),
    /// The current mode (or an ancestor) may end
    End,
    /// Text the current mode does not allow
    Illegal,
}

/// One alternative of a matcher
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub source: String,
    pub kind: RuleKind,
    groups: usize,
}

impl MatchRule {
    pub fn new(source: &str, kind: RuleKind) -> Self {
        Self {
            source: source.to_string(),
            kind,
            groups: combine::count_groups(source),
        }
    }
}

/// A successful search
#[derive(Debug, Clone)]
pub struct RuleMatch<'t> {
    pub kind: RuleKind,
    /// Byte offset of the match
    pub index: usize,
    /// Group 0 is the lexeme, followed by the rule's own groups
    pub groups: Vec<Option<&'t str>>,
    /// Position of the rule in the matcher
    pub rule: usize,
}

impl<'t> RuleMatch<'t> {
    pub fn lexeme(&self) -> &'t str {
        self.groups.first().copied().flatten().unwrap_or("")
    }

    pub fn end(&self) -> usize {
        self.index + self.lexeme().len()
    }

    pub fn to_lexeme_match(&self, input: &'t str) -> LexemeMatch<'t> {
        LexemeMatch {
            input,
            index: self.index,
            groups: self.groups.clone(),
        }
    }
}

/// Combined regex over the rules from some index onwards
#[derive(Debug)]
struct MultiRegex {
    regex: Option<Regex>,
    /// (top-level group, rule index, rule's own group count)
    entries: Vec<(usize, usize, usize)>,
}

impl MultiRegex {
    fn build(rules: &[MatchRule], first: usize, case_insensitive: bool) -> Result<Self> {
        if rules.is_empty() {
            return Ok(Self {
                regex: None,
                entries: Vec::new(),
            });
        }

        let mut entries = Vec::with_capacity(rules.len());
        let mut group = 1;
        for (offset, rule) in rules.iter().enumerate() {
            entries.push((group, first + offset, rule.groups));
            group += rule.groups + 1;
        }

        let sources: Vec<&str> = rules.iter().map(|r| r.source.as_str()).collect();
        let regex = compile_pattern(&combine::combine(&sources, "|"), case_insensitive)?;
        Ok(Self {
            regex: Some(regex),
            entries,
        })
    }

    fn exec<'t>(&self, rules: &[MatchRule], text: &'t str, pos: usize) -> Result<Option<RuleMatch<'t>>> {
        let Some(regex) = &self.regex else {
            return Ok(None);
        };
        if pos > text.len() {
            return Ok(None);
        }
        let Some(caps) = regex.captures_from_pos(text, pos).map_err(Box::new)? else {
            return Ok(None);
        };

        for &(group, rule, count) in &self.entries {
            if let Some(whole) = caps.get(group) {
                let groups = (0..=count)
                    .map(|i| caps.get(group + i).map(|m| m.as_str()))
                    .collect();
                return Ok(Some(RuleMatch {
                    kind: rules[rule].kind,
                    index: whole.start(),
                    groups,
                    rule,
                }));
            }
        }
        Ok(None)
    }
}

/// The combined matcher of one compiled mode
///
/// Regexes are built on first use and cached. The matcher itself holds no
/// per-run state: the caller owns the resume index, so one compiled
/// grammar can serve any number of concurrent runs.
#[derive(Debug)]
pub struct ModeMatcher {
    rules: Vec<MatchRule>,
    case_insensitive: bool,
    compiled: Vec<OnceLock<MultiRegex>>,
}

impl ModeMatcher {
    /// Build a matcher, validating the full combined pattern eagerly
    pub fn new(rules: Vec<MatchRule>, case_insensitive: bool) -> Result<Self> {
        let compiled = (0..=rules.len()).map(|_| OnceLock::new()).collect();
        let matcher = Self {
            rules,
            case_insensitive,
            compiled,
        };
        matcher.matcher_from(0)?;
        Ok(matcher)
    }

    /// A matcher with no rules; never finds anything
    pub fn empty(case_insensitive: bool) -> Self {
        Self {
            rules: Vec::new(),
            case_insensitive,
            compiled: vec![OnceLock::new()],
        }
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    fn matcher_from(&self, first: usize) -> Result<&MultiRegex> {
        let slot = &self.compiled[first];
        if let Some(built) = slot.get() {
            return Ok(built);
        }
        let built = MultiRegex::build(&self.rules[first..], first, self.case_insensitive)?;
        Ok(slot.get_or_init(|| built))
    }

    /// Find the next event at or after `pos`.
    ///
    /// `resume` is the index of the first rule to consider. When it is not
    /// zero the previous begin at `pos` was vetoed: only a lower-priority
    /// rule matching at exactly `pos` is accepted, otherwise the search
    /// restarts with every rule one character further on. On return
    /// `resume` points past the rule that fired, or is zero when no
    /// lower-priority rule remains.
    ///
    /// The index counts end and illegal rules as well as begins, so a
    /// vetoed last begin still lets the end or illegal rule fire at the
    /// same offset instead of moving one character on.
    pub fn exec<'t>(&self, text: &'t str, pos: usize, resume: &mut usize) -> Result<Option<RuleMatch<'t>>> {
        let first = if *resume < self.rules.len() { *resume } else { 0 };
        let mut found = self.matcher_from(first)?.exec(&self.rules, text, pos)?;

        if first != 0 && !found.as_ref().is_some_and(|m| m.index == pos) {
            found = match next_char_boundary(text, pos) {
                Some(next) => self.matcher_from(0)?.exec(&self.rules, text, next)?,
                None => None,
            };
        }

        *resume = match &found {
            Some(m) if m.rule + 1 < self.rules.len() => m.rule + 1,
            _ => 0,
        };
        Ok(found)
    }
}

/// Byte offset of the character after the one at `pos`
pub(crate) fn next_char_boundary(text: &str, pos: usize) -> Option<usize> {
    text.get(pos..)?.chars().next().map(|c| pos + c.len_utf8())
}
