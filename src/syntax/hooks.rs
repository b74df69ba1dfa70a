//! Mode hooks
//!
//! A hook is consulted when a mode's begin or end pattern matches and may
//! veto the match. Hooks are attached per grammar: built-in ones are
//! chosen by name from grammar data, custom ones are registered on the
//! `GrammarDef` in Rust.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A begin or end match as seen by a hook
#[derive(Debug, Clone)]
pub struct LexemeMatch<'t> {
    /// The whole buffer being highlighted
    pub input: &'t str,
    /// Byte offset of the match in `input`
    pub index: usize,
    /// Group 0 is the whole lexeme, then the rule's own capture groups
    pub groups: Vec<Option<&'t str>>,
}

impl<'t> LexemeMatch<'t> {
    pub fn lexeme(&self) -> &'t str {
        self.group(0).unwrap_or("")
    }

    pub fn group(&self, index: usize) -> Option<&'t str> {
        self.groups.get(index).copied().flatten()
    }
}

/// Per-activation state handed to hooks
///
/// `data` lives as long as the mode activation, so a begin hook can leave
/// a note for the end hook of the same activation.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub data: HashMap<String, String>,
    ignored: bool,
}

impl HookContext {
    /// Reject the match; the lexeme is treated as ordinary text
    pub fn ignore_match(&mut self) {
        self.ignored = true;
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub(crate) fn reset(&mut self) {
        self.ignored = false;
    }
}

/// Callbacks a grammar attaches to a mode
pub trait ModeHook: Send + Sync + fmt::Debug {
    /// Called when the mode's begin pattern matched
    fn on_begin(&self, _m: &LexemeMatch<'_>, _ctx: &mut HookContext) {}

    /// Called when the mode's end pattern matched
    fn on_end(&self, _m: &LexemeMatch<'_>, _ctx: &mut HookContext) {}
}

/// Rejects a begin match directly preceded by `.` (`obj.if` is not a keyword)
#[derive(Debug)]
pub struct SkipAfterDot;

impl ModeHook for SkipAfterDot {
    fn on_begin(&self, m: &LexemeMatch<'_>, ctx: &mut HookContext) {
        if m.input[..m.index].ends_with('.') {
            ctx.ignore_match();
        }
    }
}

/// Rejects a begin match anywhere but the start of the buffer
#[derive(Debug)]
pub struct BufferStart;

impl ModeHook for BufferStart {
    fn on_begin(&self, m: &LexemeMatch<'_>, ctx: &mut HookContext) {
        if m.index != 0 {
            ctx.ignore_match();
        }
    }
}

/// Only accepts an end whose first capture equals the begin's first capture
#[derive(Debug)]
pub struct EndSameAsBegin;

const BEGIN_MATCH_KEY: &str = "_beginMatch";

impl ModeHook for EndSameAsBegin {
    fn on_begin(&self, m: &LexemeMatch<'_>, ctx: &mut HookContext) {
        ctx.data
            .insert(BEGIN_MATCH_KEY.to_string(), m.group(1).unwrap_or("").to_string());
    }

    fn on_end(&self, m: &LexemeMatch<'_>, ctx: &mut HookContext) {
        let begin = ctx.data.get(BEGIN_MATCH_KEY).map(String::as_str);
        if begin != Some(m.group(1).unwrap_or("")) {
            ctx.ignore_match();
        }
    }
}

/// Look up a hook that grammars may name without registering it
pub(crate) fn builtin(name: &str) -> Option<Arc<dyn ModeHook>> {
    match name {
        "bufferStart" => Some(Arc::new(BufferStart)),
        "skipAfterDot" => Some(Arc::new(SkipAfterDot)),
        "endSameAsBegin" => Some(Arc::new(EndSameAsBegin)),
        _ => None,
    }
}
