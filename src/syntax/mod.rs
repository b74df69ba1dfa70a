//! Grammar-driven highlighting engine
//!
//! A grammar is compiled once into a graph of modes, each with a combined
//! matcher. The tokenizer walks the input through those modes, building a
//! token tree that the emitter renders as HTML. Auto-detection runs every
//! candidate grammar and keeps the most relevant result.

pub mod combine;
mod compiler;
mod detect;
mod emitter;
mod grammar;
mod hooks;
mod keywords;
mod manager;
mod matcher;
pub mod modes;
mod result;
mod tokenizer;
mod builtin;

pub use compiler::{CaptureScopes, CompiledMode, Grammar, Keywords, ModeId};
pub use emitter::{
    escape_html, scope_to_class, HtmlRenderer, ScopeNode, TokenNode, TokenTree, TreeVisitor,
    DEFAULT_CLASS_PREFIX,
};
pub use grammar::{
    ContainsDef, GrammarDef, KeywordsDef, ModeDef, PatternDef, ScopeDef, SubLanguageDef, VariantDef,
    WordList,
};
pub use hooks::{BufferStart, EndSameAsBegin, HookContext, LexemeMatch, ModeHook, SkipAfterDot};
pub use keywords::{KeywordEntry, KeywordTable, MAX_KEYWORD_HITS};
pub use matcher::{MatchRule, ModeMatcher, RuleKind, RuleMatch};
pub use manager::{BeforeHighlight, HighlightListener, HighlightOptions, Highlighter};
pub use result::{HighlightResult, IllegalPolicy, IllegalReport};
