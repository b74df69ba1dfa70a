//! Highlighting results

use super::emitter::{escape_html, TokenTree};
use super::tokenizer::Frame;

/// How a run treats lexemes matched by a mode's `illegal` pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IllegalPolicy {
    /// Fail the run with `HighlightError::IllegalLexeme`
    #[default]
    Strict,
    /// Return the input unhighlighted, flagged illegal, with zero relevance
    Permissive,
    /// Keep the lexeme as plain text and carry on
    Skip,
}

impl IllegalPolicy {
    pub fn from_ignore_illegals(ignore_illegals: bool) -> Self {
        if ignore_illegals {
            IllegalPolicy::Permissive
        } else {
            IllegalPolicy::Strict
        }
    }
}

/// Why a result came back degraded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalReport {
    pub message: String,
    /// Byte offset where scanning stopped
    pub index: usize,
    /// Input surrounding `index`
    pub context: String,
    /// Scope of the active mode, or `<unnamed>`
    pub mode: String,
}

/// Output of one highlighting call
#[derive(Debug, Clone)]
pub struct HighlightResult {
    /// Language the code was highlighted as; `None` for undetected input
    pub language: Option<String>,
    /// Rendered HTML
    pub value: String,
    pub relevance: u32,
    pub illegal: bool,
    /// The input as highlighted
    pub code: String,
    pub illegal_by: Option<IllegalReport>,
    /// Runner-up of an auto-detection
    pub second_best: Option<Box<HighlightResult>>,
    pub tree: TokenTree,
    /// Mode stack at the end of the run, root first
    pub(crate) top: Vec<Frame>,
}

impl HighlightResult {
    /// Unhighlighted output: the code escaped as a single text leaf
    pub fn plain(language: Option<&str>, code: &str) -> Self {
        Self {
            language: language.map(str::to_string),
            value: escape_html(code),
            relevance: 0,
            illegal: false,
            code: code.to_string(),
            illegal_by: None,
            second_best: None,
            tree: TokenTree::from_text(code),
            top: Vec::new(),
        }
    }

    /// Unhighlighted output for a run that hit an illegal lexeme or a loop
    pub fn degraded(language: Option<&str>, code: &str, report: IllegalReport) -> Self {
        Self {
            illegal: true,
            illegal_by: Some(report),
            ..Self::plain(language, code)
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.illegal_by.is_some()
    }
}
