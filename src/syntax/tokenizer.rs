//! Tokenizer loop
//!
//! Drives a stack of mode activations over one buffer. Each iteration asks
//! the active mode's matcher for the next event (a child begins, the mode
//! or an ancestor ends, or an illegal lexeme), flushes the text before it
//! through keyword classification or a sub-language, and updates the stack.
//! All state lives in the `Tokenizer`, so a compiled grammar can be shared
//! by any number of concurrent runs.

use std::collections::{BTreeMap, HashMap};

use tracing::{trace, warn};

use super::compiler::{CaptureScopes, Grammar, ModeId};
use super::emitter::TokenTree;
use super::grammar::SubLanguageDef;
use super::hooks::HookContext;
use super::keywords::MAX_KEYWORD_HITS;
use super::manager::Highlighter;
use super::matcher::{next_char_boundary, RuleKind, RuleMatch};
use super::result::{HighlightResult, IllegalPolicy, IllegalReport};
use crate::error::{HighlightError, Result};

/// Iterations allowed before the runaway guard starts comparing
const GUARD_ITERATIONS: usize = 100_000;

/// Iterations allowed per byte of progress once the guard is active
const GUARD_FACTOR: usize = 3;

/// Bytes of input reported on each side of an illegal lexeme
const CONTEXT_RADIUS: usize = 100;

/// One live mode activation
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    mode: ModeId,
    /// Scratch space shared by the begin and end hooks of this activation
    data: HookContext,
}

impl Frame {
    fn new(mode: ModeId) -> Self {
        Self {
            mode,
            data: HookContext::default(),
        }
    }
}

/// Highlight `code` with a compiled grammar
///
/// `continuation` is the mode stack a previous run stopped in, hook data
/// included; the run resumes inside it instead of at the grammar's root.
pub(crate) fn tokenize(
    highlighter: &Highlighter,
    grammar: &Grammar,
    language: &str,
    code: &str,
    policy: IllegalPolicy,
    continuation: Option<&[Frame]>,
) -> Result<HighlightResult> {
    let mut tokenizer = Tokenizer::new(highlighter, grammar, code, policy, continuation);
    match tokenizer.run() {
        Ok(()) => Ok(tokenizer.finish(language)),
        Err(err) if recoverable(&err, policy) => {
            warn!(language, error = %err, "highlighting degraded to plain text");
            let report = tokenizer.report(&err);
            Ok(HighlightResult::degraded(Some(language), code, report))
        }
        Err(err) => Err(err),
    }
}

/// Errors a non-strict run turns into a degraded result
///
/// `ZeroWidthMatch` is only raised with safe mode off and always propagates.
fn recoverable(err: &HighlightError, policy: IllegalPolicy) -> bool {
    policy != IllegalPolicy::Strict
        && matches!(
            err,
            HighlightError::IllegalLexeme { .. } | HighlightError::LoopDetected { .. }
        )
}

struct Tokenizer<'a> {
    highlighter: &'a Highlighter,
    grammar: &'a Grammar,
    input: &'a str,
    policy: IllegalPolicy,
    stack: Vec<Frame>,
    tree: TokenTree,
    /// Text seen since the last flush
    mode_buffer: String,
    relevance: u32,
    keyword_hits: HashMap<String, u32>,
    /// Where each named sub-language stopped, for the next chunk
    continuations: HashMap<String, Vec<Frame>>,
    index: usize,
    iterations: usize,
    /// First matcher rule to consider on the next search
    resume: usize,
    resume_same_position: bool,
    /// Kind and offset of the previous event: (was a begin, index)
    last_match: Option<(bool, usize)>,
}

impl<'a> Tokenizer<'a> {
    fn new(
        highlighter: &'a Highlighter,
        grammar: &'a Grammar,
        input: &'a str,
        policy: IllegalPolicy,
        continuation: Option<&[Frame]>,
    ) -> Self {
        let stack: Vec<Frame> = match continuation {
            Some(frames) if !frames.is_empty() => frames.to_vec(),
            _ => vec![Frame::new(grammar.root())],
        };

        let mut tree = TokenTree::new();
        for frame in stack.iter().skip(1) {
            if let Some(scope) = &grammar.mode(frame.mode).scope {
                tree.open_node(grammar.scope_alias(scope));
            }
        }

        Self {
            highlighter,
            grammar,
            input,
            policy,
            stack,
            tree,
            mode_buffer: String::new(),
            relevance: 0,
            keyword_hits: HashMap::new(),
            continuations: HashMap::new(),
            index: 0,
            iterations: 0,
            resume: 0,
            resume_same_position: false,
            last_match: None,
        }
    }

    fn top(&self) -> ModeId {
        self.stack.last().map_or(self.grammar.root(), |f| f.mode)
    }

    fn run(&mut self) -> Result<()> {
        let grammar = self.grammar;
        let input = self.input;

        while self.index <= input.len() {
            self.iterations += 1;
            if self.iterations > GUARD_ITERATIONS && self.iterations > self.index * GUARD_FACTOR {
                return Err(HighlightError::LoopDetected {
                    iterations: self.iterations,
                    index: self.index,
                });
            }

            if !std::mem::take(&mut self.resume_same_position) {
                self.resume = 0;
            }
            let matcher = &grammar.mode(self.top()).matcher;
            let Some(found) = matcher.exec(input, self.index, &mut self.resume)? else {
                break;
            };
            trace!(index = found.index, kind = ?found.kind, lexeme = found.lexeme(), "event");

            let before = &input[self.index..found.index];
            let processed = self.process_lexeme(before, &found)?;
            self.index = found.index + processed;
        }

        let rest = input.get(self.index..).unwrap_or("");
        self.mode_buffer.push_str(rest);
        self.process_buffer()
    }

    fn finish(mut self, language: &str) -> HighlightResult {
        self.tree.finalize();
        HighlightResult {
            language: Some(language.to_string()),
            value: self.tree.to_html(self.highlighter.class_prefix()),
            relevance: self.relevance,
            illegal: false,
            code: self.input.to_string(),
            illegal_by: None,
            second_best: None,
            tree: self.tree,
            top: self.stack,
        }
    }

    fn report(&self, err: &HighlightError) -> IllegalReport {
        let index = match err {
            HighlightError::IllegalLexeme { index, .. } => *index,
            _ => self.index.min(self.input.len()),
        };
        IllegalReport {
            message: err.to_string(),
            index,
            context: context_window(self.input, index),
            mode: self.grammar.mode(self.top()).display_name().to_string(),
        }
    }

    /// Handle one event; returns how many bytes of input it consumed
    fn process_lexeme(&mut self, before: &str, found: &RuleMatch<'a>) -> Result<usize> {
        self.mode_buffer.push_str(before);
        let lexeme = found.lexeme();

        // a zero-width begin immediately ended at the same spot would never advance
        if let Some((true, last_index)) = self.last_match {
            if found.kind == RuleKind::End && last_index == found.index && lexeme.is_empty() {
                if !self.highlighter.config().safe_mode {
                    return Err(HighlightError::ZeroWidthMatch {
                        language: self.grammar.name.clone(),
                    });
                }
                return Ok(self.take_next_char(found.index));
            }
        }
        self.last_match = Some((matches!(found.kind, RuleKind::Begin(_)), found.index));

        match found.kind {
            RuleKind::Begin(child) => return self.do_begin(found, child),
            RuleKind::Illegal if self.policy != IllegalPolicy::Skip => {
                return Err(HighlightError::IllegalLexeme {
                    lexeme: lexeme.to_string(),
                    mode: self.grammar.mode(self.top()).display_name().to_string(),
                    index: found.index,
                    context: context_window(self.input, found.index),
                });
            }
            RuleKind::End => {
                if let Some(processed) = self.do_end(found)? {
                    return Ok(processed);
                }
            }
            RuleKind::Illegal => {}
        }

        // a skipped illegal lexeme or a rejected end is plain text
        if lexeme.is_empty() {
            return Ok(self.take_next_char(found.index));
        }
        self.mode_buffer.push_str(lexeme);
        Ok(lexeme.len())
    }

    /// Move the character at `index` into the buffer
    fn take_next_char(&mut self, index: usize) -> usize {
        match next_char_boundary(self.input, index) {
            Some(next) => {
                self.mode_buffer.push_str(&self.input[index..next]);
                next - index
            }
            // past the end: stops the scan
            None => 1,
        }
    }

    fn do_begin(&mut self, found: &RuleMatch<'a>, child: ModeId) -> Result<usize> {
        let grammar = self.grammar;
        let mode = grammar.mode(child);
        let lexeme = found.lexeme();

        let mut data = HookContext::default();
        for hook in [&mode.before_begin, &mode.on_begin].into_iter().flatten() {
            hook.on_begin(&found.to_lexeme_match(self.input), &mut data);
            if data.is_ignored() {
                return Ok(self.ignore_begin(found.index));
            }
        }

        if mode.skip {
            self.mode_buffer.push_str(lexeme);
        } else {
            if mode.exclude_begin {
                self.mode_buffer.push_str(lexeme);
            }
            self.process_buffer()?;
            if !mode.return_begin && !mode.exclude_begin {
                self.mode_buffer = lexeme.to_string();
            }
        }
        self.start_mode(child, found, data)?;
        Ok(if mode.return_begin { 0 } else { lexeme.len() })
    }

    /// A hook vetoed a begin: give the remaining rules a chance at the same
    /// offset, or treat one character as text when none are left
    fn ignore_begin(&mut self, index: usize) -> usize {
        if self.resume == 0 {
            self.take_next_char(index)
        } else {
            self.resume_same_position = true;
            0
        }
    }

    fn start_mode(&mut self, id: ModeId, found: &RuleMatch<'a>, data: HookContext) -> Result<()> {
        let grammar = self.grammar;
        let mode = grammar.mode(id);
        if let Some(scope) = &mode.scope {
            self.tree.open_node(grammar.scope_alias(scope));
        }
        match &mode.begin_scope {
            CaptureScopes::Wrap(scope) => {
                let text = std::mem::take(&mut self.mode_buffer);
                self.emit_keyword(&text, scope);
            }
            CaptureScopes::Groups(groups) => {
                self.emit_groups(groups, found)?;
                self.mode_buffer.clear();
            }
            CaptureScopes::None => {}
        }
        self.stack.push(Frame { mode: id, data });
        Ok(())
    }

    fn do_end(&mut self, found: &RuleMatch<'a>) -> Result<Option<usize>> {
        let Some(end_depth) = self.end_of_mode(found)? else {
            return Ok(None);
        };
        let grammar = self.grammar;
        let origin = grammar.mode(self.top());
        let lexeme = found.lexeme();

        match &origin.end_scope {
            CaptureScopes::Wrap(scope) => {
                self.process_buffer()?;
                self.emit_keyword(lexeme, scope);
            }
            CaptureScopes::Groups(groups) if participated(groups, found) => {
                self.process_buffer()?;
                self.emit_groups(groups, found)?;
            }
            // no scoped group took part when an inherited terminator fired
            _ if origin.skip => self.mode_buffer.push_str(lexeme),
            _ => {
                if !(origin.return_end || origin.exclude_end) {
                    self.mode_buffer.push_str(lexeme);
                }
                self.process_buffer()?;
                if origin.exclude_end {
                    self.mode_buffer = lexeme.to_string();
                }
            }
        }

        let ended = self.stack[end_depth].mode;
        while self.stack.len() > end_depth {
            let Some(frame) = self.stack.pop() else {
                break;
            };
            let mode = grammar.mode(frame.mode);
            if mode.scope.is_some() {
                self.tree.close_node();
            }
            if !mode.skip && mode.sub_language.is_none() {
                self.relevance = self.relevance.saturating_add(mode.relevance);
            }
        }
        if let Some(starts) = grammar.mode(ended).starts {
            self.start_mode(starts, found, HookContext::default())?;
        }
        Ok(Some(if origin.return_end { 0 } else { lexeme.len() }))
    }

    /// Find which activation an end event closes, as a stack depth
    ///
    /// The combined matcher only says some end pattern fired; confirm it
    /// against the active mode and, through `endsWithParent`, its ancestors.
    fn end_of_mode(&mut self, found: &RuleMatch<'a>) -> Result<Option<usize>> {
        let grammar = self.grammar;
        let mut depth = self.stack.len() - 1;

        loop {
            let mode = grammar.mode(self.stack[depth].mode);
            let mut matched = match &mode.end {
                Some(end) => end
                    .find_from_pos(self.input, found.index)
                    .map_err(Box::new)?
                    .is_some_and(|m| m.start() == found.index),
                None => false,
            };
            if matched {
                if let Some(hook) = &mode.on_end {
                    let data = &mut self.stack[depth].data;
                    data.reset();
                    hook.on_end(&found.to_lexeme_match(self.input), data);
                    matched = !data.is_ignored();
                }
            }
            if matched {
                // the root is never ended
                while depth > 1 && grammar.mode(self.stack[depth].mode).ends_parent {
                    depth -= 1;
                }
                return Ok(if depth == 0 { None } else { Some(depth) });
            }
            if mode.ends_with_parent && depth > 1 {
                depth -= 1;
                continue;
            }
            return Ok(None);
        }
    }

    fn process_buffer(&mut self) -> Result<()> {
        let grammar = self.grammar;
        let mode = grammar.mode(self.top());
        match &mode.sub_language {
            Some(sub) => self.process_sub_language(sub, mode.relevance)?,
            None => {
                let text = std::mem::take(&mut self.mode_buffer);
                self.emit_keywords(&text)?;
            }
        }
        self.mode_buffer.clear();
        Ok(())
    }

    /// Emit text, classifying the words the active mode knows as keywords
    fn emit_keywords(&mut self, text: &str) -> Result<()> {
        let grammar = self.grammar;
        let Some(keywords) = &grammar.mode(self.top()).keywords else {
            self.tree.add_text(text);
            return Ok(());
        };

        let mut last = 0;
        let mut plain = String::new();
        for word in keywords.pattern.find_iter(text) {
            let word = word.map_err(Box::new)?;
            plain.push_str(&text[last..word.start()]);
            last = word.end();

            let key = if grammar.case_insensitive {
                word.as_str().to_lowercase()
            } else {
                word.as_str().to_string()
            };
            let Some(entry) = keywords.table.get(&key) else {
                plain.push_str(word.as_str());
                continue;
            };

            self.tree.add_text(&plain);
            plain.clear();
            let hits = self.keyword_hits.entry(key).or_insert(0);
            *hits += 1;
            if *hits <= MAX_KEYWORD_HITS {
                self.relevance = self.relevance.saturating_add(entry.relevance);
            }
            if entry.is_hidden() {
                plain.push_str(word.as_str());
            } else {
                self.tree.add_keyword(word.as_str(), grammar.scope_alias(&entry.scope));
            }
        }
        plain.push_str(&text[last..]);
        self.tree.add_text(&plain);
        Ok(())
    }

    fn emit_keyword(&mut self, text: &str, scope: &str) {
        if !text.is_empty() {
            self.tree.add_keyword(text, self.grammar.scope_alias(scope));
        }
    }

    fn emit_groups(&mut self, groups: &BTreeMap<usize, Option<String>>, found: &RuleMatch<'a>) -> Result<()> {
        for (&group, scope) in groups {
            let Some(text) = found.groups.get(group).copied().flatten() else {
                continue;
            };
            match scope {
                Some(scope) => self.emit_keyword(text, scope),
                None => self.emit_keywords(text)?,
            }
        }
        Ok(())
    }

    fn process_sub_language(&mut self, sub: &SubLanguageDef, mode_relevance: u32) -> Result<()> {
        if self.mode_buffer.is_empty() {
            return Ok(());
        }
        let code = std::mem::take(&mut self.mode_buffer);

        let result = match sub {
            SubLanguageDef::One(name) => {
                let Some(grammar) = self.highlighter.get_language(name) else {
                    self.tree.add_text(&code);
                    return Ok(());
                };
                let continuation = self.continuations.get(name).cloned();
                let result = tokenize(
                    self.highlighter,
                    &grammar,
                    name,
                    &code,
                    IllegalPolicy::Skip,
                    continuation.as_deref(),
                )?;
                self.continuations.insert(name.clone(), result.top.clone());
                result
            }
            SubLanguageDef::Any(names) => {
                let subset = if names.is_empty() { None } else { Some(names.as_slice()) };
                self.highlighter.highlight_auto(&code, subset)?
            }
        };

        if mode_relevance > 0 {
            self.relevance = self.relevance.saturating_add(result.relevance);
        }
        self.tree.add_sublanguage(result.tree, result.language.as_deref());
        Ok(())
    }
}

/// Whether any scoped capture group took part in the match
fn participated(groups: &BTreeMap<usize, Option<String>>, found: &RuleMatch<'_>) -> bool {
    groups
        .keys()
        .any(|&group| found.groups.get(group).copied().flatten().is_some())
}

/// Input around `index`, widened to character boundaries
fn context_window(input: &str, index: usize) -> String {
    let mut start = index.saturating_sub(CONTEXT_RADIUS);
    while !input.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (index + CONTEXT_RADIUS).min(input.len());
    while !input.is_char_boundary(end) {
        end += 1;
    }
    input[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::emitter::{ScopeNode, TokenNode};
    use crate::syntax::grammar::{ContainsDef, GrammarDef, KeywordsDef, ModeDef, PatternDef, ScopeDef};
    use crate::config::HighlightConfig;
    use crate::syntax::hooks::{LexemeMatch, ModeHook};
    use std::sync::Arc;

    fn run(def: &GrammarDef, code: &str, policy: IllegalPolicy) -> Result<HighlightResult> {
        let highlighter = Highlighter::empty();
        let grammar = Grammar::compile("test", def)?;
        tokenize(&highlighter, &grammar, "test", code, policy, None)
    }

    fn html(def: &GrammarDef, code: &str) -> String {
        run(def, code, IllegalPolicy::Strict).unwrap().value
    }

    fn string_grammar() -> GrammarDef {
        let escape = ModeDef::default().with_begin(r"\\.").with_relevance(0);
        let string = ModeDef::scoped("string")
            .with_begin("\"")
            .with_end("\"")
            .with_contains(vec![escape.into()]);
        let mut def = GrammarDef::new("strings");
        def.root.contains = vec![string.into()];
        def
    }

    #[test]
    fn test_string_with_escape() {
        let result = run(&string_grammar(), r#"He said "a\"b" ok"#, IllegalPolicy::Strict).unwrap();
        assert_eq!(
            result.value,
            r#"He said <span class="hljs-string">&quot;a\&quot;b&quot;</span> ok"#
        );
        assert!(!result.illegal);
        assert_eq!(result.relevance, 1);
        assert_eq!(result.language.as_deref(), Some("test"));

        let root = result.tree.root();
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children[0], TokenNode::Text("He said ".to_string()));
        assert_eq!(root.children[2], TokenNode::Text(" ok".to_string()));
    }

    #[test]
    fn test_empty_buffer() {
        let result = run(&string_grammar(), "", IllegalPolicy::Strict).unwrap();
        assert_eq!(result.value, "");
        assert_eq!(result.relevance, 0);
        assert!(!result.illegal);
        assert!(result.tree.root().children.is_empty());
    }

    fn illegal_grammar() -> GrammarDef {
        let mut def = GrammarDef::new("strict");
        def.root.illegal = Some(PatternDef::from("@"));
        def.root.keywords = Some(KeywordsDef::from("let"));
        def
    }

    #[test]
    fn test_illegal_strict() {
        let err = run(&illegal_grammar(), "let a @ b", IllegalPolicy::Strict).unwrap_err();
        match err {
            HighlightError::IllegalLexeme { lexeme, mode, index, .. } => {
                assert_eq!(lexeme, "@");
                assert_eq!(mode, "<unnamed>");
                assert_eq!(index, 6);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_illegal_permissive() {
        let result = run(&illegal_grammar(), "let <a> @ b", IllegalPolicy::Permissive).unwrap();
        assert!(result.illegal);
        assert_eq!(result.relevance, 0);
        assert_eq!(result.value, "let &lt;a&gt; @ b");
        let report = result.illegal_by.expect("report");
        assert_eq!(report.index, 8);
        assert!(report.message.contains("Illegal lexeme"));
    }

    #[test]
    fn test_illegal_skip() {
        let result = run(&illegal_grammar(), "let a @ b", IllegalPolicy::Skip).unwrap();
        assert!(!result.illegal);
        assert_eq!(result.value, "<span class=\"hljs-keyword\">let</span> a @ b");
    }

    #[test]
    fn test_keyword_relevance_cap() {
        let mut def = GrammarDef::new("kw");
        def.root.keywords = Some(KeywordsDef::from("fn"));
        let code = vec!["fn"; 10].join(" ");
        let result = run(&def, &code, IllegalPolicy::Strict).unwrap();
        assert_eq!(result.relevance, MAX_KEYWORD_HITS);

        let code = vec!["fn"; 3].join(" ");
        assert_eq!(run(&def, &code, IllegalPolicy::Strict).unwrap().relevance, 3);
    }

    #[test]
    fn test_hidden_and_aliased_keywords() {
        let mut categories = BTreeMap::new();
        categories.insert("built_in".to_string(), "print".into());
        categories.insert("_hint".to_string(), "def".into());
        let mut def = GrammarDef::new("kw");
        def.root.keywords = Some(KeywordsDef::Categories(categories));
        def.class_name_aliases.insert("built_in".to_string(), "title.function".to_string());

        let result = run(&def, "def print", IllegalPolicy::Strict).unwrap();
        assert_eq!(
            result.value,
            "def <span class=\"hljs-title function_\">print</span>"
        );
        assert_eq!(result.relevance, 2);
    }

    #[test]
    fn test_case_insensitive_keywords() {
        let mut def = GrammarDef::new("sql");
        def.case_insensitive = true;
        def.root.keywords = Some(KeywordsDef::from("select"));
        assert_eq!(
            html(&def, "SELECT x"),
            "<span class=\"hljs-keyword\">SELECT</span> x"
        );
    }

    #[test]
    fn test_ends_with_parent() {
        let attr = ModeDef::scoped("attr").with_begin("=").ends_with_parent();
        let tag = ModeDef::scoped("tag")
            .with_begin("<")
            .with_end(">")
            .with_contains(vec![attr.into()]);
        let mut def = GrammarDef::new("tags");
        def.root.contains = vec![tag.into()];

        assert_eq!(
            html(&def, "<a=b> c"),
            "<span class=\"hljs-tag\">&lt;a<span class=\"hljs-attr\">=b&gt;</span></span> c"
        );
    }

    #[test]
    fn test_ends_with_parent_keeps_inherited_end() {
        let mut scopes = BTreeMap::new();
        scopes.insert("1".to_string(), "punctuation".to_string());
        let mut attr = ModeDef::scoped("attr")
            .with_begin("=")
            .with_end(PatternDef::Seq(vec![";".to_string()]))
            .ends_with_parent();
        attr.end_scope = Some(ScopeDef::Captures(scopes));
        let tag = ModeDef::scoped("tag")
            .with_begin("<")
            .with_end(">")
            .with_contains(vec![attr.into()]);
        let mut def = GrammarDef::new("tags");
        def.root.contains = vec![tag.into()];

        // the tag's terminator ends the attribute: its lexeme stays text
        let result = run(&def, "<a=b> c", IllegalPolicy::Strict).unwrap();
        assert_eq!(result.tree.text(), "<a=b> c");
        assert_eq!(
            result.value,
            "<span class=\"hljs-tag\">&lt;a<span class=\"hljs-attr\">=b&gt;</span></span> c"
        );

        // the attribute's own end gets its capture scope
        assert_eq!(
            html(&def, "<a=b;> c"),
            "<span class=\"hljs-tag\">&lt;a<span class=\"hljs-attr\">=b<span class=\"hljs-punctuation\">;</span></span>&gt;</span> c"
        );
    }

    #[test]
    fn test_recursive_mode_ending_with_parent() {
        let paren = ModeDef::scoped("p")
            .with_begin(r"\(")
            .ends_with_parent()
            .with_contains(vec![ContainsDef::named("paren")]);
        let tag = ModeDef::scoped("tag")
            .with_begin("<")
            .with_end(">")
            .with_contains(vec![ContainsDef::named("paren")]);
        let mut def = GrammarDef::new("tags").with_mode("paren", paren);
        def.root.contains = vec![tag.into()];

        let result = run(&def, "<a (b (c)) d> e", IllegalPolicy::Strict).unwrap();
        assert_eq!(
            result.value,
            "<span class=\"hljs-tag\">&lt;a <span class=\"hljs-p\">(b <span class=\"hljs-p\">(c)) d&gt;</span></span></span> e"
        );
        assert_eq!(result.relevance, 3);
    }

    #[test]
    fn test_ends_with_parent_nested() {
        let inner = ModeDef::scoped("b").with_begin(":").ends_with_parent();
        let middle = ModeDef::scoped("a")
            .with_begin("=")
            .ends_with_parent()
            .with_contains(vec![inner.into()]);
        let outer = ModeDef::scoped("o")
            .with_begin(r"\(")
            .with_end(r"\)")
            .with_contains(vec![middle.into()]);
        let mut def = GrammarDef::new("nest");
        def.root.contains = vec![outer.into()];

        let result = run(&def, "(x=y:z) w", IllegalPolicy::Strict).unwrap();
        assert_eq!(
            result.value,
            "<span class=\"hljs-o\">(x<span class=\"hljs-a\">=y<span class=\"hljs-b\">:z)</span></span></span> w"
        );
        // every mode that ended contributed its relevance
        assert_eq!(result.relevance, 3);
    }

    #[test]
    fn test_exclude_and_return() {
        let mut quoted = ModeDef::scoped("string").with_begin("'").with_end("'");
        quoted.exclude_begin = true;
        quoted.exclude_end = true;
        let mut def = GrammarDef::new("x");
        def.root.contains = vec![quoted.into()];
        assert_eq!(html(&def, "'ab'"), "'<span class=\"hljs-string\">ab</span>'");

        let mut word = ModeDef::scoped("title").with_begin(r"(?=\w)").with_end(r"\b");
        word.return_begin = true;
        let mut def = GrammarDef::new("y");
        def.root.contains = vec![word.into()];
        assert_eq!(html(&def, "ab "), "<span class=\"hljs-title\">ab</span> ");
    }

    #[test]
    fn test_begin_and_end_scopes() {
        let mut mode = ModeDef::scoped("string").with_begin("<<").with_end(">>");
        mode.begin_scope = Some(ScopeDef::from("punctuation"));
        mode.end_scope = Some(ScopeDef::from("punctuation"));
        let mut def = GrammarDef::new("x");
        def.root.contains = vec![mode.into()];
        assert_eq!(
            html(&def, "<<a>>"),
            "<span class=\"hljs-string\"><span class=\"hljs-punctuation\">&lt;&lt;</span>a<span class=\"hljs-punctuation\">&gt;&gt;</span></span>"
        );
    }

    #[test]
    fn test_multi_capture_scopes() {
        let mut mode = ModeDef::default();
        mode.match_ = Some(PatternDef::Seq(vec![
            "fn".to_string(),
            r"\s+".to_string(),
            r"\w+".to_string(),
        ]));
        let mut scopes = BTreeMap::new();
        scopes.insert("1".to_string(), "keyword".to_string());
        scopes.insert("3".to_string(), "title.function".to_string());
        mode.scope = Some(ScopeDef::Captures(scopes));
        let mut def = GrammarDef::new("x");
        def.root.contains = vec![mode.into()];

        assert_eq!(
            html(&def, "fn main"),
            "<span class=\"hljs-keyword\">fn</span> <span class=\"hljs-title function_\">main</span>"
        );
    }

    #[test]
    fn test_begin_keywords_skip_after_dot() {
        let mut class = ModeDef::scoped("class").with_end(r"\{");
        class.begin_keywords = Some("class".to_string());
        class.exclude_end = true;
        let mut def = GrammarDef::new("x");
        def.root.contains = vec![class.into()];

        assert_eq!(
            html(&def, "class A{"),
            "<span class=\"hljs-class\"><span class=\"hljs-keyword\">class</span> A</span>{"
        );
        assert_eq!(html(&def, "a.class{"), "a.class{");
    }

    #[test]
    fn test_starts_continuation() {
        let value = ModeDef::scoped("string").with_begin(r"\S").with_end("$");
        let mut key = ModeDef::scoped("attr").with_begin(r"\w+").with_end("=");
        key.starts = Some(Box::new(value));
        let mut def = GrammarDef::new("ini");
        def.root.contains = vec![key.into()];

        assert_eq!(
            html(&def, "a=b\n"),
            "<span class=\"hljs-attr\">a=</span><span class=\"hljs-string\">b</span>\n"
        );
    }

    #[test]
    fn test_ends_parent() {
        let mut name = ModeDef::scoped("title").with_begin(r"\w+").with_end(r"\b");
        name.ends_parent = true;
        let decl = ModeDef::scoped("function")
            .with_begin(r"fn\s")
            .with_end(";")
            .with_contains(vec![name.into()]);
        let mut def = GrammarDef::new("x");
        def.root.contains = vec![decl.into()];

        assert_eq!(
            html(&def, "fn ab();"),
            "<span class=\"hljs-function\">fn <span class=\"hljs-title\">ab</span></span>();"
        );
    }

    #[test]
    fn test_before_match() {
        let mut title = ModeDef::scoped("title").with_match(r"\w+");
        title.before_match = Some(r"fn\s+".to_string());
        let mut def = GrammarDef::new("x");
        def.root.contains = vec![title.into()];

        assert_eq!(html(&def, "fn ab x"), "fn <span class=\"hljs-title\">ab</span> x");
        assert_eq!(html(&def, "ab"), "ab");
    }

    #[test]
    fn test_end_same_as_begin() {
        let mut heredoc = ModeDef::scoped("string").with_begin(r"<<(\w+)").with_end(r"(\w+)");
        heredoc.end_same_as_begin = true;
        let mut def = GrammarDef::new("sh");
        def.root.contains = vec![heredoc.into()];

        assert_eq!(
            html(&def, "<<EOF a b EOF c"),
            "<span class=\"hljs-string\">&lt;&lt;EOF a b EOF</span> c"
        );
    }

    #[derive(Debug)]
    struct NoDigits;

    impl ModeHook for NoDigits {
        fn on_begin(&self, m: &LexemeMatch<'_>, ctx: &mut HookContext) {
            if m.lexeme().chars().any(|c| c.is_ascii_digit()) {
                ctx.ignore_match();
            }
        }
    }

    #[test]
    fn test_custom_hook_veto_tries_next_rule() {
        let mut word = ModeDef::scoped("title").with_match(r"\w+");
        word.on_begin = Some("noDigits".to_string());
        let number = ModeDef::scoped("number").with_match(r"\w+");
        let mut def = GrammarDef::new("x").with_hook("noDigits", Arc::new(NoDigits));
        def.root.contains = vec![word.into(), number.into()];

        // the vetoed rule is retried by the next one at the same offset
        assert_eq!(
            html(&def, "ab 12"),
            "<span class=\"hljs-title\">ab</span> <span class=\"hljs-number\">12</span>"
        );
    }

    #[test]
    fn test_veto_of_last_rule_moves_on() {
        let mut word = ModeDef::scoped("title").with_match(r"\w+");
        word.on_begin = Some("noDigits".to_string());
        let mut def = GrammarDef::new("x").with_hook("noDigits", Arc::new(NoDigits));
        def.root.contains = vec![word.into()];

        let result = run(&def, "1a b", IllegalPolicy::Strict).unwrap();
        assert_eq!(
            result.value,
            "1<span class=\"hljs-title\">a</span> <span class=\"hljs-title\">b</span>"
        );
    }

    #[test]
    fn test_zero_width_begin_end_advances() {
        let empty = ModeDef::scoped("x").with_begin(r"(?=a)").with_end(r"\B|\b");
        let mut def = GrammarDef::new("z");
        def.root.contains = vec![empty.into()];
        let result = run(&def, "aa", IllegalPolicy::Strict).unwrap();
        assert_eq!(result.tree.text(), "aa");
        assert!(!result.illegal);
    }

    fn debug_run(def: &GrammarDef, code: &str, policy: IllegalPolicy) -> Result<HighlightResult> {
        let mut highlighter = Highlighter::empty();
        highlighter.configure(HighlightConfig {
            safe_mode: false,
            ..HighlightConfig::default()
        });
        let grammar = Grammar::compile("test", def)?;
        tokenize(&highlighter, &grammar, "test", code, policy, None)
    }

    #[test]
    fn test_zero_width_begin_end_fails_in_debug_mode() {
        let empty = ModeDef::scoped("x").with_begin(r"(?=a)").with_end(r"\B|\b");
        let mut def = GrammarDef::new("z");
        def.root.contains = vec![empty.into()];

        for policy in [IllegalPolicy::Strict, IllegalPolicy::Permissive, IllegalPolicy::Skip] {
            match debug_run(&def, "aa", policy) {
                Err(HighlightError::ZeroWidthMatch { language }) => assert_eq!(language, "test"),
                other => panic!("expected a zero width error, got {other:?}"),
            }
        }
    }

    /// A mode that begins and ends on the same lexeme without consuming it
    fn stuck_grammar() -> GrammarDef {
        let mut stuck = ModeDef::scoped("x").with_begin("x").with_end("x");
        stuck.return_begin = true;
        stuck.return_end = true;
        let mut def = GrammarDef::new("stuck");
        def.root.contains = vec![stuck.into()];
        def
    }

    #[test]
    fn test_loop_detected_strict() {
        match run(&stuck_grammar(), "x", IllegalPolicy::Strict) {
            Err(HighlightError::LoopDetected { iterations, index }) => {
                assert_eq!(index, 0);
                assert!(iterations > GUARD_ITERATIONS);
            }
            other => panic!("expected a loop error, got {other:?}"),
        }
    }

    #[test]
    fn test_loop_detected_permissive() {
        let result = run(&stuck_grammar(), "x", IllegalPolicy::Permissive).unwrap();
        assert!(result.illegal);
        assert_eq!(result.relevance, 0);
        assert_eq!(result.value, "x");
        let report = result.illegal_by.expect("report");
        assert_eq!(report.index, 0);
        assert!(report.message.contains("infinite loop"));
    }

    #[test]
    fn test_self_nesting() {
        let block = ModeDef::scoped("block")
            .with_begin(r"\{")
            .with_end(r"\}")
            .with_contains(vec![ContainsDef::self_ref()]);
        let mut def = GrammarDef::new("x");
        def.root.contains = vec![block.into()];

        let result = run(&def, "{a{b}c}", IllegalPolicy::Strict).unwrap();
        let TokenNode::Scope(outer) = &result.tree.root().children[0] else {
            panic!("expected a block");
        };
        let inner: Vec<&ScopeNode> = outer
            .children
            .iter()
            .filter_map(|c| match c {
                TokenNode::Scope(node) => Some(node),
                TokenNode::Text(_) => None,
            })
            .collect();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].text(), "{b}");
        assert_eq!(result.relevance, 2);
    }

    #[test]
    fn test_context_window_is_char_aligned() {
        let text = "é".repeat(200);
        let window = context_window(&text, 201);
        assert!(window.len() <= 2 * CONTEXT_RADIUS + 2);
        assert!(window.chars().all(|c| c == 'é'));
        assert_eq!(context_window("abc", 1), "abc");
    }
}
