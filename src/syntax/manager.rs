//! Language registry and highlighting entry points
//!
//! The `Highlighter` owns the compiled grammars, the aliases that point at
//! them, the configuration and the lifecycle listeners. Grammars are
//! compiled once when registered and shared read-only by every call, so a
//! `Highlighter` can serve many threads at once.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use super::builtin;
use super::compiler::Grammar;
use super::detect;
use super::grammar::GrammarDef;
use super::result::{HighlightResult, IllegalPolicy};
use super::tokenizer::{self, Frame};
use crate::config::HighlightConfig;
use crate::error::{HighlightError, Result};

/// Options of a `Highlighter::highlight` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightOptions {
    pub language: String,
    /// Degrade to plain text on an illegal lexeme instead of failing
    pub ignore_illegals: bool,
}

impl HighlightOptions {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            ignore_illegals: false,
        }
    }

    pub fn ignore_illegals(mut self, ignore: bool) -> Self {
        self.ignore_illegals = ignore;
        self
    }
}

/// What a `before_highlight` listener may change
#[derive(Debug, Clone)]
pub struct BeforeHighlight {
    pub code: String,
    pub language: String,
    /// A finished result; when set, no highlighting is done
    pub result: Option<HighlightResult>,
}

/// Observer of `Highlighter::highlight` calls, invoked in registration order
pub trait HighlightListener: Send + Sync {
    fn before_highlight(&self, _context: &mut BeforeHighlight) {}

    fn after_highlight(&self, _result: &mut HighlightResult) {}
}

/// Language registry and highlighting engine
pub struct Highlighter {
    /// Compiled grammars by lowercase name
    languages: HashMap<String, Arc<Grammar>>,
    /// Lowercase alias -> language name
    aliases: HashMap<String, String>,
    listeners: Vec<Box<dyn HighlightListener>>,
    config: HighlightConfig,
}

impl Highlighter {
    /// Create a highlighter with the built-in languages
    pub fn new() -> Self {
        Self::with_config(HighlightConfig::default())
    }

    pub fn with_config(config: HighlightConfig) -> Self {
        let mut highlighter = Self {
            config,
            ..Self::empty()
        };

        for (name, def) in builtin::all_languages() {
            if let Err(e) = highlighter.register_language(name, &def) {
                error!(language = name, error = %e, "built-in language failed to compile");
            }
        }

        highlighter
    }

    /// A highlighter with no languages and the default configuration
    pub fn empty() -> Self {
        Self {
            languages: HashMap::new(),
            aliases: HashMap::new(),
            listeners: Vec::new(),
            config: HighlightConfig::default(),
        }
    }

    pub fn config(&self) -> &HighlightConfig {
        &self.config
    }

    pub fn configure(&mut self, config: HighlightConfig) {
        self.config = config;
    }

    pub fn class_prefix(&self) -> &str {
        &self.config.class_prefix
    }

    /// Compile and register a grammar
    ///
    /// A grammar that fails to compile is replaced by the plain-text
    /// grammar. In safe mode the failure is only logged; otherwise it is
    /// returned as well.
    pub fn register_language(&mut self, name: &str, def: &GrammarDef) -> Result<()> {
        let key = name.to_lowercase();
        match Grammar::compile(name, def) {
            Ok(grammar) => {
                let aliases = grammar.aliases.clone();
                debug!(language = %key, modes = grammar.mode_count(), "registered language");
                self.languages.insert(key.clone(), Arc::new(grammar));
                self.register_aliases(aliases.as_slice(), &key);
                Ok(())
            }
            Err(e) => {
                error!(language = %key, error = %e, "language definition could not be registered");
                let fallback = Grammar::compile(name, &GrammarDef::plaintext())?;
                self.languages.insert(key, Arc::new(fallback));
                if self.config.safe_mode {
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Remove a language and every alias pointing at it
    pub fn unregister_language(&mut self, name: &str) -> bool {
        let key = name.to_lowercase();
        self.aliases.retain(|_, language| *language != key);
        self.languages.remove(&key).is_some()
    }

    pub fn register_aliases<S: AsRef<str>>(&mut self, aliases: &[S], language: &str) {
        for alias in aliases {
            self.aliases
                .insert(alias.as_ref().to_lowercase(), language.to_lowercase());
        }
    }

    /// List registered languages
    pub fn list_languages(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.languages.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Look up a grammar by name or alias, ignoring case
    pub fn get_language(&self, name: &str) -> Option<Arc<Grammar>> {
        let key = name.to_lowercase();
        self.languages
            .get(&key)
            .or_else(|| self.aliases.get(&key).and_then(|l| self.languages.get(l)))
            .cloned()
    }

    /// Whether the language takes part in auto-detection
    pub fn auto_detection(&self, name: &str) -> bool {
        self.get_language(name)
            .is_some_and(|grammar| !grammar.disable_autodetect)
    }

    pub fn add_listener(&mut self, listener: Box<dyn HighlightListener>) {
        self.listeners.push(listener);
    }

    /// Highlight `code` as the given language
    pub fn highlight(&self, code: &str, options: &HighlightOptions) -> Result<HighlightResult> {
        let mut context = BeforeHighlight {
            code: code.to_string(),
            language: options.language.clone(),
            result: None,
        };
        for listener in &self.listeners {
            listener.before_highlight(&mut context);
        }

        let mut result = match context.result.take() {
            Some(result) => result,
            None => self.highlight_with(
                &context.language,
                &context.code,
                IllegalPolicy::from_ignore_illegals(options.ignore_illegals),
                None,
            )?,
        };
        result.code = context.code;

        for listener in &self.listeners {
            listener.after_highlight(&mut result);
        }
        Ok(result)
    }

    /// Highlight `code` with the best matching language
    ///
    /// Candidates are `subset`, else the configured `languages`, else every
    /// registered language.
    pub fn highlight_auto(&self, code: &str, subset: Option<&[String]>) -> Result<HighlightResult> {
        let all: Vec<String>;
        let candidates = match (subset, &self.config.languages) {
            (Some(subset), _) => subset,
            (None, Some(configured)) => configured.as_slice(),
            (None, None) => {
                all = self.list_languages().into_iter().map(str::to_string).collect();
                all.as_slice()
            }
        };
        detect::detect(self, code, candidates)
    }

    pub(crate) fn highlight_with(
        &self,
        language: &str,
        code: &str,
        policy: IllegalPolicy,
        continuation: Option<&[Frame]>,
    ) -> Result<HighlightResult> {
        let grammar = self
            .get_language(language)
            .ok_or_else(|| HighlightError::UnknownLanguage(language.to_string()))?;
        tokenizer::tokenize(self, &grammar, language, code, policy, continuation)
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}
