//! Error types for modelight

use thiserror::Error;

/// Result type alias for highlighting operations
pub type Result<T> = std::result::Result<T, HighlightError>;

/// Highlighting error types
#[derive(Error, Debug)]
pub enum HighlightError {
    /// The grammar itself is malformed
    #[error("invalid grammar `{language}`: {message}")]
    Compile { language: String, message: String },

    /// A pattern in the grammar could not be compiled
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },

    /// The regex engine gave up while matching (backtracking limit)
    #[error("regex failure: {0}")]
    Regex(#[from] Box<fancy_regex::Error>),

    #[error("Illegal lexeme \"{lexeme}\" for mode \"{mode}\"")]
    IllegalLexeme {
        lexeme: String,
        mode: String,
        index: usize,
        context: String,
    },

    #[error("potential infinite loop, way more iterations than matches ({iterations} at offset {index})")]
    LoopDetected { iterations: usize, index: usize },

    #[error("0 width match regex ({language})")]
    ZeroWidthMatch { language: String },

    #[error("Unknown language: \"{0}\"")]
    UnknownLanguage(String),

    /// Bad command line
    #[error("{0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HighlightError {
    pub(crate) fn compile(language: &str, message: impl Into<String>) -> Self {
        HighlightError::Compile {
            language: language.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error is an illegal lexeme rather than an engine fault
    pub fn is_illegal(&self) -> bool {
        matches!(self, HighlightError::IllegalLexeme { .. })
    }
}
