//! modelight - grammar-driven syntax highlighting
//!
//! Languages are described declaratively as trees of modes (see
//! [`GrammarDef`]), compiled once, and used to turn source text into
//! HTML with scope classes or into a token tree.
//!
//! ```no_run
//! use modelight::{Highlighter, HighlightOptions};
//!
//! let hl = Highlighter::new();
//! let result = hl.highlight("fn main() {}", &HighlightOptions::new("rust"))?;
//! println!("{}", result.value);
//! # Ok::<(), modelight::HighlightError>(())
//! ```

pub mod config;
pub mod error;
pub mod syntax;

pub use config::HighlightConfig;
pub use error::{HighlightError, Result};
pub use syntax::{
    GrammarDef, HighlightListener, HighlightOptions, HighlightResult, Highlighter, IllegalPolicy,
    ModeDef, TokenTree,
};
