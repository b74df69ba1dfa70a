//! Configuration file support
//!
//! Loads settings from ~/.modelight.toml (or %USERPROFILE%\.modelight.toml on Windows)
//!
//! Example:
//! ```text
//! # modelight configuration
//! class-prefix = "hljs-"
//! safe-mode = true
//! ignore-illegals = false
//! languages = ["rust", "json"]
//! ```
//!
//! Keys may also be written with underscores. A value of the wrong type is
//! ignored and the default kept.

use std::fs;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::Result;
use crate::syntax::DEFAULT_CLASS_PREFIX;

/// Configuration settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightConfig {
    /// Prefix of every scope class in rendered HTML
    pub class_prefix: String,
    /// Recover from grammar defects instead of failing (see `Highlighter`)
    pub safe_mode: bool,
    /// Languages considered by auto-detection; all registered when unset
    pub languages: Option<Vec<String>>,
    /// Default illegal handling for the command line
    pub ignore_illegals: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            class_prefix: DEFAULT_CLASS_PREFIX.to_string(),
            safe_mode: true,
            languages: None,
            ignore_illegals: false,
        }
    }
}

impl HighlightConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            std::env::var("USERPROFILE")
                .ok()
                .map(|home| PathBuf::from(home).join(".modelight.toml"))
        }

        #[cfg(not(windows))]
        {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".modelight.toml"))
        }
    }

    /// Load configuration from the config file, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        let Ok(contents) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match Self::parse(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                Self::default()
            }
        }
    }

    /// Parse config file contents
    ///
    /// Fails only when the text is not TOML at all.
    pub fn parse(contents: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(contents)?;
        let mut config = Self::default();
        config.apply(&table);
        Ok(config)
    }

    /// Apply settings from a parsed config table
    fn apply(&mut self, table: &toml::Table) {
        for (key, value) in table {
            match key.replace('_', "-").as_str() {
                "class-prefix" => set(&mut self.class_prefix, key, value),
                "safe-mode" => set(&mut self.safe_mode, key, value),
                "ignore-illegals" => set(&mut self.ignore_illegals, key, value),
                "languages" => {
                    let mut languages = Vec::new();
                    set(&mut languages, key, value);
                    if !languages.is_empty() {
                        self.languages = Some(languages);
                    }
                }
                _ => warn!(key = %key, "unknown config key"),
            }
        }
    }
}

fn set<T: DeserializeOwned>(slot: &mut T, key: &str, value: &toml::Value) {
    match value.clone().try_into() {
        Ok(v) => *slot = v,
        Err(e) => warn!(key, error = %e, "ignoring invalid config value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HighlightConfig::default();
        assert_eq!(config.class_prefix, "hljs-");
        assert!(config.safe_mode);
        assert!(config.languages.is_none());
        assert!(!config.ignore_illegals);
    }

    #[test]
    fn test_parse_config() {
        let contents = r#"
# Comment
class-prefix = "hl-"
safe_mode = false
ignore-illegals = true
languages = ["rust", "json"]
        "#;

        let config = HighlightConfig::parse(contents).unwrap();
        assert_eq!(config.class_prefix, "hl-");
        assert!(!config.safe_mode);
        assert!(config.ignore_illegals);
        assert_eq!(
            config.languages,
            Some(vec!["rust".to_string(), "json".to_string()])
        );
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let contents = r#"
class-prefix = 3
safe-mode = "sometimes"
languages = []
colour = "red"
        "#;

        let config = HighlightConfig::parse(contents).unwrap();
        assert_eq!(config, HighlightConfig::default());
    }

    #[test]
    fn test_not_toml() {
        assert!(HighlightConfig::parse("this is = = not toml").is_err());
    }
}
