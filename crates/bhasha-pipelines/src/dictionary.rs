//! Word-by-word English to Nepali dictionary used when no translation
//! pipeline can be loaded.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Word list shipped with the crate.
const EMBEDDED_WORDS: &str = include_str!("../data/en_ne.toml");

/// Characters ignored when looking a word up.
const STRIPPED: [char; 6] = ['.', ',', '!', '?', ';', ':'];

/// Errors loading a dictionary file.
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// The file could not be read.
    #[error("Failed to read dictionary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid word list.
    #[error("Invalid dictionary: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize)]
struct WordList {
    #[serde(default)]
    words: HashMap<String, String>,
}

/// Flat lookup table from lowercase English words to Nepali.
#[derive(Debug, Clone)]
pub struct FallbackDictionary {
    words: HashMap<String, String>,
}

impl FallbackDictionary {
    /// Parses a word list with a `[words]` table.
    ///
    /// Keys are lowercased so lookups are case-insensitive.
    pub fn from_toml_str(content: &str) -> Result<Self, DictionaryError> {
        let list: WordList = toml::from_str(content)?;
        let words = list.words.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect();
        Ok(Self { words })
    }

    /// Loads a word list from disk.
    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| DictionaryError::Io { path: path.to_path_buf(), source })?;
        let dictionary = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), words = dictionary.len(), "Loaded fallback dictionary");
        Ok(dictionary)
    }

    /// Translates word by word. Unknown words are kept as typed (lowercased).
    #[must_use]
    pub fn translate(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        lower
            .split_whitespace()
            .map(|word| {
                let clean: String = word.chars().filter(|c| !STRIPPED.contains(c)).collect();
                self.words.get(&clean).map_or(word, String::as_str)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Looks up a single word.
    #[must_use]
    pub fn lookup(&self, word: &str) -> Option<&str> {
        self.words.get(&word.to_lowercase()).map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the dictionary has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for FallbackDictionary {
    fn default() -> Self {
        Self::from_toml_str(EMBEDDED_WORDS).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Embedded word list is invalid");
            Self { words: HashMap::new() }
        })
    }
}
