//! Backend candidates and the allow-lists that guard them.

use bhasha_abstraction::Task;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One named backend configuration a factory may attempt, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Model name as known by the backend (e.g. `Xenova/m2m100_418M`).
    pub name: String,
    /// Human readable description (size, languages, trade-offs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Source language code in this model's notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_lang: Option<String>,
    /// Target language code in this model's notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tgt_lang: Option<String>,
}

impl Candidate {
    /// Creates a candidate with only a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, src_lang: None, tgt_lang: None }
    }

    /// Sets the language pair of this candidate.
    #[must_use]
    pub fn with_languages(mut self, src_lang: impl Into<String>, tgt_lang: impl Into<String>) -> Self {
        self.src_lang = Some(src_lang.into());
        self.tgt_lang = Some(tgt_lang.into());
        self
    }

    /// Sets the description of this candidate.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(src), Some(tgt)) = (&self.src_lang, &self.tgt_lang) {
            write!(f, " ({src} -> {tgt})")?;
        }
        Ok(())
    }
}

/// Default candidate list for a task.
///
/// Translation tries the large, most accurate model first and falls back to
/// a medium sized one with direct English to Nepali support.
#[must_use]
pub fn default_candidates(task: Task) -> Vec<Candidate> {
    match task {
        Task::Translation => vec![
            Candidate::new("Xenova/nllb-200-distilled-600M")
                .with_languages("eng_Latn", "npi_Deva")
                .with_description("Large but most accurate (~600MB) - native Nepali support"),
            Candidate::new("Xenova/m2m100_418M")
                .with_languages("en", "ne")
                .with_description("Medium size (~400MB) - direct English to Nepali"),
        ],
        Task::SentimentAnalysis => vec![
            Candidate::new("Xenova/bert-base-multilingual-uncased-sentiment")
                .with_description("Multilingual review sentiment (1-5 stars)"),
        ],
    }
}

/// Case-insensitive name patterns a candidate must match to be attempted.
#[derive(Debug, Clone)]
pub struct AllowList {
    patterns: Vec<Regex>,
}

impl AllowList {
    /// Builds an allow-list from regex patterns.
    ///
    /// # Errors
    /// Returns the regex error if any pattern is invalid.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// An allow-list that accepts every name.
    #[must_use]
    pub fn allow_all() -> Self {
        Self { patterns: Vec::new() }
    }

    /// The built-in patterns for a task.
    #[must_use]
    pub fn for_task(task: Task) -> Self {
        let patterns: &[&str] = match task {
            Task::Translation => {
                &["opus-mt", "marianmt", "nllb", "m2m100", "mbart", "t5", "translation"]
            }
            Task::SentimentAnalysis => &["sentiment", "sst", "bert", "roberta", "emotion"],
        };
        // The built-in patterns are plain literals.
        Self::new(patterns.iter().map(|p| regex::escape(p))).unwrap_or_else(|_| Self::allow_all())
    }

    /// Returns `true` if `name` may be attempted.
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(name))
    }
}
