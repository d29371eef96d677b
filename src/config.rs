//! Search configuration.
//!
//! The engine only consumes configuration; storage belongs to the caller.
//! `SearchConfig::load` reads the JSON shape used by the dashboard settings
//! files (camelCase keys, every field optional).

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::expression::DEFAULT_SIMILARITY_THRESHOLD;
use crate::models::SearchApproach;

/// Default number of candidates requested per text search.
pub const DEFAULT_SEARCH_LIMIT: usize = 25;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("at least one search approach is required")]
    NoApproaches,

    #[error("duplicate search approach id '{0}'")]
    DuplicateApproach(String),

    #[error("search approach id must not be empty")]
    EmptyApproachId,
}

/// Text sets used by the normalizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizeSettings {
    /// Substrings removed when an approach is `filtered` (matched case-insensitively)
    pub noise_words: Vec<String>,
    /// Characters removed when `filtered` or `ignoreQuotes` is set
    pub quote_chars: Vec<char>,
    /// Characters trimmed from both ends and used as trim-suffix openers
    pub separators: Vec<char>,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            noise_words: [
                "remastered",
                "remaster",
                "radio edit",
                "single version",
                "album version",
                "original mix",
                "explicit",
                "deluxe edition",
                "bonus track",
                "live",
                "mono",
                "stereo",
                "feat.",
                "ft.",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            quote_chars: vec!['\'', '"', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{00B4}', '`'],
            separators: vec!['-', '\u{2013}', '\u{2014}'],
        }
    }
}

/// A configured match filter: an expression plus an optional label shown in UIs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchFilter {
    #[serde(default)]
    pub reason: Option<String>,
    pub filter: String,
}

impl MatchFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            reason: None,
            filter: filter.into(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    /// Tried strictly in order; first non-empty result wins
    pub approaches: Vec<SearchApproach>,
    pub normalize: NormalizeSettings,
    /// Threshold used by `field:similarity` terms that omit `>=n`
    pub default_similarity: f64,
    /// Empty means every candidate is accepted
    pub match_filters: Vec<MatchFilter>,
    pub search_limit: usize,
    pub album_fallback: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            approaches: SearchApproach::defaults(),
            normalize: NormalizeSettings::default(),
            default_similarity: DEFAULT_SIMILARITY_THRESHOLD,
            match_filters: Vec::new(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            album_fallback: true,
        }
    }
}

impl SearchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SearchConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_approaches(mut self, approaches: Vec<SearchApproach>) -> Self {
        self.approaches = approaches;
        self
    }

    pub fn with_filters(mut self, filters: Vec<MatchFilter>) -> Self {
        self.match_filters = filters;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.approaches.is_empty() {
            return Err(ConfigError::NoApproaches);
        }
        let mut seen = FxHashSet::default();
        for approach in &self.approaches {
            if approach.id.trim().is_empty() {
                return Err(ConfigError::EmptyApproachId);
            }
            if !seen.insert(approach.id.as_str()) {
                return Err(ConfigError::DuplicateApproach(approach.id.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = SearchConfig::from_json("{}").unwrap();
        assert_eq!(config, SearchConfig::default());
        assert_eq!(config.approaches[0].id, "normal");
        assert_eq!(config.default_similarity, 0.8);
    }

    #[test]
    fn test_camel_case_keys() {
        let config = SearchConfig::from_json(
            r#"{
                "approaches": [{"id": "only", "filtered": true, "ignoreQuotes": true}],
                "matchFilters": [{"reason": "exact", "filter": "artist:match AND title:match"}],
                "searchLimit": 5,
                "albumFallback": false
            }"#,
        )
        .unwrap();
        assert_eq!(config.approaches.len(), 1);
        assert!(config.approaches[0].ignore_quotes);
        assert!(!config.approaches[0].trim);
        assert_eq!(config.match_filters[0].reason.as_deref(), Some("exact"));
        assert_eq!(config.search_limit, 5);
        assert!(!config.album_fallback);
    }

    #[test]
    fn test_rejects_duplicate_approaches() {
        let err = SearchConfig::from_json(r#"{"approaches": [{"id": "a"}, {"id": "a"}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_empty_approach_list() {
        assert!(matches!(
            SearchConfig::from_json(r#"{"approaches": []}"#),
            Err(ConfigError::NoApproaches)
        ));
    }
}
