//! Core data models for track matching.
//!
//! This module contains the wanted/candidate track types, the search trace
//! types and the comparison results shared by the comparator, the filter
//! engine and the search session.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Wanted Tracks
// ============================================================================

/// A song we are looking for in the library.
/// `artists` is ordered; the first entry is the preferred spelling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WantedTrack {
    pub id: String,
    pub artists: Vec<String>,
    pub title: String,
    #[serde(default)]
    pub album: Option<String>,
}

impl WantedTrack {
    pub fn new(id: impl Into<String>, artists: Vec<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            artists,
            title: title.into(),
            album: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Preferred artist name, empty when the track has no artists.
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }
}

// ============================================================================
// Provider Models
// ============================================================================

/// Track returned by the library provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTrack {
    pub id: String,
    /// Display artist as the library credits it (may be "A & B", "Various Artists", ...)
    pub artist_title: String,
    pub title: String,
    #[serde(default)]
    pub album_title: Option<String>,
    /// Opaque locator the caller uses to fetch/play the track
    pub source: String,
}

/// Album returned by the provider's album search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist_title: Option<String>,
}

// ============================================================================
// Search Approaches
// ============================================================================

/// Named normalization policy applied before querying the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchApproach {
    pub id: String,
    #[serde(default)]
    pub filtered: bool,
    #[serde(default)]
    pub trim: bool,
    #[serde(default)]
    pub ignore_quotes: bool,
}

impl SearchApproach {
    pub fn new(id: impl Into<String>, filtered: bool, trim: bool, ignore_quotes: bool) -> Self {
        Self {
            id: id.into(),
            filtered,
            trim,
            ignore_quotes,
        }
    }

    /// The default approach order: raw text first, then progressively noisier cleanups.
    pub fn defaults() -> Vec<SearchApproach> {
        vec![
            SearchApproach::new("normal", false, false, false),
            SearchApproach::new("filtered", true, false, false),
            SearchApproach::new("trimmed", true, true, false),
            SearchApproach::new("quotes", false, false, true),
        ]
    }
}

// ============================================================================
// Comparison Results
// ============================================================================

/// Field of a (wanted, candidate) pair that match filters can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchField {
    Artist,
    Title,
    Album,
    ArtistWithTitle,
    ArtistInTitle,
}

impl MatchField {
    pub const ALL: [MatchField; 5] = [
        MatchField::Artist,
        MatchField::Title,
        MatchField::Album,
        MatchField::ArtistWithTitle,
        MatchField::ArtistInTitle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchField::Artist => "artist",
            MatchField::Title => "title",
            MatchField::Album => "album",
            MatchField::ArtistWithTitle => "artistWithTitle",
            MatchField::ArtistInTitle => "artistInTitle",
        }
    }

    pub fn parse(s: &str) -> Option<MatchField> {
        MatchField::ALL.into_iter().find(|f| f.as_str() == s)
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-valued comparison between two strings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComparisonResult {
    #[serde(rename = "match")]
    pub is_match: bool,
    pub contains: bool,
    /// 0.0 to 1.0, symmetric
    pub similarity: f64,
}

/// Per-field comparison results for one (wanted, candidate) pair.
/// Missing fields read as an all-false, zero-similarity result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMatrix {
    #[serde(flatten)]
    fields: FxHashMap<MatchField, ComparisonResult>,
}

impl ComparisonMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: MatchField, result: ComparisonResult) {
        self.fields.insert(field, result);
    }

    pub fn with(mut self, field: MatchField, result: ComparisonResult) -> Self {
        self.set(field, result);
        self
    }

    pub fn get(&self, field: MatchField) -> ComparisonResult {
        self.fields.get(&field).copied().unwrap_or_default()
    }

    /// Sum of similarities over every field; used for ranking accepted candidates.
    pub fn total_similarity(&self) -> f64 {
        self.fields.values().map(|r| r.similarity).sum()
    }
}

// ============================================================================
// Search Trace & Output
// ============================================================================

/// One provider query attempted while searching a track (diagnostics only).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub approach: String,
    pub artist: String,
    pub title: String,
    pub album: String,
}

/// Candidate accepted by the match filters.
/// `matching` is only populated by `analyze`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedCandidate {
    #[serde(flatten)]
    pub track: CandidateTrack,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching: Option<ComparisonMatrix>,
}

/// Outcome of searching one wanted track. Empty `result` means "not found".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub id: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub queries: Vec<SearchQuery>,
    pub result: Vec<MatchedCandidate>,
}

impl SearchResponse {
    pub fn is_found(&self) -> bool {
        !self.result.is_empty()
    }

    /// Approach id of the last logged query when a result was found.
    pub fn matched_approach(&self) -> Option<&str> {
        if self.is_found() {
            self.queries.last().map(|q| q.approach.as_str())
        } else {
            None
        }
    }
}
