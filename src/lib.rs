//! Track matching engine: finds which library track, if any, is the same
//! recording as a wanted song.

pub mod cache;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod expression;
pub mod legacy;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod provider;
pub mod safety;
pub mod scoring;
pub mod session;

pub use config::{MatchFilter, NormalizeSettings, SearchConfig};
pub use expression::{
    evaluate, expression_to_ui, parse_expression, ui_to_expression, validate_expression, Expr,
    FilterUiItem, ValidationResult,
};
pub use legacy::migrate_legacy_filter;
pub use models::{
    AlbumRef, CandidateTrack, ComparisonMatrix, ComparisonResult, MatchField, MatchedCandidate,
    SearchApproach, SearchQuery, SearchResponse, WantedTrack,
};
pub use provider::{Provider, ProviderError};
pub use session::{analyze, search, SearchSession};
