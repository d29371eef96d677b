//! Library provider capability.
//!
//! The search session depends only on this trait. Implementations talk to
//! the actual library (Plex hub search, a local catalog, a test double).

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AlbumRef, CandidateTrack};

/// Errors from the external search capability. The session never surfaces
/// these: a failed query is logged and treated as an empty result.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("catalog database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Free-text track search, at most `limit` results.
    async fn search_by_text(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CandidateTrack>, ProviderError>;

    /// Albums matching an artist/album pair.
    async fn search_album(&self, artist: &str, album: &str)
        -> Result<Vec<AlbumRef>, ProviderError>;

    /// Every track of one album.
    async fn get_album_tracks(&self, album: &AlbumRef)
        -> Result<Vec<CandidateTrack>, ProviderError>;
}
