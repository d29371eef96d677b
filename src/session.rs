//! Progressive multi-approach track search.
//!
//! For each wanted track, every artist variant is tried in order. For one
//! artist, approaches run strictly in configured order and the first one
//! that yields an accepted candidate wins; later approaches are not tried.
//! Within an approach, an empty primary query falls back to:
//! 1. the same query with `&` rewritten to `and` (only if the text has `&`)
//! 2. an album-based lookup (only if the track has an album)
//!
//! Provider failures are logged and count as empty results. "Not found" is
//! an ordinary response with an empty `result` and the full query trace.

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ResultCache};
use crate::compare::{compare, WantedFields};
use crate::config::SearchConfig;
use crate::models::{
    AlbumRef, CandidateTrack, MatchedCandidate, SearchApproach, SearchQuery, SearchResponse,
    WantedTrack,
};
use crate::normalize::{normalize, rewrite_ampersand};
use crate::provider::{Provider, ProviderError};
use crate::scoring::{compile_filters, rank_candidates, FilterSet};

/// Suffix appended to an approach id for its album-based fallback query.
pub const ALBUM_APPROACH_SUFFIX: &str = "-album";

/// Normalized query text for one approach.
struct NormalizedQuery {
    artist: String,
    title: String,
    album: String,
}

/// One search session: configuration, provider handle, compiled filters and
/// the result cache. The cache is reset at the start of every `search` and
/// `analyze` call and is never shared between sessions.
pub struct SearchSession<'a, P: Provider + ?Sized> {
    config: &'a SearchConfig,
    provider: &'a P,
    filters: FilterSet,
    cache: ResultCache,
}

impl<'a, P: Provider + ?Sized> SearchSession<'a, P> {
    pub fn new(config: &'a SearchConfig, provider: &'a P) -> Self {
        Self {
            config,
            provider,
            filters: compile_filters(&config.match_filters),
            cache: ResultCache::new(),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Search a batch of tracks, one after another.
    pub async fn search(&mut self, tracks: &[WantedTrack]) -> Vec<SearchResponse> {
        self.search_with(tracks, |_| {}).await
    }

    /// Like `search`, calling `on_track` after each finished track.
    pub async fn search_with<F>(&mut self, tracks: &[WantedTrack], mut on_track: F) -> Vec<SearchResponse>
    where
        F: FnMut(&SearchResponse),
    {
        self.cache.reset();
        let mut responses = Vec::with_capacity(tracks.len());
        for track in tracks {
            let response = self.search_track(track, false).await;
            on_track(&response);
            responses.push(response);
        }
        let (hits, misses) = self.cache.stats();
        debug!(tracks = tracks.len(), hits, misses, "search session finished");
        responses
    }

    /// Search one track, keeping the comparison matrix on every accepted candidate.
    pub async fn analyze(&mut self, track: &WantedTrack) -> SearchResponse {
        self.cache.reset();
        self.search_track(track, true).await
    }

    async fn search_track(&mut self, track: &WantedTrack, with_matrix: bool) -> SearchResponse {
        let mut queries = Vec::new();

        for artist in &track.artists {
            if let Some(result) = self.search_artist(track, artist, with_matrix, &mut queries).await {
                info!(
                    id = %track.id,
                    artist = %artist,
                    title = %track.title,
                    approach = queries.last().map(|q: &SearchQuery| q.approach.as_str()).unwrap_or(""),
                    candidates = result.len(),
                    "track found"
                );
                return SearchResponse {
                    id: track.id.clone(),
                    artist: artist.clone(),
                    title: track.title.clone(),
                    album: track.album.clone().unwrap_or_default(),
                    queries,
                    result,
                };
            }
        }

        info!(
            id = %track.id,
            title = %track.title,
            attempts = queries.len(),
            "track not found"
        );
        SearchResponse {
            id: track.id.clone(),
            artist: track.primary_artist().to_string(),
            title: track.title.clone(),
            album: track.album.clone().unwrap_or_default(),
            queries,
            result: Vec::new(),
        }
    }

    /// Run every approach for one artist variant; `None` when all come up empty.
    async fn search_artist(
        &mut self,
        track: &WantedTrack,
        artist: &str,
        with_matrix: bool,
        queries: &mut Vec<SearchQuery>,
    ) -> Option<Vec<MatchedCandidate>> {
        let config = self.config;

        for approach in &config.approaches {
            let query = self.normalize_query(approach, artist, track);
            // candidates are compared against this approach's normalized text
            let wanted = WantedFields {
                artist: &query.artist,
                title: &query.title,
                album: (!query.album.is_empty()).then_some(query.album.as_str()),
            };

            let result = self
                .text_attempt(&approach.id, &query.artist, &query.title, &query.album, wanted, with_matrix, queries)
                .await;
            if !result.is_empty() {
                return Some(result);
            }

            if query.artist.contains('&') || query.title.contains('&') {
                let artist_and = rewrite_ampersand(&query.artist);
                let title_and = rewrite_ampersand(&query.title);
                let result = self
                    .text_attempt(&approach.id, &artist_and, &title_and, &query.album, wanted, with_matrix, queries)
                    .await;
                if !result.is_empty() {
                    return Some(result);
                }
            }

            if config.album_fallback && !query.album.is_empty() {
                let approach_id = format!("{}{}", approach.id, ALBUM_APPROACH_SUFFIX);
                let result = self
                    .album_attempt(&approach_id, &query, wanted, with_matrix, queries)
                    .await;
                if !result.is_empty() {
                    return Some(result);
                }
            }
        }

        None
    }

    fn normalize_query(&self, approach: &SearchApproach, artist: &str, track: &WantedTrack) -> NormalizedQuery {
        let settings = &self.config.normalize;
        NormalizedQuery {
            artist: normalize(artist, approach, settings),
            title: normalize(&track.title, approach, settings),
            album: track
                .album
                .as_deref()
                .map(|a| normalize(a, approach, settings))
                .unwrap_or_default(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn text_attempt(
        &mut self,
        approach_id: &str,
        artist: &str,
        title: &str,
        album: &str,
        wanted: WantedFields<'_>,
        with_matrix: bool,
        queries: &mut Vec<SearchQuery>,
    ) -> Vec<MatchedCandidate> {
        queries.push(SearchQuery {
            approach: approach_id.to_string(),
            artist: artist.to_string(),
            title: title.to_string(),
            album: album.to_string(),
        });

        let key = CacheKey::new(false, artist, title, album);
        let candidates = match self.cache.get(&key) {
            Some(cached) => {
                debug!(approach = approach_id, artist, title, hits = cached.len(), "cached text search");
                cached
            }
            None => {
                let text = format!("{} {}", artist, title).trim().to_string();
                match self.provider.search_by_text(&text, self.config.search_limit).await {
                    Ok(found) => {
                        debug!(approach = approach_id, query = %text, hits = found.len(), "text search");
                        self.cache.put(key, found.clone());
                        found
                    }
                    Err(e) => {
                        warn!(approach = approach_id, query = %text, error = %e, "text search failed");
                        Vec::new()
                    }
                }
            }
        };

        self.accept(wanted, &candidates, with_matrix)
    }

    async fn album_attempt(
        &mut self,
        approach_id: &str,
        query: &NormalizedQuery,
        wanted: WantedFields<'_>,
        with_matrix: bool,
        queries: &mut Vec<SearchQuery>,
    ) -> Vec<MatchedCandidate> {
        queries.push(SearchQuery {
            approach: approach_id.to_string(),
            artist: query.artist.clone(),
            title: query.title.clone(),
            album: query.album.clone(),
        });

        let key = CacheKey::new(true, &query.artist, &query.title, &query.album);
        let candidates = match self.cache.get(&key) {
            Some(cached) => cached,
            None => match self.fetch_album_tracks(&query.artist, &query.album).await {
                Ok(found) => {
                    debug!(approach = approach_id, album = %query.album, hits = found.len(), "album search");
                    self.cache.put(key, found.clone());
                    found
                }
                Err(e) => {
                    warn!(approach = approach_id, album = %query.album, error = %e, "album search failed");
                    Vec::new()
                }
            },
        };

        self.accept(wanted, &candidates, with_matrix)
    }

    /// Tracks of the first album whose title (and artist, when known) matches.
    async fn fetch_album_tracks(&self, artist: &str, album: &str) -> Result<Vec<CandidateTrack>, ProviderError> {
        let albums = self.provider.search_album(artist, album).await?;
        match albums.iter().find(|a| album_matches(a, artist, album)) {
            Some(found) => self.provider.get_album_tracks(found).await,
            None => Ok(Vec::new()),
        }
    }

    fn accept(&self, wanted: WantedFields<'_>, candidates: &[CandidateTrack], with_matrix: bool) -> Vec<MatchedCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }
        rank_candidates(wanted, candidates, &self.filters, self.config.default_similarity, with_matrix)
    }
}

fn album_matches(album_ref: &AlbumRef, artist: &str, album: &str) -> bool {
    let title_ok = compare(&album_ref.title, album, true).contains;
    let artist_ok = match album_ref.artist_title.as_deref() {
        Some(a) if !a.trim().is_empty() => compare(a, artist, true).contains,
        _ => true,
    };
    title_ok && artist_ok
}

/// Search a batch of tracks in a fresh session.
pub async fn search<P: Provider + ?Sized>(
    config: &SearchConfig,
    provider: &P,
    tracks: &[WantedTrack],
) -> Vec<SearchResponse> {
    SearchSession::new(config, provider).search(tracks).await
}

/// Search one track in a fresh session, with comparison matrices attached.
pub async fn analyze<P: Provider + ?Sized>(
    config: &SearchConfig,
    provider: &P,
    track: &WantedTrack,
) -> SearchResponse {
    SearchSession::new(config, provider).analyze(track).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchFilter;
    use crate::models::MatchField;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fake provider keyed by exact query text, recording every call.
    #[derive(Default)]
    struct FakeProvider {
        by_text: Vec<(String, Vec<CandidateTrack>)>,
        albums: Vec<AlbumRef>,
        album_tracks: Vec<CandidateTrack>,
        fail_text: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn with_text(mut self, query: &str, tracks: Vec<CandidateTrack>) -> Self {
            self.by_text.push((query.to_string(), tracks));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn search_by_text(&self, query: &str, _limit: usize) -> Result<Vec<CandidateTrack>, ProviderError> {
            self.calls.lock().unwrap().push(format!("text:{}", query));
            if self.fail_text {
                return Err(ProviderError::Network("connection refused".to_string()));
            }
            Ok(self
                .by_text
                .iter()
                .find(|(q, _)| q == query)
                .map(|(_, t)| t.clone())
                .unwrap_or_default())
        }

        async fn search_album(&self, artist: &str, album: &str) -> Result<Vec<AlbumRef>, ProviderError> {
            self.calls.lock().unwrap().push(format!("album:{}/{}", artist, album));
            Ok(self.albums.clone())
        }

        async fn get_album_tracks(&self, album: &AlbumRef) -> Result<Vec<CandidateTrack>, ProviderError> {
            self.calls.lock().unwrap().push(format!("tracks:{}", album.id));
            Ok(self.album_tracks.clone())
        }
    }

    fn candidate(id: &str, artist: &str, title: &str) -> CandidateTrack {
        CandidateTrack {
            id: id.to_string(),
            artist_title: artist.to_string(),
            title: title.to_string(),
            album_title: None,
            source: format!("/library/metadata/{}", id),
        }
    }

    fn three_approaches() -> SearchConfig {
        SearchConfig::default().with_approaches(vec![
            SearchApproach::new("normal", false, false, false),
            SearchApproach::new("filtered", true, false, false),
            SearchApproach::new("trimmed", true, true, false),
        ])
    }

    #[tokio::test]
    async fn test_first_non_empty_approach_wins() {
        let config = three_approaches();
        let provider = FakeProvider::default()
            .with_text("beyonce halo", vec![candidate("1", "Beyoncé", "Halo")]);
        let track = WantedTrack::new("t1", vec!["Beyoncé".to_string()], "Halo (Remastered)");

        let response = analyze(&config, &provider, &track).await;

        assert!(response.is_found());
        let approaches: Vec<&str> = response.queries.iter().map(|q| q.approach.as_str()).collect();
        assert_eq!(approaches, vec!["normal", "filtered"]);
        assert_eq!(response.matched_approach(), Some("filtered"));
        assert!(response.result[0].matching.is_some());
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_ampersand_retry() {
        let config = SearchConfig::default();
        let provider = FakeProvider::default()
            .with_text("tom and jerry song", vec![candidate("1", "Tom & Jerry", "Song")]);
        let track = WantedTrack::new("t1", vec!["Tom & Jerry".to_string()], "Song");

        let response = analyze(&config, &provider, &track).await;

        assert!(response.is_found());
        assert_eq!(response.queries.len(), 2);
        assert_eq!(response.queries[0].artist, "tom & jerry");
        assert_eq!(response.queries[1].artist, "tom and jerry");
        assert_eq!(response.queries[1].approach, "normal");
    }

    #[tokio::test]
    async fn test_album_fallback() {
        let config = SearchConfig::default().with_approaches(vec![SearchApproach::new("normal", false, false, false)]);
        let provider = FakeProvider {
            albums: vec![
                AlbumRef {
                    id: "other".to_string(),
                    title: "Unrelated".to_string(),
                    artist_title: Some("Radiohead".to_string()),
                },
                AlbumRef {
                    id: "okc".to_string(),
                    title: "OK Computer".to_string(),
                    artist_title: Some("Radiohead".to_string()),
                },
            ],
            album_tracks: vec![
                candidate("10", "Radiohead", "Airbag"),
                candidate("11", "Radiohead", "Paranoid Android"),
            ],
            ..FakeProvider::default()
        };
        let track = WantedTrack::new("t1", vec!["Radiohead".to_string()], "Paranoid Android")
            .with_album("OK Computer");
        let config = config.with_filters(vec![MatchFilter::new("artist:match AND title:match")]);

        let response = search(&config, &provider, &[track]).await.remove(0);

        assert_eq!(response.result.len(), 1);
        assert_eq!(response.result[0].track.id, "11");
        assert_eq!(response.queries[1].approach, "normal-album");
        assert!(provider.calls().contains(&"tracks:okc".to_string()));
        // search mode carries no matrices
        assert!(response.result[0].matching.is_none());
    }

    #[tokio::test]
    async fn test_provider_errors_are_not_found() {
        let config = three_approaches();
        let provider = FakeProvider {
            fail_text: true,
            ..FakeProvider::default()
        };
        let track = WantedTrack::new("t1", vec!["A".to_string()], "Song");

        let response = analyze(&config, &provider, &track).await;

        assert!(!response.is_found());
        assert_eq!(response.queries.len(), 3);
        // failures are not cached, so every approach hit the provider
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_identical_queries_hit_provider_once() {
        let config = three_approaches();
        let provider = FakeProvider::default();
        // all three approaches normalize "a"/"song" identically
        let track = WantedTrack::new("t1", vec!["A".to_string()], "Song");

        let mut session = SearchSession::new(&config, &provider);
        let responses = session.search(&[track.clone(), track]).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].queries.len(), 3);
        assert_eq!(provider.calls(), vec!["text:a song".to_string()]);
        assert_eq!(session.cache().stats(), (5, 1));
    }

    #[tokio::test]
    async fn test_cache_reset_between_calls() {
        let config = three_approaches();
        let provider = FakeProvider::default();
        let track = WantedTrack::new("t1", vec!["A".to_string()], "Song");

        let mut session = SearchSession::new(&config, &provider);
        session.search(std::slice::from_ref(&track)).await;
        session.analyze(&track).await;

        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_multi_artist_fallback() {
        let config = three_approaches();
        let provider = FakeProvider::default().with_text("b song", vec![candidate("1", "B", "Song")]);
        let track = WantedTrack::new("t1", vec!["A".to_string(), "B".to_string()], "Song");

        let response = analyze(&config, &provider, &track).await;

        assert_eq!(response.artist, "B");
        assert!(response.queries.iter().any(|q| q.artist == "a"));
        assert!(response.queries.iter().any(|q| q.artist == "b"));
        assert!(response.result[0].matching.as_ref().unwrap().get(MatchField::Artist).is_match);
    }

    #[tokio::test]
    async fn test_filter_rejection_moves_to_next_approach() {
        let config = three_approaches().with_filters(vec![MatchFilter::new("title:match")]);
        let provider = FakeProvider::default()
            .with_text("a song (live)", vec![candidate("1", "A", "Other Song")])
            .with_text("a song", vec![candidate("2", "A", "Song")]);
        let track = WantedTrack::new("t1", vec!["A".to_string()], "Song (Live)");

        let response = analyze(&config, &provider, &track).await;

        // "normal" finds only a rejected candidate, "filtered" finds the real one
        assert_eq!(response.matched_approach(), Some("filtered"));
        assert_eq!(response.result.len(), 1);
        assert_eq!(response.result[0].track.id, "2");
    }

    #[tokio::test]
    async fn test_mistyped_filters_accept_nothing() {
        let config = three_approaches().with_filters(vec![MatchFilter::new("artist:mtach AND title:match")]);
        let provider = FakeProvider::default()
            .with_text("beyonce halo", vec![candidate("x", "Totally Different", "Nothing Alike")]);
        let track = WantedTrack::new("t1", vec!["Beyonce".to_string()], "Halo");

        let response = analyze(&config, &provider, &track).await;

        assert!(!response.is_found());
        assert_eq!(response.queries.len(), 3);
    }

    #[tokio::test]
    async fn test_not_found_reports_primary_artist() {
        let config = three_approaches();
        let provider = FakeProvider::default();
        let track = WantedTrack::new("t1", vec!["A".to_string(), "B".to_string()], "Song");

        let response = analyze(&config, &provider, &track).await;

        assert!(!response.is_found());
        assert_eq!(response.artist, "A");
        assert_eq!(response.queries.len(), 6);
        assert_eq!(response.matched_approach(), None);
    }
}
