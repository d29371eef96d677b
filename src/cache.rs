//! Session-scoped memo of provider results.
//!
//! Keys are built from the normalized query triple, so two approaches that
//! normalize a track to the same text share one provider call. A cache lives
//! for one `search`/`analyze` call and is reset at its start.

use rustc_hash::FxHashMap;

use crate::models::CandidateTrack;

/// Search kind plus the normalized query fields, compared field by field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    album_search: bool,
    artist: String,
    title: String,
    album: String,
}

impl CacheKey {
    pub fn new(is_album_search: bool, artist: &str, title: &str, album: &str) -> Self {
        CacheKey {
            album_search: is_album_search,
            artist: artist.to_string(),
            title: title.to_string(),
            album: album.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: FxHashMap<CacheKey, Vec<CandidateTrack>>,
    hits: usize,
    misses: usize,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Vec<CandidateTrack>> {
        match self.entries.get(key) {
            Some(candidates) => {
                self.hits += 1;
                Some(candidates.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: CacheKey, candidates: Vec<CandidateTrack>) {
        self.entries.insert(key, candidates);
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since the last reset
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> CandidateTrack {
        CandidateTrack {
            id: id.to_string(),
            artist_title: "a".to_string(),
            title: "t".to_string(),
            album_title: None,
            source: id.to_string(),
        }
    }

    #[test]
    fn test_put_get_reset() {
        let mut cache = ResultCache::new();
        let key = CacheKey::new(false, "beyonce", "halo", "");
        assert_eq!(cache.get(&key), None);
        cache.put(key.clone(), vec![track("1")]);
        assert_eq!(cache.get(&key).map(|v| v.len()), Some(1));
        assert_eq!(cache.stats(), (1, 1));

        cache.reset();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.stats(), (0, 1));
    }

    #[test]
    fn test_empty_results_are_cached() {
        let mut cache = ResultCache::new();
        let key = CacheKey::new(false, "x", "y", "");
        cache.put(key.clone(), Vec::new());
        assert_eq!(cache.get(&key), Some(Vec::new()));
    }

    #[test]
    fn test_key_distinguishes_search_kind_and_fields() {
        assert_ne!(
            CacheKey::new(true, "a", "b", "c"),
            CacheKey::new(false, "a", "b", "c")
        );
        // field boundaries are not ambiguous
        assert_ne!(
            CacheKey::new(false, "ab", "c", ""),
            CacheKey::new(false, "a", "bc", "")
        );
    }

    #[test]
    fn test_control_characters_do_not_collide() {
        let mut cache = ResultCache::new();
        let joined = CacheKey::new(false, "a\u{1F}b", "c", "");
        let split = CacheKey::new(false, "a", "b\u{1F}c", "");
        assert_ne!(joined, split);

        cache.put(joined.clone(), vec![track("1")]);
        assert_eq!(cache.get(&split), None);
        assert_eq!(cache.get(&joined).map(|v| v.len()), Some(1));
    }
}
