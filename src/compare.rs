//! String comparison and per-field comparison matrices.
//!
//! `compare` yields the three-valued result for two strings; `build_matrix`
//! applies it across every `MatchField` for one (wanted, candidate) pair.

use strsim::sorensen_dice;

use crate::models::{CandidateTrack, ComparisonMatrix, ComparisonResult, MatchField};
use crate::normalize::search_form;

// ============================================================================
// Comparator
// ============================================================================

/// Bigram (Sørensen–Dice) similarity between two strings, case-insensitive.
/// Symmetric: `similarity(a, b) == similarity(b, a)`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }
    sorensen_dice(&a, &b)
}

/// Compare two strings.
///
/// `match` and `contains` use the folded alphanumeric search form, so case,
/// diacritics and punctuation are ignored. With `two_way_contain`, `contains`
/// holds when either string contains the other; otherwise only `a ⊇ b`.
pub fn compare(a: &str, b: &str, two_way_contain: bool) -> ComparisonResult {
    if a.trim().is_empty() || b.trim().is_empty() {
        return ComparisonResult::default();
    }

    let a_form = search_form(a);
    let b_form = search_form(b);
    // Strings made only of punctuation fold to nothing and cannot match
    let comparable = !a_form.is_empty() && !b_form.is_empty();

    let is_match = comparable && a_form == b_form;
    let contains = comparable
        && (a_form.contains(&b_form) || (two_way_contain && b_form.contains(&a_form)));

    ComparisonResult {
        is_match,
        contains,
        similarity: similarity(a, b),
    }
}

// ============================================================================
// Comparison Matrix
// ============================================================================

/// The wanted side of a comparison: one artist variant plus title/album.
#[derive(Debug, Clone, Copy)]
pub struct WantedFields<'a> {
    pub artist: &'a str,
    pub title: &'a str,
    pub album: Option<&'a str>,
}

/// Compare one wanted artist/title/album against a provider candidate.
///
/// - `artist`, `title`, `album`: field against field, two-way containment
/// - `artistInTitle`: candidate title contains the wanted artist
/// - `artistWithTitle`: candidate title against "artist title", for
///   libraries that file tracks as "Artist - Title"
pub fn build_matrix(wanted: WantedFields<'_>, candidate: &CandidateTrack) -> ComparisonMatrix {
    let artist_with_title = format!("{} {}", wanted.artist, wanted.title);
    let album = match (wanted.album, candidate.album_title.as_deref()) {
        (Some(w), Some(c)) => compare(w, c, true),
        _ => ComparisonResult::default(),
    };

    ComparisonMatrix::new()
        .with(
            MatchField::Artist,
            compare(wanted.artist, &candidate.artist_title, true),
        )
        .with(MatchField::Title, compare(wanted.title, &candidate.title, true))
        .with(MatchField::Album, album)
        .with(
            MatchField::ArtistInTitle,
            compare(&candidate.title, wanted.artist, false),
        )
        .with(
            MatchField::ArtistWithTitle,
            compare(&candidate.title, &artist_with_title, true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(artist: &str, title: &str, album: Option<&str>) -> CandidateTrack {
        CandidateTrack {
            id: "1".to_string(),
            artist_title: artist.to_string(),
            title: title.to_string(),
            album_title: album.map(str::to_string),
            source: "/library/metadata/1".to_string(),
        }
    }

    #[test]
    fn test_empty_inputs_compare_to_nothing() {
        assert_eq!(compare("", "halo", true), ComparisonResult::default());
        assert_eq!(compare("halo", "  ", true), ComparisonResult::default());
    }

    #[test]
    fn test_match_ignores_case_accents_and_punctuation() {
        let r = compare("Beyoncé", "BEYONCE", false);
        assert!(r.is_match);
        assert!(r.contains);

        let r = compare("AC/DC", "ac-dc", false);
        assert!(r.is_match);
    }

    #[test]
    fn test_contains_direction() {
        let r = compare("Halo (Live)", "Halo", false);
        assert!(!r.is_match);
        assert!(r.contains);

        let r = compare("Halo", "Halo (Live)", false);
        assert!(!r.contains);

        let r = compare("Halo", "Halo (Live)", true);
        assert!(r.contains);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let pairs = [
            ("halo", "halo (live)"),
            ("Tom & Jerry", "tom and jerry"),
            ("a", "ab"),
            ("Sigur Rós", "Sigur Ros"),
            ("night", "nacht"),
        ];
        for (a, b) in pairs {
            assert_eq!(
                compare(a, b, false).similarity,
                compare(b, a, false).similarity,
                "{} / {}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("Halo", "halo"), 1.0);
        let s = similarity("halo", "hello");
        assert!(s > 0.0 && s < 1.0);
        assert_eq!(similarity("", "x"), 0.0);
    }

    #[test]
    fn test_punctuation_only_never_matches() {
        let r = compare("!!!", "???", true);
        assert!(!r.is_match);
        assert!(!r.contains);
    }

    #[test]
    fn test_build_matrix_fields() {
        let wanted = WantedFields {
            artist: "Beyoncé",
            title: "Halo",
            album: Some("I Am... Sasha Fierce"),
        };
        let m = build_matrix(wanted, &candidate("Beyonce", "Halo", Some("I Am...Sasha Fierce (Deluxe)")));
        assert!(m.get(MatchField::Artist).is_match);
        assert!(m.get(MatchField::Title).is_match);
        assert!(m.get(MatchField::Album).contains);
        assert!(!m.get(MatchField::Album).is_match);
        assert!(!m.get(MatchField::ArtistInTitle).contains);
    }

    #[test]
    fn test_build_matrix_artist_in_title() {
        let wanted = WantedFields {
            artist: "Foo Fighters",
            title: "Everlong",
            album: None,
        };
        let m = build_matrix(wanted, &candidate("Various Artists", "Foo Fighters - Everlong", None));
        assert!(!m.get(MatchField::Artist).contains);
        assert!(m.get(MatchField::ArtistInTitle).contains);
        assert!(m.get(MatchField::ArtistWithTitle).is_match);
        // no album on either side compares to nothing
        assert_eq!(m.get(MatchField::Album), ComparisonResult::default());
    }
}
