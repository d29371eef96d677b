//! Text normalization for search queries and comparisons.
//!
//! `normalize` produces the query text for one search approach.
//! `search_form` produces the folded, alphanumeric-only key used by the
//! comparator for `match` and `contains`.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::config::NormalizeSettings;
use crate::models::SearchApproach;

/// Characters that open a trailing "suffix" cut by trimmed approaches,
/// in addition to the configured separators.
const SUFFIX_OPENERS: [char; 3] = ['(', '[', '{'];

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Regex to collapse runs of whitespace into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Bracket pairs left empty after noise words were stripped: "halo ()" → "halo "
pub static EMPTY_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]|\{\s*\}").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
/// Used to filter out accents during normalization.
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Drop diacritics but keep the script: "beyoncé" → "beyonce", "кино" stays "кино".
pub fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Fold Unicode text to ASCII by applying NFKD decomposition and removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "naïve" → "naive"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped = strip_diacritics(s);
    // Then transliterate any remaining non-ASCII (Cyrillic, Hebrew, CJK, etc.)
    any_ascii(&stripped).to_lowercase()
}

/// Folded, lowercased, alphanumeric-only form used for `match`/`contains`.
/// e.g., "AC/DC" → "acdc", "Guns N' Roses" → "gunsnroses"
pub fn search_form(s: &str) -> String {
    fold_to_ascii(s)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Rewrite `&` as the word "and": "tom & jerry" → "tom and jerry".
pub fn rewrite_ampersand(s: &str) -> String {
    let replaced = s.replace('&', " and ");
    MULTI_SPACE.replace_all(replaced.trim(), " ").to_string()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Remove every whole-word occurrence of `word` from `s`.
/// Word edges are only enforced where `word` itself starts/ends with a word
/// character, so "feat." still matches in "song feat. someone".
fn remove_word(s: &str, word: &str) -> String {
    if word.is_empty() {
        return s.to_string();
    }
    let check_start = word.chars().next().is_some_and(is_word_char);
    let check_end = word.chars().last().is_some_and(is_word_char);

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find(word) {
        let before = if pos > 0 {
            rest[..pos].chars().last()
        } else {
            out.chars().last()
        };
        let after = rest[pos + word.len()..].chars().next();
        let start_ok = !check_start || !before.is_some_and(is_word_char);
        let end_ok = !check_end || !after.is_some_and(is_word_char);
        if start_ok && end_ok {
            out.push_str(&rest[..pos]);
            out.push(' ');
        } else {
            out.push_str(&rest[..pos + word.len()]);
        }
        rest = &rest[pos + word.len()..];
    }
    out.push_str(rest);
    out
}

fn strip_chars(s: &str, chars: &[char]) -> String {
    s.chars().filter(|c| !chars.contains(c)).collect()
}

fn trim_edges(s: &str, separators: &[char]) -> String {
    s.trim_matches(|c: char| c.is_whitespace() || separators.contains(&c))
        .to_string()
}

/// Cut the suffix starting at the last bracket opener or separator,
/// unless nothing would remain before it.
fn trim_suffix(s: &str, separators: &[char]) -> String {
    let cut = s.rfind(|c: char| SUFFIX_OPENERS.contains(&c) || separators.contains(&c));
    match cut {
        Some(idx) => {
            let prefix = &s[..idx];
            if trim_edges(prefix, separators).is_empty() {
                s.to_string()
            } else {
                prefix.to_string()
            }
        }
        None => s.to_string(),
    }
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

fn normalize_once(text: &str, approach: &SearchApproach, settings: &NormalizeSettings) -> String {
    let mut result = text.to_lowercase();

    if approach.filtered {
        result = strip_diacritics(&result);
        for word in &settings.noise_words {
            result = remove_word(&result, &word.to_lowercase());
        }
        result = strip_chars(&result, &settings.quote_chars);
        result = EMPTY_BRACKETS.replace_all(&result, " ").to_string();
        if approach.trim {
            result = trim_suffix(&result, &settings.separators);
        }
    }

    if approach.ignore_quotes {
        result = strip_chars(&result, &settings.quote_chars);
    }

    let collapsed = MULTI_SPACE.replace_all(&result, " ");
    trim_edges(&collapsed, &settings.separators)
}

/// Normalize a text field for one search approach.
///
/// Lower-cases, and depending on the approach flags strips diacritics, noise
/// words, quotes and a trailing `(...)`/`[...]`/`{...}`/`- ...` suffix.
/// Applied to a fixpoint, so `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str, approach: &SearchApproach, settings: &NormalizeSettings) -> String {
    let mut current = normalize_once(text, approach, settings);
    // passes after the first only remove characters, so this terminates
    loop {
        let next = normalize_once(&current, approach, settings);
        if next.len() >= current.len() {
            return current;
        }
        current = next;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approach(filtered: bool, trim: bool, ignore_quotes: bool) -> SearchApproach {
        SearchApproach::new("t", filtered, trim, ignore_quotes)
    }

    fn norm(text: &str, a: &SearchApproach) -> String {
        normalize(text, a, &NormalizeSettings::default())
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Björk"), "bjork");
        assert_eq!(fold_to_ascii("Motörhead"), "motorhead");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_search_form() {
        assert_eq!(search_form("AC/DC"), "acdc");
        assert_eq!(search_form("Guns N' Roses"), "gunsnroses");
        assert_eq!(search_form("Sigur Rós - Hoppípolla"), "sigurroshoppipolla");
    }

    #[test]
    fn test_normal_approach_only_lowercases_and_trims() {
        let a = approach(false, false, false);
        assert_eq!(norm("  Halo (Remastered) ", &a), "halo (remastered)");
        assert_eq!(norm("Beyoncé", &a), "beyoncé");
        assert_eq!(norm("- Intro -", &a), "intro");
    }

    #[test]
    fn test_filtered_strips_noise_and_diacritics() {
        let a = approach(true, false, false);
        assert_eq!(norm("Halo (Remastered)", &a), "halo");
        assert_eq!(norm("Beyoncé", &a), "beyonce");
        assert_eq!(norm("Song - Radio Edit", &a), "song");
        assert_eq!(norm("Don't Stop", &a), "dont stop");
    }

    #[test]
    fn test_noise_words_respect_word_boundaries() {
        let a = approach(true, false, false);
        assert_eq!(norm("Alive", &a), "alive");
        assert_eq!(norm("Live Forever (Live)", &a), "forever");
        assert_eq!(norm("Stereophonic", &a), "stereophonic");
    }

    #[test]
    fn test_trim_cuts_trailing_suffix() {
        let a = approach(true, true, false);
        assert_eq!(norm("Song (From the Movie)", &a), "song");
        assert_eq!(norm("Song [Bonus]", &a), "song");
        assert_eq!(norm("Song - 2011 Version", &a), "song");
        // nothing left before the opener: keep the text
        assert_eq!(norm("(Intro)", &a), "(intro)");
    }

    #[test]
    fn test_trim_requires_filtered() {
        let a = approach(false, true, false);
        assert_eq!(norm("Song (From the Movie)", &a), "song (from the movie)");
    }

    #[test]
    fn test_ignore_quotes_without_filtered() {
        let a = approach(false, false, true);
        assert_eq!(norm("Don’t \"Stop\"", &a), "dont stop");
        assert_eq!(norm("Halo (Remastered)", &a), "halo (remastered)");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "Halo (Remastered)",
            "a - b - c",
            "Song (Live) [Mono] {x}",
            "remaremasteredstered",
            "ℌello — World",
            "  --  ",
            "",
            "Tom & Jerry",
            "Beyoncé 'Halo' - Radio Edit (feat. X)",
            "a-b-c-d-e-f-g-h-i-j-k-l-m-n-o-p-q-r-s-t-u-v-w-x-y-z",
        ];
        let approaches = [
            approach(false, false, false),
            approach(true, false, false),
            approach(true, true, false),
            approach(false, false, true),
            approach(true, true, true),
        ];
        for a in &approaches {
            for input in inputs {
                let once = norm(input, a);
                assert_eq!(norm(&once, a), once, "input {:?} approach {:?}", input, a);
            }
        }
    }

    #[test]
    fn test_long_suffix_chains_are_idempotent() {
        let separators: Vec<String> = (b'a'..=b'z').map(|c| (c as char).to_string()).collect();
        let dashed = separators.join("-");
        let bracketed: String = (0..40).map(|i| format!("w{} (", i)).collect();
        let a = approach(true, true, false);

        let once = norm(&dashed, &a);
        assert_eq!(once, "a");
        assert_eq!(norm(&once, &a), once);

        let once = norm(&bracketed, &a);
        assert_eq!(once, "w0");
        assert_eq!(norm(&once, &a), once);
    }

    #[test]
    fn test_rewrite_ampersand() {
        assert_eq!(rewrite_ampersand("tom & jerry"), "tom and jerry");
        assert_eq!(rewrite_ampersand("tom&jerry"), "tom and jerry");
        assert_eq!(rewrite_ampersand("no ampersand"), "no ampersand");
    }

    #[test]
    fn test_custom_noise_words() {
        let settings = NormalizeSettings {
            noise_words: vec!["Official Video".to_string()],
            ..NormalizeSettings::default()
        };
        let a = approach(true, false, false);
        assert_eq!(normalize("Song [Official Video]", &a, &settings), "song");
    }
}
