//! String normalisation and similarity.

use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?:\([^)]*\)|\[[^\]]*\])").expect("bracket regex should compile")
});

static FEATURING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+(?:feat|ft|featuring)\b.*$").expect("featuring regex should compile")
});

static QUALIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+-\s+.*\b(?:remix|extended|radio edit|clean|explicit)\b.*$")
        .expect("qualifier regex should compile")
});

static NON_WORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]+").expect("non-word regex should compile"));

static COLLAPSE_WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

/// Reduce a title or artist name to its comparable core.
///
/// Lowercases, drops `(...)`/`[...]` groups, `feat.` tails and dash
/// qualifiers such as `- Radio Edit`, then turns punctuation into spaces and
/// collapses whitespace.
///
/// # Examples
///
/// ```
/// use core_matching::normalize;
///
/// assert_eq!(normalize("Blinding Lights (Remastered)"), "blinding lights");
/// assert_eq!(normalize("Stay ft. Justin Bieber"), "stay");
/// assert_eq!(normalize("Levels - Radio Edit"), "levels");
/// ```
pub fn normalize(s: &str) -> String {
    let lowered = s.to_lowercase();
    let stripped = BRACKETED_REGEX.replace_all(&lowered, "");
    let stripped = FEATURING_REGEX.replace(&stripped, "");
    let stripped = QUALIFIER_REGEX.replace(&stripped, "");
    let spaced = NON_WORD_REGEX.replace_all(&stripped, " ");
    COLLAPSE_WHITESPACE_REGEX
        .replace_all(&spaced, " ")
        .trim()
        .to_string()
}

/// Similarity of two strings in `[0, 1]` after normalisation.
///
/// Uses Levenshtein distance over characters:
/// `1 - distance / max(len(a), len(b))`. Two strings that normalise to the
/// same value (including both empty) score `1.0`.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    let distance = strsim::levenshtein(&a, &b);
    1.0 - distance as f64 / max_len as f64
}
