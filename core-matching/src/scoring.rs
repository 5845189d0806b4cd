//! Confidence scoring between universal items.

use crate::model::UniversalItem;
use crate::normalize::string_similarity;

const TITLE_WEIGHT: f64 = 0.4;
const ARTIST_WEIGHT: f64 = 0.4;
const ALBUM_WEIGHT: f64 = 0.15;
const DURATION_WEIGHT: f64 = 0.05;

/// Relative duration difference above which duration contributes nothing
const DURATION_TOLERANCE: f64 = 0.05;

/// Confidence in `[0, 1]` that two items are the same recording.
///
/// When both items carry an ISRC the answer is exact: `1.0` if they are equal,
/// `0.0` otherwise, with no other field consulted. Without a shared ISRC the
/// score is `0.4·title + 0.4·artist + 0.15·album + 0.05·duration`.
///
/// # Examples
///
/// ```
/// use core_matching::{score, UniversalItem};
///
/// let a = UniversalItem::new("Yellow", "Coldplay").with_isrc("GBAYE0000351");
/// let b = UniversalItem::new("Completely Different", "Someone").with_isrc("GBAYE0000351");
/// assert_eq!(score(&a, &b), 1.0);
/// ```
pub fn score(a: &UniversalItem, b: &UniversalItem) -> f64 {
    if let (Some(isrc_a), Some(isrc_b)) = (a.exact_id(), b.exact_id()) {
        return if isrc_a.eq_ignore_ascii_case(isrc_b) {
            1.0
        } else {
            0.0
        };
    }

    let title = string_similarity(&a.title, &b.title);
    let artist = string_similarity(&a.artist, &b.artist);
    let album = string_similarity(&a.album, &b.album);
    let duration = duration_score(a.duration_ms, b.duration_ms);

    let total = TITLE_WEIGHT * title
        + ARTIST_WEIGHT * artist
        + ALBUM_WEIGHT * album
        + DURATION_WEIGHT * duration;

    total.clamp(0.0, 1.0)
}

/// Duration closeness, zero when either is unknown or they differ by more
/// than the tolerance.
fn duration_score(d1: u64, d2: u64) -> f64 {
    if d1 == 0 || d2 == 0 {
        return 0.0;
    }

    let diff = d1.abs_diff(d2) as f64 / d1.max(d2) as f64;
    if diff <= DURATION_TOLERANCE {
        (1.0 - diff).max(0.0)
    } else {
        0.0
    }
}

/// Highest-scoring candidate at or above `threshold`.
///
/// Scans candidates in order; on equal scores the earlier candidate wins.
/// Returns `None` when nothing reaches the threshold.
pub fn find_best_match<'a>(
    source: &UniversalItem,
    candidates: &'a [UniversalItem],
    threshold: f64,
) -> Option<(&'a UniversalItem, f64)> {
    let mut best: Option<(&'a UniversalItem, f64)> = None;

    for candidate in candidates {
        let confidence = score(source, candidate);
        if confidence < threshold {
            continue;
        }
        match best {
            Some((_, best_score)) if confidence <= best_score => {}
            _ => best = Some((candidate, confidence)),
        }
    }

    best
}
