//! Candidate matching: one local record against the database index.
//!
//! Photos join on the exact time token, videos on the duration bucket with
//! a precision-derived tolerance, then both are filtered by exact filename.
//! Legacy entries (records predating metadata tagging) are accepted on
//! name alone when no keyed candidate exists.

use crate::index::{duration_bucket, DatabaseIndex};
use crate::models::Verdict;
use crate::normalize::Classified;

/// Duration tolerance in milliseconds for a local source with the given
/// sub-second precision: `10^(3 - precision)`. Whole-second sources get
/// 100 ms, millisecond sources get 1 ms. Intentionally coarse for coarse
/// sources; downstream behavior depends on this exact formula.
pub fn duration_tolerance_millis(precision: u32) -> i64 {
    10_i64.pow(3 - precision.min(3))
}

/// Decide the verdict for one classified local record.
pub fn match_record(index: &DatabaseIndex, local: &Classified) -> Verdict {
    let (name, candidate_names) = match local {
        Classified::Photo(photo) => {
            let names: Vec<&str> = index
                .photos_at(&photo.time)
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            (photo.name.as_str(), names)
        }
        Classified::Video(video) => {
            let tolerance = duration_tolerance_millis(video.precision);
            let names: Vec<&str> = index
                .videos_in(duration_bucket(video.duration_millis))
                .iter()
                .filter(|c| (video.duration_millis - c.duration_millis).abs() < tolerance)
                .map(|c| c.name.as_str())
                .collect();
            (video.name.as_str(), names)
        }
        // No derivable key: only the legacy fallback can apply.
        Classified::NameOnly(name) => (name.as_str(), Vec::new()),
    };

    if candidate_names.is_empty() {
        return if index.is_legacy_name(name) {
            Verdict::Ok
        } else {
            Verdict::NoMatchingKey
        };
    }

    match candidate_names.iter().filter(|n| **n == name).count() {
        0 => Verdict::NoMatchingName,
        1 => Verdict::Ok,
        _ => Verdict::TooManyMatches,
    }
}

// ============================================================================
// TESTS
// ============================================================================
