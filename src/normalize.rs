//! Normalization of raw attribute bags into comparable records.
//!
//! Values that differ only in their source's numeric resolution must come
//! out equal: camera settings are rounded to integers, durations are parsed
//! to milliseconds with an explicit precision marker, time tokens are kept
//! verbatim (byte-for-byte equality, no timezone handling).

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::models::{NormalizedRecord, PhotoRecord, RawRecord, VideoRecord};

// ============================================================================
// Duration Grammar
// ============================================================================

/// Trailing-unit seconds: "12.345 s", "7 s".
static UNIT_SECONDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*s$").unwrap());

/// Clock format: "0:02:05", "00:02:05", "1:15:03".
static CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):([0-5]?\d):([0-5]?\d)$").unwrap());

/// Parsed duration: milliseconds plus the decimal digits of sub-second
/// precision the source format carried (1 = whole seconds, 3 = milliseconds).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedDuration {
    pub millis: i64,
    pub precision: u32,
}

/// Parse a free-form duration string. Only the two formats above are
/// supported; anything else is a malformed record.
pub fn parse_duration(raw: &str) -> Result<ParsedDuration> {
    let trimmed = raw.trim();

    if let Some(caps) = UNIT_SECONDS.captures(trimmed) {
        let seconds: f64 = caps[1].parse()?;
        return Ok(ParsedDuration {
            millis: (seconds * 1000.0).round() as i64,
            precision: 3,
        });
    }

    if let Some(caps) = CLOCK.captures(trimmed) {
        let h: i64 = caps[1].parse()?;
        let m: i64 = caps[2].parse()?;
        let s: i64 = caps[3].parse()?;
        return Ok(ParsedDuration {
            millis: (h * 3600 + m * 60 + s) * 1000,
            precision: 1,
        });
    }

    bail!("malformed record: unrecognized duration {:?}", raw);
}

// ============================================================================
// Rounding
// ============================================================================

/// Round half away from zero, the rounding the remote listing applies to
/// camera settings. `f64::round` has exactly these semantics.
pub fn round_half_away(value: f64) -> i64 {
    value.round() as i64
}

/// Final path segment of a record's name. Database entries usually carry a
/// bare filename already; local paths never do.
pub fn basename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

// ============================================================================
// Classification
// ============================================================================

/// A raw record routed to its matchable shape. Records with neither a time
/// nor a duration are meaningful (legacy entries matched by name alone), so
/// classification must not fail on missing keys - only on a malformed
/// duration string.
#[derive(Clone, Debug, PartialEq)]
pub enum Classified {
    Photo(PhotoRecord),
    Video(VideoRecord),
    NameOnly(String),
}

/// Classify a raw record. The variant is decided by presence of a duration
/// (video) vs a time (photo); `name` is required either way.
pub fn classify(raw: &RawRecord) -> Result<Classified> {
    let name = match raw.name.as_deref() {
        Some(n) if !n.is_empty() => basename(n),
        _ => bail!("malformed record: missing name"),
    };

    if let Some(duration) = raw.duration.as_deref() {
        let parsed = parse_duration(duration)?;
        return Ok(Classified::Video(VideoRecord {
            name,
            duration_millis: parsed.millis,
            precision: parsed.precision,
        }));
    }

    if let Some(time) = raw.time.as_deref() {
        return Ok(Classified::Photo(PhotoRecord {
            name,
            time: time.to_string(),
            exposure_time: raw.exposure_time.map(round_half_away).unwrap_or(0),
            aperture: raw.aperture.map(round_half_away).unwrap_or(0),
            iso_speed: raw.iso_speed.map(round_half_away).unwrap_or(0),
            focal_length: raw.focal_length.map(round_half_away).unwrap_or(0),
        }));
    }

    Ok(Classified::NameOnly(name))
}

/// Strict normalization for callers that require a comparable key.
/// Fails when neither a time nor a duration can be derived.
pub fn normalize(raw: &RawRecord) -> Result<NormalizedRecord> {
    match classify(raw)? {
        Classified::Photo(p) => Ok(NormalizedRecord::Photo(p)),
        Classified::Video(v) => Ok(NormalizedRecord::Video(v)),
        Classified::NameOnly(name) => {
            bail!("malformed record: {:?} has neither time nor duration", name)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn photo_raw() -> RawRecord {
        RawRecord {
            name: Some("2020/vacation/a.jpg".to_string()),
            time: Some("2020:01:01 10:00:00".to_string()),
            exposure_time: Some(0.0166),
            aperture: Some(4.5),
            iso_speed: Some(99.6),
            focal_length: Some(23.5),
            duration: None,
        }
    }

    #[test]
    fn test_parse_duration_unit_seconds() {
        let d = parse_duration("12.345 s").unwrap();
        assert_eq!(d.millis, 12345);
        assert_eq!(d.precision, 3);
    }

    #[test]
    fn test_parse_duration_clock() {
        let d = parse_duration("00:02:05").unwrap();
        assert_eq!(d.millis, 125_000);
        assert_eq!(d.precision, 1);
    }

    #[test]
    fn test_parse_duration_clock_with_hours() {
        let d = parse_duration("1:15:03").unwrap();
        assert_eq!(d.millis, (3600 + 15 * 60 + 3) * 1000);
        assert_eq!(d.precision, 1);
    }

    #[test]
    fn test_parse_duration_no_fraction_still_millis_precision() {
        let d = parse_duration("7 s").unwrap();
        assert_eq!(d.millis, 7000);
        assert_eq!(d.precision, 3);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("12 minutes").is_err());
        assert!(parse_duration("02:05").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_round_half_away() {
        assert_eq!(round_half_away(0.5), 1);
        assert_eq!(round_half_away(-0.5), -1);
        assert_eq!(round_half_away(99.6), 100);
        assert_eq!(round_half_away(23.4), 23);
    }

    #[test]
    fn test_classify_photo_rounds_and_strips_directory() {
        let c = classify(&photo_raw()).unwrap();
        match c {
            Classified::Photo(p) => {
                assert_eq!(p.name, "a.jpg");
                assert_eq!(p.time, "2020:01:01 10:00:00");
                assert_eq!(p.exposure_time, 0);
                assert_eq!(p.aperture, 5);
                assert_eq!(p.iso_speed, 100);
                assert_eq!(p.focal_length, 24);
            }
            other => panic!("expected photo, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_video_over_photo_when_duration_present() {
        let mut raw = photo_raw();
        raw.duration = Some("12.345 s".to_string());
        match classify(&raw).unwrap() {
            Classified::Video(v) => {
                assert_eq!(v.duration_millis, 12345);
                assert_eq!(v.precision, 3);
            }
            other => panic!("expected video, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_name_only() {
        let raw = RawRecord {
            name: Some("old.jpg".to_string()),
            ..Default::default()
        };
        assert_eq!(
            classify(&raw).unwrap(),
            Classified::NameOnly("old.jpg".to_string())
        );
    }

    #[test]
    fn test_classify_requires_name() {
        let raw = RawRecord {
            time: Some("2020:01:01 10:00:00".to_string()),
            ..Default::default()
        };
        assert!(classify(&raw).is_err());
    }

    #[test]
    fn test_normalize_rejects_name_only() {
        let raw = RawRecord {
            name: Some("old.jpg".to_string()),
            ..Default::default()
        };
        assert!(normalize(&raw).is_err());
    }

    #[test]
    fn test_normalize_is_idempotent_on_equal_inputs() {
        let a = normalize(&photo_raw()).unwrap();
        let b = normalize(&photo_raw()).unwrap();
        assert_eq!(a, b);
    }
}
