//! Core data models for the audit pipeline.
//!
//! This module contains the raw and normalized record types plus the
//! per-file verdicts produced by the matcher and the reconciliation loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Raw Records
// ============================================================================

/// Unnormalized attribute bag, as stored in the database file or produced by
/// the metadata reader. Every field is optional; a photo carries `time`, a
/// video carries `duration`, a legacy entry carries only `name`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Capture timestamp, verbatim (e.g. "2020:01:01 10:00:00").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(rename = "exposureTime", skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,

    #[serde(rename = "isoSpeed", skip_serializing_if = "Option::is_none")]
    pub iso_speed: Option<f64>,

    #[serde(rename = "focalLength", skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,

    /// Free-form track duration: "12.345 s" or "H:MM:SS".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

// ============================================================================
// Normalized Records
// ============================================================================

/// Photo record with rounded camera settings. Only `time` and `name`
/// participate in matching; the rest is carried for verbose display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoRecord {
    pub name: String,
    pub time: String,
    pub exposure_time: i64,
    pub aperture: i64,
    pub iso_speed: i64,
    pub focal_length: i64,
}

/// Video record with parsed duration.
///
/// `precision` is the number of sub-second decimal digits the source had:
/// 1 for whole-second sources ("H:MM:SS"), 3 for millisecond sources
/// ("12.345 s"). The matcher derives its tolerance from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoRecord {
    pub name: String,
    pub duration_millis: i64,
    pub precision: u32,
}

/// Canonical comparable record: exactly one of photo or video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NormalizedRecord {
    Photo(PhotoRecord),
    Video(VideoRecord),
}

impl NormalizedRecord {
    pub fn name(&self) -> &str {
        match self {
            NormalizedRecord::Photo(p) => &p.name,
            NormalizedRecord::Video(v) => &v.name,
        }
    }
}

// ============================================================================
// Verdicts
// ============================================================================

/// Outcome for one local file. Never escapes the loop as an error; one bad
/// file must not prevent reporting on the rest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Exactly one counterpart in the database (or a legacy name-only match).
    Ok,
    /// The metadata reader failed for this file; message passed through.
    ReadError(String),
    /// No database record shares this file's time/duration key.
    NoMatchingKey,
    /// Key candidates exist but none shares the filename.
    NoMatchingName,
    /// More than one candidate shares both key and filename; ambiguous.
    TooManyMatches,
}

impl Verdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verdict::Ok)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => write!(f, "ok"),
            Verdict::ReadError(msg) => write!(f, "read error: {}", msg),
            Verdict::NoMatchingKey => write!(f, "no matching key"),
            Verdict::NoMatchingName => write!(f, "no matching name"),
            Verdict::TooManyMatches => write!(f, "too many matches"),
        }
    }
}

/// One reported line of a check run, tagged with the original path.
#[derive(Clone, Debug)]
pub struct Report {
    pub path: PathBuf,
    pub verdict: Verdict,
}
