//! Persistent exiftool session used as the metadata reader.
//!
//! One `exiftool -stay_open True` subprocess serves all reads; commands go
//! down its stdin and each result is a `-json` document terminated by a
//! `{ready}` marker. exiftool only accepts ASCII-representable paths on its
//! command channel, so other paths are staged under a temporary ASCII-safe
//! name for the duration of the read.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

use crate::models::RawRecord;
use crate::normalize::basename;
use crate::reconcile::MetadataReader;

/// Tags requested per file. Numeric tags use exiftool's `#` suffix so they
/// arrive as numbers; durations stay in human format ("12.345 s", "H:MM:SS")
/// because that is the grammar the normalizer speaks.
const TAG_ARGS: &[&str] = &[
    "-json",
    "-DateTimeOriginal",
    "-ExposureTime#",
    "-ApertureValue#",
    "-ISO#",
    "-FocalLength#",
    "-TrackDuration",
    "-Duration",
];

/// One object of exiftool's `-json` output.
#[derive(Debug, Default, Deserialize)]
struct ExifPayload {
    #[serde(rename = "DateTimeOriginal")]
    date_time_original: Option<String>,
    #[serde(rename = "ExposureTime")]
    exposure_time: Option<f64>,
    #[serde(rename = "ApertureValue")]
    aperture_value: Option<f64>,
    #[serde(rename = "ISO")]
    iso: Option<f64>,
    #[serde(rename = "FocalLength")]
    focal_length: Option<f64>,
    #[serde(rename = "TrackDuration")]
    track_duration: Option<serde_json::Value>,
    #[serde(rename = "Duration")]
    duration: Option<serde_json::Value>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

/// Duration tags usually arrive as strings, but exiftool emits bare numbers
/// of seconds for some containers. Coerce those into the unit grammar.
fn duration_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => n.as_f64().map(|secs| format!("{:.3} s", secs)),
        _ => None,
    }
}

fn payload_to_raw(payload: &ExifPayload, name: String) -> RawRecord {
    let duration = payload
        .track_duration
        .as_ref()
        .and_then(duration_string)
        .or_else(|| payload.duration.as_ref().and_then(duration_string));

    RawRecord {
        name: Some(name),
        time: payload.date_time_original.clone(),
        exposure_time: payload.exposure_time,
        aperture: payload.aperture_value,
        iso_speed: payload.iso,
        focal_length: payload.focal_length,
        duration,
    }
}

fn is_ascii_path(path: &Path) -> bool {
    matches!(path.to_str(), Some(s) if s.is_ascii())
}

pub struct ExifToolReader {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    staging: TempDir,
    staged_count: u64,
}

impl ExifToolReader {
    /// Spawn the session. Failure here is fatal to the whole run; nothing
    /// can be checked without a reader.
    pub fn open() -> Result<Self> {
        let mut child = Command::new("exiftool")
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to start exiftool (is it installed?)")?;

        let stdin = child.stdin.take().context("failed to open exiftool stdin")?;
        let stdout = child
            .stdout
            .take()
            .context("failed to open exiftool stdout")?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            staging: TempDir::new().context("failed to create staging directory")?,
            staged_count: 0,
        })
    }

    /// Send one command block and collect the JSON document up to `{ready}`.
    fn query(&mut self, path: &Path) -> Result<ExifPayload> {
        for arg in TAG_ARGS {
            writeln!(self.stdin, "{}", arg)?;
        }
        writeln!(self.stdin, "{}", path.display())?;
        writeln!(self.stdin, "-execute")?;
        self.stdin.flush().context("failed to write to exiftool")?;

        let mut json = String::new();
        loop {
            let mut line = String::new();
            let n = self
                .stdout
                .read_line(&mut line)
                .context("failed to read from exiftool")?;
            if n == 0 {
                bail!("exiftool session ended unexpectedly");
            }
            if line.trim_end() == "{ready}" {
                break;
            }
            json.push_str(&line);
        }

        let mut payloads: Vec<ExifPayload> = serde_json::from_str(json.trim())
            .with_context(|| format!("unparseable exiftool output for {}", path.display()))?;
        let payload = match payloads.pop() {
            Some(p) => p,
            None => bail!("exiftool returned no result for {}", path.display()),
        };
        if let Some(err) = payload.error {
            bail!("exiftool: {}", err);
        }
        Ok(payload)
    }

    /// Copy the file under an ASCII-safe name in the staging directory.
    /// The staged copy is removed after the read; the directory itself is
    /// cleaned up when the session drops, on every exit path.
    fn stage(&mut self, path: &Path) -> Result<PathBuf> {
        self.staged_count += 1;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.is_ascii())
            .unwrap_or("bin");
        let staged = self
            .staging
            .path()
            .join(format!("staged-{}.{}", self.staged_count, ext));
        std::fs::hard_link(path, &staged)
            .or_else(|_| std::fs::copy(path, &staged).map(|_| ()))
            .with_context(|| format!("failed to stage {}", path.display()))?;
        Ok(staged)
    }
}

impl MetadataReader for ExifToolReader {
    fn read(&mut self, path: &Path) -> Result<RawRecord> {
        let name = basename(&path.display().to_string());

        if is_ascii_path(path) {
            let payload = self.query(path)?;
            return Ok(payload_to_raw(&payload, name));
        }

        let staged = self.stage(path)?;
        let result = self.query(&staged);
        let _ = std::fs::remove_file(&staged);
        Ok(payload_to_raw(&result?, name))
    }
}

impl Drop for ExifToolReader {
    fn drop(&mut self) {
        // Ask the session to exit cleanly; reap it either way.
        let _ = writeln!(self.stdin, "-stay_open\nFalse");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ascii_path() {
        assert!(is_ascii_path(Path::new("/photos/a.jpg")));
        assert!(!is_ascii_path(Path::new("/photos/ünïcødé.jpg")));
    }

    #[test]
    fn test_duration_string_passthrough_and_coercion() {
        assert_eq!(
            duration_string(&serde_json::json!("0:02:05")),
            Some("0:02:05".to_string())
        );
        assert_eq!(
            duration_string(&serde_json::json!(12.345)),
            Some("12.345 s".to_string())
        );
        assert_eq!(duration_string(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_payload_to_raw_prefers_track_duration() {
        let payload = ExifPayload {
            track_duration: Some(serde_json::json!("12.345 s")),
            duration: Some(serde_json::json!("0:00:09")),
            ..Default::default()
        };
        let raw = payload_to_raw(&payload, "v.mp4".to_string());
        assert_eq!(raw.name.as_deref(), Some("v.mp4"));
        assert_eq!(raw.duration.as_deref(), Some("12.345 s"));
    }

    #[test]
    fn test_payload_to_raw_photo_fields() {
        let json = r#"[{
            "SourceFile": "a.jpg",
            "DateTimeOriginal": "2020:01:01 10:00:00",
            "ExposureTime": 0.01,
            "ApertureValue": 4.5,
            "ISO": 100,
            "FocalLength": 23.7
        }]"#;
        let mut payloads: Vec<ExifPayload> = serde_json::from_str(json).unwrap();
        let raw = payload_to_raw(&payloads.pop().unwrap(), "a.jpg".to_string());

        assert_eq!(raw.time.as_deref(), Some("2020:01:01 10:00:00"));
        assert_eq!(raw.aperture, Some(4.5));
        assert_eq!(raw.iso_speed, Some(100.0));
        assert_eq!(raw.focal_length, Some(23.7));
        assert_eq!(raw.duration, None);
    }

    #[test]
    fn test_error_payload_detected() {
        let json = r#"[{"SourceFile": "x.jpg", "Error": "File not found"}]"#;
        let payloads: Vec<ExifPayload> = serde_json::from_str(json).unwrap();
        assert_eq!(payloads[0].error.as_deref(), Some("File not found"));
    }
}
