//! Database index built once from the remote metadata records.
//!
//! Photos are bucketed by their exact time token, videos by whole-second
//! duration bucket, and legacy entries (neither key) by name. The index is
//! read-only after construction; no update operation exists.

use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::models::{PhotoRecord, RawRecord, VideoRecord};
use crate::normalize::{classify, Classified};

/// Duration bucket key: whole seconds, rounded down.
pub fn duration_bucket(duration_millis: i64) -> i64 {
    duration_millis / 1000
}

#[derive(Debug, Default)]
pub struct DatabaseIndex {
    image_by_time: FxHashMap<String, Vec<PhotoRecord>>,
    video_by_bucket: FxHashMap<i64, Vec<VideoRecord>>,
    legacy_names: FxHashSet<String>,
    len: usize,
}

impl DatabaseIndex {
    /// Build the index in a single pass over the raw records.
    ///
    /// Missing keys are meaningful (legacy entries) and never an error.
    /// A malformed duration string indicates a corrupt database: it is
    /// warned about loudly and the record is excluded, but the build
    /// continues.
    pub fn build(records: &[RawRecord]) -> Self {
        let mut index = DatabaseIndex::default();

        for record in records {
            match classify(record) {
                Ok(Classified::Photo(photo)) => {
                    index
                        .image_by_time
                        .entry(photo.time.clone())
                        .or_default()
                        .push(photo);
                    index.len += 1;
                }
                Ok(Classified::Video(video)) => {
                    index
                        .video_by_bucket
                        .entry(duration_bucket(video.duration_millis))
                        .or_default()
                        .push(video);
                    index.len += 1;
                }
                Ok(Classified::NameOnly(name)) => {
                    index.legacy_names.insert(name);
                    index.len += 1;
                }
                Err(err) => {
                    eprintln!("warning: skipping database record: {}", err);
                }
            }
        }

        index
    }

    /// Load a JSON-array database file and build the index from it.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open database file {}", path.display()))?;
        let records: Vec<RawRecord> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse database file {}", path.display()))?;
        Ok(Self::build(&records))
    }

    /// Photos sharing this exact time token.
    pub fn photos_at(&self, time: &str) -> &[PhotoRecord] {
        self.image_by_time.get(time).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Videos in this whole-second duration bucket.
    pub fn videos_in(&self, bucket: i64) -> &[VideoRecord] {
        self.video_by_bucket
            .get(&bucket)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether a name belongs to a legacy entry (no time, no duration).
    pub fn is_legacy_name(&self, name: &str) -> bool {
        self.legacy_names.contains(name)
    }

    /// Number of indexed records, legacy entries included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn photo(name: &str, time: &str) -> RawRecord {
        RawRecord {
            name: Some(name.to_string()),
            time: Some(time.to_string()),
            ..Default::default()
        }
    }

    fn video(name: &str, duration: &str) -> RawRecord {
        RawRecord {
            name: Some(name.to_string()),
            duration: Some(duration.to_string()),
            ..Default::default()
        }
    }

    fn legacy(name: &str) -> RawRecord {
        RawRecord {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_routes_each_record_to_one_bucket() {
        let records = vec![
            photo("a.jpg", "2020:01:01 10:00:00"),
            photo("b.jpg", "2020:01:01 10:00:00"),
            video("c.mp4", "12.345 s"),
            legacy("old.jpg"),
        ];
        let index = DatabaseIndex::build(&records);

        assert_eq!(index.len(), 4);
        assert_eq!(index.photos_at("2020:01:01 10:00:00").len(), 2);
        assert_eq!(index.videos_in(12).len(), 1);
        assert!(index.videos_in(13).is_empty());
        assert!(index.is_legacy_name("old.jpg"));
        assert!(!index.is_legacy_name("a.jpg"));
    }

    #[test]
    fn test_build_excludes_malformed_durations() {
        let records = vec![video("bad.mp4", "12 minutes"), video("good.mp4", "0:00:12")];
        let index = DatabaseIndex::build(&records);

        assert_eq!(index.len(), 1);
        assert_eq!(index.videos_in(12).len(), 1);
        assert_eq!(index.videos_in(12)[0].name, "good.mp4");
    }

    #[test]
    fn test_build_skips_nameless_records() {
        let records = vec![RawRecord {
            time: Some("2020:01:01 10:00:00".to_string()),
            ..Default::default()
        }];
        let index = DatabaseIndex::build(&records);
        assert!(index.is_empty());
    }

    #[test]
    fn test_duration_bucket_floors() {
        assert_eq!(duration_bucket(12999), 12);
        assert_eq!(duration_bucket(12000), 12);
        assert_eq!(duration_bucket(999), 0);
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "a.jpg", "time": "2020:01:01 10:00:00", "aperture": 4.5}},
                {{"name": "c.mp4", "duration": "00:02:05"}},
                {{"name": "old.jpg"}}
            ]"#
        )
        .unwrap();

        let index = DatabaseIndex::load(file.path()).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.photos_at("2020:01:01 10:00:00")[0].aperture, 5);
        assert_eq!(index.videos_in(125).len(), 1);
        assert!(index.is_legacy_name("old.jpg"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(DatabaseIndex::load(Path::new("/nonexistent/db.json")).is_err());
    }
}
