//! Remote lister: pages the Drive v3 files listing and streams each file's
//! metadata as a RawRecord.
//!
//! Records are emitted as they arrive - the listing can span hundreds of
//! thousands of files and is never buffered whole. Files without image or
//! video metadata become name-only legacy records.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::io::Write;

use crate::models::RawRecord;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const PAGE_SIZE: &str = "1000";
const FIELDS: &str = "nextPageToken, files(name, imageMediaMetadata, videoMediaMetadata)";

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    name: String,
    image_media_metadata: Option<ImageMetadata>,
    video_media_metadata: Option<VideoMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageMetadata {
    time: Option<String>,
    exposure_time: Option<f64>,
    aperture: Option<f64>,
    iso_speed: Option<f64>,
    focal_length: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoMetadata {
    /// Drive reports video duration as a decimal string of milliseconds.
    duration_millis: Option<String>,
}

/// Render Drive's millisecond count in the duration grammar the normalizer
/// parses at full precision: "125000" becomes "125.000 s".
fn millis_to_duration(millis: &str) -> Option<String> {
    let millis: i64 = millis.parse().ok()?;
    Some(format!("{}.{:03} s", millis / 1000, millis % 1000))
}

fn to_raw(file: DriveFile) -> RawRecord {
    let duration = file
        .video_media_metadata
        .as_ref()
        .and_then(|v| v.duration_millis.as_deref())
        .and_then(millis_to_duration);
    if let Some(duration) = duration {
        return RawRecord {
            name: Some(file.name),
            duration: Some(duration),
            ..Default::default()
        };
    }

    match file.image_media_metadata {
        Some(image) => RawRecord {
            name: Some(file.name),
            time: image.time,
            exposure_time: image.exposure_time,
            aperture: image.aperture,
            iso_speed: image.iso_speed,
            focal_length: image.focal_length,
            duration: None,
        },
        // No metadata at all: a legacy entry, queryable by name only.
        None => RawRecord {
            name: Some(file.name),
            ..Default::default()
        },
    }
}

// ============================================================================
// Lister
// ============================================================================

pub struct RemoteLister<'a> {
    client: &'a Client,
    access_token: String,
}

impl<'a> RemoteLister<'a> {
    pub fn new(client: &'a Client, access_token: String) -> Self {
        Self {
            client,
            access_token,
        }
    }

    /// Fetch one page: the records plus the continuation token, if any.
    pub fn list_page(&self, page_token: Option<&str>) -> Result<(Vec<RawRecord>, Option<String>)> {
        let mut request = self
            .client
            .get(FILES_URL)
            .bearer_auth(&self.access_token)
            .query(&[("pageSize", PAGE_SIZE), ("fields", FIELDS)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().context("Drive listing request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("Drive API returned {}", response.status());
        }
        let page: FileList = response
            .json()
            .context("failed to parse Drive listing response")?;

        let records = page.files.into_iter().map(to_raw).collect();
        Ok((records, page.next_page_token))
    }
}

/// Page through the whole listing, writing a JSON array of RawRecords to
/// `out` one record per line, each page as soon as it arrives.
pub fn download(lister: &RemoteLister, out: &mut impl Write) -> Result<()> {
    writeln!(out, "[")?;

    let mut page_token: Option<String> = None;
    let mut first = true;
    loop {
        let (records, next) = lister.list_page(page_token.as_deref())?;
        for record in records {
            if !first {
                writeln!(out, ",")?;
            }
            first = false;
            write!(out, "{}", serde_json::to_string(&record)?)?;
        }
        match next {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    writeln!(out, "\n]")?;
    out.flush()?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
