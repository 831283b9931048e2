//! Reconciliation loop: one verdict per local file, in input order.
//!
//! Each file is evaluated independently; a reader failure or malformed
//! record becomes that file's verdict and the loop continues. Files are
//! processed sequentially - the metadata reader is a single shared session
//! that serializes reads anyway, and a sequential loop preserves report
//! order for free.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::index::DatabaseIndex;
use crate::matcher::match_record;
use crate::models::{RawRecord, Report, Verdict};
use crate::normalize::classify;

/// External metadata reader collaborator. Implementations may hold a
/// persistent subprocess session; failures are per-file, never fatal.
pub trait MetadataReader {
    fn read(&mut self, path: &Path) -> Result<RawRecord>;
}

/// Evaluate a single file. Reader and classification failures fold into
/// a `ReadError` verdict rather than propagating.
pub fn check_file<R: MetadataReader>(
    index: &DatabaseIndex,
    reader: &mut R,
    path: &Path,
) -> Verdict {
    let raw = match reader.read(path) {
        Ok(raw) => raw,
        Err(err) => return Verdict::ReadError(format!("{:#}", err)),
    };

    // Ensure the matched name is the local file's basename even if the
    // reader left the name unset.
    let raw = RawRecord {
        name: raw.name.or_else(|| Some(path.display().to_string())),
        ..raw
    };

    match classify(&raw) {
        Ok(classified) => match_record(index, &classified),
        Err(err) => Verdict::ReadError(format!("{:#}", err)),
    }
}

/// Drive the loop over all paths in input order, invoking `on_report` as
/// each verdict is reached and returning the full ordered batch.
pub fn run_check<R: MetadataReader>(
    index: &DatabaseIndex,
    reader: &mut R,
    paths: &[PathBuf],
    mut on_report: impl FnMut(&Report),
) -> Vec<Report> {
    let mut reports = Vec::with_capacity(paths.len());

    for path in paths {
        let report = Report {
            path: path.clone(),
            verdict: check_file(index, reader, path),
        };
        on_report(&report);
        reports.push(report);
    }

    reports
}

// ============================================================================
// TESTS
// ============================================================================
