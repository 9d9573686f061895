//! Overwriting superseded object bodies in a copy of the file (experimental)
//!
//! Targets are objects modified in a revision that a later revision
//! replaced, and the last in-use body of every deleted object. Nothing that
//! the newest revision still reaches is touched.

use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pdf::document::Document;
use crate::pdf::materialize::write_new;
use crate::pdf::object::body_range;
use crate::pdf::status::{classify_document, Status};
use crate::pdf::xref::{Entry, EntryKind};

/// Body replacement; the rest of the range is padded with spaces
const FILLER: &[u8] = b" null ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrubbedObject {
    pub version: u32,
    pub id: u32,
    pub status: Status,
    /// Overwritten bytes, between `obj` and `endobj`
    pub range: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedObject {
    pub version: u32,
    pub id: u32,
    pub reason: String,
}

/// Scrubbed copy of the file and what was done to it
#[derive(Debug, Clone)]
pub struct ScrubReport {
    pub data: Vec<u8>,
    pub scrubbed: Vec<ScrubbedObject>,
    pub skipped: Vec<SkippedObject>,
}

/// Build the scrubbed copy
///
/// Byte ranges are always computed on the original content, so the result
/// only depends on the document.
pub fn scrub(doc: &Document) -> ScrubReport {
    let mut report = ScrubReport {
        data: doc.bytes().to_vec(),
        scrubbed: Vec::new(),
        skipped: Vec::new(),
    };
    let Some(latest) = doc.latest().map(|r| r.version) else {
        return report;
    };

    let protected = protected_offsets(doc, latest);
    let mut seen = HashSet::new();

    for rev in classify_document(doc) {
        for change in &rev.changes {
            let target = match change.status {
                Status::Modified if rev.version != latest => change.entry,
                Status::Deleted => match change.previous {
                    Some(previous) => previous,
                    None => continue,
                },
                _ => continue,
            };
            if !seen.insert((target.kind, target.offset)) {
                continue;
            }
            match scrub_range(doc, &target, &protected) {
                Ok(range) => {
                    info!(version = rev.version, object = target.id, "scrubbing {} object body", change.status);
                    report.scrubbed.push(ScrubbedObject {
                        version: rev.version,
                        id: target.id,
                        status: change.status,
                        range,
                    });
                }
                Err(reason) => {
                    warn!(version = rev.version, object = target.id, "not scrubbing: {}", reason);
                    report.skipped.push(SkippedObject {
                        version: rev.version,
                        id: target.id,
                        reason,
                    });
                }
            }
        }
    }

    for object in &report.scrubbed {
        fill(&mut report.data[object.range.clone()]);
    }
    report
}

/// Offsets that must survive: live object bodies, live object streams,
/// and every xref section
fn protected_offsets(doc: &Document, latest: u32) -> HashSet<u64> {
    let live = doc.effective_entries(latest);
    let mut protected: HashSet<u64> = doc
        .revisions
        .iter()
        .flat_map(|r| r.sections.iter().copied())
        .collect();
    for entry in live.values() {
        match entry.kind {
            EntryKind::InUse => {
                protected.insert(entry.offset);
            }
            EntryKind::Compressed { .. } => {
                let container = entry.container().and_then(|id| live.get(&id));
                if let Some(container) = container.filter(|c| c.kind == EntryKind::InUse) {
                    protected.insert(container.offset);
                }
            }
            EntryKind::Free => {}
        }
    }
    protected
}

fn scrub_range(doc: &Document, target: &Entry, protected: &HashSet<u64>) -> std::result::Result<Range<usize>, String> {
    if let Some(container) = target.container() {
        return Err(format!("stored in object stream {container}, no byte range of its own"));
    }
    if protected.contains(&target.offset) {
        return Err(format!("offset {} is still in use by the newest version", target.offset));
    }
    let range = body_range(doc.bytes(), target).map_err(|e| e.to_string())?;
    let overlaps = protected
        .iter()
        .any(|&p| p > range.start as u64 && p < range.end as u64);
    if overlaps {
        return Err(format!("body {}..{} overlaps live data", range.start, range.end));
    }
    Ok(range)
}

fn fill(body: &mut [u8]) {
    body.fill(b' ');
    if body.len() >= FILLER.len() {
        body[..FILLER.len()].copy_from_slice(FILLER);
    }
}

/// `<dir>/<stem>-scrubbed.pdf` next to the input
pub fn scrubbed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}-scrubbed.pdf"))
}

/// Scrub and write the copy to `path`, which must not exist
pub fn write_scrubbed(doc: &Document, path: &Path) -> Result<ScrubReport> {
    if path.exists() {
        return Err(Error::AlreadyExists(path.to_path_buf()));
    }
    let report = scrub(doc);
    write_new(path, &report.data)?;
    info!(
        path = %path.display(),
        scrubbed = report.scrubbed.len(),
        skipped = report.skipped.len(),
        "wrote scrubbed copy"
    );
    Ok(report)
}
