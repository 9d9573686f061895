//! Human-readable history summary and creator information

use std::io::{self, Write};

use lopdf::Object;

use crate::options::Mode;
use crate::pdf::document::{Document, Revision};
use crate::pdf::object::object_type;
use crate::pdf::status::{RevisionChanges, Status};
use crate::pdf::xref::{Entry, EntryKind};

/// Per-object status table, per-version counts and the version count
///
/// In quiet mode only the version count is written.
pub fn write_summary<W: Write>(out: &mut W, doc: &Document, changes: &[RevisionChanges], mode: &Mode) -> io::Result<()> {
    if mode.quiet {
        return writeln!(out, "{}", doc.version_count());
    }

    for rev in changes {
        for change in &rev.changes {
            writeln!(
                out,
                "{}: --{}-- Version {} -- Object {} {} {} ({})",
                doc.name,
                change.status.letter(),
                rev.version,
                change.entry.id,
                change.entry.generation,
                change.entry.flag(),
                describe(doc, &change.entry)
            )?;
        }
    }

    for rev in doc.invalid_revisions() {
        writeln!(
            out,
            "{}: Skipped xref at offset {} -- {}",
            doc.name,
            rev.start,
            rev.diagnostic.as_deref().unwrap_or("not part of the chain")
        )?;
    }

    for rev in changes {
        writeln!(
            out,
            "{}: Version {} -- {} added, {} modified, {} deleted",
            doc.name,
            rev.version,
            rev.count(Status::Added),
            rev.count(Status::Modified),
            rev.count(Status::Deleted)
        )?;
    }

    writeln!(out, "{}: {}", doc.name, doc.version_count())
}

fn describe(doc: &Document, entry: &Entry) -> String {
    match entry.kind {
        EntryKind::InUse => object_type(doc.bytes(), entry).unwrap_or_else(|| "Unknown".to_string()),
        EntryKind::Compressed { .. } => format!("compressed in {}", entry.offset),
        EntryKind::Free => "free".to_string(),
    }
}

/// Revisions whose creator information is worth showing: the first one,
/// and every later one whose Info object was added or modified
pub fn creator_versions<'a>(doc: &'a Document, changes: &[RevisionChanges]) -> Vec<&'a Revision> {
    doc.versions()
        .filter(|rev| !rev.creator.is_empty())
        .filter(|rev| {
            if rev.version == 1 {
                return true;
            }
            match rev.trailer().get(b"Info") {
                Ok(Object::Reference((id, _))) => changes
                    .iter()
                    .find(|c| c.version == rev.version)
                    .and_then(|c| c.get(*id))
                    .is_some_and(|c| matches!(c.status, Status::Added | Status::Modified)),
                // inline Info dictionaries have no object to compare
                _ => true,
            }
        })
        .collect()
}

/// `PDF Version: M.m`, then one block of `key: value` lines per version
pub fn write_creator_info<W: Write>(out: &mut W, doc: &Document, changes: &[RevisionChanges]) -> io::Result<()> {
    writeln!(out, "PDF Version: {}.{}", doc.major_version, doc.minor_version)?;
    for rev in creator_versions(doc, changes) {
        writeln!(out, "--- Version {} ---", rev.version)?;
        for field in &rev.creator {
            match field.date() {
                Some(date) => writeln!(
                    out,
                    "{}: {} ({})",
                    field.key,
                    field.value,
                    date.format("%Y-%m-%d %H:%M:%S %:z")
                )?,
                None => writeln!(out, "{}: {}", field.key, field.value)?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}
