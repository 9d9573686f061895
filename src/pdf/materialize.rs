//! Writing historical versions as standalone files
//!
//! A historical version is the whole original file plus a fresh
//! `startxref`/`%%EOF` naming that version's xref section. Readers start
//! from the last `startxref`, so everything saved later is never reached.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pdf::document::{Document, Revision};

/// Full file content that a reader interprets as ending at `rev`
pub fn materialize(doc: &Document, rev: &Revision) -> Vec<u8> {
    let mut out = Vec::with_capacity(doc.bytes().len() + 32);
    out.extend_from_slice(doc.bytes());
    out.extend_from_slice(format!("\r\nstartxref\r\n{}\r\n%%EOF", rev.start).as_bytes());
    out
}

/// `<base>-version-<n>.pdf`
pub fn version_file_name(base: &str, version: u32) -> String {
    format!("{}-version-{}.pdf", base, version)
}

/// `<base>-versions`
pub fn versions_dir_name(base: &str) -> String {
    format!("{}-versions", base)
}

/// What [`write_versions`] did
#[derive(Debug)]
pub enum WriteOutcome {
    /// Fewer than two valid versions; nothing was created
    OnlyOneVersion,
    Written {
        dir: PathBuf,
        files: Vec<PathBuf>,
        /// Versions whose file could not be written, with the reason
        skipped: Vec<(u32, String)>,
    },
}

/// Write every valid version into `<parent>/<base>-versions/`
///
/// The versions directory must not exist yet. A version whose file cannot
/// be written is reported in `skipped` and the rest are still written.
pub fn write_versions(doc: &Document, parent: &Path) -> Result<WriteOutcome> {
    if doc.version_count() < 2 {
        return Ok(WriteOutcome::OnlyOneVersion);
    }

    fs::create_dir_all(parent)?;
    let dir = parent.join(versions_dir_name(doc.base_name()));
    match fs::create_dir(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(Error::AlreadyExists(dir)),
        Err(e) => return Err(e.into()),
    }

    let mut files = Vec::new();
    let mut skipped = Vec::new();
    for rev in doc.versions() {
        let path = dir.join(version_file_name(doc.base_name(), rev.version));
        match write_new(&path, &materialize(doc, rev)) {
            Ok(()) => {
                info!(version = rev.version, path = %path.display(), "wrote version");
                files.push(path);
            }
            Err(e) => {
                warn!(version = rev.version, path = %path.display(), "could not write version: {}", e);
                skipped.push((rev.version, e.to_string()));
            }
        }
    }
    Ok(WriteOutcome::Written { dir, files, skipped })
}

/// Create `path` and write `data`, refusing to replace an existing file
pub(crate) fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(Error::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(data)?;
    Ok(())
}
