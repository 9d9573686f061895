//! The reconstructed document: header facts plus every revision

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use lopdf::Dictionary;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::options::ScanOptions;
use crate::pdf::creator::{self, CreatorField};
use crate::pdf::scan::{self, EofMarker};
use crate::pdf::xref::Entry;
use crate::pdf::chain;

/// One logical incremental save
///
/// A revision may merge several physical xref sections (linearized files
/// split their first save in two). `version == 0` marks a section that was
/// found but could not be linked into the chain; such revisions are kept
/// for diagnostics and excluded from version counts.
#[derive(Debug, Clone)]
pub struct Revision {
    /// Offset a reader's `startxref` must name to start at this revision
    pub start: u64,
    /// Offset just past the `%%EOF` that closes this revision
    pub end: u64,
    /// 1 = oldest; 0 = not part of the chain
    pub version: u32,
    /// Built by merging more than one physical section
    pub is_linear: bool,
    /// At least one merged section was an xref stream
    pub is_stream: bool,
    /// Entries sorted by object id, one per id
    pub entries: Vec<Entry>,
    /// Offsets of the physical xref sections merged into this revision
    pub sections: Vec<u64>,
    /// Creator information from the Info dictionary, when readable
    pub creator: Vec<CreatorField>,
    /// Why this revision is not part of the chain
    pub diagnostic: Option<String>,
    pub(crate) trailer: Dictionary,
}

impl Revision {
    pub fn is_valid(&self) -> bool {
        self.version != 0
    }

    /// Entry for `id` in this revision
    pub fn entry(&self, id: u32) -> Option<&Entry> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Trailer dictionary of the section a reader reaches first
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }
}

/// A PDF file and its recovered history
#[derive(Debug, Clone)]
pub struct Document {
    /// Name the document was loaded under (the file name for files on disk)
    pub name: String,
    pub major_version: u8,
    pub minor_version: u8,
    pub file_size: u64,
    /// Valid revisions in ascending version order, then invalid ones in file order
    pub revisions: Vec<Revision>,
    /// Some revision uses a cross-reference stream
    pub has_xref_streams: bool,
    /// The first object is a linearization dictionary
    pub is_linearized: bool,
    /// Every `%%EOF` in the file, trusted or not
    pub eof_markers: Vec<EofMarker>,
    data: Vec<u8>,
}

impl Document {
    /// Load and reconstruct a PDF file with default limits
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, &ScanOptions::default())
    }

    /// Load and reconstruct a PDF file
    pub fn load_with(path: &Path, options: &ScanOptions) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let data = std::fs::read(path)?;
        Self::from_bytes_with(name, data, options)
    }

    /// Reconstruct from an already opened source
    pub fn from_reader<R: Read>(name: impl Into<String>, mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(name, data)
    }

    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(name, data, &ScanOptions::default())
    }

    pub fn from_bytes_with(name: impl Into<String>, data: Vec<u8>, options: &ScanOptions) -> Result<Self> {
        let name = name.into();
        let (major_version, minor_version) = scan::pdf_version(&data).ok_or_else(|| Error::NotPdf(name.clone()))?;

        let eof_markers = scan::find_eof_markers(&data);
        let mut revisions = chain::reconstruct(&data, &eof_markers, options);

        let creators: Vec<(usize, Vec<CreatorField>)> = revisions
            .iter()
            .enumerate()
            .filter(|(_, rev)| rev.is_valid())
            .map(|(i, rev)| {
                let table = effective_table(&revisions, rev.version);
                (i, creator::resolve_creator(&data, rev, &table))
            })
            .collect();
        for (i, fields) in creators {
            revisions[i].creator = fields;
        }

        let doc = Document {
            major_version,
            minor_version,
            file_size: data.len() as u64,
            has_xref_streams: revisions.iter().any(|r| r.is_stream),
            is_linearized: scan::is_linearized(&data),
            eof_markers,
            revisions,
            name,
            data,
        };
        info!(
            name = %doc.name,
            markers = doc.eof_markers.len(),
            versions = doc.version_count(),
            "reconstructed xref chain"
        );
        Ok(doc)
    }

    /// Original file content
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// File name without directory or extension, used to name outputs
    pub fn base_name(&self) -> &str {
        let name = self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name);
        match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        }
    }

    /// Number of `%%EOF` markers found, trusted or not
    pub fn eof_count(&self) -> usize {
        self.eof_markers.len()
    }

    /// Valid revisions, oldest first
    pub fn versions(&self) -> impl DoubleEndedIterator<Item = &Revision> {
        self.revisions.iter().filter(|r| r.is_valid())
    }

    /// Revisions that could not be linked into the chain
    pub fn invalid_revisions(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter().filter(|r| !r.is_valid())
    }

    pub fn version_count(&self) -> usize {
        self.versions().count()
    }

    /// Revision with the given (nonzero) version number
    pub fn revision(&self, version: u32) -> Option<&Revision> {
        self.versions().find(|r| r.version == version)
    }

    /// Most recent revision
    pub fn latest(&self) -> Option<&Revision> {
        self.versions().last()
    }

    /// Object table a reader sees at `version`: the newest entry for every id
    pub fn effective_entries(&self, version: u32) -> BTreeMap<u32, Entry> {
        effective_table(&self.revisions, version)
    }
}

pub(crate) fn effective_table(revisions: &[Revision], version: u32) -> BTreeMap<u32, Entry> {
    let mut table = BTreeMap::new();
    let mut ordered: Vec<&Revision> = revisions
        .iter()
        .filter(|r| r.is_valid() && r.version <= version)
        .collect();
    ordered.sort_by_key(|r| r.version);
    for rev in ordered {
        for entry in &rev.entries {
            table.insert(entry.id, *entry);
        }
    }
    debug!(version, objects = table.len(), "built effective object table");
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_pdf() {
        let result = Document::from_bytes("notes.txt", b"hello world".to_vec());
        assert!(matches!(result, Err(Error::NotPdf(name)) if name == "notes.txt"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Document::load(Path::new("nonexistent.pdf"));
        assert!(matches!(result.unwrap_err(), Error::FileNotFound(_)));
    }

    #[test]
    fn test_header_without_xref() {
        let doc = Document::from_bytes("empty.pdf", b"%PDF-1.3\n".to_vec()).unwrap();
        assert_eq!((doc.major_version, doc.minor_version), (1, 3));
        assert_eq!(doc.eof_count(), 0);
        assert_eq!(doc.version_count(), 0);
        assert!(doc.latest().is_none());
    }

    #[test]
    fn test_base_name() {
        let doc = Document::from_bytes("dir/report.final.pdf", b"%PDF-1.3\n".to_vec()).unwrap();
        assert_eq!(doc.base_name(), "report.final");
        let doc = Document::from_bytes(".hidden", b"%PDF-1.3\n".to_vec()).unwrap();
        assert_eq!(doc.base_name(), ".hidden");
    }
}
