//! Cross-reference entries and physical xref sections

use std::collections::HashMap;

use lopdf::{Dictionary, Object};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::options::ScanOptions;
use crate::pdf::lexer::Lexer;
use crate::pdf::{xref_stream, xref_table};

/// How an xref entry locates its object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Object number is on the free list
    Free,
    /// Object body sits at [`Entry::offset`] in the file
    InUse,
    /// Object is stored in an object stream; [`Entry::offset`] holds the
    /// containing stream's object id and `index` its position inside it
    Compressed { index: u32 },
}

/// One cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    pub id: u32,
    pub offset: u64,
    pub generation: u32,
    pub kind: EntryKind,
}

impl Entry {
    pub fn in_use(id: u32, offset: u64, generation: u32) -> Self {
        Self { id, offset, generation, kind: EntryKind::InUse }
    }

    pub fn free(id: u32, next_free: u64, generation: u32) -> Self {
        Self { id, offset: next_free, generation, kind: EntryKind::Free }
    }

    pub fn compressed(id: u32, container: u32, index: u32) -> Self {
        Self {
            id,
            offset: u64::from(container),
            generation: 0,
            kind: EntryKind::Compressed { index },
        }
    }

    /// In use, either directly or inside an object stream
    pub fn is_in_use(&self) -> bool {
        !self.is_free()
    }

    pub fn is_free(&self) -> bool {
        self.kind == EntryKind::Free
    }

    /// Object id of the containing object stream, for compressed entries
    pub fn container(&self) -> Option<u32> {
        match self.kind {
            EntryKind::Compressed { .. } => u32::try_from(self.offset).ok(),
            _ => None,
        }
    }

    /// Same place in the file (or the same slot in the same object stream)
    pub fn same_location(&self, other: &Entry) -> bool {
        self.offset == other.offset && self.generation == other.generation && self.kind == other.kind
    }

    /// `n`, `f` or `c` (compressed), as printed in summaries
    pub fn flag(&self) -> char {
        match self.kind {
            EntryKind::Free => 'f',
            EntryKind::InUse => 'n',
            EntryKind::Compressed { .. } => 'c',
        }
    }
}

/// Encoding of a physical xref section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    /// Plain-text `xref` table followed by a `trailer`
    Table,
    /// PDF 1.5 `/Type /XRef` stream object
    Stream,
}

/// One physical xref section as found at a byte offset
#[derive(Debug, Clone)]
pub struct XrefSection {
    pub offset: u64,
    pub kind: XrefKind,
    /// Entries in the order they were read; later duplicates win
    pub entries: Vec<Entry>,
    /// Trailer dictionary (the stream dictionary for xref streams)
    pub trailer: Dictionary,
    /// A table whose trailer pointed at an `/XRefStm` that was merged in
    pub hybrid: bool,
}

impl XrefSection {
    /// Offset of the previous section in the back-link chain
    ///
    /// `Ok(None)` when the trailer has no `/Prev`; an error when it has one
    /// that is not a non-negative integer.
    pub fn prev(&self) -> std::result::Result<Option<u64>, String> {
        match self.trailer.get(b"Prev") {
            Err(_) => Ok(None),
            Ok(value) => value
                .as_i64()
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| format!("/Prev {} is not a byte offset", describe_value(value))),
        }
    }

    /// Declared `/Size`
    pub fn size(&self) -> Option<u64> {
        non_negative(&self.trailer, b"Size")
    }

    /// `/Info` entry, either a reference or an inline dictionary
    pub fn info(&self) -> Option<&Object> {
        self.trailer.get(b"Info").ok()
    }

    pub fn uses_stream(&self) -> bool {
        self.kind == XrefKind::Stream || self.hybrid
    }
}

fn describe_value(value: &Object) -> String {
    match value {
        Object::Integer(i) => i.to_string(),
        Object::Real(r) => r.to_string(),
        Object::Reference((id, generation)) => format!("{id} {generation} R"),
        other => format!("{:?}", other),
    }
}

fn non_negative(dict: &Dictionary, key: &[u8]) -> Option<u64> {
    dict.get(key)
        .and_then(Object::as_i64)
        .ok()
        .and_then(|v| u64::try_from(v).ok())
}

/// Parse whichever kind of xref section starts at `offset`
pub fn parse_section_at(bytes: &[u8], offset: u64, options: &ScanOptions) -> Result<XrefSection> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&o| o < bytes.len())
        .ok_or_else(|| Error::Syntax {
            offset,
            message: format!("xref offset is outside the file ({} bytes)", bytes.len()),
        })?;

    let mut lexer = Lexer::new(bytes, start);
    lexer.skip_whitespace();
    let at = lexer.position();

    if lexer.at_keyword(b"xref") {
        let (entries, trailer) = xref_table::parse_table(bytes, at, options)?;
        let mut section = XrefSection {
            offset,
            kind: XrefKind::Table,
            entries,
            trailer,
            hybrid: false,
        };
        merge_xref_stm(bytes, &mut section, options);
        debug!(offset, entries = section.entries.len(), "parsed xref table");
        return Ok(section);
    }

    if bytes.get(at).is_some_and(u8::is_ascii_digit) {
        let (entries, trailer) = xref_stream::parse_stream(bytes, at, options)?;
        debug!(offset, entries = entries.len(), "parsed xref stream");
        return Ok(XrefSection {
            offset,
            kind: XrefKind::Stream,
            entries,
            trailer,
            hybrid: false,
        });
    }

    Err(Error::syntax(at, "no xref table or xref stream at offset"))
}

/// Hybrid-reference files keep objects from object streams in an
/// `/XRefStm` that only newer readers consult. Its entries fill ids the
/// table leaves absent or free.
fn merge_xref_stm(bytes: &[u8], section: &mut XrefSection, options: &ScanOptions) {
    let Some(stm_offset) = non_negative(&section.trailer, b"XRefStm") else {
        return;
    };
    let parsed = usize::try_from(stm_offset)
        .ok()
        .filter(|&o| o < bytes.len())
        .ok_or_else(|| Error::Syntax {
            offset: stm_offset,
            message: "/XRefStm is outside the file".to_string(),
        })
        .and_then(|at| xref_stream::parse_stream(bytes, at, options));

    match parsed {
        Ok((stream_entries, _)) => {
            let mut by_id: HashMap<u32, usize> = section
                .entries
                .iter()
                .enumerate()
                .map(|(i, e)| (e.id, i))
                .collect();
            for entry in stream_entries {
                match by_id.get(&entry.id) {
                    Some(&i) if section.entries[i].is_free() && entry.is_in_use() => {
                        section.entries[i] = entry;
                    }
                    Some(_) => {}
                    None => {
                        by_id.insert(entry.id, section.entries.len());
                        section.entries.push(entry);
                    }
                }
            }
            section.hybrid = true;
        }
        Err(e) => {
            warn!(offset = section.offset, xref_stm = stm_offset, "ignoring unreadable /XRefStm: {}", e);
        }
    }
}
