//! Byte-level scanning for revision boundaries
//!
//! Every incremental save ends with `startxref <offset> %%EOF`. The scanner
//! finds each `%%EOF`, then reads backward to the `startxref` that announces
//! the xref section for that save.

use memchr::memmem;
use tracing::{debug, warn};

use crate::pdf::lexer::{is_whitespace, Lexer};

/// End-of-file marker closing each revision
pub const EOF_MARKER: &[u8] = b"%%EOF";

const STARTXREF: &[u8] = b"startxref";
const HEADER: &[u8] = b"%PDF-";

/// Readers accept a header anywhere in the first kilobyte
const HEADER_WINDOW: usize = 1024;

/// How far back from a marker we look for its `startxref`
const STARTXREF_WINDOW: usize = 1024;

/// One occurrence of `%%EOF` in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofMarker {
    /// Offset of the `%` starting the marker
    pub position: u64,
    /// Offset immediately following the marker
    pub end: u64,
    /// Offset announced by the `startxref` directly before this marker,
    /// `None` when the marker is not preceded by a well-formed `startxref`
    pub startxref: Option<u64>,
}

impl EofMarker {
    /// Whether this marker can serve as a chain entry point
    pub fn is_trusted(&self) -> bool {
        self.startxref.is_some()
    }
}

/// Offset of the `%PDF-` header, if it appears within the first kilobyte
pub fn header_offset(bytes: &[u8]) -> Option<usize> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    memmem::find(window, HEADER)
}

/// Whether the data carries a PDF header
pub fn is_pdf(bytes: &[u8]) -> bool {
    pdf_version(bytes).is_some()
}

/// Declared `(major, minor)` version from the `%PDF-M.m` header
pub fn pdf_version(bytes: &[u8]) -> Option<(u8, u8)> {
    let start = header_offset(bytes)? + HEADER.len();
    let rest = bytes.get(start..)?;
    let major_len = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if major_len == 0 || rest.get(major_len) != Some(&b'.') {
        return None;
    }
    let minor = &rest[major_len + 1..];
    let minor_len = minor.iter().take_while(|b| b.is_ascii_digit()).count();
    if minor_len == 0 {
        return None;
    }
    let major = std::str::from_utf8(&rest[..major_len]).ok()?.parse().ok()?;
    let minor = std::str::from_utf8(&minor[..minor_len]).ok()?.parse().ok()?;
    Some((major, minor))
}

/// Offsets immediately following every `%%EOF`, in file order
pub fn eof_offsets(bytes: &[u8]) -> Vec<u64> {
    memmem::find_iter(bytes, EOF_MARKER)
        .map(|pos| (pos + EOF_MARKER.len()) as u64)
        .collect()
}

/// Every `%%EOF` in file order, each paired with its `startxref` when trustworthy
///
/// Markers that show up inside binary stream data have no `startxref`
/// right before them; they are logged and reported untrusted.
pub fn find_eof_markers(bytes: &[u8]) -> Vec<EofMarker> {
    memmem::find_iter(bytes, EOF_MARKER)
        .map(|pos| {
            let startxref = startxref_before(bytes, pos);
            if startxref.is_none() {
                warn!(offset = pos, "'%%EOF' marker without a preceding startxref, ignoring it");
            } else {
                debug!(offset = pos, startxref = ?startxref, "found '%%EOF' marker");
            }
            EofMarker {
                position: pos as u64,
                end: (pos + EOF_MARKER.len()) as u64,
                startxref,
            }
        })
        .collect()
}

/// Read backward from `marker` to the nearest `startxref` and parse its offset
///
/// Only whitespace may sit between the offset and the marker.
pub fn startxref_before(bytes: &[u8], marker: usize) -> Option<u64> {
    let marker = marker.min(bytes.len());
    let window_start = marker.saturating_sub(STARTXREF_WINDOW);
    let keyword = window_start + memmem::rfind(&bytes[window_start..marker], STARTXREF)?;

    let mut pos = keyword + STARTXREF.len();
    while pos < marker && is_whitespace(bytes[pos]) {
        pos += 1;
    }
    let digits_start = pos;
    while pos < marker && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if digits_start == pos || !bytes[pos..marker].iter().all(|&b| is_whitespace(b)) {
        return None;
    }
    std::str::from_utf8(&bytes[digits_start..pos]).ok()?.parse().ok()
}

/// Whether the first object after the header is a linearization dictionary
pub fn is_linearized(bytes: &[u8]) -> bool {
    let Some(header) = header_offset(bytes) else {
        return false;
    };
    // the header is a comment line; the lexer skips it and any binary comment
    let mut lexer = Lexer::new(bytes, header);
    lexer.skip_whitespace();
    if lexer.parse_indirect_header().is_err() {
        return false;
    }
    match lexer.parse_object() {
        Ok(obj) => obj
            .as_dict()
            .map(|dict| dict.has(b"Linearized"))
            .unwrap_or(false),
        Err(_) => false,
    }
}
