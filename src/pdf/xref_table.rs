//! Plain-text `xref` table parsing
//!
//! ```text
//! xref
//! 0 3
//! 0000000000 65535 f\r\n
//! 0000000017 00000 n\r\n
//! 0000000081 00000 n\r\n
//! trailer
//! << /Size 3 /Root 1 0 R >>
//! ```

use lopdf::{Dictionary, Object};
use tracing::warn;

use crate::error::{Error, Result};
use crate::options::ScanOptions;
use crate::pdf::lexer::Lexer;
use crate::pdf::xref::Entry;

const OFFSET_DIGITS: usize = 10;
const GENERATION_DIGITS: usize = 5;

/// What a single line inside a subsection turned out to be
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Entry { offset: u64, generation: u32, in_use: bool },
    /// `<first> <count>`: the declared count was too large
    SubsectionHeader,
    Trailer,
    Malformed,
}

/// Parse the table starting at the `xref` keyword at `at`, plus its trailer
pub(crate) fn parse_table(bytes: &[u8], at: usize, options: &ScanOptions) -> Result<(Vec<Entry>, Dictionary)> {
    let mut lexer = Lexer::new(bytes, at);
    if !lexer.consume_keyword(b"xref") {
        return Err(Error::syntax(at, "expected 'xref'"));
    }

    let mut entries = Vec::new();
    loop {
        lexer.skip_whitespace();
        if lexer.at_end() {
            return Err(Error::syntax(lexer.position(), "xref table has no trailer"));
        }
        if lexer.at_keyword(b"trailer") {
            break;
        }

        let header_at = lexer.position();
        let (Some(first), Some(count)) = (lexer.read_unsigned(), lexer.read_unsigned()) else {
            return Err(Error::syntax(header_at, "malformed xref subsection header"));
        };
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        if count > options.max_entries_per_section.saturating_sub(entries.len()) {
            return Err(Error::syntax(
                header_at,
                format!("xref subsection declares {count} entries, over the limit"),
            ));
        }

        let mut pos = lexer.position();
        for i in 0..count {
            while pos < bytes.len() && matches!(bytes[pos], b'\r' | b'\n' | b' ' | b'\t') {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }
            let line_end = memchr::memchr2(b'\r', b'\n', &bytes[pos..]).map_or(bytes.len(), |n| pos + n);
            let id = u64::from(u32::try_from(first).unwrap_or(u32::MAX)) + i as u64;

            match classify_line(&bytes[pos..line_end]) {
                Line::Entry { offset, generation, in_use } => match u32::try_from(id) {
                    Ok(id) if in_use => entries.push(Entry::in_use(id, offset, generation)),
                    Ok(id) => entries.push(Entry::free(id, offset, generation)),
                    Err(_) => warn!(offset = pos, "xref entry id {} out of range, dropping it", id),
                },
                Line::Malformed => {
                    warn!(offset = pos, object = id, "malformed xref entry line, dropping it");
                }
                Line::SubsectionHeader | Line::Trailer => {
                    warn!(
                        offset = header_at,
                        declared = count,
                        found = i,
                        "xref subsection is shorter than declared"
                    );
                    break;
                }
            }
            pos = line_end;
        }
        lexer.set_position(pos);
    }

    let trailer_at = lexer.position();
    lexer.consume_keyword(b"trailer");
    match lexer.parse_object()? {
        Object::Dictionary(dict) => Ok((entries, dict)),
        _ => Err(Error::syntax(trailer_at, "trailer is not a dictionary")),
    }
}

/// Validate one fixed-width entry line: 10-digit offset, 5-digit generation, flag
fn classify_line(line: &[u8]) -> Line {
    if line.starts_with(b"trailer") {
        return Line::Trailer;
    }
    let fields: Vec<&[u8]> = line
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|f| !f.is_empty())
        .collect();
    match fields.as_slice() {
        [offset, generation, flag]
            if offset.len() == OFFSET_DIGITS
                && generation.len() == GENERATION_DIGITS
                && all_digits(offset)
                && all_digits(generation) =>
        {
            let in_use = match (flag.len(), flag.first()) {
                (1, Some(b'n')) => true,
                (1, Some(b'f')) => false,
                _ => return Line::Malformed,
            };
            match (parse_digits(offset), parse_digits(generation)) {
                (Some(offset), Some(generation)) => Line::Entry {
                    offset,
                    generation: generation as u32,
                    in_use,
                },
                _ => Line::Malformed,
            }
        }
        [first, count] if all_digits(first) && all_digits(count) => Line::SubsectionHeader,
        _ => Line::Malformed,
    }
}

fn all_digits(field: &[u8]) -> bool {
    !field.is_empty() && field.iter().all(u8::is_ascii_digit)
}

fn parse_digits(digits: &[u8]) -> Option<u64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}
