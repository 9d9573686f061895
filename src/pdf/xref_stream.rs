//! PDF 1.5 cross-reference stream parsing
//!
//! The stream packs one binary record per object. `/W [t f2 f3]` gives the
//! byte width of each field and `/Index [first count ...]` the id ranges
//! covered. Field values are big-endian.

use lopdf::{Dictionary, Object};
use memchr::memmem;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::options::ScanOptions;
use crate::pdf::decode::decode_stream;
use crate::pdf::lexer::Lexer;
use crate::pdf::xref::Entry;

/// Fields wider than this cannot hold a 64-bit value
const MAX_FIELD_WIDTH: usize = 8;

/// Parse the xref stream object whose header starts at `at`
///
/// Returns the entries and the stream dictionary, which doubles as the trailer.
pub(crate) fn parse_stream(bytes: &[u8], at: usize, options: &ScanOptions) -> Result<(Vec<Entry>, Dictionary)> {
    let mut lexer = Lexer::new(bytes, at);
    let (id, _) = lexer.parse_indirect_header()?;

    let dict = match lexer.parse_object()? {
        Object::Dictionary(dict) => dict,
        _ => return Err(Error::syntax(at, format!("object {id} is not a stream dictionary"))),
    };
    if dict.get(b"Type").and_then(Object::as_name).ok() != Some(b"XRef".as_slice()) {
        return Err(Error::syntax(at, format!("object {id} is not a /Type /XRef stream")));
    }

    let widths = field_widths(&dict).map_err(|message| Error::syntax(at, message))?;
    let index = subsections(&dict).map_err(|message| Error::syntax(at, message))?;

    let declared = index
        .iter()
        .try_fold(0u64, |total, &(_, count)| total.checked_add(count))
        .ok_or_else(|| Error::syntax(at, "/Index counts overflow"))?;
    if declared > options.max_entries_per_section as u64 {
        return Err(Error::syntax(at, format!("xref stream declares {declared} entries, over the limit")));
    }

    let raw = stream_data(bytes, &mut lexer, &dict)?;
    let data = if dict.has(b"Filter") {
        decode_stream(raw, &dict, options.max_stream_bytes).map_err(|message| Error::syntax(at, message))?
    } else {
        raw.to_vec()
    };

    Ok((decode_records(&data, widths, &index, at), dict))
}

/// `/W`: exactly three non-negative widths, none wider than 8 bytes
fn field_widths(dict: &Dictionary) -> std::result::Result<[usize; 3], String> {
    let array = dict
        .get(b"W")
        .and_then(Object::as_array)
        .map_err(|_| "xref stream has no /W array".to_string())?;
    if array.len() != 3 {
        return Err(format!("/W has {} elements, expected 3", array.len()));
    }
    let mut widths = [0usize; 3];
    for (slot, value) in widths.iter_mut().zip(array) {
        let width = value
            .as_i64()
            .ok()
            .and_then(|w| usize::try_from(w).ok())
            .filter(|&w| w <= MAX_FIELD_WIDTH)
            .ok_or_else(|| format!("invalid /W element {:?}", value))?;
        *slot = width;
    }
    if widths.iter().sum::<usize>() == 0 {
        return Err("/W widths are all zero".to_string());
    }
    Ok(widths)
}

/// `/Index` pairs, defaulting to `[0 /Size]`
fn subsections(dict: &Dictionary) -> std::result::Result<Vec<(u64, u64)>, String> {
    let Ok(index) = dict.get(b"Index") else {
        let size = dict
            .get(b"Size")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|s| u64::try_from(s).ok())
            .ok_or_else(|| "xref stream has neither /Index nor /Size".to_string())?;
        return Ok(vec![(0, size)]);
    };
    let array = index.as_array().map_err(|_| "/Index is not an array".to_string())?;
    if array.len() % 2 != 0 {
        return Err(format!("/Index has odd length {}", array.len()));
    }
    array
        .chunks(2)
        .map(|pair| {
            let first = pair[0].as_i64().ok().and_then(|v| u64::try_from(v).ok());
            let count = pair[1].as_i64().ok().and_then(|v| u64::try_from(v).ok());
            match (first, count) {
                (Some(first), Some(count)) => Ok((first, count)),
                _ => Err("/Index holds a non-integer or negative value".to_string()),
            }
        })
        .collect()
}

/// Raw bytes between `stream` and `endstream`
fn stream_data<'a>(bytes: &'a [u8], lexer: &mut Lexer<'_>, dict: &Dictionary) -> Result<&'a [u8]> {
    if !lexer.consume_keyword(b"stream") {
        return Err(Error::syntax(lexer.position(), "expected 'stream' after xref stream dictionary"));
    }
    let mut start = lexer.position();
    if bytes.get(start) == Some(&b'\r') {
        start += 1;
    }
    if bytes.get(start) == Some(&b'\n') {
        start += 1;
    }

    let declared = dict
        .get(b"Length")
        .and_then(Object::as_i64)
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .and_then(|n| start.checked_add(n))
        .filter(|&end| end <= bytes.len());
    if let Some(end) = declared {
        let mut after = Lexer::new(bytes, end);
        if after.consume_keyword(b"endstream") {
            return Ok(&bytes[start..end]);
        }
        debug!(offset = start, "xref stream /Length does not reach 'endstream', searching instead");
    }

    let found = memmem::find(&bytes[start..], b"endstream")
        .ok_or_else(|| Error::syntax(start, "xref stream has no 'endstream'"))?;
    let mut end = start + found;
    // drop the EOL that precedes endstream
    if end > start && bytes[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && bytes[end - 1] == b'\r' {
        end -= 1;
    }
    Ok(&bytes[start..end])
}

fn read_field(record: &[u8]) -> u64 {
    record.iter().fold(0u64, |acc, &b| acc << 8 | u64::from(b))
}

fn decode_records(data: &[u8], widths: [usize; 3], index: &[(u64, u64)], at: usize) -> Vec<Entry> {
    let record_len: usize = widths.iter().sum();
    let mut records = data.chunks_exact(record_len);
    let mut entries = Vec::new();

    'subsections: for &(first, count) in index {
        for i in 0..count {
            let Some(record) = records.next() else {
                warn!(offset = at, "xref stream data ends before /Index is exhausted");
                break 'subsections;
            };
            let Some(id) = first.checked_add(i).and_then(|id| u32::try_from(id).ok()) else {
                warn!(offset = at, "xref stream object id out of range");
                break 'subsections;
            };

            let (t, rest) = record.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // a zero-width type field defaults to 1
            let kind = if widths[0] == 0 { 1 } else { read_field(t) };
            let (f2, f3) = (read_field(f2), read_field(f3));

            let entry = match kind {
                0 => u32::try_from(f3).ok().map(|generation| Entry::free(id, f2, generation)),
                1 => u32::try_from(f3).ok().map(|generation| Entry::in_use(id, f2, generation)),
                2 => match (u32::try_from(f2), u32::try_from(f3)) {
                    (Ok(container), Ok(index)) => Some(Entry::compressed(id, container, index)),
                    _ => None,
                },
                other => {
                    debug!(offset = at, object = id, "ignoring xref stream record of type {}", other);
                    continue;
                }
            };
            match entry {
                Some(entry) => entries.push(entry),
                None => warn!(offset = at, object = id, "xref stream record field out of range, dropping it"),
            }
        }
    }
    entries
}
