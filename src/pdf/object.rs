//! Locating indirect object bodies by xref entry

use std::ops::Range;

use lopdf::{Dictionary, Object};
use memchr::memmem;

use crate::error::{Error, Result};
use crate::pdf::lexer::Lexer;
use crate::pdf::xref::{Entry, EntryKind};

/// Byte range between an object's `obj` keyword and its `endobj`
///
/// The `<id> <gen> obj` header at the entry's offset must match the entry;
/// otherwise the offset is stale and nothing is returned.
pub fn body_range(bytes: &[u8], entry: &Entry) -> Result<Range<usize>> {
    let mut lexer = header_at(bytes, entry)?;
    let body_start = lexer.position();
    let body_end = structured_end(bytes, &mut lexer)
        .or_else(|| memmem::find(&bytes[body_start..], b"endobj").map(|n| body_start + n))
        .ok_or_else(|| Error::syntax(body_start, format!("object {} has no 'endobj'", entry.id)))?;
    Ok(body_start..body_end)
}

/// The object's value, when it is a dictionary or a stream
pub fn read_dictionary(bytes: &[u8], entry: &Entry) -> Result<Dictionary> {
    let mut lexer = header_at(bytes, entry)?;
    let at = lexer.position();
    match lexer.parse_object()? {
        Object::Dictionary(dict) => Ok(dict),
        _ => Err(Error::syntax(at, format!("object {} is not a dictionary", entry.id))),
    }
}

/// `/Type` name of the object's dictionary
pub fn object_type(bytes: &[u8], entry: &Entry) -> Option<String> {
    let dict = read_dictionary(bytes, entry).ok()?;
    let name = dict.get(b"Type").and_then(Object::as_name).ok()?;
    Some(String::from_utf8_lossy(name).into_owned())
}

fn header_at<'a>(bytes: &'a [u8], entry: &Entry) -> Result<Lexer<'a>> {
    if entry.kind != EntryKind::InUse {
        return Err(Error::General(format!(
            "object {} has no byte offset of its own ({})",
            entry.id,
            entry.flag()
        )));
    }
    let start = usize::try_from(entry.offset)
        .ok()
        .filter(|&o| o < bytes.len())
        .ok_or_else(|| Error::Syntax {
            offset: entry.offset,
            message: format!("object {} offset is outside the file", entry.id),
        })?;

    let mut lexer = Lexer::new(bytes, start);
    let (id, generation) = lexer.parse_indirect_header()?;
    if id != entry.id || generation != entry.generation {
        return Err(Error::syntax(
            start,
            format!(
                "expected object {} {} but found {} {}",
                entry.id, entry.generation, id, generation
            ),
        ));
    }
    Ok(lexer)
}

/// Walk value, optional stream data and land on `endobj`
fn structured_end(bytes: &[u8], lexer: &mut Lexer<'_>) -> Option<usize> {
    let value = lexer.parse_object().ok()?;
    if lexer.consume_keyword(b"stream") {
        let dict = value.as_dict().ok()?;
        let mut data_start = lexer.position();
        if bytes.get(data_start) == Some(&b'\r') {
            data_start += 1;
        }
        if bytes.get(data_start) == Some(&b'\n') {
            data_start += 1;
        }

        let declared_end = dict
            .get(b"Length")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .and_then(|n| data_start.checked_add(n))
            .filter(|&end| end <= bytes.len());
        let data_end = match declared_end {
            Some(end) if Lexer::new(bytes, end).consume_keyword(b"endstream") => end,
            _ => data_start + memmem::find(&bytes[data_start..], b"endstream")?,
        };
        lexer.set_position(data_end);
        if !lexer.consume_keyword(b"endstream") {
            return None;
        }
    }
    lexer.skip_whitespace();
    lexer.at_keyword(b"endobj").then(|| lexer.position())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_body() {
        let data = b"%PDF-1.4\n4 0 obj\n<< /Type /Page >>\nendobj\n";
        let entry = Entry::in_use(4, 9, 0);
        let range = body_range(data, &entry).unwrap();
        assert_eq!(&data[range], b"\n<< /Type /Page >>\n");
        assert_eq!(object_type(data, &entry).as_deref(), Some("Page"));
    }

    #[test]
    fn test_stream_containing_endobj_text() {
        let data = b"5 0 obj\n<< /Length 12 >>\nstream\nendobj fake\nendstream\nendobj\n";
        let range = body_range(data, &Entry::in_use(5, 0, 0)).unwrap();
        assert!(data[range.clone()].ends_with(b"endstream\n"));
        assert_eq!(&data[range.end..range.end + 6], b"endobj");
    }

    #[test]
    fn test_header_mismatch_is_rejected() {
        let data = b"6 0 obj\n(text)\nendobj\n";
        assert!(body_range(data, &Entry::in_use(7, 0, 0)).is_err());
        assert!(body_range(data, &Entry::in_use(6, 0, 2)).is_err());
        assert!(body_range(data, &Entry::in_use(6, 0, 0)).is_ok());
    }

    #[test]
    fn test_compressed_entry_has_no_range() {
        assert!(body_range(b"1 0 obj 1 endobj", &Entry::compressed(1, 0, 0)).is_err());
    }

    #[test]
    fn test_unparseable_body_falls_back_to_search() {
        let data = b"8 0 obj\n<< /Broken ) >>\nendobj\n";
        let range = body_range(data, &Entry::in_use(8, 0, 0)).unwrap();
        assert_eq!(&data[range.end..range.end + 6], b"endobj");
        assert_eq!(object_type(data, &Entry::in_use(8, 0, 0)), None);
    }
}
