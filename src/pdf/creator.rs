//! Creator information from the document Info dictionary

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use lopdf::{Dictionary, Object};
use tracing::{debug, warn};

use crate::pdf::document::Revision;
use crate::pdf::object::read_dictionary;
use crate::pdf::xref::{Entry, EntryKind};

/// Info dictionary keys shown as creator information
pub const CREATOR_KEYS: [&str; 9] = [
    "Title",
    "Author",
    "Subject",
    "Keywords",
    "Creator",
    "Producer",
    "CreationDate",
    "ModDate",
    "Trapped",
];

/// One decoded Info dictionary value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatorField {
    pub key: String,
    pub value: String,
}

impl CreatorField {
    /// Parsed value of `CreationDate` / `ModDate`
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        match self.key.as_str() {
            "CreationDate" | "ModDate" => parse_pdf_date(&self.value),
            _ => None,
        }
    }
}

/// Read the revision's Info dictionary through the object table a reader
/// sees at that revision
pub(crate) fn resolve_creator(data: &[u8], rev: &Revision, table: &BTreeMap<u32, Entry>) -> Vec<CreatorField> {
    let Ok(info) = rev.trailer().get(b"Info") else {
        return Vec::new();
    };
    match info {
        Object::Dictionary(dict) => fields(dict),
        Object::Reference((id, generation)) => {
            let Some(entry) = table.get(id) else {
                warn!(version = rev.version, object = id, "/Info object is not in the xref table");
                return Vec::new();
            };
            match entry.kind {
                EntryKind::Compressed { .. } => {
                    warn!(
                        version = rev.version,
                        object = id,
                        "/Info object is stored in an object stream, omitting creator information"
                    );
                    Vec::new()
                }
                EntryKind::Free => {
                    warn!(version = rev.version, object = id, "/Info object is free");
                    Vec::new()
                }
                EntryKind::InUse if entry.generation != u32::from(*generation) => {
                    warn!(version = rev.version, object = id, "/Info reference has a stale generation");
                    Vec::new()
                }
                EntryKind::InUse => match read_dictionary(data, entry) {
                    Ok(dict) => fields(&dict),
                    Err(e) => {
                        warn!(version = rev.version, object = id, "unreadable /Info dictionary: {}", e);
                        Vec::new()
                    }
                },
            }
        }
        _ => {
            warn!(version = rev.version, "/Info is neither a reference nor a dictionary");
            Vec::new()
        }
    }
}

fn fields(dict: &Dictionary) -> Vec<CreatorField> {
    CREATOR_KEYS
        .iter()
        .filter_map(|&key| {
            let value = match dict.get(key.as_bytes()).ok()? {
                Object::String(bytes, _) => decode_text(bytes),
                Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
                _ => return None,
            };
            if looks_like_xml(&value) {
                debug!(key, "dropping XML creator value");
                return None;
            }
            Some(CreatorField {
                key: key.to_string(),
                value,
            })
        })
        .collect()
}

/// Decode a PDF text string: UTF-16BE or UTF-8 with a byte order mark,
/// otherwise one byte per character
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn looks_like_xml(value: &str) -> bool {
    let trimmed = value.trim_start();
    trimmed.starts_with("<?xml") || trimmed.starts_with("<x:xmpmeta") || value.contains("<rdf:RDF")
}

/// Parse a PDF date string `D:YYYYMMDDHHmmSSOHH'mm'`
///
/// Everything after the year is optional. A missing offset means UTC.
pub fn parse_pdf_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    let value = value.strip_prefix("D:").unwrap_or(value);
    let digits_len = value.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len < 4 {
        return None;
    }
    let digits = &value[..digits_len.min(14)];
    let part = |at: usize, default: u32| -> Option<u32> {
        match digits.get(at..at + 2) {
            Some(two) => two.parse().ok(),
            None => Some(default),
        }
    };

    let year: i32 = digits[..4].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, part(4, 1)?, part(6, 1)?)?;
    let time = date.and_hms_opt(part(8, 0)?, part(10, 0)?, part(12, 0)?)?;

    let zone = &value[digits_len..];
    let seconds = match zone.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let tz: String = zone[1..].chars().filter(char::is_ascii_digit).collect();
            let hours: i32 = tz.get(..2).and_then(|h| h.parse().ok()).unwrap_or(0);
            let minutes: i32 = tz.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let total = hours * 3600 + minutes * 60;
            if sign == '-' {
                -total
            } else {
                total
            }
        }
        _ => 0,
    };
    FixedOffset::east_opt(seconds)?.from_local_datetime(&time).single()
}
