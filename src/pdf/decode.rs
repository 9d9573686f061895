//! Bounded stream filter decoding for xref streams
//!
//! Every filter writes into a buffer capped at `max_out` bytes. Crossing the
//! cap is an error, not a truncation: a partial xref stream would silently
//! drop entries.

use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Object};
use tracing::{debug, warn};

type DecodeResult = std::result::Result<Vec<u8>, String>;

/// Upper bound for `/Columns`, `/Colors` and `/BitsPerComponent`
const MAX_DECODE_PARM: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DecodeParms {
    predictor: u32,
    colors: u32,
    bits_per_component: u32,
    columns: u32,
}

impl Default for DecodeParms {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

/// Run the `/Filter` chain of `dict` over `raw`, never producing more than `max_out` bytes
pub(crate) fn decode_stream(raw: &[u8], dict: &Dictionary, max_out: usize) -> DecodeResult {
    let filters = stream_filters(dict)?;
    let parms = decode_parms(dict, filters.len())?;

    let mut data = raw.to_vec();
    for (filter, parms) in filters.iter().zip(parms) {
        data = match filter.as_slice() {
            b"FlateDecode" | b"Fl" => {
                let inflated = inflate(&data, max_out)?;
                match parms {
                    Some(parms) if parms.predictor > 1 => unpredict(&inflated, parms)?,
                    _ => inflated,
                }
            }
            b"ASCIIHexDecode" | b"AHx" => ascii_hex(&data, max_out)?,
            b"ASCII85Decode" | b"A85" => ascii85(&data, max_out)?,
            b"RunLengthDecode" | b"RL" => run_length(&data, max_out)?,
            other => {
                return Err(format!(
                    "unsupported xref stream filter /{}",
                    String::from_utf8_lossy(other)
                ))
            }
        };
    }
    Ok(data)
}

fn over_limit() -> String {
    "decoded xref stream is over the size limit".to_string()
}

/// `/Filter` as a list of names, accepting a single name or an array
fn stream_filters(dict: &Dictionary) -> std::result::Result<Vec<Vec<u8>>, String> {
    match dict.get(b"Filter") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Name(name)) => Ok(vec![name.clone()]),
        Ok(Object::Array(array)) => array
            .iter()
            .map(|value| {
                value
                    .as_name()
                    .map(<[u8]>::to_vec)
                    .map_err(|_| format!("/Filter element {:?} is not a name", value))
            })
            .collect(),
        Ok(other) => Err(format!("/Filter {:?} is neither a name nor an array", other)),
    }
}

/// `/DecodeParms` aligned with the filter list; `null` slots mean defaults
fn decode_parms(dict: &Dictionary, filters: usize) -> std::result::Result<Vec<Option<DecodeParms>>, String> {
    let mut out = vec![None; filters];
    match dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(parms)) => {
            if let Some(slot) = out.first_mut() {
                *slot = Some(parms_from_dict(parms)?);
            }
        }
        Ok(Object::Array(array)) => {
            for (slot, value) in out.iter_mut().zip(array) {
                if let Object::Dictionary(parms) = value {
                    *slot = Some(parms_from_dict(parms)?);
                }
            }
        }
        _ => {}
    }
    Ok(out)
}

fn parms_from_dict(dict: &Dictionary) -> std::result::Result<DecodeParms, String> {
    let defaults = DecodeParms::default();
    let read = |key: &[u8], default: u32| -> std::result::Result<u32, String> {
        match dict.get(key) {
            Err(_) => Ok(default),
            Ok(value) => value
                .as_i64()
                .ok()
                .and_then(|v| u32::try_from(v).ok())
                .filter(|&v| v <= MAX_DECODE_PARM)
                .ok_or_else(|| format!("/DecodeParms /{} is out of range", String::from_utf8_lossy(key))),
        }
    };
    Ok(DecodeParms {
        predictor: read(b"Predictor", defaults.predictor)?,
        colors: read(b"Colors", defaults.colors)?,
        bits_per_component: read(b"BitsPerComponent", defaults.bits_per_component)?,
        columns: read(b"Columns", defaults.columns)?,
    })
}

fn inflate(data: &[u8], max_out: usize) -> DecodeResult {
    let cap = u64::try_from(max_out).unwrap_or(u64::MAX).saturating_add(1);
    let mut out = Vec::new();
    if let Err(e) = ZlibDecoder::new(data).take(cap).read_to_end(&mut out) {
        if out.is_empty() {
            return Err(format!("FlateDecode failed: {e}"));
        }
        warn!(decoded = out.len(), "FlateDecode stopped early ({}), keeping the decoded prefix", e);
    }
    if out.len() > max_out {
        return Err(over_limit());
    }
    Ok(out)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn ascii_hex(data: &[u8], max_out: usize) -> DecodeResult {
    let mut out = Vec::new();
    let mut high: Option<u8> = None;
    for &b in data {
        if b == b'>' {
            break;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        let nibble = hex_value(b).ok_or_else(|| format!("invalid ASCIIHex digit 0x{b:02x}"))?;
        match high.take() {
            None => high = Some(nibble),
            Some(h) => {
                if out.len() == max_out {
                    return Err(over_limit());
                }
                out.push(h << 4 | nibble);
            }
        }
    }
    // an odd final digit is padded with 0
    if let Some(h) = high {
        if out.len() == max_out {
            return Err(over_limit());
        }
        out.push(h << 4);
    }
    Ok(out)
}

fn ascii85(data: &[u8], max_out: usize) -> DecodeResult {
    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut filled = 0usize;
    let mut bytes = data.iter().copied().peekable();

    while let Some(b) = bytes.next() {
        match b {
            b'~' if bytes.peek() == Some(&b'>') => break,
            _ if b.is_ascii_whitespace() => continue,
            b'z' if filled == 0 => {
                if out.len() + 4 > max_out {
                    return Err(over_limit());
                }
                out.extend_from_slice(&[0; 4]);
            }
            b'!'..=b'u' => {
                group[filled] = b - b'!';
                filled += 1;
                if filled == 5 {
                    if out.len() + 4 > max_out {
                        return Err(over_limit());
                    }
                    out.extend_from_slice(&base85_word(&group)?);
                    filled = 0;
                }
            }
            other => return Err(format!("invalid ASCII85 character 0x{other:02x}")),
        }
    }

    if filled == 1 {
        return Err("ASCII85 data ends with a lone character".to_string());
    }
    if filled > 1 {
        // pad with 'u' and keep filled - 1 bytes
        group[filled..].fill(b'u' - b'!');
        let word = base85_word(&group)?;
        if out.len() + filled - 1 > max_out {
            return Err(over_limit());
        }
        out.extend_from_slice(&word[..filled - 1]);
    }
    Ok(out)
}

fn base85_word(group: &[u8; 5]) -> std::result::Result<[u8; 4], String> {
    let value = group.iter().fold(0u64, |acc, &digit| acc * 85 + u64::from(digit));
    u32::try_from(value)
        .map(u32::to_be_bytes)
        .map_err(|_| "ASCII85 group is out of range".to_string())
}

fn run_length(data: &[u8], max_out: usize) -> DecodeResult {
    let mut out = Vec::new();
    let mut i = 0usize;
    while let Some(&length) = data.get(i) {
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = usize::from(length) + 1;
                let literal = data
                    .get(i..i + count)
                    .ok_or_else(|| "RunLength literal runs past the end of the data".to_string())?;
                if out.len() + count > max_out {
                    return Err(over_limit());
                }
                out.extend_from_slice(literal);
                i += count;
            }
            _ => {
                let count = 257 - usize::from(length);
                let &b = data
                    .get(i)
                    .ok_or_else(|| "RunLength repeat has no byte to repeat".to_string())?;
                if out.len() + count > max_out {
                    return Err(over_limit());
                }
                out.resize(out.len() + count, b);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Undo a TIFF (2) or PNG (10..=15) predictor
fn unpredict(data: &[u8], parms: DecodeParms) -> DecodeResult {
    let bits_per_pixel = parms
        .colors
        .checked_mul(parms.bits_per_component)
        .ok_or_else(|| "decode parameters overflow".to_string())?;
    let bytes_per_pixel = usize::try_from(bits_per_pixel.div_ceil(8)).map_err(|e| e.to_string())?.max(1);
    let row_len = u64::from(parms.columns)
        .checked_mul(u64::from(bits_per_pixel))
        .map(|bits| bits.div_ceil(8))
        .and_then(|len| usize::try_from(len).ok())
        .filter(|&len| len > 0)
        .ok_or_else(|| "decode parameters give an empty or oversized row".to_string())?;

    match parms.predictor {
        2 if parms.bits_per_component == 8 => Ok(tiff_rows(data, row_len, bytes_per_pixel)),
        2 => Err(format!(
            "TIFF predictor with {} bits per component is not supported",
            parms.bits_per_component
        )),
        10..=15 => png_rows(data, row_len, bytes_per_pixel),
        other => Err(format!("unknown predictor {other}")),
    }
}

fn tiff_rows(data: &[u8], row_len: usize, bpp: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    out
}

fn png_rows(data: &[u8], row_len: usize, bpp: usize) -> DecodeResult {
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    let mut rows = data.chunks_exact(row_len + 1);

    for chunk in rows.by_ref() {
        let (tag, encoded) = (chunk[0], &chunk[1..]);
        let mut row = encoded.to_vec();
        for j in 0..row_len {
            let left = if j >= bpp { row[j - bpp] } else { 0 };
            let up = prev[j];
            let up_left = if j >= bpp { prev[j - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => return Err(format!("invalid PNG predictor row tag {other}")),
            };
            row[j] = row[j].wrapping_add(predicted);
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    if !rows.remainder().is_empty() {
        debug!(trailing = rows.remainder().len(), "dropping incomplete PNG predictor row");
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (ia, ib, ic) = (i16::from(a), i16::from(b), i16::from(c));
    let p = ia + ib - ic;
    let (pa, pb, pc) = ((p - ia).abs(), (p - ib).abs(), (p - ic).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
