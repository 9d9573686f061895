//! Minimal PDF object lexer
//!
//! Only what the history engine needs: trailer and xref stream
//! dictionaries, indirect object headers, and the small Info dictionary.
//! Values are produced as lopdf objects so the rest of the crate can use
//! lopdf's accessors.

use lopdf::{Dictionary, Object, StringFormat};

use crate::error::{Error, Result};

/// Nesting limit for arrays and dictionaries
const MAX_DEPTH: usize = 32;

/// PDF whitespace characters (ISO 32000-1, table 1)
pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

/// PDF delimiter characters (ISO 32000-1, table 2)
pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

pub(crate) struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self {
            bytes,
            pos: pos.min(bytes.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.bytes.len());
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// Skip whitespace and `%` comments
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// True if `keyword` starts at the current position and ends at a token boundary
    pub fn at_keyword(&self, keyword: &[u8]) -> bool {
        let rest = self.rest();
        rest.starts_with(keyword)
            && rest.get(keyword.len()).map_or(true, |&b| !is_regular(b))
    }

    /// Skip whitespace, then consume `keyword` if present
    pub fn consume_keyword(&mut self, keyword: &[u8]) -> bool {
        self.skip_whitespace();
        if self.at_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    /// Skip whitespace, then read an unsigned decimal integer
    pub fn read_unsigned(&mut self) -> Option<u64> {
        self.skip_whitespace();
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos || self.peek().is_some_and(is_regular) {
            self.pos = start;
            return None;
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
        match digits.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.pos = start;
                None
            }
        }
    }

    /// Parse an `<id> <generation> obj` header
    pub fn parse_indirect_header(&mut self) -> Result<(u32, u32)> {
        let start = self.pos;
        let id = self.read_unsigned().and_then(|v| u32::try_from(v).ok());
        let generation = self.read_unsigned().and_then(|v| u32::try_from(v).ok());
        match (id, generation) {
            (Some(id), Some(generation)) if self.consume_keyword(b"obj") => Ok((id, generation)),
            _ => {
                self.pos = start;
                Err(Error::syntax(start, "expected an indirect object header"))
            }
        }
    }

    /// Parse one direct object
    pub fn parse_object(&mut self) -> Result<Object> {
        self.parse_value(0)
    }

    fn parse_value(&mut self, depth: usize) -> Result<Object> {
        if depth > MAX_DEPTH {
            return Err(Error::syntax(self.pos, "objects nested too deeply"));
        }
        self.skip_whitespace();
        let start = self.pos;
        let Some(b) = self.peek() else {
            return Err(Error::syntax(start, "unexpected end of data"));
        };
        match b {
            b'/' => Ok(Object::Name(self.parse_name())),
            b'<' if self.rest().starts_with(b"<<") => {
                self.pos += 2;
                self.parse_dictionary_body(depth).map(Object::Dictionary)
            }
            b'<' => self.parse_hex_string(),
            b'[' => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_whitespace();
                    match self.peek() {
                        Some(b']') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => items.push(self.parse_value(depth + 1)?),
                        None => return Err(Error::syntax(start, "unterminated array")),
                    }
                }
                Ok(Object::Array(items))
            }
            b'(' => self.parse_literal_string(),
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.parse_number_or_reference(),
            _ if self.at_keyword(b"true") => {
                self.pos += 4;
                Ok(Object::Boolean(true))
            }
            _ if self.at_keyword(b"false") => {
                self.pos += 5;
                Ok(Object::Boolean(false))
            }
            _ if self.at_keyword(b"null") => {
                self.pos += 4;
                Ok(Object::Null)
            }
            _ => Err(Error::syntax(start, "unexpected token")),
        }
    }

    fn parse_dictionary_body(&mut self, depth: usize) -> Result<Dictionary> {
        let start = self.pos;
        let mut dict = Dictionary::new();
        loop {
            self.skip_whitespace();
            if self.rest().starts_with(b">>") {
                self.pos += 2;
                return Ok(dict);
            }
            match self.peek() {
                Some(b'/') => {
                    let key = self.parse_name();
                    let value = self.parse_value(depth + 1)?;
                    dict.set(key, value);
                }
                Some(_) => return Err(Error::syntax(self.pos, "dictionary key is not a name")),
                None => return Err(Error::syntax(start, "unterminated dictionary")),
            }
        }
    }

    fn parse_name(&mut self) -> Vec<u8> {
        // leading '/'
        self.pos += 1;
        let mut name = Vec::new();
        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            if b == b'#' {
                let hex = self.bytes.get(self.pos + 1..self.pos + 3);
                if let Some(value) = hex.and_then(|h| Some(hex_value(h[0])? << 4 | hex_value(h[1])?)) {
                    name.push(value);
                    self.pos += 3;
                    continue;
                }
            }
            name.push(b);
            self.pos += 1;
        }
        name
    }

    fn parse_hex_string(&mut self) -> Result<Object> {
        let start = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        let mut high: Option<u8> = None;
        loop {
            let Some(b) = self.peek() else {
                return Err(Error::syntax(start, "unterminated hex string"));
            };
            self.pos += 1;
            if b == b'>' {
                break;
            }
            if is_whitespace(b) {
                continue;
            }
            let nibble = hex_value(b).ok_or_else(|| Error::syntax(self.pos - 1, "invalid hex digit"))?;
            match high.take() {
                Some(h) => out.push(h << 4 | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            out.push(h << 4);
        }
        Ok(Object::String(out, StringFormat::Hexadecimal))
    }

    fn parse_literal_string(&mut self) -> Result<Object> {
        let start = self.pos;
        self.pos += 1;
        let mut out = Vec::new();
        let mut nesting = 1usize;
        loop {
            let Some(b) = self.peek() else {
                return Err(Error::syntax(start, "unterminated literal string"));
            };
            self.pos += 1;
            match b {
                b'(' => {
                    nesting += 1;
                    out.push(b);
                }
                b')' => {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\\' => self.parse_escape(&mut out),
                _ => out.push(b),
            }
        }
        Ok(Object::String(out, StringFormat::Literal))
    }

    fn parse_escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.peek() else {
            return;
        };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\r' => {
                // line continuation, \r\n counts as one
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            other => out.push(other),
        }
    }

    fn parse_number_or_reference(&mut self) -> Result<Object> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.')) {
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| Error::syntax(start, "invalid number"))?;

        if token.contains('.') {
            let value: f32 = token
                .parse()
                .map_err(|_| Error::syntax(start, format!("invalid real '{token}'")))?;
            return Ok(Object::Real(value));
        }

        let value: i64 = token
            .parse()
            .map_err(|_| Error::syntax(start, format!("invalid integer '{token}'")))?;

        // `<id> <gen> R`
        if value >= 0 && token.bytes().all(|b| b.is_ascii_digit()) {
            let after_id = self.pos;
            if let Some(generation) = self.read_unsigned() {
                if self.consume_keyword(b"R") {
                    if let (Ok(id), Ok(generation)) = (u32::try_from(value), u16::try_from(generation)) {
                        return Ok(Object::Reference((id, generation)));
                    }
                }
            }
            self.pos = after_id;
        }
        Ok(Object::Integer(value))
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
