//! Fixture builder for incrementally updated PDFs
//!
//! Every fixture is generated in code. Offsets are tracked as the file is
//! written so xref sections always point at real object headers.

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

#[derive(Clone, Copy)]
enum Pending {
    InUse { offset: u64, generation: u32 },
    Free { generation: u32 },
    Compressed { container: u32, index: u32 },
}

pub struct PdfBuilder {
    data: Vec<u8>,
    pending: Vec<(u32, Pending)>,
    prev: Option<u64>,
    size: u32,
    first_section: bool,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::with_version("1.4")
    }

    pub fn with_version(version: &str) -> Self {
        let mut data = format!("%PDF-{}\n", version).into_bytes();
        data.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            data,
            pending: Vec::new(),
            prev: None,
            size: 1,
            first_section: true,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Pad with spaces so the next object starts at `offset`
    pub fn pad_to(&mut self, offset: u64) {
        assert!(offset >= self.len(), "cannot pad backwards");
        self.data.resize(offset as usize, b' ');
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn object(&mut self, id: u32, body: &str) -> u64 {
        self.object_gen(id, 0, body)
    }

    pub fn object_gen(&mut self, id: u32, generation: u32, body: &str) -> u64 {
        let offset = self.len();
        self.raw(format!("{} {} obj\n{}\nendobj\n", id, generation, body).as_bytes());
        self.list(id, Pending::InUse { offset, generation });
        offset
    }

    /// List an object again at an earlier offset, without writing a body
    pub fn relist(&mut self, id: u32, offset: u64) {
        self.list(id, Pending::InUse { offset, generation: 0 });
    }

    pub fn free(&mut self, id: u32) {
        self.list(id, Pending::Free { generation: 1 });
    }

    /// Write an uncompressed object stream holding `members`
    pub fn object_stream(&mut self, id: u32, members: &[(u32, &str)]) -> u64 {
        let mut header = String::new();
        let mut body = String::new();
        for (id, value) in members {
            header.push_str(&format!("{} {} ", id, body.len()));
            body.push_str(value);
            body.push(' ');
        }
        let content = format!("{}{}", header, body);
        let offset = self.object(
            id,
            &format!(
                "<< /Type /ObjStm /N {} /First {} /Length {} >>\nstream\n{}\nendstream",
                members.len(),
                header.len(),
                content.len(),
                content
            ),
        );
        for (index, (member, _)) in members.iter().enumerate() {
            self.list(
                *member,
                Pending::Compressed {
                    container: id,
                    index: index as u32,
                },
            );
        }
        offset
    }

    fn list(&mut self, id: u32, pending: Pending) {
        self.pending.push((id, pending));
        self.size = self.size.max(id + 1);
    }

    /// Continue the `/Prev` chain from `offset` instead of the last section
    pub fn link_to(&mut self, offset: u64) {
        self.prev = Some(offset);
    }

    /// Plain xref table chained to the previous section
    pub fn xref_table(&mut self, trailer_extra: &str) -> u64 {
        let prev = self.prev;
        self.xref_table_with(prev, None, trailer_extra)
    }

    /// Plain xref table with explicit `/Prev` and `startxref`
    ///
    /// `/Prev` is written as ten digits so it can be patched later with
    /// [`PdfBuilder::patch_prev`]; `startxref` defaults to the table itself.
    pub fn xref_table_with(&mut self, prev: Option<u64>, startxref: Option<u64>, trailer_extra: &str) -> u64 {
        let offset = self.len();
        let mut table = String::from("xref\n");
        if self.first_section {
            table.push_str("0 1\n0000000000 65535 f\r\n");
        }
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|(id, _)| *id);
        for (id, entry) in pending {
            let line = match entry {
                Pending::InUse { offset, generation } => format!("{:010} {:05} n", offset, generation),
                Pending::Free { generation } => format!("{:010} {:05} f", 0, generation),
                Pending::Compressed { .. } => panic!("xref tables cannot list compressed objects"),
            };
            table.push_str(&format!("{} 1\n{}\r\n", id, line));
        }
        let prev = prev.map(|p| format!(" /Prev {:010}", p)).unwrap_or_default();
        table.push_str(&format!("trailer\n<< /Size {}{} {} >>\n", self.size, prev, trailer_extra));
        table.push_str(&format!("startxref\n{}\n%%EOF\n", startxref.unwrap_or(offset)));
        self.raw(table.as_bytes());
        self.first_section = false;
        self.prev = Some(offset);
        offset
    }

    /// Overwrite the ten-digit `/Prev` value of the section at `section`
    pub fn patch_prev(&mut self, section: u64, prev: u64) {
        let start = section as usize;
        let at = self.data[start..]
            .windows(6)
            .position(|w| w == b"/Prev ")
            .expect("section has no /Prev")
            + start
            + 6;
        self.data[at..at + 10].copy_from_slice(format!("{:010}", prev).as_bytes());
    }

    /// Cross-reference stream object `id` listing everything pending plus itself
    pub fn xref_stream(&mut self, id: u32, trailer_extra: &str, compress: bool) -> u64 {
        let offset = self.len();
        self.list(id, Pending::InUse { offset, generation: 0 });
        let mut pending = std::mem::take(&mut self.pending);
        if self.first_section {
            pending.push((0, Pending::Free { generation: 65535 }));
        }
        pending.sort_by_key(|(id, _)| *id);

        let mut records = Vec::new();
        let mut index = String::new();
        for (id, entry) in &pending {
            index.push_str(&format!("{} 1 ", id));
            let (kind, f2, f3): (u8, u32, u16) = match *entry {
                Pending::Free { generation } => (0, 0, generation as u16),
                Pending::InUse { offset, generation } => (1, offset as u32, generation as u16),
                Pending::Compressed { container, index } => (2, container, index as u16),
            };
            records.push(kind);
            records.extend_from_slice(&f2.to_be_bytes());
            records.extend_from_slice(&f3.to_be_bytes());
        }

        let (data, filter) = if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&records).unwrap();
            (encoder.finish().unwrap(), " /Filter /FlateDecode")
        } else {
            (records, "")
        };
        let prev = self.prev.map(|p| format!(" /Prev {}", p)).unwrap_or_default();
        self.raw(
            format!(
                "{} 0 obj\n<< /Type /XRef /Size {} /W [1 4 2] /Index [{}]{}{} /Length {} {} >>\nstream\n",
                id,
                self.size,
                index.trim_end(),
                prev,
                filter,
                data.len(),
                trailer_extra
            )
            .as_bytes(),
        );
        self.raw(&data);
        self.raw(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", offset).as_bytes());
        self.first_section = false;
        self.prev = Some(offset);
        offset
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Find `needle` in `haystack`
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}
