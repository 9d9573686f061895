//! Tiny incremental-save writer for unit tests

use crate::pdf::xref::Entry;

pub(crate) struct TestPdf {
    data: Vec<u8>,
    pending: Vec<Entry>,
    prev: Option<u64>,
    size: u32,
}

impl TestPdf {
    pub fn new() -> Self {
        Self {
            data: b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec(),
            pending: Vec::new(),
            prev: None,
            size: 1,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Append `id 0 obj body endobj` and list it in the next save
    pub fn object(&mut self, id: u32, body: &str) -> u64 {
        let offset = self.len();
        self.data
            .extend_from_slice(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes());
        self.pending.push(Entry::in_use(id, offset, 0));
        self.size = self.size.max(id + 1);
        offset
    }

    /// List `id` as free (generation 1) in the next save
    pub fn free(&mut self, id: u32) {
        self.pending.push(Entry::free(id, 0, 1));
    }

    /// Write an xref table linked to the previous save
    pub fn save(&mut self) -> u64 {
        self.save_with_prev(self.prev, "")
    }

    pub fn save_with(&mut self, trailer_extra: &str) -> u64 {
        self.save_with_prev(self.prev, trailer_extra)
    }

    pub fn save_with_prev(&mut self, prev: Option<u64>, trailer_extra: &str) -> u64 {
        let xref = self.len();
        let mut table = String::from("xref\n");
        if self.prev.is_none() {
            table.push_str("0 1\n0000000000 65535 f\r\n");
        }
        for entry in self.pending.drain(..) {
            let flag = if entry.is_free() { 'f' } else { 'n' };
            table.push_str(&format!(
                "{} 1\n{:010} {:05} {}\r\n",
                entry.id, entry.offset, entry.generation, flag
            ));
        }
        let prev = prev.map(|p| format!(" /Prev {p}")).unwrap_or_default();
        table.push_str(&format!(
            "trailer\n<< /Size {}{} {} >>\nstartxref\n{}\n%%EOF\n",
            self.size, prev, trailer_extra, xref
        ));
        self.data.extend_from_slice(table.as_bytes());
        self.prev = Some(xref);
        xref
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}
