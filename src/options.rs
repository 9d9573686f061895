//! Configuration values threaded through the engine and the report

/// Limits applied while reconstructing the xref chain
///
/// A hostile file can declare absurd subsection counts or chain lengths;
/// these bounds turn that into a structural error for the offending
/// section instead of unbounded work.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum number of physical xref sections visited in one chain walk
    pub max_chain_length: usize,
    /// Maximum number of entries accepted from a single xref section
    pub max_entries_per_section: usize,
    /// Maximum decoded size of an xref stream in bytes
    pub max_stream_bytes: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_chain_length: 4096,
            max_entries_per_section: 8_388_608,
            max_stream_bytes: 64 * 1024 * 1024,
        }
    }
}

/// What the caller wants done with the reconstructed history
#[derive(Debug, Clone, Default)]
pub struct Mode {
    /// Print only the number of versions
    pub quiet: bool,
    /// Display creator information (DocInfo dictionary) per version
    pub show_creator: bool,
    /// Write every historical version and the summary to disk
    pub write_versions: bool,
    /// Produce a scrubbed copy of the document (experimental)
    pub scrub: bool,
}
