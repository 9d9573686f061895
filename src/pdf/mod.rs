//! PDF history engine
//!
//! Scans for `%%EOF` markers, parses every xref section they lead to,
//! rebuilds the `/Prev` chain and classifies object changes per version.

mod chain;
pub mod creator;
mod decode;
pub mod document;
mod lexer;
pub mod materialize;
pub mod object;
pub mod scan;
pub mod scrub;
pub mod status;
pub mod xref;
mod xref_stream;
mod xref_table;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used items
pub use creator::{parse_pdf_date, CreatorField, CREATOR_KEYS};
pub use document::{Document, Revision};
pub use materialize::{materialize, version_file_name, versions_dir_name, write_versions, WriteOutcome};
pub use scan::EofMarker;
pub use scrub::{scrub, scrubbed_path, write_scrubbed, ScrubReport, ScrubbedObject, SkippedObject};
pub use status::{classify, classify_document, object_status, ObjectChange, Prior, RevisionChanges, Status};
pub use xref::{Entry, EntryKind, XrefKind, XrefSection};
