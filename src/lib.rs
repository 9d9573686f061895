//! PDF Resurrect Library
//!
//! Recovers the edit history of a PDF from its incremental updates.
//! This library provides functionality to:
//! - Find every `%%EOF` marker and the xref section it announces
//! - Parse plain xref tables and compressed xref streams
//! - Rebuild the `/Prev` chain into numbered versions, merging linearized sections
//! - Classify each object as added, modified, deleted or unchanged per version
//! - Write historical versions as standalone files and scrub superseded objects
//!
//! # Example
//!
//! ```no_run
//! use pdf_resurrect::pdf::{classify_document, Document};
//! use std::path::Path;
//!
//! let doc = Document::load(Path::new("report.pdf")).expect("Failed to load PDF");
//! for version in classify_document(&doc) {
//!     println!("version {}: {} objects listed", version.version, version.changes.len());
//! }
//! ```

pub mod error;
pub mod options;
pub mod pdf;
pub mod report;

// Re-export commonly used items
pub use error::{Error, Result};
pub use options::{Mode, ScanOptions};
