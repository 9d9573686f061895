//! Error types for the PDF history library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF history library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The input does not start with a `%PDF-` header
    #[error("'{0}' specified is not a valid PDF")]
    NotPdf(String),

    /// Malformed structure at a known byte offset
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: u64, message: String },

    /// Refusing to overwrite an existing output path
    #[error("Output already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Shorthand for a [`Error::Syntax`] at `offset`
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            offset: offset as u64,
            message: message.into(),
        }
    }
}
