use std::path::PathBuf;

use thiserror::Error;

/// Error type shared by every parser and scanner in this crate.
///
/// Low-level structural checks (bounds, magic values, block-index validity)
/// abort the whole operation with one of these. Optional enrichments that are
/// simply absent (a missing resource type, no debug directory) are expressed
/// as `Option::None` by their APIs, never as an error.
#[derive(Debug, Error)]
pub enum PeError {
    /// The input file does not exist.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Underlying I/O failure while opening or reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A structure is present but its contents violate the format.
    #[error("Malformed {what} at offset {offset:#x}")]
    Malformed { what: &'static str, offset: u64 },

    /// A computed offset or length exceeds the loaded buffer or the
    /// declared container size.
    #[error("Out of bounds read: offset {offset:#x} len {len:#x} exceeds size {size:#x}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    /// A recognized but unhandled structural variant.
    #[error("Unsupported {0}")]
    Unsupported(&'static str),

    /// Cooperative cancellation was observed before completion.
    #[error("Operation cancelled")]
    Cancelled,

    /// The trust-verification collaborator failed (distinct from "not signed").
    #[error("Trust service error: {0}")]
    TrustService(String),
}

/// Convenience result alias used throughout the crate.
pub type PeResult<T> = Result<T, PeError>;

impl PeError {
    pub(crate) fn malformed(what: &'static str, offset: u64) -> Self {
        PeError::Malformed { what, offset }
    }
}
