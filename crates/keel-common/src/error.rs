//! Error types for the Keel index.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using KeelError.
pub type Result<T> = std::result::Result<T, KeelError>;

/// Errors that can occur in Keel index operations.
#[derive(Debug, Error)]
pub enum KeelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open index file {}: {source}", .path.display())]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid index file magic: {found:#010x}")]
    InvalidMagic { found: u32 },

    #[error("page size mismatch: expected {expected}, got {actual}")]
    PageSizeMismatch { expected: u32, actual: u32 },

    #[error("invalid node type tag: {found}")]
    InvalidNodeType { found: u8 },

    #[error("page {page_id} out of bounds (file has {num_pages} pages)")]
    PageOutOfBounds { page_id: u32, num_pages: u32 },

    #[error("tree corrupted: {0}")]
    TreeCorrupted(String),
}
