//! Error types for sc-manifest
//!
//! Defines one error enum covering all failure modes across the crate.
//! Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sc-manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Error type for sc-manifest operations
///
/// Every failure is surfaced synchronously at the offending call; nothing is
/// retried or swallowed. Lookups that can legitimately come up empty
/// (`Manifest::project_by_name` and friends) return `Option` instead of an
/// error variant.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file (or an included file, or a repo-root pointer) does not exist
    #[error("Manifest not found: {path}")]
    NotFound { path: PathBuf },

    /// Malformed XML or malformed manifest structure
    #[error("Parse error: {0}")]
    Parse(String),

    /// Attribute read or delete on an attribute that is not physically present
    #[error("Attribute '{name}' not set on <{element}> element")]
    MissingAttribute { element: String, name: String },

    /// Operation on an element that has been removed from the tree,
    /// or removal of an element with no parent
    #[error("Element <{tag}> is detached from the manifest tree")]
    DetachedElement { tag: String },

    /// Write-back failure; the target file is left untouched
    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O errors while reading manifest files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
