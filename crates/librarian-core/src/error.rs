//! Library error handling
//!
//! Provides typed errors for archive, link and query operations. Every
//! variant names the key or path it concerns so a message can be acted on
//! without further context.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while operating on the library
#[derive(Error, Debug)]
pub enum LibraryError {
    /// No archive entry with this key
    #[error("Key '{key}' not found in archive")]
    NotFound { key: String },

    /// An entry with this key already exists
    #[error("Archive already contains key '{key}'")]
    DuplicateKey { key: String },

    /// Key cannot be used as a directory and file name
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// Rename found the metadata key identical to the current key
    #[error("Key '{key}' already matches its metadata; nothing to rename")]
    KeyUnchanged { key: String },

    /// The key could not be extracted from a metadata file
    #[error("Malformed metadata in '{path}': {details}")]
    MalformedMetadata { path: PathBuf, details: String },

    /// The metadata names a different key than the entry directory
    #[error("Entry '{key}' has metadata key '{metadata_key}' in '{path}'")]
    KeyMismatch {
        key: String,
        metadata_key: String,
        path: PathBuf,
    },

    /// An entry directory is missing its document or metadata file
    #[error("Corrupt entry '{key}': missing '{missing}'")]
    CorruptEntry { key: String, missing: PathBuf },

    /// A link pointing at a rekeyed entry could not be rewritten
    #[error("Could not repair link '{path}': {source}")]
    LinkRepairFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A directory could not be read while walking a link tree
    #[error("Cannot traverse '{path}': {source}")]
    TraversalError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A required library directory is absent
    #[error("Library directory '{path}' does not exist")]
    MissingDirectory { path: PathBuf },

    /// Refused to overwrite an existing path with a new link
    #[error("Link '{path}' already exists")]
    LinkExists { path: PathBuf },

    /// Path is not a symbolic link into the archive
    #[error("'{path}' is not a link into the archive")]
    NotALink { path: PathBuf },

    /// A query filter could not be built
    #[error("Invalid {field} filter '{pattern}': {details}")]
    InvalidFilter {
        field: &'static str,
        pattern: String,
        details: String,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Generic I/O error with path context
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LibraryError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind.
    pub fn from_io(error: io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match error.kind() {
            io::ErrorKind::PermissionDenied => LibraryError::PermissionDenied {
                path,
                source: error,
            },
            _ => LibraryError::Io {
                path,
                source: error,
            },
        }
    }

    /// Check if this error is recoverable by the user fixing something by hand
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LibraryError::PermissionDenied { .. }
                | LibraryError::LinkRepairFailed { .. }
                | LibraryError::CorruptEntry { .. }
                | LibraryError::KeyMismatch { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            LibraryError::PermissionDenied { .. } | LibraryError::LinkRepairFailed { .. } => {
                Some("Check file and directory permissions, then recreate the link by hand.")
            }
            LibraryError::CorruptEntry { .. } => {
                Some("Restore the missing file or remove the entry directory from the archive.")
            }
            LibraryError::KeyMismatch { .. } => {
                Some("Run `librarian rename <key>` to adopt the metadata key, or fix the metadata by hand.")
            }
            LibraryError::MissingDirectory { .. } => {
                Some("Check `library_dir` in the configuration, or run `librarian init`.")
            }
            _ => None,
        }
    }
}

/// Result type for library operations
pub type LibraryResult<T> = Result<T, LibraryError>;
