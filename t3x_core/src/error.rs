//! Error types for t3x_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using t3x_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving configuration, decoding an archive
/// or writing its contents.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Bad or missing command line arguments.
    #[error("{reason}")]
    Usage { reason: String },

    /// A configuration file could not be read or parsed, or a setting holds
    /// a value of the wrong form.
    #[error("Configuration error in {origin}: {reason}")]
    Config { origin: String, reason: String },

    /// The container names a compression method outside the supported set.
    #[error("Unsupported compression method: '{method}'")]
    UnsupportedCompression { method: String },

    /// The container could not be split or its payload failed to decompress.
    #[error("Corrupt archive: {reason}")]
    CorruptArchive { reason: String },

    /// The payload decompressed but does not match the declared checksum.
    #[error("Checksum mismatch: declared {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The decompressed payload is not a well-formed manifest.
    #[error("Malformed manifest: {reason}")]
    MalformedManifest { reason: String },

    /// The extraction destination already exists.
    #[error("Destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// A single file could not be written during materialization.
    #[error("Failed to write {path}: {source}{}", context_suffix(.context))]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
        context: Option<String>,
    },

    /// An archive or update resource could not be retrieved.
    #[error("Failed to fetch {resource}: {reason}")]
    Fetch { resource: String, reason: String },
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(context) => format!(" ({})", context),
        None => String::new(),
    }
}

impl Error {
    /// Create a Usage error.
    pub fn usage(reason: impl Into<String>) -> Self {
        Error::Usage {
            reason: reason.into(),
        }
    }

    /// Create a Config error.
    pub fn config(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedCompression error.
    pub fn unsupported_compression(method: impl Into<String>) -> Self {
        Error::UnsupportedCompression {
            method: method.into(),
        }
    }

    /// Create a CorruptArchive error.
    pub fn corrupt_archive(reason: impl Into<String>) -> Self {
        Error::CorruptArchive {
            reason: reason.into(),
        }
    }

    /// Create a ChecksumMismatch error.
    pub fn checksum_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::ChecksumMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a MalformedManifest error.
    pub fn malformed_manifest(reason: impl Into<String>) -> Self {
        Error::MalformedManifest {
            reason: reason.into(),
        }
    }

    /// Create a DestinationExists error.
    pub fn destination_exists(path: impl Into<PathBuf>) -> Self {
        Error::DestinationExists { path: path.into() }
    }

    /// Create a FileWrite error, optionally carrying an earlier failure that
    /// likely caused it.
    pub fn file_write(
        path: impl Into<PathBuf>,
        source: std::io::Error,
        context: Option<String>,
    ) -> Self {
        Error::FileWrite {
            path: path.into(),
            source,
            context,
        }
    }

    /// Create a Fetch error.
    pub fn fetch(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Fetch {
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}
