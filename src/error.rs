// SPDX-License-Identifier: MIT
//! Error types shared by every layer of the crate

/// Errors that can occur while reading, writing or opening resources
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Schema mismatch for {resource}: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        resource: String,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for {resource}: {reason}")]
    SizeMismatch { resource: String, reason: String },

    #[error("Out of range: {what} {index} is not below {limit}")]
    OutOfRange {
        what: String,
        index: u64,
        limit: u64,
    },

    #[error("Unknown type tag {tag} in {resource}")]
    UnknownTag { resource: String, tag: u8 },

    #[error("I/O error on {resource}: {source}")]
    Io {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Misuse: {0}")]
    Misuse(String),
}

impl Error {
    pub(crate) fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub(crate) fn size_mismatch(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SizeMismatch {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(resource: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::not_found(resource);
        }
        Self::Io {
            resource: resource.into(),
            source,
        }
    }

    /// True if the error only reports an absent resource.
    ///
    /// Optional resources tolerate exactly this error; everything else stays fatal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
