//! Error types for container encoding and decoding.
//!
//! Every failure in this crate is terminal for the enclosing encode or
//! decode call: there are no retries and no partially-populated results.
//! The variants mirror the failure classes a caller can meaningfully
//! distinguish — malformed bytes, incompatible version, marshaling
//! failure, and unresolvable external references.

use crate::version::FbomVersion;

/// Errors that can occur while encoding or decoding a container.
#[derive(Debug, thiserror::Error)]
pub enum FbomError {
    /// The byte stream is malformed: bad magic, unknown command or
    /// location byte, unbalanced framing, out-of-range pool offset, or a
    /// length prefix that exceeds the remaining input.
    #[error("format error: {0}")]
    Format(String),

    /// The container was written by an incompatible format version.
    #[error("incompatible version: file is {found}, reader supports {supported}")]
    Version {
        found: FbomVersion,
        supported: FbomVersion,
    },

    /// A marshaler was missing or failed while converting between a
    /// native value and its serialized representation.
    #[error("marshal error for type '{type_name}': {message}")]
    Marshal { type_name: String, message: String },

    /// An externally referenced chunk file could not be resolved.
    #[error("external reference '{name}': {message}")]
    ExternalReference { name: String, message: String },

    /// An underlying file read or write failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FbomError {
    /// Shorthand for a [`FbomError::Format`] with a formatted message.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Shorthand for a [`FbomError::Marshal`].
    pub fn marshal(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Marshal {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}
