//! Error types for manifest operations

use thiserror::Error;

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during manifest operations
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest bytes are not valid UTF-8
    #[error("manifest is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML encode error
    #[error("TOML encode error: {0}")]
    Encode(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Node type outside the collection/group/dataset domain
    #[error("Invalid node type: {0} (expected collection, group or dataset)")]
    InvalidNodeType(String),

    /// Format version mismatch
    #[error("Format version mismatch: expected {expected}.x, found {found}")]
    VersionMismatch { expected: String, found: String },

    /// Manifest validation failed
    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl Error {
    /// Create a validation error with a message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Error::MissingField {
            field: field.into(),
        }
    }

    /// Create a version mismatch error
    pub fn version_mismatch<S: Into<String>>(expected: S, found: S) -> Self {
        Error::VersionMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
