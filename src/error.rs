/*!
 * Error types for EDL operations
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EdlError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INVALID: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;

#[derive(Error, Debug)]
pub enum EdlError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Manifest bytes could not be decoded
    #[error("Malformed manifest at {path}: {source}")]
    MalformedManifest {
        path: PathBuf,
        source: edl_core_manifest::Error,
    },

    /// Directory layout violates the format rules
    #[error("Structural error at '{node}': {message}")]
    Structural { node: String, message: String },

    /// A declared data part failed type-specific validation
    #[error("Invalid part '{part}' in '{node}': {message}")]
    InvalidPart {
        node: String,
        part: String,
        message: String,
    },

    /// Checksum verification failed for a data part
    #[error("Checksum verification failed for '{part}' in '{node}': expected {expected}, got {found}")]
    ChecksumMismatch {
        node: String,
        part: String,
        expected: String,
        found: String,
    },

    /// Requested conversion cannot be expressed by the target layout
    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    /// Node lookup by path failed
    #[error("Node not found: {path}")]
    NodeNotFound { path: String },

    /// Refusing to write into an existing non-empty directory
    #[error("Destination is not empty: {path} (pass overwrite to replace it)")]
    DestinationNotEmpty { path: PathBuf },

    /// Part handler offers validation only
    #[error("Part type '{part_type}' does not support loading")]
    LoadNotSupported { part_type: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EdlError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Usage and environment errors: nothing was processed
            EdlError::Io(_)
            | EdlError::Config(_)
            | EdlError::NodeNotFound { .. }
            | EdlError::DestinationNotEmpty { .. }
            | EdlError::LoadNotSupported { .. } => EXIT_FATAL,
            // Integrity errors: payload bytes do not match their digest
            EdlError::ChecksumMismatch { .. } => EXIT_INTEGRITY,
            // Findings about the tree itself
            EdlError::MalformedManifest { .. }
            | EdlError::Structural { .. }
            | EdlError::InvalidPart { .. }
            | EdlError::UnsupportedConversion(_) => EXIT_INVALID,
        }
    }

    /// Whether this error describes the invoking environment rather than the tree
    pub fn is_fatal(&self) -> bool {
        self.exit_code() == EXIT_FATAL
    }

    /// Create a malformed manifest error
    pub fn malformed<P: Into<PathBuf>>(path: P, source: edl_core_manifest::Error) -> Self {
        EdlError::MalformedManifest {
            path: path.into(),
            source,
        }
    }

    /// Create a structural error
    pub fn structural<N: Into<String>, M: Into<String>>(node: N, message: M) -> Self {
        EdlError::Structural {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create an invalid part error
    pub fn invalid_part<N, P, M>(node: N, part: P, message: M) -> Self
    where
        N: Into<String>,
        P: Into<String>,
        M: Into<String>,
    {
        EdlError::InvalidPart {
            node: node.into(),
            part: part.into(),
            message: message.into(),
        }
    }

    /// Create a checksum mismatch error
    pub fn checksum_mismatch<N, P, S>(node: N, part: P, expected: S, found: S) -> Self
    where
        N: Into<String>,
        P: Into<String>,
        S: Into<String>,
    {
        EdlError::ChecksumMismatch {
            node: node.into(),
            part: part.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an unsupported conversion error
    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        EdlError::UnsupportedConversion(message.into())
    }

    /// Create a node lookup error
    pub fn node_not_found<S: Into<String>>(path: S) -> Self {
        EdlError::NodeNotFound { path: path.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        EdlError::Config(message.into())
    }
}

impl From<walkdir::Error> for EdlError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => EdlError::Io(io),
            None => EdlError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "filesystem loop detected",
            )),
        }
    }
}

impl From<toml::de::Error> for EdlError {
    fn from(err: toml::de::Error) -> Self {
        EdlError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for EdlError {
    fn from(err: toml::ser::Error) -> Self {
        EdlError::Config(format!("TOML encode error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_error_display() {
        let err = EdlError::structural("session1/frames", "dataset contains subdirectories");
        assert_eq!(
            err.to_string(),
            "Structural error at 'session1/frames': dataset contains subdirectories"
        );
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = EdlError::checksum_mismatch("frames", "cam0.mkv", "blake3:aa", "blake3:bb");
        let display = err.to_string();
        assert!(display.contains("cam0.mkv"));
        assert!(display.contains("blake3:aa"));
        assert!(display.contains("blake3:bb"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EdlError::config("bad worker count").exit_code(), EXIT_FATAL);
        assert_eq!(
            EdlError::structural("a", "sibling name collision").exit_code(),
            EXIT_INVALID
        );
        assert_eq!(
            EdlError::checksum_mismatch("n", "p", "e", "f").exit_code(),
            EXIT_INTEGRITY
        );
        assert_eq!(
            EdlError::unsupported("no mapping for part type").exit_code(),
            EXIT_INVALID
        );
        assert_eq!(
            EdlError::Io(io::Error::other("disk gone")).exit_code(),
            EXIT_FATAL
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(EdlError::config("x").is_fatal());
        assert!(EdlError::node_not_found("a/b").is_fatal());
        assert!(!EdlError::structural("a", "b").is_fatal());
        assert!(!EdlError::invalid_part("a", "b", "c").is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: EdlError = io_err.into();
        assert!(matches!(err, EdlError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_malformed_manifest_carries_source() {
        use std::error::Error as _;
        let source = edl_core_manifest::Error::missing_field("name");
        let err = EdlError::malformed("/data/exp/manifest.toml", source);
        assert!(err.to_string().contains("manifest.toml"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_exit_code_constants() {
        assert_eq!(EXIT_SUCCESS, 0);
        assert_eq!(EXIT_INVALID, 1);
        assert_eq!(EXIT_FATAL, 2);
        assert_eq!(EXIT_INTEGRITY, 3);
    }
}
