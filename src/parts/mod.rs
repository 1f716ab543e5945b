//! Data part handlers
//!
//! Every data part in a dataset carries a type tag; a [`PartHandler`] gives the
//! engine type-specific behavior for one tag. Handlers can always validate a
//! payload and may optionally load it into a typed in-memory value. Handlers
//! are looked up through the [`registry::PartRegistry`].

pub mod intan;
pub mod json;
pub mod opaque;
pub mod registry;
pub mod table;
pub mod tsync;
pub mod video;

use edl_core_manifest::DataPartRef;
use std::path::Path;
use thiserror::Error;

pub use intan::IntanHandler;
pub use json::JsonHandler;
pub use opaque::OpaqueHandler;
pub use registry::{global_registry, PartRegistry};
pub use table::{TableData, TableHandler};
pub use tsync::{TimeSyncData, TsyncHandler};
pub use video::VideoHandler;

/// Result type for handler checks, before node context is attached
pub type PartResult<T> = std::result::Result<T, PartError>;

/// Errors raised by part handlers and the registry
#[derive(Error, Debug)]
pub enum PartError {
    /// I/O error while reading the payload
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload bytes do not match the declared part type
    #[error("{0}")]
    Malformed(String),

    /// The handler offers validation only
    #[error("part type '{0}' does not support loading")]
    LoadNotSupported(String),

    /// A handler for this part type already exists
    #[error("a handler for part type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl PartError {
    /// Create a malformed payload error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        PartError::Malformed(message.into())
    }
}

/// Typed in-memory payload of a loaded data part
#[derive(Debug, Clone, PartialEq)]
pub enum PartData {
    /// Parsed tabular data
    Table(TableData),

    /// Parsed time-sync stream
    TimeSync(TimeSyncData),

    /// Parsed JSON document
    Json(serde_json::Value),

    /// Raw payload bytes
    Bytes(Vec<u8>),
}

/// Type-specific behavior for one part type tag
///
/// `validate` returns advisory warnings for payloads that are well-formed but
/// suspicious (e.g. a time-sync stream with many dropped frames). Existence
/// and checksum checks are the discovery engine's job, not the handler's.
pub trait PartHandler: Send + Sync {
    /// Part type tag this handler serves
    fn name(&self) -> &str;

    /// Check that the payload bytes are well-formed for this type
    fn validate(&self, path: &Path, part: &DataPartRef) -> PartResult<Vec<String>>;

    /// Load the payload into a typed in-memory value
    fn load(&self, _path: &Path, _part: &DataPartRef) -> PartResult<PartData> {
        Err(PartError::LoadNotSupported(self.name().to_string()))
    }
}

/// Byte-level payload rewrites applied during conversion
#[derive(Debug, Clone, PartialEq)]
pub enum PartTransform {
    /// Render the master-time column of a time-sync stream as text,
    /// one millisecond value per line
    TimestampsText,

    /// Reparse a delimited table and emit it with a different delimiter
    TableDelimiter { from: u8, to: u8 },
}

impl PartTransform {
    /// Apply this transform to source payload bytes
    pub fn render(&self, source: &[u8]) -> PartResult<Vec<u8>> {
        match self {
            PartTransform::TimestampsText => {
                let stream = TimeSyncData::parse(source)?;
                let times = stream.master_times_ms();
                if times.is_empty() {
                    return Err(PartError::malformed(
                        "time-sync stream contains no time pairs",
                    ));
                }
                let mut out = String::new();
                for time in times {
                    // Debug formatting keeps a trailing .0 on whole milliseconds
                    out.push_str(&format!("{:?}\n", time));
                }
                Ok(out.into_bytes())
            }
            PartTransform::TableDelimiter { from, to } => {
                let table = TableData::parse(source, *from)?;
                table.emit(*to)
            }
        }
    }
}
