/*!
 * EDL - Experiment Directory Layout toolkit
 *
 * Read, validate and convert experiment directory trees:
 * - TOML manifest codec with deterministic output
 * - Tree discovery with strict and lenient validation modes
 * - BLAKE3 / SHA-256 payload checksum verification
 * - Extensible data part handler registry
 * - Schema-driven conversion (identity re-emit, MoSeq export)
 * - Atomic all-or-none tree persistence
 */

pub mod checksum;
pub mod config;
pub mod convert;
pub mod discover;
pub mod error;
pub mod logging;
pub mod parts;
pub mod save;
pub mod tree;

// Re-export commonly used types
pub use config::{EdlConfig, LogLevel, ValidationMode};
pub use convert::{convert, convert_path, Conversion, SchemaDescriptor};
pub use discover::{discover, CancelFlag, Discovery, Finding, ValidationReport};
pub use edl_core_manifest::{sanitize_name, DataPartRef, Manifest, NodeType, MANIFEST_FILENAME};
pub use error::{EdlError, Result};
pub use parts::{global_registry, PartHandler, PartRegistry};
pub use save::{save, SaveOptions, SaveReport};
pub use tree::{DataPart, Node, NodeState, PartSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
