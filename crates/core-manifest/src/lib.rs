//! Core manifest data structures for EDL
//!
//! This crate provides the descriptive layer of an Experiment Directory Layout
//! tree. Every node directory carries a `manifest.toml` describing what the
//! directory is; this crate owns that document's data model and its codec.
//!
//! # Key Concepts
//!
//! - **Manifest**: per-directory metadata (name, node type, attributes, parts)
//! - **Node Type**: `collection`, `group` or `dataset`
//! - **Data Part Reference**: a typed payload file declared by a dataset
//!
//! The codec is pure: [`Manifest::decode`] and [`Manifest::encode`] map between
//! byte buffers and [`Manifest`] values and never touch the filesystem.
//!
//! # Example
//!
//! ```no_run
//! use edl_core_manifest::{DataPartRef, Manifest};
//!
//! let mut manifest = Manifest::new_dataset("frames");
//! manifest.add_part(DataPartRef::new("video", "cam0.mkv"));
//! let bytes = manifest.encode().unwrap();
//! assert_eq!(Manifest::decode(&bytes).unwrap(), manifest);
//! ```

pub mod error;
pub mod manifest;
pub mod name;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use manifest::{DataPartRef, Manifest, NodeType};
pub use name::sanitize_name;

/// Current major revision of the EDL format
pub const EDL_FORMAT_VERSION: &str = "1";

/// File name of the manifest inside every node directory
pub const MANIFEST_FILENAME: &str = "manifest.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_constants() {
        assert_eq!(EDL_FORMAT_VERSION, "1");
        assert_eq!(MANIFEST_FILENAME, "manifest.toml");
    }
}
