//! Opaque payload handler
//!
//! Accepts any byte content. Besides serving explicitly declared `opaque`
//! parts, this handler is the fallback for part types no handler is
//! registered for, so unknown types never fail validation.

use super::{PartData, PartHandler, PartResult};
use edl_core_manifest::DataPartRef;
use std::fs;
use std::path::Path;

/// Handler that treats payloads as raw bytes
pub struct OpaqueHandler;

impl PartHandler for OpaqueHandler {
    fn name(&self) -> &str {
        "opaque"
    }

    fn validate(&self, _path: &Path, _part: &DataPartRef) -> PartResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn load(&self, path: &Path, _part: &DataPartRef) -> PartResult<PartData> {
        Ok(PartData::Bytes(fs::read(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_any_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.dat");
        fs::write(&path, [0x00, 0xff, 0x7f]).unwrap();

        let part = DataPartRef::new("opaque", "probe.dat");
        assert!(OpaqueHandler.validate(&path, &part).unwrap().is_empty());

        match OpaqueHandler.load(&path, &part).unwrap() {
            PartData::Bytes(bytes) => assert_eq!(bytes, vec![0x00, 0xff, 0x7f]),
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
