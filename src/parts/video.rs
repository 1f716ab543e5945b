//! Video container handler
//!
//! Validation only checks the container signature, it does not decode frames.
//! Matroska/WebM (EBML), AVI (RIFF) and MP4-family (ftyp) containers are
//! recognized. Loading is not supported, video payloads stay on disk.

use super::{PartError, PartHandler, PartResult};
use edl_core_manifest::DataPartRef;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// EBML header id used by Matroska and WebM
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Handler for video container files
pub struct VideoHandler;

impl VideoHandler {
    fn probe(header: &[u8]) -> PartResult<()> {
        if header.is_empty() {
            return Err(PartError::malformed("video file is empty"));
        }
        if header.len() >= 4 && header[..4] == EBML_MAGIC {
            return Ok(());
        }
        if header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"AVI " {
            return Ok(());
        }
        if header.len() >= 12 && &header[4..8] == b"ftyp" {
            return Ok(());
        }
        Err(PartError::malformed(
            "file does not start with a known video container signature",
        ))
    }
}

impl PartHandler for VideoHandler {
    fn name(&self) -> &str {
        "video"
    }

    fn validate(&self, path: &Path, _part: &DataPartRef) -> PartResult<Vec<String>> {
        let mut header = [0u8; 12];
        let mut file = File::open(path)?;
        let read = file.read(&mut header)?;
        VideoHandler::probe(&header[..read])?;
        Ok(Vec::new())
    }
}
