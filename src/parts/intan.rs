//! Intan amplifier recording handler
//!
//! Validation only checks the RHD2000 / RHS header magic, it does not decode
//! amplifier channels. Loading is not supported, signal payloads stay on
//! disk.

use super::{PartError, PartHandler, PartResult};
use byteorder::{ByteOrder, LittleEndian};
use edl_core_manifest::DataPartRef;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header magic of RHD2000 amplifier recordings
const RHD_MAGIC: u32 = 0xC691_2702;

/// Header magic of RHS stim/record recordings
const RHS_MAGIC: u32 = 0xD691_27AC;

/// Handler for Intan amplifier data files
pub struct IntanHandler;

impl IntanHandler {
    fn probe(header: &[u8]) -> PartResult<()> {
        if header.is_empty() {
            return Err(PartError::malformed("intan file is empty"));
        }
        if header.len() < 4 {
            return Err(PartError::malformed("intan header is truncated"));
        }
        match LittleEndian::read_u32(&header[..4]) {
            RHD_MAGIC | RHS_MAGIC => Ok(()),
            _ => Err(PartError::malformed(
                "file does not start with an Intan RHD or RHS header magic",
            )),
        }
    }
}

impl PartHandler for IntanHandler {
    fn name(&self) -> &str {
        "intan"
    }

    fn validate(&self, path: &Path, _part: &DataPartRef) -> PartResult<Vec<String>> {
        let mut header = [0u8; 4];
        let mut file = File::open(path)?;
        let read = file.read(&mut header)?;
        IntanHandler::probe(&header[..read])?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RHD2000 magic in little-endian byte order, then version 3.0
    const RHD_HEADER: [u8; 8] = [0x02, 0x27, 0x91, 0xC6, 0x03, 0x00, 0x00, 0x00];

    #[test]
    fn test_probe_recognizes_rhd_and_rhs() {
        assert!(IntanHandler::probe(&RHD_HEADER).is_ok());
        assert!(IntanHandler::probe(&[0xAC, 0x27, 0x91, 0xD6]).is_ok());
    }

    #[test]
    fn test_probe_rejects_unknown_bytes() {
        assert!(IntanHandler::probe(b"not an amplifier file").is_err());
        assert!(IntanHandler::probe(&[0x02, 0x27]).is_err());
        assert!(IntanHandler::probe(&[]).is_err());
    }

    #[test]
    fn test_validate_reads_file_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.rhd");
        std::fs::write(&path, RHD_HEADER).unwrap();

        let part = DataPartRef::new("intan", "signals.rhd");
        assert!(IntanHandler.validate(&path, &part).unwrap().is_empty());

        std::fs::write(&path, b"plain text").unwrap();
        assert!(IntanHandler.validate(&path, &part).is_err());
    }

    #[test]
    fn test_load_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.rhd");
        std::fs::write(&path, RHD_HEADER).unwrap();

        let part = DataPartRef::new("intan", "signals.rhd");
        let err = IntanHandler.load(&path, &part).unwrap_err();
        assert!(matches!(err, PartError::LoadNotSupported(_)));
    }
}
