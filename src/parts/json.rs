//! JSON document handler

use super::{PartData, PartError, PartHandler, PartResult};
use edl_core_manifest::DataPartRef;
use std::fs;
use std::path::Path;

/// Handler for JSON documents
pub struct JsonHandler;

impl JsonHandler {
    fn parse(bytes: &[u8]) -> PartResult<serde_json::Value> {
        serde_json::from_slice(bytes)
            .map_err(|e| PartError::malformed(format!("invalid JSON: {}", e)))
    }
}

impl PartHandler for JsonHandler {
    fn name(&self) -> &str {
        "json"
    }

    fn validate(&self, path: &Path, _part: &DataPartRef) -> PartResult<Vec<String>> {
        JsonHandler::parse(&fs::read(path)?)?;
        Ok(Vec::new())
    }

    fn load(&self, path: &Path, _part: &DataPartRef) -> PartResult<PartData> {
        Ok(PartData::Json(JsonHandler::parse(&fs::read(path)?)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, r#"{"SubjectName": "blink1", "fps": 30}"#).unwrap();

        let part = DataPartRef::new("json", "metadata.json");
        assert!(JsonHandler.validate(&path, &part).unwrap().is_empty());

        match JsonHandler.load(&path, &part).unwrap() {
            PartData::Json(value) => assert_eq!(value["SubjectName"], "blink1"),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, "{not json").unwrap();

        let part = DataPartRef::new("json", "metadata.json");
        let err = JsonHandler.validate(&path, &part).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }
}
