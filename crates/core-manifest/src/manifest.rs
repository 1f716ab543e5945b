//! Manifest data structures and codec
//!
//! A manifest describes one node directory of an EDL tree: its name, its node
//! type and, for datasets, the data parts stored alongside it. The codec maps
//! between raw `manifest.toml` bytes and [`Manifest`] values.

use crate::error::{Error, Result};
use crate::EDL_FORMAT_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

/// Manifest: per-directory node metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// EDL format revision this manifest was written for
    #[serde(default = "default_format_version")]
    pub format_version: String,

    /// Free-form identifier of the tool that produced this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,

    /// Identity of the collection this node belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<Uuid>,

    /// Human-readable node name, unique among siblings
    pub name: String,

    /// Node type (collection, group or dataset)
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Creation timestamp (UTC)
    #[serde(
        default,
        with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_created: Option<DateTime<Utc>>,

    /// Open-ended user attributes, preserved without coercion
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub attributes: toml::Table,

    /// Data parts stored in this directory (datasets only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<DataPartRef>,
}

/// Node types an EDL directory can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Tree root, carries the collection identity
    Collection,
    /// Interior grouping node
    Group,
    /// Leaf node holding data parts
    Dataset,
}

impl NodeType {
    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Collection => "collection",
            NodeType::Group => "group",
            NodeType::Dataset => "dataset",
        }
    }

    /// Whether this node type may contain child nodes
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeType::Dataset)
    }
}

impl FromStr for NodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "collection" => Ok(NodeType::Collection),
            "group" => Ok(NodeType::Group),
            "dataset" => Ok(NodeType::Dataset),
            _ => Err(Error::InvalidNodeType(s.to_string())),
        }
    }
}

/// Reference to one data part file declared by a dataset manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPartRef {
    /// Part type tag (open vocabulary, e.g. "video" or "table:csv")
    #[serde(rename = "type")]
    pub part_type: String,

    /// File name relative to the dataset directory
    pub filename: String,

    /// Optional content digest, algorithm-tagged (e.g. "blake3:<hex>")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Part-specific attributes (e.g. nominal fps for a video)
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub extra: toml::Table,
}

fn default_format_version() -> String {
    EDL_FORMAT_VERSION.to_string()
}

/// Serde adapter for `time_created`.
///
/// Other EDL writers emit either a bare TOML datetime or an RFC 3339 string;
/// both decode here. Encoding always produces the RFC 3339 string form, with
/// just enough subsecond digits to round-trip exactly.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => {
                serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = toml::Value::deserialize(deserializer)?;
        let text = match &value {
            toml::Value::String(text) => text.clone(),
            toml::Value::Datetime(datetime) => datetime.to_string(),
            _ => return Err(D::Error::custom("time_created must be a datetime")),
        };
        parse_timestamp(&text).map(Some).map_err(D::Error::custom)
    }

    fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(time) = DateTime::parse_from_rfc3339(text) {
            return Ok(time.with_timezone(&Utc));
        }
        // offset-free datetimes are taken as UTC
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(naive.and_utc());
            }
        }
        Err(format!("invalid timestamp: {text}"))
    }
}

impl Manifest {
    /// Create a collection manifest with a fresh collection identity
    pub fn new_collection<S: Into<String>>(name: S) -> Self {
        let mut manifest = Self::new_node(name, NodeType::Collection);
        manifest.collection_id = Some(Uuid::new_v4());
        manifest
    }

    /// Create a group manifest
    pub fn new_group<S: Into<String>>(name: S) -> Self {
        Self::new_node(name, NodeType::Group)
    }

    /// Create a dataset manifest
    pub fn new_dataset<S: Into<String>>(name: S) -> Self {
        Self::new_node(name, NodeType::Dataset)
    }

    fn new_node<S: Into<String>>(name: S, node_type: NodeType) -> Self {
        Self {
            format_version: EDL_FORMAT_VERSION.to_string(),
            generator: None,
            collection_id: None,
            name: name.into(),
            node_type,
            time_created: Some(Utc::now()),
            attributes: toml::Table::new(),
            parts: Vec::new(),
        }
    }

    /// Set the generator string
    pub fn with_generator<S: Into<String>>(mut self, generator: S) -> Self {
        self.generator = Some(generator.into());
        self
    }

    /// Set the collection identity
    pub fn with_collection_id(mut self, id: Uuid) -> Self {
        self.collection_id = Some(id);
        self
    }

    /// Set the creation timestamp
    pub fn with_time_created(mut self, time: DateTime<Utc>) -> Self {
        self.time_created = Some(time);
        self
    }

    /// Set a user attribute
    pub fn with_attribute<S: Into<String>>(mut self, key: S, value: toml::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Declare a data part on this manifest
    pub fn add_part(&mut self, part: DataPartRef) {
        self.parts.push(part);
    }

    /// Decode a manifest from raw `manifest.toml` bytes
    pub fn decode(bytes: &[u8]) -> Result<Manifest> {
        let text = std::str::from_utf8(bytes)?;
        let manifest: Manifest = match toml::from_str(text) {
            Ok(manifest) => manifest,
            Err(parse_err) => return Err(classify_decode_error(text, parse_err)),
        };
        manifest.check_version()?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Encode this manifest to `manifest.toml` bytes
    ///
    /// Output is deterministic: attribute tables encode in sorted key order
    /// and parts in declaration order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let text = toml::to_string_pretty(self)?;
        Ok(text.into_bytes())
    }

    /// Check that the format revision is one this codec understands
    pub fn check_version(&self) -> Result<()> {
        let major = self.format_version.split('.').next().unwrap_or_default();
        if major != EDL_FORMAT_VERSION {
            return Err(Error::version_mismatch(
                EDL_FORMAT_VERSION,
                &self.format_version,
            ));
        }
        Ok(())
    }

    /// Validate structural rules the type system cannot express
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("node name is empty"));
        }
        if self.name.contains('/') || self.name.contains('\\') {
            return Err(Error::validation(format!(
                "node name contains a path separator: {}",
                self.name
            )));
        }
        if !self.parts.is_empty() && self.node_type != NodeType::Dataset {
            return Err(Error::validation(format!(
                "{} nodes cannot declare data parts",
                self.node_type.as_str()
            )));
        }

        let mut seen = HashSet::new();
        for part in &self.parts {
            part.validate()?;
            if !seen.insert(part.filename.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate part filename: {}",
                    part.filename
                )));
            }
        }
        Ok(())
    }
}

impl DataPartRef {
    /// Create a new data part reference
    pub fn new<S: Into<String>>(part_type: S, filename: S) -> Self {
        Self {
            part_type: part_type.into(),
            filename: filename.into(),
            checksum: None,
            extra: toml::Table::new(),
        }
    }

    /// Set the content digest
    pub fn with_checksum<S: Into<String>>(mut self, checksum: S) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Set a part-specific attribute
    pub fn with_extra<S: Into<String>>(mut self, key: S, value: toml::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Validate this part reference
    pub fn validate(&self) -> Result<()> {
        if self.part_type.trim().is_empty() {
            return Err(Error::validation("part type is empty"));
        }
        if self.filename.trim().is_empty() {
            return Err(Error::validation("part filename is empty"));
        }
        if self.filename.starts_with('/') || self.filename.contains('\\') {
            return Err(Error::validation(format!(
                "part filename must be relative: {}",
                self.filename
            )));
        }
        if self.filename.split('/').any(|component| component == "..") {
            return Err(Error::validation(format!(
                "part filename escapes its dataset: {}",
                self.filename
            )));
        }
        Ok(())
    }
}

/// Re-examine unparseable manifest text to report the most specific error
fn classify_decode_error(text: &str, parse_err: toml::de::Error) -> Error {
    let table: toml::Table = match toml::from_str(text) {
        Ok(table) => table,
        Err(_) => return Error::Parse(parse_err),
    };
    for field in ["name", "type"] {
        if !table.contains_key(field) {
            return Error::missing_field(field);
        }
    }
    if let Some(kind) = table.get("type").and_then(toml::Value::as_str) {
        if let Err(err) = kind.parse::<NodeType>() {
            return err;
        }
    }
    Error::Parse(parse_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_round_trip_structural_equality() {
        let mut manifest = Manifest::new_dataset("frames")
            .with_generator("edl 0.2.0")
            .with_collection_id(Uuid::new_v4())
            .with_attribute("subject_name", toml::Value::String("mouse12".into()))
            .with_attribute("session_length", toml::Value::Integer(900));
        manifest.add_part(
            DataPartRef::new("video", "cam0.mkv")
                .with_checksum("blake3:aa11")
                .with_extra("fps", toml::Value::Integer(30)),
        );
        manifest.add_part(DataPartRef::new("tsync", "clock.tsync"));

        let bytes = manifest.encode().unwrap();
        let decoded = Manifest::decode(&bytes).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let manifest = Manifest::new_group("session")
            .with_time_created(Utc.with_ymd_and_hms(2023, 4, 1, 12, 30, 0).unwrap())
            .with_attribute("b", toml::Value::Integer(2))
            .with_attribute("a", toml::Value::Integer(1));
        assert_eq!(manifest.encode().unwrap(), manifest.encode().unwrap());
    }

    #[test]
    fn test_decode_missing_name() {
        let err = Manifest::decode(b"type = \"group\"\n").unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_decode_missing_type() {
        let err = Manifest::decode(b"name = \"experiment\"\n").unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_decode_invalid_node_type() {
        let err = Manifest::decode(b"name = \"x\"\ntype = \"blob\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidNodeType(_)));
    }

    #[test]
    fn test_decode_rejects_future_major_version() {
        let text = "format_version = \"2\"\nname = \"x\"\ntype = \"group\"\n";
        let err = Manifest::decode(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { .. }));
    }

    #[test]
    fn test_decode_accepts_minor_revisions() {
        let text = "format_version = \"1.1\"\nname = \"x\"\ntype = \"group\"\n";
        let manifest = Manifest::decode(text.as_bytes()).unwrap();
        assert_eq!(manifest.format_version, "1.1");
    }

    #[test]
    fn test_decode_defaults_format_version() {
        let manifest = Manifest::decode(b"name = \"x\"\ntype = \"collection\"\n").unwrap();
        assert_eq!(manifest.format_version, EDL_FORMAT_VERSION);
    }

    #[test]
    fn test_decode_bare_toml_datetime() {
        let text = "name = \"x\"\ntype = \"group\"\ntime_created = 2023-04-01T12:30:00Z\n";
        let manifest = Manifest::decode(text.as_bytes()).unwrap();
        assert_eq!(
            manifest.time_created,
            Some(Utc.with_ymd_and_hms(2023, 4, 1, 12, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_decode_offset_free_datetime_as_utc() {
        let text = "name = \"x\"\ntype = \"group\"\ntime_created = 2023-04-01T12:30:00\n";
        let manifest = Manifest::decode(text.as_bytes()).unwrap();
        assert_eq!(
            manifest.time_created,
            Some(Utc.with_ymd_and_hms(2023, 4, 1, 12, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_decode_string_datetime() {
        let text = "name = \"x\"\ntype = \"group\"\ntime_created = \"2023-04-01T12:30:00+02:00\"\n";
        let manifest = Manifest::decode(text.as_bytes()).unwrap();
        assert_eq!(
            manifest.time_created,
            Some(Utc.with_ymd_and_hms(2023, 4, 1, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_parts_rejected_on_container_nodes() {
        let mut manifest = Manifest::new_group("session");
        manifest.add_part(DataPartRef::new("video", "cam0.mkv"));
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("cannot declare data parts"));
    }

    #[test]
    fn test_duplicate_part_filenames_rejected() {
        let mut manifest = Manifest::new_dataset("frames");
        manifest.add_part(DataPartRef::new("video", "cam0.mkv"));
        manifest.add_part(DataPartRef::new("opaque", "cam0.mkv"));
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate part filename"));
    }

    #[test]
    fn test_escaping_part_filename_rejected() {
        let mut manifest = Manifest::new_dataset("frames");
        manifest.add_part(DataPartRef::new("video", "../cam0.mkv"));
        assert!(manifest.validate().is_err());

        let mut manifest = Manifest::new_dataset("frames");
        manifest.add_part(DataPartRef::new("video", "/abs/cam0.mkv"));
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_new_collection_has_identity() {
        let manifest = Manifest::new_collection("experiment");
        assert_eq!(manifest.node_type, NodeType::Collection);
        assert!(manifest.collection_id.is_some());
        assert!(manifest.time_created.is_some());
    }

    #[test]
    fn test_node_type_strings() {
        assert_eq!(NodeType::Collection.as_str(), "collection");
        assert_eq!(NodeType::Group.as_str(), "group");
        assert_eq!(NodeType::Dataset.as_str(), "dataset");
        assert_eq!("dataset".parse::<NodeType>().unwrap(), NodeType::Dataset);
        assert!("volume".parse::<NodeType>().is_err());
        assert!(NodeType::Group.is_container());
        assert!(!NodeType::Dataset.is_container());
    }

    #[test]
    fn test_unknown_top_level_keys_tolerated() {
        let text = "name = \"x\"\ntype = \"group\"\nfuture_key = 5\n";
        assert!(Manifest::decode(text.as_bytes()).is_ok());
    }
}
