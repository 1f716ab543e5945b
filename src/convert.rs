/*!
 * Schema-driven tree conversion
 *
 * A [`SchemaDescriptor`] declares how a source tree maps onto a target
 * layout: which part types carry over (and under what name, type and
 * transform), whether the hierarchy is preserved or flattened into a single
 * dataset, and whether the emitted layout carries manifests on disk.
 *
 * Conversion is pure tree-to-tree: the source is never mutated and nothing
 * is written. Payload work is deferred into the part sources of the produced
 * tree ([`PartSource::Disk`] for byte copies, [`PartSource::Transform`] for
 * rewrites) and happens when the tree is saved.
 */

use crate::config::EdlConfig;
use crate::discover::{discover, Finding, ValidationReport};
use crate::error::{EdlError, Result};
use crate::parts::{global_registry, PartData, PartRegistry, PartTransform};
use crate::save::{save, SaveOptions, SaveReport};
use crate::tree::{DataPart, Node, NodeState, PartSource};
use edl_core_manifest::{
    sanitize_name, DataPartRef, Manifest, NodeType, EDL_FORMAT_VERSION,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Generator string stamped into regenerated manifests
const GENERATOR: &str = concat!("edl ", env!("CARGO_PKG_VERSION"));

/// Mapping entry source type that matches any part type
const WILDCARD_TYPE: &str = "*";

/// How the source hierarchy maps onto the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyRule {
    /// Keep the source nesting and node names
    Preserve,

    /// Merge every source dataset's mapped parts into one target dataset
    Flatten,
}

/// How the target tree's root node is named
#[derive(Debug, Clone, PartialEq)]
pub enum NamingRule {
    /// Reuse the sanitized source node name
    SourceName,

    /// Attribute template, e.g. `{SubjectName}_{SessionName}_{StartTime}`.
    ///
    /// Keys resolve against the source root's manifest attributes first,
    /// then against any loadable `json` part in the tree. An unresolvable
    /// key falls back to the sanitized source name with a warning.
    Template(String),
}

/// Renaming rule for one mapped part
#[derive(Debug, Clone, PartialEq)]
pub enum RenameRule {
    /// Fixed target filename
    Fixed(String),

    /// Keep the filename stem, swap the extension
    Extension(String),
}

/// One entry of a descriptor's part mapping table
#[derive(Debug, Clone)]
pub struct PartMapping {
    /// Source part type this entry applies to, `*` matches any
    pub source_type: String,

    /// Part type recorded on the target, `*` keeps the source type
    pub target_type: String,

    /// Target filename rule, `None` keeps the source filename
    pub rename: Option<RenameRule>,

    /// Payload rewrite, `None` copies bytes verbatim
    pub transform: Option<PartTransform>,
}

impl PartMapping {
    /// Map one part type onto another
    pub fn new<S: Into<String>, T: Into<String>>(source_type: S, target_type: T) -> Self {
        PartMapping {
            source_type: source_type.into(),
            target_type: target_type.into(),
            rename: None,
            transform: None,
        }
    }

    /// Pass every part through unchanged
    pub fn identity() -> Self {
        PartMapping::new(WILDCARD_TYPE, WILDCARD_TYPE)
    }

    /// Set the target filename rule
    pub fn with_rename(mut self, rename: RenameRule) -> Self {
        self.rename = Some(rename);
        self
    }

    /// Set the payload transform
    pub fn with_transform(mut self, transform: PartTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Conversion target description
///
/// Stateless value, supplied by the caller. [`SchemaDescriptor::by_id`]
/// resolves the built-in targets.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    /// Schema identifier (e.g. "moseq")
    pub id: String,

    pub hierarchy: HierarchyRule,

    pub naming: NamingRule,

    /// Whether the emitted layout carries `manifest.toml` files
    pub emit_manifests: bool,

    /// Source part types that must be present in the source and mapped
    pub required_types: Vec<String>,

    /// Part mapping table, first matching entry wins
    pub mappings: Vec<PartMapping>,

    /// Attributes forced onto every regenerated manifest
    pub attribute_overrides: toml::Table,
}

impl SchemaDescriptor {
    /// Look up a built-in schema by identifier
    pub fn by_id(id: &str) -> Option<SchemaDescriptor> {
        match id {
            "edl" => Some(Self::edl()),
            "moseq" => Some(Self::moseq()),
            _ => None,
        }
    }

    /// Identifiers of the built-in schemas
    pub fn builtin_ids() -> &'static [&'static str] {
        &["edl", "moseq"]
    }

    /// Identity re-emit: same hierarchy, same parts, regenerated manifests
    pub fn edl() -> Self {
        SchemaDescriptor {
            id: "edl".to_string(),
            hierarchy: HierarchyRule::Preserve,
            naming: NamingRule::SourceName,
            emit_manifests: true,
            required_types: Vec::new(),
            mappings: vec![PartMapping::identity()],
            attribute_overrides: toml::Table::new(),
        }
    }

    /// MoSeq single-session layout
    ///
    /// Flattens the tree into one directory named from the acquisition
    /// metadata, with the depth video, its timestamps rendered as text and
    /// the session metadata. No manifests are written.
    pub fn moseq() -> Self {
        SchemaDescriptor {
            id: "moseq".to_string(),
            hierarchy: HierarchyRule::Flatten,
            naming: NamingRule::Template(
                "{SubjectName}_{SessionName}_{StartTime}".to_string(),
            ),
            emit_manifests: false,
            required_types: vec!["video".to_string(), "tsync".to_string()],
            mappings: vec![
                PartMapping::new("video", "video")
                    .with_rename(RenameRule::Fixed("depth.avi".to_string())),
                PartMapping::new("tsync", "opaque")
                    .with_rename(RenameRule::Fixed("depth_ts.txt".to_string()))
                    .with_transform(PartTransform::TimestampsText),
                PartMapping::new("json", "json")
                    .with_rename(RenameRule::Fixed("metadata.json".to_string())),
            ],
            attribute_overrides: toml::Table::new(),
        }
    }

    /// First mapping entry matching a source part type
    pub fn mapping_for(&self, source_type: &str) -> Option<&PartMapping> {
        self.mappings
            .iter()
            .find(|m| m.source_type == source_type)
            .or_else(|| self.mappings.iter().find(|m| m.source_type == WILDCARD_TYPE))
    }

    fn is_required(&self, source_type: &str) -> bool {
        self.required_types.iter().any(|t| t == source_type)
    }
}

/// Result of a conversion: the target tree and its report
#[derive(Debug)]
pub struct Conversion {
    pub tree: Node,
    pub report: ValidationReport,
}

/// Convert a source tree into the layout a descriptor declares
///
/// Uses the global part registry. See [`convert_with`] for custom handler
/// registries.
pub fn convert(source: &Node, descriptor: &SchemaDescriptor) -> Result<Conversion> {
    convert_with(source, descriptor, global_registry())
}

/// Conversion with an explicit part registry
pub fn convert_with(
    source: &Node,
    descriptor: &SchemaDescriptor,
    registry: &PartRegistry,
) -> Result<Conversion> {
    if source.has_invalid() {
        return Err(EdlError::structural(
            ".",
            "source tree contains invalid nodes, fix them before converting",
        ));
    }
    check_required_types(source, descriptor)?;

    info!(
        schema = %descriptor.id,
        source = %source.name,
        "converting tree"
    );
    let mut report = ValidationReport::new();
    let tree = match descriptor.hierarchy {
        HierarchyRule::Preserve => {
            map_node_preserved(source, ".", descriptor, &mut report)?
        }
        HierarchyRule::Flatten => flatten_tree(source, descriptor, registry, &mut report)?,
    };
    report.nodes_scanned = tree.walk().count();

    info!(
        nodes = report.nodes_scanned,
        warnings = report.warnings.len(),
        "conversion finished"
    );
    Ok(Conversion { tree, report })
}

/// Discover, convert and save in one call
pub fn convert_path(
    source_root: &Path,
    dest: &Path,
    descriptor: &SchemaDescriptor,
    config: &EdlConfig,
) -> Result<SaveReport> {
    let discovery = discover(source_root, config)?;
    let conversion = convert(&discovery.tree, descriptor)?;
    let options = SaveOptions {
        overwrite: config.overwrite,
        emit_manifests: descriptor.emit_manifests,
    };
    save(&conversion.tree, dest, &options)
}

/// Fail when a required source part type is absent or unmapped
fn check_required_types(source: &Node, descriptor: &SchemaDescriptor) -> Result<()> {
    let mut present: HashSet<&str> = HashSet::new();
    for node in source.walk() {
        for part in &node.parts {
            present.insert(part.reference.part_type.as_str());
        }
    }
    for required in &descriptor.required_types {
        if !present.contains(required.as_str()) {
            return Err(EdlError::unsupported(format!(
                "source tree has no '{}' part required by schema '{}'",
                required, descriptor.id
            )));
        }
        if descriptor.mapping_for(required).is_none() {
            return Err(EdlError::unsupported(format!(
                "schema '{}' does not map its required type '{}'",
                descriptor.id, required
            )));
        }
    }
    Ok(())
}

/// Regenerate a manifest for one target node
///
/// `time_created` and `collection_id` are carried from the source so
/// conversion output is byte-identical across runs; nothing is re-stamped.
fn regenerate_manifest(
    source: &Node,
    node_type: NodeType,
    name: &str,
    descriptor: &SchemaDescriptor,
) -> Manifest {
    let mut manifest = Manifest {
        format_version: EDL_FORMAT_VERSION.to_string(),
        generator: Some(GENERATOR.to_string()),
        collection_id: None,
        name: name.to_string(),
        node_type,
        time_created: None,
        attributes: toml::Table::new(),
        parts: Vec::new(),
    };
    if let Some(src) = &source.manifest {
        manifest.collection_id = src.collection_id;
        manifest.time_created = src.time_created;
        manifest.attributes = src.attributes.clone();
    }
    for (key, value) in &descriptor.attribute_overrides {
        manifest.attributes.insert(key.clone(), value.clone());
    }
    manifest
}

/// Recursively map a node and its children, keeping the hierarchy
fn map_node_preserved(
    source: &Node,
    source_path: &str,
    descriptor: &SchemaDescriptor,
    report: &mut ValidationReport,
) -> Result<Node> {
    let manifest = regenerate_manifest(source, source.kind, &source.name, descriptor);
    let mut node = Node::from_manifest(manifest, None);
    node.state = NodeState::Validated;

    if source.kind == NodeType::Dataset {
        let parts = map_dataset_parts(source, source_path, descriptor, report)?;
        if let Some(manifest) = &mut node.manifest {
            manifest.parts = parts.iter().map(|p| p.reference.clone()).collect();
        }
        node.parts = parts;
    }

    for child in source.children() {
        let child_path = if source_path == "." {
            child.name.clone()
        } else {
            format!("{}/{}", source_path, child.name)
        };
        let mapped = map_node_preserved(child, &child_path, descriptor, report)?;
        node.add_child(mapped)?;
    }
    Ok(node)
}

/// Merge every source dataset's mapped parts into one target dataset
fn flatten_tree(
    source: &Node,
    descriptor: &SchemaDescriptor,
    registry: &PartRegistry,
    report: &mut ValidationReport,
) -> Result<Node> {
    let name = resolve_target_name(source, descriptor, registry, report);
    debug!(name = %name, "flattened dataset name");

    // target filename -> contributing source part, for collision messages
    let mut origins: HashMap<String, String> = HashMap::new();
    let mut parts: Vec<DataPart> = Vec::new();
    for (path, dataset) in source.walk_with_paths() {
        if dataset.kind != NodeType::Dataset {
            continue;
        }
        for part in map_dataset_parts(dataset, &path, descriptor, report)? {
            let origin = format!("{}: {}", path, part.reference.filename);
            if let Some(previous) = origins.insert(part.reference.filename.clone(), origin) {
                return Err(EdlError::structural(
                    ".",
                    format!(
                        "flattening maps '{}' and '{}: {}' to the same target filename",
                        previous, path, part.reference.filename
                    ),
                ));
            }
            parts.push(part);
        }
    }

    let mut manifest = regenerate_manifest(source, NodeType::Dataset, &name, descriptor);
    manifest.parts = parts.iter().map(|p| p.reference.clone()).collect();
    let mut node = Node::from_manifest(manifest, None);
    node.state = NodeState::Validated;
    node.parts = parts;
    Ok(node)
}

/// Map the parts of one source dataset through the descriptor table
fn map_dataset_parts(
    source: &Node,
    source_path: &str,
    descriptor: &SchemaDescriptor,
    report: &mut ValidationReport,
) -> Result<Vec<DataPart>> {
    let mut parts = Vec::new();
    for part in &source.parts {
        let part_type = part.reference.part_type.as_str();
        let mapping = match descriptor.mapping_for(part_type) {
            Some(mapping) => mapping,
            None => {
                if descriptor.is_required(part_type) {
                    return Err(EdlError::unsupported(format!(
                        "schema '{}' does not map its required type '{}'",
                        descriptor.id, part_type
                    )));
                }
                let message = format!(
                    "part type '{}' has no mapping in schema '{}', dropped",
                    part_type, descriptor.id
                );
                warn!(node = %source_path, part = %part.reference.filename, "{}", message);
                report.warnings.push(Finding::new(
                    source_path.to_string(),
                    Some(part.reference.filename.clone()),
                    message,
                ));
                continue;
            }
        };
        parts.push(apply_mapping(part, mapping, source_path)?);
    }
    Ok(parts)
}

/// Produce the target part for one source part and mapping entry
fn apply_mapping(part: &DataPart, mapping: &PartMapping, source_path: &str) -> Result<DataPart> {
    let target_type = if mapping.target_type == WILDCARD_TYPE {
        part.reference.part_type.clone()
    } else {
        mapping.target_type.clone()
    };
    let filename = match &mapping.rename {
        None => part.reference.filename.clone(),
        Some(RenameRule::Fixed(name)) => name.clone(),
        Some(RenameRule::Extension(ext)) => swap_extension(&part.reference.filename, ext),
    };

    let mut reference = DataPartRef {
        part_type: target_type,
        filename,
        checksum: None,
        extra: part.reference.extra.clone(),
    };
    let source = match (&part.source, &mapping.transform) {
        (PartSource::Disk(path), Some(transform)) => PartSource::Transform {
            source: path.clone(),
            transform: transform.clone(),
        },
        (PartSource::Disk(path), None) => {
            // byte copies keep the content digest
            reference.checksum = part.reference.checksum.clone();
            PartSource::Disk(path.clone())
        }
        (PartSource::Inline(bytes), Some(transform)) => {
            let rendered = transform.render(bytes).map_err(|e| {
                EdlError::invalid_part(
                    source_path.to_string(),
                    part.reference.filename.clone(),
                    e.to_string(),
                )
            })?;
            PartSource::Inline(rendered)
        }
        (PartSource::Inline(bytes), None) => {
            reference.checksum = part.reference.checksum.clone();
            PartSource::Inline(bytes.clone())
        }
        (PartSource::Transform { .. }, _) => {
            return Err(EdlError::unsupported(format!(
                "part '{}' already carries a pending transform",
                part.reference.filename
            )));
        }
    };
    Ok(DataPart { reference, source })
}

/// Swap the extension of a filename, appending when it has none
fn swap_extension(filename: &str, ext: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{}.{}", stem, ext),
        _ => format!("{}.{}", filename, ext),
    }
}

/// Name of the target tree per the descriptor's naming rule
fn resolve_target_name(
    source: &Node,
    descriptor: &SchemaDescriptor,
    registry: &PartRegistry,
    report: &mut ValidationReport,
) -> String {
    let template = match &descriptor.naming {
        NamingRule::SourceName => return sanitize_name(&source.name),
        NamingRule::Template(template) => template,
    };
    match render_template(template, source, registry) {
        Ok(name) => sanitize_name(&name),
        Err(key) => {
            let message = format!(
                "cannot resolve '{{{}}}' for schema '{}' naming, using the source name",
                key, descriptor.id
            );
            warn!(node = %source.name, "{}", message);
            report
                .warnings
                .push(Finding::new(".", None, message));
            sanitize_name(&source.name)
        }
    }
}

/// Substitute `{key}` placeholders; `Err` carries the first unresolved key
fn render_template(
    template: &str,
    source: &Node,
    registry: &PartRegistry,
) -> std::result::Result<String, String> {
    let keys = template_keys(template);
    let mut values: HashMap<String, String> = HashMap::new();
    for key in &keys {
        if let Some(value) = attribute_string(source, key) {
            values.insert(key.clone(), value);
        }
    }
    if values.len() < keys.len() {
        // fall back to acquisition metadata stored as a json part
        let documents = load_json_documents(source, registry);
        for key in &keys {
            if values.contains_key(key) {
                continue;
            }
            if let Some(value) = documents.iter().find_map(|doc| json_string(doc, key)) {
                values.insert(key.clone(), value);
            }
        }
    }

    let mut out = String::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match values.get(key) {
                    Some(value) => out.push_str(value),
                    None => return Err(key.to_string()),
                }
                rest = &after[close + 1..];
            }
            None => {
                // unbalanced brace, keep it literally
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Distinct placeholder keys of a template, in order of first appearance
fn template_keys(template: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                if !keys.iter().any(|k| k == key) {
                    keys.push(key.to_string());
                }
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    keys
}

/// Render a manifest attribute of the source root as template text
fn attribute_string(source: &Node, key: &str) -> Option<String> {
    let manifest = source.manifest.as_ref()?;
    match manifest.attributes.get(key)? {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        _ => None,
    }
}

/// Load every readable `json` part of the tree
fn load_json_documents(source: &Node, registry: &PartRegistry) -> Vec<serde_json::Value> {
    let handler = match registry.resolve("json") {
        Some(handler) => handler,
        None => return Vec::new(),
    };
    let mut documents = Vec::new();
    for node in source.walk() {
        for part in &node.parts {
            if part.reference.part_type != "json" {
                continue;
            }
            let path = match &part.source {
                PartSource::Disk(path) => path,
                _ => continue,
            };
            if let Ok(PartData::Json(value)) = handler.load(path, &part.reference) {
                documents.push(value);
            }
        }
    }
    documents
}

/// Top-level string-like field of a json document as template text
fn json_string(document: &serde_json::Value, key: &str) -> Option<String> {
    match document.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn video_part(filename: &str) -> DataPart {
        DataPart {
            reference: DataPartRef::new("video", filename).with_checksum("blake3:aa11"),
            source: PartSource::Disk(format!("/src/{}", filename).into()),
        }
    }

    fn source_tree() -> Node {
        let manifest = Manifest::new_collection("experiment 1")
            .with_time_created(Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap())
            .with_attribute("SubjectName", toml::Value::String("mouse12".into()));
        let mut root = Node::from_manifest(manifest, None);
        root.state = NodeState::Validated;

        let mut videos = Node::from_manifest(Manifest::new_dataset("videos"), None);
        videos.state = NodeState::Validated;
        videos.parts.push(video_part("cam0.mkv"));
        videos.parts.push(DataPart {
            reference: DataPartRef::new("eventlog", "events.bin"),
            source: PartSource::Disk("/src/events.bin".into()),
        });
        root.add_child(videos).unwrap();
        root
    }

    #[test]
    fn test_identity_schema_preserves_layout() {
        let source = source_tree();
        let conversion = convert_with(&source, &SchemaDescriptor::edl(), &PartRegistry::new())
            .unwrap();

        let tree = conversion.tree;
        assert_eq!(tree.name, "experiment 1");
        assert_eq!(tree.children().len(), 1);
        let videos = tree.child("videos").unwrap();
        assert_eq!(videos.parts.len(), 2);
        assert_eq!(videos.parts[0].reference.part_type, "video");
        assert_eq!(videos.parts[0].reference.filename, "cam0.mkv");
        // identity byte copies keep the declared digest
        assert_eq!(
            videos.parts[0].reference.checksum.as_deref(),
            Some("blake3:aa11")
        );
        assert!(conversion.report.warnings.is_empty());
    }

    #[test]
    fn test_regenerated_manifest_carries_identity() {
        let source = source_tree();
        let source_manifest = source.manifest.clone().unwrap();
        let conversion = convert_with(&source, &SchemaDescriptor::edl(), &PartRegistry::new())
            .unwrap();

        let manifest = conversion.tree.manifest.as_ref().unwrap();
        assert_eq!(manifest.collection_id, source_manifest.collection_id);
        assert_eq!(manifest.time_created, source_manifest.time_created);
        assert_eq!(
            manifest.attributes.get("SubjectName"),
            source_manifest.attributes.get("SubjectName")
        );
        assert!(manifest.generator.as_deref().unwrap_or_default().starts_with("edl "));
    }

    #[test]
    fn test_unmapped_optional_part_dropped_with_warning() {
        let source = source_tree();
        let descriptor = SchemaDescriptor {
            id: "video-only".to_string(),
            hierarchy: HierarchyRule::Preserve,
            naming: NamingRule::SourceName,
            emit_manifests: true,
            required_types: vec!["video".to_string()],
            mappings: vec![PartMapping::new("video", "video")],
            attribute_overrides: toml::Table::new(),
        };

        let conversion = convert_with(&source, &descriptor, &PartRegistry::new()).unwrap();
        let videos = conversion.tree.child("videos").unwrap();
        assert_eq!(videos.parts.len(), 1);
        assert_eq!(conversion.report.warnings.len(), 1);
        assert!(conversion.report.warnings[0].message.contains("eventlog"));
    }

    #[test]
    fn test_missing_required_type_is_fatal() {
        let source = source_tree();
        let mut descriptor = SchemaDescriptor::edl();
        descriptor.required_types = vec!["tsync".to_string()];

        let err = convert_with(&source, &descriptor, &PartRegistry::new()).unwrap_err();
        assert!(matches!(err, EdlError::UnsupportedConversion(_)));
        assert!(err.to_string().contains("tsync"));
    }

    #[test]
    fn test_invalid_source_tree_refused() {
        let mut source = source_tree();
        source
            .find_mut("videos")
            .unwrap()
            .record_error("declared file is missing");

        let err = convert_with(&source, &SchemaDescriptor::edl(), &PartRegistry::new())
            .unwrap_err();
        assert!(err.to_string().contains("invalid nodes"));
    }

    #[test]
    fn test_flatten_merges_datasets() {
        let source = source_tree();
        let descriptor = SchemaDescriptor {
            id: "flat".to_string(),
            hierarchy: HierarchyRule::Flatten,
            naming: NamingRule::SourceName,
            emit_manifests: false,
            required_types: Vec::new(),
            mappings: vec![PartMapping::new("video", "video")
                .with_rename(RenameRule::Fixed("depth.avi".to_string()))],
            attribute_overrides: toml::Table::new(),
        };

        let conversion = convert_with(&source, &descriptor, &PartRegistry::new()).unwrap();
        let tree = conversion.tree;
        assert_eq!(tree.kind, NodeType::Dataset);
        assert_eq!(tree.name, "experiment 1");
        assert!(tree.children().is_empty());
        assert_eq!(tree.parts.len(), 1);
        assert_eq!(tree.parts[0].reference.filename, "depth.avi");
    }

    #[test]
    fn test_flatten_filename_collision_is_fatal() {
        let mut source = source_tree();
        let mut more = Node::from_manifest(Manifest::new_dataset("videos2"), None);
        more.state = NodeState::Validated;
        more.parts.push(video_part("cam0.mkv"));
        source.add_child(more).unwrap();

        let descriptor = SchemaDescriptor {
            id: "flat".to_string(),
            hierarchy: HierarchyRule::Flatten,
            naming: NamingRule::SourceName,
            emit_manifests: false,
            required_types: Vec::new(),
            mappings: vec![PartMapping::identity()],
            attribute_overrides: toml::Table::new(),
        };

        let err = convert_with(&source, &descriptor, &PartRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("same target filename"));
    }

    #[test]
    fn test_template_resolves_from_attributes() {
        let mut source = source_tree();
        if let Some(manifest) = &mut source.manifest {
            manifest
                .attributes
                .insert("Session".to_string(), toml::Value::Integer(7));
        }
        let descriptor = SchemaDescriptor {
            id: "flat".to_string(),
            hierarchy: HierarchyRule::Flatten,
            naming: NamingRule::Template("{SubjectName}_{Session}".to_string()),
            emit_manifests: false,
            required_types: Vec::new(),
            mappings: vec![PartMapping::identity()],
            attribute_overrides: toml::Table::new(),
        };

        let conversion = convert_with(&source, &descriptor, &PartRegistry::new()).unwrap();
        assert_eq!(conversion.tree.name, "mouse12_7");
    }

    #[test]
    fn test_template_fallback_warns_and_uses_source_name() {
        let source = source_tree();
        let descriptor = SchemaDescriptor {
            id: "flat".to_string(),
            hierarchy: HierarchyRule::Flatten,
            naming: NamingRule::Template("{NoSuchKey}".to_string()),
            emit_manifests: false,
            required_types: Vec::new(),
            mappings: vec![PartMapping::identity()],
            attribute_overrides: toml::Table::new(),
        };

        let conversion = convert_with(&source, &descriptor, &PartRegistry::new()).unwrap();
        assert_eq!(conversion.tree.name, "experiment 1");
        assert!(conversion
            .report
            .warnings
            .iter()
            .any(|w| w.message.contains("NoSuchKey")));
    }

    #[test]
    fn test_attribute_overrides_win() {
        let source = source_tree();
        let mut descriptor = SchemaDescriptor::edl();
        descriptor.attribute_overrides.insert(
            "SubjectName".to_string(),
            toml::Value::String("renamed".into()),
        );

        let conversion = convert_with(&source, &descriptor, &PartRegistry::new()).unwrap();
        let manifest = conversion.tree.manifest.as_ref().unwrap();
        assert_eq!(
            manifest.attributes.get("SubjectName"),
            Some(&toml::Value::String("renamed".into()))
        );
    }

    #[test]
    fn test_transform_mapping_changes_type_and_extension() {
        let mut source = source_tree();
        source
            .find_mut("videos")
            .unwrap()
            .parts
            .push(DataPart {
                reference: DataPartRef::new("table:csv", "positions.csv")
                    .with_checksum("blake3:bb22")
                    .with_extra("recorder", toml::Value::String("tracker".into())),
                source: PartSource::Disk("/src/positions.csv".into()),
            });
        let mut descriptor = SchemaDescriptor::edl();
        descriptor.mappings.insert(
            0,
            PartMapping::new("table:csv", "table:tsv")
                .with_rename(RenameRule::Extension("tsv".to_string()))
                .with_transform(PartTransform::TableDelimiter {
                    from: b',',
                    to: b'\t',
                }),
        );

        let conversion = convert_with(&source, &descriptor, &PartRegistry::new()).unwrap();
        let videos = conversion.tree.child("videos").unwrap();
        let table = videos
            .parts
            .iter()
            .find(|p| p.reference.filename == "positions.tsv")
            .unwrap();
        assert_eq!(table.reference.part_type, "table:tsv");
        // transformed bytes get a fresh digest at save time
        assert!(table.reference.checksum.is_none());
        assert_eq!(
            table.reference.extra.get("recorder"),
            Some(&toml::Value::String("tracker".into()))
        );
        assert!(matches!(
            table.source,
            PartSource::Transform {
                transform: PartTransform::TableDelimiter { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let source = source_tree();
        let a = convert_with(&source, &SchemaDescriptor::edl(), &PartRegistry::new()).unwrap();
        let b = convert_with(&source, &SchemaDescriptor::edl(), &PartRegistry::new()).unwrap();
        let bytes_a = a.tree.manifest.as_ref().unwrap().encode().unwrap();
        let bytes_b = b.tree.manifest.as_ref().unwrap().encode().unwrap();
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn test_swap_extension() {
        assert_eq!(swap_extension("positions.csv", "tsv"), "positions.tsv");
        assert_eq!(swap_extension("archive.tar.gz", "zst"), "archive.tar.zst");
        assert_eq!(swap_extension("README", "txt"), "README.txt");
    }

    #[test]
    fn test_template_keys() {
        assert_eq!(
            template_keys("{SubjectName}_{SessionName}_{StartTime}"),
            vec!["SubjectName", "SessionName", "StartTime"]
        );
        assert_eq!(template_keys("plain"), Vec::<String>::new());
        assert_eq!(template_keys("{a}-{a}"), vec!["a"]);
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(SchemaDescriptor::by_id("edl").is_some());
        assert!(SchemaDescriptor::by_id("moseq").is_some());
        assert!(SchemaDescriptor::by_id("nwb").is_none());
        assert_eq!(SchemaDescriptor::builtin_ids(), ["edl", "moseq"]);
    }

    #[test]
    fn test_moseq_descriptor_shape() {
        let moseq = SchemaDescriptor::moseq();
        assert_eq!(moseq.hierarchy, HierarchyRule::Flatten);
        assert!(!moseq.emit_manifests);
        assert!(moseq.mapping_for("video").is_some());
        assert!(moseq.mapping_for("tsync").is_some());
        assert!(moseq.mapping_for("eventlog").is_none());
    }
}
