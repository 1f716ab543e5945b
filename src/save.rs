/*!
 * Tree persistence
 *
 * Saving materializes a tree as an experiment directory: one directory per
 * node, payload files per data part, and (unless disabled) a `manifest.toml`
 * per node written after its payloads so part checksums describe the bytes
 * actually on disk.
 *
 * The write plan is built fully in memory before the first filesystem
 * operation. A mid-commit failure rolls back everything written so far,
 * leaving the destination absent or empty.
 */

use crate::checksum::{compute_buffer_checksum, compute_checksum, HashAlgorithm};
use crate::error::{EdlError, Result};
use crate::tree::{DataPart, Node, PartSource};
use edl_core_manifest::{sanitize_name, Manifest, EDL_FORMAT_VERSION, MANIFEST_FILENAME};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options controlling how a tree is written
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Replace an existing non-empty destination instead of refusing it
    pub overwrite: bool,

    /// Write a `manifest.toml` per node
    pub emit_manifests: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            overwrite: false,
            emit_manifests: true,
        }
    }
}

/// Counters for one completed save
#[derive(Debug, Clone)]
pub struct SaveReport {
    /// Payload files written
    pub files_written: usize,

    /// Manifests written
    pub manifests_written: usize,

    /// Total bytes written, payloads and manifests
    pub bytes_written: u64,
}

impl SaveReport {
    pub fn new() -> Self {
        SaveReport {
            files_written: 0,
            manifests_written: 0,
            bytes_written: 0,
        }
    }

    /// Print a human-readable summary
    pub fn print(&self) {
        println!("💾 Save summary");
        println!("===============\n");
        println!("Files written:     {}", self.files_written);
        println!("Manifests written: {}", self.manifests_written);
        println!("Bytes written:     {}", self.bytes_written);
    }
}

impl Default for SaveReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a tree to `dest`, the directory that becomes the tree's root
pub fn save(tree: &Node, dest: &Path, options: &SaveOptions) -> Result<SaveReport> {
    if tree.has_invalid() {
        return Err(EdlError::structural(
            ".",
            "tree contains invalid nodes, refusing to save",
        ));
    }

    let mut plan = Vec::new();
    build_plan(tree, ".", dest, &mut plan)?;
    info!(dest = %dest.display(), nodes = plan.len(), "saving tree");

    let created_dest = prepare_destination(dest, options)?;
    let mut created: Vec<PathBuf> = Vec::new();
    if created_dest {
        created.push(dest.to_path_buf());
    }

    let mut report = SaveReport::new();
    match commit(&plan, options, &mut created, &mut report) {
        Ok(()) => {
            info!(
                files = report.files_written,
                manifests = report.manifests_written,
                bytes = report.bytes_written,
                "save complete"
            );
            Ok(report)
        }
        Err(err) => {
            warn!(dest = %dest.display(), "save failed, rolling back: {}", err);
            rollback(&created);
            Err(err)
        }
    }
}

/// One node of the write plan
struct NodePlan<'a> {
    node_path: String,
    dir: PathBuf,
    node: &'a Node,
}

/// Assemble the plan and check that sibling directory names stay unique
fn build_plan<'a>(
    node: &'a Node,
    node_path: &str,
    dir: &Path,
    plan: &mut Vec<NodePlan<'a>>,
) -> Result<()> {
    plan.push(NodePlan {
        node_path: node_path.to_string(),
        dir: dir.to_path_buf(),
        node,
    });

    let mut dir_names: HashMap<String, &str> = HashMap::new();
    for child in node.children() {
        let dir_name = sanitize_name(&child.name);
        if let Some(existing) = dir_names.insert(dir_name.clone(), child.name.as_str()) {
            return Err(EdlError::structural(
                node_path.to_string(),
                format!(
                    "child nodes '{}' and '{}' map to the same directory name '{}'",
                    existing, child.name, dir_name
                ),
            ));
        }
        let child_path = if node_path == "." {
            child.name.clone()
        } else {
            format!("{}/{}", node_path, child.name)
        };
        build_plan(child, &child_path, &dir.join(&dir_name), plan)?;
    }
    Ok(())
}

/// Make `dest` an empty directory, respecting the overwrite option
///
/// Returns true when the directory was created (or replaced) here, so a
/// rollback knows to remove it.
fn prepare_destination(dest: &Path, options: &SaveOptions) -> Result<bool> {
    if !dest.exists() {
        fs::create_dir_all(dest)?;
        return Ok(true);
    }
    if dest.is_dir() {
        if fs::read_dir(dest)?.next().is_none() {
            return Ok(false);
        }
        if !options.overwrite {
            return Err(EdlError::DestinationNotEmpty {
                path: dest.to_path_buf(),
            });
        }
        info!(dest = %dest.display(), "overwrite set, replacing destination");
        fs::remove_dir_all(dest)?;
        fs::create_dir(dest)?;
        Ok(true)
    } else {
        if !options.overwrite {
            return Err(EdlError::DestinationNotEmpty {
                path: dest.to_path_buf(),
            });
        }
        fs::remove_file(dest)?;
        fs::create_dir(dest)?;
        Ok(true)
    }
}

fn commit(
    plan: &[NodePlan<'_>],
    options: &SaveOptions,
    created: &mut Vec<PathBuf>,
    report: &mut SaveReport,
) -> Result<()> {
    for entry in plan {
        ensure_dir(&entry.dir, created)?;
        debug!(dir = %entry.dir.display(), node = %entry.node_path, "writing node");

        let mut digests: HashMap<&str, String> = HashMap::new();
        for part in &entry.node.parts {
            let target = entry.dir.join(&part.reference.filename);
            if let Some(parent) = target.parent() {
                ensure_dir(parent, created)?;
            }
            let digest = write_payload(entry, part, &target, created, report)?;
            digests.insert(part.reference.filename.as_str(), digest);
        }
        if options.emit_manifests {
            write_manifest(entry, &digests, created, report)?;
        }
    }
    Ok(())
}

/// Write one payload file, returning its content digest
fn write_payload(
    entry: &NodePlan<'_>,
    part: &DataPart,
    target: &Path,
    created: &mut Vec<PathBuf>,
    report: &mut SaveReport,
) -> Result<String> {
    // track before writing so a partial file is removed on rollback
    created.push(target.to_path_buf());
    let digest = match &part.source {
        PartSource::Disk(source) => {
            let bytes = fs::copy(source, target)?;
            report.bytes_written += bytes;
            match &part.reference.checksum {
                Some(digest) => digest.clone(),
                None => compute_checksum(target, HashAlgorithm::default())?,
            }
        }
        PartSource::Transform { source, transform } => {
            let raw = fs::read(source)?;
            let rendered = transform.render(&raw).map_err(|e| {
                EdlError::invalid_part(
                    entry.node_path.clone(),
                    part.reference.filename.clone(),
                    e.to_string(),
                )
            })?;
            fs::write(target, &rendered)?;
            report.bytes_written += rendered.len() as u64;
            compute_buffer_checksum(&rendered, HashAlgorithm::default())
        }
        PartSource::Inline(bytes) => {
            fs::write(target, bytes)?;
            report.bytes_written += bytes.len() as u64;
            compute_buffer_checksum(bytes, HashAlgorithm::default())
        }
    };
    report.files_written += 1;
    Ok(digest)
}

/// Write the node's manifest with checksums of the bytes just written
fn write_manifest(
    entry: &NodePlan<'_>,
    digests: &HashMap<&str, String>,
    created: &mut Vec<PathBuf>,
    report: &mut SaveReport,
) -> Result<()> {
    let mut manifest = match &entry.node.manifest {
        Some(manifest) => manifest.clone(),
        None => fallback_manifest(entry.node),
    };
    manifest.parts = entry
        .node
        .parts
        .iter()
        .map(|part| {
            let mut reference = part.reference.clone();
            if let Some(digest) = digests.get(part.reference.filename.as_str()) {
                reference.checksum = Some(digest.clone());
            }
            reference
        })
        .collect();

    let target = entry.dir.join(MANIFEST_FILENAME);
    let bytes = manifest
        .encode()
        .map_err(|e| EdlError::malformed(&target, e))?;
    created.push(target.clone());
    fs::write(&target, &bytes)?;
    report.manifests_written += 1;
    report.bytes_written += bytes.len() as u64;
    Ok(())
}

/// Minimal manifest for nodes assembled without one
fn fallback_manifest(node: &Node) -> Manifest {
    Manifest {
        format_version: EDL_FORMAT_VERSION.to_string(),
        generator: None,
        collection_id: None,
        name: node.name.clone(),
        node_type: node.kind,
        time_created: None,
        attributes: toml::Table::new(),
        parts: Vec::new(),
    }
}

/// Create a directory and any missing ancestors, tracking what was created
fn ensure_dir(path: &Path, created: &mut Vec<PathBuf>) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        ensure_dir(parent, created)?;
    }
    fs::create_dir(path)?;
    created.push(path.to_path_buf());
    Ok(())
}

/// Best-effort removal of everything written, children before parents
fn rollback(created: &[PathBuf]) {
    for path in created.iter().rev() {
        let result = if path.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), "rollback failed: {}", err),
        }
    }
}
