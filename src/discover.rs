/*!
 * Tree discovery and validation
 *
 * Discovery walks an experiment directory, decodes every manifest, checks the
 * structure against the layout rules and verifies data part payloads. The
 * walk itself is sequential and deterministic (directory entries are sorted),
 * payload checks are fanned out over a bounded worker pool.
 *
 * In strict mode the first error aborts the scan. In lenient mode every
 * finding is collected: offending nodes are tagged invalid, the full tree is
 * returned together with a [`ValidationReport`].
 */

use crate::checksum;
use crate::config::{EdlConfig, ValidationMode};
use crate::error::{EdlError, Result};
use crate::parts::{global_registry, PartError, PartRegistry};
use crate::tree::{DataPart, Node, NodeState};
use edl_core_manifest::{sanitize_name, DataPartRef, Manifest, NodeType, MANIFEST_FILENAME};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Cooperative cancellation flag shared with a running discovery
///
/// Cancellation takes effect at node granularity: a node currently being
/// checked finishes, unvisited subtrees are not scheduled. The partial
/// result's report carries `complete = false`.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One validation finding, tied to a node by its name path
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    /// Name path of the node, `.` for the root
    pub node: String,

    /// Part filename when the finding is part-scoped
    pub part: Option<String>,

    pub message: String,
}

impl Finding {
    pub fn new<N, M>(node: N, part: Option<String>, message: M) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        Finding {
            node: node.into(),
            part,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.part {
            Some(part) => write!(f, "{}: {}: {}", self.node, part, self.message),
            None => write!(f, "{}: {}", self.node, self.message),
        }
    }
}

/// Aggregated outcome of one discovery run
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Number of nodes added to the tree
    pub nodes_scanned: usize,

    /// Advisory findings
    pub warnings: Vec<Finding>,

    /// Validity-affecting findings (lenient mode only, strict aborts)
    pub errors: Vec<Finding>,

    /// False when the scan was cancelled before covering the whole tree
    pub complete: bool,
}

impl ValidationReport {
    pub fn new() -> Self {
        ValidationReport {
            nodes_scanned: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            complete: true,
        }
    }

    /// True when the scan produced no findings at all
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }

    /// Print a human-readable summary
    pub fn print(&self) {
        println!("🔍 Scan summary");
        println!("===============\n");
        println!("Nodes scanned: {}", self.nodes_scanned);
        if !self.complete {
            println!("⚠️  Scan was cancelled before completion");
        }
        if self.is_clean() {
            println!("✅ No findings");
            return;
        }
        if !self.errors.is_empty() {
            println!("\n❌ Errors ({}):", self.errors.len());
            for finding in &self.errors {
                println!("   {}", finding);
            }
        }
        if !self.warnings.is_empty() {
            println!("\n⚠️  Warnings ({}):", self.warnings.len());
            for finding in &self.warnings {
                println!("   {}", finding);
            }
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a discovery run: the tree and its report
#[derive(Debug)]
pub struct Discovery {
    pub tree: Node,
    pub report: ValidationReport,
}

/// Discover and validate the experiment directory at `root`
///
/// Uses the global part registry. See [`discover_with`] for custom handler
/// registries and cancellation.
pub fn discover(root: &Path, config: &EdlConfig) -> Result<Discovery> {
    discover_with(root, config, global_registry(), None)
}

/// Full-control discovery with an explicit registry and optional cancellation
pub fn discover_with(
    root: &Path,
    config: &EdlConfig,
    registry: &PartRegistry,
    cancel: Option<&CancelFlag>,
) -> Result<Discovery> {
    if !root.is_dir() {
        return Err(EdlError::structural(
            ".",
            format!("'{}' is not a directory", root.display()),
        ));
    }

    info!(
        root = %root.display(),
        mode = config.mode.as_str(),
        "starting discovery"
    );

    let mut report = ValidationReport::new();
    let (tree, node_jobs) = build_tree(root, config, &mut report, cancel)?;
    let mut tree = match tree {
        Some(tree) => tree,
        None => return Err(EdlError::structural(".", "scan produced no tree")),
    };

    let results = run_part_checks(&node_jobs, config, registry, cancel)?;
    apply_check_results(&mut tree, results, config, &mut report)?;
    finalize_container_states(&mut tree);

    info!(
        nodes = report.nodes_scanned,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "discovery finished"
    );
    Ok(Discovery { tree, report })
}

/// Payload checks queued for one dataset node
struct NodeJobs {
    node_path: String,
    jobs: Vec<PartJob>,
}

struct PartJob {
    reference: DataPartRef,
    file_path: PathBuf,
}

/// Outcome of one dataset's payload checks
struct NodeCheckResult {
    node_path: String,
    skipped: bool,
    warnings: Vec<(Option<String>, String)>,
    errors: Vec<(Option<String>, EdlError)>,
}

fn is_cancelled(cancel: Option<&CancelFlag>) -> bool {
    cancel.map_or(false, |c| c.is_cancelled())
}

/// Walk the directory tree and assemble nodes (sequential phase)
fn build_tree(
    root: &Path,
    config: &EdlConfig,
    report: &mut ValidationReport,
    cancel: Option<&CancelFlag>,
) -> Result<(Option<Node>, Vec<NodeJobs>)> {
    let strict = config.mode == ValidationMode::Strict;
    let mut tree: Option<Node> = None;
    let mut node_jobs: Vec<NodeJobs> = Vec::new();
    // (depth, tree path) of the container nodes on the current walk path
    let mut ancestors: Vec<(usize, String)> = Vec::new();

    let mut it = WalkDir::new(root).sort_by_file_name().into_iter();
    loop {
        let entry = match it.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(err)) => {
                if strict {
                    return Err(err.into());
                }
                report
                    .warnings
                    .push(Finding::new(".", None, format!("walk error: {}", err)));
                continue;
            }
        };

        // the root entry always lands, cancellation cuts the scan after it
        if tree.is_some() && is_cancelled(cancel) {
            debug!("cancellation requested, stopping walk");
            report.complete = false;
            break;
        }
        if !entry.file_type().is_dir() {
            continue;
        }

        let depth = entry.depth();
        let dir = entry.path();
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        while ancestors.last().map_or(false, |(d, _)| *d >= depth) {
            ancestors.pop();
        }

        let manifest_path = dir.join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            if depth == 0 {
                if strict {
                    return Err(EdlError::structural(
                        ".",
                        format!("no {} in root '{}'", MANIFEST_FILENAME, root.display()),
                    ));
                }
                let mut placeholder = Node::new(&dir_name, NodeType::Dataset);
                placeholder.dir = Some(dir.to_path_buf());
                record_node_error(
                    &mut placeholder,
                    ".",
                    format!("no {} in root directory", MANIFEST_FILENAME),
                    report,
                );
                report.nodes_scanned += 1;
                tree = Some(placeholder);
            } else if let Some((_, parent_path)) = ancestors.last() {
                // non-EDL directory inside a container, note it and move on
                let message = format!(
                    "directory '{}' has no {}, skipped",
                    dir_name, MANIFEST_FILENAME
                );
                warn!(node = %parent_path, "{}", message);
                if let Ok(parent) = tree_node_mut(&mut tree, parent_path) {
                    parent.record_warning(&message);
                }
                report
                    .warnings
                    .push(Finding::new(parent_path.clone(), None, message));
            }
            it.skip_current_dir();
            continue;
        }

        let decoded = fs::read(&manifest_path)
            .map_err(EdlError::from)
            .and_then(|bytes| {
                Manifest::decode(&bytes).map_err(|e| EdlError::malformed(&manifest_path, e))
            });
        let manifest = match decoded {
            Ok(manifest) => manifest,
            Err(err) => {
                if strict {
                    return Err(err);
                }
                let node_path = if depth == 0 {
                    String::from(".")
                } else {
                    child_path(ancestors.last(), &dir_name)
                };
                let mut placeholder = Node::new(&dir_name, NodeType::Dataset);
                placeholder.dir = Some(dir.to_path_buf());
                record_node_error(&mut placeholder, &node_path, err.to_string(), report);
                attach_node(&mut tree, &ancestors, placeholder, dir, report)?;
                it.skip_current_dir();
                continue;
            }
        };

        debug!(
            dir = %dir.display(),
            name = %manifest.name,
            kind = manifest.node_type.as_str(),
            "decoded manifest"
        );
        let node_path = if depth == 0 {
            String::from(".")
        } else {
            child_path(ancestors.last(), &manifest.name)
        };

        // collections live only at the root of a tree
        let nested_collection = depth > 0 && manifest.node_type == NodeType::Collection;
        if nested_collection && strict {
            return Err(EdlError::structural(
                node_path,
                "nested collections are not allowed",
            ));
        }

        // directory names are derived from node names on save; the root
        // directory itself is caller-chosen and exempt
        let name_mismatch = depth > 0
            && dir_name != manifest.name
            && dir_name != sanitize_name(&manifest.name);
        if name_mismatch && strict {
            return Err(EdlError::structural(
                node_path,
                format!(
                    "directory name '{}' does not match manifest name '{}'",
                    dir_name, manifest.name
                ),
            ));
        }

        let is_dataset = manifest.node_type == NodeType::Dataset;
        let parts: Vec<DataPart> = manifest
            .parts
            .iter()
            .map(|p| DataPart::from_disk(p.clone(), dir.join(&p.filename)))
            .collect();
        let jobs: Vec<PartJob> = if is_dataset {
            manifest
                .parts
                .iter()
                .map(|p| PartJob {
                    reference: p.clone(),
                    file_path: dir.join(&p.filename),
                })
                .collect()
        } else {
            Vec::new()
        };

        let mut node = Node::from_manifest(manifest, Some(dir.to_path_buf()));
        node.parts = parts;

        if nested_collection {
            record_node_error(
                &mut node,
                &node_path,
                "nested collections are not allowed".to_string(),
                report,
            );
        }
        if name_mismatch {
            let message = format!(
                "directory name '{}' does not match manifest name '{}'",
                dir_name, node.name
            );
            node.record_warning(&message);
            report
                .warnings
                .push(Finding::new(node_path.clone(), None, message));
        }

        if is_dataset {
            check_dataset_dir(dir, &mut node, &node_path, strict, report)?;
            node_jobs.push(NodeJobs {
                node_path: node_path.clone(),
                jobs,
            });
        } else {
            check_container_dir(dir, &mut node, &node_path, strict, report)?;
        }

        attach_node(&mut tree, &ancestors, node, dir, report)?;
        if is_dataset {
            it.skip_current_dir();
        } else {
            ancestors.push((depth, node_path));
        }
    }

    Ok((tree, node_jobs))
}

/// Tree path of a child under an optional parent entry
fn child_path(parent: Option<&(usize, String)>, name: &str) -> String {
    match parent {
        Some((_, parent_path)) if parent_path != "." => format!("{}/{}", parent_path, name),
        _ => name.to_string(),
    }
}

fn tree_node_mut<'a>(tree: &'a mut Option<Node>, path: &str) -> Result<&'a mut Node> {
    match tree {
        Some(root) => root.find_mut(path),
        None => Err(EdlError::node_not_found(path)),
    }
}

fn record_node_error(
    node: &mut Node,
    node_path: &str,
    message: String,
    report: &mut ValidationReport,
) {
    warn!(node = %node_path, "{}", message);
    node.record_error(&message);
    report
        .errors
        .push(Finding::new(node_path.to_string(), None, message));
}

/// Attach a node under the current ancestor, the root entry becomes the tree
fn attach_node(
    tree: &mut Option<Node>,
    ancestors: &[(usize, String)],
    node: Node,
    dir: &Path,
    report: &mut ValidationReport,
) -> Result<()> {
    report.nodes_scanned += 1;
    match ancestors.last() {
        None => {
            // children of skipped directories are never yielded, so an empty
            // ancestor stack only occurs for the root entry
            if tree.is_none() {
                *tree = Some(node);
            }
            Ok(())
        }
        Some((_, parent_path)) => {
            let parent = tree_node_mut(tree, parent_path)?;
            if let Some(existing) = parent.child(&node.name) {
                // two directories claiming one name is unrecoverable in any mode
                let existing_dir = existing
                    .dir
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                return Err(EdlError::structural(
                    parent_path.clone(),
                    format!(
                        "directories '{}' and '{}' both declare node name '{}'",
                        existing_dir,
                        dir.display(),
                        node.name
                    ),
                ));
            }
            parent.add_child(node)?;
            Ok(())
        }
    }
}

/// Check a dataset directory for undeclared entries
fn check_dataset_dir(
    dir: &Path,
    node: &mut Node,
    node_path: &str,
    strict: bool,
    report: &mut ValidationReport,
) -> Result<()> {
    let mut declared_files: HashSet<String> = HashSet::new();
    let mut declared_dirs: HashSet<String> = HashSet::new();
    if let Some(manifest) = &node.manifest {
        for part in &manifest.parts {
            declared_files.insert(part.filename.clone());
            if let Some((first, _)) = part.filename.split_once('/') {
                declared_dirs.insert(first.to_string());
            }
        }
    }

    let entries = match sorted_dir_entries(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if strict {
                return Err(err.into());
            }
            record_node_error(
                node,
                node_path,
                format!("cannot list directory: {}", err),
                report,
            );
            return Ok(());
        }
    };

    for (name, entry_is_dir) in entries {
        if entry_is_dir {
            if !declared_dirs.contains(name.as_str()) {
                let message = format!("dataset contains undeclared subdirectory '{}'", name);
                if strict {
                    return Err(EdlError::structural(node_path.to_string(), message));
                }
                record_node_error(node, node_path, message, report);
            }
        } else if name != MANIFEST_FILENAME && !declared_files.contains(name.as_str()) {
            let message = format!("undeclared file '{}'", name);
            if strict {
                return Err(EdlError::structural(node_path.to_string(), message));
            }
            warn!(node = %node_path, "{}", message);
            node.record_warning(&message);
            report
                .warnings
                .push(Finding::new(node_path.to_string(), None, message));
        }
    }
    Ok(())
}

/// Check a collection/group directory for stray files
fn check_container_dir(
    dir: &Path,
    node: &mut Node,
    node_path: &str,
    strict: bool,
    report: &mut ValidationReport,
) -> Result<()> {
    let entries = match sorted_dir_entries(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if strict {
                return Err(err.into());
            }
            record_node_error(
                node,
                node_path,
                format!("cannot list directory: {}", err),
                report,
            );
            return Ok(());
        }
    };

    for (name, entry_is_dir) in entries {
        if !entry_is_dir && name != MANIFEST_FILENAME {
            let message = format!("stray file '{}' in {} directory", name, node.kind.as_str());
            if strict {
                return Err(EdlError::structural(node_path.to_string(), message));
            }
            warn!(node = %node_path, "{}", message);
            node.record_warning(&message);
            report
                .warnings
                .push(Finding::new(node_path.to_string(), None, message));
        }
    }
    Ok(())
}

fn sorted_dir_entries(dir: &Path) -> std::io::Result<Vec<(String, bool)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let entry_is_dir = entry.file_type()?.is_dir();
        entries.push((entry.file_name().to_string_lossy().into_owned(), entry_is_dir));
    }
    entries.sort();
    Ok(entries)
}

/// Run queued payload checks, parallel when more than one worker is configured
fn run_part_checks(
    node_jobs: &[NodeJobs],
    config: &EdlConfig,
    registry: &PartRegistry,
    cancel: Option<&CancelFlag>,
) -> Result<Vec<NodeCheckResult>> {
    let workers = config.effective_worker_count();
    if workers <= 1 || node_jobs.len() <= 1 {
        return Ok(node_jobs
            .iter()
            .map(|nj| check_node(nj, config, registry, cancel))
            .collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| EdlError::config(format!("worker pool: {}", e)))?;
    Ok(pool.install(|| {
        node_jobs
            .par_iter()
            .map(|nj| check_node(nj, config, registry, cancel))
            .collect()
    }))
}

/// Check every declared part of one dataset node
fn check_node(
    node_jobs: &NodeJobs,
    config: &EdlConfig,
    registry: &PartRegistry,
    cancel: Option<&CancelFlag>,
) -> NodeCheckResult {
    let mut result = NodeCheckResult {
        node_path: node_jobs.node_path.clone(),
        skipped: false,
        warnings: Vec::new(),
        errors: Vec::new(),
    };
    if is_cancelled(cancel) {
        result.skipped = true;
        return result;
    }

    for job in &node_jobs.jobs {
        let filename = &job.reference.filename;
        match fs::metadata(&job.file_path) {
            Err(_) => {
                result.errors.push((
                    Some(filename.clone()),
                    EdlError::invalid_part(
                        result.node_path.clone(),
                        filename.clone(),
                        "declared file is missing",
                    ),
                ));
                continue;
            }
            Ok(meta) if !meta.is_file() => {
                result.errors.push((
                    Some(filename.clone()),
                    EdlError::invalid_part(
                        result.node_path.clone(),
                        filename.clone(),
                        "declared file is not a regular file",
                    ),
                ));
                continue;
            }
            Ok(_) => {}
        }

        if config.verify_checksums {
            if let Some(declared) = &job.reference.checksum {
                match checksum::tagged_algorithm(declared) {
                    None => {
                        result.errors.push((
                            Some(filename.clone()),
                            EdlError::invalid_part(
                                result.node_path.clone(),
                                filename.clone(),
                                format!("unsupported checksum algorithm in '{}'", declared),
                            ),
                        ));
                    }
                    Some(algorithm) => {
                        match checksum::compute_checksum(&job.file_path, algorithm) {
                            Err(err) => result.errors.push((Some(filename.clone()), err)),
                            Ok(actual) => {
                                if !checksum::digests_match(declared, &actual) {
                                    result.errors.push((
                                        Some(filename.clone()),
                                        EdlError::checksum_mismatch(
                                            result.node_path.clone(),
                                            filename.clone(),
                                            declared.clone(),
                                            actual,
                                        ),
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }

        let handler = match registry.resolve(&job.reference.part_type) {
            Some(handler) => handler,
            None => {
                result.warnings.push((
                    Some(filename.clone()),
                    format!(
                        "no handler for part type '{}', treated as opaque",
                        job.reference.part_type
                    ),
                ));
                match registry.fallback() {
                    Some(handler) => handler,
                    None => continue,
                }
            }
        };
        match handler.validate(&job.file_path, &job.reference) {
            Ok(advisories) => {
                for message in advisories {
                    result.warnings.push((Some(filename.clone()), message));
                }
            }
            Err(PartError::Io(err)) => result
                .errors
                .push((Some(filename.clone()), EdlError::Io(err))),
            Err(err) => result.errors.push((
                Some(filename.clone()),
                EdlError::invalid_part(
                    result.node_path.clone(),
                    filename.clone(),
                    err.to_string(),
                ),
            )),
        }
    }
    result
}

/// Fold payload check results into the tree and the report
fn apply_check_results(
    tree: &mut Node,
    results: Vec<NodeCheckResult>,
    config: &EdlConfig,
    report: &mut ValidationReport,
) -> Result<()> {
    let strict = config.mode == ValidationMode::Strict;
    for result in results {
        if result.skipped {
            report.complete = false;
            continue;
        }
        let node = tree.find_mut(&result.node_path)?;
        if strict {
            if let Some((_, err)) = result.errors.into_iter().next() {
                return Err(err);
            }
        } else {
            for (part, err) in result.errors {
                let message = err.to_string();
                warn!(node = %result.node_path, "{}", message);
                node.record_error(&message);
                report
                    .errors
                    .push(Finding::new(result.node_path.clone(), part, message));
            }
        }
        for (part, message) in result.warnings {
            match &part {
                Some(part) => node.record_warning(format!("{}: {}", part, message)),
                None => node.record_warning(&message),
            }
            report
                .warnings
                .push(Finding::new(result.node_path.clone(), part, message));
        }
        if node.state == NodeState::ManifestDecoded {
            node.state = NodeState::Validated;
        }
    }
    Ok(())
}

/// Promote container nodes that collected no errors
fn finalize_container_states(tree: &mut Node) {
    let mut work = vec![tree];
    while let Some(node) = work.pop() {
        if node.kind.is_container() && node.state == NodeState::ManifestDecoded {
            node.state = NodeState::Validated;
        }
        work.extend(node.children_mut().iter_mut());
    }
}
