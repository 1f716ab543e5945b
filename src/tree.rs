/*!
 * In-memory model of an experiment directory tree
 *
 * A tree is a plain container of [`Node`] values. It enforces structure
 * (sibling names stay unique, datasets stay leaves) but performs no I/O and
 * no validation itself. Discovery builds annotated trees from disk,
 * conversion builds new trees from existing ones, and saving writes a tree
 * back out.
 */

use crate::error::{EdlError, Result};
use crate::parts::PartTransform;
use edl_core_manifest::{DataPartRef, Manifest, NodeType};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle state of a node during discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Directory seen, manifest not decoded yet
    #[default]
    Discovered,

    /// Manifest decoded, payloads not checked yet
    ManifestDecoded,

    /// All checks passed
    Validated,

    /// At least one check failed
    Invalid,
}

/// Where the payload bytes of a data part come from
#[derive(Debug, Clone, PartialEq)]
pub enum PartSource {
    /// Existing file on disk
    Disk(PathBuf),

    /// Existing file, rewritten on save
    Transform {
        source: PathBuf,
        transform: PartTransform,
    },

    /// Bytes held in memory
    Inline(Vec<u8>),
}

/// A data part inside a dataset node
#[derive(Debug, Clone, PartialEq)]
pub struct DataPart {
    /// Manifest entry describing the part
    pub reference: DataPartRef,

    /// Where the payload bytes come from
    pub source: PartSource,
}

impl DataPart {
    /// Create a part backed by a file on disk
    pub fn from_disk(reference: DataPartRef, path: PathBuf) -> Self {
        DataPart {
            reference,
            source: PartSource::Disk(path),
        }
    }
}

/// One node of an experiment directory tree
#[derive(Debug, Clone)]
pub struct Node {
    /// Node name, unique among its siblings
    pub name: String,

    /// Collection, group or dataset
    pub kind: NodeType,

    /// Decoded manifest, if one exists for this node
    pub manifest: Option<Manifest>,

    /// Source directory on disk, if the node was discovered
    pub dir: Option<PathBuf>,

    /// Data parts of a dataset node
    pub parts: Vec<DataPart>,

    /// Discovery lifecycle state
    pub state: NodeState,

    /// Advisory findings recorded against this node
    pub warnings: Vec<String>,

    /// Validity-affecting findings recorded against this node
    pub errors: Vec<String>,

    children: Vec<Node>,
}

impl Node {
    /// Create a bare node with no manifest
    pub fn new<S: Into<String>>(name: S, kind: NodeType) -> Self {
        Node {
            name: name.into(),
            kind,
            manifest: None,
            dir: None,
            parts: Vec::new(),
            state: NodeState::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create a node from a decoded manifest
    pub fn from_manifest(manifest: Manifest, dir: Option<PathBuf>) -> Self {
        let mut node = Node::new(manifest.name.clone(), manifest.node_type);
        node.state = NodeState::ManifestDecoded;
        node.manifest = Some(manifest);
        node.dir = dir;
        node
    }

    /// Attach a manifest to this node
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Collection id recorded in this node's manifest
    pub fn collection_id(&self) -> Option<Uuid> {
        self.manifest.as_ref().and_then(|m| m.collection_id)
    }

    /// Add a child node, keeping children sorted by name
    ///
    /// Fails when this node is a dataset or when a sibling already carries
    /// the child's name. Nodes without a collection id inherit this node's
    /// id across the inserted subtree.
    pub fn add_child(&mut self, child: Node) -> Result<&mut Node> {
        if !self.kind.is_container() {
            return Err(EdlError::structural(
                &self.name,
                "dataset nodes cannot have children",
            ));
        }
        if self.children.iter().any(|c| c.name == child.name) {
            return Err(EdlError::structural(
                &self.name,
                format!("a child named '{}' already exists", child.name),
            ));
        }

        let idx = self.children.partition_point(|c| c.name < child.name);
        self.children.insert(idx, child);

        if let Some(id) = self.collection_id() {
            propagate_collection_id(&mut self.children[idx], id);
        }
        Ok(&mut self.children[idx])
    }

    /// Direct children in name order
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Direct children with mutable access
    pub fn children_mut(&mut self) -> &mut [Node] {
        &mut self.children
    }

    /// Direct child by name
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct child by name with mutable access
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Child datasets of this node
    pub fn datasets(&self) -> Vec<&Node> {
        self.children
            .iter()
            .filter(|c| c.kind == NodeType::Dataset)
            .collect()
    }

    /// Child groups of this node
    pub fn groups(&self) -> Vec<&Node> {
        self.children
            .iter()
            .filter(|c| c.kind == NodeType::Group)
            .collect()
    }

    /// Child dataset by name
    pub fn dataset_by_name(&self, name: &str) -> Option<&Node> {
        self.child(name).filter(|c| c.kind == NodeType::Dataset)
    }

    /// Child group by name
    pub fn group_by_name(&self, name: &str) -> Option<&Node> {
        self.child(name).filter(|c| c.kind == NodeType::Group)
    }

    /// Look up a node by slash-separated name path
    ///
    /// The path is relative to this node. Empty segments and `.` are
    /// ignored, so `find(".")` and `find("")` return this node itself.
    pub fn find(&self, path: &str) -> Result<&Node> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            node = node
                .child(segment)
                .ok_or_else(|| EdlError::node_not_found(path))?;
        }
        Ok(node)
    }

    /// Look up a node by slash-separated name path with mutable access
    pub fn find_mut(&mut self, path: &str) -> Result<&mut Node> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            node = node
                .child_mut(segment)
                .ok_or_else(|| EdlError::node_not_found(path))?;
        }
        Ok(node)
    }

    /// Iterate over this subtree in depth-first pre-order
    ///
    /// The iterator is lazy and borrows the tree, so it can be dropped
    /// partway and a fresh one started from the beginning at any time.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Like [`walk`](Node::walk), but yields each node with its name path
    ///
    /// This node is yielded as `.`, descendants as slash-separated paths
    /// relative to it.
    pub fn walk_with_paths(&self) -> WalkPaths<'_> {
        WalkPaths {
            stack: vec![(String::from("."), self)],
        }
    }

    /// Record an advisory finding against this node
    pub fn record_warning<S: Into<String>>(&mut self, message: S) {
        self.warnings.push(message.into());
    }

    /// Record a validity-affecting finding and mark the node invalid
    pub fn record_error<S: Into<String>>(&mut self, message: S) {
        self.errors.push(message.into());
        self.state = NodeState::Invalid;
    }

    /// True when any node in this subtree is invalid
    pub fn has_invalid(&self) -> bool {
        self.walk().any(|n| n.state == NodeState::Invalid)
    }
}

fn propagate_collection_id(node: &mut Node, id: Uuid) {
    let mut work = vec![node];
    while let Some(n) = work.pop() {
        if let Some(manifest) = n.manifest.as_mut() {
            if manifest.collection_id.is_none() {
                manifest.collection_id = Some(id);
            }
        }
        work.extend(n.children.iter_mut());
    }
}

/// Depth-first pre-order iterator over a subtree
pub struct Walk<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Pre-order iterator yielding nodes with their name paths
pub struct WalkPaths<'a> {
    stack: Vec<(String, &'a Node)>,
}

impl<'a> Iterator for WalkPaths<'a> {
    type Item = (String, &'a Node);

    fn next(&mut self) -> Option<(String, &'a Node)> {
        let (path, node) = self.stack.pop()?;
        for child in node.children.iter().rev() {
            let child_path = if path == "." {
                child.name.clone()
            } else {
                format!("{}/{}", path, child.name)
            };
            self.stack.push((child_path, child));
        }
        Some((path, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Node {
        let mut root = Node::new("experiment1", NodeType::Collection);
        let mut subject = Node::new("subject1", NodeType::Group);
        subject
            .add_child(Node::new("videos", NodeType::Dataset))
            .unwrap();
        subject
            .add_child(Node::new("events", NodeType::Dataset))
            .unwrap();
        root.add_child(subject).unwrap();
        root.add_child(Node::new("notes", NodeType::Dataset))
            .unwrap();
        root
    }

    #[test]
    fn test_add_child_keeps_name_order() {
        let mut root = Node::new("root", NodeType::Collection);
        root.add_child(Node::new("c", NodeType::Group)).unwrap();
        root.add_child(Node::new("a", NodeType::Group)).unwrap();
        root.add_child(Node::new("b", NodeType::Dataset)).unwrap();

        let names: Vec<&str> = root.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_add_child_rejects_duplicate_sibling() {
        let mut root = Node::new("root", NodeType::Collection);
        root.add_child(Node::new("sub", NodeType::Group)).unwrap();

        let err = root
            .add_child(Node::new("sub", NodeType::Dataset))
            .unwrap_err();
        assert!(err.to_string().contains("'sub'"));
    }

    #[test]
    fn test_add_child_rejects_children_under_dataset() {
        let mut dataset = Node::new("videos", NodeType::Dataset);
        let err = dataset
            .add_child(Node::new("more", NodeType::Dataset))
            .unwrap_err();
        assert!(err.to_string().contains("dataset"));
    }

    #[test]
    fn test_add_child_propagates_collection_id() {
        let id = Uuid::new_v4();
        let mut root = Node::new("root", NodeType::Collection)
            .with_manifest(Manifest::new_collection("root").with_collection_id(id));

        let mut group =
            Node::new("sub", NodeType::Group).with_manifest(Manifest::new_group("sub"));
        group
            .add_child(
                Node::new("videos", NodeType::Dataset)
                    .with_manifest(Manifest::new_dataset("videos")),
            )
            .unwrap();

        root.add_child(group).unwrap();
        let videos = root.find("sub/videos").unwrap();
        assert_eq!(videos.collection_id(), Some(id));
    }

    #[test]
    fn test_find_by_name_path() {
        let root = sample_tree();
        assert_eq!(root.find(".").unwrap().name, "experiment1");
        assert_eq!(root.find("subject1/videos").unwrap().name, "videos");

        let err = root.find("subject1/missing").unwrap_err();
        assert!(err.to_string().contains("subject1/missing"));
        assert!(root.find("notes/anything").is_err());
    }

    #[test]
    fn test_walk_is_preorder_and_restartable() {
        let root = sample_tree();
        let order: Vec<&str> = root.walk().map(|n| n.name.as_str()).collect();
        assert_eq!(
            order,
            vec!["experiment1", "notes", "subject1", "events", "videos"]
        );

        // a partially consumed iterator does not affect a fresh one
        let mut partial = root.walk();
        partial.next();
        partial.next();
        drop(partial);
        let order2: Vec<&str> = root.walk().map(|n| n.name.as_str()).collect();
        assert_eq!(order, order2);
    }

    #[test]
    fn test_walk_with_paths() {
        let root = sample_tree();
        let paths: Vec<String> = root.walk_with_paths().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec![
                ".",
                "notes",
                "subject1",
                "subject1/events",
                "subject1/videos"
            ]
        );
    }

    #[test]
    fn test_kind_filters() {
        let root = sample_tree();
        assert_eq!(root.datasets().len(), 1);
        assert_eq!(root.groups().len(), 1);
        assert!(root.dataset_by_name("notes").is_some());
        assert!(root.dataset_by_name("subject1").is_none());
        assert!(root.group_by_name("subject1").is_some());
    }

    #[test]
    fn test_record_error_marks_invalid() {
        let mut root = sample_tree();
        assert!(!root.has_invalid());

        root.find_mut("subject1/videos")
            .unwrap()
            .record_error("declared file 'cam0.mkv' is missing");
        assert!(root.has_invalid());
        assert_eq!(root.find("subject1/videos").unwrap().errors.len(), 1);
        assert_eq!(
            root.find("subject1/videos").unwrap().state,
            NodeState::Invalid
        );
    }
}
