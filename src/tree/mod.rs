// This module defines the decision tree consumed by the code generator. A Tree owns every node
// in an arena indexed by NodeId; split nodes reference their children by id, never by pointer,
// so any stage can look a node up uniformly. Node shape is a two-case enum (split or leaf),
// which makes "cost of a split" statically distinguishable from "prediction of a leaf". Each
// node carries an optional training sample count and a path probability filled in by
// annotate_path_probabilities, which divides a parent's probability between its children in
// proportion to their sample counts. TreeBuilder is the construction collaborator: it assigns
// ids and rejects malformed trees (dangling or shared children, unreachable nodes, feature
// indices outside the input dimension, non-identifier namespaces). The tree is read-only once
// annotated; packing and emission never write to it.

//! Decision tree representation.
//!
//! # Text Format
//!
//! ```text
//! ; Comments start with semicolon
//! tree iris dim 4 float {
//!     root: split 2 <= 2.45 ? setosa : rest samples 150
//!     setosa: leaf 0 samples 50
//!     rest: split 3 <= 1.75 ? versicolor : virginica samples 100
//!     versicolor: leaf 1 samples 54
//!     virginica: leaf 2 samples 46
//! }
//! ```

use std::fmt;
use thiserror::Error;

pub mod parser;

pub use parser::{parse_tree, ParseError};

/// Identifier of a node within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of the node in the tree's arena.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Numeric type of the feature vector passed to the generated predict function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    Float,
    Double,
    Int,
    Short,
    SignedChar,
    UnsignedChar,
    UnsignedShort,
    UnsignedInt,
}

impl FeatureType {
    /// C spelling of the type.
    pub const fn c_name(self) -> &'static str {
        match self {
            FeatureType::Float => "float",
            FeatureType::Double => "double",
            FeatureType::Int => "int",
            FeatureType::Short => "short",
            FeatureType::SignedChar => "signed char",
            FeatureType::UnsignedChar => "unsigned char",
            FeatureType::UnsignedShort => "unsigned short",
            FeatureType::UnsignedInt => "unsigned int",
        }
    }

    /// Keyword used for the type in the tree text format.
    pub const fn keyword(self) -> &'static str {
        match self {
            FeatureType::Float => "float",
            FeatureType::Double => "double",
            FeatureType::Int => "int",
            FeatureType::Short => "short",
            FeatureType::SignedChar => "signed_char",
            FeatureType::UnsignedChar => "unsigned_char",
            FeatureType::UnsignedShort => "unsigned_short",
            FeatureType::UnsignedInt => "unsigned_int",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "float" => Some(FeatureType::Float),
            "double" => Some(FeatureType::Double),
            "int" => Some(FeatureType::Int),
            "short" => Some(FeatureType::Short),
            "signed_char" => Some(FeatureType::SignedChar),
            "unsigned_char" => Some(FeatureType::UnsignedChar),
            "unsigned_short" => Some(FeatureType::UnsignedShort),
            "unsigned_int" => Some(FeatureType::UnsignedInt),
            _ => None,
        }
    }

    /// Whether the type is a signed integer type.
    pub const fn is_signed(self) -> bool {
        matches!(self, FeatureType::Int | FeatureType::Short | FeatureType::SignedChar)
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

/// Split condition and children of an internal node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Split {
    /// Index into the feature vector.
    pub feature: u32,
    /// Go left if the feature value is `<= threshold`.
    pub threshold: f64,
    pub left: NodeId,
    pub right: NodeId,
}

impl Split {
    /// Evaluate which direction to go for a feature value.
    #[inline]
    pub fn go_left(&self, value: f64) -> bool {
        value <= self.threshold
    }
}

/// Shape of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    /// Internal split node.
    Split(Split),
    /// Leaf node with a class prediction.
    Leaf { prediction: u32 },
}

/// A node in a decision tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    samples: Option<u64>,
    path_prob: f64,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns true if this is a leaf node.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Get the split, if this is a split node.
    #[inline]
    pub fn split(&self) -> Option<&Split> {
        match &self.kind {
            NodeKind::Split(split) => Some(split),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Training samples that reached this node, if known.
    pub fn samples(&self) -> Option<u64> {
        self.samples
    }

    /// Probability of an evaluation reaching this node. Zero until the tree
    /// is annotated.
    pub fn path_prob(&self) -> f64 {
        self.path_prob
    }
}

/// Errors raised while constructing a tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree has no nodes")]
    Empty,

    #[error("feature dimension must be positive")]
    ZeroDimension,

    #[error("namespace '{namespace}' is not a valid C identifier")]
    InvalidNamespace { namespace: String },

    #[error("head {head} does not exist")]
    MissingHead { head: NodeId },

    #[error("node {parent} references missing child {child}")]
    DanglingChild { parent: NodeId, child: NodeId },

    #[error("node {child} has more than one parent")]
    SharedChild { child: NodeId },

    #[error("head {head} is referenced as a child")]
    HeadHasParent { head: NodeId },

    #[error("node {node} is not reachable from the head")]
    Unreachable { node: NodeId },

    #[error("node {node} splits on feature {feature}, but the dimension is {dim}")]
    FeatureOutOfRange { node: NodeId, feature: u32, dim: u32 },

    #[error("node {node} has a non-finite threshold")]
    NonFiniteThreshold { node: NodeId },
}

/// Builds a [`Tree`], assigning ids in insertion order.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    namespace: String,
    dim: u32,
    feature_type: FeatureType,
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new(namespace: impl Into<String>, dim: u32, feature_type: FeatureType) -> Self {
        Self {
            namespace: namespace.into(),
            dim,
            feature_type,
            nodes: Vec::new(),
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            samples: None,
            path_prob: 0.0,
        });
        id
    }

    /// Add a leaf node.
    pub fn leaf(&mut self, prediction: u32) -> NodeId {
        self.push(NodeKind::Leaf { prediction })
    }

    /// Add a split node. Children may be added later; they are checked in
    /// [`TreeBuilder::build`].
    pub fn split(&mut self, feature: u32, threshold: f64, left: NodeId, right: NodeId) -> NodeId {
        self.push(NodeKind::Split(Split {
            feature,
            threshold,
            left,
            right,
        }))
    }

    /// Record the number of training samples that reached `node`.
    pub fn set_samples(&mut self, node: NodeId, samples: u64) -> &mut Self {
        if let Some(n) = self.nodes.get_mut(node.index()) {
            n.samples = Some(samples);
        }
        self
    }

    /// Validate and produce the tree rooted at `head`.
    pub fn build(self, head: NodeId) -> Result<Tree, TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty);
        }
        if self.dim == 0 {
            return Err(TreeError::ZeroDimension);
        }
        if !is_identifier(&self.namespace) {
            return Err(TreeError::InvalidNamespace {
                namespace: self.namespace,
            });
        }
        if head.index() >= self.nodes.len() {
            return Err(TreeError::MissingHead { head });
        }

        let mut has_parent = vec![false; self.nodes.len()];
        for node in &self.nodes {
            let Some(split) = node.split() else { continue };
            if split.feature >= self.dim {
                return Err(TreeError::FeatureOutOfRange {
                    node: node.id,
                    feature: split.feature,
                    dim: self.dim,
                });
            }
            if !split.threshold.is_finite() {
                return Err(TreeError::NonFiniteThreshold { node: node.id });
            }
            for child in [split.left, split.right] {
                let Some(slot) = has_parent.get_mut(child.index()) else {
                    return Err(TreeError::DanglingChild {
                        parent: node.id,
                        child,
                    });
                };
                if *slot {
                    return Err(TreeError::SharedChild { child });
                }
                *slot = true;
            }
        }
        if has_parent[head.index()] {
            return Err(TreeError::HeadHasParent { head });
        }

        // Every node has at most one parent and the head has none, so the
        // nodes reachable from the head form a tree.
        let mut reached = vec![false; self.nodes.len()];
        let mut stack = vec![head];
        while let Some(id) = stack.pop() {
            reached[id.index()] = true;
            if let Some(split) = self.nodes[id.index()].split() {
                stack.push(split.left);
                stack.push(split.right);
            }
        }
        if let Some(pos) = reached.iter().position(|r| !r) {
            return Err(TreeError::Unreachable {
                node: NodeId(pos as u32),
            });
        }

        Ok(Tree {
            namespace: self.namespace,
            dim: self.dim,
            feature_type: self.feature_type,
            head,
            nodes: self.nodes,
            annotated: false,
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A binary decision tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    namespace: String,
    dim: u32,
    feature_type: FeatureType,
    head: NodeId,
    nodes: Vec<Node>,
    annotated: bool,
}

impl Tree {
    /// Parse a tree from its text form. The parsed tree is annotated.
    pub fn parse(text: &str) -> Result<Tree, ParseError> {
        parse_tree(text)
    }

    /// Symbol prefix for every generated name.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Length of the feature vector.
    pub fn dim(&self) -> u32 {
        self.dim
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    /// Look up a node by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all split nodes.
    pub fn splits(&self) -> impl Iterator<Item = (NodeId, &Split)> + '_ {
        self.nodes
            .iter()
            .filter_map(|node| node.split().map(|split| (node.id, split)))
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(self.head, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some(split) = self.node(id).split() {
                stack.push((split.left, depth + 1));
                stack.push((split.right, depth + 1));
            }
        }
        max_depth
    }

    /// Whether [`Tree::annotate_path_probabilities`] has run.
    pub fn is_annotated(&self) -> bool {
        self.annotated
    }

    /// Assign every node the probability of an evaluation reaching it.
    ///
    /// The head gets 1. A split passes its probability to its children in
    /// proportion to their training sample counts, or evenly if either count
    /// is missing or both are zero.
    pub fn annotate_path_probabilities(&mut self) {
        let mut stack = vec![(self.head, 1.0f64)];
        while let Some((id, prob)) = stack.pop() {
            self.nodes[id.index()].path_prob = prob;
            if let NodeKind::Split(split) = self.nodes[id.index()].kind {
                let (left_share, right_share) = self.child_shares(&split);
                stack.push((split.right, prob * right_share));
                stack.push((split.left, prob * left_share));
            }
        }
        self.annotated = true;
    }

    fn child_shares(&self, split: &Split) -> (f64, f64) {
        match (self.node(split.left).samples, self.node(split.right).samples) {
            (Some(left), Some(right)) if left + right > 0 => {
                let total = (left + right) as f64;
                (left as f64 / total, right as f64 / total)
            }
            _ => (0.5, 0.5),
        }
    }

    /// Whether any split threshold has a fractional part.
    pub fn contains_float(&self) -> bool {
        self.splits().any(|(_, split)| split.threshold.fract() != 0.0)
    }

    /// Inclusive range spanning all split thresholds, or `None` if the tree
    /// is a single leaf.
    pub fn split_range(&self) -> Option<(f64, f64)> {
        self.splits().fold(None, |range, (_, split)| {
            let t = split.threshold;
            Some(match range {
                None => (t, t),
                Some((lo, hi)) => (lo.min(t), hi.max(t)),
            })
        })
    }

    /// Evaluate the tree directly on a feature vector.
    ///
    /// # Panics
    ///
    /// Panics if `features` is shorter than a feature index used by a split.
    pub fn evaluate(&self, features: &[f64]) -> u32 {
        let mut id = self.head;
        loop {
            match self.node(id).kind {
                NodeKind::Leaf { prediction } => return prediction,
                NodeKind::Split(split) => {
                    id = if split.go_left(features[split.feature as usize]) {
                        split.left
                    } else {
                        split.right
                    };
                }
            }
        }
    }
}
