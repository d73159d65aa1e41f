// This module implements the probability-guided table packer. It lays every node of a tree
// out in a flat, 0-based table of fixed-shape records so that the generic fallback loop can
// walk any part of the tree by index. Layout is driven by a max-priority queue of pending
// subtree roots ordered by path probability (ties go to the lower node id). Each pop starts a
// run that greedily follows the hotter child for at most kernel-size entries, pushing the
// colder sibling back onto the queue; a run ends early at a leaf, and a full run pushes both
// children. This keeps the statistically hottest paths contiguous while re-consulting the
// global ranking every kernel. A record's child slots are backpatched when the child itself
// is laid out; the parent index and side travel with the pending work item, so the tree is
// never written during packing and can be packed concurrently with different settings.

//! Probability-guided table packing.

use crate::core::{CompileError, CompileResult};
use crate::tree::{NodeId, NodeKind, Tree};
use hashbrown::HashMap;
use log::{debug, trace};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

/// Node id to table index.
pub type IndexMap = HashMap<NodeId, u32>;

/// One record of the packed table, in emission field order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedEntry {
    pub is_leaf: bool,
    /// Zero for split entries.
    pub prediction: u32,
    /// Zero for leaf entries.
    pub feature: u32,
    /// Zero for leaf entries.
    pub split: f64,
    /// Table index of the left child; zero for leaf entries.
    pub left_child: u32,
    /// Table index of the right child; zero for leaf entries.
    pub right_child: u32,
}

impl PackedEntry {
    fn leaf(prediction: u32) -> Self {
        Self {
            is_leaf: true,
            prediction,
            feature: 0,
            split: 0.0,
            left_child: 0,
            right_child: 0,
        }
    }

    fn split(feature: u32, split: f64) -> Self {
        Self {
            is_leaf: false,
            prediction: 0,
            feature,
            split,
            left_child: 0,
            right_child: 0,
        }
    }
}

/// The packed table of one tree.
#[derive(Debug, Clone)]
pub struct PackedTable {
    namespace: String,
    entries: Vec<PackedEntry>,
    index_map: IndexMap,
    runs: usize,
}

impl PackedTable {
    pub fn entries(&self) -> &[PackedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index_map(&self) -> &IndexMap {
        &self.index_map
    }

    /// Table index of `node`.
    pub fn index_of(&self, node: NodeId) -> Option<u32> {
        self.index_map.get(&node).copied()
    }

    /// Number of greedy runs the layout took.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Walk the table from `start` the way the generated fallback loop does.
    ///
    /// # Panics
    ///
    /// Panics if `start` is out of range or `features` is shorter than a
    /// feature index stored in the table.
    pub fn walk(&self, start: u32, features: &[f64]) -> u32 {
        let mut i = start as usize;
        while !self.entries[i].is_leaf {
            let entry = &self.entries[i];
            i = if features[entry.feature as usize] <= entry.split {
                entry.left_child as usize
            } else {
                entry.right_child as usize
            };
        }
        self.entries[i].prediction
    }
}

impl fmt::Display for PackedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Table for {} ({} entries, {} runs)",
            self.namespace,
            self.entries.len(),
            self.runs
        )?;
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.is_leaf {
                writeln!(f, "{}: leaf {}", idx, entry.prediction)?;
            } else {
                writeln!(
                    f,
                    "{}: split x[{}] <= {} ? {} : {}",
                    idx, entry.feature, entry.split, entry.left_child, entry.right_child
                )?;
            }
        }
        writeln!(f, "End Table")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Parent slot a node's table index must be written into.
#[derive(Debug, Clone, Copy)]
struct Link {
    parent: u32,
    side: Side,
}

/// A subtree root waiting to be laid out.
#[derive(Debug, Clone, Copy)]
struct Pending {
    prob: f64,
    node: NodeId,
    link: Option<Link>,
}

// Higher probability first; ties go to the lower id.
impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prob
            .total_cmp(&other.prob)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Packs one annotated tree into a table.
pub struct Packer<'t> {
    tree: &'t Tree,
    kernel_size: usize,
}

impl<'t> Packer<'t> {
    pub fn new(tree: &'t Tree, kernel_size: usize) -> Self {
        Self { tree, kernel_size }
    }

    fn pending(&self, node: NodeId, link: Option<Link>) -> Pending {
        Pending {
            prob: self.tree.node(node).path_prob(),
            node,
            link,
        }
    }

    pub fn pack(&self) -> CompileResult<PackedTable> {
        if !self.tree.is_annotated() {
            return Err(CompileError::UnannotatedTree {
                namespace: self.tree.namespace().to_string(),
            });
        }
        if self.kernel_size == 0 {
            return Err(CompileError::InvalidKernelSize);
        }

        let node_count = self.tree.node_count();
        let mut entries: Vec<PackedEntry> = Vec::with_capacity(node_count);
        let mut index_map = IndexMap::with_capacity(node_count);
        let mut unresolved = 0usize;
        let mut runs = 0usize;

        let mut queue = BinaryHeap::new();
        queue.push(self.pending(self.tree.head(), None));

        while let Some(start) = queue.pop() {
            runs += 1;
            let run_begin = entries.len();
            let mut current = start;

            loop {
                let index = entries.len() as u32;
                index_map.insert(current.node, index);

                if let Some(link) = current.link {
                    let parent = &mut entries[link.parent as usize];
                    match link.side {
                        Side::Left => parent.left_child = index,
                        Side::Right => parent.right_child = index,
                    }
                    unresolved -= 1;
                }

                let node = self.tree.node(current.node);
                trace!("entry {} <- node {} (p={})", index, current.node, node.path_prob());

                match node.kind() {
                    NodeKind::Leaf { prediction } => {
                        entries.push(PackedEntry::leaf(*prediction));
                        break;
                    }
                    NodeKind::Split(split) => {
                        entries.push(PackedEntry::split(split.feature, split.threshold));
                        unresolved += 2;

                        let left = self.pending(
                            split.left,
                            Some(Link { parent: index, side: Side::Left }),
                        );
                        let right = self.pending(
                            split.right,
                            Some(Link { parent: index, side: Side::Right }),
                        );

                        if entries.len() - run_begin >= self.kernel_size {
                            queue.push(left);
                            queue.push(right);
                            break;
                        }

                        let (hot, cold) = if left.prob >= right.prob {
                            (left, right)
                        } else {
                            (right, left)
                        };
                        queue.push(cold);
                        current = hot;
                    }
                }
            }

            debug!(
                "run {}: entries {}..{} starting at node {}",
                runs,
                run_begin,
                entries.len(),
                start.node
            );
        }

        if unresolved != 0 || entries.len() != node_count {
            return Err(CompileError::Layout {
                reason: format!(
                    "{} of {} nodes packed with {} unresolved child slots",
                    entries.len(),
                    node_count,
                    unresolved
                ),
            });
        }

        Ok(PackedTable {
            namespace: self.tree.namespace().to_string(),
            entries,
            index_map,
            runs,
        })
    }
}

/// Pack `tree` with the given kernel size.
pub fn pack(tree: &Tree, kernel_size: usize) -> CompileResult<PackedTable> {
    Packer::new(tree, kernel_size).pack()
}
