// This module implements the budget-constrained emitter. Starting at the head with a running
// size of zero, it walks the tree and decides split by split whether to inline a branch or to
// defer the whole subtree to the packed table. A split is inlined while the running size plus
// its cost model estimate stays within the budget; the two arms are then emitted hot arm
// first, and the running size is threaded through them in emission order, so the else arm
// starts from whatever the then arm consumed. A split over budget becomes a fallback site that
// loads the subtree's table index into the subroot cursor and jumps to the shared table loop.
// The output is a small statement tree allocated in the compilation arena; the assembler
// renders it as C and HybridProgram executes it directly.

//! Inline code emission under an instruction-size budget.

use super::packer::IndexMap;
use crate::core::{CompileError, CompileResult};
use crate::target::CostModel;
use crate::tree::{NodeId, NodeKind, Tree};
use bumpalo::Bump;
use log::{debug, trace};

/// Comparison guarding the then arm of an inline branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Then arm is the left child.
    LessEqual,
    /// Then arm is the right child.
    Greater,
}

impl Comparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::LessEqual => value <= threshold,
            Comparison::Greater => value > threshold,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Comparison::LessEqual => "<=",
            Comparison::Greater => ">",
        }
    }
}

/// Inline statement tree of a predict function body.
#[derive(Debug, PartialEq)]
pub enum Stmt<'a> {
    /// `return prediction;`
    Return { prediction: u32 },
    /// Two-way branch of an inlined split.
    Branch {
        node: NodeId,
        feature: u32,
        threshold: f64,
        comparison: Comparison,
        then_arm: &'a Stmt<'a>,
        else_arm: &'a Stmt<'a>,
    },
    /// `subroot = index; goto fallback;`
    Fallback { node: NodeId, subroot: u32 },
}

/// Where executing a statement tree ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Return(u32),
    Fallback(u32),
}

impl<'a> Stmt<'a> {
    /// Number of inline branches.
    pub fn inline_branches(&self) -> usize {
        match self {
            Stmt::Branch { then_arm, else_arm, .. } => {
                1 + then_arm.inline_branches() + else_arm.inline_branches()
            }
            _ => 0,
        }
    }

    /// Number of fallback jump sites.
    pub fn fallback_sites(&self) -> usize {
        match self {
            Stmt::Branch { then_arm, else_arm, .. } => {
                then_arm.fallback_sites() + else_arm.fallback_sites()
            }
            Stmt::Fallback { .. } => 1,
            Stmt::Return { .. } => 0,
        }
    }

    /// Run the inline code on `features`.
    ///
    /// # Panics
    ///
    /// Panics if `features` is shorter than a feature index used by a branch.
    pub fn execute(&self, features: &[f64]) -> Outcome {
        let mut stmt = self;
        loop {
            match stmt {
                Stmt::Return { prediction } => return Outcome::Return(*prediction),
                Stmt::Fallback { subroot, .. } => return Outcome::Fallback(*subroot),
                Stmt::Branch {
                    feature,
                    threshold,
                    comparison,
                    then_arm,
                    else_arm,
                    ..
                } => {
                    stmt = if comparison.holds(features[*feature as usize], *threshold) {
                        *then_arm
                    } else {
                        *else_arm
                    };
                }
            }
        }
    }
}

/// Emits the inline part of one tree. Statements live in the arena for
/// `'a`; the tree and the index map are only borrowed while emitting.
pub struct Emitter<'a, 't> {
    arena: &'a Bump,
    tree: &'t Tree,
    cost_model: CostModel,
    index_map: &'t IndexMap,
    budget: u32,
}

impl<'a, 't> Emitter<'a, 't> {
    pub fn new(
        arena: &'a Bump,
        tree: &'t Tree,
        cost_model: CostModel,
        index_map: &'t IndexMap,
        budget: u32,
    ) -> Self {
        Self {
            arena,
            tree,
            cost_model,
            index_map,
            budget,
        }
    }

    /// Emit the head with nothing spent yet.
    pub fn emit_tree(&self) -> CompileResult<(&'a Stmt<'a>, u32)> {
        self.emit(self.tree.head(), 0)
    }

    /// Emit the subtree at `id` given `running_size` already spent. Returns the
    /// statement and the running size after it.
    pub fn emit(&self, id: NodeId, running_size: u32) -> CompileResult<(&'a Stmt<'a>, u32)> {
        let node = self.tree.node(id);
        let split = match node.kind() {
            NodeKind::Leaf { prediction } => {
                let stmt = self.arena.alloc(Stmt::Return {
                    prediction: *prediction,
                });
                return Ok((stmt, running_size));
            }
            NodeKind::Split(split) => split,
        };

        let cost = self.cost_model.cost(self.tree, node)?;
        if running_size.saturating_add(cost) > self.budget {
            let subroot = self
                .index_map
                .get(&id)
                .copied()
                .ok_or_else(|| CompileError::Layout {
                    reason: format!("node {} has no table entry", id),
                })?;
            debug!("fallback at node {} -> entry {} (size {})", id, subroot, running_size);
            let stmt = self.arena.alloc(Stmt::Fallback { node: id, subroot });
            return Ok((stmt, running_size));
        }

        let mut size = running_size + cost;
        trace!("inline node {} (cost {}, size {})", id, cost, size);

        let left_hot =
            self.tree.node(split.left).path_prob() >= self.tree.node(split.right).path_prob();
        let (comparison, hot, cold) = if left_hot {
            (Comparison::LessEqual, split.left, split.right)
        } else {
            (Comparison::Greater, split.right, split.left)
        };

        let (then_arm, after_then) = self.emit(hot, size)?;
        size = after_then;
        let (else_arm, after_else) = self.emit(cold, size)?;
        size = after_else;

        let stmt = self.arena.alloc(Stmt::Branch {
            node: id,
            feature: split.feature,
            threshold: split.threshold,
            comparison,
            then_arm,
            else_arm,
        });
        Ok((stmt, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::packer::pack;
    use crate::core::test_utils::test::{depth2_tree, DEPTH2_ROOT};
    use crate::target::Architecture;
    use crate::tree::{FeatureType, TreeBuilder};

    fn emit_with_budget<'a>(
        arena: &'a Bump,
        tree: &Tree,
        index_map: &IndexMap,
        budget: u32,
    ) -> (&'a Stmt<'a>, u32) {
        let model = CostModel::for_tree(Architecture::Arm, tree);
        Emitter::new(arena, tree, model, index_map, budget)
            .emit_tree()
            .unwrap()
    }

    #[test]
    fn test_full_budget_inlines_everything() {
        let arena = Bump::new();
        let tree = depth2_tree();
        let table = pack(&tree, 8).unwrap();
        let (body, size) = emit_with_budget(&arena, &tree, table.index_map(), 10_000);

        assert_eq!(size, 96);
        assert_eq!(body.inline_branches(), 3);
        assert_eq!(body.fallback_sites(), 0);
        for (features, expected) in [([1.0, 1.0], 10), ([1.0, 5.0], 11), ([9.0, 7.0], 12), ([9.0, 8.0], 13)] {
            assert_eq!(body.execute(&features), Outcome::Return(expected));
        }
    }

    #[test]
    fn test_tiny_budget_falls_back_at_root() {
        let arena = Bump::new();
        let tree = depth2_tree();
        let table = pack(&tree, 8).unwrap();
        for budget in [0, 1, 23] {
            let (body, size) = emit_with_budget(&arena, &tree, table.index_map(), budget);
            assert_eq!(size, 0);
            assert_eq!(
                *body,
                Stmt::Fallback {
                    node: DEPTH2_ROOT,
                    subroot: 0
                }
            );
        }
    }

    #[test]
    fn test_size_threads_through_then_arm() {
        let arena = Bump::new();
        let tree = depth2_tree();
        let table = pack(&tree, 8).unwrap();

        // Root (24) and the left split (36) fit; the right split would need
        // 24 + 36 + 36 and falls back.
        let (body, size) = emit_with_budget(&arena, &tree, table.index_map(), 60);
        assert_eq!(size, 60);
        assert_eq!(body.inline_branches(), 2);
        assert_eq!(body.fallback_sites(), 1);
        match body {
            Stmt::Branch { else_arm, .. } => {
                assert_eq!(
                    **else_arm,
                    Stmt::Fallback {
                        node: NodeId(5),
                        subroot: table.index_of(NodeId(5)).unwrap()
                    }
                );
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_hot_child_is_then_arm() {
        let mut builder = TreeBuilder::new("skew", 1, FeatureType::Int);
        let cold = builder.leaf(1);
        builder.set_samples(cold, 10);
        let hot = builder.leaf(2);
        builder.set_samples(hot, 90);
        let root = builder.split(0, 4.0, cold, hot);
        let mut tree = builder.build(root).unwrap();
        tree.annotate_path_probabilities();

        let arena = Bump::new();
        let table = pack(&tree, 8).unwrap();
        let (body, _) = emit_with_budget(&arena, &tree, table.index_map(), 10_000);
        match body {
            Stmt::Branch {
                comparison,
                then_arm,
                else_arm,
                ..
            } => {
                assert_eq!(*comparison, Comparison::Greater);
                assert_eq!(**then_arm, Stmt::Return { prediction: 2 });
                assert_eq!(**else_arm, Stmt::Return { prediction: 1 });
            }
            other => panic!("expected branch, got {:?}", other),
        }
        assert_eq!(body.execute(&[4.0]), Outcome::Return(1));
        assert_eq!(body.execute(&[5.0]), Outcome::Return(2));
    }

    #[test]
    fn test_missing_index_is_a_layout_error() {
        let arena = Bump::new();
        let tree = depth2_tree();
        let empty = IndexMap::new();
        let model = CostModel::for_tree(Architecture::Arm, &tree);
        let result = Emitter::new(&arena, &tree, model, &empty, 0).emit_tree();
        assert!(matches!(result, Err(CompileError::Layout { .. })));
    }

    #[test]
    fn test_comparison_symbols() {
        assert_eq!(Comparison::LessEqual.symbol(), "<=");
        assert_eq!(Comparison::Greater.symbol(), ">");
        assert!(Comparison::LessEqual.holds(3.0, 3.0));
        assert!(!Comparison::Greater.holds(3.0, 3.0));
    }
}
