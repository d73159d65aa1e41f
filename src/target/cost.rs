//! Instruction-size cost model for inline split nodes.
//!
//! Estimates are in the units the budget is expressed in: bytes on intel, and
//! four bytes per instruction on arm. An inline split always pays for loading
//! the operands, the compare and the branch; a leaf child adds its return; a
//! subtree in the else arm reserves room for a later `goto`.

use super::Architecture;
use crate::core::{CompileError, CompileResult};
use crate::tree::{Node, NodeKind, Split, Tree};

/// Type the split comparisons operate on, decided once per tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    Int,
    Float,
}

impl OperandType {
    /// Float if any threshold in the tree is non-integral.
    pub fn of_tree(tree: &Tree) -> Self {
        if tree.contains_float() {
            OperandType::Float
        } else {
            OperandType::Int
        }
    }
}

/// One row of the cost table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostTable {
    /// Loads, compare and branch.
    pub base: u32,
    /// Added per leaf child.
    pub leaf_child: u32,
    /// Added when the else arm is a subtree.
    pub goto_slot: u32,
}

impl CostTable {
    pub const fn for_target(arch: Architecture, operand: OperandType) -> Self {
        match (arch, operand) {
            (Architecture::Arm, OperandType::Int) => CostTable { base: 5 * 4, leaf_child: 2 * 4, goto_slot: 4 },
            (Architecture::Arm, OperandType::Float) => CostTable { base: 8 * 4, leaf_child: 2 * 4, goto_slot: 4 },
            (Architecture::Intel, OperandType::Int) => CostTable { base: 28, leaf_child: 10, goto_slot: 5 },
            (Architecture::Intel, OperandType::Float) => CostTable { base: 17, leaf_child: 10, goto_slot: 5 },
        }
    }
}

/// Cost model bound to one architecture and operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    arch: Architecture,
    operand: OperandType,
    table: CostTable,
}

impl CostModel {
    pub fn new(arch: Architecture, operand: OperandType) -> Self {
        Self {
            arch,
            operand,
            table: CostTable::for_target(arch, operand),
        }
    }

    /// Cost model for `tree`, with the operand type derived from its thresholds.
    pub fn for_tree(arch: Architecture, tree: &Tree) -> Self {
        Self::new(arch, OperandType::of_tree(tree))
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    pub fn operand_type(&self) -> OperandType {
        self.operand
    }

    pub fn table(&self) -> CostTable {
        self.table
    }

    /// Cost of emitting `split` inline.
    pub fn split_cost(&self, tree: &Tree, split: &Split) -> u32 {
        let mut size = self.table.base;
        if tree.node(split.left).is_leaf() {
            size += self.table.leaf_child;
        }
        if tree.node(split.right).is_leaf() {
            size += self.table.leaf_child;
        } else {
            size += self.table.goto_slot;
        }
        size
    }

    /// Cost of emitting `node` inline. Fails for leaves, which have no
    /// inline cost to speak of.
    pub fn cost(&self, tree: &Tree, node: &Node) -> CompileResult<u32> {
        match node.kind() {
            NodeKind::Split(split) => Ok(self.split_cost(tree, split)),
            NodeKind::Leaf { .. } => Err(CompileError::NotASplit { node: node.id() }),
        }
    }

    /// Sum of the inline cost of every split. A budget at least this large
    /// inlines the whole tree.
    pub fn total_cost(&self, tree: &Tree) -> u32 {
        tree.splits().map(|(_, split)| self.split_cost(tree, split)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::{depth2_tree, DEPTH2_ROOT};
    use crate::tree::{FeatureType, NodeId, TreeBuilder};

    #[test]
    fn test_cost_table_rows() {
        assert_eq!(CostTable::for_target(Architecture::Arm, OperandType::Int).base, 20);
        assert_eq!(CostTable::for_target(Architecture::Arm, OperandType::Float).base, 32);
        assert_eq!(CostTable::for_target(Architecture::Intel, OperandType::Int).base, 28);
        assert_eq!(CostTable::for_target(Architecture::Intel, OperandType::Float).base, 17);
        for arch in Architecture::ALL {
            let int = CostTable::for_target(arch, OperandType::Int);
            let float = CostTable::for_target(arch, OperandType::Float);
            assert_eq!(int.leaf_child, float.leaf_child);
            assert_eq!(int.goto_slot, float.goto_slot);
        }
    }

    #[test]
    fn test_split_costs_depth2() {
        let tree = depth2_tree();
        let arm = CostModel::for_tree(Architecture::Arm, &tree);
        assert_eq!(arm.operand_type(), OperandType::Int);

        // Root: two subtree children, only the else arm reserves a goto.
        assert_eq!(arm.cost(&tree, tree.node(DEPTH2_ROOT)), Ok(24));
        // Bottom splits: two leaf children.
        assert_eq!(arm.cost(&tree, tree.node(NodeId(4))), Ok(36));
        assert_eq!(arm.total_cost(&tree), 96);

        let intel = CostModel::for_tree(Architecture::Intel, &tree);
        assert_eq!(intel.architecture(), Architecture::Intel);
        assert_eq!(intel.table(), CostTable::for_target(Architecture::Intel, OperandType::Int));
        assert_eq!(intel.cost(&tree, tree.node(DEPTH2_ROOT)), Ok(33));
        assert_eq!(intel.cost(&tree, tree.node(NodeId(5))), Ok(48));
        assert_eq!(intel.total_cost(&tree), 129);
    }

    #[test]
    fn test_mixed_children() {
        let mut builder = TreeBuilder::new("mixed", 2, FeatureType::Float);
        let a = builder.leaf(0);
        let b = builder.leaf(1);
        let c = builder.leaf(2);
        let inner = builder.split(1, 0.25, b, c);
        let leaf_then_subtree = builder.split(0, 1.5, a, inner);
        let tree = builder.build(leaf_then_subtree).unwrap();

        let arm = CostModel::for_tree(Architecture::Arm, &tree);
        assert_eq!(arm.operand_type(), OperandType::Float);
        assert_eq!(arm.cost(&tree, tree.node(leaf_then_subtree)), Ok(32 + 8 + 4));

        let intel = CostModel::for_tree(Architecture::Intel, &tree);
        assert_eq!(intel.cost(&tree, tree.node(leaf_then_subtree)), Ok(17 + 10 + 5));
    }

    #[test]
    fn test_cost_of_leaf_is_an_error() {
        let tree = depth2_tree();
        let model = CostModel::for_tree(Architecture::Arm, &tree);
        assert_eq!(
            model.cost(&tree, tree.node(NodeId(0))),
            Err(CompileError::NotASplit { node: NodeId(0) })
        );
    }
}
