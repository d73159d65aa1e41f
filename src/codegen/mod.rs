// This module ties the generator together. GeneratorConfig carries the target architecture,
// the instruction-size budget and the packing kernel size; building one from an architecture
// name is where unsupported targets are rejected, before any tree is touched. HybridCompiler
// lowers one annotated tree at a time: it picks the operand type and cost model from the
// tree's thresholds, packs the table, emits the inline statement tree into the session arena
// against the packer's index map, resolves the record field widths and interns the C symbols.
// The resulting HybridProgram can be inspected, executed as a reference model of the
// generated C, or assembled into declaration and definition text.

//! Hybrid inline/table code generation.

pub mod assembler;
pub mod emitter;
pub mod packer;
pub mod width;

pub use assembler::{assemble, GeneratedCode, Symbols};
pub use emitter::{Comparison, Emitter, Outcome, Stmt};
pub use packer::{pack, IndexMap, PackedEntry, PackedTable, Packer};
pub use width::{CType, IntWidth, RecordLayout};

use crate::core::{CompilationSession, CompileError, CompileResult, TreeReport};
use crate::target::{Architecture, CostModel, OperandType};
use crate::tree::Tree;
use bumpalo::Bump;
use log::info;

/// Default instruction-size budget: a 32 KiB i-cache over 32-byte instructions
/// is about a thousand instructions, of which roughly half go to one tree.
pub const DEFAULT_BUDGET: u32 = 32 * 500;

/// Settings for compiling trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    architecture: Architecture,
    budget: u32,
    kernel_size: usize,
}

impl GeneratorConfig {
    /// Default budget and the architecture's kernel size.
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            budget: DEFAULT_BUDGET,
            kernel_size: architecture.kernel_size(),
        }
    }

    /// Configuration for the architecture called `name`.
    pub fn for_target(name: &str) -> CompileResult<Self> {
        Ok(Self::new(name.parse()?))
    }

    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_kernel_size(mut self, kernel_size: usize) -> CompileResult<Self> {
        if kernel_size == 0 {
            return Err(CompileError::InvalidKernelSize);
        }
        self.kernel_size = kernel_size;
        Ok(self)
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }
}

/// One tree lowered to inline statements plus a packed table.
#[derive(Debug)]
pub struct HybridProgram<'a> {
    tree: &'a Tree,
    tree_id: u32,
    cost_model: CostModel,
    table: PackedTable,
    body: &'a Stmt<'a>,
    inline_size: u32,
    layout: RecordLayout,
    symbols: Symbols<'a>,
}

impl<'a> HybridProgram<'a> {
    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    pub fn tree_id(&self) -> u32 {
        self.tree_id
    }

    pub fn cost_model(&self) -> CostModel {
        self.cost_model
    }

    pub fn operand_type(&self) -> OperandType {
        self.cost_model.operand_type()
    }

    pub fn table(&self) -> &PackedTable {
        &self.table
    }

    pub fn index_map(&self) -> &IndexMap {
        self.table.index_map()
    }

    /// Inline statements of the predict function.
    pub fn body(&self) -> &'a Stmt<'a> {
        self.body
    }

    /// Estimated size of the inline code, in cost-model units.
    pub fn inline_size(&self) -> u32 {
        self.inline_size
    }

    pub fn inline_branches(&self) -> usize {
        self.body.inline_branches()
    }

    pub fn fallback_sites(&self) -> usize {
        self.body.fallback_sites()
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    pub fn symbols(&self) -> Symbols<'a> {
        self.symbols
    }

    /// Predict the way the generated C does: run the inline code, and walk the
    /// table from the subroot if it falls back.
    ///
    /// # Panics
    ///
    /// Panics if `features` has fewer than `dim` values.
    pub fn predict(&self, features: &[f64]) -> u32 {
        match self.body.execute(features) {
            Outcome::Return(prediction) => prediction,
            Outcome::Fallback(subroot) => self.table.walk(subroot, features),
        }
    }

    pub fn report(&self) -> TreeReport {
        TreeReport {
            table_entries: self.table.len(),
            inline_branches: self.inline_branches(),
            fallback_sites: self.fallback_sites(),
            inline_size: self.inline_size,
        }
    }

    /// Render declaration and definition text.
    pub fn assemble(&self) -> GeneratedCode {
        assemble(self)
    }
}

/// Compiles decision trees into hybrid inline/table C code.
#[derive(Debug, Clone)]
pub struct HybridCompiler {
    config: GeneratorConfig,
}

impl HybridCompiler {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Compiler for the architecture called `name` with the given budget.
    pub fn for_target(name: &str, budget: u32) -> CompileResult<Self> {
        Ok(Self::new(GeneratorConfig::for_target(name)?.with_budget(budget)))
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Lower `tree` into a program whose statements live in the session arena.
    pub fn lower<'a, 'arena>(
        &self,
        session: &'a CompilationSession<'arena>,
        tree: &'a Tree,
        tree_id: u32,
    ) -> CompileResult<HybridProgram<'a>> {
        session.set_current_tree(tree.namespace());

        let cost_model = CostModel::for_tree(self.config.architecture, tree);
        let table = Packer::new(tree, self.config.kernel_size).pack()?;

        let arena: &'a Bump = session.arena();
        let emitter = Emitter::new(
            arena,
            tree,
            cost_model,
            table.index_map(),
            self.config.budget,
        );
        let (body, inline_size) = emitter.emit_tree()?;

        let layout = RecordLayout::for_tree(tree, table.len());
        let symbols = Symbols::intern(session, tree.namespace(), tree_id);

        let program = HybridProgram {
            tree,
            tree_id,
            cost_model,
            table,
            body,
            inline_size,
            layout,
            symbols,
        };

        let report = program.report();
        info!(
            "Compiled {} on {}: {} entries, {} inline branches, {} fallback sites, size {}/{}",
            symbols.predict,
            self.config.architecture,
            report.table_entries,
            report.inline_branches,
            report.fallback_sites,
            report.inline_size,
            self.config.budget
        );
        session.record_tree_compiled(symbols.predict, report);
        session.clear_tree_state();

        Ok(program)
    }

    /// Lower and render `tree` within an existing session.
    pub fn compile_in(
        &self,
        session: &CompilationSession<'_>,
        tree: &Tree,
        tree_id: u32,
    ) -> CompileResult<GeneratedCode> {
        Ok(self.lower(session, tree, tree_id)?.assemble())
    }

    /// Lower and render `tree` in a private arena.
    pub fn compile(&self, tree: &Tree, tree_id: u32) -> CompileResult<GeneratedCode> {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        self.compile_in(&session, tree, tree_id)
    }
}
