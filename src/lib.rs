//! mixtree - Hybrid inline/table code generation for decision trees.
//!
//! mixtree compiles a trained binary decision tree into C for arm and intel
//! microcontroller cores. The statistically hottest paths become inline
//! branches, bounded by an instruction-size budget; the rest of the tree is
//! packed into a flat table walked by a small generic loop.
//!
//! # Primary Usage
//!
//! ```ignore
//! use mixtree::codegen::{GeneratorConfig, HybridCompiler};
//! use mixtree::core::CompilationSession;
//! use mixtree::tree::Tree;
//! use bumpalo::Bump;
//!
//! let tree = Tree::parse(&std::fs::read_to_string("iris.tree")?)?;
//!
//! // Create compilation session with arena allocation
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//!
//! // Lower and render the tree
//! let compiler = HybridCompiler::new(GeneratorConfig::for_target("arm")?);
//! let program = compiler.lower(&session, &tree, 0)?;
//! let code = program.assemble();
//! ```
//!
//! # Architecture
//!
//! - [`tree`] - Decision tree model, builder and text format
//! - [`target`] - Target architectures and the instruction-size cost model
//! - [`codegen`] - Table packer, inline emitter, type widths and C assembler
//! - [`core`] - Shared infrastructure (errors, session)
//! - [`filecheck`] - Golden tests over `.tree` files

pub mod codegen;
pub mod core;
pub mod filecheck;
pub mod target;
pub mod tree;

pub use codegen::{GeneratedCode, GeneratorConfig, HybridCompiler, HybridProgram};
pub use core::{CompilationSession, CompileError, CompileResult};
pub use target::Architecture;
pub use tree::{Tree, TreeBuilder};
