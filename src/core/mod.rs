// This module is the hub for mixtree's shared infrastructure: the error type used by every
// stage of the generator, and the arena-based compilation session that owns the emitted
// statement trees and the statistics gathered while compiling. It mirrors how the code
// generator's stages are wired together: configuration errors surface before any work, and
// everything allocated for one tree lives exactly as long as its session.

//! Core mixtree infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based allocation of emitted statements using `bumpalo`
//! - Interned symbol names
//! - Per-session statistics
//!
//! ## Errors (`error`)
//! - `CompileError` for configuration errors and contract violations

pub mod error;
pub mod session;
pub mod test_utils;

pub use error::{CompileError, CompileResult};
pub use session::{CompilationSession, SessionStats, TreeReport};
