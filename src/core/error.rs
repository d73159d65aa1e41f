// This module defines the error type shared by the mixtree code generator using the thiserror
// crate. CompileError covers the two fatal failure classes of the generator: configuration
// errors raised while a generator is being set up (an architecture other than arm or intel,
// a zero kernel size) and contract violations raised while compiling (asking the cost model
// for the cost of a leaf, packing a tree whose path probabilities were never annotated, or a
// packed table that breaks its own invariants). None of these are retryable; each variant
// carries the offending name or node so the caller can report it. CompileResult<T> is the
// convenience alias used throughout the crate.

//! Error types for the mixtree generator.

use crate::tree::NodeId;
use thiserror::Error;

/// Main error type for tree compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Unsupported architecture '{name}': use 'arm' or 'intel' as target architecture")]
    UnsupportedArchitecture { name: String },

    #[error("Kernel size must be at least 1")]
    InvalidKernelSize,

    #[error("Cost requested for node {node}, which is a leaf and not a split")]
    NotASplit { node: NodeId },

    #[error("Tree '{namespace}' has no path probabilities; annotate it before compiling")]
    UnannotatedTree { namespace: String },

    #[error("Table layout error: {reason}")]
    Layout { reason: String },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
