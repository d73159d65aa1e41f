// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession owns a borrowed arena in which the emitter allocates the statement tree
// of each compiled decision tree, and interns the C symbol names (node struct, table, predict
// function, fallback label) so that a HybridProgram can hand out &str without owning Strings.
// It also accumulates SessionStats across every tree compiled in the session: table entries,
// inline branches, fallback sites and the estimated inline code size, plus the largest tree
// seen so far. Sessions hold no process-wide state; an orchestrator compiling a forest in
// parallel gives each worker its own arena and session.

//! Arena-based compilation session management.
//!
//! All statements emitted for a tree live in the session arena and share its
//! lifetime, so a compiled program can be inspected, executed and rendered
//! without any per-node boxing.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Summary of one compiled tree, recorded into the session statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeReport {
    /// Entries in the packed table.
    pub table_entries: usize,
    /// Split nodes emitted as inline branches.
    pub inline_branches: usize,
    /// Sites that jump into the table fallback loop.
    pub fallback_sites: usize,
    /// Estimated size of the inline code in cost-model units.
    pub inline_size: u32,
}

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for emitted statements.
    arena: &'arena Bump,

    /// Session statistics.
    stats: RefCell<SessionStats>,

    /// String interning for symbol names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Namespace of the tree currently being compiled.
    current_tree: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_tree: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Set the tree being compiled.
    pub fn set_current_tree(&self, name: &str) {
        *self.current_tree.borrow_mut() = Some(name.to_string());
    }

    /// Name of the tree being compiled, if any.
    pub fn current_tree(&self) -> Option<String> {
        self.current_tree.borrow().clone()
    }

    /// Clear per-tree state once a tree is finished.
    pub fn clear_tree_state(&self) {
        *self.current_tree.borrow_mut() = None;
    }

    /// Record that a tree was compiled.
    pub fn record_tree_compiled(&self, name: &str, report: TreeReport) {
        let mut stats = self.stats.borrow_mut();
        stats.trees_compiled += 1;
        stats.table_entries += report.table_entries;
        stats.inline_branches += report.inline_branches;
        stats.fallback_sites += report.fallback_sites;
        stats.inline_size += u64::from(report.inline_size);

        if stats.largest_tree_entries < report.table_entries {
            stats.largest_tree_entries = report.table_entries;
            stats.largest_tree_name = name.to_string();
        }
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of trees compiled.
    pub trees_compiled: usize,

    /// Total packed table entries.
    pub table_entries: usize,

    /// Total inline branches emitted.
    pub inline_branches: usize,

    /// Total fallback sites emitted.
    pub fallback_sites: usize,

    /// Total estimated inline size (cost-model units).
    pub inline_size: u64,

    /// Entry count of the largest tree.
    pub largest_tree_entries: usize,

    /// Name of the largest tree.
    pub largest_tree_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Trees compiled: {}", self.trees_compiled)?;
        writeln!(f, "  Table entries: {}", self.table_entries)?;
        writeln!(f, "  Inline branches: {}", self.inline_branches)?;
        writeln!(f, "  Fallback sites: {}", self.fallback_sites)?;
        writeln!(f, "  Inline size: {} units", self.inline_size)?;

        if !self.largest_tree_name.is_empty() {
            writeln!(
                f,
                "  Largest tree: {} ({} entries)",
                self.largest_tree_name, self.largest_tree_entries
            )?;
        }

        Ok(())
    }
}
