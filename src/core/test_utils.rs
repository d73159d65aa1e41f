//! Test utilities for arena-based testing.
//!
//! Each test gets its own bump arena, the same way an orchestrator gives each
//! worker compiling part of a forest its own session.
