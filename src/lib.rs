//! gflow - stacked branches, kept in sync and landed in order
//!
//! gflow maintains a stack of dependent branches against a Git remote and a
//! review host. `up` rebases the stack onto trunk, pushes it and keeps each
//! branch's review pointed at its parent; `land` merges the stack into trunk
//! root first and cleans up behind itself.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Sync and land engines, per-branch reports
//! - [`core`] - Domain types, the stack model, config and persisted records
//! - [`git`] - Local repository access and the repository gateway
//! - [`forge`] - Review host abstraction (GitHub)
//! - [`logging`] - Diagnostic logging setup
//! - [`ui`] - User-facing output
//!
//! # Correctness Invariants
//!
//! 1. Branches are processed strictly root to tip
//! 2. A failure at one branch halts the branches above it
//! 3. Force-pushes and merges happen only after their local preconditions pass
//! 4. A rebase is never left half-applied without being reported

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod git;
pub mod logging;
pub mod ui;
