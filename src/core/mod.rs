//! core
//!
//! Core domain types, schemas, and the stack model.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RefName, etc.
//! - [`stack`] - The dependency-ordered branch stack
//! - [`metadata`] - Per-branch record schema and storage
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Stack construction is pure and deterministic

pub mod config;
pub mod metadata;
pub mod stack;
pub mod types;
