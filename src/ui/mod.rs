//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Output formatting and display
//!
//! All printing goes through this module so that `--quiet` is honored in
//! one place. Diagnostic logging is separate and handled by `tracing`.

pub mod output;
