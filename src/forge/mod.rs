//! forge
//!
//! Abstraction for the review host.
//!
//! # Architecture
//!
//! The `Forge` trait defines the four review operations the engines use.
//! Commands build a concrete forge through [`create_forge`] and hand the
//! engines a `dyn Forge`.
//!
//! - Forge operations are invoked only after local preconditions are verified
//! - Forge failures do not compromise local correctness
//! - Forge results are written only to the per-branch review link
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`github`]: GitHub implementation using the REST API
//! - [`mock`]: In-memory implementation for deterministic testing
//! - [`retry`]: Exponential backoff for transient failures
//! - `factory`: Forge selection and creation

mod factory;
pub mod github;
pub mod mock;
pub mod retry;
mod traits;

pub use factory::{create_forge, detect_provider, valid_forge_names, ForgeProvider, ForgeSettings};
pub use traits::*;
