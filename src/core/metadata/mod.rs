//! core::metadata
//!
//! Per-branch records owned by gflow.
//!
//! # Modules
//!
//! - [`schema`] - Record schema (v1)
//! - [`store`] - Storage as blobs behind `refs/gflow-metadata/<branch>`
//!
//! The record holds the parent link, the base commit recorded at the last
//! successful sync, and the linked review request. Nothing else about a
//! stack is persisted; everything else is read fresh from the repository.

pub mod schema;
pub mod store;

pub use schema::{
    parse_metadata, BranchMetadataV1, MetadataError, ParentInfo, ReviewLink, METADATA_KIND,
    SCHEMA_VERSION,
};
pub use store::{MetadataEntry, MetadataStore, StoreError};
