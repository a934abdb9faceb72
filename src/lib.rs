//! # piece-kernel
//!
//! Traversal and concurrency core for music notation.
//!
//! A piece is an immutable tree addressed by path descriptors. Readers walk
//! a version in time order; writers edit through transactions that commit
//! atomically or retry.
//!
//! ## Core Contract
//!
//! 1. A [`Path`] addresses a node without holding a reference into any tree;
//!    applied to a version where it no longer fits it fails explicitly
//! 2. [`timewalk::traverse`] reports every item with its path and position in
//!    a single early-terminating pass
//! 3. [`Coordinator::with_transaction`] installs all of a body's edits, across
//!    any number of documents, or none of them
//!
//! ## Architecture
//!
//! ```text
//! Path ──> tree::resolve / tree::edit ──> Arc<Node> versions
//!                                            │
//!          timewalk::traverse <──────────────┤
//!          resolver (built on traverse)      │
//!                                            ▼
//!          Coordinator ──> Transaction ──> DocumentHandle (registry)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same tree + same options → same tuples in the same order
//! - Record fields are walked in name order
//! - Fingerprints and content addresses use canonical encodings

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod codec;
pub mod coordinator;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod timewalk;
pub mod tree;
pub mod types;

// Re-exports
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use codec::{deserialize, serialize, CodecError};
pub use coordinator::{
    AutoCommit, CommitRecord, Coordinator, CoordinatorStats, Edit, EditContext, EditError,
    EditOutcome, Transaction,
};
pub use policy::{KernelConfig, RetryPolicy};
pub use registry::{DocumentHandle, DocumentRegistry, InMemoryRegistry, RegistryError};
pub use resolver::{resolve_endpoint, Direction, Resolver};
pub use timewalk::{traverse, Stage, Timewalk, TraversalOptions, Tuple, Visit, WalkIssue};
pub use tree::{Kind, Node, PathInvalid, Record};
pub use types::{DocumentId, ElementId, Item, ItemTag, Path, Position, Step};

/// Schema version for all serialized kernel types.
/// Increment on breaking changes to any schema type.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Default configuration version identifier.
pub const DEFAULT_CONFIG_VERSION: &str = "kernel_config_v1";
