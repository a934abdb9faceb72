//! Document registry.
//!
//! The coordinator never invents documents: every id it works with is looked
//! up here, and documents enter and leave through explicit
//! register/unregister calls on the implementation.

mod handle;
pub mod memory;

use crate::types::DocumentId;

pub(crate) use handle::Versioned;
pub use handle::DocumentHandle;
pub use memory::InMemoryRegistry;

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Id already in use.
    #[error("Document already registered: {0}")]
    AlreadyRegistered(DocumentId),
}

/// Lookup of documents by id.
///
/// Implementations must guarantee deterministic ordering of [`ids`](Self::ids).
pub trait DocumentRegistry: Send + Sync {
    /// Handle for `id`, if registered.
    fn lookup(&self, id: &DocumentId) -> Option<DocumentHandle>;

    /// All registered ids, in order.
    fn ids(&self) -> Vec<DocumentId>;
}
