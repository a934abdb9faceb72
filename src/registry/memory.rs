//! In-memory document registry.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::tree::Node;
use crate::types::DocumentId;

use super::{DocumentHandle, DocumentRegistry, RegistryError};

/// In-memory registry.
///
/// Uses a BTreeMap for deterministic iteration order.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    documents: RwLock<BTreeMap<DocumentId, DocumentHandle>>,
}

impl InMemoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tree` under a fresh id.
    pub fn register(&self, tree: Arc<Node>) -> DocumentHandle {
        let id = DocumentId::random();
        let handle = DocumentHandle::new(id, tree);
        self.documents.write().insert(id, handle.clone());
        tracing::debug!(document = %id, "Registered document");
        handle
    }

    /// Register `tree` under a caller-chosen id.
    pub fn register_with_id(
        &self,
        id: DocumentId,
        tree: Arc<Node>,
    ) -> Result<DocumentHandle, RegistryError> {
        let mut documents = self.documents.write();
        if documents.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        let handle = DocumentHandle::new(id, tree);
        documents.insert(id, handle.clone());
        tracing::debug!(document = %id, "Registered document");
        Ok(handle)
    }

    /// Remove a document. Outstanding handles stay usable but are no longer
    /// reachable by id.
    pub fn unregister(&self, id: &DocumentId) -> Option<DocumentHandle> {
        let removed = self.documents.write().remove(id);
        if removed.is_some() {
            tracing::debug!(document = %id, "Unregistered document");
        }
        removed
    }

    /// Get number of documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// True if no document is registered.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl DocumentRegistry for InMemoryRegistry {
    fn lookup(&self, id: &DocumentId) -> Option<DocumentHandle> {
        self.documents.read().get(id).cloned()
    }

    fn ids(&self) -> Vec<DocumentId> {
        self.documents.read().keys().copied().collect()
    }
}
