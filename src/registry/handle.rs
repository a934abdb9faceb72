//! Per-document current-version cells.
//!
//! A [`DocumentHandle`] is the only shared mutable state a document has: the
//! current tree, the stamp of the commit that installed it and a bounded
//! history of earlier versions. Readers take a short read lock to clone the
//! current `Arc`; the coordinator holds the write lock only while installing
//! a validated commit, so no reader ever sees half of one.

use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::tree::Node;
use crate::types::DocumentId;

/// Current version of one document, with its commit stamp and undo history.
#[derive(Debug)]
pub(crate) struct Versioned {
    pub(crate) stamp: u64,
    pub(crate) tree: Arc<Node>,
    pub(crate) history: VecDeque<Arc<Node>>,
}

#[derive(Debug)]
struct DocumentCell {
    id: DocumentId,
    state: RwLock<Versioned>,
}

/// Shared reference to a registered document.
///
/// Cloning is cheap; all clones refer to the same document.
#[derive(Clone)]
pub struct DocumentHandle {
    cell: Arc<DocumentCell>,
}

impl DocumentHandle {
    /// New document holding `tree`, never committed.
    pub fn new(id: DocumentId, tree: Arc<Node>) -> Self {
        Self {
            cell: Arc::new(DocumentCell {
                id,
                state: RwLock::new(Versioned {
                    stamp: 0,
                    tree,
                    history: VecDeque::new(),
                }),
            }),
        }
    }

    /// Document id.
    pub fn id(&self) -> DocumentId {
        self.cell.id
    }

    /// Current version. Outside a transaction this is the ordinary read
    /// path for traversals: the returned tree never changes.
    pub fn snapshot(&self) -> Arc<Node> {
        Arc::clone(&self.cell.state.read().tree)
    }

    /// Stamp of the commit that installed the current version (0 if none).
    pub fn stamp(&self) -> u64 {
        self.cell.state.read().stamp
    }

    /// Number of earlier versions available for undo.
    pub fn history_len(&self) -> usize {
        self.cell.state.read().history.len()
    }

    /// True if both handles refer to the same document cell.
    pub fn same_document(&self, other: &DocumentHandle) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Stamp and tree, read together.
    pub(crate) fn load(&self) -> (u64, Arc<Node>) {
        let state = self.cell.state.read();
        (state.stamp, Arc::clone(&state.tree))
    }

    /// History as of `stamp`, or `None` if a commit has happened since.
    pub(crate) fn history_at(&self, stamp: u64) -> Option<VecDeque<Arc<Node>>> {
        let state = self.cell.state.read();
        (state.stamp == stamp).then(|| state.history.clone())
    }

    /// Exclusive access for installing a commit.
    pub(crate) fn lock(&self) -> RwLockWriteGuard<'_, Versioned> {
        self.cell.state.write()
    }
}

impl fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("id", &self.cell.id)
            .field("stamp", &self.stamp())
            .finish()
    }
}
