//! One attempt of a transaction.
//!
//! ## Conflict detection
//!
//! A global clock hands out commit stamps. Each attempt records the clock as
//! its read point when it starts. Reading a document stamped after the read
//! point means some commit landed after the attempt's snapshot was taken:
//! the attempt is doomed and will be retried. At commit, every document the
//! attempt touched is locked in [`DocumentId`] order and re-checked against
//! the stamp it was read at, so an attempt commits only if its whole
//! snapshot is still current.

use parking_lot::RwLockWriteGuard;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::registry::{DocumentHandle, DocumentRegistry, Versioned};
use crate::tree::{self, Node};
use crate::types::{DocumentId, Path};

use super::edit::{Edit, EditOutcome};
use super::{Coordinator, EditError, TransactionConflict};

/// Global commit clock. Stamp 0 means "never committed".
static CLOCK: AtomicU64 = AtomicU64::new(0);

pub(crate) fn now() -> u64 {
    CLOCK.load(Ordering::SeqCst)
}

struct ReadEntry {
    handle: DocumentHandle,
    stamp: u64,
    tree: Arc<Node>,
}

struct WriteEntry {
    /// Version the pending history ends after.
    base: Arc<Node>,
    tree: Arc<Node>,
    history: VecDeque<Arc<Node>>,
}

/// Outcome of a successful commit.
#[derive(Debug, Clone)]
pub(crate) struct Installed {
    pub(crate) stamp: Option<u64>,
    pub(crate) documents: Vec<DocumentId>,
}

/// Handle given to a transaction body for one attempt.
///
/// Exists only while the body runs; it cannot be stored or sent elsewhere.
pub struct Transaction<'c, R: DocumentRegistry> {
    coordinator: &'c Coordinator<R>,
    attempt: u32,
    read_point: u64,
    reads: BTreeMap<DocumentId, ReadEntry>,
    writes: BTreeMap<DocumentId, WriteEntry>,
    doomed: Option<TransactionConflict>,
}

impl<'c, R: DocumentRegistry> Transaction<'c, R> {
    pub(crate) fn begin(coordinator: &'c Coordinator<R>, attempt: u32) -> Self {
        Self {
            coordinator,
            attempt,
            read_point: now(),
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
            doomed: None,
        }
    }

    /// Attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Clock value this attempt's snapshot corresponds to.
    pub fn read_point(&self) -> u64 {
        self.read_point
    }

    fn conflict(&mut self, document: DocumentId) -> EditError {
        let conflict = TransactionConflict {
            document,
            attempt: self.attempt,
        };
        if self.doomed.is_none() {
            self.doomed = Some(conflict);
        }
        EditError::Conflict(conflict)
    }

    /// Look up a registered document.
    pub fn handle(&self, id: DocumentId) -> Result<DocumentHandle, EditError> {
        self.coordinator
            .registry()
            .lookup(&id)
            .ok_or(EditError::DocumentNotFound(id))
    }

    /// Current version of `doc` in this attempt: own writes first, otherwise
    /// the snapshot. Repeated reads return the same version.
    pub fn read(&mut self, doc: &DocumentHandle) -> Result<Arc<Node>, EditError> {
        let id = doc.id();
        if let Some(conflict) = self.doomed {
            return Err(EditError::Conflict(conflict));
        }
        if let Some(entry) = self.writes.get(&id) {
            return Ok(Arc::clone(&entry.tree));
        }
        if let Some(entry) = self.reads.get(&id) {
            return Ok(Arc::clone(&entry.tree));
        }

        let (stamp, tree) = doc.load();
        if stamp > self.read_point {
            return Err(self.conflict(id));
        }
        self.reads.insert(
            id,
            ReadEntry {
                handle: doc.clone(),
                stamp,
                tree: Arc::clone(&tree),
            },
        );
        Ok(tree)
    }

    /// [`read`](Self::read) by id.
    pub fn read_doc(&mut self, id: DocumentId) -> Result<Arc<Node>, EditError> {
        let handle = self.handle(id)?;
        self.read(&handle)
    }

    /// Subtree of `doc` at `path`.
    pub fn resolve(&mut self, doc: &DocumentHandle, path: &Path) -> Result<Arc<Node>, EditError> {
        let root = self.read(doc)?;
        let node = tree::resolve(&root, path)?;
        Ok(Arc::clone(node))
    }

    fn write_entry(&mut self, doc: &DocumentHandle) -> Result<&mut WriteEntry, EditError> {
        let id = doc.id();
        if !self.writes.contains_key(&id) {
            let base = self.read(doc)?;
            let stamp = self.reads.get(&id).map(|r| r.stamp).unwrap_or_default();
            let Some(history) = doc.history_at(stamp) else {
                return Err(self.conflict(id));
            };
            self.writes.insert(
                id,
                WriteEntry {
                    base: Arc::clone(&base),
                    tree: base,
                    history,
                },
            );
        }
        self.writes.get_mut(&id).ok_or(EditError::DocumentNotFound(id))
    }

    /// Make `tree` the new version of `doc` when this attempt commits.
    pub fn write(&mut self, doc: &DocumentHandle, tree: Arc<Node>) -> Result<(), EditError> {
        if let Some(conflict) = self.doomed {
            return Err(EditError::Conflict(conflict));
        }
        self.write_entry(doc)?.tree = tree;
        Ok(())
    }

    /// [`write`](Self::write) by id.
    pub fn write_doc(&mut self, id: DocumentId, tree: Arc<Node>) -> Result<(), EditError> {
        let handle = self.handle(id)?;
        self.write(&handle, tree)
    }

    /// Apply one edit to `doc`. A path that does not resolve aborts the
    /// attempt with [`EditError::PathInvalid`].
    pub fn apply(&mut self, doc: &DocumentHandle, edit: Edit) -> Result<EditOutcome, EditError> {
        let current = self.read(doc)?;
        let name = edit.name();
        let (next, outcome) = edit.apply_to(&current, self.coordinator.ids())?;
        if outcome.changed {
            self.write(doc, next)?;
        }
        tracing::trace!(document = %doc.id(), edit = name, changed = outcome.changed, "Edit applied");
        Ok(outcome)
    }

    /// Restore the version before the last commit of `doc`.
    pub fn undo(&mut self, doc: &DocumentHandle) -> Result<(), EditError> {
        let entry = self.write_entry(doc)?;
        let previous = entry
            .history
            .pop_back()
            .ok_or(EditError::NothingToUndo(doc.id()))?;
        entry.base = Arc::clone(&previous);
        entry.tree = previous;
        Ok(())
    }

    /// Give up on the transaction. Nothing is applied and no retry happens.
    pub fn abort<T>(&self, reason: impl Into<String>) -> Result<T, EditError> {
        Err(EditError::Aborted(reason.into()))
    }

    pub(crate) fn doomed(&self) -> Option<TransactionConflict> {
        self.doomed
    }

    /// Validate and install. Read-only attempts install nothing.
    pub(crate) fn commit(self, history_depth: usize) -> Result<Installed, TransactionConflict> {
        let Transaction {
            attempt,
            reads,
            writes,
            doomed,
            ..
        } = self;
        if let Some(conflict) = doomed {
            return Err(conflict);
        }
        if writes.is_empty() {
            return Ok(Installed {
                stamp: None,
                documents: Vec::new(),
            });
        }

        // Every written document was read first, so `reads` covers both sets
        // and iterates in id order.
        let mut guards: BTreeMap<DocumentId, RwLockWriteGuard<'_, Versioned>> = BTreeMap::new();
        for (id, entry) in &reads {
            let guard = entry.handle.lock();
            if guard.stamp != entry.stamp {
                return Err(TransactionConflict {
                    document: *id,
                    attempt,
                });
            }
            guards.insert(*id, guard);
        }

        let stamp = CLOCK.fetch_add(1, Ordering::SeqCst) + 1;
        let mut documents = Vec::with_capacity(writes.len());
        for (id, entry) in writes {
            let Some(guard) = guards.get_mut(&id) else {
                continue;
            };
            let WriteEntry {
                base,
                tree,
                mut history,
            } = entry;
            if !Arc::ptr_eq(&base, &tree) {
                history.push_back(base);
            }
            while history.len() > history_depth {
                history.pop_front();
            }
            guard.tree = tree;
            guard.history = history;
            guard.stamp = stamp;
            documents.push(id);
        }
        Ok(Installed {
            stamp: Some(stamp),
            documents,
        })
    }
}
