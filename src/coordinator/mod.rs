//! Transactional mutation coordinator.
//!
//! [`Coordinator::with_transaction`] runs a body against consistent
//! snapshots of any number of documents and installs all of the body's
//! writes together, or none of them.
//!
//! ## Attempt lifecycle
//!
//! ```text
//! Started ─┬─> Committed
//!          ├─> Retried ──> Started      (conflict, budget left)
//!          └─> Aborted                  (body error or retry budget spent)
//! ```
//!
//! A conflicting attempt is thrown away and the body runs again with fresh
//! snapshots, so a body must not have side effects outside the transaction.
//! Conflicts never reach the caller: they are retried under the configured
//! [`RetryPolicy`](crate::policy::RetryPolicy) until the budget is spent,
//! which surfaces as [`EditError::RetryLimit`].

pub mod edit;
mod transaction;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::policy::{Backoff, KernelConfig};
use crate::registry::{DocumentHandle, DocumentRegistry, InMemoryRegistry};
use crate::tree::PathInvalid;
use crate::types::{DocumentId, IdAllocator};

pub use edit::{AutoCommit, Edit, EditContext, EditOutcome};
pub use transaction::Transaction;

/// Another commit invalidated this attempt's snapshot.
///
/// Handled by the retry loop; [`Coordinator::with_transaction`] never
/// returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Transaction conflict on document {document} (attempt {attempt})")]
pub struct TransactionConflict {
    /// Document whose version moved.
    pub document: DocumentId,
    /// Attempt that lost.
    pub attempt: u32,
}

/// Error type for transactional edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    /// A path did not resolve; nothing was applied.
    #[error("{0}")]
    PathInvalid(#[from] PathInvalid),
    /// No document with this id is registered.
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),
    /// Conflicts persisted for the whole retry budget.
    #[error("Transaction gave up after {attempts} attempts")]
    RetryLimit {
        /// Attempts made.
        attempts: u32,
    },
    /// The body gave up.
    #[error("Transaction aborted: {0}")]
    Aborted(String),
    /// Undo requested with no earlier version recorded.
    #[error("Nothing to undo for document {0}")]
    NothingToUndo(DocumentId),
    /// The edit request itself is malformed.
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),
    /// Internal retry signal; only ever seen inside a transaction body.
    #[error("{0}")]
    Conflict(#[from] TransactionConflict),
}

/// States of one attempt, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Body is running.
    Started,
    /// Writes installed.
    Committed,
    /// Conflict; another attempt follows.
    Retried,
    /// Gave up; nothing installed.
    Aborted,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Committed => write!(f, "committed"),
            Self::Retried => write!(f, "retried"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Record of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit stamp, `None` for read-only transactions.
    pub stamp: Option<u64>,
    /// Documents that received a new version, in id order.
    pub documents: Vec<DocumentId>,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
    /// Wall-clock commit time.
    pub committed_at: DateTime<Utc>,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Transactions committed (read-only ones included).
    pub commits: u64,
    /// Attempts retried after a conflict.
    pub retries: u64,
    /// Transactions that ended in an error.
    pub aborts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    commits: AtomicU64,
    retries: AtomicU64,
    aborts: AtomicU64,
}

/// Runs transactions over the documents of a registry.
///
/// Share it between threads behind an `Arc`; every method takes `&self`.
pub struct Coordinator<R: DocumentRegistry = InMemoryRegistry> {
    registry: Arc<R>,
    config: KernelConfig,
    ids: IdAllocator,
    counters: Counters,
}

impl<R: DocumentRegistry> Coordinator<R> {
    /// Create a coordinator over `registry`.
    pub fn new(registry: Arc<R>, config: KernelConfig) -> Self {
        Self {
            registry,
            config,
            ids: IdAllocator::new(),
            counters: Counters::default(),
        }
    }

    /// Use `ids` for element ids, e.g. one primed with
    /// [`IdAllocator::observe`] after loading documents.
    pub fn with_ids(mut self, ids: IdAllocator) -> Self {
        self.ids = ids;
        self
    }

    /// The registry documents are looked up in.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Element id allocator.
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Handle for a registered document.
    pub fn document(&self, id: DocumentId) -> Result<DocumentHandle, EditError> {
        self.registry
            .lookup(&id)
            .ok_or(EditError::DocumentNotFound(id))
    }

    /// Edit context committing every operation on its own.
    pub fn autocommit(&self) -> AutoCommit<'_, R> {
        AutoCommit::new(self)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            commits: self.counters.commits.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            aborts: self.counters.aborts.load(Ordering::Relaxed),
        }
    }

    /// Run `body` atomically. See the module docs for retry behaviour.
    pub fn with_transaction<T, F>(&self, body: F) -> Result<T, EditError>
    where
        F: FnMut(&mut Transaction<'_, R>) -> Result<T, EditError>,
    {
        self.with_transaction_recorded(body).map(|(value, _)| value)
    }

    /// [`with_transaction`](Self::with_transaction), also returning what was
    /// committed.
    pub fn with_transaction_recorded<T, F>(&self, mut body: F) -> Result<(T, CommitRecord), EditError>
    where
        F: FnMut(&mut Transaction<'_, R>) -> Result<T, EditError>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut tx = Transaction::begin(self, attempt);
            tracing::trace!(attempt, read_point = tx.read_point(), state = %AttemptState::Started, "Transaction attempt");

            let result = body(&mut tx);
            let conflict = match (result, tx.doomed()) {
                // A conflict the body swallowed still dooms the attempt.
                (_, Some(conflict)) | (Err(EditError::Conflict(conflict)), None) => conflict,
                (Err(error), None) => {
                    self.counters.aborts.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(attempt, %error, state = %AttemptState::Aborted, "Transaction aborted");
                    return Err(error);
                }
                (Ok(value), None) => match tx.commit(self.config.history_depth) {
                    Ok(installed) => {
                        self.counters.commits.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            attempt,
                            stamp = ?installed.stamp,
                            documents = installed.documents.len(),
                            state = %AttemptState::Committed,
                            "Transaction committed"
                        );
                        let record = CommitRecord {
                            stamp: installed.stamp,
                            documents: installed.documents,
                            attempts: attempt,
                            committed_at: Utc::now(),
                        };
                        return Ok((value, record));
                    }
                    Err(conflict) => conflict,
                },
            };

            match self.config.retry.backoff(attempt) {
                Backoff::Yield => {
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(attempt, document = %conflict.document, state = %AttemptState::Retried, "Transaction conflict, retrying");
                    std::thread::yield_now();
                }
                Backoff::Sleep(delay) => {
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        attempt,
                        document = %conflict.document,
                        delay_us = delay.as_micros() as u64,
                        state = %AttemptState::Retried,
                        "Transaction contended, backing off"
                    );
                    std::thread::sleep(delay);
                }
                Backoff::Exhausted => {
                    self.counters.aborts.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(attempt, document = %conflict.document, state = %AttemptState::Aborted, "Transaction retry budget exhausted");
                    return Err(EditError::RetryLimit { attempts: attempt });
                }
            }
        }
    }

    /// Restore the previous version of `doc` in its own transaction.
    pub fn undo(&self, doc: &DocumentHandle) -> Result<(), EditError> {
        self.with_transaction(|tx| tx.undo(doc))
    }
}

impl Coordinator<InMemoryRegistry> {
    /// Coordinator over a fresh in-memory registry.
    pub fn in_memory(config: KernelConfig) -> Self {
        Self::new(Arc::new(InMemoryRegistry::new()), config)
    }
}
