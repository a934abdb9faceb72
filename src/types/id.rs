//! Identifiers: documents and stable element ids.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Identifier of a managed document.
///
/// Wraps a UUID and implements `Ord` so that multi-document commits can lock
/// handles in a deterministic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Create a new DocumentId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a DocumentId from a UUID string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Stable identifier of an element inside a piece.
///
/// Used by connective markings (slurs, ties) to refer to other elements
/// without holding a link into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(u64);

impl ElementId {
    /// Wrap a raw id value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Thread-safe source of fresh [`ElementId`]s.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Allocator starting at id 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocator whose first id is `first`.
    ///
    /// Use this after loading a document so new ids do not collide with
    /// the ones already stored in it.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Hand out the next id.
    pub fn allocate(&self) -> ElementId {
        ElementId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Ensure ids handed out from now on are greater than `seen`.
    pub fn observe(&self, seen: ElementId) {
        self.next.fetch_max(seen.0 + 1, Ordering::Relaxed);
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic() {
        let alloc = IdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert!(b > a);
        assert_eq!(a.get(), 1);
    }

    #[test]
    fn test_allocator_observe() {
        let alloc = IdAllocator::new();
        alloc.observe(ElementId::new(41));
        assert_eq!(alloc.allocate(), ElementId::new(42));
        // Observing an older id does not move the counter back.
        alloc.observe(ElementId::new(3));
        assert_eq!(alloc.allocate(), ElementId::new(43));
    }

    #[test]
    fn test_document_id_ordering() {
        let a = DocumentId::new(Uuid::from_u128(1));
        let b = DocumentId::new(Uuid::from_u128(2));
        assert!(a < b);
        assert_eq!(DocumentId::parse(&a.to_string()).unwrap(), a);
    }
}
