//! Position-keyed fields.
//!
//! A ChangeSet holds values whose effect depends on where in time you look:
//! time signatures, key signatures, tempi. Each entry is in effect from its
//! position until the next entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::position::Position;
use super::value::Value;

/// Error building a ChangeSet from untrusted entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeSetError {
    /// Entry positions were not strictly increasing.
    #[error("ChangeSet positions must be strictly increasing (at {0})")]
    NotIncreasing(Position),
}

/// Sparse ordered mapping from position to the value in effect from there on.
///
/// Keys are strictly increasing by construction: the map cannot hold two
/// entries for one position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<(Position, Value)>", into = "Vec<(Position, Value)>")]
pub struct ChangeSet {
    entries: BTreeMap<Position, Value>,
}

impl ChangeSet {
    /// Empty ChangeSet.
    pub fn new() -> Self {
        Self::default()
    }

    /// ChangeSet with one value in effect from position zero.
    pub fn starting_with(value: Value) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(Position::ZERO, value);
        Self { entries }
    }

    /// Build from entries that must already be strictly increasing.
    pub fn from_entries(entries: Vec<(Position, Value)>) -> Result<Self, ChangeSetError> {
        let mut map = BTreeMap::new();
        let mut last: Option<Position> = None;
        for (pos, value) in entries {
            if last.is_some_and(|l| pos <= l) {
                return Err(ChangeSetError::NotIncreasing(pos));
            }
            last = Some(pos);
            map.insert(pos, value);
        }
        Ok(Self { entries: map })
    }

    /// Value in effect at `position`: the entry at or immediately before it.
    pub fn value_at(&self, position: Position) -> Option<&Value> {
        self.entries.range(..=position).next_back().map(|(_, v)| v)
    }

    /// Value in effect at `position`, or `default` when nothing is in effect.
    pub fn value_at_or<'a>(&'a self, position: Position, default: &'a Value) -> &'a Value {
        self.value_at(position).unwrap_or(default)
    }

    /// Copy with `value` taking effect at `position`, replacing any entry there.
    pub fn with(&self, position: Position, value: Value) -> Self {
        let mut next = self.clone();
        next.entries.insert(position, value);
        next
    }

    /// Copy without the entry at `position`. Returns `None` if there was none.
    pub fn without(&self, position: Position) -> Option<Self> {
        let mut next = self.clone();
        next.entries.remove(&position)?;
        Some(next)
    }

    /// Entry exactly at `position`.
    pub fn get(&self, position: Position) -> Option<&Value> {
        self.entries.get(&position)
    }

    /// Entries in position order.
    pub fn iter(&self) -> impl Iterator<Item = (&Position, &Value)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Vec<(Position, Value)>> for ChangeSet {
    type Error = ChangeSetError;

    fn try_from(entries: Vec<(Position, Value)>) -> Result<Self, Self::Error> {
        Self::from_entries(entries)
    }
}

impl From<ChangeSet> for Vec<(Position, Value)> {
    fn from(cs: ChangeSet) -> Self {
        cs.entries.into_iter().collect()
    }
}
