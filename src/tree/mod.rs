//! The document tree.
//!
//! A piece is a strictly hierarchical tree of immutable [`Node`]s. Children
//! are held in `Arc`s so that a new version produced by an edit shares every
//! untouched branch with the version it was derived from. Nothing in the tree
//! points back up or sideways; connections between distant elements are
//! [`ElementId`](crate::types::ElementId)s resolved on demand.
//!
//! ## Shape
//!
//! ```text
//! Piece { musicians: [Musician { instruments: [Instrument { staves: [Staff {
//!     voices: [Voice { measures: [Measure { items: [Pitch | Rest | Chord |
//!     Marker | Tuplet { ratio, items }] }] }] }] }] }],
//!     time-signatures, key-signatures, tempos }
//! ```
//!
//! The engine itself only relies on the node variants and on the
//! [`Kind::Voice`] / [`Kind::Tuplet`] record kinds; every other kind is
//! structure.

pub mod edit;
pub mod collection;
pub mod build;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::types::{ChangeSet, Item, Path, Position, Step, Value};

pub use collection::{
    append, apply_collection, get, get_all, insert, move_down, move_up, remove, set, set_all,
    CollectionOp,
};
pub use edit::{assign_id, edit, replace, try_edit};

/// Kind of a record node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Whole piece.
    Piece,
    /// A performer.
    Musician,
    /// An instrument played by a musician.
    Instrument,
    /// A staff of an instrument.
    Staff,
    /// One independently-timed stream of items.
    Voice,
    /// A measure within a voice.
    Measure,
    /// Items played at `ratio` of their written duration.
    Tuplet,
    /// Any other grouping.
    Group,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Piece => "piece",
            Self::Musician => "musician",
            Self::Instrument => "instrument",
            Self::Staff => "staff",
            Self::Voice => "voice",
            Self::Measure => "measure",
            Self::Tuplet => "tuplet",
            Self::Group => "group",
        };
        write!(f, "{}", name)
    }
}

/// A node with named fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// What this record represents.
    pub kind: Kind,
    /// Fields by name.
    pub fields: BTreeMap<Arc<str>, Arc<Node>>,
}

impl Record {
    /// Empty record of `kind`.
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Copy with `name` set to `child`.
    pub fn with(&self, name: &str, child: impl Into<Arc<Node>>) -> Self {
        let mut next = self.clone();
        next.fields.insert(Arc::from(name), child.into());
        next
    }

    /// Field by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Node>> {
        self.fields.get(name)
    }
}

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Named fields.
    Record(Record),
    /// Ordered collection.
    List(Vec<Arc<Node>>),
    /// Musical leaf.
    Item(Item),
    /// Scalar.
    Value(Value),
    /// Position-keyed field.
    Changes(ChangeSet),
}

/// Why a step could not be taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Mismatch {
    /// Record has no such field.
    #[error("no field `{0}`")]
    MissingField(String),
    /// Index beyond the end of a list.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Actual length.
        len: usize,
    },
    /// Field step applied to something that is not a record.
    #[error("expected a record, found {0}")]
    NotARecord(String),
    /// Index step or collection operation applied to something that is not a list.
    #[error("expected a list, found {0}")]
    NotAList(String),
    /// Item operation applied to something that is not an item.
    #[error("expected an item, found {0}")]
    NotAnItem(String),
    /// ChangeSet operation applied to something that is not a ChangeSet.
    #[error("expected a changeset, found {0}")]
    NotChanges(String),
    /// ChangeSet has no entry at the position.
    #[error("no changeset entry at {0}")]
    NoEntry(Position),
}

/// A path did not resolve against the tree version it was applied to.
///
/// This is an expected, cheap result: concurrent edits routinely invalidate
/// addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Path {path} invalid at step {depth}: {reason}")]
pub struct PathInvalid {
    /// The path that failed.
    pub path: Path,
    /// Index of the step that failed (`path.len()` for the target itself).
    pub depth: usize,
    /// What was wrong there.
    pub reason: Mismatch,
}

impl PathInvalid {
    pub(crate) fn at(path: &Path, depth: usize, reason: Mismatch) -> Self {
        Self {
            path: path.clone(),
            depth,
            reason,
        }
    }
}

impl Node {
    /// Empty record of `kind`.
    pub fn record(kind: Kind) -> Self {
        Self::Record(Record::new(kind))
    }

    /// List of children.
    pub fn list<I, N>(children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Arc<Node>>,
    {
        Self::List(children.into_iter().map(Into::into).collect())
    }

    /// Short description of the variant, for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Record(r) => format!("{} record", r.kind),
            Self::List(l) => format!("list of {}", l.len()),
            Self::Item(i) => format!("{} item", i.tag()),
            Self::Value(_) => "value".to_string(),
            Self::Changes(_) => "changeset".to_string(),
        }
    }

    /// Record kind, if this is a record.
    pub fn kind(&self) -> Option<Kind> {
        self.as_record().map(|r| r.kind)
    }

    /// As a record.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// As a list.
    pub fn as_list(&self) -> Option<&[Arc<Node>]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// As an item.
    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Self::Item(i) => Some(i),
            _ => None,
        }
    }

    /// As a scalar value.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// As a ChangeSet.
    pub fn as_changes(&self) -> Option<&ChangeSet> {
        match self {
            Self::Changes(c) => Some(c),
            _ => None,
        }
    }

    /// Field of a record by name.
    pub fn field(&self, name: &str) -> Option<&Arc<Node>> {
        self.as_record().and_then(|r| r.get(name))
    }

    /// Child of a list by index.
    pub fn child(&self, index: usize) -> Option<&Arc<Node>> {
        self.as_list().and_then(|l| l.get(index))
    }

    /// Copy of this record with a field set (builder "set-field").
    pub fn with_field(&self, name: &str, child: impl Into<Arc<Node>>) -> Result<Node, Mismatch> {
        match self {
            Self::Record(r) => Ok(Self::Record(r.with(name, child))),
            other => Err(Mismatch::NotARecord(other.describe())),
        }
    }

    /// Copy of this list with a child appended (builder "add-child").
    pub fn with_child(&self, child: impl Into<Arc<Node>>) -> Result<Node, Mismatch> {
        match self {
            Self::List(l) => {
                let mut next = Vec::with_capacity(l.len() + 1);
                next.extend(l.iter().cloned());
                next.push(child.into());
                Ok(Self::List(next))
            }
            other => Err(Mismatch::NotAList(other.describe())),
        }
    }

    /// Take one step down.
    pub(crate) fn step(&self, step: &Step) -> Result<&Arc<Node>, Mismatch> {
        match (self, step) {
            (Self::List(l), Step::Index(i)) => l.get(*i).ok_or(Mismatch::IndexOutOfRange {
                index: *i,
                len: l.len(),
            }),
            (other, Step::Index(_)) => Err(Mismatch::NotAList(other.describe())),
            (Self::Record(r), field) => {
                let name = field.as_field().unwrap_or_default();
                r.get(name)
                    .ok_or_else(|| Mismatch::MissingField(name.to_string()))
            }
            (other, _) => Err(Mismatch::NotARecord(other.describe())),
        }
    }

    /// Copy of this node with the child at `step` replaced. The step must
    /// already be valid for this node.
    pub(crate) fn with_step(&self, step: &Step, child: Arc<Node>) -> Result<Node, Mismatch> {
        match (self, step) {
            (Self::List(l), Step::Index(i)) => {
                if *i >= l.len() {
                    return Err(Mismatch::IndexOutOfRange {
                        index: *i,
                        len: l.len(),
                    });
                }
                let mut next = l.clone();
                next[*i] = child;
                Ok(Self::List(next))
            }
            (other, Step::Index(_)) => Err(Mismatch::NotAList(other.describe())),
            (Self::Record(r), field) => {
                let name = field.as_field().unwrap_or_default();
                if r.get(name).is_none() {
                    return Err(Mismatch::MissingField(name.to_string()));
                }
                Ok(Self::Record(r.with(name, child)))
            }
            (other, _) => Err(Mismatch::NotARecord(other.describe())),
        }
    }
}

impl From<Item> for Node {
    fn from(item: Item) -> Self {
        Self::Item(item)
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<ChangeSet> for Node {
    fn from(cs: ChangeSet) -> Self {
        Self::Changes(cs)
    }
}

impl From<Record> for Node {
    fn from(r: Record) -> Self {
        Self::Record(r)
    }
}

/// Walk `root` along `path`.
///
/// Absence is an ordinary result: a wrong index, a missing field or a step
/// of the wrong type at some position all yield [`PathInvalid`] naming the
/// failing step.
pub fn resolve<'a>(root: &'a Arc<Node>, path: &Path) -> Result<&'a Arc<Node>, PathInvalid> {
    let mut node = root;
    for (depth, step) in path.steps().iter().enumerate() {
        node = node
            .step(step)
            .map_err(|reason| PathInvalid::at(path, depth, reason))?;
    }
    Ok(node)
}

/// Resolve `path` and require an item there.
pub fn resolve_item<'a>(root: &'a Arc<Node>, path: &Path) -> Result<&'a Item, PathInvalid> {
    let node = resolve(root, path)?;
    node.as_item()
        .ok_or_else(|| PathInvalid::at(path, path.len(), Mismatch::NotAnItem(node.describe())))
}

impl Path {
    /// Resolve this path against `root`. See [`resolve`].
    pub fn resolve<'a>(&self, root: &'a Arc<Node>) -> Result<&'a Arc<Node>, PathInvalid> {
        resolve(root, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build;

    fn sample() -> Arc<Node> {
        let measure = build::measure(vec![
            build::pitch("C4", Position::new(1, 4)),
            build::rest(Position::new(1, 4)),
        ]);
        build::voice(vec![measure])
    }

    #[test]
    fn test_resolve_success() {
        let root = sample();
        let path = Path::parse("[:measures 0 :items 1]").unwrap();
        let node = resolve(&root, &path).unwrap();
        assert_eq!(node.as_item().map(|i| i.duration()), Some(Position::new(1, 4)));
    }

    #[test]
    fn test_resolve_accepts_aliases() {
        let root = sample();
        let full = Path::parse("[:measures 0 :items 0]").unwrap();
        let a = resolve(&root, &full).unwrap();
        let b = resolve(&root, &full.compact()).unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_single_letter_field_is_distinct_from_alias() {
        let record = Node::record(Kind::Group)
            .with_field("a", build::rest(Position::new(1, 4)))
            .and_then(|r| r.with_field("name", Node::Value(Value::from("solo"))))
            .unwrap();
        let root = Arc::new(record);
        assert_eq!(root.as_record().map(|r| r.fields.len()), Some(2));

        let by_field = resolve(&root, &Path::parse("[:a]").unwrap()).unwrap();
        let by_alias = resolve(&root, &Path::parse("[@a]").unwrap()).unwrap();
        assert!(by_field.as_item().is_some());
        assert!(by_alias.as_value().is_some());
    }

    #[test]
    fn test_resolve_index_out_of_range() {
        let root = sample();
        let path = Path::parse("[:measures 0 :items 5]").unwrap();
        let err = resolve(&root, &path).unwrap_err();
        assert_eq!(err.depth, 3);
        assert_eq!(err.reason, Mismatch::IndexOutOfRange { index: 5, len: 2 });
    }

    #[test]
    fn test_resolve_type_mismatch() {
        let root = sample();
        let err = resolve(&root, &Path::parse("[0]").unwrap()).unwrap_err();
        assert!(matches!(err.reason, Mismatch::NotAList(_)));

        let err = resolve(&root, &Path::parse("[:measures :items]").unwrap()).unwrap_err();
        assert_eq!(err.depth, 1);
        assert!(matches!(err.reason, Mismatch::NotARecord(_)));
    }

    #[test]
    fn test_resolve_missing_field() {
        let root = sample();
        let err = resolve(&root, &Path::parse("[:staves 0]").unwrap()).unwrap_err();
        assert_eq!(err.reason, Mismatch::MissingField("staves".to_string()));
    }

    #[test]
    fn test_builders_do_not_mutate() {
        let base = Node::record(Kind::Group);
        let with = base.with_field("name", Node::Value(Value::from("x"))).unwrap();
        assert!(base.field("name").is_none());
        assert!(with.field("name").is_some());

        let list = Node::list(Vec::<Arc<Node>>::new());
        let grown = list.with_child(build::rest(Position::new(1, 4))).unwrap();
        assert_eq!(list.as_list().map(|l| l.len()), Some(0));
        assert_eq!(grown.as_list().map(|l| l.len()), Some(1));
        assert!(base.with_child(build::rest(Position::ZERO)).is_err());
    }
}
