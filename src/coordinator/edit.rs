//! Path-addressed edits and the contexts that apply them.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::registry::{DocumentHandle, DocumentRegistry};
use crate::tree::{self, CollectionOp, Mismatch, Node, PathInvalid};
use crate::types::{ElementId, IdAllocator, Path, Position, Value};

use super::{Coordinator, EditError, Transaction};

/// One edit of one document, addressed by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum Edit {
    /// Replace the node at `path`.
    SetNode {
        /// Target.
        path: Path,
        /// Replacement.
        node: Arc<Node>,
    },
    /// Set field `name` of the record at `path`.
    SetField {
        /// Record.
        path: Path,
        /// Field name.
        name: String,
        /// New value.
        node: Arc<Node>,
    },
    /// Append to the list at `path`.
    AddItem {
        /// List.
        path: Path,
        /// New child.
        node: Arc<Node>,
    },
    /// Insert into the list at `path` before `index`.
    InsertItem {
        /// List.
        path: Path,
        /// Insertion point.
        index: usize,
        /// New child.
        node: Arc<Node>,
    },
    /// Replace child `index` of the list at `path`.
    SetItem {
        /// List.
        path: Path,
        /// Target index.
        index: usize,
        /// Replacement.
        node: Arc<Node>,
    },
    /// Replace all children of the list at `path`.
    SetAll {
        /// List.
        path: Path,
        /// New children.
        nodes: Vec<Arc<Node>>,
    },
    /// Remove child `index` of the list at `path`.
    RemoveItem {
        /// List.
        path: Path,
        /// Target index.
        index: usize,
    },
    /// Move child `index` one place towards the front.
    MoveUp {
        /// List.
        path: Path,
        /// Target index.
        index: usize,
    },
    /// Move child `index` one place towards the back.
    MoveDown {
        /// List.
        path: Path,
        /// Target index.
        index: usize,
    },
    /// Set the changeset entry at `at`.
    SetChange {
        /// Changeset field.
        path: Path,
        /// Entry position.
        at: Position,
        /// Entry value.
        value: Value,
    },
    /// Remove the changeset entry at `at`.
    RemoveChange {
        /// Changeset field.
        path: Path,
        /// Entry position.
        at: Position,
    },
    /// Give the item at `path` a stable id if it has none.
    AssignId {
        /// Item.
        path: Path,
    },
}

/// Result of applying one edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOutcome {
    /// The tree changed.
    pub changed: bool,
    /// Id assigned or found by [`Edit::AssignId`].
    pub id: Option<ElementId>,
}

impl Edit {
    /// Path the edit addresses.
    pub fn path(&self) -> &Path {
        match self {
            Self::SetNode { path, .. }
            | Self::SetField { path, .. }
            | Self::AddItem { path, .. }
            | Self::InsertItem { path, .. }
            | Self::SetItem { path, .. }
            | Self::SetAll { path, .. }
            | Self::RemoveItem { path, .. }
            | Self::MoveUp { path, .. }
            | Self::MoveDown { path, .. }
            | Self::SetChange { path, .. }
            | Self::RemoveChange { path, .. }
            | Self::AssignId { path } => path,
        }
    }

    /// Short name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetNode { .. } => "set_node",
            Self::SetField { .. } => "set_field",
            Self::AddItem { .. } => "add_item",
            Self::InsertItem { .. } => "insert_item",
            Self::SetItem { .. } => "set_item",
            Self::SetAll { .. } => "set_all",
            Self::RemoveItem { .. } => "remove_item",
            Self::MoveUp { .. } => "move_up",
            Self::MoveDown { .. } => "move_down",
            Self::SetChange { .. } => "set_change",
            Self::RemoveChange { .. } => "remove_change",
            Self::AssignId { .. } => "assign_id",
        }
    }

    /// Apply to `root`, producing the new version. `root` is never modified.
    pub fn apply_to(
        self,
        root: &Arc<Node>,
        ids: &IdAllocator,
    ) -> Result<(Arc<Node>, EditOutcome), PathInvalid> {
        let mut assigned = None;
        let next = match self {
            Self::SetNode { path, node } => tree::replace(root, &path, node)?,
            Self::SetField { path, name, node } => tree::try_edit(root, &path, |target| {
                target.with_field(&name, node).map(Arc::new)
            })?,
            Self::AddItem { path, node } => {
                tree::apply_collection(root, &path, CollectionOp::Append { node })?
            }
            Self::InsertItem { path, index, node } => {
                tree::apply_collection(root, &path, CollectionOp::Insert { index, node })?
            }
            Self::SetItem { path, index, node } => {
                tree::apply_collection(root, &path, CollectionOp::Set { index, node })?
            }
            Self::SetAll { path, nodes } => {
                tree::apply_collection(root, &path, CollectionOp::SetAll { nodes })?
            }
            Self::RemoveItem { path, index } => {
                tree::apply_collection(root, &path, CollectionOp::Remove { index })?
            }
            Self::MoveUp { path, index } => {
                tree::apply_collection(root, &path, CollectionOp::MoveUp { index })?
            }
            Self::MoveDown { path, index } => {
                tree::apply_collection(root, &path, CollectionOp::MoveDown { index })?
            }
            Self::SetChange { path, at, value } => tree::try_edit(root, &path, |target| {
                target
                    .as_changes()
                    .map(|changes| Arc::new(Node::Changes(changes.with(at, value))))
                    .ok_or_else(|| Mismatch::NotChanges(target.describe()))
            })?,
            Self::RemoveChange { path, at } => tree::try_edit(root, &path, |target| {
                let changes = target
                    .as_changes()
                    .ok_or_else(|| Mismatch::NotChanges(target.describe()))?;
                changes
                    .without(at)
                    .map(|c| Arc::new(Node::Changes(c)))
                    .ok_or(Mismatch::NoEntry(at))
            })?,
            Self::AssignId { path } => {
                let (next, id) = tree::assign_id(root, &path, ids)?;
                assigned = Some(id);
                next
            }
        };
        let changed = !Arc::ptr_eq(root, &next);
        Ok((
            next,
            EditOutcome {
                changed,
                id: assigned,
            },
        ))
    }
}

/// Something edits can be applied through.
///
/// Implemented by [`Transaction`], where edits join the enclosing
/// transaction, and by [`AutoCommit`], where each edit commits on its own.
/// Callers never see locks or stamps either way.
pub trait EditContext {
    /// Apply one edit to `doc`.
    fn apply(&mut self, doc: &DocumentHandle, edit: Edit) -> Result<EditOutcome, EditError>;

    /// Current version of `doc` as this context sees it.
    fn snapshot(&mut self, doc: &DocumentHandle) -> Result<Arc<Node>, EditError>;

    /// Subtree of `doc` at `path`.
    fn get(&mut self, doc: &DocumentHandle, path: &Path) -> Result<Arc<Node>, EditError> {
        let root = self.snapshot(doc)?;
        let node = tree::resolve(&root, path)?;
        Ok(Arc::clone(node))
    }

    /// Replace the node at `path`.
    fn set_node(&mut self, doc: &DocumentHandle, path: Path, node: Arc<Node>) -> Result<(), EditError> {
        self.apply(doc, Edit::SetNode { path, node }).map(|_| ())
    }

    /// Set a record field.
    fn set_field(
        &mut self,
        doc: &DocumentHandle,
        path: Path,
        name: &str,
        node: Arc<Node>,
    ) -> Result<(), EditError> {
        let name = name.to_string();
        self.apply(doc, Edit::SetField { path, name, node }).map(|_| ())
    }

    /// Append to a list.
    fn add_item(&mut self, doc: &DocumentHandle, path: Path, node: Arc<Node>) -> Result<(), EditError> {
        self.apply(doc, Edit::AddItem { path, node }).map(|_| ())
    }

    /// Insert into a list.
    fn insert_item(
        &mut self,
        doc: &DocumentHandle,
        path: Path,
        index: usize,
        node: Arc<Node>,
    ) -> Result<(), EditError> {
        self.apply(doc, Edit::InsertItem { path, index, node }).map(|_| ())
    }

    /// Replace one child of a list.
    fn set_item(
        &mut self,
        doc: &DocumentHandle,
        path: Path,
        index: usize,
        node: Arc<Node>,
    ) -> Result<(), EditError> {
        self.apply(doc, Edit::SetItem { path, index, node }).map(|_| ())
    }

    /// Replace all children of a list.
    fn set_all(
        &mut self,
        doc: &DocumentHandle,
        path: Path,
        nodes: Vec<Arc<Node>>,
    ) -> Result<(), EditError> {
        self.apply(doc, Edit::SetAll { path, nodes }).map(|_| ())
    }

    /// Remove one child of a list.
    fn remove_item(&mut self, doc: &DocumentHandle, path: Path, index: usize) -> Result<(), EditError> {
        self.apply(doc, Edit::RemoveItem { path, index }).map(|_| ())
    }

    /// Move one child of a list towards the front.
    fn move_up(&mut self, doc: &DocumentHandle, path: Path, index: usize) -> Result<(), EditError> {
        self.apply(doc, Edit::MoveUp { path, index }).map(|_| ())
    }

    /// Move one child of a list towards the back.
    fn move_down(&mut self, doc: &DocumentHandle, path: Path, index: usize) -> Result<(), EditError> {
        self.apply(doc, Edit::MoveDown { path, index }).map(|_| ())
    }

    /// Set a changeset entry.
    fn set_change(
        &mut self,
        doc: &DocumentHandle,
        path: Path,
        at: Position,
        value: Value,
    ) -> Result<(), EditError> {
        self.apply(doc, Edit::SetChange { path, at, value }).map(|_| ())
    }

    /// Remove a changeset entry.
    fn remove_change(&mut self, doc: &DocumentHandle, path: Path, at: Position) -> Result<(), EditError> {
        self.apply(doc, Edit::RemoveChange { path, at }).map(|_| ())
    }

    /// Stable id of the item at `path`, assigning one if needed.
    fn assign_id(&mut self, doc: &DocumentHandle, path: Path) -> Result<ElementId, EditError> {
        self.apply(doc, Edit::AssignId { path: path.clone() })?
            .id
            .ok_or_else(|| EditError::InvalidEdit(format!("no id assigned at {}", path)))
    }
}

impl<'c, R: DocumentRegistry> EditContext for Transaction<'c, R> {
    fn apply(&mut self, doc: &DocumentHandle, edit: Edit) -> Result<EditOutcome, EditError> {
        Transaction::apply(self, doc, edit)
    }

    fn snapshot(&mut self, doc: &DocumentHandle) -> Result<Arc<Node>, EditError> {
        self.read(doc)
    }
}

/// Edit context where every operation is its own transaction.
pub struct AutoCommit<'c, R: DocumentRegistry> {
    coordinator: &'c Coordinator<R>,
}

impl<'c, R: DocumentRegistry> AutoCommit<'c, R> {
    pub(crate) fn new(coordinator: &'c Coordinator<R>) -> Self {
        Self { coordinator }
    }
}

impl<'c, R: DocumentRegistry> EditContext for AutoCommit<'c, R> {
    fn apply(&mut self, doc: &DocumentHandle, edit: Edit) -> Result<EditOutcome, EditError> {
        self.coordinator
            .with_transaction(|tx| Transaction::apply(tx, doc, edit.clone()))
    }

    fn snapshot(&mut self, doc: &DocumentHandle) -> Result<Arc<Node>, EditError> {
        Ok(doc.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build;
    use crate::types::Item;

    fn measure() -> Arc<Node> {
        build::measure(vec![
            build::pitch("C4", Position::new(1, 4)),
            build::pitch("D4", Position::new(1, 4)),
        ])
    }

    fn items() -> Path {
        Path::root().field("items")
    }

    #[test]
    fn test_collection_edits() {
        let ids = IdAllocator::new();
        let root = measure();
        let (root, out) = Edit::AddItem {
            path: items(),
            node: build::rest(Position::new(1, 2)),
        }
        .apply_to(&root, &ids)
        .unwrap();
        assert!(out.changed);

        let (root, _) = Edit::MoveUp { path: items(), index: 2 }
            .apply_to(&root, &ids)
            .unwrap();
        let second = tree::get(&root, &items(), 1).unwrap();
        assert!(matches!(second.as_item(), Some(Item::Rest(_))));

        let (same, out) = Edit::MoveUp { path: items(), index: 0 }
            .apply_to(&root, &ids)
            .unwrap();
        assert!(!out.changed);
        assert!(Arc::ptr_eq(&same, &root));
    }

    #[test]
    fn test_set_field_on_non_record_fails() {
        let ids = IdAllocator::new();
        let err = Edit::SetField {
            path: items(),
            name: "name".into(),
            node: Arc::new(Node::Value(Value::from("x"))),
        }
        .apply_to(&measure(), &ids)
        .unwrap_err();
        assert!(matches!(err.reason, Mismatch::NotARecord(_)));
    }

    #[test]
    fn test_changeset_edits() {
        let ids = IdAllocator::new();
        let piece = build::PieceBuilder::new().build();
        let tempos = Path::root().field("tempos");

        let (piece, _) = Edit::SetChange {
            path: tempos.clone(),
            at: Position::from_integer(2),
            value: Value::Tempo { bpm: 90 },
        }
        .apply_to(&piece, &ids)
        .unwrap();
        let changes = tree::resolve(&piece, &tempos).unwrap().as_changes().unwrap();
        assert_eq!(changes.value_at(Position::from_integer(3)), Some(&Value::Tempo { bpm: 90 }));

        let err = Edit::RemoveChange {
            path: tempos.clone(),
            at: Position::from_integer(7),
        }
        .apply_to(&piece, &ids)
        .unwrap_err();
        assert_eq!(err.reason, Mismatch::NoEntry(Position::from_integer(7)));

        let err = Edit::SetChange {
            path: Path::root().field("musicians"),
            at: Position::ZERO,
            value: Value::Tempo { bpm: 60 },
        }
        .apply_to(&piece, &ids)
        .unwrap_err();
        assert!(matches!(err.reason, Mismatch::NotChanges(_)));
    }

    #[test]
    fn test_assign_id_reports_id() {
        let ids = IdAllocator::new();
        let path = items().index(0);
        let (root, first) = Edit::AssignId { path: path.clone() }
            .apply_to(&measure(), &ids)
            .unwrap();
        let (_, again) = Edit::AssignId { path }.apply_to(&root, &ids).unwrap();
        assert!(first.changed);
        assert!(!again.changed);
        assert_eq!(first.id, again.id);
    }

    #[test]
    fn test_edit_serde_shape() {
        let edit = Edit::RemoveItem {
            path: Path::parse("[:items 1]").unwrap(),
            index: 0,
        };
        let json = serde_json::to_value(&edit).unwrap();
        assert_eq!(json["edit"], "remove_item");
        assert_eq!(json["path"], serde_json::json!(["items", 1]));
        let back: Edit = serde_json::from_value(json).unwrap();
        assert_eq!(back, edit);
        assert_eq!(back.name(), "remove_item");
    }
}
