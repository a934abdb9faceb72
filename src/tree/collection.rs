//! Uniform operations on ordered collections.
//!
//! Every list in a piece (musicians, staves, voices, measures, items, tuplet
//! contents...) supports the same operation set, addressed by the path of the
//! list itself. The operations are defined once on [`CollectionOp`] and
//! applied through [`try_edit`], so they inherit copy-on-write and
//! all-or-nothing failure.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::Path;

use super::edit::try_edit;
use super::{resolve, Mismatch, Node, PathInvalid};

/// A structural change to one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CollectionOp {
    /// Add a child at the end.
    Append {
        /// New child.
        node: Arc<Node>,
    },
    /// Add a child before `index` (`index == len` appends).
    Insert {
        /// Insertion point.
        index: usize,
        /// New child.
        node: Arc<Node>,
    },
    /// Replace the child at `index`.
    Set {
        /// Target index.
        index: usize,
        /// Replacement.
        node: Arc<Node>,
    },
    /// Replace every child.
    SetAll {
        /// New children.
        nodes: Vec<Arc<Node>>,
    },
    /// Remove the child at `index`.
    Remove {
        /// Target index.
        index: usize,
    },
    /// Swap the child at `index` with its predecessor. No-op at index 0.
    MoveUp {
        /// Target index.
        index: usize,
    },
    /// Swap the child at `index` with its successor. No-op at the last index.
    MoveDown {
        /// Target index.
        index: usize,
    },
}

fn check(index: usize, len: usize) -> Result<(), Mismatch> {
    if index < len {
        Ok(())
    } else {
        Err(Mismatch::IndexOutOfRange { index, len })
    }
}

impl CollectionOp {
    /// Moves past either end leave the list as it is.
    fn is_noop(&self, len: usize) -> bool {
        match self {
            Self::MoveUp { index } => *index == 0 && len > 0,
            Self::MoveDown { index } => *index + 1 == len,
            _ => false,
        }
    }

    /// Apply to a list's children, producing the new children.
    pub fn apply(self, children: &[Arc<Node>]) -> Result<Vec<Arc<Node>>, Mismatch> {
        let len = children.len();
        let mut next = children.to_vec();
        match self {
            Self::Append { node } => next.push(node),
            Self::Insert { index, node } => {
                if index > len {
                    return Err(Mismatch::IndexOutOfRange { index, len });
                }
                next.insert(index, node);
            }
            Self::Set { index, node } => {
                check(index, len)?;
                next[index] = node;
            }
            Self::SetAll { nodes } => next = nodes,
            Self::Remove { index } => {
                check(index, len)?;
                next.remove(index);
            }
            Self::MoveUp { index } => {
                check(index, len)?;
                if index > 0 {
                    next.swap(index - 1, index);
                }
            }
            Self::MoveDown { index } => {
                check(index, len)?;
                if index + 1 < len {
                    next.swap(index, index + 1);
                }
            }
        }
        Ok(next)
    }
}

/// Apply `op` to the list at `path`.
pub fn apply_collection(
    root: &Arc<Node>,
    path: &Path,
    op: CollectionOp,
) -> Result<Arc<Node>, PathInvalid> {
    try_edit(root, path, move |target| {
        let children = target
            .as_list()
            .ok_or_else(|| Mismatch::NotAList(target.describe()))?;
        if op.is_noop(children.len()) {
            return Ok(Arc::clone(target));
        }
        op.apply(children).map(|c| Arc::new(Node::List(c)))
    })
}

fn list_at<'a>(root: &'a Arc<Node>, path: &Path) -> Result<&'a [Arc<Node>], PathInvalid> {
    let node = resolve(root, path)?;
    node.as_list()
        .ok_or_else(|| PathInvalid::at(path, path.len(), Mismatch::NotAList(node.describe())))
}

/// Append `node` to the list at `path`.
pub fn append(root: &Arc<Node>, path: &Path, node: Arc<Node>) -> Result<Arc<Node>, PathInvalid> {
    apply_collection(root, path, CollectionOp::Append { node })
}

/// Insert `node` before `index` in the list at `path`.
pub fn insert(
    root: &Arc<Node>,
    path: &Path,
    index: usize,
    node: Arc<Node>,
) -> Result<Arc<Node>, PathInvalid> {
    apply_collection(root, path, CollectionOp::Insert { index, node })
}

/// Child `index` of the list at `path`.
pub fn get<'a>(root: &'a Arc<Node>, path: &Path, index: usize) -> Result<&'a Arc<Node>, PathInvalid> {
    let children = list_at(root, path)?;
    children.get(index).ok_or_else(|| {
        PathInvalid::at(
            path,
            path.len(),
            Mismatch::IndexOutOfRange {
                index,
                len: children.len(),
            },
        )
    })
}

/// All children of the list at `path`.
pub fn get_all<'a>(root: &'a Arc<Node>, path: &Path) -> Result<&'a [Arc<Node>], PathInvalid> {
    list_at(root, path)
}

/// Replace child `index` of the list at `path`.
pub fn set(
    root: &Arc<Node>,
    path: &Path,
    index: usize,
    node: Arc<Node>,
) -> Result<Arc<Node>, PathInvalid> {
    apply_collection(root, path, CollectionOp::Set { index, node })
}

/// Replace all children of the list at `path`.
pub fn set_all(
    root: &Arc<Node>,
    path: &Path,
    nodes: Vec<Arc<Node>>,
) -> Result<Arc<Node>, PathInvalid> {
    apply_collection(root, path, CollectionOp::SetAll { nodes })
}

/// Remove child `index` of the list at `path`.
pub fn remove(root: &Arc<Node>, path: &Path, index: usize) -> Result<Arc<Node>, PathInvalid> {
    apply_collection(root, path, CollectionOp::Remove { index })
}

/// Move child `index` one place towards the front.
pub fn move_up(root: &Arc<Node>, path: &Path, index: usize) -> Result<Arc<Node>, PathInvalid> {
    apply_collection(root, path, CollectionOp::MoveUp { index })
}

/// Move child `index` one place towards the back.
pub fn move_down(root: &Arc<Node>, path: &Path, index: usize) -> Result<Arc<Node>, PathInvalid> {
    apply_collection(root, path, CollectionOp::MoveDown { index })
}
