//! Copy-on-write edits.
//!
//! An edit rebuilds only the nodes on the path from the root to the target.
//! Every other branch of the new version is the same `Arc` as in the old
//! version. If any step fails, no new nodes escape: the caller keeps the old
//! root and gets a [`PathInvalid`].

use std::sync::Arc;

use crate::types::{ElementId, IdAllocator, Path, Step};

use super::{Mismatch, Node, PathInvalid};

fn rebuild<F>(
    node: &Arc<Node>,
    steps: &[Step],
    depth: usize,
    f: F,
) -> Result<Arc<Node>, (usize, Mismatch)>
where
    F: FnOnce(&Arc<Node>) -> Result<Arc<Node>, Mismatch>,
{
    let Some((step, rest)) = steps.split_first() else {
        return f(node).map_err(|m| (depth, m));
    };

    let child = node.step(step).map_err(|m| (depth, m))?;
    let new_child = rebuild(child, rest, depth + 1, f)?;

    if Arc::ptr_eq(child, &new_child) {
        return Ok(Arc::clone(node));
    }
    node.with_step(step, new_child)
        .map(Arc::new)
        .map_err(|m| (depth, m))
}

/// Produce a new tree whose subtree at `path` is `f(old subtree)`.
///
/// `f` may reject the target (wrong node type, bad index for a collection
/// operation); the rejection is reported as [`PathInvalid`] at depth
/// `path.len()`.
pub fn try_edit<F>(root: &Arc<Node>, path: &Path, f: F) -> Result<Arc<Node>, PathInvalid>
where
    F: FnOnce(&Arc<Node>) -> Result<Arc<Node>, Mismatch>,
{
    rebuild(root, path.steps(), 0, f).map_err(|(depth, reason)| PathInvalid::at(path, depth, reason))
}

/// Produce a new tree whose subtree at `path` is `f(old subtree)`.
///
/// Fails with [`PathInvalid`] if `path` does not resolve in `root`. The
/// original tree is never modified.
pub fn edit<F, N>(root: &Arc<Node>, path: &Path, f: F) -> Result<Arc<Node>, PathInvalid>
where
    F: FnOnce(&Arc<Node>) -> N,
    N: Into<Arc<Node>>,
{
    try_edit(root, path, |old| Ok(f(old).into()))
}

/// Replace the subtree at `path` with `node`.
pub fn replace(root: &Arc<Node>, path: &Path, node: Arc<Node>) -> Result<Arc<Node>, PathInvalid> {
    try_edit(root, path, move |_| Ok(node))
}

/// Ensure the item at `path` carries a stable id, allocating one on first
/// reference.
///
/// Returns the (possibly unchanged) root and the item's id. Calling it again
/// on the result returns the same id and the same root.
pub fn assign_id(
    root: &Arc<Node>,
    path: &Path,
    ids: &IdAllocator,
) -> Result<(Arc<Node>, ElementId), PathInvalid> {
    let item = super::resolve_item(root, path)?;
    if let Some(id) = item.id() {
        return Ok((Arc::clone(root), id));
    }
    let id = ids.allocate();
    let tagged = Arc::new(Node::Item(item.with_id(id)));
    let new_root = replace(root, path, tagged)?;
    Ok((new_root, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{build, resolve, Kind};
    use crate::types::{Item, Position};

    fn three_siblings() -> Arc<Node> {
        let items = Node::list(vec![
            build::pitch("C4", Position::new(1, 4)),
            build::pitch("D4", Position::new(1, 4)),
            build::pitch("E4", Position::new(1, 4)),
        ]);
        Arc::new(Node::record(Kind::Group).with_field("a", items).unwrap())
    }

    #[test]
    fn test_edit_shares_untouched_siblings() {
        let old = three_siblings();
        let snapshot = (*old).clone();
        let path = Path::parse("[:a 1]").unwrap();

        let new = edit(&old, &path, |n| {
            let item = n.as_item().unwrap().with_duration(Position::new(1, 2)).unwrap();
            Node::Item(item)
        })
        .unwrap();

        let old_items = old.field("a").unwrap();
        let new_items = new.field("a").unwrap();
        assert!(Arc::ptr_eq(old_items.child(0).unwrap(), new_items.child(0).unwrap()));
        assert!(Arc::ptr_eq(old_items.child(2).unwrap(), new_items.child(2).unwrap()));
        assert!(!Arc::ptr_eq(old_items.child(1).unwrap(), new_items.child(1).unwrap()));

        // Old version is untouched.
        assert_eq!(*old, snapshot);
        assert_eq!(
            old_items.child(1).unwrap().as_item().unwrap().duration(),
            Position::new(1, 4)
        );
    }

    #[test]
    fn test_edit_invalid_path_leaves_tree() {
        let old = three_siblings();
        let err = edit(&old, &Path::parse("[:a 9]").unwrap(), |n| (**n).clone()).unwrap_err();
        assert_eq!(err.depth, 1);
    }

    #[test]
    fn test_try_edit_rejection_reports_target_depth() {
        let old = three_siblings();
        let path = Path::parse("[:a 0]").unwrap();
        let err = try_edit(&old, &path, |n| Err(Mismatch::NotAList(n.describe()))).unwrap_err();
        assert_eq!(err.depth, 2);
    }

    #[test]
    fn test_identity_edit_returns_same_root() {
        let old = three_siblings();
        let path = Path::parse("[:a 2]").unwrap();
        let new = try_edit(&old, &path, |n| Ok(Arc::clone(n))).unwrap();
        assert!(Arc::ptr_eq(&old, &new));
    }

    #[test]
    fn test_assign_id_is_lazy_and_idempotent() {
        let ids = IdAllocator::new();
        let root = three_siblings();
        let path = Path::parse("[:a 1]").unwrap();

        let (root1, id1) = assign_id(&root, &path, &ids).unwrap();
        let (root2, id2) = assign_id(&root1, &path, &ids).unwrap();

        assert_eq!(id1, id2);
        assert!(Arc::ptr_eq(&root1, &root2));
        assert_eq!(resolve(&root, &path).unwrap().as_item().and_then(Item::id), None);
        assert_eq!(resolve(&root1, &path).unwrap().as_item().and_then(Item::id), Some(id1));
    }

    #[test]
    fn test_assign_id_requires_item() {
        let ids = IdAllocator::new();
        let root = three_siblings();
        let err = assign_id(&root, &Path::parse("[:a]").unwrap(), &ids).unwrap_err();
        assert!(matches!(err.reason, Mismatch::NotAnItem(_)));
    }
}
