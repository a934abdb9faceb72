//! Cross-reference resolution.
//!
//! Connective markings (slurs, ties, hairpins) need to find the element they
//! attach to. Every search here is a single early-terminating traversal. A
//! forward search resumes at its start item, so its cost is bounded by the
//! distance searched, not by the size of the voice.

use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use crate::policy::KernelConfig;
use crate::timewalk::{traverse, Timewalk, TraversalOptions, Tuple};
use crate::tree::{resolve_item, Kind, Node};
use crate::types::{ElementId, Path, Position};

/// Which way to search from the start item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Later items.
    #[default]
    Forward,
    /// Earlier items, nearest first.
    Backward,
}

/// Path of the innermost voice containing `start`, or the root when `start`
/// lies outside any voice. `None` if `start` does not resolve.
fn enclosing_voice(tree: &Arc<Node>, start: &Path) -> Option<Path> {
    let mut voice = 0;
    let mut node = tree;
    for (depth, step) in start.steps().iter().enumerate() {
        if node.kind() == Some(Kind::Voice) {
            voice = depth;
        }
        node = node.step(step).ok()?;
    }
    Some(Path::from(&start.steps()[..voice]))
}

/// First item after `start` in its voice matching `predicate`, no further
/// than `max_distance` away.
///
/// Returns `None` when `start` does not resolve or nothing matches in range.
pub fn resolve_endpoint<P>(
    tree: &Arc<Node>,
    start: &Path,
    predicate: P,
    max_distance: Position,
) -> Option<Path>
where
    P: FnMut(&Tuple<'_>) -> bool,
{
    resolve_endpoint_in(tree, start, Direction::Forward, predicate, max_distance)
}

/// [`resolve_endpoint`] in either direction.
///
/// A forward search starts at `start` and never enters anything before it.
/// A backward search walks the voice from its beginning up to `start`.
pub fn resolve_endpoint_in<P>(
    tree: &Arc<Node>,
    start: &Path,
    direction: Direction,
    predicate: P,
    max_distance: Position,
) -> Option<Path>
where
    P: FnMut(&Tuple<'_>) -> bool,
{
    search(tree, start, direction, predicate, max_distance, |walk| walk)
}

fn search<'a, P, W>(
    tree: &'a Arc<Node>,
    start: &Path,
    direction: Direction,
    mut predicate: P,
    max_distance: Position,
    prepare: W,
) -> Option<Path>
where
    P: FnMut(&Tuple<'_>) -> bool,
    W: FnOnce(Timewalk<'a>) -> Timewalk<'a>,
{
    let start = start.expand();
    resolve_item(tree, &start).ok()?;
    let scope = enclosing_voice(tree, &start)?;
    let walk = traverse(tree, TraversalOptions::new().scope(scope));
    let mut found = None;

    match direction {
        Direction::Forward => {
            // Positions count from zero at `start`.
            let _ = prepare(walk.resume_at(&start)).try_for_each(|t: Tuple<'_>| {
                if t.path == start.steps() {
                    return ControlFlow::Continue(());
                }
                if t.position > max_distance {
                    return ControlFlow::Break(());
                }
                if predicate(&t) {
                    found = Some(t.path());
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            });
        }
        Direction::Backward => {
            let mut nearest: Option<(Path, Position)> = None;
            let _ = prepare(walk).try_for_each(|t: Tuple<'_>| {
                if t.path == start.steps() {
                    found = nearest
                        .take()
                        .filter(|(_, at)| {
                            t.position
                                .checked_sub(*at)
                                .is_some_and(|distance| distance <= max_distance)
                        })
                        .map(|(path, _)| path);
                    return ControlFlow::Break(());
                }
                if predicate(&t) {
                    nearest = Some((t.path(), t.position));
                }
                ControlFlow::Continue(())
            });
        }
    }

    tracing::trace!(%start, ?direction, found = found.is_some(), "Endpoint search");
    found
}

/// Where an element sits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Located {
    /// Path from the tree root.
    pub path: Path,
    /// Position within its voice.
    pub position: Position,
}

/// Result of a cached lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Where the element is, if it exists in this version.
    pub located: Option<Located>,
    /// Answered from the cache.
    pub cache_hit: bool,
}

/// Both ends of a connective marking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Earlier end.
    pub start: Located,
    /// Later end.
    pub end: Located,
}

impl Span {
    /// Distance in time between the two ends; `None` if it does not fit.
    pub fn length(&self) -> Option<Position> {
        self.end.position.checked_sub(self.start.position)
    }
}

/// Cache key: tree version identity plus element id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    tree: usize,
    id: ElementId,
}

struct CacheEntry {
    /// Guards against the address being reused by a later version.
    tree: Weak<Node>,
    located: Option<Located>,
}

/// Element lookups by [`ElementId`] with an LRU cache.
///
/// Entries are keyed by the identity of the tree version, so a new version
/// never sees answers computed for an old one.
///
/// # Example
///
/// ```
/// use piece_kernel::resolver::Resolver;
/// use piece_kernel::tree::{assign_id, build};
/// use piece_kernel::types::{IdAllocator, Path, Position};
///
/// let voice = build::voice(vec![build::measure(vec![build::rest(Position::new(1, 4))])]);
/// let path = Path::parse("[:measures 0 :items 0]").unwrap();
/// let (voice, id) = assign_id(&voice, &path, &IdAllocator::new()).unwrap();
///
/// let resolver = Resolver::new(16);
/// assert_eq!(resolver.find_by_id(&voice, id).unwrap().path, path);
/// assert!(resolver.lookup(&voice, id).cache_hit);
/// ```
pub struct Resolver {
    cache: RwLock<LruCache<CacheKey, CacheEntry>>,
}

impl Resolver {
    /// Resolver caching up to `capacity` lookups (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Resolver sized from configuration.
    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(config.resolver_cache_entries)
    }

    /// Locate element `id` in `tree`.
    pub fn find_by_id(&self, tree: &Arc<Node>, id: ElementId) -> Option<Located> {
        self.lookup(tree, id).located
    }

    /// [`find_by_id`](Self::find_by_id), reporting whether the cache answered.
    pub fn lookup(&self, tree: &Arc<Node>, id: ElementId) -> Lookup {
        let key = CacheKey {
            tree: Arc::as_ptr(tree) as usize,
            id,
        };

        // Check cache first
        if let Some(entry) = self.cache.read().peek(&key) {
            let live = entry
                .tree
                .upgrade()
                .is_some_and(|cached| Arc::ptr_eq(&cached, tree));
            if live {
                return Lookup {
                    located: entry.located.clone(),
                    cache_hit: true,
                };
            }
        }

        // Cache miss - walk the whole tree
        let located = traverse(tree, TraversalOptions::new())
            .find_first(|t| t.item.id() == Some(id))
            .map(|visit| Located {
                path: visit.path,
                position: visit.position,
            });
        tracing::trace!(%id, found = located.is_some(), "Element lookup");

        self.cache.write().put(
            key,
            CacheEntry {
                tree: Arc::downgrade(tree),
                located: located.clone(),
            },
        );

        Lookup {
            located,
            cache_hit: false,
        }
    }

    /// Locate both ends of a span. `None` if either is missing or `end_id`
    /// sits before `start_id`.
    pub fn resolve_span(
        &self,
        tree: &Arc<Node>,
        start_id: ElementId,
        end_id: ElementId,
    ) -> Option<Span> {
        let start = self.find_by_id(tree, start_id)?;
        let end = self.find_by_id(tree, end_id)?;
        if end.position < start.position {
            return None;
        }
        Some(Span { start, end })
    }

    /// Follow the target of the marker at `marker`.
    pub fn resolve_target(&self, tree: &Arc<Node>, marker: &Path) -> Option<Located> {
        let target = resolve_item(tree, marker).ok()?.target()?;
        self.find_by_id(tree, target)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Number of cached entries.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.read();
        f.debug_struct("Resolver")
            .field("cached", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{assign_id, build};
    use crate::types::{IdAllocator, Item, ItemTag, Marker, MarkerKind};

    fn q() -> Position {
        Position::new(1, 4)
    }

    /// Two voices; the first has C D marker E | F, the second a long rest.
    fn piece() -> Arc<Node> {
        build::staff(vec![
            build::voice(vec![
                build::measure(vec![
                    build::pitch("C4", q()),
                    build::pitch("D4", q()),
                    build::marker(MarkerKind::SlurEnd),
                    build::pitch("E4", Position::new(1, 2)),
                ]),
                build::measure(vec![build::pitch("F4", q())]),
            ]),
            build::voice(vec![build::measure(vec![build::pitch("G4", Position::ONE)])]),
        ])
    }

    fn item(voice: usize, measure: usize, index: usize) -> Path {
        Path::root()
            .field("voices")
            .index(voice)
            .field("measures")
            .index(measure)
            .field("items")
            .index(index)
    }

    fn is_pitch(t: &Tuple<'_>) -> bool {
        t.tag() == ItemTag::Pitch
    }

    #[test]
    fn test_forward_finds_next_match() {
        let tree = piece();
        let found = resolve_endpoint(&tree, &item(0, 0, 0), is_pitch, Position::ONE);
        assert_eq!(found, Some(item(0, 0, 1)));

        let marker = resolve_endpoint(&tree, &item(0, 0, 0), |t| t.tag() == ItemTag::Marker, Position::ONE);
        assert_eq!(marker, Some(item(0, 0, 2)));
    }

    #[test]
    fn test_forward_stays_in_voice() {
        let tree = piece();
        // F4 at 1 is the last item of voice 0; G4 lives in voice 1.
        let found = resolve_endpoint(&tree, &item(0, 1, 0), is_pitch, Position::from_integer(8));
        assert_eq!(found, None);
    }

    #[test]
    fn test_forward_respects_distance() {
        let tree = piece();
        let f4 = |t: &Tuple<'_>| matches!(t.item, Item::Pitch(p) if p.note == "F4");
        assert_eq!(resolve_endpoint(&tree, &item(0, 0, 0), f4, Position::new(3, 4)), None);
        assert_eq!(
            resolve_endpoint(&tree, &item(0, 0, 0), f4, Position::ONE),
            Some(item(0, 1, 0))
        );
    }

    #[test]
    fn test_forward_search_starts_at_start() {
        let mut items: Vec<Arc<Node>> = (0..1999).map(|_| build::rest(q())).collect();
        items.push(build::pitch("C5", q()));
        let tree = build::voice(vec![build::measure(items)]);
        let start = Path::parse("[:measures 0 :items 1998]").unwrap();
        let before = |path: &Path| {
            path.steps().len() == 4 && path.steps()[3].as_index().is_some_and(|i| i < 1998)
        };

        let early = std::cell::Cell::new(0);
        let entered = std::cell::Cell::new(0);
        let found = search(&tree, &start, Direction::Forward, is_pitch, q(), |walk| {
            walk.probe(|path, _| {
                entered.set(entered.get() + 1);
                if before(&Path::from(path)) {
                    early.set(early.get() + 1);
                }
            })
        });
        assert_eq!(found, Some(Path::parse("[:measures 0 :items 1999]").unwrap()));
        assert_eq!(early.get(), 0);
        // voice, measures, measure, items, then the start and the match
        assert_eq!(entered.get(), 6);
    }

    #[test]
    fn test_forward_distance_counts_from_start() {
        let tree = piece();
        // From D4 at 1/4: the slur marker sits at 1/2, F4 at 1.
        let f4 = |t: &Tuple<'_>| matches!(t.item, Item::Pitch(p) if p.note == "F4");
        assert_eq!(resolve_endpoint(&tree, &item(0, 0, 1), f4, Position::new(1, 2)), None);
        assert_eq!(
            resolve_endpoint(&tree, &item(0, 0, 1), f4, Position::new(3, 4)),
            Some(item(0, 1, 0))
        );
        // Start itself is never an answer.
        assert_eq!(resolve_endpoint(&tree, &item(0, 1, 0), is_pitch, Position::ONE), None);
    }

    #[test]
    fn test_backward_finds_nearest_previous() {
        let tree = piece();
        let found = resolve_endpoint_in(&tree, &item(0, 0, 3), Direction::Backward, is_pitch, Position::ONE);
        assert_eq!(found, Some(item(0, 0, 1)));

        let too_far = resolve_endpoint_in(
            &tree,
            &item(0, 1, 0),
            Direction::Backward,
            |t| matches!(t.item, Item::Pitch(p) if p.note == "C4"),
            Position::new(1, 2),
        );
        assert_eq!(too_far, None);
    }

    #[test]
    fn test_compact_start_path() {
        let tree = piece();
        let compact = item(0, 0, 0).compact();
        assert_eq!(
            resolve_endpoint(&tree, &compact, is_pitch, Position::ONE),
            Some(item(0, 0, 1))
        );
    }

    #[test]
    fn test_unresolvable_start_is_not_found() {
        let tree = piece();
        assert_eq!(resolve_endpoint(&tree, &item(0, 0, 9), is_pitch, Position::ONE), None);
        assert_eq!(resolve_endpoint(&tree, &item(3, 0, 0), is_pitch, Position::ONE), None);
    }

    #[test]
    fn test_find_by_id_caches_per_version() {
        let ids = IdAllocator::new();
        let (tree, id) = assign_id(&piece(), &item(0, 1, 0), &ids).unwrap();
        let resolver = Resolver::new(4);

        let first = resolver.lookup(&tree, id);
        assert!(!first.cache_hit);
        assert_eq!(
            first.located,
            Some(Located {
                path: item(0, 1, 0),
                position: Position::ONE,
            })
        );
        assert!(resolver.lookup(&tree, id).cache_hit);

        // A new version gets its own answer.
        let edited = crate::tree::insert(
            &tree,
            &item(0, 1, 0).parent().unwrap(),
            0,
            build::rest(q()),
        )
        .unwrap();
        let after = resolver.lookup(&edited, id);
        assert!(!after.cache_hit);
        assert_eq!(after.located.unwrap().path, item(0, 1, 1));
    }

    #[test]
    fn test_missing_id() {
        let resolver = Resolver::new(4);
        let tree = piece();
        assert_eq!(resolver.find_by_id(&tree, ElementId::new(99)), None);
        assert!(resolver.lookup(&tree, ElementId::new(99)).cache_hit);
        resolver.clear();
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_span_and_target() {
        let ids = IdAllocator::new();
        let (tree, c4) = assign_id(&piece(), &item(0, 0, 0), &ids).unwrap();
        let (tree, e4) = assign_id(&tree, &item(0, 0, 3), &ids).unwrap();
        let resolver = Resolver::new(8);

        let span = resolver.resolve_span(&tree, c4, e4).unwrap();
        assert_eq!(span.start.path, item(0, 0, 0));
        assert_eq!(span.end.path, item(0, 0, 3));
        assert_eq!(span.length(), Some(Position::new(1, 2)));
        assert_eq!(resolver.resolve_span(&tree, e4, c4), None);

        let slur = Arc::new(Node::Item(Item::Marker(Marker {
            kind: MarkerKind::SlurEnd,
            target: Some(c4),
            id: None,
        })));
        let tree = crate::tree::replace(&tree, &item(0, 0, 2), slur).unwrap();
        let target = resolver.resolve_target(&tree, &item(0, 0, 2)).unwrap();
        assert_eq!(target.path, item(0, 0, 0));
        assert_eq!(resolver.resolve_target(&tree, &item(0, 0, 1)), None);
    }
}
