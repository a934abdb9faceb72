//! Timewalk: the temporal traversal engine.
//!
//! [`traverse`] walks a tree version depth-first in document order and
//! reports every musical item together with its path and its position in
//! time. Nothing runs until a consuming method is called; consuming takes
//! the walk by value, so each traversal is a single pass.
//!
//! ## Positions
//!
//! The accumulator starts at zero at the scope root and again at every
//! [`Kind::Voice`] record. Each item advances it by its duration scaled by
//! the enclosing tuplet ratios; markers advance nothing.
//!
//! ## Memory
//!
//! Streaming consumers hold one path buffer of tree depth and one state slot
//! per stage. Only [`Stage::MergeByPosition`] and [`Timewalk::collect`]
//! buffer tuples.
//!
//! ```
//! use piece_kernel::timewalk::{traverse, TraversalOptions};
//! use piece_kernel::tree::build;
//! use piece_kernel::types::Position;
//!
//! let voice = build::voice(vec![build::measure(vec![
//!     build::pitch("C4", Position::new(1, 4)),
//!     build::pitch("E4", Position::new(1, 4)),
//! ])]);
//! let last = traverse(&voice, TraversalOptions::new()).last().unwrap();
//! assert_eq!(last.position, Position::new(1, 4));
//! ```

mod engine;
pub mod options;

use serde::{Deserialize, Serialize};
use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::tree::{resolve, Kind, Node, PathInvalid};
use crate::types::{Item, ItemTag, Path, Position, Step};

use engine::{split_at_merge, tuplet_ratio, Pipeline, Walker};

pub use engine::Probe;
pub use options::{Predicate, Stage, StageSpec, TraversalOptions, TraversalSpec};

/// One reported item, borrowed from the tree and the walker's path buffer.
#[derive(Debug, Clone, Copy)]
pub struct Tuple<'a> {
    /// The item.
    pub item: &'a Item,
    /// The node holding it.
    pub node: &'a Arc<Node>,
    /// Path from the tree root to the item.
    pub path: &'a [Step],
    /// Position in time from the scope root or enclosing voice.
    pub position: Position,
}

impl<'a> Tuple<'a> {
    /// Tag of the item.
    pub fn tag(&self) -> ItemTag {
        self.item.tag()
    }

    /// Owned copy of the path.
    pub fn path(&self) -> Path {
        Path::from(self.path)
    }

    /// Owned copy of the tuple.
    pub fn to_visit(&self) -> Visit {
        Visit {
            path: self.path(),
            position: self.position,
            node: Arc::clone(self.node),
        }
    }
}

/// Owned traversal tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    /// Path from the tree root to the item.
    pub path: Path,
    /// Position in time.
    pub position: Position,
    /// The item node.
    pub node: Arc<Node>,
}

impl Visit {
    /// The item, if the node is one.
    pub fn item(&self) -> Option<&Item> {
        self.node.as_item()
    }

    /// Borrowed view, for feeding stages again.
    pub fn as_tuple(&self) -> Option<Tuple<'_>> {
        let item = self.node.as_item()?;
        Some(Tuple {
            item,
            node: &self.node,
            path: self.path.steps(),
            position: self.position,
        })
    }
}

/// Counters for one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    /// Nodes the walker stepped into.
    pub nodes_entered: usize,
    /// Items within bounds, before stages.
    pub tuples_emitted: usize,
    /// A stage or the consumer stopped the walk.
    pub terminated_early: bool,
    /// Position arithmetic overflowed and the walk stopped there.
    #[serde(default)]
    pub overflowed: bool,
}

/// Why a traversal is empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkIssue {
    /// Scope path did not resolve.
    #[error("Traversal scope did not resolve: {0}")]
    PathInvalid(#[from] PathInvalid),
    /// End bound precedes start bound.
    #[error("Traversal end {end} precedes start {start}")]
    InvalidScope {
        /// Start bound.
        start: Position,
        /// End bound.
        end: Position,
    },
    /// Resume point is not inside the traversal scope.
    #[error("Resume point {at} is outside scope {scope}")]
    OutsideScope {
        /// Requested resume point.
        at: Path,
        /// Traversal scope.
        scope: Path,
    },
    /// A position or tuplet scale at `path` does not fit in `i64/i64`.
    #[error("Position overflow at {path}")]
    PositionOverflow {
        /// Node where the arithmetic failed.
        path: Path,
    },
}

#[derive(Serialize)]
struct ExportLine<'a> {
    path: &'a [Step],
    position: Position,
    item: &'a Item,
}

/// A prepared, not yet started traversal.
pub struct Timewalk<'a> {
    target: Option<&'a Arc<Node>>,
    base: Path,
    scale: Position,
    options: TraversalOptions,
    issue: Option<WalkIssue>,
    probe: Option<Probe<'a>>,
    resume: Vec<Step>,
}

/// Prepare a traversal of `root`.
///
/// An unresolvable scope or inverted bounds produce an empty traversal whose
/// [`Timewalk::issue`] says why.
pub fn traverse(root: &Arc<Node>, options: TraversalOptions) -> Timewalk<'_> {
    let mut walk = Timewalk {
        target: None,
        base: Path::root(),
        scale: Position::ONE,
        options,
        issue: None,
        probe: None,
        resume: Vec::new(),
    };

    if let Err(issue) = walk.options.validate() {
        tracing::debug!(%issue, "Empty traversal");
        walk.issue = Some(issue);
        return walk;
    }

    match walk.options.scope.clone() {
        None => walk.target = Some(root),
        Some(scope) => match resolve(root, &scope) {
            Ok(node) => match scope_scale(root, &scope) {
                Some(scale) => {
                    walk.scale = scale;
                    walk.target = Some(node);
                    walk.base = scope;
                }
                None => {
                    tracing::warn!(scope = %scope, "Tuplet scale overflow at traversal scope");
                    walk.issue = Some(WalkIssue::PositionOverflow { path: scope });
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "Empty traversal");
                walk.issue = Some(WalkIssue::PathInvalid(e));
            }
        },
    }
    walk
}

/// Tuplet scale in force at the scope root, or `None` on overflow.
fn scope_scale(root: &Arc<Node>, scope: &Path) -> Option<Position> {
    let mut scale = Position::ONE;
    let mut node = root;
    for step in scope.steps() {
        match node.as_record() {
            Some(r) if r.kind == Kind::Voice => scale = Position::ONE,
            Some(r) if r.kind == Kind::Tuplet => scale = scale.checked_mul(tuplet_ratio(r))?,
            _ => {}
        }
        match node.step(step) {
            Ok(next) => node = next,
            Err(_) => break,
        }
    }
    Some(scale)
}

impl<'a> Timewalk<'a> {
    /// Why this traversal is empty, if it is.
    pub fn issue(&self) -> Option<&WalkIssue> {
        self.issue.as_ref()
    }

    /// The options this walk was prepared with.
    pub fn options(&self) -> &TraversalOptions {
        &self.options
    }

    /// Observe every node entered, with its path.
    pub fn probe<P>(mut self, probe: P) -> Self
    where
        P: FnMut(&[Step], &Node) + 'a,
    {
        self.probe = Some(Box::new(probe));
        self
    }

    /// Start at the node at `at` (a path from the tree root, inside the
    /// scope) instead of at the scope root.
    ///
    /// Only the ancestors of `at` and the nodes after it in document order
    /// are entered. Positions count from zero at `at`, with the tuplet scale
    /// in force there.
    pub fn resume_at(mut self, at: &Path) -> Self {
        let Some(mut node) = self.target else {
            return self;
        };
        let at = at.expand();
        let scope = self.base.expand();
        if !at.starts_with(&scope) {
            tracing::debug!(%at, %scope, "Resume point outside scope");
            self.target = None;
            self.issue = Some(WalkIssue::OutsideScope { at, scope });
            return self;
        }
        for (depth, step) in at.steps().iter().enumerate().skip(scope.len()) {
            match node.step(step) {
                Ok(next) => node = next,
                Err(reason) => {
                    let e = PathInvalid::at(&at, depth, reason);
                    tracing::debug!(error = %e, "Empty traversal");
                    self.target = None;
                    self.issue = Some(WalkIssue::PathInvalid(e));
                    return self;
                }
            }
        }
        self.base = scope;
        self.resume = at.steps()[self.base.len()..].to_vec();
        self
    }

    /// Push every tuple into `sink` until it or a stage breaks.
    ///
    /// An empty or overflowing walk is not an error here; see
    /// [`Timewalk::try_for_each_checked`] for a walk that reports why.
    pub fn try_for_each_with_stats<F>(self, sink: F) -> WalkStats
    where
        F: FnMut(Tuple<'_>) -> ControlFlow<()>,
    {
        self.drive(sink).0
    }

    /// Like [`Timewalk::try_for_each_with_stats`], but an unresolvable scope,
    /// inverted bounds or a position overflow is returned as the error.
    /// Tuples delivered before an overflow have already reached `sink`.
    pub fn try_for_each_checked<F>(self, sink: F) -> Result<WalkStats, WalkIssue>
    where
        F: FnMut(Tuple<'_>) -> ControlFlow<()>,
    {
        match self.drive(sink) {
            (_, Some(issue)) => Err(issue),
            (stats, None) => Ok(stats),
        }
    }

    fn drive<F>(self, mut sink: F) -> (WalkStats, Option<WalkIssue>)
    where
        F: FnMut(Tuple<'_>) -> ControlFlow<()>,
    {
        let Timewalk {
            target,
            base,
            scale,
            options,
            issue,
            probe,
            resume,
        } = self;
        let Some(target) = target else {
            return (WalkStats::default(), issue);
        };

        tracing::trace!(scope = %base, stages = options.stages.len(), "Timewalk start");

        let (head, tail) = split_at_merge(options.stages);
        let mut head = Pipeline::new(head);
        if head.is_closed() {
            let stats = WalkStats {
                terminated_early: true,
                ..WalkStats::default()
            };
            return (stats, None);
        }

        let (mut stats, mut overflow) = match tail {
            None => {
                let (stats, overflow) =
                    Walker::new(base.steps(), options.start, options.end, probe, |t: Tuple<'_>| {
                        head.feed(t, &mut sink)
                    })
                    .resume_at(&resume)
                    .run(target, scale);
                (stats, overflow.or_else(|| head.take_overflow()))
            }
            Some(tail) => {
                let mut buffer: Vec<Visit> = Vec::new();
                let (mut stats, overflow) =
                    Walker::new(base.steps(), options.start, options.end, probe, |t: Tuple<'_>| {
                        head.feed(t, &mut |t: Tuple<'_>| {
                            buffer.push(t.to_visit());
                            ControlFlow::Continue(())
                        })
                    })
                    .resume_at(&resume)
                    .run(target, scale);
                let mut overflow = overflow.or_else(|| head.take_overflow());

                // Stable: equal positions keep document order.
                buffer.sort_by(|a, b| a.position.cmp(&b.position));

                let mut tail = Pipeline::new(tail);
                if overflow.is_none() {
                    for visit in &buffer {
                        let Some(tuple) = visit.as_tuple() else {
                            continue;
                        };
                        if tail.feed(tuple, &mut sink).is_break() {
                            stats.terminated_early = true;
                            break;
                        }
                    }
                    overflow = tail.take_overflow();
                }
                (stats, overflow)
            }
        };

        if let Some(path) = &overflow {
            stats.overflowed = true;
            stats.terminated_early = false;
            tracing::warn!(scope = %base, at = %path, "Timewalk stopped on position overflow");
        }

        tracing::trace!(
            nodes = stats.nodes_entered,
            tuples = stats.tuples_emitted,
            early = stats.terminated_early,
            "Timewalk done"
        );
        (stats, overflow.take().map(|path| WalkIssue::PositionOverflow { path }))
    }

    /// Push every tuple into `sink`; `Break` if the walk stopped early.
    pub fn try_for_each<F>(self, sink: F) -> ControlFlow<()>
    where
        F: FnMut(Tuple<'_>) -> ControlFlow<()>,
    {
        if self.try_for_each_with_stats(sink).terminated_early {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Accumulate in place until `f` breaks.
    pub fn try_fold<B, F>(self, init: B, mut f: F) -> B
    where
        F: FnMut(&mut B, Tuple<'_>) -> ControlFlow<()>,
    {
        let mut acc = init;
        self.try_for_each_with_stats(|t| f(&mut acc, t));
        acc
    }

    /// Accumulate in place over every tuple.
    pub fn fold<B, F>(self, init: B, mut f: F) -> B
    where
        F: FnMut(&mut B, Tuple<'_>),
    {
        self.try_fold(init, |acc, t| {
            f(acc, t);
            ControlFlow::Continue(())
        })
    }

    /// Call `f` for every tuple.
    pub fn for_each<F>(self, mut f: F)
    where
        F: FnMut(Tuple<'_>),
    {
        self.try_for_each_with_stats(|t| {
            f(t);
            ControlFlow::Continue(())
        });
    }

    /// Number of tuples delivered.
    pub fn count(self) -> usize {
        self.count_with_stats().0
    }

    /// Number of tuples delivered, with walk counters.
    pub fn count_with_stats(self) -> (usize, WalkStats) {
        let mut n = 0;
        let stats = self.try_for_each_with_stats(|_| {
            n += 1;
            ControlFlow::Continue(())
        });
        (n, stats)
    }

    /// First tuple matching `pred`. Stops the walk there.
    pub fn find_first<P>(self, mut pred: P) -> Option<Visit>
    where
        P: FnMut(&Tuple<'_>) -> bool,
    {
        let mut found = None;
        self.try_for_each_with_stats(|t| {
            if pred(&t) {
                found = Some(t.to_visit());
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        found
    }

    /// Last tuple delivered.
    pub fn last(self) -> Option<Visit> {
        let mut path: Vec<Step> = Vec::new();
        let mut last: Option<(Arc<Node>, Position)> = None;
        self.try_for_each_with_stats(|t| {
            path.clear();
            path.extend_from_slice(t.path);
            last = Some((Arc::clone(t.node), t.position));
            ControlFlow::Continue(())
        });
        last.map(|(node, position)| Visit {
            path: Path::new(path),
            position,
            node,
        })
    }

    /// Every tuple, owned.
    pub fn collect(self) -> Vec<Visit> {
        self.collect_with_stats().0
    }

    /// Every tuple, owned, with walk counters.
    pub fn collect_with_stats(self) -> (Vec<Visit>, WalkStats) {
        let mut out = Vec::new();
        let stats = self.try_for_each_with_stats(|t| {
            out.push(t.to_visit());
            ControlFlow::Continue(())
        });
        (out, stats)
    }

    /// Every tuple, owned, or the reason the walk is empty or incomplete.
    pub fn try_collect_with_stats(self) -> Result<(Vec<Visit>, WalkStats), WalkIssue> {
        let mut out = Vec::new();
        let stats = self.try_for_each_checked(|t| {
            out.push(t.to_visit());
            ControlFlow::Continue(())
        })?;
        Ok((out, stats))
    }

    /// Write one JSON object per tuple (`path`, `position`, `item`), newline
    /// separated. Returns the number of lines written.
    pub fn write_json_lines<W: io::Write>(self, mut out: W) -> io::Result<usize> {
        let mut written = 0;
        let mut failure = None;
        self.try_for_each_with_stats(|t| {
            let line = ExportLine {
                path: t.path,
                position: t.position,
                item: t.item,
            };
            let result = serde_json::to_writer(&mut out, &line)
                .map_err(io::Error::from)
                .and_then(|_| out.write_all(b"\n"));
            match result {
                Ok(()) => {
                    written += 1;
                    ControlFlow::Continue(())
                }
                Err(e) => {
                    failure = Some(e);
                    ControlFlow::Break(())
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}
