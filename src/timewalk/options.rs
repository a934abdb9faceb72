//! Traversal options and pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::canonical::canonical_hash_hex;
use crate::types::{ItemTag, Path, Position};

use super::{Tuple, WalkIssue};

/// Predicate over a streamed tuple.
pub type Predicate = Arc<dyn Fn(&Tuple<'_>) -> bool + Send + Sync>;

/// One step of the traversal pipeline, applied in order to every tuple.
#[derive(Clone)]
pub enum Stage {
    /// Keep tuples matching the predicate.
    Filter(Predicate),
    /// Keep tuples whose item has one of these tags.
    Kinds(Vec<ItemTag>),
    /// Drop the first `n` tuples reaching this stage.
    Skip(usize),
    /// Stop the whole traversal after `n` tuples passed this stage.
    Take(usize),
    /// Stop the whole traversal at the first tuple not matching.
    TakeWhile(Predicate),
    /// Pass only the first matching tuple, then stop.
    FirstMatch(Predicate),
    /// Shift reported positions.
    Offset(Position),
    /// Buffer everything upstream, stable-sort by position across voices,
    /// then feed the later stages.
    MergeByPosition,
}

impl Stage {
    /// Filter stage from a closure.
    pub fn filter<P>(pred: P) -> Self
    where
        P: Fn(&Tuple<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Filter(Arc::new(pred))
    }

    /// Take-while stage from a closure.
    pub fn take_while<P>(pred: P) -> Self
    where
        P: Fn(&Tuple<'_>) -> bool + Send + Sync + 'static,
    {
        Self::TakeWhile(Arc::new(pred))
    }

    /// First-match stage from a closure.
    pub fn first_match<P>(pred: P) -> Self
    where
        P: Fn(&Tuple<'_>) -> bool + Send + Sync + 'static,
    {
        Self::FirstMatch(Arc::new(pred))
    }

    /// Stable label used in fingerprints and debug output. Closures are
    /// labelled by stage only.
    pub fn label(&self) -> String {
        match self {
            Self::Filter(_) => "filter".to_string(),
            Self::Kinds(tags) => {
                let names: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
                format!("kinds:{}", names.join(","))
            }
            Self::Skip(n) => format!("skip:{}", n),
            Self::Take(n) => format!("take:{}", n),
            Self::TakeWhile(_) => "take_while".to_string(),
            Self::FirstMatch(_) => "first_match".to_string(),
            Self::Offset(p) => format!("offset:{}", p),
            Self::MergeByPosition => "merge_by_position".to_string(),
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage({})", self.label())
    }
}

/// Configuration of one traversal.
///
/// Built with chained methods:
///
/// ```
/// use piece_kernel::timewalk::TraversalOptions;
/// use piece_kernel::types::{ItemTag, Position};
///
/// let options = TraversalOptions::new()
///     .range(Position::ZERO, Position::from_integer(2))
///     .kinds([ItemTag::Pitch, ItemTag::Chord])
///     .take(10);
/// assert_eq!(options.stages.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TraversalOptions {
    /// Subtree to walk (whole tree when `None`).
    pub scope: Option<Path>,
    /// Earliest position reported (inclusive).
    pub start: Option<Position>,
    /// Latest position reported (inclusive).
    pub end: Option<Position>,
    /// Pipeline, in application order.
    pub stages: Vec<Stage>,
}

impl TraversalOptions {
    /// Whole tree, no bounds, no stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the subtree at `path`.
    pub fn scope(mut self, path: Path) -> Self {
        self.scope = Some(path);
        self
    }

    /// Skip items before `position`.
    pub fn start(mut self, position: Position) -> Self {
        self.start = Some(position);
        self
    }

    /// Skip items after `position`.
    pub fn end(mut self, position: Position) -> Self {
        self.end = Some(position);
        self
    }

    /// Inclusive `[start, end]` bounds.
    pub fn range(self, start: Position, end: Position) -> Self {
        self.start(start).end(end)
    }

    /// Append a stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a filter.
    pub fn filter<P>(self, pred: P) -> Self
    where
        P: Fn(&Tuple<'_>) -> bool + Send + Sync + 'static,
    {
        self.stage(Stage::filter(pred))
    }

    /// Append a tag filter.
    pub fn kinds(self, tags: impl IntoIterator<Item = ItemTag>) -> Self {
        self.stage(Stage::Kinds(tags.into_iter().collect()))
    }

    /// Append a skip.
    pub fn skip(self, n: usize) -> Self {
        self.stage(Stage::Skip(n))
    }

    /// Append a take.
    pub fn take(self, n: usize) -> Self {
        self.stage(Stage::Take(n))
    }

    /// Append a take-while.
    pub fn take_while<P>(self, pred: P) -> Self
    where
        P: Fn(&Tuple<'_>) -> bool + Send + Sync + 'static,
    {
        self.stage(Stage::take_while(pred))
    }

    /// Append a first-match.
    pub fn first_match<P>(self, pred: P) -> Self
    where
        P: Fn(&Tuple<'_>) -> bool + Send + Sync + 'static,
    {
        self.stage(Stage::first_match(pred))
    }

    /// Append a position shift.
    pub fn offset(self, by: Position) -> Self {
        self.stage(Stage::Offset(by))
    }

    /// Append a merge across voices.
    pub fn merge_by_position(self) -> Self {
        self.stage(Stage::MergeByPosition)
    }

    /// Reject inverted bounds.
    pub fn validate(&self) -> Result<(), WalkIssue> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end < start => Err(WalkIssue::InvalidScope { start, end }),
            _ => Ok(()),
        }
    }

    /// Deterministic hash of the options, for cache and log keys.
    ///
    /// The scope is hashed in full form, so aliased and full scopes agree.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Key {
            scope: Option<Path>,
            start: Option<Position>,
            end: Option<Position>,
            stages: Vec<String>,
        }

        canonical_hash_hex(&Key {
            scope: self.scope.as_ref().map(Path::expand),
            start: self.start,
            end: self.end,
            stages: self.stages.iter().map(Stage::label).collect(),
        })
    }
}

/// Closure-free stage, for transport and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "arg", rename_all = "snake_case")]
pub enum StageSpec {
    /// See [`Stage::Kinds`].
    Kinds(Vec<ItemTag>),
    /// See [`Stage::Skip`].
    Skip(usize),
    /// See [`Stage::Take`].
    Take(usize),
    /// See [`Stage::Offset`].
    Offset(Position),
    /// See [`Stage::MergeByPosition`].
    MergeByPosition,
}

impl From<StageSpec> for Stage {
    fn from(spec: StageSpec) -> Self {
        match spec {
            StageSpec::Kinds(tags) => Self::Kinds(tags),
            StageSpec::Skip(n) => Self::Skip(n),
            StageSpec::Take(n) => Self::Take(n),
            StageSpec::Offset(p) => Self::Offset(p),
            StageSpec::MergeByPosition => Self::MergeByPosition,
        }
    }
}

/// Serializable form of [`TraversalOptions`] without closure stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalSpec {
    /// See [`TraversalOptions::scope`].
    #[serde(default)]
    pub scope: Option<Path>,
    /// See [`TraversalOptions::start`].
    #[serde(default)]
    pub start: Option<Position>,
    /// See [`TraversalOptions::end`].
    #[serde(default)]
    pub end: Option<Position>,
    /// Pipeline.
    #[serde(default)]
    pub stages: Vec<StageSpec>,
}

impl From<TraversalSpec> for TraversalOptions {
    fn from(spec: TraversalSpec) -> Self {
        Self {
            scope: spec.scope,
            start: spec.start,
            end: spec.end,
            stages: spec.stages.into_iter().map(Stage::from).collect(),
        }
    }
}
