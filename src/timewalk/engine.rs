//! Push-based walker and stage pipeline.
//!
//! The walker descends the tree recursively and pushes each in-bounds item
//! into its sink. The sink answers with [`ControlFlow`]; a `Break` is
//! propagated with `?` through every level of the recursion, so a stopped
//! traversal enters no further sibling, measure, voice or staff.

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::tree::{Kind, Node, Record};
use crate::types::{Item, ItemTag, Path, Position, Step, Value};

use super::options::{Predicate, Stage};
use super::{Tuple, WalkStats};

/// Observer called for every node entered.
pub type Probe<'a> = Box<dyn FnMut(&[Step], &Node) + 'a>;

/// Running position of one voice (or of the scope root).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    position: Position,
    scale: Position,
    exhausted: bool,
}

impl Clock {
    pub(crate) fn scaled(scale: Position) -> Self {
        Self {
            position: Position::ZERO,
            scale,
            exhausted: false,
        }
    }
}

/// Ratio of a tuplet record; a missing ratio, or a field that is not a ratio
/// value, plays as written. Ratio values are always positive.
pub(crate) fn tuplet_ratio(record: &Record) -> Position {
    record
        .get("ratio")
        .and_then(|n| n.as_value())
        .and_then(Value::as_ratio)
        .unwrap_or(Position::ONE)
}

pub(crate) struct Walker<'a, F> {
    path: Vec<Step>,
    start: Option<Position>,
    end: Option<Position>,
    probe: Option<Probe<'a>>,
    stats: WalkStats,
    overflow: Option<Path>,
    resume: Vec<Step>,
    emit: F,
}

impl<'a, F> Walker<'a, F>
where
    F: FnMut(Tuple<'_>) -> ControlFlow<()>,
{
    pub(crate) fn new(
        base: &[Step],
        start: Option<Position>,
        end: Option<Position>,
        probe: Option<Probe<'a>>,
        emit: F,
    ) -> Self {
        let mut path = Vec::with_capacity(base.len() + 16);
        path.extend_from_slice(base);
        Self {
            path,
            start,
            end,
            probe,
            stats: WalkStats::default(),
            overflow: None,
            resume: Vec::new(),
            emit,
        }
    }

    /// Begin at `steps` below the target: only its ancestors and what follows
    /// it in document order are entered, and the clock is zero there.
    pub(crate) fn resume_at(mut self, steps: &[Step]) -> Self {
        self.resume = steps.to_vec();
        self
    }

    /// Walk `target`. The path is set when position arithmetic overflowed
    /// at that node; the walk stops there.
    pub(crate) fn run(mut self, target: &Arc<Node>, scale: Position) -> (WalkStats, Option<Path>) {
        let mut clock = Clock::scaled(scale);
        let resume = std::mem::take(&mut self.resume);
        let flow = self.node(target, &resume, &mut clock);
        self.stats.overflowed = self.overflow.is_some();
        self.stats.terminated_early = flow.is_break() && !self.stats.overflowed;
        (self.stats, self.overflow)
    }

    fn overflowed(&mut self) -> ControlFlow<()> {
        self.overflow = Some(Path::from(self.path.as_slice()));
        ControlFlow::Break(())
    }

    /// Enter `node`. A non-empty `from` names the descendant to start at.
    fn node(&mut self, node: &Arc<Node>, from: &[Step], clock: &mut Clock) -> ControlFlow<()> {
        self.stats.nodes_entered += 1;
        if let Some(probe) = self.probe.as_mut() {
            probe(&self.path, node);
        }

        match &**node {
            Node::Item(item) => self.item(node, item, clock),
            Node::List(children) => self.children(children, from, clock),
            Node::Record(record) => match record.kind {
                Kind::Voice => {
                    let mut voice = Clock::scaled(Position::ONE);
                    self.fields(record, from, &mut voice)
                }
                Kind::Tuplet => {
                    let outer = clock.scale;
                    match outer.checked_mul(tuplet_ratio(record)) {
                        Some(scale) => clock.scale = scale,
                        None => return self.overflowed(),
                    }
                    let flow = self.fields(record, from, clock);
                    clock.scale = outer;
                    flow
                }
                _ => self.fields(record, from, clock),
            },
            Node::Value(_) | Node::Changes(_) => ControlFlow::Continue(()),
        }
    }

    fn children(&mut self, children: &[Arc<Node>], from: &[Step], clock: &mut Clock) -> ControlFlow<()> {
        let (first, rest) = match from.split_first() {
            None => (0, from),
            Some((step, rest)) => match step.as_index() {
                Some(index) => (index, rest),
                None => return ControlFlow::Continue(()),
            },
        };
        for (index, child) in children.iter().enumerate().skip(first) {
            if clock.exhausted {
                break;
            }
            let from = if index == first { rest } else { &[][..] };
            self.path.push(Step::Index(index));
            let flow = self.node(child, from, clock);
            self.path.pop();
            flow?;
        }
        ControlFlow::Continue(())
    }

    fn fields(&mut self, record: &Record, from: &[Step], clock: &mut Clock) -> ControlFlow<()> {
        let (first, rest) = match from.split_first() {
            None => (None, from),
            Some((step, rest)) => match step.as_field() {
                Some(name) => (Some(name), rest),
                None => return ControlFlow::Continue(()),
            },
        };
        let fields = record
            .fields
            .iter()
            .skip_while(|(name, _)| first.is_some_and(|first| &***name != first));
        for (name, child) in fields {
            if clock.exhausted {
                break;
            }
            let from = if first == Some(&**name) { rest } else { &[][..] };
            self.path.push(Step::Field(Arc::clone(name)));
            let flow = self.node(child, from, clock);
            self.path.pop();
            flow?;
        }
        ControlFlow::Continue(())
    }

    fn item(&mut self, node: &Arc<Node>, item: &Item, clock: &mut Clock) -> ControlFlow<()> {
        let position = clock.position;
        let next = item
            .duration()
            .checked_mul(clock.scale)
            .and_then(|advance| position.checked_add(advance));
        match next {
            Some(next) => clock.position = next,
            None => return self.overflowed(),
        }

        // Durations and ratios are never negative, so positions only grow
        // within a voice: everything after this is out too.
        if matches!(self.end, Some(end) if position > end) {
            clock.exhausted = true;
            return ControlFlow::Continue(());
        }
        if matches!(self.start, Some(start) if position < start) {
            return ControlFlow::Continue(());
        }

        self.stats.tuples_emitted += 1;
        (self.emit)(Tuple {
            item,
            node,
            path: &self.path,
            position,
        })
    }
}

enum StageState {
    Filter(Predicate),
    Kinds(Vec<ItemTag>),
    Skip(usize),
    Take(usize),
    TakeWhile(Predicate),
    FirstMatch(Predicate),
    Offset(Position),
}

/// Stage states for one traversal. Merge points are handled by the caller.
pub(crate) struct Pipeline {
    stages: Vec<StageState>,
    overflow: Option<Path>,
}

/// Split at the first merge: the tail runs after buffering and sorting.
pub(crate) fn split_at_merge(mut stages: Vec<Stage>) -> (Vec<Stage>, Option<Vec<Stage>>) {
    match stages.iter().position(|s| matches!(s, Stage::MergeByPosition)) {
        Some(at) => {
            let tail = stages.split_off(at + 1);
            stages.pop();
            (stages, Some(tail))
        }
        None => (stages, None),
    }
}

impl Pipeline {
    pub(crate) fn new(stages: Vec<Stage>) -> Self {
        let stages = stages
            .into_iter()
            .filter_map(|stage| match stage {
                Stage::Filter(p) => Some(StageState::Filter(p)),
                Stage::Kinds(tags) => Some(StageState::Kinds(tags)),
                Stage::Skip(n) => Some(StageState::Skip(n)),
                Stage::Take(n) => Some(StageState::Take(n)),
                Stage::TakeWhile(p) => Some(StageState::TakeWhile(p)),
                Stage::FirstMatch(p) => Some(StageState::FirstMatch(p)),
                Stage::Offset(by) => Some(StageState::Offset(by)),
                // Input is already in position order.
                Stage::MergeByPosition => None,
            })
            .collect();
        Self {
            stages,
            overflow: None,
        }
    }

    /// Path of the tuple an `Offset` stage could not shift, if any.
    pub(crate) fn take_overflow(&mut self) -> Option<Path> {
        self.overflow.take()
    }

    /// True when no tuple can ever get through.
    pub(crate) fn is_closed(&self) -> bool {
        self.stages.iter().any(|s| matches!(s, StageState::Take(0)))
    }

    /// Run one tuple through every stage and into `sink`.
    ///
    /// Returns `Break` when the sink asks to stop or when a stage has passed
    /// its last tuple, even if a later stage then dropped it.
    pub(crate) fn feed<S>(&mut self, mut tuple: Tuple<'_>, sink: &mut S) -> ControlFlow<()>
    where
        S: FnMut(Tuple<'_>) -> ControlFlow<()>,
    {
        let mut last = false;
        let finish = |last: bool| {
            if last {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };

        for stage in &mut self.stages {
            match stage {
                StageState::Filter(pred) => {
                    if !pred(&tuple) {
                        return finish(last);
                    }
                }
                StageState::Kinds(tags) => {
                    if !tags.contains(&tuple.item.tag()) {
                        return finish(last);
                    }
                }
                StageState::Skip(remaining) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return finish(last);
                    }
                }
                StageState::Take(remaining) => {
                    if *remaining == 0 {
                        return ControlFlow::Break(());
                    }
                    *remaining -= 1;
                    if *remaining == 0 {
                        last = true;
                    }
                }
                StageState::TakeWhile(pred) => {
                    if !pred(&tuple) {
                        return ControlFlow::Break(());
                    }
                }
                StageState::FirstMatch(pred) => {
                    if !pred(&tuple) {
                        return finish(last);
                    }
                    last = true;
                }
                StageState::Offset(by) => match tuple.position.checked_add(*by) {
                    Some(shifted) => tuple.position = shifted,
                    None => {
                        self.overflow = Some(Path::from(tuple.path));
                        return ControlFlow::Break(());
                    }
                },
            }
        }

        let flow = sink(tuple);
        if last {
            ControlFlow::Break(())
        } else {
            flow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build;
    use crate::types::Path;

    fn quarter_notes(n: usize) -> Arc<Node> {
        let items = (0..n)
            .map(|_| build::pitch("C4", Position::new(1, 4)))
            .collect();
        build::measure(items)
    }

    fn positions(root: &Arc<Node>, stages: Vec<Stage>) -> (Vec<Position>, WalkStats) {
        let mut pipeline = Pipeline::new(stages);
        let mut out = Vec::new();
        let (stats, overflow) = Walker::new(&[], None, None, None, |t: Tuple<'_>| {
            pipeline.feed(t, &mut |t: Tuple<'_>| {
                out.push(t.position);
                ControlFlow::Continue(())
            })
        })
        .run(root, Position::ONE);
        assert!(overflow.is_none());
        (out, stats)
    }

    #[test]
    fn test_split_at_merge() {
        let (head, tail) = split_at_merge(vec![
            Stage::Skip(1),
            Stage::MergeByPosition,
            Stage::Take(2),
            Stage::MergeByPosition,
        ]);
        assert_eq!(head.len(), 1);
        assert_eq!(tail.map(|t| t.len()), Some(2));

        let (head, tail) = split_at_merge(vec![Stage::Skip(1)]);
        assert_eq!(head.len(), 1);
        assert!(tail.is_none());
    }

    #[test]
    fn test_take_stops_walker() {
        let root = quarter_notes(6);
        let (out, stats) = positions(&root, vec![Stage::Take(2)]);
        assert_eq!(out, [Position::ZERO, Position::new(1, 4)]);
        assert!(stats.terminated_early);
        assert_eq!(stats.tuples_emitted, 2);
    }

    #[test]
    fn test_take_then_filter_still_stops() {
        let root = quarter_notes(6);
        let (out, stats) = positions(
            &root,
            vec![Stage::Take(1), Stage::filter(|t| !t.position.is_zero())],
        );
        assert!(out.is_empty());
        assert!(stats.terminated_early);
        assert_eq!(stats.tuples_emitted, 1);
    }

    #[test]
    fn test_skip_offset_and_take_while() {
        let root = quarter_notes(4);
        let (out, _) = positions(
            &root,
            vec![
                Stage::Skip(1),
                Stage::Offset(Position::from_integer(1)),
                Stage::take_while(|t| t.position < Position::new(7, 4)),
            ],
        );
        assert_eq!(out, [Position::new(5, 4), Position::new(3, 2)]);
    }

    #[test]
    fn test_first_match() {
        let root = quarter_notes(4);
        let (out, stats) = positions(
            &root,
            vec![Stage::first_match(|t| t.position > Position::new(1, 4))],
        );
        assert_eq!(out, [Position::new(1, 2)]);
        assert!(stats.terminated_early);
    }

    #[test]
    fn test_overflowing_clock_stops_with_path() {
        let huge = Position::from_integer(i64::MAX);
        let root = build::measure(vec![
            build::rest(huge),
            build::pitch("C4", Position::new(1, 4)),
            build::pitch("D4", Position::new(1, 4)),
        ]);
        let mut seen = Vec::new();
        let (stats, overflow) = Walker::new(&[], None, None, None, |t: Tuple<'_>| {
            seen.push(t.position);
            ControlFlow::Continue(())
        })
        .run(&root, Position::ONE);

        assert_eq!(seen, [Position::ZERO]);
        assert_eq!(overflow, Some(Path::parse("[:items 1]").unwrap()));
        assert!(stats.overflowed);
        assert!(!stats.terminated_early);
    }

    #[test]
    fn test_offset_overflow_stops_pipeline() {
        let mut pipeline = Pipeline::new(vec![Stage::Offset(Position::from_integer(i64::MAX))]);
        let root = quarter_notes(3);
        let mut out = Vec::new();
        Walker::new(&[], None, None, None, |t: Tuple<'_>| {
            pipeline.feed(t, &mut |t: Tuple<'_>| {
                out.push(t.position);
                ControlFlow::Continue(())
            })
        })
        .run(&root, Position::ONE);
        assert_eq!(out, [Position::from_integer(i64::MAX)]);
        assert_eq!(pipeline.take_overflow(), Some(Path::parse("[:items 1]").unwrap()));
    }

    #[test]
    fn test_closed_pipeline() {
        assert!(Pipeline::new(vec![Stage::Skip(3), Stage::Take(0)]).is_closed());
        assert!(!Pipeline::new(vec![Stage::Take(1)]).is_closed());
    }

    #[test]
    fn test_paths_are_absolute_to_base() {
        let root = quarter_notes(2);
        let base = Path::parse("[:voices 0 :measures 3]").unwrap();
        let mut seen = Vec::new();
        let _ = Walker::new(base.steps(), None, None, None, |t: Tuple<'_>| {
            seen.push(Path::from(t.path));
            ControlFlow::Continue(())
        })
        .run(&root, Position::ONE);
        assert_eq!(seen[1], Path::parse("[:voices 0 :measures 3 :items 1]").unwrap());
    }
}
