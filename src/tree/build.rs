//! Constructors for the musical shape of a piece.

use std::sync::Arc;

use crate::types::{ChangeSet, Item, MarkerKind, Position, Ratio, Value};

use super::{Kind, Node, Record};

fn shared(node: Node) -> Arc<Node> {
    Arc::new(node)
}

/// Pitch leaf.
pub fn pitch(note: &str, duration: Position) -> Arc<Node> {
    shared(Node::Item(Item::pitch(note, duration)))
}

/// Rest leaf.
pub fn rest(duration: Position) -> Arc<Node> {
    shared(Node::Item(Item::rest(duration)))
}

/// Chord leaf.
pub fn chord(notes: &[&str], duration: Position) -> Arc<Node> {
    shared(Node::Item(Item::chord(notes.iter().copied(), duration)))
}

/// Zero-duration marker leaf.
pub fn marker(kind: MarkerKind) -> Arc<Node> {
    shared(Node::Item(Item::marker(kind)))
}

/// Tuplet: `items` play at `ratio` of their written duration (2/3 for triplets).
///
/// # Panics
/// Panics if `ratio` is not positive.
pub fn tuplet(ratio: Position, items: Vec<Arc<Node>>) -> Arc<Node> {
    let ratio = match Ratio::new(ratio) {
        Ok(r) => r,
        Err(e) => panic!("{}", e),
    };
    shared(Node::Record(
        Record::new(Kind::Tuplet)
            .with("ratio", Node::Value(Value::Ratio(ratio)))
            .with("items", Node::List(items)),
    ))
}

/// Measure holding `items`.
pub fn measure(items: Vec<Arc<Node>>) -> Arc<Node> {
    shared(Node::Record(
        Record::new(Kind::Measure).with("items", Node::List(items)),
    ))
}

/// Voice holding `measures`.
pub fn voice(measures: Vec<Arc<Node>>) -> Arc<Node> {
    shared(Node::Record(
        Record::new(Kind::Voice).with("measures", Node::List(measures)),
    ))
}

/// Staff holding `voices`.
pub fn staff(voices: Vec<Arc<Node>>) -> Arc<Node> {
    shared(Node::Record(
        Record::new(Kind::Staff).with("voices", Node::List(voices)),
    ))
}

/// Named instrument with `staves`.
pub fn instrument(name: &str, staves: Vec<Arc<Node>>) -> Arc<Node> {
    shared(Node::Record(
        Record::new(Kind::Instrument)
            .with("name", Node::Value(Value::from(name)))
            .with("staves", Node::List(staves)),
    ))
}

/// Named musician with `instruments`.
pub fn musician(name: &str, instruments: Vec<Arc<Node>>) -> Arc<Node> {
    shared(Node::Record(
        Record::new(Kind::Musician)
            .with("name", Node::Value(Value::from(name)))
            .with("instruments", Node::List(instruments)),
    ))
}

/// Builder for a whole piece.
///
/// Every method consumes and returns the builder; [`PieceBuilder::build`]
/// produces the immutable root.
#[derive(Debug, Clone, Default)]
pub struct PieceBuilder {
    musicians: Vec<Arc<Node>>,
    time_signatures: ChangeSet,
    key_signatures: ChangeSet,
    tempos: ChangeSet,
}

impl PieceBuilder {
    /// Empty piece in 4/4, C major, 120 bpm.
    pub fn new() -> Self {
        Self {
            musicians: Vec::new(),
            time_signatures: ChangeSet::starting_with(Value::TimeSignature { beats: 4, unit: 4 }),
            key_signatures: ChangeSet::starting_with(Value::KeySignature { fifths: 0 }),
            tempos: ChangeSet::starting_with(Value::Tempo { bpm: 120 }),
        }
    }

    /// Add a musician.
    pub fn musician(mut self, musician: Arc<Node>) -> Self {
        self.musicians.push(musician);
        self
    }

    /// Change time signature from `at` onwards.
    pub fn time_signature(mut self, at: Position, beats: u8, unit: u8) -> Self {
        self.time_signatures = self
            .time_signatures
            .with(at, Value::TimeSignature { beats, unit });
        self
    }

    /// Change key signature from `at` onwards.
    pub fn key_signature(mut self, at: Position, fifths: i8) -> Self {
        self.key_signatures = self.key_signatures.with(at, Value::KeySignature { fifths });
        self
    }

    /// Change tempo from `at` onwards.
    pub fn tempo(mut self, at: Position, bpm: u32) -> Self {
        self.tempos = self.tempos.with(at, Value::Tempo { bpm });
        self
    }

    /// Produce the piece.
    pub fn build(self) -> Arc<Node> {
        shared(Node::Record(
            Record::new(Kind::Piece)
                .with("musicians", Node::List(self.musicians))
                .with("time-signatures", Node::Changes(self.time_signatures))
                .with("key-signatures", Node::Changes(self.key_signatures))
                .with("tempos", Node::Changes(self.tempos)),
        ))
    }
}

/// One musician, one instrument, one staff holding `voices`.
pub fn solo_piece(voices: Vec<Arc<Node>>) -> Arc<Node> {
    PieceBuilder::new()
        .musician(musician(
            "Soloist",
            vec![instrument("Piano", vec![staff(voices)])],
        ))
        .build()
}
