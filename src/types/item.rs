//! Musical leaf items.
//!
//! Items form a closed set of tagged variants. Everything that treats items
//! uniformly (duration, ids, tag filters) dispatches on [`ItemTag`] through a
//! single `match`, so the traversal engine and edit operations never need to
//! know which variant they are holding.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::id::ElementId;
use super::position::{Duration, Position, PositionError};

/// Variant tag of an [`Item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemTag {
    /// Single pitched note.
    Pitch,
    /// Silence.
    Rest,
    /// Several pitches sounding together.
    Chord,
    /// Zero-duration marking.
    Marker,
}

impl ItemTag {
    /// All tags in declaration order.
    pub const ALL: [ItemTag; 4] = [Self::Pitch, Self::Rest, Self::Chord, Self::Marker];

    /// Parse tag from string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pitch" => Some(Self::Pitch),
            "rest" => Some(Self::Rest),
            "chord" => Some(Self::Chord),
            "marker" => Some(Self::Marker),
            _ => None,
        }
    }
}

impl fmt::Display for ItemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pitch => write!(f, "pitch"),
            Self::Rest => write!(f, "rest"),
            Self::Chord => write!(f, "chord"),
            Self::Marker => write!(f, "marker"),
        }
    }
}

/// A pitched note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    /// Spelled note name, e.g. `"C#4"`.
    pub note: String,
    /// Written duration.
    pub duration: Duration,
    /// Stable id, assigned on first reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ElementId>,
}

/// A rest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rest {
    /// Written duration.
    pub duration: Duration,
    /// Stable id, assigned on first reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ElementId>,
}

/// A chord.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chord {
    /// Spelled note names, lowest first.
    pub notes: Vec<String>,
    /// Written duration.
    pub duration: Duration,
    /// Stable id, assigned on first reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ElementId>,
}

/// Kind of a zero-duration marking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// Slur begins at the following item.
    SlurStart,
    /// Slur ends at the preceding item.
    SlurEnd,
    /// Tie begins.
    TieStart,
    /// Tie ends.
    TieEnd,
    /// Free text (dynamics, expressions).
    Text(String),
}

/// A zero-duration marking, optionally pointing at another element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marker {
    /// What the marking is.
    pub kind: MarkerKind,
    /// Element this marking connects to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ElementId>,
    /// Stable id, assigned on first reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ElementId>,
}

/// A musical leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    /// Pitched note.
    Pitch(Pitch),
    /// Rest.
    Rest(Rest),
    /// Chord.
    Chord(Chord),
    /// Zero-duration marking.
    Marker(Marker),
}

fn written(duration: Position) -> Duration {
    match Duration::new(duration) {
        Ok(d) => d,
        Err(e) => panic!("{}", e),
    }
}

impl Item {
    /// Variant tag.
    pub fn tag(&self) -> ItemTag {
        match self {
            Self::Pitch(_) => ItemTag::Pitch,
            Self::Rest(_) => ItemTag::Rest,
            Self::Chord(_) => ItemTag::Chord,
            Self::Marker(_) => ItemTag::Marker,
        }
    }

    /// How far this item advances its voice. Markers do not advance.
    pub fn duration(&self) -> Position {
        match self {
            Self::Pitch(p) => p.duration.get(),
            Self::Rest(r) => r.duration.get(),
            Self::Chord(c) => c.duration.get(),
            Self::Marker(_) => Position::ZERO,
        }
    }

    /// Stable id, if one has been assigned.
    pub fn id(&self) -> Option<ElementId> {
        match self {
            Self::Pitch(p) => p.id,
            Self::Rest(r) => r.id,
            Self::Chord(c) => c.id,
            Self::Marker(m) => m.id,
        }
    }

    /// Copy of this item carrying `id`.
    pub fn with_id(&self, id: ElementId) -> Item {
        let mut item = self.clone();
        match &mut item {
            Self::Pitch(p) => p.id = Some(id),
            Self::Rest(r) => r.id = Some(id),
            Self::Chord(c) => c.id = Some(id),
            Self::Marker(m) => m.id = Some(id),
        }
        item
    }

    /// Copy of this item with a new duration. Markers are returned unchanged.
    pub fn with_duration(&self, duration: Position) -> Result<Item, PositionError> {
        let duration = Duration::new(duration)?;
        let mut item = self.clone();
        match &mut item {
            Self::Pitch(p) => p.duration = duration,
            Self::Rest(r) => r.duration = duration,
            Self::Chord(c) => c.duration = duration,
            Self::Marker(_) => {}
        }
        Ok(item)
    }

    /// Element this item connects to (markers only).
    pub fn target(&self) -> Option<ElementId> {
        match self {
            Self::Marker(m) => m.target,
            _ => None,
        }
    }

    /// Create a pitch.
    ///
    /// # Panics
    /// Panics if `duration` is negative; see [`Duration::new`].
    pub fn pitch(note: impl Into<String>, duration: Position) -> Self {
        Self::Pitch(Pitch {
            note: note.into(),
            duration: written(duration),
            id: None,
        })
    }

    /// Create a rest.
    ///
    /// # Panics
    /// Panics if `duration` is negative.
    pub fn rest(duration: Position) -> Self {
        Self::Rest(Rest {
            duration: written(duration),
            id: None,
        })
    }

    /// Create a chord.
    ///
    /// # Panics
    /// Panics if `duration` is negative.
    pub fn chord<I, S>(notes: I, duration: Position) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chord(Chord {
            notes: notes.into_iter().map(Into::into).collect(),
            duration: written(duration),
            id: None,
        })
    }

    /// Create a marker.
    pub fn marker(kind: MarkerKind) -> Self {
        Self::Marker(Marker {
            kind,
            target: None,
            id: None,
        })
    }
}
