//! Scalar field values.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::{Position, Ratio};

/// A scalar stored in a record field or a ChangeSet entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Text (names, labels).
    Text(String),
    /// Exact positive ratio (tuplet ratios).
    Ratio(Ratio),
    /// Time signature `beats/unit`.
    TimeSignature {
        /// Beats per measure.
        beats: u8,
        /// Beat unit (4 = quarter).
        unit: u8,
    },
    /// Key signature as a count of sharps (positive) or flats (negative).
    KeySignature {
        /// Sharps/flats count.
        fifths: i8,
    },
    /// Tempo in beats per minute.
    Tempo {
        /// Beats per minute.
        bpm: u32,
    },
}

impl Value {
    /// Text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Ratio content, if this is a ratio value.
    pub fn as_ratio(&self) -> Option<Position> {
        match self {
            Self::Ratio(r) => Some(r.get()),
            _ => None,
        }
    }

    /// Integer content, if this is an integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Length of one measure under this time signature, in whole notes.
    pub fn measure_length(&self) -> Option<Position> {
        match self {
            Self::TimeSignature { beats, unit } if *unit > 0 => {
                Some(Position::new(*beats as i64, *unit as i64))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Ratio(r) => write!(f, "{}", r),
            Self::TimeSignature { beats, unit } => write!(f, "{}/{} time", beats, unit),
            Self::KeySignature { fifths } => write!(f, "key {:+}", fifths),
            Self::Tempo { bpm } => write!(f, "{} bpm", bpm),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Ratio> for Value {
    fn from(r: Ratio) -> Self {
        Self::Ratio(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_length() {
        let ts = Value::TimeSignature { beats: 3, unit: 4 };
        assert_eq!(ts.measure_length(), Some(Position::new(3, 4)));
        assert_eq!(Value::Int(3).measure_length(), None);
        assert_eq!(Value::TimeSignature { beats: 3, unit: 0 }.measure_length(), None);
    }

    #[test]
    fn test_serde_adjacent_tagging() {
        let v = Value::Tempo { bpm: 120 };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "tempo");
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);

        let r = serde_json::json!({"type": "ratio", "value": "2/3"});
        let back: Value = serde_json::from_value(r).unwrap();
        assert_eq!(back.as_ratio(), Some(Position::new(2, 3)));
        let zero = serde_json::json!({"type": "ratio", "value": "0"});
        assert!(serde_json::from_value::<Value>(zero).is_err());

        let t = Value::from("Violin");
        let back: Value = serde_json::from_str(&serde_json::to_string(&t).unwrap()).unwrap();
        assert_eq!(back.as_text(), Some("Violin"));
    }
}
