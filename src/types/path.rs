//! Path descriptors.
//!
//! A [`Path`] is an address into a piece: an ordered list of field names and
//! indices. It holds no reference to any tree, so it can be stored, hashed,
//! sent over the wire and applied to whichever version of a piece is current.
//! Whether it still points at anything is decided only when it is resolved.
//!
//! ## Text form
//!
//! ```text
//! [:staves 0 :voices 1 :items 3]
//! ```
//!
//! Keywords are field steps, bare integers are index steps.
//!
//! ## Compact form
//!
//! Common field names have single-letter aliases written with `@`
//! (`:staves` ↔ `@s`, …). An alias is its own kind of step, so a record is
//! free to have a field literally called `s`: `[:s 0]` and `[@s 0]` are
//! different paths. [`Path::compact`] and [`Path::expand`] convert between
//! the two forms losslessly; resolution accepts either.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use crate::canonical::canonical_hash_hex;

/// Single-letter stand-in for a common field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldAlias {
    /// `@u` ↔ `:musicians`
    #[serde(rename = "u")]
    Musicians,
    /// `@n` ↔ `:instruments`
    #[serde(rename = "n")]
    Instruments,
    /// `@s` ↔ `:staves`
    #[serde(rename = "s")]
    Staves,
    /// `@v` ↔ `:voices`
    #[serde(rename = "v")]
    Voices,
    /// `@m` ↔ `:measures`
    #[serde(rename = "m")]
    Measures,
    /// `@i` ↔ `:items`
    #[serde(rename = "i")]
    Items,
    /// `@p` ↔ `:notes`
    #[serde(rename = "p")]
    Notes,
    /// `@t` ↔ `:time-signatures`
    #[serde(rename = "t")]
    TimeSignatures,
    /// `@k` ↔ `:key-signatures`
    #[serde(rename = "k")]
    KeySignatures,
    /// `@o` ↔ `:tempos`
    #[serde(rename = "o")]
    Tempos,
    /// `@a` ↔ `:name`
    #[serde(rename = "a")]
    Name,
    /// `@r` ↔ `:ratio`
    #[serde(rename = "r")]
    Ratio,
}

impl FieldAlias {
    /// Every alias, in table order.
    pub const ALL: [FieldAlias; 12] = [
        Self::Musicians,
        Self::Instruments,
        Self::Staves,
        Self::Voices,
        Self::Measures,
        Self::Items,
        Self::Notes,
        Self::TimeSignatures,
        Self::KeySignatures,
        Self::Tempos,
        Self::Name,
        Self::Ratio,
    ];

    /// The alias letter.
    pub fn letter(self) -> char {
        match self {
            Self::Musicians => 'u',
            Self::Instruments => 'n',
            Self::Staves => 's',
            Self::Voices => 'v',
            Self::Measures => 'm',
            Self::Items => 'i',
            Self::Notes => 'p',
            Self::TimeSignatures => 't',
            Self::KeySignatures => 'k',
            Self::Tempos => 'o',
            Self::Name => 'a',
            Self::Ratio => 'r',
        }
    }

    /// The full field name this alias stands for.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Musicians => "musicians",
            Self::Instruments => "instruments",
            Self::Staves => "staves",
            Self::Voices => "voices",
            Self::Measures => "measures",
            Self::Items => "items",
            Self::Notes => "notes",
            Self::TimeSignatures => "time-signatures",
            Self::KeySignatures => "key-signatures",
            Self::Tempos => "tempos",
            Self::Name => "name",
            Self::Ratio => "ratio",
        }
    }

    /// Alias written as `letter`.
    pub fn from_letter(letter: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| {
            let mut chars = letter.chars();
            chars.next() == Some(a.letter()) && chars.next().is_none()
        })
    }

    /// Alias of the full field name `name`, if it has one.
    pub fn for_field(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.field_name() == name)
    }
}

/// One step of a path.
///
/// Field and alias steps never compare equal, even when they select the
/// same field; use [`Path::expand`] to compare by target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    /// Zero-based index into an ordered collection.
    Index(usize),
    /// Named field of a record.
    Field(Arc<str>),
    /// Field of a record, by alias.
    Alias {
        /// Which alias.
        alias: FieldAlias,
    },
}

impl Step {
    /// Field step.
    pub fn field(name: impl AsRef<str>) -> Self {
        Self::Field(Arc::from(name.as_ref()))
    }

    /// Index step.
    pub fn index(i: usize) -> Self {
        Self::Index(i)
    }

    /// Alias step.
    pub fn alias(alias: FieldAlias) -> Self {
        Self::Alias { alias }
    }

    /// Full name of the field this step selects, if it selects one.
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::Alias { alias } => Some(alias.field_name()),
            Self::Index(_) => None,
        }
    }

    /// Index, if this is an index step.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Field(_) | Self::Alias { .. } => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ":{}", name),
            Self::Alias { alias } => write!(f, "@{}", alias.letter()),
            Self::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<usize> for Step {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for Step {
    fn from(name: &str) -> Self {
        Self::field(name)
    }
}

/// Error parsing the text form of a path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathParseError {
    /// Missing surrounding brackets.
    #[error("Path must be written as [...]: {0}")]
    Unbracketed(String),
    /// A token was neither `:name`, `@alias` nor an integer.
    #[error("Unrecognised path token: {0}")]
    BadToken(String),
    /// `@x` where `x` is not an alias letter.
    #[error("Unknown field alias: @{0}")]
    UnknownAlias(String),
}

/// Address of a node in a piece.
///
/// Equality, ordering and hashing are structural over the steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Step>);

fn bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[(.*)\]\s*$").expect("static pattern"))
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r":([A-Za-z][A-Za-z0-9_\-]*)|@([A-Za-z][A-Za-z0-9_\-]*)|(\d+)|(\S+)")
            .expect("static pattern")
    })
}

impl Path {
    /// The empty path (addresses the root).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path from explicit steps.
    pub fn new(steps: Vec<Step>) -> Self {
        Self(steps)
    }

    /// New path with `step` appended. The receiver is unchanged.
    pub fn append(&self, step: impl Into<Step>) -> Self {
        let mut steps = Vec::with_capacity(self.0.len() + 1);
        steps.extend_from_slice(&self.0);
        steps.push(step.into());
        Self(steps)
    }

    /// New path with a field step appended.
    pub fn field(&self, name: &str) -> Self {
        self.append(Step::field(name))
    }

    /// New path with an index step appended.
    pub fn index(&self, i: usize) -> Self {
        self.append(Step::Index(i))
    }

    /// Path of the enclosing node, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    /// Last step, if any.
    pub fn last(&self) -> Option<&Step> {
        self.0.last()
    }

    /// Steps in order.
    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this addresses the root.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` addresses this node or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Concatenate two paths.
    pub fn join(&self, tail: &Path) -> Self {
        let mut steps = self.0.clone();
        steps.extend_from_slice(&tail.0);
        Self(steps)
    }

    /// Same path with every field step that has an alias replaced by it.
    ///
    /// `expand(compact(p)) == p` for every path without alias steps.
    pub fn compact(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|step| match step {
                    Step::Field(name) => match FieldAlias::for_field(name) {
                        Some(alias) => Step::alias(alias),
                        None => step.clone(),
                    },
                    Step::Index(_) | Step::Alias { .. } => step.clone(),
                })
                .collect(),
        )
    }

    /// Same path with every alias step replaced by its full field step.
    pub fn expand(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|step| match step {
                    Step::Alias { alias } => Step::field(alias.field_name()),
                    Step::Index(_) | Step::Field(_) => step.clone(),
                })
                .collect(),
        )
    }

    /// Parse the `[:field @alias 0 ...]` text form.
    pub fn parse(text: &str) -> Result<Self, PathParseError> {
        let inner = bracket_regex()
            .captures(text)
            .and_then(|c| c.get(1))
            .ok_or_else(|| PathParseError::Unbracketed(text.to_string()))?
            .as_str();

        let mut steps = Vec::new();
        for caps in token_regex().captures_iter(inner) {
            if let Some(name) = caps.get(1) {
                steps.push(Step::field(name.as_str()));
            } else if let Some(letter) = caps.get(2) {
                let alias = FieldAlias::from_letter(letter.as_str())
                    .ok_or_else(|| PathParseError::UnknownAlias(letter.as_str().to_string()))?;
                steps.push(Step::alias(alias));
            } else if let Some(digits) = caps.get(3) {
                let i = digits
                    .as_str()
                    .parse::<usize>()
                    .map_err(|_| PathParseError::BadToken(digits.as_str().to_string()))?;
                steps.push(Step::Index(i));
            } else if let Some(other) = caps.get(4) {
                return Err(PathParseError::BadToken(other.as_str().to_string()));
            }
        }
        Ok(Self(steps))
    }

    /// Stable hex fingerprint of the expanded form.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&self.expand())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", step)?;
        }
        write!(f, "]")
    }
}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Vec<Step>> for Path {
    fn from(steps: Vec<Step>) -> Self {
        Self(steps)
    }
}

impl From<&[Step]> for Path {
    fn from(steps: &[Step]) -> Self {
        Self(steps.to_vec())
    }
}
