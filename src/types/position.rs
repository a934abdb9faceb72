//! Exact temporal positions and durations.
//!
//! Musical time is kept as a normalised rational so that tuplet arithmetic
//! (thirds, fifths, nested ratios) never accumulates rounding error.
//!
//! Results that do not fit `i64/i64` are never truncated: the `checked_*`
//! methods return `None` and the operators panic.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};
use std::str::FromStr;

/// Elapsed musical time from the start of a traversal scope, or a duration.
///
/// Always stored in lowest terms with a positive denominator, so derived
/// `Eq`/`Hash` are structural. `+`, `-` and `*` panic on overflow, like
/// integer arithmetic in debug builds; use [`Position::checked_add`] and
/// friends where inputs are not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Position {
    num: i64,
    den: i64,
}

/// Error parsing a position from its `n/d` text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    /// Denominator was zero.
    #[error("Zero denominator in position")]
    ZeroDenominator,
    /// Text was not of the form `n` or `n/d`.
    #[error("Malformed position: {0}")]
    Malformed(String),
    /// Value does not fit in `i64/i64` once normalised.
    #[error("Position out of range")]
    Overflow,
    /// A duration was negative.
    #[error("Negative duration: {0}")]
    NegativeDuration(Position),
    /// A ratio was zero or negative.
    #[error("Ratio must be positive: {0}")]
    NonPositiveRatio(Position),
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Position {
    /// Position zero.
    pub const ZERO: Position = Position { num: 0, den: 1 };

    /// Position one (a whole note; also the identity ratio).
    pub const ONE: Position = Position { num: 1, den: 1 };

    /// Create a position `num/den`.
    ///
    /// # Panics
    /// Panics if `den` is zero or the normalised value does not fit. Use
    /// [`Position::try_new`] for untrusted input.
    pub fn new(num: i64, den: i64) -> Self {
        match Self::try_new(num, den) {
            Ok(p) => p,
            Err(e) => panic!("Invalid position {}/{}: {}", num, den, e),
        }
    }

    /// Create a position, rejecting a zero denominator.
    pub fn try_new(num: i64, den: i64) -> Result<Self, PositionError> {
        if den == 0 {
            return Err(PositionError::ZeroDenominator);
        }
        Self::reduce(num as i128, den as i128).ok_or(PositionError::Overflow)
    }

    /// A whole number of units.
    pub fn from_integer(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    /// Normalise `num/den`; `None` if the result does not fit in `i64`.
    /// Inputs are products of at most two `i64`s, so nothing here overflows
    /// `i128`.
    fn reduce(num: i128, den: i128) -> Option<Self> {
        let (mut num, mut den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd(num, den);
        if g > 1 {
            num /= g;
            den /= g;
        }
        Some(Self {
            num: i64::try_from(num).ok()?,
            den: i64::try_from(den).ok()?,
        })
    }

    /// `self + rhs`, or `None` if the result does not fit.
    pub fn checked_add(self, rhs: Position) -> Option<Position> {
        let num = self.num as i128 * rhs.den as i128 + rhs.num as i128 * self.den as i128;
        Self::reduce(num, self.den as i128 * rhs.den as i128)
    }

    /// `self - rhs`, or `None` if the result does not fit.
    pub fn checked_sub(self, rhs: Position) -> Option<Position> {
        let num = self.num as i128 * rhs.den as i128 - rhs.num as i128 * self.den as i128;
        Self::reduce(num, self.den as i128 * rhs.den as i128)
    }

    /// `self * rhs`, or `None` if the result does not fit.
    pub fn checked_mul(self, rhs: Position) -> Option<Position> {
        Self::reduce(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }

    /// Numerator in lowest terms.
    pub fn numer(&self) -> i64 {
        self.num
    }

    /// Denominator in lowest terms (always positive).
    pub fn denom(&self) -> i64 {
        self.den
    }

    /// True for position zero.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// True for strictly negative values.
    pub fn is_negative(&self) -> bool {
        self.num < 0
    }

    /// True for strictly positive values.
    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Lossy conversion for display and diagnostics.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        match self.checked_add(rhs) {
            Some(p) => p,
            None => panic!("Position overflow: {} + {}", self, rhs),
        }
    }
}

impl AddAssign for Position {
    fn add_assign(&mut self, rhs: Position) {
        *self = *self + rhs;
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        match self.checked_sub(rhs) {
            Some(p) => p,
            None => panic!("Position overflow: {} - {}", self, rhs),
        }
    }
}

impl Mul for Position {
    type Output = Position;

    fn mul(self, rhs: Position) -> Position {
        match self.checked_mul(rhs) {
            Some(p) => p,
            None => panic!("Position overflow: {} * {}", self, rhs),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for Position {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PositionError::Malformed(s.to_string());
        match s.trim().split_once('/') {
            Some((n, d)) => {
                let n = n.trim().parse::<i64>().map_err(|_| malformed())?;
                let d = d.trim().parse::<i64>().map_err(|_| malformed())?;
                Position::try_new(n, d)
            }
            None => s
                .trim()
                .parse::<i64>()
                .map(Position::from_integer)
                .map_err(|_| malformed()),
        }
    }
}

impl TryFrom<String> for Position {
    type Error = PositionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Position> for String {
    fn from(p: Position) -> Self {
        p.to_string()
    }
}

/// How far an item advances its voice. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Position", into = "Position")]
pub struct Duration(Position);

impl Duration {
    /// No time at all.
    pub const ZERO: Duration = Duration(Position::ZERO);

    /// Duration of `length`, rejecting negative lengths.
    pub fn new(length: Position) -> Result<Self, PositionError> {
        if length.is_negative() {
            return Err(PositionError::NegativeDuration(length));
        }
        Ok(Self(length))
    }

    /// The length as a position offset.
    pub fn get(self) -> Position {
        self.0
    }
}

impl TryFrom<Position> for Duration {
    type Error = PositionError;

    fn try_from(length: Position) -> Result<Self, Self::Error> {
        Self::new(length)
    }
}

impl From<Duration> for Position {
    fn from(d: Duration) -> Self {
        d.0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Strictly positive scale factor, such as a tuplet ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Position", into = "Position")]
pub struct Ratio(Position);

impl Ratio {
    /// Plays as written.
    pub const ONE: Ratio = Ratio(Position::ONE);

    /// Ratio of `factor`, rejecting zero and negative factors.
    pub fn new(factor: Position) -> Result<Self, PositionError> {
        if !factor.is_positive() {
            return Err(PositionError::NonPositiveRatio(factor));
        }
        Ok(Self(factor))
    }

    /// The factor.
    pub fn get(self) -> Position {
        self.0
    }
}

impl TryFrom<Position> for Ratio {
    type Error = PositionError;

    fn try_from(factor: Position) -> Result<Self, Self::Error> {
        Self::new(factor)
    }
}

impl From<Ratio> for Position {
    fn from(r: Ratio) -> Self {
        r.0
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
