//! Retry policy for conflicting transactions.
//!
//! An attempt that loses a race is retried with a fresh snapshot. The first
//! few retries only yield the thread; after that the attempt sleeps with an
//! exponentially growing, capped backoff. Once `max_attempts` is reached the
//! transaction fails with `EditError::RetryLimit`.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! `backoff_multiplier` is quantized to an integer (factor 1e6) before
//! hashing, like every float that takes part in a params hash.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quantization factor for float normalization.
pub(crate) const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Quantize a float to an i64 for deterministic hashing.
pub(crate) fn quantize_float(value: f32) -> i64 {
    ((value as f64) * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

/// What to do before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry right away after yielding the thread.
    Yield,
    /// Sleep this long first.
    Sleep(Duration),
    /// Give up.
    Exhausted,
}

/// Bounded retry with capped exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Retries that only yield before sleeping starts.
    pub spin_attempts: u32,
    /// First sleep, in microseconds.
    pub initial_backoff_us: u64,
    /// Longest sleep, in microseconds.
    pub max_backoff_us: u64,
    /// Growth factor between sleeps.
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 64,
            spin_attempts: 3,
            initial_backoff_us: 20,
            max_backoff_us: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Never retry: the first conflict fails the transaction.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Only yield between attempts. Useful in tests.
    pub fn spinning(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            spin_attempts: max_attempts,
            ..Self::default()
        }
    }

    /// Decide what follows the failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Backoff {
        if attempt >= self.max_attempts {
            return Backoff::Exhausted;
        }
        if attempt <= self.spin_attempts {
            return Backoff::Yield;
        }

        let exponent = (attempt - self.spin_attempts - 1).min(32) as i32;
        let factor = (self.backoff_multiplier.max(1.0) as f64).powi(exponent);
        let micros = (self.initial_backoff_us as f64 * factor).min(self.max_backoff_us as f64);
        Backoff::Sleep(Duration::from_micros(micros as u64))
    }
}

/// Quantized retry parameters for deterministic hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QuantizedRetryPolicy {
    max_attempts: u32,
    spin_attempts: u32,
    initial_backoff_us: u64,
    max_backoff_us: u64,
    backoff_multiplier: i64,
}

impl RetryPolicy {
    pub(crate) fn to_quantized(&self) -> QuantizedRetryPolicy {
        QuantizedRetryPolicy {
            max_attempts: self.max_attempts,
            spin_attempts: self.spin_attempts,
            initial_backoff_us: self.initial_backoff_us,
            max_backoff_us: self.max_backoff_us,
            backoff_multiplier: quantize_float(self.backoff_multiplier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yield_then_sleep_then_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 6,
            spin_attempts: 2,
            initial_backoff_us: 10,
            max_backoff_us: 35,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.backoff(1), Backoff::Yield);
        assert_eq!(policy.backoff(2), Backoff::Yield);
        assert_eq!(policy.backoff(3), Backoff::Sleep(Duration::from_micros(10)));
        assert_eq!(policy.backoff(4), Backoff::Sleep(Duration::from_micros(20)));
        assert_eq!(policy.backoff(5), Backoff::Sleep(Duration::from_micros(35)));
        assert_eq!(policy.backoff(6), Backoff::Exhausted);
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(RetryPolicy::no_retry().backoff(1), Backoff::Exhausted);
    }

    #[test]
    fn test_spinning_never_sleeps() {
        let policy = RetryPolicy::spinning(4);
        assert!((1..4).all(|a| policy.backoff(a) == Backoff::Yield));
        assert_eq!(policy.backoff(4), Backoff::Exhausted);
    }

    #[test]
    fn test_quantize_float() {
        assert_eq!(quantize_float(2.0), 2_000_000);
        assert_eq!(quantize_float(1.5), 1_500_000);
    }
}
