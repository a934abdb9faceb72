//! Retry policy and kernel configuration.

pub mod config;
pub mod retry;

pub use config::KernelConfig;
pub use retry::{Backoff, RetryPolicy};
