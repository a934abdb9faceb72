//! Kernel configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::canonical::canonical_hash_hex;
use crate::DEFAULT_CONFIG_VERSION;

use super::retry::{QuantizedRetryPolicy, RetryPolicy};

/// Environment variable overriding [`RetryPolicy::max_attempts`].
pub const ENV_MAX_ATTEMPTS: &str = "PIECE_KERNEL_MAX_ATTEMPTS";
/// Environment variable overriding [`RetryPolicy::max_backoff_us`].
pub const ENV_MAX_BACKOFF_US: &str = "PIECE_KERNEL_MAX_BACKOFF_US";
/// Environment variable overriding [`KernelConfig::history_depth`].
pub const ENV_HISTORY_DEPTH: &str = "PIECE_KERNEL_HISTORY_DEPTH";
/// Environment variable overriding [`KernelConfig::resolver_cache_entries`].
pub const ENV_RESOLVER_CACHE: &str = "PIECE_KERNEL_RESOLVER_CACHE";

/// Runtime configuration of the coordinator and resolver.
///
/// ## Parameters
///
/// - `retry`: how conflicting transactions are retried
/// - `history_depth`: prior versions kept per document for undo
/// - `resolver_cache_entries`: capacity of the element-id lookup cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Configuration version identifier.
    pub version: String,
    /// Retry policy for transactions.
    pub retry: RetryPolicy,
    /// Undo history depth per document (0 disables undo).
    pub history_depth: usize,
    /// Entries in the resolver's id cache.
    pub resolver_cache_entries: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CONFIG_VERSION.to_string(),
            retry: RetryPolicy::default(),
            history_depth: 32,
            resolver_cache_entries: 1024,
        }
    }
}

/// Quantized configuration for deterministic hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuantizedKernelConfig {
    version: String,
    retry: QuantizedRetryPolicy,
    history_depth: usize,
    resolver_cache_entries: usize,
}

fn setting<T, L>(lookup: &L, key: &str, default: T) -> T
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Unparseable setting, using default");
            default
        }
    }
}

impl KernelConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_attempts: setting(&lookup, ENV_MAX_ATTEMPTS, defaults.retry.max_attempts).max(1),
            max_backoff_us: setting(&lookup, ENV_MAX_BACKOFF_US, defaults.retry.max_backoff_us),
            ..defaults.retry
        };
        Self {
            version: defaults.version,
            retry,
            history_depth: setting(&lookup, ENV_HISTORY_DEPTH, defaults.history_depth),
            resolver_cache_entries: setting(
                &lookup,
                ENV_RESOLVER_CACHE,
                defaults.resolver_cache_entries,
            ),
        }
    }

    /// Get the configuration ID.
    pub fn config_id(&self) -> &str {
        &self.version
    }

    /// Compute a hash of the configuration.
    ///
    /// Floats are quantized before hashing so the hash is stable across
    /// platforms and serializer settings.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&QuantizedKernelConfig {
            version: self.version.clone(),
            retry: self.retry.to_quantized(),
            history_depth: self.history_depth,
            resolver_cache_entries: self.resolver_cache_entries,
        })
    }

    /// Small limits for tests.
    #[cfg(test)]
    pub fn minimal() -> Self {
        Self {
            version: DEFAULT_CONFIG_VERSION.to_string(),
            retry: RetryPolicy::spinning(8),
            history_depth: 2,
            resolver_cache_entries: 4,
        }
    }
}
