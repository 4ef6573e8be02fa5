// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tunables.
use std::time::Duration;

/// Configuration for the containers of a document.
///
/// With the `serde` feature this deserializes with every field optional:
///
/// ```rust
/// # #[cfg(feature = "json")] {
/// # use cowrite::Config;
/// let config: Config = serde_json::from_str("{}").unwrap();
/// assert_eq!(config, Config::default());
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Deserialize, ::serde::Serialize),
    serde(default)
)]
pub struct Config {
    /// How long a deleted map key is remembered.
    ///
    /// The tombstone only needs to outlive commands that were already in flight when the key was
    /// deleted; after that any write for the key is newer than the deletion anyway.
    pub tombstone_ttl: Duration,
}

impl Config {
    pub const DEFAULT_TOMBSTONE_TTL: Duration = Duration::from_secs(10);

    /// Tombstones are collected as soon as garbage collection runs. Meant for tests.
    pub fn immediate_collection() -> Self {
        Self {
            tombstone_ttl: Duration::ZERO,
        }
    }

    pub fn with_tombstone_ttl(self, tombstone_ttl: Duration) -> Self {
        Self { tombstone_ttl }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tombstone_ttl: Self::DEFAULT_TOMBSTONE_TTL,
        }
    }
}
