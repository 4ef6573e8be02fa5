// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{LwwCell, Origin, WriteOutcome};
use crate::{
    HashMap,
    checkpoint::{Checkpoint, CheckpointError},
    clock::{Clock, MonotonicClock},
    config::Config,
    crdts::NodeValue,
    versionstamp::Versionstamp,
};
use std::{
    collections::{VecDeque, hash_map},
    time::Duration,
};

/// A key of an [`LwwMap`] together with its reconciliation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    // `None` is a tombstone
    cell: LwwCell<Option<String>>,
    deleted_at: Option<Duration>,
}

impl Entry {
    /// The current value, or `None` if the key is deleted.
    pub fn value(&self) -> Option<&str> {
        self.cell.value().as_deref()
    }

    pub fn versionstamp(&self) -> Option<&Versionstamp> {
        self.cell.versionstamp()
    }

    pub fn is_local(&self) -> bool {
        self.cell.is_local()
    }

    pub fn is_tombstone(&self) -> bool {
        self.cell.value().is_none()
    }

    /// When the key was deleted, as read from the map's [`Clock`].
    pub fn deleted_at(&self) -> Option<Duration> {
        self.deleted_at
    }
}

/// A last-writer-wins map from string keys to string values.
///
/// Writes are reconciled per key with the rule documented in the [module docs](super). A deleted
/// key is kept as a tombstone so that a write which was in flight before the deletion can't bring
/// it back. Tombstones are forgotten once they are older than [`Config::tombstone_ttl`]; garbage
/// collection runs when [`LwwMap::collect_garbage`] is called and before every local deletion.
///
/// ```rust
/// # use cowrite::crdts::{LwwMap, Origin};
/// let mut map = LwwMap::new();
/// map.put("theme".into(), "dark".into(), Origin::Local);
/// assert_eq!(map.get("theme"), Some("dark"));
///
/// map.delete("theme".into(), Origin::Local);
/// assert_eq!(map.get("theme"), None);
/// assert!(map.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct LwwMap<K = MonotonicClock> {
    entries: HashMap<String, Entry>,
    // in deletion order, so expired tombstones are always at the front
    gc_queue: VecDeque<(String, Duration)>,
    config: Config,
    clock: K,
}

impl LwwMap<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_clock(config, MonotonicClock::default())
    }
}

impl Default for LwwMap<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> LwwMap<K>
where
    K: Clock,
{
    pub fn with_clock(config: Config, clock: K) -> Self {
        Self {
            entries: HashMap::default(),
            gc_queue: VecDeque::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Writes `value` under `key`.
    pub fn put(&mut self, key: String, value: String, origin: Origin) -> WriteOutcome {
        match self.entries.entry(key) {
            hash_map::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    cell: LwwCell::new(Some(value), &origin),
                    deleted_at: None,
                });
                WriteOutcome::Created
            }
            hash_map::Entry::Occupied(occupied) => {
                let (key, entry) = (occupied.key().clone(), occupied.into_mut());
                let outcome = entry.cell.write(Some(value), origin);
                match outcome {
                    WriteOutcome::Stale => tracing::debug!(%key, "ignoring stale map write"),
                    // revived; any queued collection of the old tombstone must not fire
                    _ if outcome.took_value() => entry.deleted_at = None,
                    _ => {}
                }
                outcome
            }
        }
    }

    /// Deletes `key`, leaving a tombstone.
    ///
    /// Deleting a key that was never written still records the tombstone, so a stale write for
    /// it that arrives later is rejected.
    pub fn delete(&mut self, key: String, origin: Origin) -> WriteOutcome {
        if origin.is_local() {
            self.collect_garbage();
        }

        let now = self.clock.now();
        let outcome = match self.entries.entry(key.clone()) {
            hash_map::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    cell: LwwCell::new(None, &origin),
                    deleted_at: Some(now),
                });
                WriteOutcome::Created
            }
            hash_map::Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                let outcome = entry.cell.write(None, origin);
                if outcome.took_value() {
                    entry.deleted_at = Some(now);
                } else if outcome == WriteOutcome::Stale {
                    tracing::debug!(%key, "ignoring stale map delete");
                }
                outcome
            }
        };

        if outcome.took_value() {
            self.gc_queue.push_back((key, now));
        }
        outcome
    }

    /// Drops tombstones older than the configured TTL.
    ///
    /// A queued key whose tombstone was revived, or deleted again more recently, is skipped.
    pub fn collect_garbage(&mut self) {
        let now = self.clock.now();
        let ttl = self.config.tombstone_ttl;
        let expired = |deleted_at: Duration| deleted_at.saturating_add(ttl) <= now;

        while let Some(&(_, deleted_at)) = self.gc_queue.front() {
            if !expired(deleted_at) {
                break;
            }
            let Some((key, _)) = self.gc_queue.pop_front() else {
                break;
            };
            let collect = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.is_tombstone() && entry.deleted_at.is_some_and(expired));
            if collect {
                tracing::trace!(%key, "collecting tombstone");
                self.entries.remove(&key);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Entry::value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the entry for `key`, tombstone or not.
    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Iterates over the live keys and their values, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(key, entry)| Some((key.as_str(), entry.value()?)))
    }

    /// Iterates over the live keys, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(key, _)| key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored keys, tombstones included.
    pub fn stored_len(&self) -> usize {
        self.entries.len()
    }

    /// Replaces the contents with the map `map_id` from a checkpoint.
    ///
    /// Values are confirmed and carry the checkpoint's stamp. Tombstones in the checkpoint are
    /// skipped, as are references to nested containers. On error the map is left untouched.
    pub fn import_from_checkpoint(
        &mut self,
        checkpoint: &Checkpoint,
        map_id: &str,
    ) -> Result<(), CheckpointError> {
        let versionstamp = checkpoint.versionstamp()?;

        self.entries.clear();
        self.gc_queue.clear();
        let Some(values) = checkpoint.maps.get(map_id) else {
            return Ok(());
        };
        for (key, value) in values {
            match value {
                NodeValue::Str(value) => {
                    self.entries.insert(
                        key.clone(),
                        Entry {
                            cell: LwwCell::confirmed(Some(value.clone()), versionstamp.clone()),
                            deleted_at: None,
                        },
                    );
                }
                NodeValue::Tombstone => {}
                NodeValue::Reference { .. } => {
                    tracing::warn!(%key, map_id, "skipping container reference in checkpoint");
                }
            }
        }
        Ok(())
    }
}
