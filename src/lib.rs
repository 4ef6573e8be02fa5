// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # cowrite: client-side replication for collaboratively edited lists and maps
//!
//! This crate is the client half of a sequencer-based collaboration protocol. Every client
//! applies its own edits optimistically and sends them to a central sequencer as small string
//! tuples, the [`Command`]s. The sequencer assigns each command a position in a single global
//! order, its [`Versionstamp`], and broadcasts it to every client in the document, including
//! the one that wrote it (an "ack"). Commands may arrive late, twice, or out of order; the
//! structures in this crate converge regardless.
//!
//! ## Core Concepts
//!
//! - [`Versionstamp`]: the opaque, base64-encoded position assigned by the sequencer. Stamps of
//!   different lengths are compared as left-padded big-endian integers, see [`versionstamp`].
//! - [`ReverseTree`]: a list CRDT. Every element records the element it was inserted after, and
//!   the list order is a depth-first traversal of the resulting tree.
//! - [`LwwMap`]: a last-writer-wins map. Deletions leave a tombstone that keeps late writes from
//!   resurrecting the key until it is garbage collected.
//! - [`ListInterpreter`] and [`MapInterpreter`]: the command-level API. They turn application
//!   operations into commands, apply remote commands, and load server checkpoints.
//!
//! ## Last-Writer-Wins with Optimistic Writes
//!
//! All conflicts in this crate are resolved by versionstamp: of two writes to the same element
//! or key, the one the sequencer ordered later wins. Local writes have no stamp until they are
//! acked, so they win locally right away and are then either confirmed by their own ack or
//! replaced by a concurrent write the sequencer ordered after them. The full table lives on
//! [`crdts::LwwCell::write`].
//!
//! ## Getting Started
//!
//! ```rust
//! # #[cfg(feature = "json")] {
//! use cowrite::{MapInterpreter, codec::JsonCodec};
//! use serde_json::json;
//!
//! let mut alice = MapInterpreter::<JsonCodec>::new("doc", "settings");
//! let mut bob = MapInterpreter::<JsonCodec>::new("doc", "settings");
//!
//! // both edit the same key before hearing from each other
//! let from_alice = alice.set("theme", &json!("dark")).to_tuple();
//! let from_bob = bob.set("theme", &json!("light")).to_tuple();
//!
//! // the sequencer orders alice's write first
//! alice.apply_command(&from_alice, "AAAAAAAAAAAAAQo=", true).unwrap();
//! bob.apply_command(&from_alice, "AAAAAAAAAAAAAQo=", false).unwrap();
//! alice.apply_command(&from_bob, "AAAAAAAAAAAAAgo=", false).unwrap();
//! bob.apply_command(&from_bob, "AAAAAAAAAAAAAgo=", true).unwrap();
//!
//! assert_eq!(alice.get("theme"), Some(json!("light")));
//! assert_eq!(alice.to_map(), bob.to_map());
//! # }
//! ```
//!
//! ## Scope of this Crate
//!
//! **It does not include any networking.** Sending commands, receiving stamped commands and
//! fetching checkpoints is up to the application. The interpreters only rely on the sequencer
//! delivering every command to every client eventually, with a stamp that reflects its position
//! in the global order.
//!
//! ## Features
//!
//! - `json`: Enables the [`codec::JsonCodec`] and decoding of JSON checkpoints. Enabled by
//!   default.
//! - `serde`: Provides `serde` support for checkpoints, commands and configuration.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for versionstamps and node ids, useful for
//!   property-based testing.
//! - `ulid`: Enables random session tokens for new lists. Enabled by default.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

// Use a constant seed for hashing to make performance benchmarks have less variance.
pub(crate) const DETERMINISTIC_HASHER: RandomState = RandomState::with_seeds(48, 1516, 23, 42);

pub mod api;
pub use api::{ListInterpreter, MapInterpreter};
pub mod checkpoint;
pub use checkpoint::Checkpoint;
pub mod clock;
pub mod codec;
pub mod command;
pub use command::{Command, CommandError, Keyword};
pub mod config;
pub use config::Config;
pub mod crdts;
pub use crdts::{LwwMap, NodeId, Origin, ReverseTree};
pub mod versionstamp;
pub use versionstamp::Versionstamp;

static ENABLE_DETERMINISM: AtomicBool = AtomicBool::new(false);

/// Makes all hash maps in this crate use a fixed seed.
///
/// This should only be enabled for testing and benchmarking, as it increases the odds of DoS
/// scenarios.
#[doc(hidden)]
pub fn enable_determinism() {
    ENABLE_DETERMINISM.store(true, Ordering::Release);
}

/// Checks if determinism is enabled.
#[doc(hidden)]
pub fn determinism_enabled() -> bool {
    ENABLE_DETERMINISM.load(Ordering::Acquire)
}

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, CowriteRandomState>;
pub(crate) type HashSet<T> = std::collections::HashSet<T, CowriteRandomState>;

/// A small wrapper around [`ahash::RandomState`] that switches to a fixed seed once
/// [`enable_determinism`] has been called.
#[derive(Clone)]
pub struct CowriteRandomState {
    inner: RandomState,
}

impl Default for CowriteRandomState {
    #[inline]
    fn default() -> Self {
        let inner = if determinism_enabled() {
            DETERMINISTIC_HASHER
        } else {
            RandomState::new()
        };
        Self { inner }
    }
}

impl BuildHasher for CowriteRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.inner.build_hasher()
    }
}
