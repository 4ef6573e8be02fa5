// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Command-level interpreters for lists and maps.
//!
//! An interpreter owns one container of one document. Application operations (push, insert at
//! an index, set a key, ...) go through it: it applies them optimistically to the underlying CRDT
//! and returns the [`Command`](crate::command::Command) to hand to the transport. Commands coming
//! back from the sequencer, stamped and flagged as acks or not, are fed to
//! [`ListInterpreter::apply_command`] or [`MapInterpreter::apply_command`].
//!
//! ```rust
//! # #[cfg(feature = "json")] {
//! use cowrite::{api::ListInterpreter, codec::JsonCodec, crdts::reverse_tree::SessionToken};
//! use serde_json::json;
//!
//! let mut alice = ListInterpreter::<JsonCodec>::with_session(
//!     "doc",
//!     "todo",
//!     SessionToken::new("alice").unwrap(),
//! );
//! let mut bob = ListInterpreter::<JsonCodec>::with_session(
//!     "doc",
//!     "todo",
//!     SessionToken::new("bob").unwrap(),
//! );
//!
//! let command = alice.push(&json!("milk")).unwrap();
//! // the sequencer stamps the command and delivers it to everyone
//! let tuple = command.to_tuple();
//! alice.apply_command(&tuple, "AAAAAAAAAAAAAQo=", true).unwrap();
//! bob.apply_command(&tuple, "AAAAAAAAAAAAAQo=", false).unwrap();
//!
//! assert_eq!(bob.get(0).unwrap(), Some(json!("milk")));
//! assert_eq!(alice.to_vec().unwrap(), bob.to_vec().unwrap());
//! # }
//! ```
pub mod list;
pub mod map;

pub use list::{ListError, ListInterpreter};
pub use map::{MapError, MapInterpreter};
