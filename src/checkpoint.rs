// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Bootstrap snapshots of a document.
//!
//! A freshly opened document is loaded from a [`Checkpoint`] before any command is applied. The
//! snapshot stamps everything with a single versionstamp and stores list element ids in a
//! compressed form, `{counter}:{actor index}`, where the index points into the checkpoint's actor
//! table. [`Checkpoint::resolve_id`] turns those back into regular [`NodeId`]s.
//!
//! With the `serde` feature a checkpoint deserializes from the JSON the server hands out:
//!
//! ```json
//! {
//!   "id": "doc",
//!   "vs": "AAAAOTKy5nUAAA==",
//!   "actors": { "0": "gst_b355e9c9", "1": "gst_b2b6d556" },
//!   "lists": { "todo": { "ids": ["0:0"], "afters": ["root"], "values": ["\"milk\""] } },
//!   "maps": { "settings": { "theme": "\"dark\"" } }
//! }
//! ```
use crate::{
    crdts::reverse_tree::{NodeId, NodeValue, node_id::{NodeIdError, ROOT, SessionToken}},
    versionstamp::{Versionstamp, VersionstampError},
};
use std::collections::BTreeMap;

/// Error returned when a checkpoint cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CheckpointError {
    /// A list element id is neither `root` nor `{counter}:{actor index}`.
    #[error("checkpoint id {raw:?} is not of the form `counter:actor`")]
    InvalidId { raw: String },
    /// A list element id refers to an actor missing from the actor table.
    #[error("checkpoint id {raw:?} refers to unknown actor {actor}")]
    UnknownActor { raw: String, actor: u32 },
    /// An actor token cannot be used as a session token.
    #[error("invalid actor in checkpoint: {0}")]
    InvalidActor(#[from] NodeIdError),
    /// The parallel arrays of a list have different lengths.
    #[error(
        "list {list:?} has {ids} ids, {afters} afters and {values} values in its checkpoint"
    )]
    LengthMismatch {
        list: String,
        ids: usize,
        afters: usize,
        values: usize,
    },
    #[error(transparent)]
    Versionstamp(#[from] VersionstampError),
}

/// A snapshot of one list, as three parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct ListCheckpoint {
    #[cfg_attr(feature = "serde", serde(default))]
    pub ids: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub afters: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub values: Vec<NodeValue>,
}

/// A previous state of a whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Checkpoint {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub index: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub api_version: u32,
    /// The stamp of the last command folded into this snapshot. Empty if there was none.
    #[cfg_attr(feature = "serde", serde(default))]
    pub vs: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, deserialize_with = "wire::deserialize_actors")
    )]
    pub actors: BTreeMap<u32, String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lists: BTreeMap<String, ListCheckpoint>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub maps: BTreeMap<String, BTreeMap<String, NodeValue>>,
}

impl Checkpoint {
    /// Decodes the checkpoint's stamp. An empty `vs` yields `None`.
    pub fn versionstamp(&self) -> Result<Option<Versionstamp>, CheckpointError> {
        Ok(Versionstamp::from_optional_token(&self.vs)?)
    }

    /// Expands a `{counter}:{actor index}` id through the actor table.
    ///
    /// `root` passes through unchanged.
    pub fn resolve_id(&self, raw: &str) -> Result<NodeId, CheckpointError> {
        if raw == ROOT {
            return Ok(NodeId::Root);
        }
        let invalid = || CheckpointError::InvalidId {
            raw: raw.to_string(),
        };
        let (counter, actor) = raw.split_once(':').ok_or_else(invalid)?;
        let counter = counter.parse().map_err(|_| invalid())?;
        let actor = actor.parse().map_err(|_| invalid())?;
        let token = self
            .actors
            .get(&actor)
            .ok_or_else(|| CheckpointError::UnknownActor {
                raw: raw.to_string(),
                actor,
            })?;
        Ok(NodeId::item(counter, SessionToken::new(token.as_str())?))
    }

    /// Returns the `(after, id, value)` triples of a list, with ids expanded.
    ///
    /// A list that is not part of the checkpoint yields no triples.
    pub fn list_entries(
        &self,
        list_id: &str,
    ) -> Result<Vec<(NodeId, NodeId, NodeValue)>, CheckpointError> {
        let Some(list) = self.lists.get(list_id) else {
            return Ok(Vec::new());
        };
        if list.ids.len() != list.afters.len() || list.ids.len() != list.values.len() {
            return Err(CheckpointError::LengthMismatch {
                list: list_id.to_string(),
                ids: list.ids.len(),
                afters: list.afters.len(),
                values: list.values.len(),
            });
        }
        list.afters
            .iter()
            .zip(&list.ids)
            .zip(&list.values)
            .map(|((after, id), value)| {
                Ok((self.resolve_id(after)?, self.resolve_id(id)?, value.clone()))
            })
            .collect()
    }
}

#[cfg(feature = "serde")]
pub(crate) mod wire {
    use crate::crdts::reverse_tree::{ContainerKind, NodeValue};
    use serde::{Deserialize, Deserializer, Serialize};
    use std::collections::BTreeMap;

    /// The JSON spelling of a [`NodeValue`].
    #[derive(Deserialize, Serialize)]
    #[serde(untagged)]
    pub(crate) enum RawNodeValue {
        Str(String),
        Reference {
            #[serde(rename = "type")]
            kind: ContainerKind,
            #[serde(rename = "ref")]
            id: String,
        },
        Tombstone {
            t: String,
        },
    }

    impl TryFrom<RawNodeValue> for NodeValue {
        type Error = String;

        fn try_from(raw: RawNodeValue) -> Result<Self, Self::Error> {
            match raw {
                RawNodeValue::Str(s) => Ok(NodeValue::Str(s)),
                RawNodeValue::Reference { kind, id } => Ok(NodeValue::Reference { kind, id }),
                RawNodeValue::Tombstone { t } if t.is_empty() => Ok(NodeValue::Tombstone),
                RawNodeValue::Tombstone { t } => Err(format!("unknown marker value {t:?}")),
            }
        }
    }

    impl From<NodeValue> for RawNodeValue {
        fn from(value: NodeValue) -> Self {
            match value {
                NodeValue::Str(s) => RawNodeValue::Str(s),
                NodeValue::Tombstone => RawNodeValue::Tombstone { t: String::new() },
                NodeValue::Reference { kind, id } => RawNodeValue::Reference { kind, id },
            }
        }
    }

    // NOTE: keys are parsed by hand since integer keys don't survive untagged buffering.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawActors {
        Table(BTreeMap<String, String>),
        List(Vec<String>),
    }

    pub(super) fn deserialize_actors<'de, D>(deserializer: D) -> Result<BTreeMap<u32, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        match RawActors::deserialize(deserializer)? {
            RawActors::Table(table) => table
                .into_iter()
                .map(|(index, actor)| {
                    let index = index
                        .parse()
                        .map_err(|_| D::Error::custom(format!("invalid actor index {index:?}")))?;
                    Ok((index, actor))
                })
                .collect(),
            RawActors::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(index, actor)| {
                    let index = u32::try_from(index).map_err(D::Error::custom)?;
                    Ok((index, actor))
                })
                .collect(),
        }
    }
}
