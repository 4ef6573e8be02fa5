// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{
    checkpoint::{Checkpoint, CheckpointError},
    clock::{Clock, MonotonicClock},
    codec::ValueCodec,
    command::{self, Command, CommandError, Keyword},
    config::Config,
    crdts::{LwwMap, Origin, reverse_tree::ContainerKind},
    versionstamp::{Versionstamp, VersionstampError},
};
use std::{collections::BTreeMap, fmt, marker::PhantomData};

/// Error returned by [`MapInterpreter`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MapError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Versionstamp(#[from] VersionstampError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// A replicated map from string keys to values.
pub struct MapInterpreter<C, K = MonotonicClock> {
    doc_id: String,
    map_id: String,
    map: LwwMap<K>,
    codec: PhantomData<fn() -> C>,
}

impl<C, K> fmt::Debug for MapInterpreter<C, K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapInterpreter")
            .field("doc_id", &self.doc_id)
            .field("map_id", &self.map_id)
            .field("map", &self.map)
            .finish()
    }
}

impl<C> MapInterpreter<C, MonotonicClock>
where
    C: ValueCodec,
{
    pub fn new(doc_id: impl Into<String>, map_id: impl Into<String>) -> Self {
        Self::with_config(doc_id, map_id, Config::default())
    }

    pub fn with_config(
        doc_id: impl Into<String>,
        map_id: impl Into<String>,
        config: Config,
    ) -> Self {
        Self::with_clock(doc_id, map_id, config, MonotonicClock::default())
    }
}

impl<C, K> MapInterpreter<C, K>
where
    C: ValueCodec,
    K: Clock,
{
    pub fn with_clock(
        doc_id: impl Into<String>,
        map_id: impl Into<String>,
        config: Config,
        clock: K,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            map_id: map_id.into(),
            map: LwwMap::with_clock(config, clock),
            codec: PhantomData,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub fn map(&self) -> &LwwMap<K> {
        &self.map
    }

    /// The command declaring this map to the sequencer.
    pub fn create_command(&self) -> Command {
        Command::MapCreate {
            doc_id: self.doc_id.clone(),
            map_id: self.map_id.clone(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: &C::Value) -> Command {
        let key = key.into();
        let escaped = C::escape(value);
        self.map.put(key.clone(), escaped.clone(), Origin::Local);

        Command::MapPut {
            doc_id: self.doc_id.clone(),
            map_id: self.map_id.clone(),
            key,
            value: escaped,
        }
    }

    pub fn delete(&mut self, key: impl Into<String>) -> Command {
        let key = key.into();
        self.map.delete(key.clone(), Origin::Local);

        Command::MapDelete {
            doc_id: self.doc_id.clone(),
            map_id: self.map_id.clone(),
            key,
        }
    }

    pub fn get(&self, key: &str) -> Option<C::Value> {
        self.map.get(key).map(C::unescape)
    }

    /// Iterates over the live keys, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a sorted snapshot of the live entries.
    pub fn to_map(&self) -> BTreeMap<String, C::Value> {
        self.map
            .iter()
            .map(|(key, escaped)| (key.to_string(), C::unescape(escaped)))
            .collect()
    }

    /// Checks that `tuple` is addressed to this map.
    pub fn validate_command<S: AsRef<str>>(&self, tuple: &[S]) -> Result<(), CommandError> {
        command::validate_route(tuple, &self.doc_id, &self.map_id)
    }

    /// Applies a command that came back from the sequencer.
    ///
    /// Expired tombstones are collected first. `mput` and `mdel` commands with the wrong number
    /// of entries are logged and skipped, so peers speaking a newer protocol don't stall us.
    ///
    /// # Errors
    ///
    /// Fails, without touching the map, if the tuple is misrouted, has an unknown keyword, is not
    /// a map command, or if `versionstamp` doesn't decode.
    pub fn apply_command<S: AsRef<str>>(
        &mut self,
        tuple: &[S],
        versionstamp: &str,
        ack: bool,
    ) -> Result<(), MapError> {
        self.validate_command(tuple)?;
        command::validate_container(tuple, ContainerKind::Map)?;
        self.map.collect_garbage();

        let command = match Command::parse(tuple) {
            Ok(command) => command,
            Err(CommandError::Arity {
                keyword: keyword @ (Keyword::MapPut | Keyword::MapDelete),
                expected,
                found,
            }) => {
                tracing::error!(
                    %keyword,
                    expected,
                    found,
                    map_id = %self.map_id,
                    "ignoring malformed map command"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match command {
            Command::MapCreate { .. } => {}
            Command::MapPut { key, value, .. } => {
                let origin = Origin::remote(Versionstamp::from_token(versionstamp)?, ack);
                self.map.put(key, value, origin);
            }
            Command::MapDelete { key, .. } => {
                let origin = Origin::remote(Versionstamp::from_token(versionstamp)?, ack);
                self.map.delete(key, origin);
            }
            command @ (Command::ListCreate { .. }
            | Command::ListInsert { .. }
            | Command::ListPut { .. }
            | Command::ListDelete { .. }) => {
                return Err(CommandError::WrongContainer {
                    keyword: command.keyword(),
                    target: ContainerKind::Map,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Replaces the map with its state in `checkpoint`.
    pub fn import_from_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), MapError> {
        self.map.import_from_checkpoint(checkpoint, &self.map_id)?;
        Ok(())
    }
}
