// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{
    checkpoint::{Checkpoint, CheckpointError},
    codec::ValueCodec,
    command::{self, Command, CommandError},
    crdts::{
        Origin,
        reverse_tree::{
            ContainerKind, InsertParams, NodeId, NodeValue, ReverseTree, SessionToken, TreeError,
        },
    },
    versionstamp::{Versionstamp, VersionstampError},
};
use std::{fmt, marker::PhantomData};

/// Error returned by [`ListInterpreter`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ListError {
    /// No element at `index`, or no element to anchor an insert at `index` to.
    #[error("list has {len} elements, no index {index}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Versionstamp(#[from] VersionstampError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// A replicated list of values.
///
/// Next to the [`ReverseTree`] holding the list, the interpreter keeps the ids of the live
/// elements in document order, so index-based operations don't have to traverse the tree.
pub struct ListInterpreter<C> {
    doc_id: String,
    list_id: String,
    tree: ReverseTree,
    item_ids: Vec<NodeId>,
    codec: PhantomData<fn() -> C>,
}

impl<C> fmt::Debug for ListInterpreter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListInterpreter")
            .field("doc_id", &self.doc_id)
            .field("list_id", &self.list_id)
            .field("tree", &self.tree)
            .field("item_ids", &self.item_ids)
            .finish()
    }
}

impl<C> Clone for ListInterpreter<C> {
    fn clone(&self) -> Self {
        Self {
            doc_id: self.doc_id.clone(),
            list_id: self.list_id.clone(),
            tree: self.tree.clone(),
            item_ids: self.item_ids.clone(),
            codec: PhantomData,
        }
    }
}

impl<C> ListInterpreter<C>
where
    C: ValueCodec,
{
    /// Creates an empty list with a fresh, random session.
    #[cfg(feature = "ulid")]
    pub fn new(doc_id: impl Into<String>, list_id: impl Into<String>) -> Self {
        Self::with_session(doc_id, list_id, SessionToken::random())
    }

    pub fn with_session(
        doc_id: impl Into<String>,
        list_id: impl Into<String>,
        session: SessionToken,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            list_id: list_id.into(),
            tree: ReverseTree::new(session),
            item_ids: Vec::new(),
            codec: PhantomData,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub fn session(&self) -> &SessionToken {
        self.tree.session()
    }

    pub fn tree(&self) -> &ReverseTree {
        &self.tree
    }

    /// The command declaring this list to the sequencer.
    pub fn create_command(&self) -> Command {
        Command::ListCreate {
            doc_id: self.doc_id.clone(),
            list_id: self.list_id.clone(),
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    /// Ids of the live elements in document order.
    pub fn item_ids(&self) -> &[NodeId] {
        &self.item_ids
    }

    fn anchor(&self, index: usize) -> Result<NodeId, ListError> {
        if index == 0 {
            return Ok(NodeId::Root);
        }
        self.item_ids
            .get(index - 1)
            .cloned()
            .ok_or(ListError::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    // A locally minted id sorts before every existing child of `after`, so the new element lands
    // right behind its anchor in document order.
    fn insert_local(&mut self, after: NodeId, escaped: String) -> Result<NodeId, ListError> {
        Ok(self.tree.insert(InsertParams {
            after,
            value: NodeValue::Str(escaped),
            external_id: None,
            origin: Origin::Local,
        })?)
    }

    /// Inserts `value` so that it ends up at `index`. `index` may be the length of the list.
    pub fn insert_at(&mut self, index: usize, value: &C::Value) -> Result<Command, ListError> {
        let after = self.anchor(index)?;
        let escaped = C::escape(value);
        let id = self.insert_local(after.clone(), escaped.clone())?;
        self.item_ids.insert(index, id.clone());

        Ok(Command::ListInsert {
            doc_id: self.doc_id.clone(),
            list_id: self.list_id.clone(),
            after,
            id,
            value: escaped,
        })
    }

    /// Inserts `value` right after the element at `index`.
    pub fn insert_after(&mut self, index: usize, value: &C::Value) -> Result<Command, ListError> {
        let at = index.checked_add(1).ok_or(ListError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        self.insert_at(at, value)
    }

    /// Appends `value`.
    ///
    /// # Errors
    ///
    /// Fails with [`TreeError::CounterExhausted`] if no new element id can be minted.
    pub fn push(&mut self, value: &C::Value) -> Result<Command, ListError> {
        let after = self.tree.last_id();
        let escaped = C::escape(value);
        let id = self.insert_local(after.clone(), escaped.clone())?;
        self.item_ids.push(id.clone());

        Ok(Command::ListInsert {
            doc_id: self.doc_id.clone(),
            list_id: self.list_id.clone(),
            after,
            id,
            value: escaped,
        })
    }

    /// Appends every value in turn, returning one command per value.
    ///
    /// Stops at the first value that can't be appended; the ones before it stay in the list.
    pub fn push_all<'v>(
        &mut self,
        values: impl IntoIterator<Item = &'v C::Value>,
    ) -> Result<Vec<Command>, ListError>
    where
        C::Value: 'v,
    {
        values.into_iter().map(|value| self.push(value)).collect()
    }

    /// Overwrites the element at `index`.
    pub fn set_at(&mut self, index: usize, value: &C::Value) -> Result<Command, ListError> {
        let id = self
            .item_ids
            .get(index)
            .cloned()
            .ok_or(ListError::IndexOutOfRange {
                index,
                len: self.len(),
            })?;
        let escaped = C::escape(value);
        self.tree
            .put(id.clone(), NodeValue::Str(escaped.clone()), Origin::Local);

        Ok(Command::ListPut {
            doc_id: self.doc_id.clone(),
            list_id: self.list_id.clone(),
            id,
            value: escaped,
        })
    }

    /// Deletes the element at `index`. Returns `None`, and does nothing, if there is none.
    pub fn delete_at(&mut self, index: usize) -> Option<Command> {
        if index >= self.item_ids.len() {
            tracing::warn!(
                index,
                len = self.len(),
                list_id = %self.list_id,
                "delete of unknown index"
            );
            return None;
        }
        let id = self.item_ids.remove(index);
        self.tree.delete(id.clone(), Origin::Local);

        Some(Command::ListDelete {
            doc_id: self.doc_id.clone(),
            list_id: self.list_id.clone(),
            id,
        })
    }

    /// Reads the element at `index`.
    ///
    /// # Errors
    ///
    /// Fails if the element holds a reference to another container.
    pub fn get(&self, index: usize) -> Result<Option<C::Value>, ListError> {
        let Some(id) = self.item_ids.get(index) else {
            return Ok(None);
        };
        match self.tree.get(id) {
            Some(NodeValue::Str(escaped)) => Ok(Some(C::unescape(escaped))),
            Some(NodeValue::Reference { .. }) => {
                Err(TreeError::UnsupportedValue { id: id.clone() }.into())
            }
            Some(NodeValue::Tombstone) | None => Ok(None),
        }
    }

    /// Returns the live values in document order.
    pub fn to_vec(&self) -> Result<Vec<C::Value>, ListError> {
        Ok(self.tree.to_vec()?.into_iter().map(C::unescape).collect())
    }

    /// Returns the live elements with their ids, in document order.
    pub fn entries(&self) -> Result<Vec<(NodeId, C::Value)>, ListError> {
        Ok(self
            .tree
            .to_ordered_sequence()?
            .into_iter()
            .map(|(id, escaped)| (id, C::unescape(escaped)))
            .collect())
    }

    /// Checks that `tuple` is addressed to this list.
    pub fn validate_command<S: AsRef<str>>(&self, tuple: &[S]) -> Result<(), CommandError> {
        command::validate_route(tuple, &self.doc_id, &self.list_id)
    }

    /// Applies a command that came back from the sequencer.
    ///
    /// `versionstamp` is the token the sequencer assigned to the command, and `ack` tells whether
    /// the command was issued by this very session.
    ///
    /// # Errors
    ///
    /// Fails, without touching the list, if the tuple is misrouted or malformed, is not a list
    /// command, or if `versionstamp` doesn't decode.
    pub fn apply_command<S: AsRef<str>>(
        &mut self,
        tuple: &[S],
        versionstamp: &str,
        ack: bool,
    ) -> Result<(), ListError> {
        self.validate_command(tuple)?;
        command::validate_container(tuple, ContainerKind::List)?;
        let command = Command::parse(tuple)?;
        let origin = Origin::remote(Versionstamp::from_token(versionstamp)?, ack);

        match command {
            Command::ListCreate { .. } => {}
            Command::ListInsert {
                after, id, value, ..
            } => {
                let before = self.visibility(&id);
                self.tree.insert(InsertParams {
                    after,
                    value: NodeValue::Str(value),
                    external_id: Some(id.clone()),
                    origin,
                })?;
                if before != Some(Visibility::Placed { live: true }) {
                    self.rebuild_item_ids();
                }
            }
            Command::ListPut { id, value, .. } => {
                let before = self.visibility(&id);
                self.tree.put(id, NodeValue::Str(value), origin);
                // only a revived tombstone can change which elements are visible
                if before == Some(Visibility::Placed { live: false }) {
                    self.rebuild_item_ids();
                }
            }
            Command::ListDelete { id, .. } => {
                if self.tree.delete(id.clone(), origin).took_value() {
                    self.item_ids.retain(|item| *item != id);
                }
            }
            command @ (Command::MapCreate { .. }
            | Command::MapPut { .. }
            | Command::MapDelete { .. }) => {
                return Err(CommandError::WrongContainer {
                    keyword: command.keyword(),
                    target: ContainerKind::List,
                }
                .into());
            }
        }
        Ok(())
    }

    fn visibility(&self, id: &NodeId) -> Option<Visibility> {
        let node = self.tree.node(id)?;
        Some(match node.after() {
            Some(_) => Visibility::Placed {
                live: !node.value().is_tombstone(),
            },
            None => Visibility::Positionless,
        })
    }

    fn rebuild_item_ids(&mut self) {
        self.item_ids = self.tree.live_ids();
        tracing::debug!(list_id = %self.list_id, len = self.item_ids.len(), "rebuilt item ids");
    }

    /// Replaces the list with its state in `checkpoint`.
    ///
    /// Ids minted afterwards still use this interpreter's session.
    pub fn import_from_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), ListError> {
        let session = self.tree.session().clone();
        self.tree.import(session, checkpoint, &self.list_id)?;
        self.rebuild_item_ids();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Positionless,
    Placed { live: bool },
}
