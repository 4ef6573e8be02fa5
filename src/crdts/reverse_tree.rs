// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{LwwCell, Origin, WriteOutcome};
use crate::{
    HashMap, HashSet,
    checkpoint::{Checkpoint, CheckpointError},
    versionstamp::Versionstamp,
};
use smallvec::SmallVec;
use std::{collections::hash_map::Entry, convert::Infallible};

pub use node_id::{NodeId, SessionToken};

pub mod node_id;

/// The kind of container a [`NodeValue::Reference`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Deserialize, ::serde::Serialize),
    serde(rename_all = "lowercase")
)]
pub enum ContainerKind {
    Map,
    List,
}

/// The payload of a list element.
///
/// Strings hold values as escaped by a [`ValueCodec`](crate::codec::ValueCodec). References to
/// nested containers can be loaded from checkpoints but are not supported by this crate beyond
/// that; reading one fails with [`TreeError::UnsupportedValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Deserialize, ::serde::Serialize),
    serde(
        try_from = "crate::checkpoint::wire::RawNodeValue",
        into = "crate::checkpoint::wire::RawNodeValue"
    )
)]
pub enum NodeValue {
    Str(String),
    /// Marks a deleted element. The element stays in the tree so its descendants keep a parent.
    Tombstone,
    Reference { kind: ContainerKind, id: String },
}

impl NodeValue {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, NodeValue::Tombstone)
    }

    /// Returns the string payload, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for NodeValue {
    fn from(value: String) -> Self {
        NodeValue::Str(value)
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        NodeValue::Str(value.to_string())
    }
}

/// Error returned by [`ReverseTree`] reads and local inserts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TreeError {
    /// The element holds a reference to another container.
    #[error("element {id} holds a container reference, which is not supported")]
    UnsupportedValue { id: NodeId },
    /// No counter is left for a new local element.
    #[error("element counters are exhausted")]
    CounterExhausted,
}

/// An element of a [`ReverseTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    after: Option<NodeId>,
    cell: LwwCell<NodeValue>,
}

impl Node {
    /// The element this one was inserted after.
    ///
    /// `None` while the element is positionless: an update for it arrived before its insert.
    pub fn after(&self) -> Option<&NodeId> {
        self.after.as_ref()
    }

    pub fn value(&self) -> &NodeValue {
        self.cell.value()
    }

    pub fn versionstamp(&self) -> Option<&Versionstamp> {
        self.cell.versionstamp()
    }

    pub fn is_local(&self) -> bool {
        self.cell.is_local()
    }
}

/// Arguments to [`ReverseTree::insert`].
#[derive(Debug, Clone)]
pub struct InsertParams {
    /// The element to insert after, or [`NodeId::Root`] for the front of the list.
    pub after: NodeId,
    pub value: NodeValue,
    /// The id the issuing session minted. Leave empty to mint a new local id.
    pub external_id: Option<NodeId>,
    pub origin: Origin,
}

/// A list CRDT in which every element points at its predecessor.
///
/// ## Why "reverse"
///
/// A regular tree has each parent own an ordered list of children. Two sessions that insert after
/// the same element at the same time would then race on that child list. Here the pointers go
/// the other way: each element records the element it was inserted after (its `after`), and an
/// insert is nothing more than adding an entry to an id → element table. Inserts from different
/// sessions commute.
///
/// The order of the list is recovered when reading. The child lists are rebuilt from the `after`
/// pointers, siblings are sorted with [`NodeId::sibling_cmp`], and a depth-first pre-order walk
/// from the root yields the list. Deleted elements stay in the table as tombstones; the walk skips
/// them but still descends into their children.
///
/// ```rust
/// # use cowrite::crdts::{Origin, ReverseTree, reverse_tree::{InsertParams, NodeId, SessionToken}};
/// let mut tree = ReverseTree::new(SessionToken::new("me").unwrap());
/// let dog = tree.insert(InsertParams {
///     after: NodeId::Root,
///     value: "dog".into(),
///     external_id: None,
///     origin: Origin::Local,
/// }).unwrap();
/// tree.insert(InsertParams {
///     after: dog.clone(),
///     value: "cat".into(),
///     external_id: None,
///     origin: Origin::Local,
/// }).unwrap();
/// assert_eq!(tree.to_vec().unwrap(), ["dog", "cat"]);
///
/// tree.delete(dog, Origin::Local);
/// assert_eq!(tree.to_vec().unwrap(), ["cat"]);
/// ```
#[derive(Debug, Clone)]
pub struct ReverseTree {
    session: SessionToken,
    nodes: HashMap<NodeId, Node>,
    // highest counter seen in any id, local or remote
    highest_counter: Option<u64>,
}

type Children<'t> = HashMap<&'t NodeId, SmallVec<[&'t NodeId; 2]>>;

impl ReverseTree {
    pub fn new(session: SessionToken) -> Self {
        Self {
            session,
            nodes: HashMap::default(),
            highest_counter: None,
        }
    }

    /// The session token used for ids minted by this tree.
    pub fn session(&self) -> &SessionToken {
        &self.session
    }

    /// Number of elements, including tombstones and positionless elements.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeValue> {
        self.nodes.get(id).map(Node::value)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn observe(&mut self, id: &NodeId) {
        if let Some(counter) = id.counter() {
            self.highest_counter = self.highest_counter.max(Some(counter));
        }
    }

    // NOTE: for a single writer this is just the element count. Taking the highest counter seen
    // into account keeps ids unique should elements ever be compacted, and makes a fresh local
    // element sort before every existing sibling.
    fn mint_id(&self) -> Result<NodeId, TreeError> {
        let next = match self.highest_counter {
            None => 0,
            Some(highest) => highest
                .checked_add(1)
                .ok_or(TreeError::CounterExhausted)?,
        };
        let counter = (self.nodes.len() as u64).max(next);
        Ok(NodeId::item(counter, self.session.clone()))
    }

    /// Inserts an element and returns its id.
    ///
    /// If the element already exists, it was created positionless by an update that overtook
    /// this insert. It then gets its position (unless it already has one) and the value goes
    /// through [`ReverseTree::put`] like any other update.
    ///
    /// # Errors
    ///
    /// Minting a local id fails once some element carries the largest possible counter, as no
    /// larger one is left to sort the new element first among its siblings.
    pub fn insert(&mut self, params: InsertParams) -> Result<NodeId, TreeError> {
        let InsertParams {
            after,
            value,
            external_id,
            origin,
        } = params;
        let id = match external_id {
            Some(id) => id,
            None => self.mint_id()?,
        };

        if let Some(node) = self.nodes.get_mut(&id) {
            if node.after.is_none() {
                node.after = Some(after);
            }
            self.put(id.clone(), value, origin);
            return Ok(id);
        }

        self.observe(&id);
        self.nodes.insert(
            id.clone(),
            Node {
                after: Some(after),
                cell: LwwCell::new(value, &origin),
            },
        );
        Ok(id)
    }

    /// Writes the value of an element.
    ///
    /// See the [module docs](super) for how the write is reconciled with the current value. An
    /// element that doesn't exist yet is created positionless.
    pub fn put(&mut self, id: NodeId, value: NodeValue, origin: Origin) -> WriteOutcome {
        self.observe(&id);
        match self.nodes.entry(id) {
            Entry::Vacant(entry) => {
                tracing::trace!(id = %entry.key(), "update arrived before insert");
                entry.insert(Node {
                    after: None,
                    cell: LwwCell::new(value, &origin),
                });
                WriteOutcome::Created
            }
            Entry::Occupied(mut entry) => {
                let outcome = entry.get_mut().cell.write(value, origin);
                if outcome == WriteOutcome::Stale {
                    tracing::debug!(id = %entry.key(), "ignoring stale list write");
                }
                outcome
            }
        }
    }

    /// Deletes an element by writing a tombstone over its value.
    pub fn delete(&mut self, id: NodeId, origin: Origin) -> WriteOutcome {
        self.put(id, NodeValue::Tombstone, origin)
    }

    /// Rebuilds the parent → children adjacency, children in document order.
    fn children(&self) -> Children<'_> {
        let mut children = Children::default();
        for (id, node) in &self.nodes {
            if let Some(after) = &node.after {
                children.entry(after).or_default().push(id);
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| a.sibling_cmp(b));
        }
        children
    }

    /// Returns the id of the last element in document order, or [`NodeId::Root`] if there is
    /// none. Inserting after it appends to the list.
    ///
    /// Tombstones count: appending after a deleted last element still appends.
    pub fn last_id(&self) -> NodeId {
        let children = self.children();
        let root = NodeId::Root;
        let mut seen = HashSet::default();
        seen.insert(&root);

        let mut current = &root;
        while let Some(&last) = children.get(current).and_then(|c| c.last()) {
            if !seen.insert(last) {
                tracing::warn!(id = %last, "cycle detected in list");
                break;
            }
            current = last;
        }
        current.clone()
    }

    /// Visits every element reachable from the root in document order, tombstones included.
    ///
    /// Elements whose ancestors haven't arrived yet are not reachable and are left out until they
    /// are. If the `after` pointers loop back on themselves (which only malformed checkpoints can
    /// produce) the looping subtree is skipped with a warning.
    fn walk<'t, E>(
        &'t self,
        mut visit: impl FnMut(&'t NodeId, &'t NodeValue) -> Result<(), E>,
    ) -> Result<(), E> {
        let children = self.children();
        let root = NodeId::Root;
        let mut seen = HashSet::default();

        let mut stack = vec![&root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                tracing::warn!(%id, "cycle detected in list, skipping subtree");
                continue;
            }

            // the root is virtual, even if a malformed checkpoint stored something under its id
            let node = self.nodes.get_key_value(id).filter(|(id, _)| !id.is_root());
            if let Some((id, node)) = node {
                visit(id, node.value())?;
            }

            if let Some(siblings) = children.get(id) {
                stack.extend(siblings.iter().rev().copied());
            }
        }
        Ok(())
    }

    /// Returns the live elements in document order.
    ///
    /// # Errors
    ///
    /// Fails if a live element holds a [`NodeValue::Reference`].
    pub fn to_ordered_sequence(&self) -> Result<Vec<(NodeId, &str)>, TreeError> {
        let mut sequence = Vec::new();
        self.walk(|id, value| {
            match value {
                NodeValue::Str(value) => sequence.push((id.clone(), value.as_str())),
                NodeValue::Tombstone => {}
                NodeValue::Reference { .. } => {
                    return Err(TreeError::UnsupportedValue { id: id.clone() });
                }
            }
            Ok(())
        })?;
        Ok(sequence)
    }

    /// Returns the ids of the live elements in document order.
    ///
    /// Unlike [`ReverseTree::to_ordered_sequence`] this never fails, references are live
    /// elements too.
    pub fn live_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let Ok(()) = self.walk(|id, value| {
            if !value.is_tombstone() {
                ids.push(id.clone());
            }
            Ok::<_, Infallible>(())
        });
        ids
    }

    /// Returns the live values in document order.
    pub fn to_vec(&self) -> Result<Vec<&str>, TreeError> {
        Ok(self
            .to_ordered_sequence()?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    /// Replaces the whole tree with the list `list_id` from a checkpoint.
    ///
    /// Loaded elements are confirmed (not local) and carry the checkpoint's stamp. From now on
    /// new ids are minted for `session`. On error the tree is left untouched.
    pub fn import(
        &mut self,
        session: SessionToken,
        checkpoint: &Checkpoint,
        list_id: &str,
    ) -> Result<(), CheckpointError> {
        let versionstamp = checkpoint.versionstamp()?;
        let entries = checkpoint.list_entries(list_id)?;

        self.session = session;
        self.nodes.clear();
        self.highest_counter = None;
        for (after, id, value) in entries {
            self.observe(&id);
            self.nodes.insert(
                id,
                Node {
                    after: Some(after),
                    cell: LwwCell::confirmed(value, versionstamp.clone()),
                },
            );
        }
        Ok(())
    }
}
