// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use std::{cmp::Ordering, fmt, str::FromStr};

/// Wire spelling of [`NodeId::Root`].
pub const ROOT: &str = "root";

/// Error returned when parsing a [`NodeId`] or [`SessionToken`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum NodeIdError {
    /// The id is neither `root` nor of the form `{counter}:{session}`.
    #[error("node id {0:?} is not of the form `counter:session`")]
    Malformed(String),
    /// The counter half of the id is not an unsigned integer.
    #[error("node id {0:?} has a non-numeric counter")]
    InvalidCounter(String),
    /// Session tokens must be non-empty and must not contain `:`.
    #[error("{0:?} is not a valid session token")]
    InvalidSession(String),
}

/// The per-instance token that makes locally minted node ids unique.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a token received from elsewhere (a peer, a checkpoint's actor table).
    ///
    /// # Errors
    ///
    /// Returns an error if `token` is empty or contains `:`.
    pub fn new(token: impl Into<String>) -> Result<Self, NodeIdError> {
        let token = token.into();
        if token.is_empty() || token.contains(':') {
            return Err(NodeIdError::InvalidSession(token));
        }
        Ok(Self(token))
    }

    /// Mints a fresh, random token.
    #[cfg(feature = "ulid")]
    pub fn random() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionToken {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifies an element of a [`ReverseTree`](super::ReverseTree).
///
/// Element ids double as a logical clock: `counter` grows with every element a session creates,
/// and `session` tells apart sessions that happen to reach the same counter. Together they decide
/// the order of siblings, see [`NodeId::sibling_cmp`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// The virtual element every list starts from.
    Root,
    /// A real element.
    Item {
        counter: u64,
        session: SessionToken,
    },
}

impl NodeId {
    pub fn item(counter: u64, session: SessionToken) -> Self {
        NodeId::Item { counter, session }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, NodeId::Root)
    }

    /// Returns the counter half of an item id.
    pub fn counter(&self) -> Option<u64> {
        match self {
            NodeId::Root => None,
            NodeId::Item { counter, .. } => Some(*counter),
        }
    }

    /// Returns the session half of an item id.
    pub fn session(&self) -> Option<&SessionToken> {
        match self {
            NodeId::Root => None,
            NodeId::Item { session, .. } => Some(session),
        }
    }

    /// Orders two children of the same parent in document order.
    ///
    /// Higher counters come first, so the latest insert after an element ends up right next to
    /// it. Equal counters fall back to the session token, ascending. Since one session's chain of
    /// inserts has strictly increasing counters, such a chain is never split up by a concurrent
    /// chain hanging off the same parent.
    pub fn sibling_cmp(&self, other: &NodeId) -> Ordering {
        match (self, other) {
            (NodeId::Root, NodeId::Root) => Ordering::Equal,
            // only reachable with malformed checkpoints
            (NodeId::Root, NodeId::Item { .. }) => Ordering::Less,
            (NodeId::Item { .. }, NodeId::Root) => Ordering::Greater,
            (
                NodeId::Item {
                    counter: lc,
                    session: ls,
                },
                NodeId::Item {
                    counter: rc,
                    session: rs,
                },
            ) => rc.cmp(lc).then_with(|| ls.cmp(rs)),
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Root => f.write_str(ROOT),
            NodeId::Item { counter, session } => write!(f, "{counter}:{session}"),
        }
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ROOT {
            return Ok(NodeId::Root);
        }
        let (counter, session) = s
            .split_once(':')
            .ok_or_else(|| NodeIdError::Malformed(s.to_string()))?;
        let counter = counter
            .parse()
            .map_err(|_| NodeIdError::InvalidCounter(s.to_string()))?;
        Ok(NodeId::item(counter, SessionToken::new(session)?))
    }
}
