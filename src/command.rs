// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The wire commands exchanged with the sequencer.
//!
//! On the wire a command is a flat array of strings whose first three entries are always the
//! keyword, the document id and the id of the container (map or list) the command targets:
//!
//! | tuple                                                   | meaning             |
//! |---------------------------------------------------------|---------------------|
//! | `["mcreate", doc, map]`                                 | declare a map       |
//! | `["lcreate", doc, list]`                                | declare a list      |
//! | `["mput", doc, map, key, escaped value]`                | map upsert          |
//! | `["mdel", doc, map, key]`                               | map delete          |
//! | `["lins", doc, list, after id, new id, escaped value]`  | list insert         |
//! | `["lput", doc, list, id, escaped value]`                | list value update   |
//! | `["ldel", doc, list, id]`                               | list delete         |
//!
//! [`Command`] is the typed form of those tuples. Element ids are parsed into [`NodeId`]s here, at
//! the boundary, and formatted back when a command is turned into a tuple.
use crate::crdts::reverse_tree::{ContainerKind, NodeId, node_id::NodeIdError};
use std::{fmt, str::FromStr};

/// Error returned for a command tuple that can't be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CommandError {
    /// Fewer than the three addressing entries every command starts with.
    #[error("command has {found} entries, expected at least 3")]
    TooShort { found: usize },
    #[error("unknown command keyword {0:?}")]
    UnknownKeyword(String),
    #[error("`{keyword}` command has {found} entries, expected {expected}")]
    Arity {
        keyword: Keyword,
        expected: usize,
        found: usize,
    },
    /// The command addresses another document or container.
    #[error("command for {doc_id}/{container_id} delivered to {expected_doc_id}/{expected_container_id}")]
    Misrouted {
        doc_id: String,
        container_id: String,
        expected_doc_id: String,
        expected_container_id: String,
    },
    /// A list command was delivered to a map, or the other way around.
    #[error("`{keyword}` command delivered to a {target:?} container")]
    WrongContainer {
        keyword: Keyword,
        target: ContainerKind,
    },
    /// Elements can be inserted after the root, but the root itself can't be written.
    #[error("`{keyword}` command targets the root element")]
    RootTarget { keyword: Keyword },
    #[error(transparent)]
    InvalidNodeId(#[from] NodeIdError),
}

/// The first entry of a command tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    MapCreate,
    ListCreate,
    MapPut,
    MapDelete,
    ListInsert,
    ListPut,
    ListDelete,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::MapCreate => "mcreate",
            Keyword::ListCreate => "lcreate",
            Keyword::MapPut => "mput",
            Keyword::MapDelete => "mdel",
            Keyword::ListInsert => "lins",
            Keyword::ListPut => "lput",
            Keyword::ListDelete => "ldel",
        }
    }

    /// Number of entries in a well-formed tuple, keyword included.
    pub fn arity(self) -> usize {
        match self {
            Keyword::MapCreate | Keyword::ListCreate => 3,
            Keyword::MapDelete | Keyword::ListDelete => 4,
            Keyword::MapPut | Keyword::ListPut => 5,
            Keyword::ListInsert => 6,
        }
    }

    /// The kind of container commands with this keyword target.
    pub fn container_kind(self) -> ContainerKind {
        match self {
            Keyword::MapCreate | Keyword::MapPut | Keyword::MapDelete => ContainerKind::Map,
            Keyword::ListCreate
            | Keyword::ListInsert
            | Keyword::ListPut
            | Keyword::ListDelete => ContainerKind::List,
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Keyword {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "mcreate" => Keyword::MapCreate,
            "lcreate" => Keyword::ListCreate,
            "mput" => Keyword::MapPut,
            "mdel" => Keyword::MapDelete,
            "lins" => Keyword::ListInsert,
            "lput" => Keyword::ListPut,
            "ldel" => Keyword::ListDelete,
            _ => return Err(CommandError::UnknownKeyword(s.to_string())),
        })
    }
}

/// A parsed command tuple.
///
/// Values are carried in their escaped form, see [`ValueCodec`](crate::codec::ValueCodec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    MapCreate {
        doc_id: String,
        map_id: String,
    },
    ListCreate {
        doc_id: String,
        list_id: String,
    },
    MapPut {
        doc_id: String,
        map_id: String,
        key: String,
        value: String,
    },
    MapDelete {
        doc_id: String,
        map_id: String,
        key: String,
    },
    ListInsert {
        doc_id: String,
        list_id: String,
        after: NodeId,
        id: NodeId,
        value: String,
    },
    ListPut {
        doc_id: String,
        list_id: String,
        id: NodeId,
        value: String,
    },
    ListDelete {
        doc_id: String,
        list_id: String,
        id: NodeId,
    },
}

impl Command {
    /// Parses a command tuple.
    ///
    /// ```rust
    /// # use cowrite::command::Command;
    /// let command = Command::parse(&["ldel", "doc", "todo", "3:alice"]).unwrap();
    /// assert_eq!(command.container_id(), "todo");
    /// assert_eq!(command.to_tuple(), ["ldel", "doc", "todo", "3:alice"]);
    /// ```
    ///
    /// # Errors
    ///
    /// Fails on an unknown keyword, on the wrong number of entries for the keyword, and on element
    /// ids that don't parse or that address the root.
    pub fn parse<S: AsRef<str>>(tuple: &[S]) -> Result<Self, CommandError> {
        let [keyword, doc_id, container_id, rest @ ..] = tuple else {
            return Err(CommandError::TooShort { found: tuple.len() });
        };
        let keyword: Keyword = keyword.as_ref().parse()?;
        let doc_id = doc_id.as_ref().to_string();
        let container_id = container_id.as_ref().to_string();
        let element = |id: &S| -> Result<NodeId, CommandError> {
            let id: NodeId = id.as_ref().parse()?;
            if id.is_root() {
                return Err(CommandError::RootTarget { keyword });
            }
            Ok(id)
        };

        Ok(match (keyword, rest) {
            (Keyword::MapCreate, []) => Command::MapCreate {
                doc_id,
                map_id: container_id,
            },
            (Keyword::ListCreate, []) => Command::ListCreate {
                doc_id,
                list_id: container_id,
            },
            (Keyword::MapPut, [key, value]) => Command::MapPut {
                doc_id,
                map_id: container_id,
                key: key.as_ref().to_string(),
                value: value.as_ref().to_string(),
            },
            (Keyword::MapDelete, [key]) => Command::MapDelete {
                doc_id,
                map_id: container_id,
                key: key.as_ref().to_string(),
            },
            (Keyword::ListInsert, [after, id, value]) => Command::ListInsert {
                doc_id,
                list_id: container_id,
                after: after.as_ref().parse()?,
                id: element(id)?,
                value: value.as_ref().to_string(),
            },
            (Keyword::ListPut, [id, value]) => Command::ListPut {
                doc_id,
                list_id: container_id,
                id: element(id)?,
                value: value.as_ref().to_string(),
            },
            (Keyword::ListDelete, [id]) => Command::ListDelete {
                doc_id,
                list_id: container_id,
                id: element(id)?,
            },
            (keyword, _) => {
                return Err(CommandError::Arity {
                    keyword,
                    expected: keyword.arity(),
                    found: tuple.len(),
                });
            }
        })
    }

    pub fn keyword(&self) -> Keyword {
        match self {
            Command::MapCreate { .. } => Keyword::MapCreate,
            Command::ListCreate { .. } => Keyword::ListCreate,
            Command::MapPut { .. } => Keyword::MapPut,
            Command::MapDelete { .. } => Keyword::MapDelete,
            Command::ListInsert { .. } => Keyword::ListInsert,
            Command::ListPut { .. } => Keyword::ListPut,
            Command::ListDelete { .. } => Keyword::ListDelete,
        }
    }

    pub fn doc_id(&self) -> &str {
        match self {
            Command::MapCreate { doc_id, .. }
            | Command::ListCreate { doc_id, .. }
            | Command::MapPut { doc_id, .. }
            | Command::MapDelete { doc_id, .. }
            | Command::ListInsert { doc_id, .. }
            | Command::ListPut { doc_id, .. }
            | Command::ListDelete { doc_id, .. } => doc_id,
        }
    }

    /// The id of the map or list the command targets.
    pub fn container_id(&self) -> &str {
        match self {
            Command::MapCreate { map_id, .. }
            | Command::MapPut { map_id, .. }
            | Command::MapDelete { map_id, .. } => map_id,
            Command::ListCreate { list_id, .. }
            | Command::ListInsert { list_id, .. }
            | Command::ListPut { list_id, .. }
            | Command::ListDelete { list_id, .. } => list_id,
        }
    }

    /// Formats the command as a wire tuple.
    pub fn to_tuple(&self) -> Vec<String> {
        let mut tuple = vec![
            self.keyword().as_str().to_string(),
            self.doc_id().to_string(),
            self.container_id().to_string(),
        ];
        match self {
            Command::MapCreate { .. } | Command::ListCreate { .. } => {}
            Command::MapPut { key, value, .. } => tuple.extend([key.clone(), value.clone()]),
            Command::MapDelete { key, .. } => tuple.push(key.clone()),
            Command::ListInsert {
                after, id, value, ..
            } => tuple.extend([after.to_string(), id.to_string(), value.clone()]),
            Command::ListPut { id, value, .. } => tuple.extend([id.to_string(), value.clone()]),
            Command::ListDelete { id, .. } => tuple.push(id.to_string()),
        }
        tuple
    }
}

/// Checks that `tuple` addresses the container `container_id` of document `doc_id`.
///
/// Only the addressing entries are looked at; the rest of the tuple may still be malformed.
pub fn validate_route<S: AsRef<str>>(
    tuple: &[S],
    doc_id: &str,
    container_id: &str,
) -> Result<(), CommandError> {
    let [_, doc, container, ..] = tuple else {
        return Err(CommandError::TooShort { found: tuple.len() });
    };
    let (doc, container) = (doc.as_ref(), container.as_ref());
    if doc != doc_id || container != container_id {
        return Err(CommandError::Misrouted {
            doc_id: doc.to_string(),
            container_id: container.to_string(),
            expected_doc_id: doc_id.to_string(),
            expected_container_id: container_id.to_string(),
        });
    }
    Ok(())
}

/// Checks that the keyword of `tuple` belongs to a command for a `target` container.
///
/// Runs before the arity check, so a list command sent to a map is reported as such even if it
/// is also malformed.
pub fn validate_container<S: AsRef<str>>(
    tuple: &[S],
    target: ContainerKind,
) -> Result<Keyword, CommandError> {
    let Some(keyword) = tuple.first() else {
        return Err(CommandError::TooShort { found: 0 });
    };
    let keyword: Keyword = keyword.as_ref().parse()?;
    if keyword.container_kind() != target {
        return Err(CommandError::WrongContainer { keyword, target });
    }
    Ok(keyword)
}

#[cfg(feature = "serde")]
impl ::serde::Serialize for Command {
    fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_tuple())
    }
}

#[cfg(feature = "serde")]
impl<'de> ::serde::Deserialize<'de> for Command {
    fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tuple = Vec::<String>::deserialize(deserializer)?;
        Self::parse(&tuple).map_err(::serde::de::Error::custom)
    }
}
