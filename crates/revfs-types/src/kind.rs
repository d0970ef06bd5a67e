use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeRevisionId;

/// What lives at a path. Missing paths are [`NodeKind::None`], not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    None,
    File,
    Dir,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::File => write!(f, "file"),
            Self::Dir => write!(f, "dir"),
        }
    }
}

/// Net effect of a change on one path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Add,
    Delete,
    Modify,
    /// Deleted and re-added (or copied over) in the same change set.
    Replace,
}

impl ChangeKind {
    /// Single-letter code used in listings.
    pub fn code(&self) -> char {
        match self {
            Self::Add => 'A',
            Self::Delete => 'D',
            Self::Modify => 'M',
            Self::Replace => 'R',
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Delete => write!(f, "delete"),
            Self::Modify => write!(f, "modify"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// One entry of a changed-paths listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathChange {
    pub kind: ChangeKind,
    /// The node revision now at the path; `None` for deletions.
    pub node_rev_id: Option<NodeRevisionId>,
    /// Whether file contents changed.
    pub text_mod: bool,
    /// Whether properties changed.
    pub prop_mod: bool,
}

impl PathChange {
    pub fn new(kind: ChangeKind, node_rev_id: Option<NodeRevisionId>) -> Self {
        Self {
            kind,
            node_rev_id,
            text_mod: false,
            prop_mod: false,
        }
    }

    pub fn with_text_mod(mut self) -> Self {
        self.text_mod = true;
        self
    }

    pub fn with_prop_mod(mut self) -> Self {
        self.prop_mod = true;
        self
    }
}

/// A directory entry: the child's name and the node revision it points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub id: NodeRevisionId,
    pub kind: NodeKind,
}
