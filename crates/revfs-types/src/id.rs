use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity of one specific revision of one specific node.
///
/// The three components are opaque tokens chosen by the storage provider.
/// A directory entry stores the node-revision id of its target, so a subtree
/// that did not change between two trees carries an identical id in both and
/// can be skipped during comparison. Equality is exact equality of all three
/// components.
///
/// The textual form is `node_id.copy_id.txn_id`. It is stable for display and
/// logging but is not an interchange format across providers.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRevisionId {
    node_id: String,
    copy_id: String,
    txn_id: String,
}

impl NodeRevisionId {
    /// Build an identifier from three provider-supplied tokens.
    pub fn new(
        node_id: impl Into<String>,
        copy_id: impl Into<String>,
        txn_id: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            copy_id: copy_id.into(),
            txn_id: txn_id.into(),
        }
    }

    /// The node component: shared by every revision of the same node.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The copy component: changes when a node is copied.
    pub fn copy_id(&self) -> &str {
        &self.copy_id
    }

    /// The transaction component: the transaction that created this revision.
    pub fn txn_id(&self) -> &str {
        &self.txn_id
    }

    /// Returns `true` if both ids name revisions of the same node.
    pub fn is_same_node(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }

    /// Parse the `node_id.copy_id.txn_id` rendering.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let mut parts = s.split('.');
        let (Some(node), Some(copy), Some(txn), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TypeError::MalformedId(s.to_string()));
        };
        if node.is_empty() || copy.is_empty() || txn.is_empty() {
            return Err(TypeError::MalformedId(s.to_string()));
        }
        Ok(Self::new(node, copy, txn))
    }
}

impl fmt::Debug for NodeRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRevisionId({self})")
    }
}

impl fmt::Display for NodeRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.node_id, self.copy_id, self.txn_id)
    }
}

impl FromStr for NodeRevisionId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
