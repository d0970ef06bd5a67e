use std::collections::BTreeMap;

use revfs_delta::DeltaWindow;
use revfs_fs::CopySource;
use revfs_types::{Checksum, NodeKind, NodeRevisionId, PropList, Revnum};
use serde::{Deserialize, Serialize};

/// Key of a stored representation. Keys are allocated in increasing order,
/// so a larger key always names newer content.
pub type RepKey = u64;

/// Payload of a node-revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeData {
    /// Entry name to the node-revision it refers to.
    Dir(BTreeMap<String, NodeRevisionId>),
    /// Contents; `None` for an empty file.
    File(Option<RepKey>),
}

/// One revision of one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRevision {
    pub id: NodeRevisionId,
    /// The node-revision this one was derived from.
    pub predecessor: Option<NodeRevisionId>,
    pub created_path: String,
    /// `None` until the owning transaction commits.
    pub created_rev: Option<Revnum>,
    /// Set only on the node-revision a copy created.
    pub copy_from: Option<CopySource>,
    pub props: PropList,
    pub data: NodeData,
}

impl NodeRevision {
    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Dir(_) => NodeKind::Dir,
            NodeData::File(_) => NodeKind::File,
        }
    }

    pub fn entries(&self) -> Option<&BTreeMap<String, NodeRevisionId>> {
        match &self.data {
            NodeData::Dir(entries) => Some(entries),
            NodeData::File(_) => None,
        }
    }

    pub fn rep(&self) -> Option<RepKey> {
        match self.data {
            NodeData::File(rep) => rep,
            NodeData::Dir(_) => None,
        }
    }
}

/// How a representation's bytes are stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepBody {
    Fulltext(Vec<u8>),
    /// Windows that rebuild this text from the (newer) text of `base`.
    Delta {
        base: RepKey,
        windows: Vec<DeltaWindow>,
    },
}

/// Stored file contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    pub checksum: Checksum,
    pub len: u64,
    pub body: RepBody,
}

impl Representation {
    pub fn fulltext(data: Vec<u8>) -> Self {
        Self {
            checksum: Checksum::of(&data),
            len: data.len() as u64,
            body: RepBody::Fulltext(data),
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self.body, RepBody::Delta { .. })
    }
}

/// Lower-case base-36 rendering used for node and copy id tokens.
pub fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
