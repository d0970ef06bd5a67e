use std::collections::{BTreeMap, BTreeSet, HashMap};

use revfs_delta::apply_delta;
use revfs_fs::{FsError, FsResult};
use revfs_types::{components, NodeKind, NodeRevisionId, PathChange, PropList, Revnum};
use serde::{Deserialize, Serialize};

use crate::node::{NodeData, NodeRevision, RepBody, RepKey, Representation};

/// Revision property stamped at commit time.
pub const PROP_DATE: &str = revfs_types::PROP_REVISION_DATE;

/// Allocation counters. Persisted with every commit so a reopened engine
/// never reuses a committed key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub next_node: u64,
    pub next_copy: u64,
    pub next_rep: u64,
    pub next_txn: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            next_node: 1,
            next_copy: 1,
            next_rep: 1,
            next_txn: 1,
        }
    }
}

/// A committed revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub root: NodeRevisionId,
    /// Name of the transaction that became this revision.
    pub txn: String,
    pub props: PropList,
    pub changes: BTreeMap<String, PathChange>,
}

/// An uncommitted transaction and everything it has written.
#[derive(Clone, Debug)]
pub struct TxnRecord {
    pub name: String,
    pub base_rev: Revnum,
    pub root: NodeRevisionId,
    pub props: PropList,
    pub changes: BTreeMap<String, PathChange>,
    /// Node-revisions owned (and mutable) by this transaction.
    pub nodes: HashMap<NodeRevisionId, NodeRevision>,
    pub reps: HashMap<RepKey, Representation>,
}

impl TxnRecord {
    pub fn owns(&self, id: &NodeRevisionId) -> bool {
        id.txn_id() == self.name && self.nodes.contains_key(id)
    }
}

/// Everything a commit adds to the committed state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub rev: Revnum,
    pub root: NodeRevisionId,
    pub txn: String,
    pub props: PropList,
    pub changes: BTreeMap<String, PathChange>,
    pub nodes: Vec<NodeRevision>,
    pub reps: Vec<(RepKey, Representation)>,
    pub counters: Counters,
}

/// A durable change to committed state. Persistence layers record these
/// and replay them through [`DagState::apply`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DagChange {
    Commit(CommitRecord),
    RevProp {
        rev: Revnum,
        name: String,
        value: Option<Vec<u8>>,
    },
    Uuid(String),
    Deltify {
        rep: RepKey,
        body: RepBody,
    },
}

/// Complete engine state: committed revisions plus live transactions.
///
/// Only committed state is serialized; transactions live in memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DagState {
    pub uuid: String,
    pub counters: Counters,
    pub revisions: Vec<RevisionRecord>,
    pub nodes: HashMap<NodeRevisionId, NodeRevision>,
    pub reps: HashMap<RepKey, Representation>,
    #[serde(skip)]
    pub txns: BTreeMap<String, TxnRecord>,
    /// Transactions committed or aborted since this state was loaded.
    #[serde(skip)]
    pub finished: BTreeSet<String>,
}

impl DagState {
    /// A repository holding only revision 0, an empty root directory.
    pub fn new(uuid: impl Into<String>, date: impl Into<String>) -> Self {
        let root_id = NodeRevisionId::new("0", "0", "0");
        let root = NodeRevision {
            id: root_id.clone(),
            predecessor: None,
            created_path: "/".into(),
            created_rev: Some(Revnum::ZERO),
            copy_from: None,
            props: PropList::new(),
            data: NodeData::Dir(BTreeMap::new()),
        };
        let mut props = PropList::new();
        props.insert(PROP_DATE.into(), date.into().into_bytes());
        Self {
            uuid: uuid.into(),
            counters: Counters::default(),
            revisions: vec![RevisionRecord {
                root: root_id.clone(),
                txn: "0".into(),
                props,
                changes: BTreeMap::new(),
            }],
            nodes: HashMap::from([(root_id, root)]),
            reps: HashMap::new(),
            txns: BTreeMap::new(),
            finished: BTreeSet::new(),
        }
    }

    /// A copy of the committed state without live transactions.
    pub fn committed(&self) -> Self {
        Self {
            uuid: self.uuid.clone(),
            counters: self.counters,
            revisions: self.revisions.clone(),
            nodes: self.nodes.clone(),
            reps: self.reps.clone(),
            txns: BTreeMap::new(),
            finished: BTreeSet::new(),
        }
    }

    pub fn youngest(&self) -> Revnum {
        Revnum::new(self.revisions.len() as u64 - 1)
    }

    pub fn revision(&self, rev: Revnum) -> FsResult<&RevisionRecord> {
        self.revisions
            .get(rev.get() as usize)
            .ok_or_else(|| FsError::not_found(format!("revision {rev}")))
    }

    pub fn revision_mut(&mut self, rev: Revnum) -> FsResult<&mut RevisionRecord> {
        self.revisions
            .get_mut(rev.get() as usize)
            .ok_or_else(|| FsError::not_found(format!("revision {rev}")))
    }

    pub fn txn(&self, name: &str) -> FsResult<&TxnRecord> {
        match self.txns.get(name) {
            Some(txn) => Ok(txn),
            None => Err(self.missing_txn(name)),
        }
    }

    pub fn txn_mut(&mut self, name: &str) -> FsResult<&mut TxnRecord> {
        if !self.txns.contains_key(name) {
            return Err(self.missing_txn(name));
        }
        self.txns
            .get_mut(name)
            .ok_or_else(|| FsError::not_found(format!("transaction {name}")))
    }

    fn missing_txn(&self, name: &str) -> FsError {
        if self.finished.contains(name) {
            FsError::invalid_state(format!("transaction {name} is no longer open"))
        } else {
            FsError::not_found(format!("transaction {name}"))
        }
    }

    /// Drops a committed or aborted transaction, remembering its name so
    /// stale handles fail with `InvalidState`. Returns whether it was live.
    pub fn finish_txn(&mut self, name: &str) -> bool {
        let live = self.txns.remove(name).is_some();
        if live {
            self.finished.insert(name.to_string());
        }
        live
    }

    /// Forgets a transaction entirely. Returns whether it was live.
    pub fn purge_txn(&mut self, name: &str) -> bool {
        self.finished.remove(name);
        self.txns.remove(name).is_some()
    }

    /// Look up a node-revision, committed or owned by a live transaction.
    pub fn node(&self, id: &NodeRevisionId) -> FsResult<&NodeRevision> {
        self.nodes
            .get(id)
            .or_else(|| self.txns.get(id.txn_id()).and_then(|t| t.nodes.get(id)))
            .ok_or_else(|| FsError::Corrupt(format!("dangling node-revision {id}")))
    }

    pub fn rep(&self, key: RepKey) -> FsResult<&Representation> {
        self.reps
            .get(&key)
            .or_else(|| self.txns.values().find_map(|t| t.reps.get(&key)))
            .ok_or_else(|| FsError::Corrupt(format!("dangling representation {key}")))
    }

    /// Reconstruct the full text of a representation.
    pub fn read_rep(&self, key: RepKey) -> FsResult<Vec<u8>> {
        let rep = self.rep(key)?;
        let text = match &rep.body {
            RepBody::Fulltext(data) => data.clone(),
            RepBody::Delta { base, windows } => {
                let base_text = self.read_rep(*base)?;
                apply_delta(&base_text, windows)?
            }
        };
        if text.len() as u64 != rep.len {
            return Err(FsError::Corrupt(format!(
                "representation {key}: expected {} bytes, rebuilt {}",
                rep.len,
                text.len()
            )));
        }
        Ok(text)
    }

    /// Contents of a file node.
    pub fn file_text(&self, node: &NodeRevision, path: &str) -> FsResult<Vec<u8>> {
        match node.data {
            NodeData::File(Some(key)) => self.read_rep(key),
            NodeData::File(None) => Ok(Vec::new()),
            NodeData::Dir(_) => Err(FsError::NotFile { path: path.into() }),
        }
    }

    /// Walk `path` from the directory `root`.
    ///
    /// Returns `Ok(None)` when the final component is missing. A missing or
    /// non-directory intermediate component is an error.
    pub fn try_lookup(&self, root: &NodeRevisionId, path: &str) -> FsResult<Option<NodeRevisionId>> {
        let mut current = root.clone();
        let mut walked = String::new();
        let mut parts = components(path).peekable();
        while let Some(name) = parts.next() {
            let node = self.node(&current)?;
            let entries = node.entries().ok_or_else(|| FsError::NotDirectory {
                path: if walked.is_empty() { "/".into() } else { walked.clone() },
            })?;
            walked.push('/');
            walked.push_str(name);
            match entries.get(name) {
                Some(id) => current = id.clone(),
                None if parts.peek().is_none() => return Ok(None),
                None => return Err(FsError::not_found(format!("path {walked}"))),
            }
        }
        Ok(Some(current))
    }

    pub fn lookup(&self, root: &NodeRevisionId, path: &str) -> FsResult<NodeRevisionId> {
        self.try_lookup(root, path)?
            .ok_or_else(|| FsError::not_found(format!("path {path}")))
    }

    /// Kind at `path`; `NodeKind::None` for anything that cannot be reached.
    pub fn check_path(&self, root: &NodeRevisionId, path: &str) -> FsResult<NodeKind> {
        match self.try_lookup(root, path) {
            Ok(Some(id)) => Ok(self.node(&id)?.kind()),
            Ok(None) => Ok(NodeKind::None),
            Err(e) => match e {
                FsError::NotFound { .. } | FsError::NotDirectory { .. } => Ok(NodeKind::None),
                other => Err(other),
            },
        }
    }

    /// Root node-revision of `rev`.
    pub fn revision_root(&self, rev: Revnum) -> FsResult<NodeRevisionId> {
        Ok(self.revision(rev)?.root.clone())
    }

    /// Apply a durable change. Used for live updates and for replay.
    pub fn apply(&mut self, change: DagChange) -> FsResult<()> {
        match change {
            DagChange::Commit(record) => {
                let expected = self.youngest().next();
                if record.rev != expected {
                    return Err(FsError::Corrupt(format!(
                        "commit record for r{} does not follow r{}",
                        record.rev,
                        self.youngest()
                    )));
                }
                for node in record.nodes {
                    self.nodes.insert(node.id.clone(), node);
                }
                self.reps.extend(record.reps);
                self.counters = record.counters;
                self.revisions.push(RevisionRecord {
                    root: record.root,
                    txn: record.txn,
                    props: record.props,
                    changes: record.changes,
                });
            }
            DagChange::RevProp { rev, name, value } => {
                let props = &mut self.revision_mut(rev)?.props;
                match value {
                    Some(v) => {
                        props.insert(name, v);
                    }
                    None => {
                        props.remove(&name);
                    }
                }
            }
            DagChange::Uuid(uuid) => self.uuid = uuid,
            DagChange::Deltify { rep, body } => {
                let stored = self
                    .reps
                    .get_mut(&rep)
                    .ok_or_else(|| FsError::Corrupt(format!("deltify of unknown representation {rep}")))?;
                stored.body = body;
            }
        }
        Ok(())
    }
}
