//! Transaction tree mutation: clone-on-write, node creation, copies, and
//! change recording.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use revfs_delta::compute_delta;
use revfs_fs::{CopySource, FsError, FsResult};
use revfs_types::{
    basename, dirname, is_ancestor, ChangeKind, NodeRevisionId, PathChange, PropList, Revnum,
};

use crate::node::{base36, NodeData, NodeRevision, RepBody, RepKey, Representation};
use crate::state::{CommitRecord, DagChange, DagState, TxnRecord, PROP_DATE};

impl DagState {
    fn alloc_node_id(&mut self) -> String {
        let n = self.counters.next_node;
        self.counters.next_node += 1;
        base36(n)
    }

    fn alloc_copy_id(&mut self) -> String {
        let n = self.counters.next_copy;
        self.counters.next_copy += 1;
        base36(n)
    }

    fn alloc_rep_key(&mut self) -> RepKey {
        let key = self.counters.next_rep;
        self.counters.next_rep += 1;
        key
    }

    /// Start a transaction on `base`, returning its name.
    pub fn begin_txn(&mut self, base: Revnum) -> FsResult<String> {
        let root = self.revision_root(base)?;
        let seq = self.counters.next_txn;
        self.counters.next_txn += 1;
        let name = format!("{base}-{}", base36(seq));
        self.txns.insert(
            name.clone(),
            TxnRecord {
                name: name.clone(),
                base_rev: base,
                root,
                props: PropList::new(),
                changes: BTreeMap::new(),
                nodes: HashMap::new(),
                reps: HashMap::new(),
            },
        );
        Ok(name)
    }

    pub fn txn_root(&self, txn: &str) -> FsResult<NodeRevisionId> {
        Ok(self.txn(txn)?.root.clone())
    }

    fn mutable_node(&mut self, txn: &str, id: &NodeRevisionId) -> FsResult<&mut NodeRevision> {
        self.txn_mut(txn)?.nodes.get_mut(id).ok_or_else(|| {
            FsError::invalid_state(format!("node-revision {id} is not mutable in {txn}"))
        })
    }

    /// Copy `from` into the transaction as a new, mutable revision of the
    /// same node.
    fn clone_into_txn(
        &mut self,
        txn: &str,
        from: &NodeRevisionId,
        path: &str,
    ) -> FsResult<NodeRevisionId> {
        let source = self.node(from)?.clone();
        let mut id = NodeRevisionId::new(source.id.node_id(), source.id.copy_id(), txn);
        if self.txn(txn)?.nodes.contains_key(&id) {
            // Two paths sharing one committed node-revision, both made mutable.
            id = NodeRevisionId::new(source.id.node_id(), self.alloc_copy_id(), txn);
        }
        let node = NodeRevision {
            id: id.clone(),
            predecessor: Some(source.id),
            created_path: path.to_string(),
            created_rev: None,
            copy_from: None,
            props: source.props,
            data: source.data,
        };
        self.txn_mut(txn)?.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Id of a mutable node-revision at `path`, cloning every immutable
    /// node from the root down.
    pub fn make_mutable(&mut self, txn: &str, path: &str) -> FsResult<NodeRevisionId> {
        if path == "/" {
            let record = self.txn(txn)?;
            let root = record.root.clone();
            if record.owns(&root) {
                return Ok(root);
            }
            let id = self.clone_into_txn(txn, &root, "/")?;
            self.txn_mut(txn)?.root = id.clone();
            return Ok(id);
        }

        let parent_path = dirname(path);
        let parent = self.make_mutable(txn, parent_path)?;
        let name = basename(path);
        let child = self
            .node(&parent)?
            .entries()
            .ok_or_else(|| FsError::NotDirectory {
                path: parent_path.to_string(),
            })?
            .get(name)
            .cloned()
            .ok_or_else(|| FsError::not_found(format!("path {path}")))?;
        if self.txn(txn)?.owns(&child) {
            return Ok(child);
        }
        let id = self.clone_into_txn(txn, &child, path)?;
        self.set_entry(txn, &parent, name, Some(id.clone()))?;
        Ok(id)
    }

    fn set_entry(
        &mut self,
        txn: &str,
        dir: &NodeRevisionId,
        name: &str,
        target: Option<NodeRevisionId>,
    ) -> FsResult<()> {
        let node = self.mutable_node(txn, dir)?;
        let NodeData::Dir(entries) = &mut node.data else {
            return Err(FsError::NotDirectory {
                path: node.created_path.clone(),
            });
        };
        match target {
            Some(id) => {
                entries.insert(name.to_string(), id);
            }
            None => {
                entries.remove(name);
            }
        }
        Ok(())
    }

    /// Check that `path` can be created: its parent is a directory and
    /// nothing is there yet.
    fn ensure_creatable(&self, txn: &str, path: &str) -> FsResult<()> {
        if path == "/" {
            return Err(FsError::already_exists("path /"));
        }
        let root = self.txn_root(txn)?;
        match self.try_lookup(&root, path)? {
            Some(_) => Err(FsError::already_exists(format!("path {path}"))),
            None => Ok(()),
        }
    }

    /// Create an empty directory or file.
    pub fn make_node(&mut self, txn: &str, path: &str, data: NodeData) -> FsResult<NodeRevisionId> {
        self.ensure_creatable(txn, path)?;
        let parent = self.make_mutable(txn, dirname(path))?;
        let copy_id = parent.copy_id().to_string();
        let id = NodeRevisionId::new(self.alloc_node_id(), copy_id, txn);
        let node = NodeRevision {
            id: id.clone(),
            predecessor: None,
            created_path: path.to_string(),
            created_rev: None,
            copy_from: None,
            props: PropList::new(),
            data,
        };
        self.txn_mut(txn)?.nodes.insert(id.clone(), node);
        self.set_entry(txn, &parent, basename(path), Some(id.clone()))?;
        self.record_change(txn, path, PathChange::new(ChangeKind::Add, Some(id.clone())))?;
        Ok(id)
    }

    pub fn delete_node(&mut self, txn: &str, path: &str) -> FsResult<()> {
        if path == "/" {
            return Err(FsError::invalid_state("cannot delete the root directory"));
        }
        let root = self.txn_root(txn)?;
        let removed = self.lookup(&root, path)?;
        let parent = self.make_mutable(txn, dirname(path))?;
        self.set_entry(txn, &parent, basename(path), None)?;
        self.discard_subtree(txn, &removed)?;
        self.record_change(txn, path, PathChange::new(ChangeKind::Delete, Some(removed)))
    }

    /// Drop transaction-owned node-revisions under `id`. Committed ones are
    /// left alone.
    fn discard_subtree(&mut self, txn: &str, id: &NodeRevisionId) -> FsResult<()> {
        let record = self.txn_mut(txn)?;
        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            if next.txn_id() != txn {
                continue;
            }
            if let Some(node) = record.nodes.remove(&next) {
                if let NodeData::Dir(entries) = node.data {
                    pending.extend(entries.into_values());
                }
            }
        }
        Ok(())
    }

    pub fn change_node_prop(
        &mut self,
        txn: &str,
        path: &str,
        name: &str,
        value: Option<&[u8]>,
    ) -> FsResult<()> {
        let root = self.txn_root(txn)?;
        self.lookup(&root, path)?;
        let id = self.make_mutable(txn, path)?;
        let node = self.mutable_node(txn, &id)?;
        match value {
            Some(v) => {
                node.props.insert(name.to_string(), v.to_vec());
            }
            None => {
                node.props.remove(name);
            }
        }
        self.record_change(
            txn,
            path,
            PathChange::new(ChangeKind::Modify, Some(id)).with_prop_mod(),
        )
    }

    /// Replace the contents of the file at `path`.
    pub fn set_contents(&mut self, txn: &str, path: &str, data: Vec<u8>) -> FsResult<()> {
        let root = self.txn_root(txn)?;
        let current = self.lookup(&root, path)?;
        if !matches!(self.node(&current)?.data, NodeData::File(_)) {
            return Err(FsError::NotFile { path: path.into() });
        }
        let id = self.make_mutable(txn, path)?;
        let rep = if data.is_empty() {
            None
        } else {
            let key = self.alloc_rep_key();
            self.txn_mut(txn)?
                .reps
                .insert(key, Representation::fulltext(data));
            Some(key)
        };
        self.mutable_node(txn, &id)?.data = NodeData::File(rep);
        self.record_change(
            txn,
            path,
            PathChange::new(ChangeKind::Modify, Some(id)).with_text_mod(),
        )
    }

    /// Put the node at `from_path` in revision `from_rev` at `to_path`.
    ///
    /// With `history`, the result is a new node-revision (new copy id)
    /// recording its copy source. Without, the source node-revision itself
    /// is linked in.
    pub fn copy_node(
        &mut self,
        txn: &str,
        from_rev: Revnum,
        from_path: &str,
        to_path: &str,
        history: bool,
    ) -> FsResult<NodeRevisionId> {
        if to_path == "/" {
            return Err(FsError::invalid_state("cannot replace the root directory"));
        }
        let src_root = self.revision_root(from_rev)?;
        let src_id = self.lookup(&src_root, from_path)?;
        let txn_root = self.txn_root(txn)?;
        if self.try_lookup(&txn_root, to_path)?.is_some() {
            self.delete_node(txn, to_path)?;
        }
        let parent = self.make_mutable(txn, dirname(to_path))?;
        let new_id = if history {
            let source = self.node(&src_id)?.clone();
            let id = NodeRevisionId::new(source.id.node_id(), self.alloc_copy_id(), txn);
            let node = NodeRevision {
                id: id.clone(),
                predecessor: Some(src_id),
                created_path: to_path.to_string(),
                created_rev: None,
                copy_from: Some(CopySource::new(from_rev, from_path)),
                props: source.props,
                data: source.data,
            };
            self.txn_mut(txn)?.nodes.insert(id.clone(), node);
            id
        } else {
            src_id
        };
        self.set_entry(txn, &parent, basename(to_path), Some(new_id.clone()))?;
        self.record_change(
            txn,
            to_path,
            PathChange::new(ChangeKind::Add, Some(new_id.clone())),
        )?;
        Ok(new_id)
    }

    fn record_change(&mut self, txn: &str, path: &str, change: PathChange) -> FsResult<()> {
        fold_change(&mut self.txn_mut(txn)?.changes, path, change);
        Ok(())
    }

    /// Build the commit record for `txn` as revision `youngest + 1`.
    ///
    /// The transaction must already be based on the youngest revision. Only
    /// node-revisions and representations reachable from the new root are
    /// included.
    pub fn prepare_commit(&mut self, txn: &str, date: &str) -> FsResult<CommitRecord> {
        let youngest = self.youngest();
        if self.txn(txn)?.base_rev != youngest {
            return Err(FsError::invalid_state(format!(
                "transaction {txn} is not based on r{youngest}"
            )));
        }
        let root = self.make_mutable(txn, "/")?;
        let rev = youngest.next();
        let record = self.txn(txn)?;

        let mut nodes = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(id) = pending.pop() {
            let Some(node) = record.nodes.get(&id).filter(|_| id.txn_id() == txn) else {
                continue;
            };
            let mut node = node.clone();
            node.created_rev = Some(rev);
            if let NodeData::Dir(entries) = &node.data {
                pending.extend(entries.values().cloned());
            }
            nodes.push(node);
        }

        let keys: BTreeSet<RepKey> = nodes.iter().filter_map(NodeRevision::rep).collect();
        let reps = keys
            .into_iter()
            .filter_map(|k| record.reps.get(&k).map(|r| (k, r.clone())))
            .collect();

        let mut props = record.props.clone();
        props.insert(PROP_DATE.to_string(), date.as_bytes().to_vec());

        Ok(CommitRecord {
            rev,
            root,
            txn: txn.to_string(),
            props,
            changes: record.changes.clone(),
            nodes,
            reps,
            counters: self.counters,
        })
    }

    /// Changes that store each predecessor text touched by `rev` as a delta
    /// against the newer text. Already-deltified texts are skipped.
    pub fn plan_deltify(&self, rev: Revnum) -> FsResult<Vec<DagChange>> {
        let record = self.revision(rev)?;
        let mut planned = BTreeMap::new();
        for (path, change) in &record.changes {
            if change.kind == ChangeKind::Delete {
                continue;
            }
            let Some(id) = self.try_lookup(&record.root, path).ok().flatten() else {
                continue;
            };
            let node = self.node(&id)?;
            let (Some(new_key), Some(pred)) = (node.rep(), node.predecessor.as_ref()) else {
                continue;
            };
            let Some(old_key) = self.node(pred)?.rep() else {
                continue;
            };
            if old_key >= new_key || self.rep(old_key)?.is_delta() {
                continue;
            }
            let windows = compute_delta(&self.read_rep(new_key)?, &self.read_rep(old_key)?);
            planned.insert(
                old_key,
                DagChange::Deltify {
                    rep: old_key,
                    body: RepBody::Delta {
                        base: new_key,
                        windows,
                    },
                },
            );
        }
        Ok(planned.into_values().collect())
    }
}

/// Fold `change` into the net changes recorded for a transaction.
pub(crate) fn fold_change(changes: &mut BTreeMap<String, PathChange>, path: &str, change: PathChange) {
    use ChangeKind::{Add, Delete, Modify, Replace};

    let is_delete = change.kind == Delete;
    let folded = match changes.remove(path) {
        None => Some(change),
        Some(old) => match (old.kind, change.kind) {
            (Add, Delete) => None,
            (Replace | Modify, Delete) => Some(change),
            (Delete, Add) => Some(PathChange {
                kind: Replace,
                ..change
            }),
            (Add | Replace | Modify, Modify) => Some(PathChange {
                kind: old.kind,
                node_rev_id: change.node_rev_id,
                text_mod: old.text_mod || change.text_mod,
                prop_mod: old.prop_mod || change.prop_mod,
            }),
            _ => Some(change),
        },
    };
    if is_delete {
        changes.retain(|p, _| !is_ancestor(path, p));
    }
    if let Some(change) = folded {
        changes.insert(path.to_string(), change);
    }
}
