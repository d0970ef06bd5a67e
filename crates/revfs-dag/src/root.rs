use std::any::Any;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use revfs_delta::TextDeltaStream;
use revfs_fs::{
    ContentWriter, CopySource, DeltaConsumer, FsError, FsResult, HistoryProvider, RootProvider,
};
use revfs_types::{
    Checksum, DirEntry, NodeKind, NodeRevisionId, PathChange, PropList, Revnum,
};

use crate::content::{DagContentWriter, DagDeltaConsumer, Target};
use crate::engine::DagFs;
use crate::history::DagHistory;
use crate::node::{NodeData, NodeRevision};
use crate::state::DagState;

#[derive(Clone, Debug)]
enum DagRootKind {
    Revision { rev: Revnum, root: NodeRevisionId },
    Txn { name: String },
}

/// A tree view over a [`DagFs`]: one committed revision, or the live tree
/// of one transaction.
#[derive(Clone, Debug)]
pub struct DagRoot {
    fs: DagFs,
    kind: DagRootKind,
}

impl DagRoot {
    pub(crate) fn revision(fs: DagFs, rev: Revnum, root: NodeRevisionId) -> Self {
        Self {
            fs,
            kind: DagRootKind::Revision { rev, root },
        }
    }

    pub(crate) fn txn(fs: DagFs, name: String) -> Self {
        Self {
            fs,
            kind: DagRootKind::Txn { name },
        }
    }

    pub fn revision_number(&self) -> Option<Revnum> {
        match self.kind {
            DagRootKind::Revision { rev, .. } => Some(rev),
            DagRootKind::Txn { .. } => None,
        }
    }

    pub fn txn_name(&self) -> Option<&str> {
        match &self.kind {
            DagRootKind::Revision { .. } => None,
            DagRootKind::Txn { name } => Some(name),
        }
    }

    fn root_id(&self, state: &DagState) -> FsResult<NodeRevisionId> {
        match &self.kind {
            DagRootKind::Revision { root, .. } => Ok(root.clone()),
            DagRootKind::Txn { name } => state.txn_root(name),
        }
    }

    /// Name of the transaction a write goes to.
    fn writable(&self, op: &str) -> FsResult<&str> {
        match &self.kind {
            DagRootKind::Txn { name } => Ok(name),
            DagRootKind::Revision { rev, .. } => Err(FsError::invalid_state(format!(
                "{op}: revision root r{rev} is immutable"
            ))),
        }
    }

    fn with_node<T>(
        &self,
        path: &str,
        f: impl FnOnce(&DagState, &NodeRevision) -> FsResult<T>,
    ) -> FsResult<T> {
        let guard = self.fs.lock()?;
        let state: &DagState = &guard;
        let id = state.lookup(&self.root_id(state)?, path)?;
        f(state, state.node(&id)?)
    }

    fn with_file<T>(
        &self,
        path: &str,
        f: impl FnOnce(&DagState, Option<u64>) -> FsResult<T>,
    ) -> FsResult<T> {
        self.with_node(path, |state, node| match node.data {
            NodeData::File(rep) => f(state, rep),
            NodeData::Dir(_) => Err(FsError::NotFile { path: path.into() }),
        })
    }

    /// `other` as a root of this same engine.
    fn peer<'a>(&self, other: &'a dyn RootProvider, op: &str) -> FsResult<&'a DagRoot> {
        other
            .as_any()
            .downcast_ref::<DagRoot>()
            .filter(|r| r.fs.same_engine(&self.fs))
            .ok_or_else(|| {
                FsError::unsupported(self.fs.provider_name(), format!("{op} across filesystems"))
            })
    }

    fn committed_rev(&self, op: &str) -> FsResult<Revnum> {
        self.revision_number().ok_or_else(|| {
            FsError::invalid_state(format!("{op}: source must be a revision root"))
        })
    }

    fn content_target(&self, op: &str, path: &str, expected: Option<&Checksum>) -> FsResult<Target> {
        Ok(Target {
            fs: self.fs.clone(),
            txn: self.writable(op)?.to_string(),
            path: path.to_string(),
            expected: expected.copied(),
        })
    }
}

fn read_all(root: &dyn RootProvider, path: &str) -> FsResult<Vec<u8>> {
    let mut out = Vec::new();
    root.file_contents(path)?.read_to_end(&mut out)?;
    Ok(out)
}

impl RootProvider for DagRoot {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn paths_changed(&self) -> FsResult<BTreeMap<String, PathChange>> {
        let state = self.fs.lock()?;
        match &self.kind {
            DagRootKind::Revision { rev, .. } => Ok(state.revision(*rev)?.changes.clone()),
            DagRootKind::Txn { name } => Ok(state.txn(name)?.changes.clone()),
        }
    }

    fn check_path(&self, path: &str) -> FsResult<NodeKind> {
        let state = self.fs.lock()?;
        state.check_path(&self.root_id(&state)?, path)
    }

    fn node_history(&self, path: &str) -> FsResult<Box<dyn HistoryProvider>> {
        let rev = self.committed_rev("node_history")?;
        self.with_node(path, |_, _| Ok(()))?;
        Ok(Box::new(DagHistory::start(self.fs.clone(), path, rev)))
    }

    fn node_id(&self, path: &str) -> FsResult<NodeRevisionId> {
        self.with_node(path, |_, node| Ok(node.id.clone()))
    }

    fn node_created_rev(&self, path: &str) -> FsResult<Option<Revnum>> {
        self.with_node(path, |_, node| Ok(node.created_rev))
    }

    fn node_created_path(&self, path: &str) -> FsResult<String> {
        self.with_node(path, |_, node| Ok(node.created_path.clone()))
    }

    fn delete_node(&self, path: &str) -> FsResult<()> {
        let txn = self.writable("delete_node")?;
        self.fs.lock()?.delete_node(txn, path)
    }

    fn copied_from(&self, path: &str) -> FsResult<Option<CopySource>> {
        self.with_node(path, |_, node| Ok(node.copy_from.clone()))
    }

    fn node_prop(&self, path: &str, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.with_node(path, |_, node| Ok(node.props.get(name).cloned()))
    }

    fn node_proplist(&self, path: &str) -> FsResult<PropList> {
        self.with_node(path, |_, node| Ok(node.props.clone()))
    }

    fn change_node_prop(&self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        let txn = self.writable("change_node_prop")?;
        self.fs.lock()?.change_node_prop(txn, path, name, value)
    }

    fn props_changed(
        &self,
        root1: &dyn RootProvider,
        path1: &str,
        root2: &dyn RootProvider,
        path2: &str,
    ) -> FsResult<bool> {
        Ok(root1.node_proplist(path1)? != root2.node_proplist(path2)?)
    }

    fn contents_changed(
        &self,
        root1: &dyn RootProvider,
        path1: &str,
        root2: &dyn RootProvider,
        path2: &str,
    ) -> FsResult<bool> {
        for (root, path) in [(root1, path1), (root2, path2)] {
            if root.check_path(path)? != NodeKind::File {
                return Err(FsError::NotFile { path: path.into() });
            }
        }
        Ok(root1.file_checksum(path1)? != root2.file_checksum(path2)?)
    }

    fn dir_entries(&self, path: &str) -> FsResult<BTreeMap<String, DirEntry>> {
        self.with_node(path, |state, node| {
            let entries = node.entries().ok_or_else(|| FsError::NotDirectory {
                path: path.into(),
            })?;
            entries
                .iter()
                .map(|(name, id)| -> FsResult<(String, DirEntry)> {
                    let entry = DirEntry {
                        name: name.clone(),
                        id: id.clone(),
                        kind: state.node(id)?.kind(),
                    };
                    Ok((name.clone(), entry))
                })
                .collect()
        })
    }

    fn make_dir(&self, path: &str) -> FsResult<()> {
        let txn = self.writable("make_dir")?;
        self.fs
            .lock()?
            .make_node(txn, path, NodeData::Dir(BTreeMap::new()))
            .map(|_| ())
    }

    fn copy(
        &self,
        from_root: &dyn RootProvider,
        from_path: &str,
        to_root: &dyn RootProvider,
        to_path: &str,
    ) -> FsResult<()> {
        let from = self.peer(from_root, "copy")?;
        let to = self.peer(to_root, "copy")?;
        let rev = from.committed_rev("copy")?;
        let txn = to.writable("copy")?;
        self.fs
            .lock()?
            .copy_node(txn, rev, from_path, to_path, true)
            .map(|_| ())
    }

    fn revision_link(
        &self,
        from_root: &dyn RootProvider,
        to_root: &dyn RootProvider,
        path: &str,
    ) -> FsResult<()> {
        let from = self.peer(from_root, "revision_link")?;
        let to = self.peer(to_root, "revision_link")?;
        let rev = from.committed_rev("revision_link")?;
        let txn = to.writable("revision_link")?;
        self.fs
            .lock()?
            .copy_node(txn, rev, path, path, false)
            .map(|_| ())
    }

    fn file_length(&self, path: &str) -> FsResult<u64> {
        self.with_file(path, |state, rep| match rep {
            Some(key) => Ok(state.rep(key)?.len),
            None => Ok(0),
        })
    }

    fn file_checksum(&self, path: &str) -> FsResult<Checksum> {
        self.with_file(path, |state, rep| match rep {
            Some(key) => Ok(state.rep(key)?.checksum),
            None => Ok(Checksum::empty()),
        })
    }

    fn file_contents(&self, path: &str) -> FsResult<Box<dyn Read + Send>> {
        let text = self.with_node(path, |state, node| state.file_text(node, path))?;
        Ok(Box::new(Cursor::new(text)))
    }

    fn make_file(&self, path: &str) -> FsResult<()> {
        let txn = self.writable("make_file")?;
        self.fs
            .lock()?
            .make_node(txn, path, NodeData::File(None))
            .map(|_| ())
    }

    fn apply_textdelta(
        &self,
        path: &str,
        base_checksum: Option<&Checksum>,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<Box<dyn DeltaConsumer>> {
        let target = self.content_target("apply_textdelta", path, result_checksum)?;
        let base_text = self.with_node(path, |state, node| state.file_text(node, path))?;
        if let Some(expected) = base_checksum {
            let actual = Checksum::of(&base_text);
            if *expected != actual {
                return Err(FsError::ChecksumMismatch {
                    path: path.into(),
                    expected: *expected,
                    actual,
                });
            }
        }
        Ok(Box::new(DagDeltaConsumer::new(target, base_text)))
    }

    fn apply_text(
        &self,
        path: &str,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<Box<dyn ContentWriter>> {
        let target = self.content_target("apply_text", path, result_checksum)?;
        self.with_file(path, |_, _| Ok(()))?;
        Ok(Box::new(DagContentWriter::new(target)))
    }

    fn file_delta_stream(
        &self,
        source: Option<(&dyn RootProvider, &str)>,
        target_root: &dyn RootProvider,
        target_path: &str,
    ) -> FsResult<TextDeltaStream> {
        let source_text = match source {
            Some((root, path)) => read_all(root, path)?,
            None => Vec::new(),
        };
        let target_text = read_all(target_root, target_path)?;
        Ok(TextDeltaStream::new(&source_text, &target_text))
    }

    fn merge(
        &self,
        source_root: &dyn RootProvider,
        source_path: &str,
        target_root: &dyn RootProvider,
        target_path: &str,
        ancestor_root: &dyn RootProvider,
        ancestor_path: &str,
    ) -> FsResult<()> {
        let source = self.peer(source_root, "merge")?;
        let target = self.peer(target_root, "merge")?;
        let ancestor = self.peer(ancestor_root, "merge")?;
        source.committed_rev("merge")?;
        ancestor.committed_rev("merge")?;
        let txn = target.writable("merge")?;

        let mut state = self.fs.lock()?;
        let source_id = state.lookup(&source.root_id(&state)?, source_path)?;
        let ancestor_id = state.lookup(&ancestor.root_id(&state)?, ancestor_path)?;
        state.merge_into(txn, target_path, &source_id, &ancestor_id)
    }
}
