//! Three-way directory merge into a transaction.
//!
//! # Rules
//!
//! - A side equal to the ancestor contributes nothing.
//! - If the target still equals the ancestor, the source is taken whole.
//! - Directories that are revisions of the same node merge entry by entry.
//! - Anything else changed on both sides is a conflict at that path.

use std::collections::BTreeSet;

use revfs_fs::{FsError, FsResult};
use revfs_types::{basename, dirname, join, NodeKind, NodeRevisionId};
use tracing::debug;

use crate::node::NodeData;
use crate::state::DagState;

impl DagState {
    /// Merge the changes from `ancestor` to `source` into the node at
    /// `target_path` in `txn`. Merged entries are not recorded as
    /// transaction changes.
    pub fn merge_into(
        &mut self,
        txn: &str,
        target_path: &str,
        source: &NodeRevisionId,
        ancestor: &NodeRevisionId,
    ) -> FsResult<()> {
        let root = self.txn_root(txn)?;
        let target = self.lookup(&root, target_path)?;
        self.merge_node(txn, target_path, &target, source, ancestor)
    }

    fn merge_node(
        &mut self,
        txn: &str,
        path: &str,
        target: &NodeRevisionId,
        source: &NodeRevisionId,
        ancestor: &NodeRevisionId,
    ) -> FsResult<()> {
        if source == ancestor || source == target {
            return Ok(());
        }
        if target == ancestor {
            debug!(txn, path, %source, "taking source node");
            return self.take(txn, path, source.clone());
        }

        let t = self.node(target)?.clone();
        let s = self.node(source)?.clone();
        let a = self.node(ancestor)?.clone();
        let all_dirs = [&t, &s, &a].iter().all(|n| n.kind() == NodeKind::Dir);
        if !all_dirs || !t.id.is_same_node(&a.id) || !s.id.is_same_node(&a.id) {
            return Err(FsError::conflict(path));
        }

        let props = if s.props == a.props || s.props == t.props {
            None
        } else if t.props == a.props {
            Some(s.props.clone())
        } else {
            return Err(FsError::conflict(path));
        };

        let (Some(te), Some(se), Some(ae)) = (t.entries(), s.entries(), a.entries()) else {
            return Err(FsError::conflict(path));
        };
        let names: BTreeSet<&String> = te.keys().chain(se.keys()).chain(ae.keys()).collect();

        let dir = self.make_mutable(txn, path)?;
        if let Some(props) = props {
            self.txn_mut(txn)?
                .nodes
                .get_mut(&dir)
                .ok_or_else(|| FsError::invalid_state(format!("{dir} is not mutable")))?
                .props = props;
        }

        for name in names {
            let (tn, sn, an) = (te.get(name), se.get(name), ae.get(name));
            if sn == an || sn == tn {
                continue;
            }
            let child = join(path, name);
            match (tn, sn, an) {
                (t, s, a) if t == a => self.take_entry(txn, &child, s.cloned())?,
                (Some(t), Some(s), Some(a)) => self.merge_node(txn, &child, t, s, a)?,
                _ => return Err(FsError::conflict(child)),
            }
        }
        Ok(())
    }

    fn take(&mut self, txn: &str, path: &str, id: NodeRevisionId) -> FsResult<()> {
        if path == "/" {
            self.txn_mut(txn)?.root = id;
            Ok(())
        } else {
            self.take_entry(txn, path, Some(id))
        }
    }

    fn take_entry(&mut self, txn: &str, path: &str, id: Option<NodeRevisionId>) -> FsResult<()> {
        let parent = self.make_mutable(txn, dirname(path))?;
        let node = self
            .txn_mut(txn)?
            .nodes
            .get_mut(&parent)
            .ok_or_else(|| FsError::invalid_state(format!("{parent} is not mutable")))?;
        let NodeData::Dir(entries) = &mut node.data else {
            return Err(FsError::NotDirectory {
                path: dirname(path).to_string(),
            });
        };
        match id {
            Some(id) => entries.insert(basename(path).to_string(), id),
            None => entries.remove(basename(path)),
        };
        Ok(())
    }
}
