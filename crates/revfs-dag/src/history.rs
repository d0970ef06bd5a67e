//! Node history: where a node last changed, and what came before.
//!
//! A location is a `(path, revision)` pair at which the node was created or
//! modified. Stepping back follows the predecessor chain at the same path,
//! then crosses to the copy source once the node (or a parent directory)
//! turns out to have been copied there.

use revfs_fs::{FsError, FsResult, HistoryProvider};
use revfs_types::{dirname, join, relative_to, NodeRevisionId, Revnum};
use tracing::debug;

use crate::engine::DagFs;
use crate::node::NodeRevision;
use crate::state::DagState;

impl DagState {
    fn node_at(&self, path: &str, rev: Revnum) -> FsResult<&NodeRevision> {
        let root = self.revision_root(rev)?;
        let id = self.lookup(&root, path)?;
        self.node(&id)
    }

    fn created_rev(node: &NodeRevision) -> FsResult<Revnum> {
        node.created_rev.ok_or_else(|| {
            FsError::Corrupt(format!("committed node-revision {} has no revision", node.id))
        })
    }

    /// The most recent revision, at or before `rev`, in which the node at
    /// `path` was changed or arrived at `path`.
    pub fn last_changed(&self, path: &str, rev: Revnum) -> FsResult<(String, Revnum)> {
        let node = self.node_at(path, rev)?;
        if node.created_path == path {
            return Ok((path.to_string(), Self::created_rev(node)?));
        }
        let at = match self.copy_origin(path, rev)? {
            Some((_, copy)) => Self::created_rev(copy)?,
            None => Self::created_rev(node)?,
        };
        Ok((path.to_string(), at))
    }

    /// Nearest ancestor directory of `path` that arrived by copy, with the
    /// node-revision the copy created.
    pub fn copy_origin(&self, path: &str, rev: Revnum) -> FsResult<Option<(String, &NodeRevision)>> {
        let root = self.revision_root(rev)?;
        let mut ancestor = dirname(path);
        while ancestor != "/" {
            let mut node = self.node(&self.lookup(&root, ancestor)?)?;
            loop {
                if node.copy_from.is_some() {
                    return Ok(Some((ancestor.to_string(), node)));
                }
                match &node.predecessor {
                    Some(pred) => {
                        let pred = self.node(pred)?;
                        if pred.created_path != ancestor {
                            break;
                        }
                        node = pred;
                    }
                    None => break,
                }
            }
            ancestor = dirname(ancestor);
        }
        Ok(None)
    }

    /// The location before `(path, rev)`. `rev` must be a revision returned
    /// by [`DagState::last_changed`] or a previous step.
    pub fn history_prev(
        &self,
        path: &str,
        rev: Revnum,
        cross_copies: bool,
    ) -> FsResult<Option<(String, Revnum)>> {
        let across = |loc: (String, Revnum)| {
            if cross_copies {
                debug!(from = path, to = %loc.0, rev = %loc.1, "history crosses copy");
                Some(loc)
            } else {
                None
            }
        };

        let node = self.node_at(path, rev)?;
        if node.created_path != path {
            let Some((ancestor, copy)) = self.copy_origin(path, rev)? else {
                return Ok(None);
            };
            let Some(src) = &copy.copy_from else {
                return Ok(None);
            };
            let rel = relative_to(&ancestor, path).unwrap_or_default();
            let from = if rel.is_empty() {
                src.path.clone()
            } else {
                join(&src.path, rel)
            };
            return Ok(across(self.last_changed(&from, src.rev)?));
        }

        if let Some(src) = &node.copy_from {
            return Ok(across(self.last_changed(&src.path, src.rev)?));
        }
        let Some(pred_id) = &node.predecessor else {
            return Ok(None);
        };
        let pred = self.node(pred_id)?;
        let pred_rev = Self::created_rev(pred)?;
        if pred.created_path == path {
            return Ok(Some((path.to_string(), pred_rev)));
        }
        // The predecessor lived elsewhere. If it already sat at `path` one
        // revision earlier, it got there through a copied parent; otherwise
        // `path` was replaced and this change is the copy point.
        if let Some(before) = rev.prev() {
            if self.id_at(path, before)?.as_ref() == Some(pred_id) {
                return Ok(Some(self.last_changed(path, before)?));
            }
        }
        Ok(across((pred.created_path.clone(), pred_rev)))
    }

    fn id_at(&self, path: &str, rev: Revnum) -> FsResult<Option<NodeRevisionId>> {
        let root = self.revision_root(rev)?;
        match self.try_lookup(&root, path) {
            Ok(found) => Ok(found),
            Err(FsError::NotFound { .. } | FsError::NotDirectory { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// History cursor over a [`DagFs`].
pub struct DagHistory {
    fs: DagFs,
    path: String,
    rev: Revnum,
    /// Positioned at the query location rather than at a change.
    fresh: bool,
}

impl DagHistory {
    pub(crate) fn start(fs: DagFs, path: &str, rev: Revnum) -> Self {
        Self {
            fs,
            path: path.to_string(),
            rev,
            fresh: true,
        }
    }

    /// Node-revision id at this location.
    pub fn node_id(&self) -> FsResult<NodeRevisionId> {
        let state = self.fs.lock()?;
        Ok(state.node_at(&self.path, self.rev)?.id.clone())
    }
}

impl HistoryProvider for DagHistory {
    fn prev(&self, cross_copies: bool) -> FsResult<Option<Box<dyn HistoryProvider>>> {
        let next = {
            let state = self.fs.lock()?;
            if self.fresh {
                Some(state.last_changed(&self.path, self.rev)?)
            } else {
                state.history_prev(&self.path, self.rev, cross_copies)?
            }
        };
        Ok(next.map(|(path, rev)| {
            Box::new(DagHistory {
                fs: self.fs.clone(),
                path,
                rev,
                fresh: false,
            }) as Box<dyn HistoryProvider>
        }))
    }

    fn location(&self) -> (String, Revnum) {
        (self.path.clone(), self.rev)
    }
}
