//! Drive an editor with the changes a revision made.
//!
//! [`replay`] walks a revision's changed paths in sorted order (so parents
//! come before their children) and reports each as editor calls, sending
//! file contents as deltas against the previous contents. Applying those
//! calls to a transaction based on the previous revision, as
//! [`TxnReplayEditor`] does, rebuilds an equivalent tree.

use std::collections::BTreeMap;

use revfs_delta::TextDeltaStream;
use revfs_types::{
    dirname, join, relative_to, ChangeKind, Checksum, NodeKind, PathChange, PropList, Revnum,
};
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::provider::CopySource;
use crate::root::{contents_changed, copy, file_delta_stream, Root};

/// Receiver of a replayed revision. Paths are absolute and canonical.
pub trait ReplayEditor {
    /// Called once before any change, with the revision the changes apply to.
    fn open_root(&mut self, base_rev: Revnum) -> FsResult<()> {
        let _ = base_rev;
        Ok(())
    }

    fn delete_entry(&mut self, path: &str) -> FsResult<()>;

    fn add_directory(&mut self, path: &str, copy_from: Option<&CopySource>) -> FsResult<()>;

    fn open_directory(&mut self, path: &str) -> FsResult<()>;

    fn add_file(&mut self, path: &str, copy_from: Option<&CopySource>) -> FsResult<()>;

    fn open_file(&mut self, path: &str) -> FsResult<()>;

    /// Set (`Some`) or delete (`None`) a node property.
    fn change_prop(&mut self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()>;

    /// New contents for a file, as a delta against its base contents.
    /// `base_checksum` is `None` when the base is the empty text.
    fn apply_text(
        &mut self,
        path: &str,
        base_checksum: Option<&Checksum>,
        delta: TextDeltaStream,
        result_checksum: &Checksum,
    ) -> FsResult<()>;

    fn close_edit(&mut self) -> FsResult<()> {
        Ok(())
    }
}

/// Report the changes of revision root `root` to `editor`.
pub fn replay(root: &Root, editor: &mut dyn ReplayEditor) -> FsResult<()> {
    let rev = root
        .revision()
        .ok_or_else(|| FsError::invalid_state("replay: only revision roots can be replayed"))?;
    let Some(base_rev) = rev.prev() else {
        editor.open_root(Revnum::ZERO)?;
        return editor.close_edit();
    };

    let changes = root.paths_changed()?;
    debug!(rev = rev.get(), changes = changes.len(), "replaying revision");
    editor.open_root(base_rev)?;
    for (path, change) in &changes {
        match change.kind {
            ChangeKind::Delete => editor.delete_entry(path)?,
            ChangeKind::Replace => {
                editor.delete_entry(path)?;
                replay_add(root, path, editor)?;
            }
            ChangeKind::Add => replay_add(root, path, editor)?,
            ChangeKind::Modify => replay_modify(root, base_rev, &changes, path, change, editor)?,
        }
    }
    editor.close_edit()
}

fn replay_add(root: &Root, path: &str, editor: &mut dyn ReplayEditor) -> FsResult<()> {
    let kind = root.check_path(path)?;
    let copy_from = root.copied_from(path)?;
    match kind {
        NodeKind::Dir => editor.add_directory(path, copy_from.as_ref())?,
        NodeKind::File => editor.add_file(path, copy_from.as_ref())?,
        NodeKind::None => {
            return Err(FsError::Corrupt(format!(
                "added path {path} is missing from its revision"
            )))
        }
    }

    let base = match &copy_from {
        Some(src) => Some((root.fs().revision_root(src.rev)?, src.path.as_str())),
        None => None,
    };
    let base_props = match &base {
        Some((base_root, base_path)) => base_root.node_proplist(base_path)?,
        None => PropList::new(),
    };
    send_prop_changes(editor, path, &base_props, &root.node_proplist(path)?)?;

    if kind == NodeKind::File {
        let changed = match &base {
            Some((base_root, base_path)) => contents_changed(base_root, base_path, root, path)?,
            None => root.file_length(path)? > 0,
        };
        if changed {
            let base = base.as_ref().map(|(r, p)| (r, *p));
            send_text(editor, base, root, path)?;
        }
    }
    Ok(())
}

fn replay_modify(
    root: &Root,
    base_rev: Revnum,
    changes: &BTreeMap<String, PathChange>,
    path: &str,
    change: &PathChange,
    editor: &mut dyn ReplayEditor,
) -> FsResult<()> {
    let kind = root.check_path(path)?;
    match kind {
        NodeKind::Dir => editor.open_directory(path)?,
        NodeKind::File => editor.open_file(path)?,
        NodeKind::None => {
            return Err(FsError::Corrupt(format!(
                "modified path {path} is missing from its revision"
            )))
        }
    }
    if !change.prop_mod && !change.text_mod {
        return Ok(());
    }

    let (base_root, base_path) = modify_base(root, base_rev, changes, path)?;
    if change.prop_mod {
        send_prop_changes(
            editor,
            path,
            &base_root.node_proplist(&base_path)?,
            &root.node_proplist(path)?,
        )?;
    }
    if change.text_mod && kind == NodeKind::File {
        send_text(editor, Some((&base_root, base_path.as_str())), root, path)?;
    }
    Ok(())
}

/// Where the previous contents of a modified path live: the same path in
/// the previous revision, or, under a directory added by copy in this
/// revision, the matching path of the copy source.
fn modify_base(
    root: &Root,
    base_rev: Revnum,
    changes: &BTreeMap<String, PathChange>,
    path: &str,
) -> FsResult<(Root, String)> {
    let mut ancestor = path;
    while ancestor != "/" {
        ancestor = dirname(ancestor);
        let added = changes
            .get(ancestor)
            .is_some_and(|c| matches!(c.kind, ChangeKind::Add | ChangeKind::Replace));
        if !added {
            continue;
        }
        let src = root.copied_from(ancestor)?.ok_or_else(|| {
            FsError::Corrupt(format!(
                "{path} is modified under {ancestor}, which was added without history"
            ))
        })?;
        let rel = relative_to(ancestor, path).unwrap_or("");
        let base_path = if rel.is_empty() {
            src.path.clone()
        } else {
            join(&src.path, rel)
        };
        return Ok((root.fs().revision_root(src.rev)?, base_path));
    }
    Ok((root.fs().revision_root(base_rev)?, path.to_string()))
}

fn send_prop_changes(
    editor: &mut dyn ReplayEditor,
    path: &str,
    base: &PropList,
    current: &PropList,
) -> FsResult<()> {
    for (name, value) in current {
        if base.get(name) != Some(value) {
            editor.change_prop(path, name, Some(value))?;
        }
    }
    for name in base.keys() {
        if !current.contains_key(name) {
            editor.change_prop(path, name, None)?;
        }
    }
    Ok(())
}

fn send_text(
    editor: &mut dyn ReplayEditor,
    base: Option<(&Root, &str)>,
    root: &Root,
    path: &str,
) -> FsResult<()> {
    let base_checksum = match base {
        Some((base_root, base_path)) => Some(base_root.file_checksum(base_path)?),
        None => None,
    };
    let delta = file_delta_stream(base, root, path)?;
    let result = root.file_checksum(path)?;
    editor.apply_text(path, base_checksum.as_ref(), delta, &result)
}

/// Editor that applies a replay to a transaction root.
///
/// Copy sources are looked up by revision number in the target's own
/// filesystem, so replaying into another repository requires it to carry
/// the same revisions (as a mirror does).
pub struct TxnReplayEditor<'a> {
    target: &'a Root,
}

impl<'a> TxnReplayEditor<'a> {
    pub fn new(target: &'a Root) -> FsResult<Self> {
        if !target.is_txn_root() {
            return Err(FsError::invalid_state(
                "replay target must be a transaction root",
            ));
        }
        Ok(Self { target })
    }

    fn expect_kind(&self, path: &str, kind: NodeKind) -> FsResult<()> {
        match self.target.check_path(path)? {
            NodeKind::None => Err(FsError::not_found(format!("path {path}"))),
            found if found == kind => Ok(()),
            NodeKind::Dir => Err(FsError::NotFile {
                path: path.to_string(),
            }),
            NodeKind::File => Err(FsError::NotDirectory {
                path: path.to_string(),
            }),
        }
    }

    fn copy_in(&self, src: &CopySource, path: &str) -> FsResult<()> {
        let from = self.target.fs().revision_root(src.rev)?;
        copy(&from, &src.path, self.target, path)
    }
}

impl ReplayEditor for TxnReplayEditor<'_> {
    fn delete_entry(&mut self, path: &str) -> FsResult<()> {
        self.target.delete_node(path)
    }

    fn add_directory(&mut self, path: &str, copy_from: Option<&CopySource>) -> FsResult<()> {
        match copy_from {
            Some(src) => self.copy_in(src, path),
            None => self.target.make_dir(path),
        }
    }

    fn open_directory(&mut self, path: &str) -> FsResult<()> {
        self.expect_kind(path, NodeKind::Dir)
    }

    fn add_file(&mut self, path: &str, copy_from: Option<&CopySource>) -> FsResult<()> {
        match copy_from {
            Some(src) => self.copy_in(src, path),
            None => self.target.make_file(path),
        }
    }

    fn open_file(&mut self, path: &str) -> FsResult<()> {
        self.expect_kind(path, NodeKind::File)
    }

    fn change_prop(&mut self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.target.change_node_prop(path, name, value)
    }

    fn apply_text(
        &mut self,
        path: &str,
        base_checksum: Option<&Checksum>,
        delta: TextDeltaStream,
        result_checksum: &Checksum,
    ) -> FsResult<()> {
        let mut handler = self
            .target
            .apply_textdelta(path, base_checksum, Some(result_checksum))?;
        handler.push_all(delta)?;
        handler.close()
    }
}
