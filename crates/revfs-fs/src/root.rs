use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

use revfs_delta::{DeltaWindow, TextDeltaStream};
use revfs_types::{
    canonicalize_abspath, Checksum, DirEntry, NodeKind, NodeRevisionId, PathChange, PropList,
    Revnum,
};

use crate::error::{FsError, FsResult};
use crate::fs::Filesystem;
use crate::history::History;
use crate::provider::{ContentWriter, CopySource, DeltaConsumer, RootProvider};
use crate::resolve::{governing, MultiRootOp};

/// What a [`Root`] is a view of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RootKind {
    /// A committed, immutable revision.
    Revision(Revnum),
    /// The tree of the named, uncommitted transaction.
    Transaction(String),
}

/// A tree snapshot: a committed revision or a transaction's working tree.
///
/// Paths may be given in any form; they are canonicalized before reaching
/// the provider. Mutations through a revision root fail with
/// `InvalidState`.
pub struct Root {
    fs: Filesystem,
    kind: RootKind,
    provider: Box<dyn RootProvider>,
}

impl Root {
    pub(crate) fn new(fs: Filesystem, kind: RootKind, provider: Box<dyn RootProvider>) -> Self {
        Self { fs, kind, provider }
    }

    pub fn fs(&self) -> &Filesystem {
        &self.fs
    }

    pub fn kind(&self) -> &RootKind {
        &self.kind
    }

    pub fn is_revision_root(&self) -> bool {
        matches!(self.kind, RootKind::Revision(_))
    }

    pub fn is_txn_root(&self) -> bool {
        matches!(self.kind, RootKind::Transaction(_))
    }

    /// The revision, for revision roots.
    pub fn revision(&self) -> Option<Revnum> {
        match self.kind {
            RootKind::Revision(rev) => Some(rev),
            RootKind::Transaction(_) => None,
        }
    }

    /// The transaction name, for transaction roots.
    pub fn txn_name(&self) -> Option<&str> {
        match &self.kind {
            RootKind::Transaction(name) => Some(name),
            RootKind::Revision(_) => None,
        }
    }

    pub(crate) fn provider(&self) -> &dyn RootProvider {
        self.provider.as_ref()
    }

    fn describe(&self) -> String {
        match &self.kind {
            RootKind::Revision(rev) => format!("r{rev}"),
            RootKind::Transaction(name) => format!("txn {name}"),
        }
    }

    fn ensure_txn_root(&self, op: &str) -> FsResult<()> {
        match &self.kind {
            RootKind::Transaction(_) => Ok(()),
            RootKind::Revision(rev) => Err(FsError::invalid_state(format!(
                "{op}: root of r{rev} is read-only"
            ))),
        }
    }

    pub fn paths_changed(&self) -> FsResult<BTreeMap<String, PathChange>> {
        self.provider
            .paths_changed()
            .map_err(|e| e.context("paths_changed", self.describe()))
    }

    pub fn check_path(&self, path: &str) -> FsResult<NodeKind> {
        let path = canonicalize_abspath(path);
        self.provider
            .check_path(&path)
            .map_err(|e| e.context("check_path", path))
    }

    /// History cursor for `path`. Only revision roots have history.
    pub fn node_history(&self, path: &str) -> FsResult<History> {
        let path = canonicalize_abspath(path);
        if let RootKind::Transaction(name) = &self.kind {
            return Err(FsError::invalid_state(format!(
                "node_history: {path} is in uncommitted transaction {name}"
            )));
        }
        let provider = self
            .provider
            .node_history(&path)
            .map_err(|e| e.context("node_history", path))?;
        Ok(History::new(provider))
    }

    pub fn node_id(&self, path: &str) -> FsResult<NodeRevisionId> {
        let path = canonicalize_abspath(path);
        self.provider
            .node_id(&path)
            .map_err(|e| e.context("node_id", path))
    }

    /// Revision that created this node-revision; `None` if uncommitted.
    pub fn node_created_rev(&self, path: &str) -> FsResult<Option<Revnum>> {
        let path = canonicalize_abspath(path);
        self.provider
            .node_created_rev(&path)
            .map_err(|e| e.context("node_created_rev", path))
    }

    pub fn node_created_path(&self, path: &str) -> FsResult<String> {
        let path = canonicalize_abspath(path);
        self.provider
            .node_created_path(&path)
            .map_err(|e| e.context("node_created_path", path))
    }

    pub fn delete_node(&self, path: &str) -> FsResult<()> {
        self.ensure_txn_root("delete_node")?;
        let path = canonicalize_abspath(path);
        if path == "/" {
            return Err(FsError::invalid_state("delete_node: cannot delete the root directory"));
        }
        self.provider
            .delete_node(&path)
            .map_err(|e| e.context("delete_node", path))
    }

    pub fn copied_from(&self, path: &str) -> FsResult<Option<CopySource>> {
        let path = canonicalize_abspath(path);
        self.provider
            .copied_from(&path)
            .map_err(|e| e.context("copied_from", path))
    }

    pub fn node_prop(&self, path: &str, name: &str) -> FsResult<Option<Vec<u8>>> {
        let path = canonicalize_abspath(path);
        self.provider
            .node_prop(&path, name)
            .map_err(|e| e.context("node_prop", path))
    }

    pub fn node_proplist(&self, path: &str) -> FsResult<PropList> {
        let path = canonicalize_abspath(path);
        self.provider
            .node_proplist(&path)
            .map_err(|e| e.context("node_proplist", path))
    }

    /// Set or delete (`None`) a node property.
    pub fn change_node_prop(&self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.ensure_txn_root("change_node_prop")?;
        let path = canonicalize_abspath(path);
        self.provider
            .change_node_prop(&path, name, value)
            .map_err(|e| e.context("change_node_prop", path))
    }

    pub fn dir_entries(&self, path: &str) -> FsResult<BTreeMap<String, DirEntry>> {
        let path = canonicalize_abspath(path);
        self.provider
            .dir_entries(&path)
            .map_err(|e| e.context("dir_entries", path))
    }

    pub fn make_dir(&self, path: &str) -> FsResult<()> {
        self.ensure_txn_root("make_dir")?;
        let path = canonicalize_abspath(path);
        self.provider
            .make_dir(&path)
            .map_err(|e| e.context("make_dir", path))
    }

    pub fn file_length(&self, path: &str) -> FsResult<u64> {
        let path = canonicalize_abspath(path);
        self.provider
            .file_length(&path)
            .map_err(|e| e.context("file_length", path))
    }

    pub fn file_checksum(&self, path: &str) -> FsResult<Checksum> {
        let path = canonicalize_abspath(path);
        self.provider
            .file_checksum(&path)
            .map_err(|e| e.context("file_checksum", path))
    }

    pub fn file_contents(&self, path: &str) -> FsResult<Box<dyn Read + Send>> {
        let path = canonicalize_abspath(path);
        self.provider
            .file_contents(&path)
            .map_err(|e| e.context("file_contents", path))
    }

    /// Read a whole file into memory.
    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.file_contents(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn make_file(&self, path: &str) -> FsResult<()> {
        self.ensure_txn_root("make_file")?;
        let path = canonicalize_abspath(path);
        self.provider
            .make_file(&path)
            .map_err(|e| e.context("make_file", path))
    }

    /// Start replacing a file's contents by delta.
    pub fn apply_textdelta(
        &self,
        path: &str,
        base_checksum: Option<&Checksum>,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<DeltaHandler> {
        self.ensure_txn_root("apply_textdelta")?;
        let path = canonicalize_abspath(path);
        let consumer = self
            .provider
            .apply_textdelta(&path, base_checksum, result_checksum)
            .map_err(|e| e.context("apply_textdelta", path.clone()))?;
        Ok(DeltaHandler { path, consumer })
    }

    /// Start replacing a file's contents with plain bytes.
    pub fn apply_text(&self, path: &str, result_checksum: Option<&Checksum>) -> FsResult<ContentSink> {
        self.ensure_txn_root("apply_text")?;
        let path = canonicalize_abspath(path);
        let writer = self
            .provider
            .apply_text(&path, result_checksum)
            .map_err(|e| e.context("apply_text", path.clone()))?;
        Ok(ContentSink { path, writer })
    }

    /// Replace a file's contents in one call.
    pub fn write_file(&self, path: &str, contents: &[u8]) -> FsResult<()> {
        let mut sink = self.apply_text(path, Some(&Checksum::of(contents)))?;
        sink.write_all(contents)?;
        sink.close()
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("fs", &self.fs)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Window receiver returned by [`Root::apply_textdelta`].
///
/// The new contents become visible only when [`DeltaHandler::close`]
/// succeeds.
pub struct DeltaHandler {
    path: String,
    consumer: Box<dyn DeltaConsumer>,
}

impl DeltaHandler {
    pub fn push(&mut self, window: &DeltaWindow) -> FsResult<()> {
        self.consumer
            .push(window)
            .map_err(|e| e.context("apply_textdelta", self.path.clone()))
    }

    /// Push every window of `windows`.
    pub fn push_all(&mut self, windows: impl IntoIterator<Item = DeltaWindow>) -> FsResult<()> {
        for window in windows {
            self.push(&window)?;
        }
        Ok(())
    }

    pub fn close(self) -> FsResult<()> {
        let path = self.path;
        self.consumer
            .close()
            .map_err(|e| e.context("apply_textdelta", path))
    }
}

/// Byte sink returned by [`Root::apply_text`]. Same visibility rule as
/// [`DeltaHandler`].
pub struct ContentSink {
    path: String,
    writer: Box<dyn ContentWriter>,
}

impl ContentSink {
    pub fn close(self) -> FsResult<()> {
        let path = self.path;
        self.writer.close().map_err(|e| e.context("apply_text", path))
    }
}

impl Write for ContentSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Whether the properties at `path1` in `root1` and `path2` in `root2`
/// differ.
pub fn props_changed(root1: &Root, path1: &str, root2: &Root, path2: &str) -> FsResult<bool> {
    let (path1, path2) = (canonicalize_abspath(path1), canonicalize_abspath(path2));
    governing(MultiRootOp::PropsChanged, &[root1, root2])
        .provider
        .props_changed(root1.provider(), &path1, root2.provider(), &path2)
        .map_err(|e| e.context("props_changed", format!("{path1} {path2}")))
}

/// Whether the contents of two files differ.
pub fn contents_changed(root1: &Root, path1: &str, root2: &Root, path2: &str) -> FsResult<bool> {
    let (path1, path2) = (canonicalize_abspath(path1), canonicalize_abspath(path2));
    governing(MultiRootOp::ContentsChanged, &[root1, root2])
        .provider
        .contents_changed(root1.provider(), &path1, root2.provider(), &path2)
        .map_err(|e| e.context("contents_changed", format!("{path1} {path2}")))
}

/// Copy `from_path` of revision root `from_root` to `to_path` of
/// transaction root `to_root`, keeping copy history.
pub fn copy(from_root: &Root, from_path: &str, to_root: &Root, to_path: &str) -> FsResult<()> {
    to_root.ensure_txn_root("copy")?;
    if !from_root.is_revision_root() {
        return Err(FsError::invalid_state("copy: source must be a revision root"));
    }
    let (from_path, to_path) = (canonicalize_abspath(from_path), canonicalize_abspath(to_path));
    governing(MultiRootOp::Copy, &[from_root, to_root])
        .provider
        .copy(from_root.provider(), &from_path, to_root.provider(), &to_path)
        .map_err(|e| e.context("copy", format!("{from_path} -> {to_path}")))
}

/// Install the node-revision at `path` in `from_root` at the same path in
/// `to_root`, without copy history.
pub fn revision_link(from_root: &Root, to_root: &Root, path: &str) -> FsResult<()> {
    to_root.ensure_txn_root("revision_link")?;
    let path = canonicalize_abspath(path);
    governing(MultiRootOp::RevisionLink, &[from_root, to_root])
        .provider
        .revision_link(from_root.provider(), to_root.provider(), &path)
        .map_err(|e| e.context("revision_link", path))
}

/// Delta from `source` (or the empty text) to the target file.
pub fn file_delta_stream(
    source: Option<(&Root, &str)>,
    target_root: &Root,
    target_path: &str,
) -> FsResult<TextDeltaStream> {
    let target_path = canonicalize_abspath(target_path);
    let source = source.map(|(root, path)| (root, canonicalize_abspath(path)));
    let roots: Vec<&Root> = match &source {
        Some((root, _)) => vec![root, target_root],
        None => vec![target_root],
    };
    let provider_source = source
        .as_ref()
        .map(|(root, path)| (root.provider(), path.as_str()));
    governing(MultiRootOp::FileDeltaStream, &roots)
        .provider
        .file_delta_stream(provider_source, target_root.provider(), &target_path)
        .map_err(|e| e.context("file_delta_stream", target_path))
}

/// Merge the changes between `ancestor` and `source` into transaction
/// root `target`.
pub fn merge(
    source_root: &Root,
    source_path: &str,
    target_root: &Root,
    target_path: &str,
    ancestor_root: &Root,
    ancestor_path: &str,
) -> FsResult<()> {
    target_root.ensure_txn_root("merge")?;
    let source_path = canonicalize_abspath(source_path);
    let target_path = canonicalize_abspath(target_path);
    let ancestor_path = canonicalize_abspath(ancestor_path);
    governing(MultiRootOp::Merge, &[source_root, target_root, ancestor_root])
        .provider
        .merge(
            source_root.provider(),
            &source_path,
            target_root.provider(),
            &target_path,
            ancestor_root.provider(),
            &ancestor_path,
        )
        .map_err(|e| e.context("merge", target_path))
}
