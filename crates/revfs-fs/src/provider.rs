//! The operation tables a storage provider implements.
//!
//! A provider is split across five traits mirroring the five handle kinds:
//! [`FsLibrary`] (repository lifecycle and maintenance), [`FsProvider`] (one
//! open filesystem), [`TxnProvider`], [`RootProvider`], and
//! [`HistoryProvider`]. The public handles in this crate own boxed trait
//! objects and forward to them after validating and canonicalizing input, so
//! providers only ever see canonical paths and open transactions.
//!
//! Operations that take more than one root are invoked on the governing
//! root's provider and receive every participating root explicitly. A
//! provider that cannot work with a foreign root (one it did not create)
//! must fail with [`FsError::Unsupported`] rather than guess.

use std::any::Any;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use revfs_delta::{DeltaWindow, TextDeltaStream};
use revfs_types::{Checksum, DirEntry, NodeKind, NodeRevisionId, PathChange, PropList, Revnum};
use serde::{Deserialize, Serialize};

use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::warning::Warnings;

/// Handler installed through [`FsLibrary::set_errcall`]; receives a
/// component name and a message for storage-level failures.
pub type ErrCallFn = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Everything a library needs to create or open a repository.
pub struct OpenContext<'a> {
    pub path: &'a Path,
    pub config: &'a FsConfig,
    pub warnings: &'a Warnings,
}

/// Where a copied node came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopySource {
    pub rev: Revnum,
    pub path: String,
}

impl CopySource {
    pub fn new(rev: Revnum, path: impl Into<String>) -> Self {
        Self {
            rev,
            path: path.into(),
        }
    }
}

/// Repository lifecycle for one provider.
///
/// Registered with a [`crate::Registry`] under [`FsLibrary::name`]. The
/// maintenance hooks (`set_errcall`, `recover`, `logfiles`) are optional;
/// the defaults report [`FsError::Unsupported`].
pub trait FsLibrary: Send + Sync {
    /// The name this provider is registered under, e.g. `"journal"`.
    fn name(&self) -> &'static str;

    /// Create a new, empty repository at `ctx.path` and open it.
    ///
    /// The new repository has exactly revision 0: an empty root directory.
    /// Fails with `AlreadyExists` if a repository is already there.
    fn create(&self, ctx: &OpenContext<'_>) -> FsResult<Box<dyn FsProvider>>;

    /// Open an existing repository. Fails with `NotFound` if absent.
    fn open(&self, ctx: &OpenContext<'_>) -> FsResult<Box<dyn FsProvider>>;

    /// Destroy the repository at `path`.
    fn delete(&self, path: &Path) -> FsResult<()>;

    /// Copy a live repository. With `clean`, storage the copy does not need
    /// (for example, log segments already folded into a checkpoint) is left
    /// behind.
    fn hotcopy(&self, src: &Path, dest: &Path, clean: bool) -> FsResult<()>;

    /// Route storage-level error messages for `fs` to `handler`.
    fn set_errcall(&self, fs: &dyn FsProvider, handler: ErrCallFn) -> FsResult<()> {
        let _ = (fs, handler);
        Err(FsError::unsupported(self.name(), "set_errcall"))
    }

    /// Bring an interrupted repository back to a consistent state.
    ///
    /// Callers must ensure no other process has the repository open.
    fn recover(&self, path: &Path) -> FsResult<()> {
        let _ = path;
        Err(FsError::unsupported(self.name(), "recover"))
    }

    /// Names of the storage log files. With `only_unused`, only those no
    /// longer needed for recovery.
    fn logfiles(&self, path: &Path, only_unused: bool) -> FsResult<Vec<String>> {
        let _ = (path, only_unused);
        Err(FsError::unsupported(self.name(), "logfiles"))
    }
}

/// One open repository.
pub trait FsProvider: Send + Sync {
    /// Concrete access for providers that need to recognise their own
    /// objects (for example in `set_errcall`).
    fn as_any(&self) -> &dyn Any;

    fn youngest_rev(&self) -> FsResult<Revnum>;

    /// A single revision property; `Ok(None)` if unset.
    fn revision_prop(&self, rev: Revnum, name: &str) -> FsResult<Option<Vec<u8>>>;

    fn revision_proplist(&self, rev: Revnum) -> FsResult<PropList>;

    /// Set (`Some`) or delete (`None`) a revision property. Unversioned:
    /// the old value is gone.
    fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> FsResult<()>;

    fn uuid(&self) -> FsResult<String>;

    fn set_uuid(&self, uuid: &str) -> FsResult<()>;

    /// Read-only root of a committed revision. `NotFound` past youngest.
    fn revision_root(&self, rev: Revnum) -> FsResult<Box<dyn RootProvider>>;

    /// Start a transaction whose tree begins as a copy of `rev`.
    fn begin_txn(&self, rev: Revnum) -> FsResult<Box<dyn TxnProvider>>;

    /// Reopen an uncommitted transaction by name.
    fn open_txn(&self, name: &str) -> FsResult<Box<dyn TxnProvider>>;

    /// Discard an uncommitted transaction by name.
    fn purge_txn(&self, name: &str) -> FsResult<()>;

    /// Names of all uncommitted transactions.
    fn list_transactions(&self) -> FsResult<Vec<String>>;

    /// Re-encode storage of `rev`'s predecessors as deltas. Must not change
    /// any observable content.
    fn deltify(&self, rev: Revnum) -> FsResult<()>;
}

/// One uncommitted transaction.
pub trait TxnProvider: Send + Sync {
    fn name(&self) -> &str;

    /// The revision this transaction is based on. `None` once the
    /// transaction no longer has a base (after commit or abort).
    fn base_rev(&self) -> Option<Revnum>;

    /// Make the transaction a new revision.
    ///
    /// On a conflict with a concurrent commit, fails with `Conflict` naming
    /// the offending path; the transaction stays uncommitted.
    fn commit(&self) -> FsResult<Revnum>;

    /// Discard the transaction and everything it wrote.
    fn abort(&self) -> FsResult<()>;

    fn prop(&self, name: &str) -> FsResult<Option<Vec<u8>>>;

    fn proplist(&self) -> FsResult<PropList>;

    fn change_prop(&self, name: &str, value: Option<&[u8]>) -> FsResult<()>;

    /// A root over the transaction's mutable tree.
    fn root(&self) -> FsResult<Box<dyn RootProvider>>;
}

/// Read and write access to one tree: a committed revision or a
/// transaction. Every path argument is canonical.
pub trait RootProvider: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Paths changed by this root relative to its base, sorted.
    fn paths_changed(&self) -> FsResult<BTreeMap<String, PathChange>>;

    /// Kind of node at `path`; `NodeKind::None` if nothing is there.
    fn check_path(&self, path: &str) -> FsResult<NodeKind>;

    /// History cursor positioned at `path` in this (revision) root.
    fn node_history(&self, path: &str) -> FsResult<Box<dyn HistoryProvider>>;

    fn node_id(&self, path: &str) -> FsResult<NodeRevisionId>;

    /// Revision in which this node-revision was created; `None` while it is
    /// still part of an uncommitted transaction.
    fn node_created_rev(&self, path: &str) -> FsResult<Option<Revnum>>;

    /// Path at which this node-revision was created.
    fn node_created_path(&self, path: &str) -> FsResult<String>;

    /// Remove the node at `path` from its parent directory.
    fn delete_node(&self, path: &str) -> FsResult<()>;

    /// Copy source, if the node at `path` was created by a copy.
    fn copied_from(&self, path: &str) -> FsResult<Option<CopySource>>;

    fn node_prop(&self, path: &str, name: &str) -> FsResult<Option<Vec<u8>>>;

    fn node_proplist(&self, path: &str) -> FsResult<PropList>;

    fn change_node_prop(&self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()>;

    /// Whether the properties of the two nodes differ. Invoked on the first
    /// root's provider.
    fn props_changed(
        &self,
        root1: &dyn RootProvider,
        path1: &str,
        root2: &dyn RootProvider,
        path2: &str,
    ) -> FsResult<bool>;

    /// Whether the contents of the two files differ. Invoked on the first
    /// root's provider.
    fn contents_changed(
        &self,
        root1: &dyn RootProvider,
        path1: &str,
        root2: &dyn RootProvider,
        path2: &str,
    ) -> FsResult<bool>;

    /// Entries of the directory at `path`, keyed by name.
    fn dir_entries(&self, path: &str) -> FsResult<BTreeMap<String, DirEntry>>;

    fn make_dir(&self, path: &str) -> FsResult<()>;

    /// Copy `from_path` in `from_root` (a revision root) to `to_path` in
    /// `to_root` (a transaction root), recording copy history. Invoked on
    /// `to_root`'s provider.
    fn copy(
        &self,
        from_root: &dyn RootProvider,
        from_path: &str,
        to_root: &dyn RootProvider,
        to_path: &str,
    ) -> FsResult<()>;

    /// Make `path` in `to_root` refer to the very node-revision at `path`
    /// in `from_root`, without recording copy history. Invoked on
    /// `to_root`'s provider.
    fn revision_link(
        &self,
        from_root: &dyn RootProvider,
        to_root: &dyn RootProvider,
        path: &str,
    ) -> FsResult<()>;

    fn file_length(&self, path: &str) -> FsResult<u64>;

    fn file_checksum(&self, path: &str) -> FsResult<Checksum>;

    fn file_contents(&self, path: &str) -> FsResult<Box<dyn Read + Send>>;

    /// Create an empty file.
    fn make_file(&self, path: &str) -> FsResult<()>;

    /// Begin replacing the file's contents by delta against its current
    /// contents. `base_checksum`, when given, must match the current
    /// contents; `result_checksum`, when given, is verified on close.
    fn apply_textdelta(
        &self,
        path: &str,
        base_checksum: Option<&Checksum>,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<Box<dyn DeltaConsumer>>;

    /// Begin replacing the file's contents with a plain byte stream.
    fn apply_text(
        &self,
        path: &str,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<Box<dyn ContentWriter>>;

    /// Delta turning the source file (or the empty text, when `source` is
    /// `None`) into the target file. Invoked on the target root's provider.
    fn file_delta_stream(
        &self,
        source: Option<(&dyn RootProvider, &str)>,
        target_root: &dyn RootProvider,
        target_path: &str,
    ) -> FsResult<TextDeltaStream>;

    /// Three-way merge of the changes from `ancestor` to `source` into
    /// `target` (a transaction root). Fails with `Conflict` naming the first
    /// conflicting path. Invoked on the target root's provider.
    #[allow(clippy::too_many_arguments)]
    fn merge(
        &self,
        source_root: &dyn RootProvider,
        source_path: &str,
        target_root: &dyn RootProvider,
        target_path: &str,
        ancestor_root: &dyn RootProvider,
        ancestor_path: &str,
    ) -> FsResult<()>;
}

/// A position in a node's history.
pub trait HistoryProvider: Send + Sync {
    /// Step to the previous interesting location. `Ok(None)` when history
    /// is exhausted, or when `cross_copies` is false and the next step
    /// would cross a copy.
    fn prev(&self, cross_copies: bool) -> FsResult<Option<Box<dyn HistoryProvider>>>;

    /// The `(path, revision)` this cursor is positioned at.
    fn location(&self) -> (String, Revnum);
}

/// Receiver for the windows of [`RootProvider::apply_textdelta`].
///
/// Nothing becomes visible until [`DeltaConsumer::close`] succeeds; a
/// consumer dropped without closing leaves the file unchanged.
pub trait DeltaConsumer: Send {
    fn push(&mut self, window: &DeltaWindow) -> FsResult<()>;

    fn close(self: Box<Self>) -> FsResult<()>;
}

/// Byte sink returned by [`RootProvider::apply_text`]. Same visibility rule
/// as [`DeltaConsumer`].
pub trait ContentWriter: Write + Send {
    fn close(self: Box<Self>) -> FsResult<()>;
}
