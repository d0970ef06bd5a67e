//! Provider-neutral core of the revfs versioned filesystem.
//!
//! revfs stores a tree of directories and files as an append-only sequence
//! of revisions. Changes are staged in transactions and become new
//! revisions on commit. This crate owns the part every storage backend
//! shares: the operation tables a provider implements, the registry that
//! finds providers by name, and the public handles that validate input and
//! dispatch to the bound provider.
//!
//! # Key Types
//!
//! - [`Registry`] -- providers by name; create/open/delete/hotcopy/recover
//! - [`Filesystem`] -- an open repository bound to one provider
//! - [`Transaction`] -- an uncommitted change set with an open/committed/aborted lifecycle
//! - [`Root`] -- a revision or transaction tree; all node operations
//! - [`History`] -- lazy backwards walk over a node's locations
//! - [`FsLibrary`], [`FsProvider`], [`TxnProvider`], [`RootProvider`],
//!   [`HistoryProvider`] -- what a provider implements
//! - [`replay`] / [`ReplayEditor`] -- drive an editor with a revision's changes
//!
//! # Dispatch Rules
//!
//! 1. Paths are canonicalized before reaching a provider.
//! 2. Writes through a revision root fail with `InvalidState`.
//! 3. A committed or aborted transaction rejects every operation.
//! 4. Multi-root operations run on the destination root's provider, or the
//!    first root's when there is no destination (see [`resolve`]).
//! 5. Provider errors are returned with operation context; nothing is retried.

pub mod config;
pub mod error;
pub mod fs;
pub mod history;
pub mod provider;
pub mod registry;
pub mod replay;
pub mod resolve;
pub mod root;
pub mod txn;
pub mod warning;

#[cfg(test)]
mod testing;

pub use config::FsConfig;
pub use error::{ErrorKind, FsError, FsResult};
pub use fs::Filesystem;
pub use history::{History, HistoryIter};
pub use provider::{
    ContentWriter, CopySource, DeltaConsumer, ErrCallFn, FsLibrary, FsProvider, HistoryProvider,
    OpenContext, RootProvider, TxnProvider,
};
pub use registry::{Registry, FS_TYPE_FILE};
pub use replay::{replay, ReplayEditor, TxnReplayEditor};
pub use resolve::MultiRootOp;
pub use root::{
    contents_changed, copy, file_delta_stream, merge, props_changed, revision_link, ContentSink,
    DeltaHandler, Root, RootKind,
};
pub use txn::{Transaction, TxnState};
pub use warning::{WarningFn, Warnings};

pub use revfs_types::{
    canonicalize_abspath, ChangeKind, Checksum, DirEntry, NodeKind, NodeRevisionId, PathChange,
    PropList, Revnum, PROP_REVISION_AUTHOR, PROP_REVISION_DATE, PROP_REVISION_LOG,
};
