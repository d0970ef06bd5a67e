//! revfs: a versioned filesystem with pluggable storage providers.
//!
//! This is the entry point for applications embedding revfs. It re-exports
//! the provider-neutral API from `revfs-fs` and wires up the built-in
//! providers.
//!
//! ```no_run
//! use std::path::Path;
//! use revfs::{default_registry, FsConfig, Revnum};
//!
//! # fn main() -> revfs::FsResult<()> {
//! let registry = default_registry();
//! let fs = registry.create("journal", Path::new("/srv/repo"), &FsConfig::new())?;
//! let mut txn = fs.begin_txn(Revnum::ZERO)?;
//! let root = txn.root()?;
//! root.make_dir("/trunk")?;
//! root.make_file("/trunk/README")?;
//! root.write_file("/trunk/README", b"hello\n")?;
//! let rev = txn.commit()?;
//! assert_eq!(rev, Revnum::new(1));
//! # Ok(())
//! # }
//! ```
//!
//! # Providers
//!
//! - `memory` ([`MemoryLibrary`]) — repositories held by the library itself;
//!   gone when the registry is dropped
//! - `journal` ([`JournalLibrary`]) — on-disk snapshot plus write-ahead log,
//!   with recovery and log-file maintenance

use std::sync::Arc;

pub use revfs_delta::{
    apply_delta, compute_delta, DeltaApplier, DeltaError, DeltaOp, DeltaWindow, TextDeltaStream,
    WINDOW_SIZE,
};
pub use revfs_fs::*;
pub use revfs_journal::{JournalLibrary, JournalOptions};
pub use revfs_memory::MemoryLibrary;
pub use revfs_types::{basename, components, dirname, is_ancestor, join, relative_to};

#[cfg(test)]
mod conformance;

/// Names of the built-in providers, in registration order.
pub const BUILTIN_PROVIDERS: [&str; 2] = [revfs_memory::PROVIDER, revfs_journal::PROVIDER];

/// A registry with every built-in provider registered.
///
/// Each call returns independent libraries: in-memory repositories created
/// through one registry are invisible to another.
pub fn default_registry() -> Registry {
    Registry::new()
        .with(Arc::new(MemoryLibrary::new()))
        .with(Arc::new(JournalLibrary::new()))
}
