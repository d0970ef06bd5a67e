use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use revfs_types::{PropList, Revnum};
use tracing::{debug, info};

use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::provider::{ErrCallFn, FsLibrary, FsProvider};
use crate::root::{Root, RootKind};
use crate::txn::Transaction;
use crate::warning::{WarningFn, Warnings};

/// An open repository bound to one provider.
///
/// Cheap to clone; clones share the provider instance, configuration, and
/// warning sink. Every transaction and root keeps its filesystem alive.
#[derive(Clone)]
pub struct Filesystem {
    inner: Arc<FsInner>,
}

struct FsInner {
    path: PathBuf,
    config: FsConfig,
    warnings: Warnings,
    library: Arc<dyn FsLibrary>,
    provider: Box<dyn FsProvider>,
}

impl Filesystem {
    pub(crate) fn new(
        path: PathBuf,
        config: FsConfig,
        warnings: Warnings,
        library: Arc<dyn FsLibrary>,
        provider: Box<dyn FsProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(FsInner {
                path,
                config,
                warnings,
                library,
                provider,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Name of the provider this filesystem is bound to.
    pub fn provider_name(&self) -> &'static str {
        self.inner.library.name()
    }

    pub fn config(&self) -> &FsConfig {
        &self.inner.config
    }

    /// Whether two handles refer to the same open filesystem.
    pub fn same_as(&self, other: &Filesystem) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Install the callback that receives provider warnings.
    pub fn set_warning_func(&self, f: WarningFn) {
        self.inner.warnings.set(f);
    }

    pub fn clear_warning_func(&self) {
        self.inner.warnings.clear();
    }

    /// Route storage-level error messages to `handler`.
    pub fn set_errcall(&self, handler: ErrCallFn) -> FsResult<()> {
        self.inner
            .library
            .set_errcall(self.inner.provider.as_ref(), handler)
    }

    pub fn youngest_rev(&self) -> FsResult<Revnum> {
        self.inner
            .provider
            .youngest_rev()
            .map_err(|e| e.context("youngest_rev", self.inner.path.display().to_string()))
    }

    pub fn revision_prop(&self, rev: Revnum, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.inner
            .provider
            .revision_prop(rev, name)
            .map_err(|e| e.context("revision_prop", format!("r{rev} {name}")))
    }

    pub fn revision_proplist(&self, rev: Revnum) -> FsResult<PropList> {
        self.inner
            .provider
            .revision_proplist(rev)
            .map_err(|e| e.context("revision_proplist", format!("r{rev}")))
    }

    /// Set or delete (`None`) a revision property.
    pub fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        debug!(rev = rev.get(), name, delete = value.is_none(), "change revision property");
        self.inner
            .provider
            .change_rev_prop(rev, name, value)
            .map_err(|e| e.context("change_rev_prop", format!("r{rev} {name}")))
    }

    pub fn uuid(&self) -> FsResult<String> {
        self.inner
            .provider
            .uuid()
            .map_err(|e| e.context("uuid", self.inner.path.display().to_string()))
    }

    pub fn set_uuid(&self, uuid: &str) -> FsResult<()> {
        if uuid.is_empty() {
            return Err(FsError::Malformed("repository uuid must not be empty".into()));
        }
        self.inner
            .provider
            .set_uuid(uuid)
            .map_err(|e| e.context("set_uuid", uuid.to_string()))
    }

    /// Read-only root of revision `rev`.
    pub fn revision_root(&self, rev: Revnum) -> FsResult<Root> {
        let provider = self
            .inner
            .provider
            .revision_root(rev)
            .map_err(|e| e.context("revision_root", format!("r{rev}")))?;
        Ok(Root::new(self.clone(), RootKind::Revision(rev), provider))
    }

    /// Start a transaction based on revision `rev`.
    pub fn begin_txn(&self, rev: Revnum) -> FsResult<Transaction> {
        let provider = self
            .inner
            .provider
            .begin_txn(rev)
            .map_err(|e| e.context("begin_txn", format!("r{rev}")))?;
        info!(txn = provider.name(), base = rev.get(), "began transaction");
        Ok(Transaction::new(self.clone(), provider))
    }

    pub fn open_txn(&self, name: &str) -> FsResult<Transaction> {
        let provider = self
            .inner
            .provider
            .open_txn(name)
            .map_err(|e| e.context("open_txn", name.to_string()))?;
        Ok(Transaction::new(self.clone(), provider))
    }

    pub fn purge_txn(&self, name: &str) -> FsResult<()> {
        info!(txn = name, "purging transaction");
        self.inner
            .provider
            .purge_txn(name)
            .map_err(|e| e.context("purge_txn", name.to_string()))
    }

    pub fn list_transactions(&self) -> FsResult<Vec<String>> {
        self.inner
            .provider
            .list_transactions()
            .map_err(|e| e.context("list_transactions", self.inner.path.display().to_string()))
    }

    /// Ask the provider to store `rev`'s predecessors as deltas.
    pub fn deltify(&self, rev: Revnum) -> FsResult<()> {
        self.inner
            .provider
            .deltify(rev)
            .map_err(|e| e.context("deltify", format!("r{rev}")))
    }

    /// The bound provider, for providers that need to recognise their own
    /// objects.
    pub fn provider(&self) -> &dyn FsProvider {
        self.inner.provider.as_ref()
    }
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem")
            .field("path", &self.inner.path)
            .field("provider", &self.provider_name())
            .finish()
    }
}
