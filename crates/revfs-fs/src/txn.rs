use std::fmt;

use revfs_types::{PropList, Revnum};
use tracing::{info, warn};

use crate::error::{ErrorKind, FsError, FsResult};
use crate::fs::Filesystem;
use crate::provider::TxnProvider;
use crate::root::{Root, RootKind};

/// Lifecycle of a [`Transaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnState {
    Open,
    Committed(Revnum),
    Aborted,
}

/// An uncommitted change set.
///
/// Once committed or aborted, every further operation fails with
/// `InvalidState`. A failed commit (including a conflict) leaves the
/// transaction open so the caller can resolve and retry, or abort.
pub struct Transaction {
    fs: Filesystem,
    name: String,
    provider: Box<dyn TxnProvider>,
    state: TxnState,
}

impl Transaction {
    pub(crate) fn new(fs: Filesystem, provider: Box<dyn TxnProvider>) -> Self {
        Self {
            fs,
            name: provider.name().to_string(),
            provider,
            state: TxnState::Open,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fs(&self) -> &Filesystem {
        &self.fs
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// The revision this transaction is based on; `None` once finished.
    pub fn base_rev(&self) -> Option<Revnum> {
        match self.state {
            TxnState::Open => self.provider.base_rev(),
            _ => None,
        }
    }

    fn ensure_open(&self, op: &str) -> FsResult<()> {
        match self.state {
            TxnState::Open => Ok(()),
            TxnState::Committed(rev) => Err(FsError::invalid_state(format!(
                "{op}: transaction {} already committed as r{rev}",
                self.name
            ))),
            TxnState::Aborted => Err(FsError::invalid_state(format!(
                "{op}: transaction {} was aborted",
                self.name
            ))),
        }
    }

    /// Commit, returning the new revision.
    pub fn commit(&mut self) -> FsResult<Revnum> {
        self.ensure_open("commit")?;
        match self.provider.commit() {
            Ok(rev) => {
                info!(txn = %self.name, rev = rev.get(), "committed transaction");
                self.state = TxnState::Committed(rev);
                Ok(rev)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Conflict {
                    warn!(txn = %self.name, path = e.conflict_path(), "commit conflict");
                }
                Err(e.context("commit", self.name.clone()))
            }
        }
    }

    /// Discard the transaction.
    pub fn abort(&mut self) -> FsResult<()> {
        self.ensure_open("abort")?;
        self.provider
            .abort()
            .map_err(|e| e.context("abort", self.name.clone()))?;
        info!(txn = %self.name, "aborted transaction");
        self.state = TxnState::Aborted;
        Ok(())
    }

    pub fn prop(&self, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.ensure_open("prop")?;
        self.provider
            .prop(name)
            .map_err(|e| e.context("prop", format!("{} {name}", self.name)))
    }

    pub fn proplist(&self) -> FsResult<PropList> {
        self.ensure_open("proplist")?;
        self.provider
            .proplist()
            .map_err(|e| e.context("proplist", self.name.clone()))
    }

    /// Set or delete (`None`) a transaction property.
    pub fn change_prop(&self, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.ensure_open("change_prop")?;
        self.provider
            .change_prop(name, value)
            .map_err(|e| e.context("change_prop", format!("{} {name}", self.name)))
    }

    /// Root over this transaction's tree.
    pub fn root(&self) -> FsResult<Root> {
        self.ensure_open("root")?;
        let provider = self
            .provider
            .root()
            .map_err(|e| e.context("txn_root", self.name.clone()))?;
        Ok(Root::new(
            self.fs.clone(),
            RootKind::Transaction(self.name.clone()),
            provider,
        ))
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
