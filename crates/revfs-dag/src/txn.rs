use revfs_fs::{FsResult, RootProvider, TxnProvider};
use revfs_types::{PropList, Revnum};
use tracing::debug;

use crate::engine::DagFs;
use crate::root::DagRoot;

/// Handle on a transaction inside a [`DagFs`]. The transaction itself lives
/// in the engine, so several handles may name the same one.
pub struct DagTxn {
    fs: DagFs,
    name: String,
}

impl DagTxn {
    pub(crate) fn new(fs: DagFs, name: String) -> Self {
        Self { fs, name }
    }
}

impl TxnProvider for DagTxn {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_rev(&self) -> Option<Revnum> {
        let state = self.fs.lock().ok()?;
        state.txn(&self.name).ok().map(|t| t.base_rev)
    }

    fn commit(&self) -> FsResult<Revnum> {
        self.fs.commit_txn(&self.name)
    }

    fn abort(&self) -> FsResult<()> {
        if !self.fs.remove_txn(&self.name)? {
            debug!(txn = %self.name, "abort of a transaction that is already gone");
        }
        Ok(())
    }

    fn prop(&self, name: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.fs.lock()?.txn(&self.name)?.props.get(name).cloned())
    }

    fn proplist(&self) -> FsResult<PropList> {
        Ok(self.fs.lock()?.txn(&self.name)?.props.clone())
    }

    fn change_prop(&self, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        let mut state = self.fs.lock()?;
        let props = &mut state.txn_mut(&self.name)?.props;
        match value {
            Some(v) => {
                props.insert(name.to_string(), v.to_vec());
            }
            None => {
                props.remove(name);
            }
        }
        Ok(())
    }

    fn root(&self) -> FsResult<Box<dyn RootProvider>> {
        self.fs.lock()?.txn(&self.name)?;
        Ok(Box::new(DagRoot::txn(self.fs.clone(), self.name.clone())))
    }
}
