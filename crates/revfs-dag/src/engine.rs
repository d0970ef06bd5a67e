//! The shared engine handle and its persistence seam.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{SecondsFormat, Utc};
use revfs_fs::{FsError, FsProvider, FsResult, RootProvider, TxnProvider};
use revfs_types::{PropList, Revnum};
use tracing::{debug, info};
use uuid::Uuid;

use crate::root::DagRoot;
use crate::state::{DagChange, DagState};
use crate::txn::DagTxn;

/// Where committed changes go before they become visible.
///
/// # Invariants
///
/// - [`Persistence::record`] is called with the engine lock held, once per
///   change, in commit order.
/// - A change is applied to the live state only after `record` succeeded.
pub trait Persistence: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Make `change` durable.
    fn record(&self, change: &DagChange) -> FsResult<()>;

    /// Called after a recorded change has been applied to `state`.
    fn applied(&self, _state: &DagState) {}
}

/// Keeps nothing. Committed state lives as long as the engine.
#[derive(Debug, Default)]
pub struct Volatile;

impl Persistence for Volatile {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn record(&self, _change: &DagChange) -> FsResult<()> {
        Ok(())
    }
}

/// A node-revision DAG filesystem. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DagFs {
    inner: Arc<DagInner>,
}

/// Non-owning reference to a [`DagFs`].
#[derive(Clone)]
pub struct WeakDagFs(Weak<DagInner>);

impl WeakDagFs {
    pub fn upgrade(&self) -> Option<DagFs> {
        self.0.upgrade().map(|inner| DagFs { inner })
    }
}

struct DagInner {
    provider: &'static str,
    state: Mutex<DagState>,
    persistence: Box<dyn Persistence>,
}

/// Current time as stored in the date revision property.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl DagFs {
    pub fn new(provider: &'static str, state: DagState, persistence: Box<dyn Persistence>) -> Self {
        Self {
            inner: Arc::new(DagInner {
                provider,
                state: Mutex::new(state),
                persistence,
            }),
        }
    }

    /// State for a brand-new repository with a fresh UUID.
    pub fn initial_state() -> DagState {
        DagState::new(Uuid::now_v7().to_string(), timestamp())
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.provider
    }

    pub fn persistence(&self) -> &dyn Persistence {
        self.inner.persistence.as_ref()
    }

    /// Returns `true` if both handles share one engine.
    pub fn same_engine(&self, other: &DagFs) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakDagFs {
        WeakDagFs(Arc::downgrade(&self.inner))
    }

    pub(crate) fn lock(&self) -> FsResult<MutexGuard<'_, DagState>> {
        self.inner
            .state
            .lock()
            .map_err(|_| FsError::Corrupt("engine state lock poisoned".into()))
    }

    /// Run `f` against the state with writers excluded.
    pub fn with_state<T>(&self, f: impl FnOnce(&DagState) -> FsResult<T>) -> FsResult<T> {
        let state = self.lock()?;
        f(&state)
    }

    /// A copy of the committed state.
    pub fn snapshot(&self) -> FsResult<DagState> {
        self.with_state(|state| Ok(state.committed()))
    }

    fn record(&self, state: &mut DagState, change: DagChange) -> FsResult<()> {
        self.inner.persistence.record(&change)?;
        state.apply(change)?;
        self.inner.persistence.applied(state);
        Ok(())
    }

    /// Commit the named transaction, merging in revisions committed since
    /// its base. A conflict leaves the transaction as it was.
    pub(crate) fn commit_txn(&self, name: &str) -> FsResult<Revnum> {
        let mut state = self.lock()?;
        let youngest = state.youngest();
        let base = state.txn(name)?.base_rev;
        if base != youngest {
            let backup = state.txn(name)?.clone();
            let source = state.revision_root(youngest)?;
            let ancestor = state.revision_root(base)?;
            if let Err(e) = state.merge_into(name, "/", &source, &ancestor) {
                debug!(txn = name, %base, %youngest, error = %e, "commit merge failed");
                state.txns.insert(name.to_string(), backup);
                return Err(e);
            }
            state.txn_mut(name)?.base_rev = youngest;
        }

        let record = state.prepare_commit(name, &timestamp())?;
        let rev = record.rev;
        let changed = record.changes.len();
        self.record(&mut state, DagChange::Commit(record))?;
        state.finish_txn(name);
        info!(provider = self.inner.provider, txn = name, %rev, changed, "committed");
        Ok(rev)
    }

    pub(crate) fn remove_txn(&self, name: &str) -> FsResult<bool> {
        Ok(self.lock()?.finish_txn(name))
    }
}

impl FsProvider for DagFs {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn youngest_rev(&self) -> FsResult<Revnum> {
        Ok(self.lock()?.youngest())
    }

    fn revision_prop(&self, rev: Revnum, name: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.lock()?.revision(rev)?.props.get(name).cloned())
    }

    fn revision_proplist(&self, rev: Revnum) -> FsResult<PropList> {
        Ok(self.lock()?.revision(rev)?.props.clone())
    }

    fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        let mut state = self.lock()?;
        state.revision(rev)?;
        let change = DagChange::RevProp {
            rev,
            name: name.to_string(),
            value: value.map(<[u8]>::to_vec),
        };
        self.record(&mut state, change)
    }

    fn uuid(&self) -> FsResult<String> {
        Ok(self.lock()?.uuid.clone())
    }

    fn set_uuid(&self, uuid: &str) -> FsResult<()> {
        let mut state = self.lock()?;
        self.record(&mut state, DagChange::Uuid(uuid.to_string()))
    }

    fn revision_root(&self, rev: Revnum) -> FsResult<Box<dyn RootProvider>> {
        let root = self.lock()?.revision_root(rev)?;
        Ok(Box::new(DagRoot::revision(self.clone(), rev, root)))
    }

    fn begin_txn(&self, rev: Revnum) -> FsResult<Box<dyn TxnProvider>> {
        let name = self.lock()?.begin_txn(rev)?;
        debug!(provider = self.inner.provider, txn = %name, base = %rev, "began transaction");
        Ok(Box::new(DagTxn::new(self.clone(), name)))
    }

    fn open_txn(&self, name: &str) -> FsResult<Box<dyn TxnProvider>> {
        self.lock()?.txn(name)?;
        Ok(Box::new(DagTxn::new(self.clone(), name.to_string())))
    }

    fn purge_txn(&self, name: &str) -> FsResult<()> {
        if self.lock()?.purge_txn(name) {
            Ok(())
        } else {
            Err(FsError::not_found(format!("transaction {name}")))
        }
    }

    fn list_transactions(&self) -> FsResult<Vec<String>> {
        Ok(self.lock()?.txns.keys().cloned().collect())
    }

    fn deltify(&self, rev: Revnum) -> FsResult<()> {
        let mut state = self.lock()?;
        let planned = state.plan_deltify(rev)?;
        let count = planned.len();
        for change in planned {
            self.record(&mut state, change)?;
        }
        if count > 0 {
            info!(provider = self.inner.provider, %rev, reps = count, "deltified");
        }
        Ok(())
    }
}

impl std::fmt::Debug for DagFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagFs")
            .field("provider", &self.inner.provider)
            .finish_non_exhaustive()
    }
}
