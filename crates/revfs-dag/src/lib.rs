//! Node-revision DAG engine behind the built-in revfs providers.
//!
//! A repository is a sequence of revisions, each naming a root directory
//! node-revision. Node-revisions are immutable once committed; a
//! transaction clones the nodes on the path to anything it changes and
//! shares everything else with its base revision.
//!
//! The engine is storage-agnostic: committed changes flow through a
//! [`Persistence`] implementation before they become visible, which is all
//! a provider has to supply.
//!
//! # Key Types
//!
//! - [`DagFs`] — engine handle, implements [`revfs_fs::FsProvider`]
//! - [`DagState`] — committed revisions plus live transactions
//! - [`DagChange`] — one durable change (commit, revprop, uuid, deltify)
//! - [`Persistence`] — where changes are recorded; [`Volatile`] keeps nothing
//! - [`NodeRevision`], [`Representation`] — stored tree and file contents
//!
//! # Design Rules
//!
//! 1. Committed node-revisions and representations are never modified,
//!    except that deltification may re-encode a representation's body.
//! 2. Node ids are `node.copy.txn`; the `txn` part is the transaction that
//!    created the node-revision and stays after commit.
//! 3. A commit is recorded with persistence before it is applied.

pub mod content;
pub mod engine;
pub mod history;
pub mod merge;
pub mod node;
pub mod root;
pub mod state;
pub mod tree;
pub mod txn;

pub use engine::{timestamp, DagFs, Persistence, Volatile, WeakDagFs};
pub use history::DagHistory;
pub use node::{NodeData, NodeRevision, RepBody, RepKey, Representation};
pub use root::DagRoot;
pub use state::{CommitRecord, Counters, DagChange, DagState, RevisionRecord, TxnRecord, PROP_DATE};
pub use txn::DagTxn;
