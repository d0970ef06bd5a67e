//! Foundation types for revfs, the versioned filesystem layer.
//!
//! Every other revfs crate depends on `revfs-types`. Nothing in here talks
//! to storage: these are the values that flow across the provider boundary.
//!
//! # Key Types
//!
//! - [`NodeRevisionId`] — `node_id.copy_id.txn_id` identity of one node revision
//! - [`Revnum`] — revision number
//! - [`canonicalize_abspath`] — repository path canonicalizer
//! - [`NodeKind`], [`ChangeKind`], [`PathChange`], [`DirEntry`] — tree vocabulary
//! - [`Checksum`] — BLAKE3 content digest

pub mod checksum;
pub mod error;
pub mod id;
pub mod kind;
pub mod path;
pub mod revision;

use std::collections::BTreeMap;

pub use checksum::{Checksum, ChecksumBuilder};
pub use error::TypeError;
pub use id::NodeRevisionId;
pub use kind::{ChangeKind, DirEntry, NodeKind, PathChange};
pub use path::{basename, canonicalize_abspath, components, dirname, is_ancestor, join, relative_to};
pub use revision::Revnum;

/// Node or revision property list: name to opaque byte value.
///
/// An absent key and a key with an empty value are different things.
pub type PropList = BTreeMap<String, Vec<u8>>;

/// Revision property: commit time, RFC 3339 in UTC.
pub const PROP_REVISION_DATE: &str = "revfs:date";
/// Revision property: log message.
pub const PROP_REVISION_LOG: &str = "revfs:log";
/// Revision property: committing user.
pub const PROP_REVISION_AUTHOR: &str = "revfs:author";
