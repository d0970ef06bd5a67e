//! The `journal` provider: durable repositories in a directory.
//!
//! A repository directory holds:
//!
//! - `format` — JSON layout version; written last at creation
//! - `snapshot` — checksummed bincode image of the committed state, plus the
//!   first log segment not folded into it
//! - `log.NNNNNNNNNN` — append-only segments of framed, CRC-checked changes
//!
//! Every commit, revision-property change, UUID change, and deltification
//! is appended to the active segment before it becomes visible. Opening a
//! repository loads the snapshot and replays the live segments. When a
//! segment fills up the state is checkpointed into a new snapshot and the
//! older segments become unused; `logfiles` lists them and `recover`
//! repairs a log that ends in a torn record.
//!
//! # Configuration
//!
//! - `journal.fsync` — sync each record to the device (default `true`)
//! - `journal.segment-records` — records per segment (default 64)

pub mod error;
pub mod journal;
pub mod library;
pub mod segment;
pub mod store;

pub use error::{JournalError, JournalResult};
pub use journal::{Journal, JournalOptions};
pub use library::{JournalLibrary, PROVIDER};
