//! Write-ahead persistence for the DAG engine.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use revfs_dag::{DagChange, DagState, Persistence};
use revfs_fs::{ErrCallFn, FsError, FsResult, Warnings};
use tracing::{debug, error, info};

use crate::error::JournalResult;
use crate::segment::SegmentWriter;
use crate::store::write_snapshot;

/// Component name handed to the error callback.
pub const COMPONENT: &str = "journal";

/// Settings read from the filesystem configuration at open time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JournalOptions {
    /// `journal.fsync`: sync every record to the device.
    pub fsync: bool,
    /// `journal.segment-records`: records per segment before a checkpoint.
    pub segment_records: u64,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            fsync: true,
            segment_records: 64,
        }
    }
}

impl JournalOptions {
    pub fn from_config(config: &revfs_fs::FsConfig) -> FsResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            fsync: config.get_bool("journal.fsync", defaults.fsync)?,
            segment_records: config
                .get_u64("journal.segment-records", defaults.segment_records)?
                .max(1),
        })
    }
}

struct Active {
    segment: SegmentWriter,
    first_live: u64,
}

/// Appends every engine change to the active log segment, and folds the
/// log into a fresh snapshot once a segment is full.
///
/// Segments before the snapshot's first live segment are no longer needed
/// and are left on disk for the administrator (see `logfiles`).
pub struct Journal {
    dir: PathBuf,
    options: JournalOptions,
    active: Mutex<Active>,
    errcall: RwLock<Option<ErrCallFn>>,
    warnings: Warnings,
}

impl Journal {
    pub(crate) fn new(
        dir: &Path,
        options: JournalOptions,
        segment: SegmentWriter,
        first_live: u64,
        warnings: Warnings,
    ) -> Self {
        Self {
            dir: dir.to_path_buf(),
            options,
            active: Mutex::new(Active {
                segment,
                first_live,
            }),
            errcall: RwLock::new(None),
            warnings,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> JournalOptions {
        self.options
    }

    fn active(&self) -> FsResult<MutexGuard<'_, Active>> {
        self.active
            .lock()
            .map_err(|_| FsError::Corrupt("journal writer lock poisoned".into()))
    }

    /// Sequence number of the oldest segment still needed.
    pub fn first_live_segment(&self) -> FsResult<u64> {
        Ok(self.active()?.first_live)
    }

    pub fn active_segment(&self) -> FsResult<u64> {
        Ok(self.active()?.segment.seq())
    }

    pub fn set_errcall(&self, handler: ErrCallFn) {
        *self.errcall.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Pass a storage failure to the error callback, then hand it back.
    fn report(&self, err: FsError) -> FsError {
        let handler = self
            .errcall
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(f) => f(COMPONENT, &err.to_string()),
            None => error!(dir = %self.dir.display(), error = %err, "journal failure"),
        }
        err
    }

    /// Open segment `next`, then point the snapshot at it. A crash between
    /// the two leaves an empty segment that replay skips over.
    fn roll(&self, next: u64, state: &DagState) -> JournalResult<SegmentWriter> {
        let writer = SegmentWriter::open(&self.dir, next, 0)?;
        write_snapshot(&self.dir, next, state)?;
        Ok(writer)
    }

    /// Write a snapshot of `state` and start a new segment after the
    /// active one.
    pub fn checkpoint(&self, state: &DagState) -> FsResult<()> {
        let mut active = self.active()?;
        let next = active.segment.seq() + 1;
        let writer = self
            .roll(next, state)
            .map_err(|e| self.report(e.into()))?;
        active.segment = writer;
        active.first_live = next;
        info!(dir = %self.dir.display(), first_live = next, rev = %state.youngest(), "journal checkpoint");
        Ok(())
    }
}

impl Persistence for Journal {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn record(&self, change: &DagChange) -> FsResult<()> {
        let payload = bincode::serialize(change)
            .map_err(|e| self.report(FsError::Serialization(e.to_string())))?;
        let mut active = self.active()?;
        active
            .segment
            .append(&payload, self.options.fsync)
            .map_err(|e| self.report(e.into()))
    }

    fn applied(&self, state: &DagState) {
        let due = match self.active() {
            Ok(active) => active.segment.records() >= self.options.segment_records,
            Err(_) => false,
        };
        if !due {
            return;
        }
        debug!(dir = %self.dir.display(), "segment full");
        if let Err(e) = self.checkpoint(state) {
            self.warnings.emit(&e);
        }
    }
}
