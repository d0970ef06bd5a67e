//! File content writers for transaction roots.
//!
//! Both writers buffer the new text and install it in one step on close.
//! Dropping a writer without closing it leaves the file untouched.

use std::io::{self, Write};

use revfs_delta::{DeltaApplier, DeltaWindow};
use revfs_fs::{ContentWriter, DeltaConsumer, FsError, FsResult};
use revfs_types::Checksum;
use tracing::debug;

use crate::engine::DagFs;

/// Where a writer's text goes when it closes.
pub(crate) struct Target {
    pub fs: DagFs,
    pub txn: String,
    pub path: String,
    pub expected: Option<Checksum>,
}

impl Target {
    fn install(self, text: Vec<u8>) -> FsResult<()> {
        let actual = Checksum::of(&text);
        if let Some(expected) = self.expected {
            if expected != actual {
                return Err(FsError::ChecksumMismatch {
                    path: self.path,
                    expected,
                    actual,
                });
            }
        }
        let mut state = self.fs.lock()?;
        if state.txns.get(&self.txn).is_none() {
            return Err(FsError::invalid_state(format!(
                "transaction {} is no longer open",
                self.txn
            )));
        }
        state.set_contents(&self.txn, &self.path, text)?;
        debug!(txn = %self.txn, path = %self.path, checksum = %actual, "contents replaced");
        Ok(())
    }
}

/// Applies delta windows against the file's previous text.
pub struct DagDeltaConsumer {
    target: Target,
    applier: DeltaApplier,
}

impl DagDeltaConsumer {
    pub(crate) fn new(target: Target, base_text: Vec<u8>) -> Self {
        Self {
            target,
            applier: DeltaApplier::new(base_text),
        }
    }
}

impl DeltaConsumer for DagDeltaConsumer {
    fn push(&mut self, window: &DeltaWindow) -> FsResult<()> {
        self.applier.push(window)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> FsResult<()> {
        let this = *self;
        this.target.install(this.applier.finish())
    }
}

/// Collects a plain byte stream.
pub struct DagContentWriter {
    target: Target,
    buf: Vec<u8>,
}

impl DagContentWriter {
    pub(crate) fn new(target: Target) -> Self {
        Self {
            target,
            buf: Vec::new(),
        }
    }
}

impl Write for DagContentWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentWriter for DagContentWriter {
    fn close(self: Box<Self>) -> FsResult<()> {
        let this = *self;
        this.target.install(this.buf)
    }
}
