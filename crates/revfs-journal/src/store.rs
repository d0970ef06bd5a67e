//! The fixed files of a journal repository: `format` and `snapshot`.

use std::fs;
use std::io::Write;
use std::path::Path;

use revfs_dag::DagState;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{JournalError, JournalResult};
use crate::segment::{decode_frame, encode_frame};

pub const FORMAT_FILE: &str = "format";
pub const SNAPSHOT_FILE: &str = "snapshot";

/// Layout version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Contents of the `format` file (JSON).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub version: u32,
    pub created: String,
}

impl FormatInfo {
    pub fn current() -> Self {
        Self {
            version: FORMAT_VERSION,
            created: revfs_dag::timestamp(),
        }
    }
}

pub fn is_repository(dir: &Path) -> bool {
    dir.join(FORMAT_FILE).is_file()
}

pub fn write_format(dir: &Path, info: &FormatInfo) -> JournalResult<()> {
    let json = serde_json::to_vec_pretty(info)?;
    write_atomic(dir, FORMAT_FILE, &json)
}

pub fn read_format(dir: &Path) -> JournalResult<FormatInfo> {
    let info: FormatInfo = serde_json::from_slice(&fs::read(dir.join(FORMAT_FILE))?)?;
    if info.version != FORMAT_VERSION {
        return Err(JournalError::Format(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            info.version
        )));
    }
    Ok(info)
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    first_live_segment: u64,
    state: &'a DagState,
}

/// A checkpoint: committed state plus the first segment not folded into it.
#[derive(Debug, Deserialize)]
pub struct Snapshot {
    pub first_live_segment: u64,
    pub state: DagState,
}

pub fn write_snapshot(dir: &Path, first_live_segment: u64, state: &DagState) -> JournalResult<()> {
    let payload = bincode::serialize(&SnapshotRef {
        first_live_segment,
        state,
    })?;
    write_atomic(dir, SNAPSHOT_FILE, &encode_frame(&payload))
}

pub fn read_snapshot(dir: &Path) -> JournalResult<Snapshot> {
    let path = dir.join(SNAPSHOT_FILE);
    let payload = decode_frame(&fs::read(&path)?, &path)?;
    Ok(bincode::deserialize(&payload)?)
}

/// Replace `dir/name` with `data` so readers see the old or the new file,
/// never a mix.
fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> JournalResult<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}
