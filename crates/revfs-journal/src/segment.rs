//! Log segments: append-only files of framed records.
//!
//! On-disk frame:
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload]
//! ```
//! Segments are named `log.NNNNNNNNNN` with a zero-padded sequence number.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{JournalError, JournalResult};

/// Frame header size: 4 bytes length + 4 bytes CRC.
pub const HEADER_SIZE: usize = 8;

const SEGMENT_PREFIX: &str = "log.";

pub fn segment_name(seq: u64) -> String {
    format!("{SEGMENT_PREFIX}{seq:010}")
}

/// Sequence number of a segment file name, if it is one.
pub fn parse_segment_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(SEGMENT_PREFIX)?;
    if digits.len() != 10 {
        return None;
    }
    digits.parse().ok()
}

/// Sequence numbers of the segments in `dir`, ascending.
pub fn list_segments(dir: &Path) -> JournalResult<Vec<u64>> {
    let mut seqs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(seq) = entry.file_name().to_str().and_then(parse_segment_name) {
            seqs.push(seq);
        }
    }
    seqs.sort_unstable();
    Ok(seqs)
}

/// Frame one payload.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Unframe a buffer that must hold exactly one frame.
pub fn decode_frame(data: &[u8], origin: &Path) -> JournalResult<Vec<u8>> {
    let scan = scan_bytes(data, origin)?;
    match (scan.torn, scan.records.len()) {
        (None, 1) => Ok(scan.records.into_iter().next().unwrap_or_default()),
        (Some(offset), _) => Err(JournalError::TornRecord {
            segment: origin.to_path_buf(),
            offset,
        }),
        (None, n) => Err(JournalError::Format(format!(
            "{} holds {n} frames, expected one",
            origin.display()
        ))),
    }
}

/// Result of reading a segment front to back.
#[derive(Debug, Default)]
pub struct SegmentScan {
    pub records: Vec<Vec<u8>>,
    /// Length of the prefix made of complete, valid frames.
    pub valid_len: u64,
    /// Offset of a partial trailing frame, if any.
    pub torn: Option<u64>,
}

pub fn scan_segment(path: &Path) -> JournalResult<SegmentScan> {
    let data = fs::read(path)?;
    scan_bytes(&data, path)
}

/// Split `data` into frames.
///
/// A short or checksum-failing frame at the very end is a torn write and is
/// reported through [`SegmentScan::torn`]. A checksum failure anywhere else
/// is corruption.
fn scan_bytes(data: &[u8], origin: &Path) -> JournalResult<SegmentScan> {
    let mut scan = SegmentScan::default();
    let mut offset = 0usize;
    while offset < data.len() {
        let rest = &data[offset..];
        if rest.len() < HEADER_SIZE {
            scan.torn = Some(offset as u64);
            break;
        }
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let crc = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let end = HEADER_SIZE + len;
        if rest.len() < end {
            scan.torn = Some(offset as u64);
            break;
        }
        let payload = &rest[HEADER_SIZE..end];
        if crc32fast::hash(payload) != crc {
            if offset + end == data.len() {
                warn!(segment = %origin.display(), offset, "checksum failure in final frame");
                scan.torn = Some(offset as u64);
                break;
            }
            return Err(JournalError::BadChecksum {
                segment: origin.to_path_buf(),
                offset: offset as u64,
            });
        }
        scan.records.push(payload.to_vec());
        offset += end;
    }
    scan.valid_len = offset as u64;
    Ok(scan)
}

/// Storage under a [`SegmentWriter`]: an append-only file in practice.
pub trait SegmentFile: Write + Send {
    fn sync(&self) -> io::Result<()>;

    /// Cut the file back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl SegmentFile for File {
    fn sync(&self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Appender for the active segment.
///
/// Frames go to the file in one unbuffered write. A failed append is cut
/// back out of the file before the error is returned, so the segment only
/// ever holds frames whose append succeeded.
pub struct SegmentWriter {
    seq: u64,
    path: PathBuf,
    file: Box<dyn SegmentFile>,
    records: u64,
    len: u64,
    /// Set when a failed append could not be cut back out.
    wedged: bool,
}

impl SegmentWriter {
    /// Open segment `seq` in `dir` for appending, creating it if needed.
    /// `records` is the number of frames already in it.
    pub fn open(dir: &Path, seq: u64, records: u64) -> JournalResult<Self> {
        let path = dir.join(segment_name(seq));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self::with_file(path, seq, Box::new(file), records, len))
    }

    pub(crate) fn with_file(
        path: PathBuf,
        seq: u64,
        file: Box<dyn SegmentFile>,
        records: u64,
        len: u64,
    ) -> Self {
        Self {
            seq,
            path,
            file,
            records,
            len,
            wedged: false,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one framed payload and flush it to the OS; with `fsync`, to
    /// the device.
    pub fn append(&mut self, payload: &[u8], fsync: bool) -> JournalResult<()> {
        if self.wedged {
            return Err(JournalError::Wedged {
                segment: self.path.clone(),
            });
        }
        let frame = encode_frame(payload);
        if let Err(e) = self.write_frame(&frame, fsync) {
            if let Err(undo) = self.file.truncate(self.len) {
                warn!(segment = self.seq, error = %undo, "could not cut back failed append");
                self.wedged = true;
            }
            return Err(e.into());
        }
        self.len += frame.len() as u64;
        self.records += 1;
        debug!(segment = self.seq, len = payload.len(), "journal append");
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8], fsync: bool) -> io::Result<()> {
        self.file.write_all(frame)?;
        self.file.flush()?;
        if fsync {
            self.file.sync()?;
        }
        Ok(())
    }
}
