use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{DeltaError, DeltaResult};

/// Maximum number of target bytes a single window produces.
pub const WINDOW_SIZE: usize = 64 * 1024;

/// One instruction of a delta window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOp {
    /// Copy `len` bytes starting at `offset` within the window's source view.
    Source { offset: u64, len: u64 },
    /// Copy `len` bytes starting at `offset` within the target bytes this
    /// window has produced so far. The ranges may overlap (run-length copies).
    Target { offset: u64, len: u64 },
    /// Copy `len` bytes starting at `offset` within the window's new data.
    New { offset: u64, len: u64 },
}

impl DeltaOp {
    /// Number of target bytes this instruction produces.
    pub fn len(&self) -> u64 {
        match *self {
            Self::Source { len, .. } | Self::Target { len, .. } | Self::New { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A window of a text delta.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaWindow {
    /// Start of the source view within the full source text.
    pub source_offset: u64,
    /// Length of the source view.
    pub source_len: u64,
    /// Number of bytes this window produces.
    pub target_len: u64,
    pub ops: Vec<DeltaOp>,
    pub new_data: Vec<u8>,
}

impl DeltaWindow {
    /// A window that carries its whole target as new data.
    pub fn from_new_data(data: &[u8]) -> Self {
        let len = data.len() as u64;
        Self {
            source_offset: 0,
            source_len: 0,
            target_len: len,
            ops: if len == 0 {
                Vec::new()
            } else {
                vec![DeltaOp::New { offset: 0, len }]
            },
            new_data: data.to_vec(),
        }
    }

    /// Returns `true` if the window produces nothing.
    pub fn is_empty(&self) -> bool {
        self.target_len == 0
    }

    /// Apply this window against the full source text, appending its target
    /// bytes to `out`.
    pub fn apply(&self, source: &[u8], out: &mut Vec<u8>) -> DeltaResult<()> {
        let view = range(self.source_offset, self.source_len, source.len())
            .map(|r| &source[r])
            .ok_or(DeltaError::SourceViewOutOfRange {
                offset: self.source_offset,
                len: self.source_len,
                source_len: source.len(),
            })?;

        let start = out.len();
        for op in &self.ops {
            match *op {
                DeltaOp::Source { offset, len } => {
                    let r = range(offset, len, view.len()).ok_or(
                        DeltaError::InstructionOutOfRange {
                            op: "source",
                            offset,
                            len,
                            available: view.len(),
                        },
                    )?;
                    out.extend_from_slice(&view[r]);
                }
                DeltaOp::Target { offset, len } => {
                    let produced = out.len() - start;
                    if offset >= produced as u64 && len > 0 {
                        return Err(DeltaError::InstructionOutOfRange {
                            op: "target",
                            offset,
                            len,
                            available: produced,
                        });
                    }
                    // Byte at a time: the copy may read what it just wrote.
                    let from = start + offset as usize;
                    for i in 0..len as usize {
                        let byte = out[from + i];
                        out.push(byte);
                    }
                }
                DeltaOp::New { offset, len } => {
                    let r = range(offset, len, self.new_data.len()).ok_or(
                        DeltaError::InstructionOutOfRange {
                            op: "new",
                            offset,
                            len,
                            available: self.new_data.len(),
                        },
                    )?;
                    out.extend_from_slice(&self.new_data[r]);
                }
            }
        }

        let produced = out.len() - start;
        if produced as u64 != self.target_len {
            return Err(DeltaError::TargetLengthMismatch {
                declared: self.target_len,
                produced,
            });
        }
        Ok(())
    }
}

fn range(offset: u64, len: u64, bound: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(len)?;
    if end > bound as u64 {
        return None;
    }
    Some(offset as usize..end as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_data_window() {
        let w = DeltaWindow::from_new_data(b"hello");
        let mut out = Vec::new();
        w.apply(b"", &mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn empty_new_data_window_has_no_ops() {
        let w = DeltaWindow::from_new_data(b"");
        assert!(w.is_empty());
        assert!(w.ops.is_empty());
    }

    #[test]
    fn source_and_new_ops() {
        let w = DeltaWindow {
            source_offset: 0,
            source_len: 11,
            target_len: 11,
            ops: vec![
                DeltaOp::Source { offset: 0, len: 6 },
                DeltaOp::New { offset: 0, len: 5 },
            ],
            new_data: b"there".to_vec(),
        };
        let mut out = Vec::new();
        w.apply(b"hello world", &mut out).unwrap();
        assert_eq!(out, b"hello there");
    }

    #[test]
    fn overlapping_target_copy_repeats() {
        let w = DeltaWindow {
            source_offset: 0,
            source_len: 0,
            target_len: 6,
            ops: vec![
                DeltaOp::New { offset: 0, len: 2 },
                DeltaOp::Target { offset: 0, len: 4 },
            ],
            new_data: b"ab".to_vec(),
        };
        let mut out = Vec::new();
        w.apply(b"", &mut out).unwrap();
        assert_eq!(out, b"ababab");
    }

    #[test]
    fn source_view_is_offset() {
        let w = DeltaWindow {
            source_offset: 6,
            source_len: 5,
            target_len: 5,
            ops: vec![DeltaOp::Source { offset: 0, len: 5 }],
            new_data: Vec::new(),
        };
        let mut out = Vec::new();
        w.apply(b"hello world", &mut out).unwrap();
        assert_eq!(out, b"world");
    }

    #[test]
    fn rejects_out_of_range_source() {
        let w = DeltaWindow {
            source_offset: 0,
            source_len: 3,
            target_len: 5,
            ops: vec![DeltaOp::Source { offset: 0, len: 5 }],
            new_data: Vec::new(),
        };
        let err = w.apply(b"abc", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, DeltaError::InstructionOutOfRange { op: "source", .. }));
    }

    #[test]
    fn rejects_view_past_source_end() {
        let w = DeltaWindow {
            source_offset: 2,
            source_len: 8,
            ..Default::default()
        };
        let err = w.apply(b"abc", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, DeltaError::SourceViewOutOfRange { .. }));
    }

    #[test]
    fn rejects_forward_target_reference() {
        let w = DeltaWindow {
            target_len: 2,
            ops: vec![DeltaOp::Target { offset: 0, len: 2 }],
            ..Default::default()
        };
        let err = w.apply(b"", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, DeltaError::InstructionOutOfRange { op: "target", .. }));
    }

    #[test]
    fn rejects_length_mismatch() {
        let w = DeltaWindow {
            target_len: 4,
            ops: vec![DeltaOp::New { offset: 0, len: 2 }],
            new_data: b"ab".to_vec(),
            ..Default::default()
        };
        assert_eq!(
            w.apply(b"", &mut Vec::new()).unwrap_err(),
            DeltaError::TargetLengthMismatch {
                declared: 4,
                produced: 2
            }
        );
    }
}
