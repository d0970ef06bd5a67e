//! Delta computation: compare two byte strings and emit windows.
//!
//! Uses the `similar` crate (Myers diff algorithm) over raw bytes. Matching
//! runs become source copies; everything else is carried as new data.

use std::collections::VecDeque;

use similar::{capture_diff_slices, Algorithm, DiffOp};

use crate::window::{DeltaOp, DeltaWindow, WINDOW_SIZE};

/// Matching runs shorter than this are cheaper to send as new data.
const MIN_SOURCE_COPY: usize = 4;

/// Compute the delta windows that turn `source` into `target`.
///
/// Every window views the whole source; windows split the target into
/// chunks of at most [`WINDOW_SIZE`] bytes. An empty target yields no
/// windows.
pub fn compute_delta(source: &[u8], target: &[u8]) -> Vec<DeltaWindow> {
    let mut builder = WindowBuilder::new(source.len() as u64);
    if source.is_empty() {
        builder.push_new(target);
        return builder.finish();
    }

    for op in capture_diff_slices(Algorithm::Myers, source, target) {
        match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                if len < MIN_SOURCE_COPY {
                    builder.push_new(&target[new_index..new_index + len]);
                } else {
                    builder.push_source(old_index as u64, len as u64);
                }
            }
            DiffOp::Insert {
                new_index, new_len, ..
            }
            | DiffOp::Replace {
                new_index, new_len, ..
            } => builder.push_new(&target[new_index..new_index + new_len]),
            DiffOp::Delete { .. } => {}
        }
    }
    builder.finish()
}

/// Accumulates instructions and cuts windows at [`WINDOW_SIZE`].
struct WindowBuilder {
    source_len: u64,
    current: DeltaWindow,
    done: Vec<DeltaWindow>,
}

impl WindowBuilder {
    fn new(source_len: u64) -> Self {
        Self {
            source_len,
            current: Self::blank(source_len),
            done: Vec::new(),
        }
    }

    fn blank(source_len: u64) -> DeltaWindow {
        DeltaWindow {
            source_offset: 0,
            source_len,
            ..Default::default()
        }
    }

    fn room(&self) -> u64 {
        WINDOW_SIZE as u64 - self.current.target_len
    }

    fn push_source(&mut self, mut offset: u64, mut len: u64) {
        while len > 0 {
            let take = len.min(self.room());
            match self.current.ops.last_mut() {
                Some(DeltaOp::Source {
                    offset: prev_offset,
                    len: prev_len,
                }) if *prev_offset + *prev_len == offset => *prev_len += take,
                _ => self.current.ops.push(DeltaOp::Source { offset, len: take }),
            }
            self.current.target_len += take;
            offset += take;
            len -= take;
            self.cut_if_full();
        }
    }

    fn push_new(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (data.len() as u64).min(self.room()) as usize;
            let offset = self.current.new_data.len() as u64;
            match self.current.ops.last_mut() {
                Some(DeltaOp::New {
                    offset: prev_offset,
                    len: prev_len,
                }) if *prev_offset + *prev_len == offset => *prev_len += take as u64,
                _ => self.current.ops.push(DeltaOp::New {
                    offset,
                    len: take as u64,
                }),
            }
            self.current.new_data.extend_from_slice(&data[..take]);
            self.current.target_len += take as u64;
            data = &data[take..];
            self.cut_if_full();
        }
    }

    fn cut_if_full(&mut self) {
        if self.room() == 0 {
            let full = std::mem::replace(&mut self.current, Self::blank(self.source_len));
            self.done.push(full);
        }
    }

    fn finish(mut self) -> Vec<DeltaWindow> {
        if !self.current.is_empty() {
            self.done.push(self.current);
        }
        self.done
    }
}

/// The windows between two texts, handed out one at a time.
#[derive(Clone, Debug, Default)]
pub struct TextDeltaStream {
    windows: VecDeque<DeltaWindow>,
}

impl TextDeltaStream {
    /// Compute the stream that turns `source` into `target`.
    pub fn new(source: &[u8], target: &[u8]) -> Self {
        Self::from_windows(compute_delta(source, target))
    }

    pub fn from_windows(windows: Vec<DeltaWindow>) -> Self {
        Self {
            windows: windows.into(),
        }
    }

    /// Number of windows not yet taken.
    pub fn remaining(&self) -> usize {
        self.windows.len()
    }
}

impl Iterator for TextDeltaStream {
    type Item = DeltaWindow;

    fn next(&mut self) -> Option<Self::Item> {
        self.windows.pop_front()
    }
}
