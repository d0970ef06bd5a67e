//! Choosing which root's provider runs a multi-root operation.
//!
//! Operations with a destination run on the destination root's provider:
//! `copy` and `revision_link` on the `to` root, `file_delta_stream` and
//! `merge` on the target root. Comparisons without a destination
//! (`props_changed`, `contents_changed`) run on the first root's provider.

/// Operations that accept more than one root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiRootOp {
    PropsChanged,
    ContentsChanged,
    Copy,
    RevisionLink,
    FileDeltaStream,
    Merge,
}

impl MultiRootOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::PropsChanged => "props_changed",
            Self::ContentsChanged => "contents_changed",
            Self::Copy => "copy",
            Self::RevisionLink => "revision_link",
            Self::FileDeltaStream => "file_delta_stream",
            Self::Merge => "merge",
        }
    }

    /// Index of the destination root in the operation's argument order,
    /// or `None` when the operation has no destination.
    ///
    /// Argument orders: `(from, to)` for copy and revision_link,
    /// `(source, target)` for file_delta_stream, and
    /// `(source, target, ancestor)` for merge.
    pub fn destination_index(self) -> Option<usize> {
        match self {
            Self::PropsChanged | Self::ContentsChanged => None,
            Self::Copy | Self::RevisionLink | Self::FileDeltaStream | Self::Merge => Some(1),
        }
    }
}

/// Index of the governing root among `root_count` roots given in the
/// operation's argument order. When an optional leading root is absent
/// (a `file_delta_stream` without a source), the single remaining root
/// governs.
pub fn governing_index(op: MultiRootOp, root_count: usize) -> usize {
    op.destination_index()
        .filter(|&i| i < root_count)
        .unwrap_or(0)
}

/// The governing element of `roots`.
///
/// # Panics
///
/// Panics if `roots` is empty.
pub fn governing<T>(op: MultiRootOp, roots: &[T]) -> &T {
    &roots[governing_index(op, roots.len())]
}
