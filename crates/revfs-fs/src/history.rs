use std::fmt;

use revfs_types::Revnum;

use crate::error::FsResult;
use crate::provider::HistoryProvider;

/// A lazy cursor walking backwards through a node's history.
///
/// Each step is computed only when [`History::prev`] is called.
pub struct History {
    provider: Box<dyn HistoryProvider>,
}

impl History {
    pub(crate) fn new(provider: Box<dyn HistoryProvider>) -> Self {
        Self { provider }
    }

    /// The previous interesting location, or `None` when history is
    /// exhausted. Without `cross_copies`, history stops at a copy.
    pub fn prev(&self, cross_copies: bool) -> FsResult<Option<History>> {
        let (path, rev) = self.provider.location();
        let prev = self
            .provider
            .prev(cross_copies)
            .map_err(|e| e.context("history_prev", format!("{path}@{rev}")))?;
        Ok(prev.map(History::new))
    }

    /// `(path, revision)` of this location.
    pub fn location(&self) -> (String, Revnum) {
        self.provider.location()
    }

    /// Iterate the locations before this one.
    pub fn iter(self, cross_copies: bool) -> HistoryIter {
        HistoryIter {
            cursor: Some(self),
            cross_copies,
        }
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (path, rev) = self.location();
        write!(f, "History({path}@{rev})")
    }
}

/// Iterator over [`History::prev`] steps. Yields the location of each step
/// and stops after the first error.
pub struct HistoryIter {
    cursor: Option<History>,
    cross_copies: bool,
}

impl Iterator for HistoryIter {
    type Item = FsResult<(String, Revnum)>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor.take()?;
        match current.prev(self.cross_copies) {
            Ok(Some(prev)) => {
                let location = prev.location();
                self.cursor = Some(prev);
                Some(Ok(location))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
