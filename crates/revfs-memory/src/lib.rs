//! The `memory` provider.
//!
//! Repositories are held by the [`MemoryLibrary`] instance, keyed by the
//! path they were created at. Nothing touches the disk; a repository
//! disappears when it is deleted or when the library is dropped. Useful for
//! tests and for scratch repositories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use revfs_dag::{DagFs, Volatile};
use revfs_fs::{FsError, FsLibrary, FsProvider, FsResult, OpenContext};
use tracing::debug;

/// Name the provider registers under.
pub const PROVIDER: &str = "memory";

/// Library of in-process repositories.
#[derive(Default)]
pub struct MemoryLibrary {
    repos: Mutex<HashMap<PathBuf, DagFs>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn repos(&self) -> FsResult<MutexGuard<'_, HashMap<PathBuf, DagFs>>> {
        self.repos
            .lock()
            .map_err(|_| FsError::Corrupt("memory library lock poisoned".into()))
    }

    fn missing(path: &Path) -> FsError {
        FsError::not_found(format!("repository at {}", path.display()))
    }

    /// Paths of the repositories this library holds, sorted.
    pub fn paths(&self) -> FsResult<Vec<PathBuf>> {
        let mut paths: Vec<_> = self.repos()?.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}

impl FsLibrary for MemoryLibrary {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn create(&self, ctx: &OpenContext<'_>) -> FsResult<Box<dyn FsProvider>> {
        let mut repos = self.repos()?;
        if repos.contains_key(ctx.path) {
            return Err(FsError::already_exists(format!(
                "repository at {}",
                ctx.path.display()
            )));
        }
        let fs = DagFs::new(PROVIDER, DagFs::initial_state(), Box::new(Volatile));
        repos.insert(ctx.path.to_path_buf(), fs.clone());
        debug!(path = %ctx.path.display(), "created memory repository");
        Ok(Box::new(fs))
    }

    fn open(&self, ctx: &OpenContext<'_>) -> FsResult<Box<dyn FsProvider>> {
        let fs = self
            .repos()?
            .get(ctx.path)
            .cloned()
            .ok_or_else(|| Self::missing(ctx.path))?;
        Ok(Box::new(fs))
    }

    fn delete(&self, path: &Path) -> FsResult<()> {
        self.repos()?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::missing(path))
    }

    /// The copy gets the committed state only; open transactions stay behind.
    fn hotcopy(&self, src: &Path, dest: &Path, _clean: bool) -> FsResult<()> {
        let mut repos = self.repos()?;
        let snapshot = repos
            .get(src)
            .ok_or_else(|| Self::missing(src))?
            .snapshot()?;
        if repos.contains_key(dest) {
            return Err(FsError::already_exists(format!(
                "repository at {}",
                dest.display()
            )));
        }
        repos.insert(
            dest.to_path_buf(),
            DagFs::new(PROVIDER, snapshot, Box::new(Volatile)),
        );
        Ok(())
    }
}
