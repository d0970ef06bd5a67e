//! Provider lookup and repository lifecycle by provider name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::fs::Filesystem;
use crate::provider::{FsLibrary, OpenContext};
use crate::warning::Warnings;

/// File recording which provider owns a directory-backed repository.
pub const FS_TYPE_FILE: &str = "fs-type";

/// Set of available providers, keyed by name.
///
/// A registry is an ordinary value: build one, register libraries, and
/// share it. Libraries may keep per-registry state (an in-memory provider
/// keeps its repositories there), so two registries never see each other's
/// in-memory repositories.
#[derive(Clone, Default)]
pub struct Registry {
    libraries: BTreeMap<&'static str, Arc<dyn FsLibrary>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `library`, replacing any library with the same name.
    pub fn register(&mut self, library: Arc<dyn FsLibrary>) -> &mut Self {
        debug!(provider = library.name(), "registering filesystem provider");
        self.libraries.insert(library.name(), library);
        self
    }

    /// Builder-style [`Registry::register`].
    pub fn with(mut self, library: Arc<dyn FsLibrary>) -> Self {
        self.register(library);
        self
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.libraries.keys().copied().collect()
    }

    pub fn library(&self, name: &str) -> FsResult<Arc<dyn FsLibrary>> {
        self.libraries
            .get(name)
            .cloned()
            .ok_or_else(|| FsError::ProviderNotFound {
                name: name.to_string(),
            })
    }

    /// Create a repository with provider `name` and open it.
    pub fn create(&self, name: &str, path: &Path, config: &FsConfig) -> FsResult<Filesystem> {
        let library = self.library(name)?;
        let warnings = Warnings::new();
        let provider = library
            .create(&OpenContext {
                path,
                config,
                warnings: &warnings,
            })
            .map_err(|e| e.context("create", path.display().to_string()))?;
        if path.is_dir() {
            std::fs::write(path.join(FS_TYPE_FILE), format!("{name}\n"))?;
        }
        info!(provider = name, path = %path.display(), "created repository");
        Ok(Filesystem::new(
            path.to_path_buf(),
            config.clone(),
            warnings,
            library,
            provider,
        ))
    }

    /// Open an existing repository with provider `name`.
    pub fn open(&self, name: &str, path: &Path, config: &FsConfig) -> FsResult<Filesystem> {
        let library = self.library(name)?;
        let warnings = Warnings::new();
        let provider = library
            .open(&OpenContext {
                path,
                config,
                warnings: &warnings,
            })
            .map_err(|e| e.context("open", path.display().to_string()))?;
        debug!(provider = name, path = %path.display(), "opened repository");
        Ok(Filesystem::new(
            path.to_path_buf(),
            config.clone(),
            warnings,
            library,
            provider,
        ))
    }

    /// Provider name recorded in a directory-backed repository.
    pub fn detect(path: &Path) -> FsResult<String> {
        let marker = path.join(FS_TYPE_FILE);
        match std::fs::read_to_string(&marker) {
            Ok(text) => {
                let name = text.trim();
                if name.is_empty() {
                    Err(FsError::Corrupt(format!("{} is empty", marker.display())))
                } else {
                    Ok(name.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FsError::not_found(
                format!("repository at {}", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a directory-backed repository with whichever provider created it.
    pub fn open_detected(&self, path: &Path, config: &FsConfig) -> FsResult<Filesystem> {
        let name = Self::detect(path)?;
        self.open(&name, path, config)
    }

    pub fn delete(&self, name: &str, path: &Path) -> FsResult<()> {
        let library = self.library(name)?;
        library
            .delete(path)
            .map_err(|e| e.context("delete", path.display().to_string()))?;
        info!(provider = name, path = %path.display(), "deleted repository");
        Ok(())
    }

    pub fn hotcopy(&self, name: &str, src: &Path, dest: &Path, clean: bool) -> FsResult<()> {
        let library = self.library(name)?;
        library
            .hotcopy(src, dest, clean)
            .map_err(|e| e.context("hotcopy", src.display().to_string()))?;
        if dest.is_dir() && !dest.join(FS_TYPE_FILE).exists() {
            std::fs::write(dest.join(FS_TYPE_FILE), format!("{name}\n"))?;
        }
        info!(provider = name, src = %src.display(), dest = %dest.display(), clean, "hot-copied repository");
        Ok(())
    }

    pub fn recover(&self, name: &str, path: &Path) -> FsResult<()> {
        let library = self.library(name)?;
        library
            .recover(path)
            .map_err(|e| e.context("recover", path.display().to_string()))?;
        info!(provider = name, path = %path.display(), "recovered repository");
        Ok(())
    }

    pub fn logfiles(&self, name: &str, path: &Path, only_unused: bool) -> FsResult<Vec<String>> {
        self.library(name)?
            .logfiles(path, only_unused)
            .map_err(|e| e.context("logfiles", path.display().to_string()))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("providers", &self.names())
            .finish()
    }
}
