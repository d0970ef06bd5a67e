//! Repository lifecycle and maintenance for the `journal` provider.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use revfs_dag::{DagFs, DagState, WeakDagFs};
use revfs_fs::{ErrCallFn, FsConfig, FsError, FsLibrary, FsProvider, FsResult, OpenContext, Warnings};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::JournalError;
use crate::journal::{Journal, JournalOptions};
use crate::segment::{list_segments, parse_segment_name, scan_segment, segment_name, SegmentWriter};
use crate::store::{self, FormatInfo};

/// Name the provider registers under.
pub const PROVIDER: &str = "journal";

/// Engines this library has open, by canonical directory.
type OpenMap = HashMap<PathBuf, WeakDagFs>;

/// Library for on-disk journal repositories.
///
/// Opening the same directory twice in one process yields handles on one
/// shared engine, so every writer goes through a single journal. Every
/// lifecycle operation holds the registry lock from its check to its last
/// write, so a directory never gets a second engine.
#[derive(Default)]
pub struct JournalLibrary {
    open: Mutex<OpenMap>,
}

/// Result of replaying a repository directory.
struct Replayed {
    state: DagState,
    first_live: u64,
    /// Last live segment and its record count.
    tail: (u64, u64),
}

impl JournalLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> FsResult<MutexGuard<'_, OpenMap>> {
        self.open
            .lock()
            .map_err(|_| FsError::Corrupt("journal library lock poisoned".into()))
    }

    fn key(path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn missing(path: &Path) -> FsError {
        FsError::not_found(format!("repository at {}", path.display()))
    }

    /// The live engine for `path` in `open`, dropping a stale entry.
    fn live_in(open: &mut OpenMap, path: &Path) -> Option<DagFs> {
        let key = Self::key(path);
        let engine = open.get(&key).and_then(WeakDagFs::upgrade);
        if engine.is_none() {
            open.remove(&key);
        }
        engine
    }

    fn live(&self, path: &Path) -> FsResult<Option<DagFs>> {
        Ok(Self::live_in(&mut *self.registry()?, path))
    }

    /// Load the snapshot and replay every live segment.
    ///
    /// With `repair`, a torn tail is truncated away instead of failing.
    fn replay(dir: &Path, repair: bool) -> FsResult<Replayed> {
        store::read_format(dir)?;
        let snapshot = store::read_snapshot(dir)?;
        let mut state = snapshot.state;
        let first_live = snapshot.first_live_segment;
        let live: Vec<u64> = list_segments(dir)?
            .into_iter()
            .filter(|seq| *seq >= first_live)
            .collect();

        let mut tail = (first_live, 0);
        for (i, seq) in live.iter().copied().enumerate() {
            let path = dir.join(segment_name(seq));
            let scan = scan_segment(&path)?;
            for payload in &scan.records {
                let change = bincode::deserialize(payload)
                    .map_err(|e| JournalError::Format(format!("{}: {e}", path.display())))?;
                state.apply(change)?;
            }
            tail = (seq, scan.records.len() as u64);

            if let Some(offset) = scan.torn {
                if !repair {
                    return Err(JournalError::TornRecord {
                        segment: path,
                        offset,
                    }
                    .into());
                }
                warn!(segment = %path.display(), offset, "truncating torn record");
                fs::OpenOptions::new()
                    .write(true)
                    .open(&path)?
                    .set_len(scan.valid_len)?;
                for later in &live[i + 1..] {
                    fs::remove_file(dir.join(segment_name(*later)))?;
                }
                break;
            }
        }
        Ok(Replayed {
            state,
            first_live,
            tail,
        })
    }

    /// Open the engine for an existing directory and record it in `open`.
    fn start(open: &mut OpenMap, ctx: &OpenContext<'_>) -> FsResult<DagFs> {
        let options = JournalOptions::from_config(ctx.config)?;
        let replayed = Self::replay(ctx.path, false)?;

        let unused = list_segments(ctx.path)?
            .into_iter()
            .filter(|seq| *seq < replayed.first_live)
            .count();
        if unused > 0 {
            ctx.warnings.emit(&FsError::invalid_state(format!(
                "{unused} log segment(s) in {} are no longer needed",
                ctx.path.display()
            )));
        }

        let (seq, records) = replayed.tail;
        let writer = SegmentWriter::open(ctx.path, seq, records).map_err(FsError::from)?;
        let journal = Journal::new(
            ctx.path,
            options,
            writer,
            replayed.first_live,
            ctx.warnings.clone(),
        );
        let youngest = replayed.state.youngest();
        let engine = DagFs::new(PROVIDER, replayed.state, Box::new(journal));
        open.insert(Self::key(ctx.path), engine.downgrade());
        debug!(path = %ctx.path.display(), %youngest, segment = seq, "journal opened");
        Ok(engine)
    }

    fn journal_of(engine: &DagFs) -> FsResult<&Journal> {
        engine
            .persistence()
            .as_any()
            .downcast_ref::<Journal>()
            .ok_or_else(|| FsError::unsupported(PROVIDER, "foreign engine"))
    }

    fn ensure_closed(open: &mut OpenMap, path: &Path, op: &str) -> FsResult<()> {
        if Self::live_in(open, path).is_some() {
            return Err(FsError::invalid_state(format!(
                "{op}: repository at {} is open",
                path.display()
            )));
        }
        Ok(())
    }
}

impl FsLibrary for JournalLibrary {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn create(&self, ctx: &OpenContext<'_>) -> FsResult<Box<dyn FsProvider>> {
        JournalOptions::from_config(ctx.config)?;
        let mut open = self.registry()?;
        if store::is_repository(ctx.path) {
            return Err(FsError::already_exists(format!(
                "repository at {}",
                ctx.path.display()
            )));
        }
        fs::create_dir_all(ctx.path)?;
        let state = DagFs::initial_state();
        store::write_snapshot(ctx.path, 1, &state)?;
        SegmentWriter::open(ctx.path, 1, 0)?;
        // The format file goes last: its presence marks a complete repository.
        store::write_format(ctx.path, &FormatInfo::current())?;
        info!(path = %ctx.path.display(), uuid = %state.uuid, "journal repository created");
        Ok(Box::new(Self::start(&mut open, ctx)?))
    }

    fn open(&self, ctx: &OpenContext<'_>) -> FsResult<Box<dyn FsProvider>> {
        let mut open = self.registry()?;
        if let Some(engine) = Self::live_in(&mut open, ctx.path) {
            debug!(path = %ctx.path.display(), "sharing open journal engine");
            return Ok(Box::new(engine));
        }
        if !store::is_repository(ctx.path) {
            return Err(Self::missing(ctx.path));
        }
        Ok(Box::new(Self::start(&mut open, ctx)?))
    }

    fn delete(&self, path: &Path) -> FsResult<()> {
        let mut open = self.registry()?;
        if !store::is_repository(path) {
            return Err(Self::missing(path));
        }
        open.remove(&Self::key(path));
        fs::remove_dir_all(path)?;
        Ok(())
    }

    /// Copies the repository while holding the engine lock, so no commit
    /// lands mid-copy. Each copied segment is checked frame by frame.
    fn hotcopy(&self, src: &Path, dest: &Path, clean: bool) -> FsResult<()> {
        if !store::is_repository(src) {
            return Err(Self::missing(src));
        }
        if store::is_repository(dest) {
            return Err(FsError::already_exists(format!(
                "repository at {}",
                dest.display()
            )));
        }
        let engine = {
            let mut open = self.registry()?;
            match Self::live_in(&mut open, src) {
                Some(engine) => engine,
                None => {
                    let (config, warnings) = (FsConfig::new(), Warnings::new());
                    let ctx = OpenContext {
                        path: src,
                        config: &config,
                        warnings: &warnings,
                    };
                    Self::start(&mut open, &ctx)?
                }
            }
        };
        let first_live = Self::journal_of(&engine)?.first_live_segment()?;

        engine.with_state(|_| {
            fs::create_dir_all(dest)?;
            let mut copied = 0usize;
            for entry in WalkDir::new(src).min_depth(1).max_depth(1) {
                let entry = entry.map_err(|e| FsError::Io(e.into()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == store::FORMAT_FILE {
                    continue;
                }
                if let Some(seq) = parse_segment_name(&name) {
                    if clean && seq < first_live {
                        continue;
                    }
                    let scan = scan_segment(entry.path())?;
                    if let Some(offset) = scan.torn {
                        return Err(JournalError::TornRecord {
                            segment: entry.path().to_path_buf(),
                            offset,
                        }
                        .into());
                    }
                } else if name.starts_with('.') {
                    // temporary files from an interrupted atomic write
                    continue;
                }
                fs::copy(entry.path(), dest.join(&name))?;
                copied += 1;
            }
            fs::copy(src.join(store::FORMAT_FILE), dest.join(store::FORMAT_FILE))?;
            info!(src = %src.display(), dest = %dest.display(), files = copied + 1, clean, "journal hot copy");
            Ok(())
        })
    }

    fn set_errcall(&self, fs: &dyn FsProvider, handler: ErrCallFn) -> FsResult<()> {
        let engine = fs
            .as_any()
            .downcast_ref::<DagFs>()
            .ok_or_else(|| FsError::unsupported(PROVIDER, "set_errcall on a foreign filesystem"))?;
        Self::journal_of(engine)?.set_errcall(handler);
        Ok(())
    }

    /// Truncate a torn log tail, then fold everything into a new snapshot.
    fn recover(&self, path: &Path) -> FsResult<()> {
        let mut open = self.registry()?;
        if !store::is_repository(path) {
            return Err(Self::missing(path));
        }
        Self::ensure_closed(&mut open, path, "recover")?;
        let replayed = Self::replay(path, true)?;
        let next = replayed.tail.0 + 1;
        SegmentWriter::open(path, next, 0)?;
        store::write_snapshot(path, next, &replayed.state)?;
        info!(path = %path.display(), rev = %replayed.state.youngest(), first_live = next, "journal recovered");
        Ok(())
    }

    fn logfiles(&self, path: &Path, only_unused: bool) -> FsResult<Vec<String>> {
        if !store::is_repository(path) {
            return Err(Self::missing(path));
        }
        let first_live = match self.live(path)? {
            Some(engine) => Self::journal_of(&engine)?.first_live_segment()?,
            None => store::read_snapshot(path)?.first_live_segment,
        };
        Ok(list_segments(path)?
            .into_iter()
            .filter(|seq| !only_unused || *seq < first_live)
            .map(segment_name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use revfs_fs::ErrorKind;
    use revfs_types::{NodeKind, Revnum};

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        config: FsConfig,
        warnings: Warnings,
    }

    impl Fixture {
        fn new(segment_records: u64) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("repo");
            Self {
                _dir: dir,
                path,
                config: FsConfig::new()
                    .with("journal.fsync", "false")
                    .with("journal.segment-records", segment_records.to_string()),
                warnings: Warnings::new(),
            }
        }

        fn ctx(&self) -> OpenContext<'_> {
            OpenContext {
                path: &self.path,
                config: &self.config,
                warnings: &self.warnings,
            }
        }
    }

    fn commit_file(fs: &dyn FsProvider, path: &str, text: &[u8]) -> Revnum {
        let base = fs.youngest_rev().unwrap();
        let txn = fs.begin_txn(base).unwrap();
        let root = txn.root().unwrap();
        if root.check_path(path).unwrap() == NodeKind::None {
            root.make_file(path).unwrap();
        }
        let mut w = root.apply_text(path, None).unwrap();
        w.write_all(text).unwrap();
        w.close().unwrap();
        txn.commit().unwrap()
    }

    fn read(fs: &dyn FsProvider, rev: u64, path: &str) -> Vec<u8> {
        let root = fs.revision_root(Revnum::new(rev)).unwrap();
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut root.file_contents(path).unwrap(), &mut out).unwrap();
        out
    }

    #[test]
    fn commits_survive_reopen() {
        let fx = Fixture::new(64);
        let lib = JournalLibrary::new();
        let uuid = {
            let fs = lib.create(&fx.ctx()).unwrap();
            commit_file(fs.as_ref(), "/a", b"one");
            commit_file(fs.as_ref(), "/a", b"two");
            fs.change_rev_prop(Revnum::new(1), "log", Some(b"first")).unwrap();
            fs.uuid().unwrap()
        };

        let fresh = JournalLibrary::new();
        let fs = fresh.open(&fx.ctx()).unwrap();
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(2));
        assert_eq!(fs.uuid().unwrap(), uuid);
        assert_eq!(read(fs.as_ref(), 1, "/a"), b"one");
        assert_eq!(read(fs.as_ref(), 2, "/a"), b"two");
        assert_eq!(
            fs.revision_prop(Revnum::new(1), "log").unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[test]
    fn create_twice_and_open_missing() {
        let fx = Fixture::new(64);
        let lib = JournalLibrary::new();
        assert_eq!(
            lib.open(&fx.ctx()).err().map(|e| e.kind()),
            Some(ErrorKind::NotFound)
        );
        let _fs = lib.create(&fx.ctx()).unwrap();
        assert_eq!(
            lib.create(&fx.ctx()).err().map(|e| e.kind()),
            Some(ErrorKind::AlreadyExists)
        );
    }

    #[test]
    fn one_engine_per_directory() {
        let fx = Fixture::new(64);
        let lib = JournalLibrary::new();
        let first = lib.create(&fx.ctx()).unwrap();
        let second = lib.open(&fx.ctx()).unwrap();
        commit_file(first.as_ref(), "/f", b"x");
        assert_eq!(second.youngest_rev().unwrap(), Revnum::new(1));
    }

    #[test]
    fn concurrent_opens_share_one_engine() {
        let fx = Fixture::new(64);
        drop(JournalLibrary::new().create(&fx.ctx()).unwrap());

        for _ in 0..32 {
            let lib = JournalLibrary::new();
            let barrier = std::sync::Barrier::new(2);
            let (left, right) = std::thread::scope(|scope| {
                let open = || {
                    barrier.wait();
                    lib.open(&fx.ctx()).unwrap()
                };
                let left = scope.spawn(open);
                let right = scope.spawn(open);
                (left.join().unwrap(), right.join().unwrap())
            });
            let engine = |fs: &dyn FsProvider| fs.as_any().downcast_ref::<DagFs>().unwrap().clone();
            assert!(engine(left.as_ref()).same_engine(&engine(right.as_ref())));
        }

        let lib = JournalLibrary::new();
        let (first, second) = (lib.open(&fx.ctx()).unwrap(), lib.open(&fx.ctx()).unwrap());
        commit_file(first.as_ref(), "/f", b"one");
        commit_file(second.as_ref(), "/f", b"two");
        drop((first, second));
        let fs = JournalLibrary::new().open(&fx.ctx()).unwrap();
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(2));
        assert_eq!(read(fs.as_ref(), 2, "/f"), b"two");
    }

    #[test]
    fn checkpoints_retire_segments() {
        let fx = Fixture::new(2);
        let lib = JournalLibrary::new();
        {
            let fs = lib.create(&fx.ctx()).unwrap();
            for text in [b"1", b"2", b"3", b"4", b"5"] {
                commit_file(fs.as_ref(), "/f", text);
            }
            assert_eq!(
                lib.logfiles(&fx.path, false).unwrap(),
                vec![segment_name(1), segment_name(2), segment_name(3)]
            );
            assert_eq!(
                lib.logfiles(&fx.path, true).unwrap(),
                vec![segment_name(1), segment_name(2)]
            );
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        fx.warnings
            .set(Arc::new(move |w: &FsError| sink.lock().unwrap().push(w.to_string())));
        let fs = JournalLibrary::new().open(&fx.ctx()).unwrap();
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(5));
        assert_eq!(read(fs.as_ref(), 3, "/f"), b"3");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn torn_tail_needs_recovery() {
        let fx = Fixture::new(64);
        {
            let fs = JournalLibrary::new().create(&fx.ctx()).unwrap();
            commit_file(fs.as_ref(), "/f", b"kept");
        }
        let segment = fx.path.join(segment_name(1));
        let mut file = fs::OpenOptions::new().append(true).open(&segment).unwrap();
        file.write_all(&[9, 0, 0, 0, 1, 2]).unwrap();
        drop(file);

        let lib = JournalLibrary::new();
        let err = lib.open(&fx.ctx()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        lib.recover(&fx.path).unwrap();
        let fs = lib.open(&fx.ctx()).unwrap();
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(1));
        assert_eq!(read(fs.as_ref(), 1, "/f"), b"kept");
        assert_eq!(lib.logfiles(&fx.path, true).unwrap(), vec![segment_name(1)]);
        commit_file(fs.as_ref(), "/f", b"after");
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(2));
    }

    #[test]
    fn recover_refuses_open_repository() {
        let fx = Fixture::new(64);
        let lib = JournalLibrary::new();
        let _fs = lib.create(&fx.ctx()).unwrap();
        assert_eq!(
            lib.recover(&fx.path).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn hotcopy_clean_skips_retired_segments() {
        let fx = Fixture::new(2);
        let lib = JournalLibrary::new();
        let fs = lib.create(&fx.ctx()).unwrap();
        for text in [b"1", b"2", b"3"] {
            commit_file(fs.as_ref(), "/f", text);
        }
        let dest = fx.path.with_file_name("copy");
        lib.hotcopy(&fx.path, &dest, true).unwrap();
        assert_eq!(lib.logfiles(&dest, false).unwrap(), vec![segment_name(2)]);

        let full = fx.path.with_file_name("full");
        lib.hotcopy(&fx.path, &full, false).unwrap();
        assert_eq!(lib.logfiles(&full, false).unwrap().len(), 2);

        let copy_ctx = OpenContext {
            path: &dest,
            config: &fx.config,
            warnings: &fx.warnings,
        };
        let copy = lib.open(&copy_ctx).unwrap();
        assert_eq!(copy.youngest_rev().unwrap(), Revnum::new(3));
        assert_eq!(copy.uuid().unwrap(), fs.uuid().unwrap());
        assert_eq!(
            lib.hotcopy(&fx.path, &dest, false).unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn errcall_is_installed_on_journal() {
        let fx = Fixture::new(64);
        let lib = JournalLibrary::new();
        let fs = lib.create(&fx.ctx()).unwrap();
        lib.set_errcall(fs.as_ref(), Arc::new(|_: &str, _: &str| {}))
            .unwrap();

        let memory_engine = DagFs::new("memory", DagFs::initial_state(), Box::new(revfs_dag::Volatile));
        assert_eq!(
            lib.set_errcall(&memory_engine, Arc::new(|_: &str, _: &str| {}))
                .unwrap_err()
                .kind(),
            ErrorKind::Unsupported
        );
    }

    #[test]
    fn delete_removes_directory() {
        let fx = Fixture::new(64);
        let lib = JournalLibrary::new();
        drop(lib.create(&fx.ctx()).unwrap());
        lib.delete(&fx.path).unwrap();
        assert!(!fx.path.exists());
        assert_eq!(lib.delete(&fx.path).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
