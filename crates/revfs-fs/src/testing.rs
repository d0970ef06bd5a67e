//! Recording mock provider for dispatch tests.

use std::any::Any;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use revfs_delta::{DeltaWindow, TextDeltaStream};
use revfs_types::{Checksum, DirEntry, NodeKind, NodeRevisionId, PathChange, PropList, Revnum};

use crate::error::{FsError, FsResult};
use crate::provider::{
    ContentWriter, CopySource, DeltaConsumer, FsLibrary, FsProvider, HistoryProvider,
    OpenContext, RootProvider, TxnProvider,
};
use crate::registry::Registry;

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Library whose every provider call is appended to `log` as
/// `"<name>:<op> <args>"`.
pub struct MockLibrary {
    pub name: &'static str,
    pub log: CallLog,
}

impl MockLibrary {
    pub fn new(name: &'static str, log: CallLog) -> Arc<Self> {
        Arc::new(Self { name, log })
    }
}

/// A registry with two mock providers, `alpha` and `beta`, sharing one log.
pub fn mock_registry() -> (Registry, CallLog) {
    let log = CallLog::default();
    let registry = Registry::new()
        .with(MockLibrary::new("alpha", log.clone()))
        .with(MockLibrary::new("beta", log.clone()));
    (registry, log)
}

impl FsLibrary for MockLibrary {
    fn name(&self) -> &'static str {
        self.name
    }

    fn create(&self, ctx: &OpenContext<'_>) -> FsResult<Box<dyn FsProvider>> {
        self.open(ctx)
    }

    fn open(&self, ctx: &OpenContext<'_>) -> FsResult<Box<dyn FsProvider>> {
        Ok(Box::new(MockFs {
            name: self.name,
            log: self.log.clone(),
            conflict: ctx.config.get_bool("mock.conflict", false)?,
            broken: ctx.config.get_bool("mock.broken", false)?,
        }))
    }

    fn delete(&self, path: &Path) -> FsResult<()> {
        record(&self.log, self.name, "delete", &path.display().to_string());
        Ok(())
    }

    fn hotcopy(&self, src: &Path, _dest: &Path, clean: bool) -> FsResult<()> {
        record(&self.log, self.name, "hotcopy", &format!("{} {clean}", src.display()));
        Ok(())
    }
}

/// The error a `mock.broken` provider returns from its read paths.
fn unreadable(name: &str) -> FsError {
    FsError::Corrupt(format!("{name} store is unreadable"))
}

fn record(log: &CallLog, name: &str, op: &str, args: &str) {
    log.lock().unwrap().push(format!("{name}:{op} {args}"));
}

struct MockFs {
    name: &'static str,
    log: CallLog,
    conflict: bool,
    broken: bool,
}

impl MockFs {
    fn root(&self) -> Box<dyn RootProvider> {
        Box::new(MockRoot {
            name: self.name,
            log: self.log.clone(),
            broken: self.broken,
        })
    }

    fn check_readable(&self) -> FsResult<()> {
        if self.broken {
            return Err(unreadable(self.name));
        }
        Ok(())
    }
}

impl FsProvider for MockFs {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn youngest_rev(&self) -> FsResult<Revnum> {
        Ok(Revnum::new(3))
    }

    fn revision_prop(&self, rev: Revnum, name: &str) -> FsResult<Option<Vec<u8>>> {
        record(&self.log, self.name, "revision_prop", &format!("{rev} {name}"));
        Ok(None)
    }

    fn revision_proplist(&self, _rev: Revnum) -> FsResult<PropList> {
        Ok(PropList::new())
    }

    fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        record(
            &self.log,
            self.name,
            "change_rev_prop",
            &format!("{rev} {name} {}", value.is_some()),
        );
        Ok(())
    }

    fn uuid(&self) -> FsResult<String> {
        self.check_readable()?;
        Ok("mock-uuid".into())
    }

    fn set_uuid(&self, uuid: &str) -> FsResult<()> {
        record(&self.log, self.name, "set_uuid", uuid);
        Ok(())
    }

    fn revision_root(&self, rev: Revnum) -> FsResult<Box<dyn RootProvider>> {
        if rev > Revnum::new(3) {
            return Err(FsError::not_found(format!("revision {rev}")));
        }
        Ok(self.root())
    }

    fn begin_txn(&self, rev: Revnum) -> FsResult<Box<dyn TxnProvider>> {
        Ok(Box::new(MockTxn {
            name: format!("{rev}-1"),
            base: rev,
            fs: MockFs {
                name: self.name,
                log: self.log.clone(),
                conflict: self.conflict,
                broken: self.broken,
            },
        }))
    }

    fn open_txn(&self, name: &str) -> FsResult<Box<dyn TxnProvider>> {
        Err(FsError::not_found(format!("transaction {name}")))
    }

    fn purge_txn(&self, name: &str) -> FsResult<()> {
        record(&self.log, self.name, "purge_txn", name);
        Ok(())
    }

    fn list_transactions(&self) -> FsResult<Vec<String>> {
        self.check_readable()?;
        Ok(Vec::new())
    }

    fn deltify(&self, rev: Revnum) -> FsResult<()> {
        record(&self.log, self.name, "deltify", &rev.to_string());
        Ok(())
    }
}

struct MockTxn {
    name: String,
    base: Revnum,
    fs: MockFs,
}

impl TxnProvider for MockTxn {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_rev(&self) -> Option<Revnum> {
        Some(self.base)
    }

    fn commit(&self) -> FsResult<Revnum> {
        record(&self.fs.log, self.fs.name, "commit", &self.name);
        if self.fs.conflict {
            return Err(FsError::conflict("/trunk/a"));
        }
        Ok(self.base.next())
    }

    fn abort(&self) -> FsResult<()> {
        record(&self.fs.log, self.fs.name, "abort", &self.name);
        Ok(())
    }

    fn prop(&self, _name: &str) -> FsResult<Option<Vec<u8>>> {
        self.fs.check_readable()?;
        Ok(None)
    }

    fn proplist(&self) -> FsResult<PropList> {
        self.fs.check_readable()?;
        Ok(PropList::new())
    }

    fn change_prop(&self, name: &str, _value: Option<&[u8]>) -> FsResult<()> {
        record(&self.fs.log, self.fs.name, "change_prop", name);
        Ok(())
    }

    fn root(&self) -> FsResult<Box<dyn RootProvider>> {
        Ok(self.fs.root())
    }
}

struct MockRoot {
    name: &'static str,
    log: CallLog,
    broken: bool,
}

impl MockRoot {
    fn record(&self, op: &str, args: &str) {
        record(&self.log, self.name, op, args);
    }
}

impl RootProvider for MockRoot {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn paths_changed(&self) -> FsResult<BTreeMap<String, PathChange>> {
        Ok(BTreeMap::new())
    }

    fn check_path(&self, path: &str) -> FsResult<NodeKind> {
        self.record("check_path", path);
        Ok(NodeKind::File)
    }

    fn node_history(&self, path: &str) -> FsResult<Box<dyn HistoryProvider>> {
        Ok(Box::new(MockHistory {
            name: self.name,
            path: path.to_string(),
            rev: Revnum::new(3),
            broken: self.broken,
        }))
    }

    fn node_id(&self, path: &str) -> FsResult<NodeRevisionId> {
        self.record("node_id", path);
        Ok(NodeRevisionId::new("1", "0", "r1"))
    }

    fn node_created_rev(&self, _path: &str) -> FsResult<Option<Revnum>> {
        Ok(Some(Revnum::new(1)))
    }

    fn node_created_path(&self, path: &str) -> FsResult<String> {
        Ok(path.to_string())
    }

    fn delete_node(&self, path: &str) -> FsResult<()> {
        self.record("delete_node", path);
        Ok(())
    }

    fn copied_from(&self, _path: &str) -> FsResult<Option<CopySource>> {
        Ok(None)
    }

    fn node_prop(&self, _path: &str, _name: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn node_proplist(&self, _path: &str) -> FsResult<PropList> {
        Ok(PropList::new())
    }

    fn change_node_prop(&self, path: &str, name: &str, _value: Option<&[u8]>) -> FsResult<()> {
        self.record("change_node_prop", &format!("{path} {name}"));
        Ok(())
    }

    fn props_changed(
        &self,
        _root1: &dyn RootProvider,
        path1: &str,
        _root2: &dyn RootProvider,
        path2: &str,
    ) -> FsResult<bool> {
        self.record("props_changed", &format!("{path1} {path2}"));
        Ok(false)
    }

    fn contents_changed(
        &self,
        _root1: &dyn RootProvider,
        path1: &str,
        _root2: &dyn RootProvider,
        path2: &str,
    ) -> FsResult<bool> {
        self.record("contents_changed", &format!("{path1} {path2}"));
        Ok(true)
    }

    fn dir_entries(&self, path: &str) -> FsResult<BTreeMap<String, DirEntry>> {
        self.record("dir_entries", path);
        Ok(BTreeMap::new())
    }

    fn make_dir(&self, path: &str) -> FsResult<()> {
        self.record("make_dir", path);
        Ok(())
    }

    fn copy(
        &self,
        _from_root: &dyn RootProvider,
        from_path: &str,
        _to_root: &dyn RootProvider,
        to_path: &str,
    ) -> FsResult<()> {
        self.record("copy", &format!("{from_path} {to_path}"));
        Ok(())
    }

    fn revision_link(
        &self,
        _from_root: &dyn RootProvider,
        _to_root: &dyn RootProvider,
        path: &str,
    ) -> FsResult<()> {
        self.record("revision_link", path);
        Ok(())
    }

    fn file_length(&self, _path: &str) -> FsResult<u64> {
        Ok(4)
    }

    fn file_checksum(&self, _path: &str) -> FsResult<Checksum> {
        Ok(Checksum::of(b"mock"))
    }

    fn file_contents(&self, _path: &str) -> FsResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(b"mock".to_vec())))
    }

    fn make_file(&self, path: &str) -> FsResult<()> {
        self.record("make_file", path);
        Ok(())
    }

    fn apply_textdelta(
        &self,
        path: &str,
        _base_checksum: Option<&Checksum>,
        _result_checksum: Option<&Checksum>,
    ) -> FsResult<Box<dyn DeltaConsumer>> {
        self.record("apply_textdelta", path);
        Ok(Box::new(MockSink {
            name: self.name,
            log: self.log.clone(),
            data: Vec::new(),
        }))
    }

    fn apply_text(
        &self,
        path: &str,
        _result_checksum: Option<&Checksum>,
    ) -> FsResult<Box<dyn ContentWriter>> {
        self.record("apply_text", path);
        Ok(Box::new(MockSink {
            name: self.name,
            log: self.log.clone(),
            data: Vec::new(),
        }))
    }

    fn file_delta_stream(
        &self,
        source: Option<(&dyn RootProvider, &str)>,
        _target_root: &dyn RootProvider,
        target_path: &str,
    ) -> FsResult<TextDeltaStream> {
        let source = source.map(|(_, p)| p).unwrap_or("-");
        self.record("file_delta_stream", &format!("{source} {target_path}"));
        Ok(TextDeltaStream::default())
    }

    fn merge(
        &self,
        _source_root: &dyn RootProvider,
        source_path: &str,
        _target_root: &dyn RootProvider,
        target_path: &str,
        _ancestor_root: &dyn RootProvider,
        ancestor_path: &str,
    ) -> FsResult<()> {
        self.record("merge", &format!("{source_path} {target_path} {ancestor_path}"));
        Ok(())
    }
}

struct MockSink {
    name: &'static str,
    log: CallLog,
    data: Vec<u8>,
}

impl DeltaConsumer for MockSink {
    fn push(&mut self, window: &DeltaWindow) -> FsResult<()> {
        self.data.extend_from_slice(&window.new_data);
        Ok(())
    }

    fn close(self: Box<Self>) -> FsResult<()> {
        let text = String::from_utf8_lossy(&self.data).into_owned();
        record(&self.log, self.name, "close", &text);
        Ok(())
    }
}

impl Write for MockSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ContentWriter for MockSink {
    fn close(self: Box<Self>) -> FsResult<()> {
        let text = String::from_utf8_lossy(&self.data).into_owned();
        record(&self.log, self.name, "close", &text);
        Ok(())
    }
}

struct MockHistory {
    name: &'static str,
    path: String,
    rev: Revnum,
    broken: bool,
}

impl HistoryProvider for MockHistory {
    fn prev(&self, _cross_copies: bool) -> FsResult<Option<Box<dyn HistoryProvider>>> {
        if self.broken {
            return Err(unreadable(self.name));
        }
        Ok(self.rev.prev().filter(|r| *r > Revnum::ZERO).map(|rev| {
            Box::new(MockHistory {
                name: self.name,
                path: self.path.clone(),
                rev,
                broken: self.broken,
            }) as Box<dyn HistoryProvider>
        }))
    }

    fn location(&self) -> (String, Revnum) {
        (self.path.clone(), self.rev)
    }
}
