//! Behaviour every built-in provider must share, checked against each one.

use std::path::PathBuf;
use std::sync::Arc;

use revfs_fs::{
    copy, replay, revision_link, ChangeKind, Checksum, ErrorKind, Filesystem, FsConfig,
    NodeKind, Registry, Revnum, Root, TxnReplayEditor, TxnState, PROP_REVISION_DATE,
    PROP_REVISION_LOG,
};
use tempfile::TempDir;

use crate::{default_registry, join, BUILTIN_PROVIDERS};

struct Harness {
    _dir: TempDir,
    registry: Registry,
    provider: &'static str,
    path: PathBuf,
}

impl Harness {
    fn new(provider: &'static str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo");
        Self {
            _dir: dir,
            registry: default_registry(),
            provider,
            path,
        }
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.path.with_file_name(name)
    }

    fn create(&self) -> Filesystem {
        self.create_at(&self.path)
    }

    fn create_at(&self, path: &std::path::Path) -> Filesystem {
        self.registry
            .create(self.provider, path, &FsConfig::new())
            .unwrap()
    }

    fn open(&self) -> Filesystem {
        self.registry
            .open(self.provider, &self.path, &FsConfig::new())
            .unwrap()
    }
}

fn each_provider(check: impl Fn(&Harness)) {
    for provider in BUILTIN_PROVIDERS {
        check(&Harness::new(provider));
    }
}

/// Commit one transaction on top of the youngest revision.
fn commit(fs: &Filesystem, edit: impl FnOnce(&Root)) -> Revnum {
    let mut txn = fs.begin_txn(fs.youngest_rev().unwrap()).unwrap();
    edit(&txn.root().unwrap());
    txn.commit().unwrap()
}

fn put(root: &Root, path: &str, contents: &[u8]) {
    if root.check_path(path).unwrap() == NodeKind::None {
        root.make_file(path).unwrap();
    }
    root.write_file(path, contents).unwrap();
}

/// r1: /trunk/{a,b}, /other/x. r2: edit /trunk/a, copy /trunk@1 to /branch,
/// set a property on /trunk/b.
fn seed(fs: &Filesystem) {
    commit(fs, |root| {
        root.make_dir("/trunk").unwrap();
        root.make_dir("/other").unwrap();
        put(root, "/trunk/a", b"alpha\n");
        put(root, "/trunk/b", b"beta\n");
        put(root, "/other/x", b"untouched\n");
    });
    commit(fs, |root| {
        put(root, "/trunk/a", b"alpha, edited\n");
        let r1 = fs.revision_root(Revnum::new(1)).unwrap();
        copy(&r1, "/trunk", root, "/branch").unwrap();
        root.change_node_prop("/trunk/b", "mime", Some(b"text/plain")).unwrap();
    });
}

fn assert_same_tree(left: &Root, right: &Root, path: &str) {
    let kind = left.check_path(path).unwrap();
    assert_eq!(kind, right.check_path(path).unwrap(), "kind of {path}");
    assert_eq!(
        left.node_proplist(path).unwrap(),
        right.node_proplist(path).unwrap(),
        "props of {path}"
    );
    match kind {
        NodeKind::File => assert_eq!(
            left.read_file(path).unwrap(),
            right.read_file(path).unwrap(),
            "contents of {path}"
        ),
        NodeKind::Dir => {
            let names: Vec<String> = left.dir_entries(path).unwrap().into_keys().collect();
            let other: Vec<String> = right.dir_entries(path).unwrap().into_keys().collect();
            assert_eq!(names, other, "entries of {path}");
            for name in names {
                assert_same_tree(left, right, &join(path, &name));
            }
        }
        NodeKind::None => {}
    }
}

// -----------------------------------------------------------------------
// Lifecycle
// -----------------------------------------------------------------------

#[test]
fn new_repository_is_empty_revision_zero() {
    each_provider(|h| {
        let fs = h.create();
        assert_eq!(fs.provider_name(), h.provider);
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::ZERO);
        assert!(!fs.uuid().unwrap().is_empty());

        let root = fs.revision_root(Revnum::ZERO).unwrap();
        assert_eq!(root.check_path("/").unwrap(), NodeKind::Dir);
        assert!(root.dir_entries("/").unwrap().is_empty());
        assert!(fs
            .revision_prop(Revnum::ZERO, PROP_REVISION_DATE)
            .unwrap()
            .is_some());
    });
}

#[test]
fn create_twice_is_already_exists() {
    each_provider(|h| {
        let _fs = h.create();
        let err = h
            .registry
            .create(h.provider, &h.path, &FsConfig::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists, "{}", h.provider);
    });
}

#[test]
fn reopen_sees_committed_revisions() {
    each_provider(|h| {
        let uuid = {
            let fs = h.create();
            seed(&fs);
            fs.uuid().unwrap()
        };
        let fs = h.open();
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(2));
        assert_eq!(fs.uuid().unwrap(), uuid);
        let root = fs.revision_root(Revnum::new(2)).unwrap();
        assert_eq!(root.read_file("/trunk/a").unwrap(), b"alpha, edited\n");
        assert_eq!(root.read_file("/branch/a").unwrap(), b"alpha\n");
    });
}

#[test]
fn delete_removes_repository() {
    each_provider(|h| {
        drop(h.create());
        h.registry.delete(h.provider, &h.path).unwrap();
        let err = h
            .registry
            .open(h.provider, &h.path, &FsConfig::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{}", h.provider);
    });
}

#[test]
fn hotcopy_preserves_history_and_uuid() {
    each_provider(|h| {
        let fs = h.create();
        seed(&fs);
        let dest = h.sibling("copy");
        h.registry.hotcopy(h.provider, &h.path, &dest, false).unwrap();

        let copy = h
            .registry
            .open(h.provider, &dest, &FsConfig::new())
            .unwrap();
        assert_eq!(copy.uuid().unwrap(), fs.uuid().unwrap());
        assert_eq!(copy.youngest_rev().unwrap(), Revnum::new(2));
        assert_same_tree(
            &fs.revision_root(Revnum::new(2)).unwrap(),
            &copy.revision_root(Revnum::new(2)).unwrap(),
            "/",
        );

        // The copy is independent of its source.
        commit(&fs, |root| put(root, "/later", b"x"));
        assert_eq!(copy.youngest_rev().unwrap(), Revnum::new(2));
    });
}

#[test]
fn maintenance_hooks_match_provider_capabilities() {
    let h = Harness::new("memory");
    let fs = h.create();
    let handler = Arc::new(|_: &str, _: &str| {});
    assert_eq!(fs.set_errcall(handler).unwrap_err().kind(), ErrorKind::Unsupported);
    assert_eq!(
        h.registry.recover("memory", &h.path).unwrap_err().kind(),
        ErrorKind::Unsupported
    );
    assert_eq!(
        h.registry
            .logfiles("memory", &h.path, false)
            .unwrap_err()
            .kind(),
        ErrorKind::Unsupported
    );

    let h = Harness::new("journal");
    let fs = h.create();
    fs.set_errcall(Arc::new(|_: &str, _: &str| {})).unwrap();
    let logs = h.registry.logfiles("journal", &h.path, false).unwrap();
    assert!(!logs.is_empty());
    assert!(h
        .registry
        .logfiles("journal", &h.path, true)
        .unwrap()
        .is_empty());
}

#[test]
fn journal_repository_is_detected() {
    let h = Harness::new("journal");
    drop(h.create());
    assert_eq!(Registry::detect(&h.path).unwrap(), "journal");
    let fs = h.registry.open_detected(&h.path, &FsConfig::new()).unwrap();
    assert_eq!(fs.provider_name(), "journal");
}

// -----------------------------------------------------------------------
// Transactions
// -----------------------------------------------------------------------

#[test]
fn commits_allocate_increasing_revisions() {
    each_provider(|h| {
        let fs = h.create();
        let mut last = Revnum::ZERO;
        for i in 0..4 {
            let rev = commit(&fs, |root| put(root, &format!("/f{i}"), b"x"));
            assert!(rev > last, "{}: r{rev} after r{last}", h.provider);
            last = rev;
        }
        assert_eq!(fs.youngest_rev().unwrap(), last);
    });
}

#[test]
fn aborted_transaction_leaves_no_trace() {
    each_provider(|h| {
        let fs = h.create();
        seed(&fs);
        let before = fs.revision_root(Revnum::new(2)).unwrap();
        let before_ids: Vec<_> = ["/", "/trunk", "/trunk/a", "/branch"]
            .iter()
            .map(|p| before.node_id(p).unwrap())
            .collect();

        let mut txn = fs.begin_txn(Revnum::new(2)).unwrap();
        let root = txn.root().unwrap();
        put(&root, "/trunk/a", b"scratch");
        root.delete_node("/branch").unwrap();
        root.make_dir("/new").unwrap();
        txn.abort().unwrap();

        assert_eq!(txn.state(), TxnState::Aborted);
        assert_eq!(txn.commit().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(2));
        assert!(fs.list_transactions().unwrap().is_empty());

        let after = fs.revision_root(Revnum::new(2)).unwrap();
        assert_same_tree(&before, &after, "/");
        let after_ids: Vec<_> = ["/", "/trunk", "/trunk/a", "/branch"]
            .iter()
            .map(|p| after.node_id(p).unwrap())
            .collect();
        assert_eq!(before_ids, after_ids);
    });
}

#[test]
fn transactions_are_listed_until_finished() {
    each_provider(|h| {
        let fs = h.create();
        let mut first = fs.begin_txn(Revnum::ZERO).unwrap();
        let second = fs.begin_txn(Revnum::ZERO).unwrap();
        let mut names = fs.list_transactions().unwrap();
        names.sort();
        let mut expected = vec![first.name().to_string(), second.name().to_string()];
        expected.sort();
        assert_eq!(names, expected);

        let reopened = fs.open_txn(second.name()).unwrap();
        assert_eq!(reopened.base_rev(), Some(Revnum::ZERO));

        first.abort().unwrap();
        fs.purge_txn(second.name()).unwrap();
        assert!(fs.list_transactions().unwrap().is_empty());
        assert_eq!(
            fs.open_txn(second.name()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    });
}

#[test]
fn finished_transactions_refuse_further_use() {
    each_provider(|h| {
        let fs = h.create();
        let mut txn = fs.begin_txn(Revnum::ZERO).unwrap();
        let root = txn.root().unwrap();
        let other = fs.open_txn(txn.name()).unwrap();
        root.make_dir("/d").unwrap();
        txn.commit().unwrap();

        let stale = [
            root.make_file("/d/late").unwrap_err(),
            root.check_path("/d").unwrap_err(),
            other.root().unwrap_err(),
            fs.open_txn(txn.name()).unwrap_err(),
        ];
        for err in stale {
            assert_eq!(err.kind(), ErrorKind::InvalidState, "{}: {err}", h.provider);
        }

        let mut txn = fs.begin_txn(Revnum::new(1)).unwrap();
        let root = txn.root().unwrap();
        let other = fs.open_txn(txn.name()).unwrap();
        txn.abort().unwrap();
        assert_eq!(root.check_path("/d").unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(other.root().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(1));
    });
}

#[test]
fn transaction_props_become_revision_props() {
    each_provider(|h| {
        let fs = h.create();
        let mut txn = fs.begin_txn(Revnum::ZERO).unwrap();
        txn.change_prop(PROP_REVISION_LOG, Some(b"first import")).unwrap();
        txn.root().unwrap().make_dir("/trunk").unwrap();
        let rev = txn.commit().unwrap();

        let props = fs.revision_proplist(rev).unwrap();
        assert_eq!(props[PROP_REVISION_LOG], b"first import".to_vec());
        assert!(props.contains_key(PROP_REVISION_DATE));

        fs.change_rev_prop(rev, PROP_REVISION_LOG, Some(b"reworded")).unwrap();
        assert_eq!(
            fs.revision_prop(rev, PROP_REVISION_LOG).unwrap(),
            Some(b"reworded".to_vec())
        );
    });
}

#[test]
fn disjoint_concurrent_commits_both_succeed() {
    each_provider(|h| {
        let fs = h.create();
        commit(&fs, |root| {
            put(root, "/a", b"a0");
            put(root, "/b", b"b0");
        });

        let mut left = fs.begin_txn(Revnum::new(1)).unwrap();
        let mut right = fs.begin_txn(Revnum::new(1)).unwrap();
        put(&left.root().unwrap(), "/a", b"a1");
        put(&right.root().unwrap(), "/b", b"b1");
        put(&right.root().unwrap(), "/c", b"c1");

        assert_eq!(left.commit().unwrap(), Revnum::new(2));
        assert_eq!(right.commit().unwrap(), Revnum::new(3));

        let root = fs.revision_root(Revnum::new(3)).unwrap();
        assert_eq!(root.read_file("/a").unwrap(), b"a1");
        assert_eq!(root.read_file("/b").unwrap(), b"b1");
        assert_eq!(root.read_file("/c").unwrap(), b"c1");
    });
}

#[test]
fn overlapping_commits_report_conflict() {
    each_provider(|h| {
        let fs = h.create();
        commit(&fs, |root| put(root, "/f", b"base"));

        let mut left = fs.begin_txn(Revnum::new(1)).unwrap();
        let mut right = fs.begin_txn(Revnum::new(1)).unwrap();
        put(&left.root().unwrap(), "/f", b"left");
        put(&right.root().unwrap(), "/f", b"right");

        left.commit().unwrap();
        let err = right.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict, "{}", h.provider);
        assert_eq!(err.conflict_path(), Some("/f"));

        // The loser stays open with its own edit intact.
        assert_eq!(right.state(), TxnState::Open);
        assert_eq!(right.root().unwrap().read_file("/f").unwrap(), b"right");
        assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(2));
        right.abort().unwrap();
    });
}

// -----------------------------------------------------------------------
// Roots
// -----------------------------------------------------------------------

#[test]
fn paths_are_canonicalized() {
    each_provider(|h| {
        let fs = h.create();
        let rev = commit(&fs, |root| {
            root.make_dir("a//").unwrap();
            root.make_file("/a///f/").unwrap();
            root.write_file("a/f", b"x").unwrap();
        });
        let root = fs.revision_root(rev).unwrap();
        assert_eq!(root.check_path("//a/f").unwrap(), NodeKind::File);
        let changed: Vec<String> = root.paths_changed().unwrap().into_keys().collect();
        assert_eq!(changed, vec!["/a".to_string(), "/a/f".to_string()]);
    });
}

#[test]
fn unwritten_path_is_kind_none() {
    each_provider(|h| {
        let fs = h.create();
        let root = fs.revision_root(Revnum::ZERO).unwrap();
        assert_eq!(root.check_path("/never/written").unwrap(), NodeKind::None);
        assert_eq!(
            root.node_id("/never/written").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    });
}

#[test]
fn revision_roots_reject_writes() {
    each_provider(|h| {
        let fs = h.create();
        seed(&fs);
        let root = fs.revision_root(Revnum::new(2)).unwrap();
        assert_eq!(root.make_dir("/x").unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(
            root.delete_node("/trunk").unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert!(matches!(
            root.apply_text("/trunk/a", None),
            Err(e) if e.kind() == ErrorKind::InvalidState
        ));
        assert_eq!(
            root.change_node_prop("/trunk", "p", Some(b"v"))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidState
        );
    });
}

#[test]
fn checksum_mismatch_hides_content() {
    each_provider(|h| {
        let fs = h.create();
        commit(&fs, |root| put(root, "/f", b"original"));

        let txn = fs.begin_txn(Revnum::new(1)).unwrap();
        let root = txn.root().unwrap();
        let mut sink = root
            .apply_text("/f", Some(&Checksum::of(b"what was promised")))
            .unwrap();
        std::io::Write::write_all(&mut sink, b"what was sent").unwrap();
        let err = sink.close().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch, "{}", h.provider);

        assert_eq!(root.read_file("/f").unwrap(), b"original");
        assert!(!root.paths_changed().unwrap().contains_key("/f"));
    });
}

#[test]
fn file_metadata_and_delta_streams() {
    each_provider(|h| {
        let fs = h.create();
        seed(&fs);
        let r1 = fs.revision_root(Revnum::new(1)).unwrap();
        let r2 = fs.revision_root(Revnum::new(2)).unwrap();

        assert_eq!(r2.file_length("/trunk/a").unwrap(), 14);
        assert_eq!(
            r2.file_checksum("/trunk/a").unwrap(),
            Checksum::of(b"alpha, edited\n")
        );
        assert!(revfs_fs::contents_changed(&r1, "/trunk/a", &r2, "/trunk/a").unwrap());
        assert!(!revfs_fs::contents_changed(&r1, "/trunk/b", &r2, "/trunk/b").unwrap());
        assert!(revfs_fs::props_changed(&r1, "/trunk/b", &r2, "/trunk/b").unwrap());

        let windows: Vec<_> =
            revfs_fs::file_delta_stream(Some((&r1, "/trunk/a")), &r2, "/trunk/a")
                .unwrap()
                .collect();
        let rebuilt = crate::apply_delta(b"alpha\n", &windows).unwrap();
        assert_eq!(rebuilt, b"alpha, edited\n");

        let entries = r2.dir_entries("/trunk").unwrap();
        assert_eq!(entries["a"].kind, NodeKind::File);
        assert_eq!(entries["a"].id, r2.node_id("/trunk/a").unwrap());
    });
}

// -----------------------------------------------------------------------
// Copies and history
// -----------------------------------------------------------------------

#[test]
fn copy_records_source_and_link_shares_node() {
    each_provider(|h| {
        let fs = h.create();
        seed(&fs);
        let r2 = fs.revision_root(Revnum::new(2)).unwrap();
        let copied = r2.copied_from("/branch").unwrap().unwrap();
        assert_eq!(copied.rev, Revnum::new(1));
        assert_eq!(copied.path, "/trunk");
        assert_eq!(r2.paths_changed().unwrap()["/branch"].kind, ChangeKind::Add);
        assert_ne!(r2.node_id("/branch").unwrap(), r2.node_id("/trunk").unwrap());
        assert!(r2
            .node_id("/branch")
            .unwrap()
            .is_same_node(&r2.node_id("/trunk").unwrap()));

        let txn = fs.begin_txn(Revnum::new(2)).unwrap();
        let root = txn.root().unwrap();
        let r1 = fs.revision_root(Revnum::new(1)).unwrap();
        revision_link(&r1, &root, "/trunk/a").unwrap();
        assert_eq!(
            root.node_id("/trunk/a").unwrap(),
            r1.node_id("/trunk/a").unwrap()
        );
        assert_eq!(root.read_file("/trunk/a").unwrap(), b"alpha\n");
        assert!(root.copied_from("/trunk/a").unwrap().is_none());
    });
}

#[test]
fn copy_from_transaction_root_is_rejected() {
    each_provider(|h| {
        let fs = h.create();
        seed(&fs);
        let txn = fs.begin_txn(Revnum::new(2)).unwrap();
        let root = txn.root().unwrap();
        let err = copy(&root, "/trunk", &root, "/elsewhere").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    });
}

#[test]
fn history_crosses_copies_on_request() {
    each_provider(|h| {
        let fs = h.create();
        seed(&fs);
        let rev = commit(&fs, |root| put(root, "/branch/a", b"on the branch\n"));
        let root = fs.revision_root(rev).unwrap();

        let crossing: Vec<(String, u64)> = root
            .node_history("/branch/a")
            .unwrap()
            .iter(true)
            .map(|loc| loc.map(|(p, r)| (p, r.get())))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            crossing,
            vec![
                ("/branch/a".to_string(), 3),
                ("/branch/a".to_string(), 2),
                ("/trunk/a".to_string(), 1),
            ]
        );

        let stopping: Vec<(String, u64)> = root
            .node_history("/branch/a")
            .unwrap()
            .iter(false)
            .map(|loc| loc.map(|(p, r)| (p, r.get())))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            stopping,
            vec![("/branch/a".to_string(), 3), ("/branch/a".to_string(), 2)]
        );
    });
}

#[test]
fn history_stops_where_a_copy_replaced_the_path() {
    each_provider(|h| {
        let fs = h.create();
        commit(&fs, |root| {
            root.make_dir("/a").unwrap();
            root.make_dir("/b").unwrap();
            put(root, "/a/f", b"from a\n");
            put(root, "/b/f", b"from b\n");
        });
        let rev = commit(&fs, |root| {
            root.delete_node("/a").unwrap();
            let r1 = fs.revision_root(Revnum::new(1)).unwrap();
            copy(&r1, "/b", root, "/a").unwrap();
            put(root, "/a/f", b"edited\n");
        });
        let root = fs.revision_root(rev).unwrap();
        let walk = |cross: bool| -> Vec<(String, u64)> {
            root.node_history("/a/f")
                .unwrap()
                .iter(cross)
                .map(|loc| loc.map(|(p, r)| (p, r.get())))
                .collect::<Result<_, _>>()
                .unwrap()
        };

        assert_eq!(walk(false), vec![("/a/f".to_string(), 2)]);
        assert_eq!(
            walk(true),
            vec![("/a/f".to_string(), 2), ("/b/f".to_string(), 1)]
        );
    });
}

#[test]
fn transaction_roots_have_no_history() {
    each_provider(|h| {
        let fs = h.create();
        let txn = fs.begin_txn(Revnum::ZERO).unwrap();
        let err = txn.root().unwrap().node_history("/").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    });
}

// -----------------------------------------------------------------------
// Deltification and replay
// -----------------------------------------------------------------------

#[test]
fn deltify_is_invisible_and_repeatable() {
    each_provider(|h| {
        let fs = h.create();
        seed(&fs);
        let before = fs.revision_root(Revnum::new(1)).unwrap().read_file("/trunk/a").unwrap();
        fs.deltify(Revnum::new(2)).unwrap();
        fs.deltify(Revnum::new(2)).unwrap();
        let r1 = fs.revision_root(Revnum::new(1)).unwrap();
        assert_eq!(r1.read_file("/trunk/a").unwrap(), before);
        assert_eq!(
            fs.revision_root(Revnum::new(2))
                .unwrap()
                .read_file("/trunk/a")
                .unwrap(),
            b"alpha, edited\n"
        );
    });
}

#[test]
fn deltified_content_survives_reopen() {
    let h = Harness::new("journal");
    {
        let fs = h.create();
        seed(&fs);
        fs.deltify(Revnum::new(2)).unwrap();
    }
    let fs = h.open();
    let r1 = fs.revision_root(Revnum::new(1)).unwrap();
    assert_eq!(r1.read_file("/trunk/a").unwrap(), b"alpha\n");
}

#[test]
fn replay_mirrors_every_revision() {
    each_provider(|h| {
        let source = h.create();
        seed(&source);
        commit(&source, |root| {
            root.delete_node("/trunk/b").unwrap();
            put(root, "/branch/new", b"fresh\n");
        });

        let mirror = h.create_at(&h.sibling("mirror"));
        let youngest = source.youngest_rev().unwrap();
        for n in 1..=youngest.get() {
            let rev = Revnum::new(n);
            let mut txn = mirror.begin_txn(Revnum::new(n - 1)).unwrap();
            let target = txn.root().unwrap();
            let mut editor = TxnReplayEditor::new(&target).unwrap();
            replay(&source.revision_root(rev).unwrap(), &mut editor).unwrap();
            assert_eq!(txn.commit().unwrap(), rev);

            assert_same_tree(
                &source.revision_root(rev).unwrap(),
                &mirror.revision_root(rev).unwrap(),
                "/",
            );
        }

        // Subtrees a revision did not touch keep their node-revision.
        let (r1, r2) = (
            mirror.revision_root(Revnum::new(1)).unwrap(),
            mirror.revision_root(Revnum::new(2)).unwrap(),
        );
        assert_eq!(r1.node_id("/other").unwrap(), r2.node_id("/other").unwrap());
        assert_eq!(
            r1.node_id("/other/x").unwrap(),
            r2.node_id("/other/x").unwrap()
        );
        assert_eq!(
            r2.copied_from("/branch").unwrap(),
            source
                .revision_root(Revnum::new(2))
                .unwrap()
                .copied_from("/branch")
                .unwrap()
        );
    });
}

// -----------------------------------------------------------------------
// Journal recovery
// -----------------------------------------------------------------------

#[test]
fn recover_retires_old_logs() {
    let h = Harness::new("journal");
    let config = FsConfig::new().with("journal.segment-records", "2");
    {
        let fs = h.registry.create("journal", &h.path, &config).unwrap();
        seed(&fs);
        commit(&fs, |root| put(root, "/more", b"m"));
        assert_eq!(
            h.registry.recover("journal", &h.path).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    let all = h.registry.logfiles("journal", &h.path, false).unwrap();
    h.registry.recover("journal", &h.path).unwrap();
    let unused = h.registry.logfiles("journal", &h.path, true).unwrap();
    assert_eq!(unused, all);

    let fs = h.registry.open("journal", &h.path, &config).unwrap();
    assert_eq!(fs.youngest_rev().unwrap(), Revnum::new(3));
    assert_eq!(
        fs.revision_root(Revnum::new(3))
            .unwrap()
            .read_file("/more")
            .unwrap(),
        b"m"
    );
}
