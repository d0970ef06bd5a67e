use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use revfs::{
    canonicalize_abspath, components, default_registry, join, replay, ChangeKind, Checksum,
    CopySource, Filesystem, FsConfig, FsResult, NodeKind, NodeRevisionId, Registry, ReplayEditor,
    Revnum, Root, TextDeltaStream, Transaction, PROP_REVISION_AUTHOR, PROP_REVISION_LOG,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cli::*;

/// What every command needs: providers, configuration and output style.
struct Session {
    registry: Registry,
    config: FsConfig,
    format: OutputFormat,
}

impl Session {
    fn new(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => FsConfig::from_file(path)
                .with_context(|| format!("reading configuration {}", path.display()))?,
            None => FsConfig::new(),
        };
        debug!(keys = config.len(), "loaded configuration");
        Ok(Self {
            registry: default_registry(),
            config,
            format: cli.format,
        })
    }

    fn open(&self, repo: &Path) -> anyhow::Result<Filesystem> {
        self.registry
            .open_detected(repo, &self.config)
            .with_context(|| format!("opening repository {}", repo.display()))
    }

    fn provider_of(&self, repo: &Path) -> anyhow::Result<String> {
        Registry::detect(repo).with_context(|| format!("reading repository {}", repo.display()))
    }

    /// JSON goes to stdout as-is; text output is left to `text`.
    fn emit(&self, value: Value, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let session = Session::new(&cli)?;
    let s = &session;
    match cli.command {
        Command::Create(args) => cmd_create(s, args),
        Command::Youngest(args) => cmd_youngest(s, args),
        Command::Lstxns(args) => cmd_lstxns(s, args),
        Command::Rmtxns(args) => cmd_rmtxns(s, args),
        Command::Recover(args) => cmd_recover(s, args),
        Command::ListLogs(args) => cmd_list_logs(s, args),
        Command::Hotcopy(args) => cmd_hotcopy(s, args),
        Command::Deltify(args) => cmd_deltify(s, args),
        Command::Tree(args) => cmd_tree(s, args),
        Command::Changed(args) => cmd_changed(s, args),
        Command::History(args) => cmd_history(s, args),
        Command::Revprop(args) => cmd_revprop(s, args.action),
        Command::Replay(args) => cmd_replay(s, args),
        Command::Put(args) => cmd_put(s, args),
        Command::Mkdir(args) => cmd_mkdir(s, args),
    }
}

fn revision_or_youngest(fs: &Filesystem, rev: Option<Revnum>) -> anyhow::Result<Revnum> {
    match rev {
        Some(rev) => Ok(rev),
        None => Ok(fs.youngest_rev()?),
    }
}

fn lossy(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

// ---------------------------------------------------------------------------
// Repository lifecycle
// ---------------------------------------------------------------------------

fn cmd_create(s: &Session, args: CreateArgs) -> anyhow::Result<()> {
    let fs = s.registry.create(&args.fs_type, &args.repo, &s.config)?;
    let uuid = fs.uuid()?;
    let location = args.repo.display().to_string();
    s.emit(
        json!({ "path": location, "fs_type": args.fs_type, "uuid": uuid }),
        || {
            println!(
                "{} Created {} repository at {}",
                "✓".green().bold(),
                args.fs_type.cyan(),
                location.bold()
            );
            println!("  UUID: {}", uuid.yellow());
        },
    )
}

fn cmd_youngest(s: &Session, args: RepoArgs) -> anyhow::Result<()> {
    let youngest = s.open(&args.repo)?.youngest_rev()?;
    s.emit(json!({ "youngest": youngest.get() }), || println!("{youngest}"))
}

fn cmd_lstxns(s: &Session, args: RepoArgs) -> anyhow::Result<()> {
    let mut names = s.open(&args.repo)?.list_transactions()?;
    names.sort();
    s.emit(json!({ "transactions": names }), || {
        for name in &names {
            println!("{name}");
        }
    })
}

fn cmd_rmtxns(s: &Session, args: RmtxnsArgs) -> anyhow::Result<()> {
    let fs = s.open(&args.repo)?;
    for name in &args.names {
        fs.purge_txn(name)
            .with_context(|| format!("removing transaction {name}"))?;
    }
    s.emit(json!({ "removed": args.names }), || {
        for name in &args.names {
            println!("Transaction {} removed.", name.yellow());
        }
    })
}

fn cmd_recover(s: &Session, args: RepoArgs) -> anyhow::Result<()> {
    let provider = s.provider_of(&args.repo)?;
    s.registry.recover(&provider, &args.repo)?;
    let youngest = s.open(&args.repo)?.youngest_rev()?;
    s.emit(json!({ "recovered": true, "youngest": youngest.get() }), || {
        println!("{} Recovery completed.", "✓".green().bold());
        println!("  The latest revision is {}.", youngest.to_string().bold());
    })
}

fn cmd_list_logs(s: &Session, args: ListLogsArgs) -> anyhow::Result<()> {
    let provider = s.provider_of(&args.repo)?;
    let logs = s
        .registry
        .logfiles(&provider, &args.repo, args.only_unused)?;
    s.emit(json!({ "logs": logs }), || {
        for name in &logs {
            println!("{}", args.repo.join(name).display());
        }
    })
}

fn cmd_hotcopy(s: &Session, args: HotcopyArgs) -> anyhow::Result<()> {
    let provider = s.provider_of(&args.src)?;
    s.registry
        .hotcopy(&provider, &args.src, &args.dest, args.clean)?;
    let (src, dest) = (
        args.src.display().to_string(),
        args.dest.display().to_string(),
    );
    s.emit(
        json!({ "src": src, "dest": dest, "clean": args.clean }),
        || println!("{} Copied {} to {}", "✓".green().bold(), src, dest.bold()),
    )
}

fn cmd_deltify(s: &Session, args: RevArgs) -> anyhow::Result<()> {
    let fs = s.open(&args.repo)?;
    let rev = revision_or_youngest(&fs, args.revision)?;
    fs.deltify(rev)?;
    s.emit(json!({ "deltified": rev.get() }), || {
        println!("{} Deltified revision {}.", "✓".green(), rev.to_string().bold())
    })
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

struct TreeLine {
    path: String,
    depth: usize,
    kind: NodeKind,
    id: NodeRevisionId,
    length: Option<u64>,
}

fn walk_tree(root: &Root, path: &str, depth: usize, out: &mut Vec<TreeLine>) -> FsResult<()> {
    let kind = root.check_path(path)?;
    let length = match kind {
        NodeKind::File => Some(root.file_length(path)?),
        _ => None,
    };
    out.push(TreeLine {
        path: path.to_string(),
        depth,
        kind,
        id: root.node_id(path)?,
        length,
    });
    if kind == NodeKind::Dir {
        for name in root.dir_entries(path)?.into_keys() {
            walk_tree(root, &join(path, &name), depth + 1, out)?;
        }
    }
    Ok(())
}

fn cmd_tree(s: &Session, args: TreeArgs) -> anyhow::Result<()> {
    let fs = s.open(&args.repo)?;
    let rev = revision_or_youngest(&fs, args.revision)?;
    let root = fs.revision_root(rev)?;
    let path = canonicalize_abspath(&args.path);
    if root.check_path(&path)? == NodeKind::None {
        bail!("path {path} does not exist in revision {rev}");
    }
    let mut lines = Vec::new();
    walk_tree(&root, &path, 0, &mut lines)?;

    let nodes: Vec<Value> = lines
        .iter()
        .map(|l| {
            json!({
                "path": l.path,
                "kind": l.kind.to_string(),
                "id": l.id.to_string(),
                "length": l.length,
            })
        })
        .collect();
    s.emit(json!({ "revision": rev.get(), "nodes": nodes }), || {
        for line in &lines {
            let name = match line.depth {
                0 => line.path.clone(),
                _ => revfs::basename(&line.path).to_string(),
            };
            let label = match line.kind {
                NodeKind::Dir if line.depth > 0 => format!("{name}/").blue().bold(),
                _ => name.normal(),
            };
            let id = if args.ids {
                format!(" <{}>", line.id).dimmed().to_string()
            } else {
                String::new()
            };
            println!("{}{label}{id}", "  ".repeat(line.depth));
        }
    })
}

fn cmd_changed(s: &Session, args: RevArgs) -> anyhow::Result<()> {
    let fs = s.open(&args.repo)?;
    let rev = revision_or_youngest(&fs, args.revision)?;
    let changes = fs.revision_root(rev)?.paths_changed()?;

    let list: Vec<Value> = changes
        .iter()
        .map(|(path, change)| {
            json!({
                "path": path,
                "kind": change.kind.to_string(),
                "text_mod": change.text_mod,
                "prop_mod": change.prop_mod,
            })
        })
        .collect();
    s.emit(json!({ "revision": rev.get(), "changes": list }), || {
        for (path, change) in &changes {
            let code = change.kind.code().to_string();
            let code = match change.kind {
                ChangeKind::Add => code.green(),
                ChangeKind::Delete => code.red(),
                ChangeKind::Modify => code.yellow(),
                ChangeKind::Replace => code.magenta(),
            };
            let text = if change.text_mod { 'T' } else { ' ' };
            let prop = if change.prop_mod { 'P' } else { ' ' };
            println!("{code}{text}{prop} {path}");
        }
    })
}

fn cmd_history(s: &Session, args: HistoryArgs) -> anyhow::Result<()> {
    let fs = s.open(&args.repo)?;
    let rev = revision_or_youngest(&fs, args.revision)?;
    let root = fs.revision_root(rev)?;
    let locations = root
        .node_history(&args.path)?
        .iter(args.cross_copies)
        .take(args.limit.unwrap_or(usize::MAX))
        .collect::<FsResult<Vec<_>>>()?;

    let list: Vec<Value> = locations
        .iter()
        .map(|(path, rev)| json!({ "path": path, "revision": rev.get() }))
        .collect();
    s.emit(json!({ "history": list }), || {
        println!("{:>8}   {}", "REVISION".bold(), "PATH".bold());
        println!("{:>8}   {}", "--------", "----");
        for (path, rev) in &locations {
            println!("{:>8}   {}", rev.to_string().yellow(), path);
        }
    })
}

fn cmd_revprop(s: &Session, action: RevpropAction) -> anyhow::Result<()> {
    match action {
        RevpropAction::List { repo, revision } => {
            let fs = s.open(&repo)?;
            let rev = revision_or_youngest(&fs, revision)?;
            let props = fs.revision_proplist(rev)?;
            let map: serde_json::Map<String, Value> = props
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(lossy(value))))
                .collect();
            s.emit(json!({ "revision": rev.get(), "props": map }), || {
                for (name, value) in &props {
                    println!("{}: {}", name.cyan(), lossy(value));
                }
            })
        }
        RevpropAction::Get {
            repo,
            name,
            revision,
        } => {
            let fs = s.open(&repo)?;
            let rev = revision_or_youngest(&fs, revision)?;
            let Some(value) = fs.revision_prop(rev, &name)? else {
                bail!("revision {rev} has no property {name}");
            };
            let value = lossy(&value);
            s.emit(json!({ "revision": rev.get(), "name": name, "value": value }), || {
                println!("{value}")
            })
        }
        RevpropAction::Set {
            repo,
            name,
            value,
            revision,
        } => {
            let fs = s.open(&repo)?;
            let rev = revision_or_youngest(&fs, revision)?;
            fs.change_rev_prop(rev, &name, Some(value.as_bytes()))?;
            s.emit(json!({ "revision": rev.get(), "name": name, "value": value }), || {
                println!("Set {} on revision {}.", name.cyan(), rev.to_string().bold())
            })
        }
        RevpropAction::Delete {
            repo,
            name,
            revision,
        } => {
            let fs = s.open(&repo)?;
            let rev = revision_or_youngest(&fs, revision)?;
            fs.change_rev_prop(rev, &name, None)?;
            s.emit(json!({ "revision": rev.get(), "name": name, "deleted": true }), || {
                println!("Deleted {} from revision {}.", name.cyan(), rev.to_string().bold())
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// One editor call of a replayed revision.
struct EditStep {
    op: &'static str,
    path: String,
    detail: Option<String>,
}

/// Editor that only records the calls it receives.
#[derive(Default)]
struct DriveLog {
    steps: Vec<EditStep>,
}

impl DriveLog {
    fn push(&mut self, op: &'static str, path: &str, detail: Option<String>) -> FsResult<()> {
        self.steps.push(EditStep {
            op,
            path: path.to_string(),
            detail,
        });
        Ok(())
    }
}

fn copy_detail(copy_from: Option<&CopySource>) -> Option<String> {
    copy_from.map(|src| format!("from {}@{}", src.path, src.rev))
}

impl ReplayEditor for DriveLog {
    fn open_root(&mut self, base_rev: Revnum) -> FsResult<()> {
        self.push("open-root", "/", Some(format!("base r{base_rev}")))
    }

    fn delete_entry(&mut self, path: &str) -> FsResult<()> {
        self.push("delete-entry", path, None)
    }

    fn add_directory(&mut self, path: &str, copy_from: Option<&CopySource>) -> FsResult<()> {
        self.push("add-directory", path, copy_detail(copy_from))
    }

    fn open_directory(&mut self, path: &str) -> FsResult<()> {
        self.push("open-directory", path, None)
    }

    fn add_file(&mut self, path: &str, copy_from: Option<&CopySource>) -> FsResult<()> {
        self.push("add-file", path, copy_detail(copy_from))
    }

    fn open_file(&mut self, path: &str) -> FsResult<()> {
        self.push("open-file", path, None)
    }

    fn change_prop(&mut self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        let detail = match value {
            Some(value) => format!("{name} = {}", lossy(value)),
            None => format!("{name} deleted"),
        };
        self.push("change-prop", path, Some(detail))
    }

    fn apply_text(
        &mut self,
        path: &str,
        _base_checksum: Option<&Checksum>,
        delta: TextDeltaStream,
        result_checksum: &Checksum,
    ) -> FsResult<()> {
        let windows = delta.count();
        self.push(
            "apply-text",
            path,
            Some(format!("{windows} window(s), result {result_checksum}")),
        )
    }

    fn close_edit(&mut self) -> FsResult<()> {
        self.push("close-edit", "/", None)
    }
}

fn cmd_replay(s: &Session, args: RevArgs) -> anyhow::Result<()> {
    let fs = s.open(&args.repo)?;
    let rev = revision_or_youngest(&fs, args.revision)?;
    let mut log = DriveLog::default();
    replay(&fs.revision_root(rev)?, &mut log)?;

    let steps: Vec<Value> = log
        .steps
        .iter()
        .map(|step| json!({ "op": step.op, "path": step.path, "detail": step.detail }))
        .collect();
    s.emit(json!({ "revision": rev.get(), "edits": steps }), || {
        for step in &log.steps {
            match &step.detail {
                Some(detail) => println!("{:<15} {}  {}", step.op.cyan(), step.path, detail.dimmed()),
                None => println!("{:<15} {}", step.op.cyan(), step.path),
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Single-change commits
// ---------------------------------------------------------------------------

/// Run `edit` in a transaction on the youngest revision and commit it.
/// The transaction is aborted if the edit or the commit fails.
fn commit_change(
    fs: &Filesystem,
    options: &CommitOptions,
    edit: impl FnOnce(&Root) -> anyhow::Result<()>,
) -> anyhow::Result<Revnum> {
    let mut txn = fs.begin_txn(fs.youngest_rev()?)?;
    let outcome = match stage(&txn, options, edit) {
        Ok(()) => txn.commit().map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    if outcome.is_err() {
        if let Err(e) = txn.abort() {
            warn!(txn = txn.name(), error = %e, "could not abort transaction");
        }
    }
    outcome
}

fn stage(
    txn: &Transaction,
    options: &CommitOptions,
    edit: impl FnOnce(&Root) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    if let Some(message) = &options.message {
        txn.change_prop(PROP_REVISION_LOG, Some(message.as_bytes()))?;
    }
    if let Some(author) = &options.author {
        txn.change_prop(PROP_REVISION_AUTHOR, Some(author.as_bytes()))?;
    }
    edit(&txn.root()?)
}

fn print_committed(s: &Session, rev: Revnum, action: &str, path: &str) -> anyhow::Result<()> {
    s.emit(json!({ "revision": rev.get(), "path": path }), || {
        println!(
            "{} {} {} in revision {}.",
            "✓".green().bold(),
            action,
            path.bold(),
            rev.to_string().yellow()
        )
    })
}

fn cmd_put(s: &Session, args: PutArgs) -> anyhow::Result<()> {
    let data = if args.file.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?
    };
    let path = canonicalize_abspath(&args.path);
    let fs = s.open(&args.repo)?;
    let rev = commit_change(&fs, &args.commit, |root| {
        match root.check_path(&path)? {
            NodeKind::Dir => bail!("{path} is a directory"),
            NodeKind::None => root.make_file(&path)?,
            NodeKind::File => {}
        }
        root.write_file(&path, &data)?;
        Ok(())
    })?;
    print_committed(s, rev, "Stored", &path)
}

fn cmd_mkdir(s: &Session, args: MkdirArgs) -> anyhow::Result<()> {
    let path = canonicalize_abspath(&args.path);
    let fs = s.open(&args.repo)?;
    let rev = commit_change(&fs, &args.commit, |root| {
        if !args.parents {
            root.make_dir(&path)?;
            return Ok(());
        }
        let mut current = String::from("/");
        for component in components(&path) {
            current = join(&current, component);
            match root.check_path(&current)? {
                NodeKind::None => root.make_dir(&current)?,
                NodeKind::Dir => {}
                NodeKind::File => bail!("{current} is a file"),
            }
        }
        Ok(())
    })?;
    print_committed(s, rev, "Created", &path)
}
