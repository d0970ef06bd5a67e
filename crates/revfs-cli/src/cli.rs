use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use revfs::Revnum;

#[derive(Parser)]
#[command(
    name = "revfsadmin",
    about = "Administer revfs repositories",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file of provider configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new, empty repository
    Create(CreateArgs),
    /// Print the youngest revision number
    Youngest(RepoArgs),
    /// List uncommitted transactions
    Lstxns(RepoArgs),
    /// Delete the named transactions
    Rmtxns(RmtxnsArgs),
    /// Repair a repository left damaged by an interrupted write
    Recover(RepoArgs),
    /// List the repository's log files
    ListLogs(ListLogsArgs),
    /// Copy a live repository
    Hotcopy(HotcopyArgs),
    /// Store a revision's predecessor contents as deltas
    Deltify(RevArgs),
    /// Print the tree of a revision
    Tree(TreeArgs),
    /// Print the paths a revision changed
    Changed(RevArgs),
    /// Print the history of a path
    History(HistoryArgs),
    /// Read or write revision properties
    Revprop(RevpropArgs),
    /// Print the edits that rebuild a revision from its parent
    Replay(RevArgs),
    /// Commit the contents of a local file
    Put(PutArgs),
    /// Commit a new directory
    Mkdir(MkdirArgs),
}

#[derive(Args)]
pub struct RepoArgs {
    pub repo: PathBuf,
}

#[derive(Args)]
pub struct CreateArgs {
    pub repo: PathBuf,
    #[arg(long, default_value = "journal")]
    pub fs_type: String,
}

#[derive(Args)]
pub struct RmtxnsArgs {
    pub repo: PathBuf,
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Args)]
pub struct ListLogsArgs {
    pub repo: PathBuf,
    #[arg(long)]
    pub only_unused: bool,
}

#[derive(Args)]
pub struct HotcopyArgs {
    pub src: PathBuf,
    pub dest: PathBuf,
    /// Leave out log files the source no longer needs
    #[arg(long)]
    pub clean: bool,
}

#[derive(Args)]
pub struct RevArgs {
    pub repo: PathBuf,
    /// Defaults to the youngest revision
    #[arg(short = 'r', long)]
    pub revision: Option<Revnum>,
}

#[derive(Args)]
pub struct TreeArgs {
    pub repo: PathBuf,
    #[arg(default_value = "/")]
    pub path: String,
    #[arg(short = 'r', long)]
    pub revision: Option<Revnum>,
    /// Show node-revision ids
    #[arg(long)]
    pub ids: bool,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub repo: PathBuf,
    pub path: String,
    #[arg(short = 'r', long)]
    pub revision: Option<Revnum>,
    #[arg(long)]
    pub cross_copies: bool,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct RevpropArgs {
    #[command(subcommand)]
    pub action: RevpropAction,
}

#[derive(Subcommand)]
pub enum RevpropAction {
    /// Print every property of a revision
    List {
        repo: PathBuf,
        #[arg(short = 'r', long)]
        revision: Option<Revnum>,
    },
    Get {
        repo: PathBuf,
        name: String,
        #[arg(short = 'r', long)]
        revision: Option<Revnum>,
    },
    Set {
        repo: PathBuf,
        name: String,
        value: String,
        #[arg(short = 'r', long)]
        revision: Option<Revnum>,
    },
    Delete {
        repo: PathBuf,
        name: String,
        #[arg(short = 'r', long)]
        revision: Option<Revnum>,
    },
}

#[derive(Args)]
pub struct CommitOptions {
    #[arg(short, long)]
    pub message: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
}

#[derive(Args)]
pub struct PutArgs {
    pub repo: PathBuf,
    /// Local file to read; `-` reads standard input
    pub file: PathBuf,
    /// Repository path to write
    pub path: String,
    #[command(flatten)]
    pub commit: CommitOptions,
}

#[derive(Args)]
pub struct MkdirArgs {
    pub repo: PathBuf,
    pub path: String,
    /// Create missing parent directories
    #[arg(short, long)]
    pub parents: bool,
    #[command(flatten)]
    pub commit: CommitOptions,
}
