//! # Thread Harvest CLI (`harvest`)
//!
//! Harvests a subreddit's submissions and comment threads into the snapshot
//! tree, imports archive dumps into the same tree, and inspects it.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest submissions --sub <name>` | Snapshot new or changed submissions in the window |
//! | `harvest comments --sub <name>` | Snapshot comment threads of stored submissions |
//! | `harvest import <paths>...` | Import JSONL posts/comments dumps |
//! | `harvest locate --sub <name> <created_utc> <id>` | Print an entity's directory and snapshots |
//! | `harvest fingerprint <file>` | Print the content fingerprint of a record or thread file |
//! | `harvest completions <shell>` | Generate shell completions |
//!
//! Network commands need `REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`, and
//! `REDDIT_USER_AGENT` in the environment; `REDDIT_USERNAME` and
//! `REDDIT_PASSWORD` switch to the password grant.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use thread_harvest::config::{self, clamp_page_limit, Config, Credentials};
use thread_harvest::harvest::{HarvestSettings, Harvester, SystemClock};
use thread_harvest::harvest_core::canonical::{canonicalize_submission, canonicalize_thread};
use thread_harvest::harvest_core::fingerprint::fingerprint;
use thread_harvest::harvest_core::layout::{is_safe_segment, normalize_scope, EMPTY_MARKER};
use thread_harvest::harvest_core::models::EntityKind;
use thread_harvest::harvest_core::record::Record;
use thread_harvest::import;
use thread_harvest::progress::{HarvestSummary, ProgressMode};
use thread_harvest::reddit::RedditClient;
use thread_harvest::store;
use thread_harvest::thread;

const DEFAULT_CONFIG: &str = "./config/harvest.toml";

/// Thread Harvest: content-addressed snapshots of Reddit submissions and
/// comment threads.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Harvest Reddit submissions and comment threads into deduplicated snapshot files",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`; built-in defaults apply when
    /// that file does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal and
    /// `json` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot the newest submissions of a subreddit.
    ///
    /// Pages through `/r/<sub>/new` until a submission older than the
    /// lookback window appears, writing a snapshot for each submission
    /// whose content changed since the last capture.
    Submissions {
        /// Subreddit name, with or without the `r/` prefix.
        #[arg(long)]
        sub: String,

        /// Lookback window in days (overrides `[harvest].days`).
        #[arg(long)]
        days: Option<u32>,

        /// Listing page size, 1..=100 (overrides `[harvest].page_limit`).
        #[arg(long)]
        limit: Option<u32>,

        /// Storage root (overrides `[storage].root`).
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Snapshot the comment threads of stored submissions.
    ///
    /// Reads the submissions already captured inside the window and
    /// fetches each thread. Zero-comment threads get an `EMPTY.txt` marker.
    Comments {
        /// Subreddit name, with or without the `r/` prefix.
        #[arg(long)]
        sub: String,

        /// Lookback window in days (overrides `[harvest].days`).
        #[arg(long)]
        days: Option<u32>,

        /// Storage root (overrides `[storage].root`).
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Import JSONL archive dumps.
    ///
    /// Files are classified by name using `[import].post_globs` and
    /// `[import].comment_globs`. At least one posts file is required.
    Import {
        /// Storage root (overrides `[storage].root`).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Dump files to import.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the directory an entity maps to and the snapshots inside it.
    Locate {
        /// Subreddit name, with or without the `r/` prefix.
        #[arg(long)]
        sub: String,

        /// `submissions` or `comments`.
        #[arg(long, default_value = "submissions")]
        kind: String,

        /// Storage root (overrides `[storage].root`).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Creation time (unix seconds, UTC).
        #[arg(allow_negative_numbers = true)]
        created_utc: i64,

        /// Entity id, without the type prefix.
        id: String,
    },

    /// Print the content fingerprint of a stored or hand-written file.
    ///
    /// Submissions: a JSON object (or a snapshot whose first line is one).
    /// Comments: JSONL, one comment per line.
    Fingerprint {
        /// `submissions` or `comments`.
        #[arg(long, default_value = "submissions")]
        kind: String,

        /// File to fingerprint.
        file: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("thread_harvest=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Submissions {
            sub,
            days,
            limit,
            root,
        } => {
            let mut cfg = load(&cli.config)?;
            apply_overrides(&mut cfg, days, root)?;
            if let Some(limit) = limit {
                cfg.harvest.page_limit = limit;
            }
            let harvester = build_harvester(&cfg, &sub, progress).await?;
            let summary = harvester.harvest_submissions().await?;
            print_summary(&harvester.settings().scope, EntityKind::Submissions, &summary);
        }
        Commands::Comments { sub, days, root } => {
            let mut cfg = load(&cli.config)?;
            apply_overrides(&mut cfg, days, root)?;
            let harvester = build_harvester(&cfg, &sub, progress).await?;
            let summary = harvester.harvest_comments().await?;
            print_summary(&harvester.settings().scope, EntityKind::Comments, &summary);
        }
        Commands::Import { root, paths } => {
            let mut cfg = load(&cli.config)?;
            apply_overrides(&mut cfg, None, root)?;
            let summary = import::run_import(&cfg.import, &cfg.layout(), &paths, &SystemClock)?;
            println!(
                "import  posts_scanned={} posts_written={} comments_scanned={} threads_written={} threads_skipped={} errors={}",
                summary.posts_scanned,
                summary.posts_written,
                summary.comments_scanned,
                summary.threads_written,
                summary.threads_skipped,
                summary.errors
            );
        }
        Commands::Locate {
            sub,
            kind,
            root,
            created_utc,
            id,
        } => {
            let mut cfg = load(&cli.config)?;
            apply_overrides(&mut cfg, None, root)?;
            let scope = require_scope(&sub)?;
            let kind: EntityKind = kind.parse()?;
            if !is_safe_segment(&id) {
                bail!("'{}' is not a usable entity id", id);
            }
            let dir = cfg.layout().resolve(kind, &scope, created_utc, &id);
            println!("{}", dir.display());
            for snapshot in store::list_snapshots(&dir)? {
                println!("  {}", snapshot.display());
            }
            let marker = dir.join(EMPTY_MARKER);
            if marker.is_file() {
                println!("  {}", marker.display());
            }
        }
        Commands::Fingerprint { kind, file } => {
            println!("{}", fingerprint_file(kind.parse()?, &file)?);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "harvest", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// A missing file is fine only at the default location.
fn load(path: &Path) -> Result<Config> {
    config::load_or_default(path, path == Path::new(DEFAULT_CONFIG))
}

/// Apply CLI flags over the loaded config.
fn apply_overrides(cfg: &mut Config, days: Option<u32>, root: Option<PathBuf>) -> Result<()> {
    if let Some(days) = days {
        cfg.harvest.days = config::check_days(days)?;
    }
    if let Some(root) = root {
        cfg.storage.root = root;
    }
    Ok(())
}

fn require_scope(sub: &str) -> Result<String> {
    let scope = normalize_scope(sub);
    if scope.is_empty() {
        bail!("--sub is required (got '{}')", sub);
    }
    Ok(scope)
}

/// Validate scope and credentials, then authenticate. Nothing touches the
/// network until both are present.
async fn build_harvester(
    cfg: &Config,
    sub: &str,
    progress: ProgressMode,
) -> Result<Harvester<RedditClient>> {
    let scope = require_scope(sub)?;
    let credentials = Credentials::from_env()?;
    let client = RedditClient::connect(&cfg.api, &credentials)
        .await
        .context("Failed to authenticate with the Reddit API")?;
    info!(scope = %scope, root = %cfg.storage.root.display(), "authenticated");

    let settings = HarvestSettings {
        scope,
        days: cfg.harvest.days,
        page_limit: clamp_page_limit(cfg.harvest.page_limit),
        layout: cfg.layout(),
    };
    Ok(Harvester::new(client, settings, progress.reporter()))
}

fn fingerprint_file(kind: EntityKind, file: &Path) -> Result<String> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let fp = match kind {
        EntityKind::Submissions => {
            let record = match Record::from_slice(content.trim().as_bytes()) {
                Ok(record) => record,
                Err(_) => {
                    let first = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                    Record::from_slice(first.trim().as_bytes())
                        .with_context(|| format!("{} is not a JSON object", file.display()))?
                }
            };
            fingerprint(&canonicalize_submission(&record))?
        }
        EntityKind::Comments => {
            let mut rows = Vec::new();
            for (n, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let row = Record::from_slice(line.trim().as_bytes())
                    .with_context(|| format!("{}:{}: not a JSON object", file.display(), n + 1))?;
                rows.push(row);
            }
            let mut rows = thread::dedup_by_id(rows);
            thread::sort_rows(&mut rows);
            fingerprint(&canonicalize_thread(&rows))?
        }
    };
    Ok(fp.to_string())
}

fn print_summary(scope: &str, kind: EntityKind, summary: &HarvestSummary) {
    println!(
        "{} {}  pages={} scanned={} written={} skipped={} empty={} errors={}",
        scope,
        kind,
        summary.pages,
        summary.scanned,
        summary.written,
        summary.skipped,
        summary.empty,
        summary.errors
    );
}
