use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cvs_sync::cache::{DiskCache, MemoryCache, RevisionCache};
use cvs_sync::date::format_rfc2822;
use cvs_sync::state::BaselineStore;
use cvs_sync::{collect_history, ClientConfig, FileBaselineStore, Session};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cvs-sync")]
#[command(author, version, about = "Rebuild commit history from a CVS repository", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/cvs-sync/config.toml)
    #[arg(short, long, global = true, env = "CVS_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the aggregated commits of a module
    Log {
        /// Repository root, e.g. :ext:user@host:/cvsroot
        cvsroot: String,
        module: String,
        /// Only these branches (default: all)
        #[arg(short, long)]
        branch: Vec<String>,
        /// Continue from and update the saved per-branch baselines
        #[arg(long)]
        incremental: bool,
    },
    /// List the files of a branch with their revisions
    Ls {
        cvsroot: String,
        module: String,
        #[arg(short, long, default_value = "HEAD")]
        branch: String,
        /// Unix time to list the branch as of
        #[arg(short, long)]
        date: Option<i64>,
    },
    /// Fetch one revision of one file
    Checkout {
        cvsroot: String,
        module: String,
        /// Path inside the module
        path: String,
        revision: String,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

async fn connect(cvsroot: &str, module: &str, config: ClientConfig) -> Result<Session> {
    Session::connect(cvsroot, module, config)
        .await
        .with_context(|| format!("Failed to open {} module {}", cvsroot, module))
}

async fn run_log(
    config: ClientConfig,
    cvsroot: &str,
    module: &str,
    branches: &[String],
    incremental: bool,
) -> Result<()> {
    let store = if incremental {
        Some(FileBaselineStore::open_default(config.state_dir.as_deref())?)
    } else {
        None
    };
    let mut session = connect(cvsroot, module, config).await?;
    let mut history = collect_history(
        &mut session,
        store.as_ref().map(|s| s as &dyn BaselineStore),
        branches,
    )
    .await
    .context("Failed to collect history")?;
    let stats = session.terminate().await?;
    tracing::debug!("Session closed: {:?}", stats);

    for (name, branch) in &history.branches {
        println!("== {} ({} commits)", name, branch.commit_count());
        for (id, commit) in branch.commits() {
            println!(
                "{}  {}  {} file(s)",
                format_rfc2822(commit.timestamp),
                commit.author,
                commit.len()
            );
            for line in commit.message.lines() {
                println!("    {}", line);
            }
            for revision in branch.commit_revisions(id) {
                let state = if revision.is_dead() { " (dead)" } else { "" };
                println!("  {} {}{}", revision.revision, revision.path, state);
            }
            println!();
        }
    }

    if let Some(store) = &store {
        for branch in history.branches.values_mut() {
            let ids: Vec<_> = branch.commits().map(|(id, _)| id).collect();
            for id in ids {
                branch.mark_synced(id);
            }
        }
        history.save_baselines(store)?;
        tracing::info!("Saved baselines for {} branches", history.branches.len());
    }
    Ok(())
}

async fn run_ls(
    config: ClientConfig,
    cvsroot: &str,
    module: &str,
    branch: &str,
    date: Option<i64>,
) -> Result<()> {
    let mut session = connect(cvsroot, module, config).await?;
    let files = session
        .list_files(branch, date)
        .await
        .with_context(|| format!("Failed to list {}", branch))?;
    session.terminate().await?;
    for file in files {
        println!("{}\t{}", file.revision, file.path);
    }
    Ok(())
}

async fn run_checkout(
    config: ClientConfig,
    cvsroot: &str,
    module: &str,
    path: &str,
    revision: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let cache: Box<dyn RevisionCache> = match &config.cache_dir {
        Some(dir) => Box::new(DiskCache::open(dir)?),
        None => Box::new(MemoryCache::new()),
    };
    let mut session = connect(cvsroot, module, config).await?;
    let file = session
        .checkout_revision(path, revision, Some(cache.as_ref()))
        .await
        .with_context(|| format!("Failed to check out {} rev {}", path, revision))?;
    session.terminate().await?;

    if file.is_dead {
        anyhow::bail!("{} is removed in revision {}", path, revision);
    }
    match output {
        Some(out) => {
            tokio::fs::write(&out, &file.content)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            tracing::info!("Wrote {} bytes to {}", file.content.len(), out.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&file.content).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = ClientConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Log {
            cvsroot,
            module,
            branch,
            incremental,
        } => run_log(config, &cvsroot, &module, &branch, incremental).await,
        Commands::Ls {
            cvsroot,
            module,
            branch,
            date,
        } => run_ls(config, &cvsroot, &module, &branch, date).await,
        Commands::Checkout {
            cvsroot,
            module,
            path,
            revision,
            output,
        } => run_checkout(config, &cvsroot, &module, &path, &revision, output).await,
    }
}
