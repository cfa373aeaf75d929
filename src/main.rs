mod config;
mod stack;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use codeweave_index::context::chunk_display_header;
use codeweave_index::{ScanReport, WorkspaceWatcher};

use crate::config::Config;
use crate::stack::Stack;

#[derive(Parser)]
#[command(name = "codeweave")]
#[command(version, about = "Incremental code graph indexer with hybrid vector and graph search")]
struct Cli {
    /// Config file (default: $CODEWEAVE_CONFIG, then config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Workspace root, overriding the config file
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the workspace and index new or changed files
    Index {
        /// Re-index every file, ignoring recorded hashes
        #[arg(long)]
        force: bool,
    },
    /// Refresh the index, then run a hybrid vector and graph search
    Search {
        query: String,
        /// Maximum direct hits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Graph expansion depth around each hit
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Index, then keep the index current as files change
    Watch,
    /// Show graph, file index and queue counts
    Stats,
    /// Inspect or maintain the processing queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Task counts per status
    Stats,
    /// Reset failed tasks to pending with a fresh retry budget
    RetryFailed,
    /// Delete completed tasks
    ClearCompleted,
    /// Delete every task
    ClearAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(root) = cli.root {
        config.workspace.root = root;
    }
    config.validate()?;

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let root = config.workspace_root(&cwd);
    let root = std::fs::canonicalize(&root)
        .with_context(|| format!("workspace root {} is not accessible", root.display()))?;
    tracing::debug!(config = %config_path.display(), root = %root.display(), "starting");

    match cli.command {
        Commands::Index { force } => cmd_index(&config, &root, force).await,
        Commands::Search {
            query,
            limit,
            depth,
        } => {
            let limit = limit.unwrap_or(config.search.limit);
            let depth = depth.unwrap_or(config.search.depth);
            cmd_search(&config, &root, &query, limit, depth).await
        }
        Commands::Watch => cmd_watch(&config, &root).await,
        Commands::Stats => cmd_stats(&config, &root).await,
        Commands::Queue { action } => cmd_queue(&config, &root, action).await,
    }
}

async fn cmd_index(config: &Config, root: &Path, force: bool) -> anyhow::Result<()> {
    let mut stack = Stack::open(config, root, true).await?;
    if force {
        let n = stack.scanner.file_index().clear_all_indexed().await?;
        tracing::info!(files = n, "forcing full re-index");
    }
    stack.start_queue();
    let report = stack.scanner.scan().await;
    stack.shutdown().await;
    print_report(&report?);
    Ok(())
}

async fn cmd_search(
    config: &Config,
    root: &Path,
    query: &str,
    limit: usize,
    depth: usize,
) -> anyhow::Result<()> {
    if !config.storage.vector_enabled {
        bail!("search needs vectors; set storage.vector_enabled = true");
    }
    let mut stack = Stack::open(config, root, true).await?;
    stack.start_queue();
    let refreshed = stack.scanner.scan().await;
    let results = match refreshed {
        Ok(_) => stack.coordinator().hybrid_search(query, limit, depth).await,
        Err(e) => Err(e),
    };
    stack.shutdown().await;
    let results = results?;

    if results.direct.is_empty() {
        println!("No results for \"{query}\"");
        return Ok(());
    }
    for (i, hit) in results.direct.iter().enumerate() {
        println!(
            "{:>2}. [{:.3}] {}",
            i + 1,
            hit.score,
            chunk_display_header(&hit.chunk)
        );
    }
    if !results.related.is_empty() {
        println!("\nRelated:");
        for chunk in &results.related {
            println!("    {}", chunk_display_header(chunk));
        }
    }
    Ok(())
}

async fn cmd_watch(config: &Config, root: &Path) -> anyhow::Result<()> {
    let mut stack = Stack::open(config, root, true).await?;
    stack.start_queue();
    match stack.scanner.scan().await {
        Ok(report) => print_report(&report),
        Err(e) => {
            stack.shutdown().await;
            return Err(e.into());
        }
    }

    let watcher = WorkspaceWatcher::start(&stack.root, Arc::clone(&stack.scanner));
    let watcher = match watcher {
        Ok(watcher) => watcher,
        Err(e) => {
            stack.shutdown().await;
            return Err(e).context("failed to start file watcher");
        }
    };

    println!("Watching {} (ctrl-c to stop)", stack.root.display());
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e:#}");
    }
    tracing::info!("received shutdown signal");
    drop(watcher);
    stack.shutdown().await;
    Ok(())
}

async fn cmd_stats(config: &Config, root: &Path) -> anyhow::Result<()> {
    let stack = Stack::open(config, root, false).await?;
    let graph = stack.coordinator().stats().await;
    let files = stack.scanner.file_index().list().await;
    let queue = stack.queue().stats().await;
    stack.shutdown().await;
    let (graph, files, queue) = (graph?, files?, queue?);

    let dirty = files.iter().filter(|f| f.is_dirty()).count();
    let failed = files.iter().filter(|f| f.has_failed()).count();
    let skipped = files.iter().filter(|f| !f.available).count();
    println!("Workspace: {}", root.display());
    println!(
        "Files:     {} tracked, {} pending, {} failed, {} not indexable",
        files.len(),
        dirty,
        failed,
        skipped
    );
    println!(
        "Graph:     {} files, {} chunks, {} relationships",
        graph.files, graph.chunks, graph.relationships
    );
    for (kind, count) in &graph.relationships_by_type {
        println!("           {kind:<16} {count}");
    }
    println!(
        "Queue:     {} pending, {} processing, {} completed, {} failed",
        queue.pending, queue.processing, queue.completed, queue.failed
    );
    Ok(())
}

async fn cmd_queue(config: &Config, root: &Path, action: QueueAction) -> anyhow::Result<()> {
    let stack = Stack::open(config, root, false).await?;
    let queue = stack.queue().clone();
    let outcome: anyhow::Result<String> = async {
        Ok(match action {
            QueueAction::Stats => {
                let s = queue.stats().await?;
                format!(
                    "{} pending, {} processing, {} completed, {} failed ({} total)",
                    s.pending, s.processing, s.completed, s.failed, s.total
                )
            }
            QueueAction::RetryFailed => {
                let files = stack.scanner.file_index().clear_failed().await?;
                let tasks = queue.retry_failed().await?;
                format!("{tasks} failed task(s) reset to pending, {files} file(s) will be re-indexed")
            }
            QueueAction::ClearCompleted => {
                format!("{} completed task(s) removed", queue.clear_completed().await?)
            }
            QueueAction::ClearAll => format!("{} task(s) removed", queue.clear_all().await?),
        })
    }
    .await;
    stack.shutdown().await;
    println!("{}", outcome?);
    Ok(())
}

fn print_report(report: &ScanReport) {
    println!(
        "Scanned {} files in {}ms: {} new, {} modified, {} unchanged, {} deleted",
        report.files_scanned,
        report.duration_ms,
        report.new,
        report.modified,
        report.unchanged,
        report.deleted
    );
    println!(
        "Indexed {} of {} queued, {} cross-file links",
        report.processed, report.enqueued, report.links
    );
    for failure in &report.failed {
        println!("  failed: {failure}");
    }
    for error in &report.errors {
        println!("  warning: {error}");
    }
}

fn resolve_config_path(arg: Option<&Path>) -> PathBuf {
    if let Some(path) = arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODEWEAVE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
