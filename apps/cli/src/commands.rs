//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use shardscrape_core::{
    ControlLoop, FileCheckpoint, FileSource, FlushResult, ProgressReporter, RunSummary,
    SheetsSource, SheetsStore, SourceLister, TabularStore,
};
use shardscrape_renderer::ChromeLauncher;
use shardscrape_sheets::{ServiceAccountAuth, SheetsClient, TokenSource};
use shardscrape_shared::{
    AppConfig, ColumnRef, RunConfig, WorkItem, init_config, load_config, load_config_from,
};

use crate::overrides::Overrides;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// shardscrape — render a list of pages and write their values to a sheet.
#[derive(Parser)]
#[command(
    name = "shardscrape",
    version,
    about = "Sharded, resumable headless-browser scraping into Google Sheets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.shardscrape/shardscrape.toml).
    #[arg(long, env = "SHARDSCRAPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process this shard's items, resuming from its checkpoint.
    Run,

    /// Show which items this shard would process next, without rendering.
    Plan {
        /// Print at most this many items.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Inspect or change this shard's checkpoint.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Checkpoint subcommands.
#[derive(Subcommand)]
pub(crate) enum CheckpointAction {
    /// Print the stored resume index.
    Show,
    /// Delete the checkpoint so the next run starts from 0.
    Reset,
    /// Overwrite the resume index.
    Set {
        /// Next index to process.
        index: usize,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "shardscrape=info",
        1 => "shardscrape=debug",
        _ => "shardscrape=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let show_progress = matches!(cli.log_format, LogFormat::Text);
    match cli.command {
        Command::Config {
            action: ConfigAction::Init,
        } => cmd_config_init(),
        Command::Config {
            action: ConfigAction::Show,
        } => {
            let config = resolve_config(cli.config.as_deref(), &cli.overrides)?;
            cmd_config_show(&config)
        }
        Command::Checkpoint { action } => {
            let config = resolve_config(cli.config.as_deref(), &cli.overrides)?;
            cmd_checkpoint(&config, action)
        }
        Command::Plan { limit } => {
            let config = resolve_config(cli.config.as_deref(), &cli.overrides)?;
            cmd_plan(&config, limit).await
        }
        Command::Run => {
            let config = resolve_config(cli.config.as_deref(), &cli.overrides)?;
            cmd_run(&config, show_progress).await
        }
    }
}

/// Defaults < config file < flags and environment.
fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    overrides.apply(&mut config);
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, show_progress: bool) -> Result<()> {
    let run_config = RunConfig::try_from(config)?;
    if config.destination.spreadsheet_id.is_empty() {
        return Err(eyre!(
            "no destination spreadsheet: set DEST_SPREADSHEET_ID or [destination].spreadsheet_id"
        ));
    }

    info!(
        shard = %run_config.shard,
        checkpoint = ?run_config.checkpoint_path,
        "preparing run"
    );

    let client = Arc::new(sheets_client(config).await?);
    // A spreadsheet source checks its own worksheet before reading.
    let items = list_items(config, Arc::clone(&client)).await?;

    let store = SheetsStore::new(
        client,
        &config.destination.spreadsheet_id,
        &config.destination.worksheet,
    );
    store.check().await?;
    info!(
        spreadsheet = %config.destination.spreadsheet_id,
        worksheet = %config.destination.worksheet,
        "destination reachable"
    );

    let launcher = ChromeLauncher::new(config.browser.clone())?;

    let reporter = CliProgress::new(show_progress);
    let summary = ControlLoop::new(run_config, launcher, store)
        .run(&items, &reporter)
        .await?;

    print_summary(&summary);

    if summary.unflushed > 0 {
        return Err(eyre!(
            "{} row(s) could not be written; re-run after resetting the checkpoint to recover them",
            summary.unflushed
        ));
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Shard {} finished.", summary.shard);
    println!("  Checkpoint: {} -> {}", summary.resumed_from, summary.next_index);
    println!("  Processed:  {}", summary.processed);
    println!("  Buffered:   {}", summary.buffered);
    println!("  Written:    {} ({} batches)", summary.rows_written, summary.flushes);
    println!("  Skipped:    {} blank, {} empty", summary.blank, summary.empty);
    println!("  Crashes:    {} ({} items abandoned)", summary.crashes, summary.abandoned);
    if summary.rate_limited > 0 || summary.flush_failures > 0 {
        println!(
            "  Rejected:   {} rate-limited, {} failed",
            summary.rate_limited, summary.flush_failures
        );
    }
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

async fn cmd_plan(config: &AppConfig, limit: Option<usize>) -> Result<()> {
    let run_config = RunConfig::try_from(config)?;
    let resume_at = FileCheckpoint::new(&run_config.checkpoint_path).load()?;

    let items = if config.source.file.is_some() {
        list_items(config, Arc::new(offline_client()?)).await?
    } else {
        list_items(config, Arc::new(sheets_client(config).await?)).await?
    };

    let upper = items.len().min(run_config.max_index);
    let indices: Vec<usize> = run_config.shard.assigned(resume_at..upper).collect();

    println!(
        "Shard {}: {} item(s) left, resuming at {} (of {} listed, cap {})",
        run_config.shard,
        indices.len(),
        resume_at,
        items.len(),
        run_config.max_index
    );
    for &index in indices.iter().take(limit.unwrap_or(usize::MAX)) {
        print_plan_line(&items[index], &run_config.start_column);
    }
    Ok(())
}

fn print_plan_line(item: &WorkItem, start: &ColumnRef) {
    let target = if item.is_blank() { "(blank, skipped)" } else { item.target.as_str() };
    println!(
        "{:>6}  {:<8} {:<30} {}",
        item.index,
        start.cell(item.row_index()),
        item.label,
        target
    );
}

// ---------------------------------------------------------------------------
// checkpoint
// ---------------------------------------------------------------------------

fn cmd_checkpoint(config: &AppConfig, action: CheckpointAction) -> Result<()> {
    let run_config = RunConfig::try_from(config)?;
    let checkpoint = FileCheckpoint::new(&run_config.checkpoint_path);

    match action {
        CheckpointAction::Show => {
            let next = checkpoint.load()?;
            println!(
                "shard {}: next index {next} ({})",
                run_config.shard,
                checkpoint.path().display()
            );
        }
        CheckpointAction::Reset => {
            if checkpoint.reset()? {
                println!("Removed {}", checkpoint.path().display());
            } else {
                println!("No checkpoint at {}", checkpoint.path().display());
            }
        }
        CheckpointAction::Set { index } => {
            checkpoint.save(index)?;
            println!("shard {}: next index set to {index}", run_config.shard);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config file created at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Collaborator wiring
// ---------------------------------------------------------------------------

/// Build an authenticated client, checking the credentials up front.
async fn sheets_client(config: &AppConfig) -> Result<SheetsClient> {
    let auth = match std::env::var(&config.credentials.access_token_env) {
        Ok(token) if !token.trim().is_empty() => {
            info!(env = %config.credentials.access_token_env, "using static access token");
            TokenSource::Static(token.trim().to_string())
        }
        _ => {
            let key_file = Path::new(&config.credentials.service_account_file);
            if !key_file.exists() {
                return Err(eyre!(
                    "no Sheets credentials: set {} or provide a service-account key at '{}'",
                    config.credentials.access_token_env,
                    key_file.display()
                ));
            }
            TokenSource::ServiceAccount(ServiceAccountAuth::from_file(key_file)?)
        }
    };

    // Setup failures should stop the run before any browser is launched.
    auth.bearer().await?;
    Ok(SheetsClient::new(auth)?)
}

/// Client for commands that only read a local source file.
fn offline_client() -> Result<SheetsClient> {
    Ok(SheetsClient::new(TokenSource::Static(String::new()))?)
}

async fn list_items(config: &AppConfig, client: Arc<SheetsClient>) -> Result<Vec<WorkItem>> {
    let items = match &config.source.file {
        Some(path) => FileSource::new(path).list().await?,
        None => {
            if config.source.spreadsheet_id.is_empty() {
                return Err(eyre!(
                    "no source: set SOURCE_SPREADSHEET_ID, [source].spreadsheet_id, or --source-file"
                ));
            }
            SheetsSource::new(
                client,
                &config.source.spreadsheet_id,
                &config.source.worksheet,
                ColumnRef::parse(&config.source.target_column)?,
                ColumnRef::parse(&config.source.label_column)?,
            )
            .list()
            .await?
        }
    };

    if items.is_empty() {
        warn!("source list is empty");
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn started(&self, assigned: usize, resume_at: usize) {
        self.bar.set_length(assigned as u64);
        self.bar.set_message(format!("resuming at {resume_at}"));
    }

    fn item_done(&self, item: &WorkItem, _buffered: bool) {
        self.bar.inc(1);
        self.bar.set_message(item.label.clone());
    }

    fn flushed(&self, result: &FlushResult) {
        match result {
            FlushResult::Flushed(rows) => self.bar.println(format!("  wrote {rows} row(s)")),
            FlushResult::RateLimited(_) => self.bar.println("  write quota exceeded, backing off"),
            FlushResult::Failed(reason) => self.bar.println(format!("  write failed: {reason}")),
            FlushResult::Nothing => {}
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}
