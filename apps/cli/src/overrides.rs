//! Flag / environment overrides layered on top of the TOML config.

use clap::Args;

use shardscrape_shared::AppConfig;

/// Settings that can come from flags or the environment. Each one, when set,
/// wins over the config file.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct Overrides {
    /// This process's shard index (0-based).
    #[arg(long, env = "SHARD_INDEX", global = true)]
    pub shard_index: Option<usize>,

    /// Total number of shards.
    #[arg(long, env = "SHARD_STEP", global = true)]
    pub shard_step: Option<usize>,

    /// Checkpoint file path (overrides the per-shard default name).
    #[arg(long, env = "CHECKPOINT_FILE", global = true)]
    pub checkpoint_file: Option<String>,

    /// Directory holding `checkpoint_<shard>.txt`.
    #[arg(long, env = "CHECKPOINT_DIR", global = true)]
    pub checkpoint_dir: Option<String>,

    /// Rows per batch write.
    #[arg(long, env = "BATCH_SIZE", global = true)]
    pub batch_size: Option<usize>,

    /// Stop before this index.
    #[arg(long, env = "MAX_INDEX", global = true)]
    pub max_index: Option<usize>,

    /// First destination column, e.g. AJ.
    #[arg(long, env = "START_COLUMN", global = true)]
    pub start_column: Option<String>,

    /// Pause between items, in milliseconds.
    #[arg(long, env = "THROTTLE_MS", global = true)]
    pub throttle_ms: Option<u64>,

    /// Sleep after a quota rejection, in seconds.
    #[arg(long, env = "QUOTA_BACKOFF_SECS", global = true)]
    pub quota_backoff_secs: Option<u64>,

    /// Spreadsheet holding the target list.
    #[arg(long, env = "SOURCE_SPREADSHEET_ID", global = true)]
    pub source_spreadsheet_id: Option<String>,

    /// Read targets from a local JSON file instead of a spreadsheet.
    #[arg(long, env = "SOURCE_FILE", global = true)]
    pub source_file: Option<String>,

    /// Spreadsheet receiving the extracted values.
    #[arg(long, env = "DEST_SPREADSHEET_ID", global = true)]
    pub dest_spreadsheet_id: Option<String>,

    /// Service-account key file.
    #[arg(long, env = "GOOGLE_CREDENTIALS", global = true)]
    pub credentials: Option<String>,

    /// Saved browser cookies (JSON).
    #[arg(long, env = "COOKIES_FILE", global = true)]
    pub cookies_file: Option<String>,

    /// Chrome/Chromium binary to launch.
    #[arg(long, global = true)]
    pub chrome: Option<String>,

    /// Show the browser window.
    #[arg(long, global = true)]
    pub headed: bool,
}

impl Overrides {
    /// Apply every set override to `config`.
    pub(crate) fn apply(&self, config: &mut AppConfig) {
        set(&mut config.shard.index, self.shard_index);
        set(&mut config.shard.step, self.shard_step);
        set(&mut config.run.batch_size, self.batch_size);
        set(&mut config.run.max_index, self.max_index);
        set(&mut config.run.throttle_ms, self.throttle_ms);
        set(&mut config.run.quota_backoff_secs, self.quota_backoff_secs);
        set(&mut config.run.checkpoint_dir, self.checkpoint_dir.clone());
        set(&mut config.destination.start_column, self.start_column.clone());
        set(&mut config.source.spreadsheet_id, self.source_spreadsheet_id.clone());
        set(&mut config.destination.spreadsheet_id, self.dest_spreadsheet_id.clone());
        set(&mut config.credentials.service_account_file, self.credentials.clone());
        set(&mut config.browser.cookies_file, self.cookies_file.clone());

        if self.checkpoint_file.is_some() {
            config.run.checkpoint_file = self.checkpoint_file.clone();
        }
        if self.source_file.is_some() {
            config.source.file = self.source_file.clone();
        }
        if self.chrome.is_some() {
            config.browser.executable = self.chrome.clone();
        }
        if self.headed {
            config.browser.headless = false;
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
