//! Application configuration for shardscrape.
//!
//! User config lives at `~/.shardscrape/shardscrape.toml`.
//! CLI flags and environment variables override config file values, which
//! override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};
use crate::types::{ColumnRef, ShardSpec};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "shardscrape.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".shardscrape";

/// Desktop Chrome user agent presented by the headless browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Elements whose text becomes the row values.
pub const DEFAULT_VALUE_SELECTOR: &str = "div.valueValue-l31H9iuA.apply-common-tooltip";

// ---------------------------------------------------------------------------
// Config structs (matching shardscrape.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Shard identity.
    #[serde(default)]
    pub shard: ShardSection,

    /// Where the work list comes from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Where extracted values are written.
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Control loop tuning.
    #[serde(default)]
    pub run: RunSection,

    /// Headless browser settings.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Google API credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// `[shard]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSection {
    /// This process's shard number, in `0..step`.
    #[serde(default)]
    pub index: usize,

    /// Total number of shards in the deployment.
    #[serde(default = "default_shard_step")]
    pub step: usize,
}

impl Default for ShardSection {
    fn default() -> Self {
        Self {
            index: 0,
            step: default_shard_step(),
        }
    }
}

fn default_shard_step() -> usize {
    1
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Spreadsheet holding the work list.
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Worksheet (tab) name.
    #[serde(default = "default_source_worksheet")]
    pub worksheet: String,

    /// Column holding the target URLs.
    #[serde(default = "default_target_column")]
    pub target_column: String,

    /// Column holding the labels (logging only).
    #[serde(default = "default_label_column")]
    pub label_column: String,

    /// Local JSON work list; takes precedence over the spreadsheet when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            worksheet: default_source_worksheet(),
            target_column: default_target_column(),
            label_column: default_label_column(),
            file: None,
        }
    }
}

fn default_source_worksheet() -> String {
    "Sheet1".into()
}
fn default_target_column() -> String {
    "G".into()
}
fn default_label_column() -> String {
    "A".into()
}

/// `[destination]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Spreadsheet receiving the values.
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Worksheet (tab) name.
    #[serde(default = "default_dest_worksheet")]
    pub worksheet: String,

    /// First column written. Columns to its left are never touched.
    #[serde(default = "default_start_column")]
    pub start_column: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            worksheet: default_dest_worksheet(),
            start_column: default_start_column(),
        }
    }
}

fn default_dest_worksheet() -> String {
    "Sheet2".into()
}
fn default_start_column() -> String {
    "AJ".into()
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    /// Rows buffered before a flush is attempted.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Hard cap on the global index, independent of list length.
    #[serde(default = "default_max_index")]
    pub max_index: usize,

    /// Delay between items, in milliseconds.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Sleep after a rate-limited flush, in seconds.
    #[serde(default = "default_quota_backoff_secs")]
    pub quota_backoff_secs: u64,

    /// Directory for `checkpoint_<shard>.txt` files.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// Explicit checkpoint file; overrides `checkpoint_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_file: Option<String>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_index: default_max_index(),
            throttle_ms: default_throttle_ms(),
            quota_backoff_secs: default_quota_backoff_secs(),
            checkpoint_dir: default_checkpoint_dir(),
            checkpoint_file: None,
        }
    }
}

fn default_batch_size() -> usize {
    50
}
fn default_max_index() -> usize {
    2500
}
fn default_throttle_ms() -> u64 {
    500
}
fn default_quota_backoff_secs() -> u64 {
    60
}
fn default_checkpoint_dir() -> String {
    ".".into()
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run Chrome without a window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Explicit Chrome/Chromium binary; autodetected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    /// Navigation timeout in seconds.
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,

    /// How long to wait for the ready selector to become visible.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// CSS selector that marks the page as rendered.
    #[serde(default = "default_value_selector")]
    pub ready_selector: String,

    /// CSS selector of the elements whose text is extracted.
    #[serde(default = "default_value_selector")]
    pub value_selector: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Skip image loading.
    #[serde(default = "default_true")]
    pub disable_images: bool,

    /// Saved cookies applied when a session opens.
    #[serde(default = "default_cookies_file")]
    pub cookies_file: String,

    /// Page visited before cookies are set.
    #[serde(default = "default_cookie_origin")]
    pub cookie_origin: String,

    /// Pause after visiting the cookie origin, in milliseconds.
    #[serde(default = "default_cookie_settle_ms")]
    pub cookie_settle_ms: u64,

    /// Pause after the post-cookie reload, in milliseconds.
    #[serde(default = "default_reload_settle_ms")]
    pub reload_settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            page_load_timeout_secs: default_page_load_timeout(),
            ready_timeout_secs: default_ready_timeout(),
            ready_selector: default_value_selector(),
            value_selector: default_value_selector(),
            user_agent: default_user_agent(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            disable_images: true,
            cookies_file: default_cookies_file(),
            cookie_origin: default_cookie_origin(),
            cookie_settle_ms: default_cookie_settle_ms(),
            reload_settle_ms: default_reload_settle_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_page_load_timeout() -> u64 {
    40
}
fn default_ready_timeout() -> u64 {
    45
}
fn default_value_selector() -> String {
    DEFAULT_VALUE_SELECTOR.into()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_window_width() -> u32 {
    1920
}
fn default_window_height() -> u32 {
    1080
}
fn default_cookies_file() -> String {
    "cookies.json".into()
}
fn default_cookie_origin() -> String {
    "https://in.tradingview.com/".into()
}
fn default_cookie_settle_ms() -> u64 {
    3000
}
fn default_reload_settle_ms() -> u64 {
    2000
}

/// `[credentials]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Google service-account key file.
    #[serde(default = "default_service_account_file")]
    pub service_account_file: String,

    /// Name of the env var holding a ready-made bearer token (never store the token itself).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            service_account_file: default_service_account_file(),
            access_token_env: default_access_token_env(),
        }
    }
}

fn default_service_account_file() -> String {
    "credentials.json".into()
}
fn default_access_token_env() -> String {
    "SHEETS_ACCESS_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Validated control-loop parameters, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub shard: ShardSpec,
    /// Where this shard's resume point is persisted.
    pub checkpoint_path: PathBuf,
    /// Flush threshold (at least 1).
    pub batch_size: usize,
    /// Items with `index >= max_index` are never processed.
    pub max_index: usize,
    /// First destination column.
    pub start_column: ColumnRef,
    pub throttle: Duration,
    pub quota_backoff: Duration,
}

impl TryFrom<&AppConfig> for RunConfig {
    type Error = ScrapeError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let shard = ShardSpec::new(config.shard.index, config.shard.step)?;
        if config.run.batch_size == 0 {
            return Err(ScrapeError::validation("batch_size must be at least 1"));
        }

        let checkpoint_path = match &config.run.checkpoint_file {
            Some(file) => PathBuf::from(file),
            None => Path::new(&config.run.checkpoint_dir)
                .join(format!("checkpoint_{}.txt", shard.shard_index())),
        };

        Ok(Self {
            shard,
            checkpoint_path,
            batch_size: config.run.batch_size,
            max_index: config.run.max_index,
            start_column: ColumnRef::parse(&config.destination.start_column)?,
            throttle: Duration::from_millis(config.run.throttle_ms),
            quota_backoff: Duration::from_secs(config.run.quota_backoff_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.shardscrape/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ScrapeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.shardscrape/shardscrape.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScrapeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ScrapeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScrapeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| ScrapeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScrapeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
