//! Shared types, error model, and configuration for shardscrape.
//!
//! This crate is the foundation depended on by all other shardscrape crates.
//! It provides:
//! - [`ScrapeError`]: the unified error type
//! - Domain types ([`WorkItem`], [`ShardSpec`], [`RowUpdate`], [`RenderOutcome`], [`ColumnRef`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, CredentialsConfig, DestinationConfig, RunConfig, RunSection,
    ShardSection, SourceConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{Result, ScrapeError, StoreError};
pub use types::{ColumnRef, RangeWrite, RenderOutcome, RowUpdate, ShardSpec, WorkItem};
