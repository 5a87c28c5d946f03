//! Core domain types for a sharded scrape run.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One entry of the source list, identified by its global position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Position in the global list. Also determines the destination row.
    pub index: usize,
    /// URL to render, or empty when the source cell is blank.
    pub target: String,
    /// Human-readable label used only for logging.
    pub label: String,
}

impl WorkItem {
    /// Build an item, trimming whitespace around the target.
    pub fn new(index: usize, target: impl AsRef<str>, label: impl Into<String>) -> Self {
        Self {
            index,
            target: target.as_ref().trim().to_string(),
            label: label.into(),
        }
    }

    /// `true` when there is nothing to render for this item.
    pub fn is_blank(&self) -> bool {
        self.target.is_empty()
    }

    /// Destination row for this item (1-based, aligned with the source row).
    pub fn row_index(&self) -> usize {
        self.index + 1
    }
}

// ---------------------------------------------------------------------------
// ShardSpec
// ---------------------------------------------------------------------------

/// Static partition of the index space: `index % step == shard_index`.
///
/// Every shard of a deployment must be launched with the same `step` and a
/// distinct `shard_index` in `0..step`. Nothing checks this at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSpec {
    shard_index: usize,
    shard_step: usize,
}

impl ShardSpec {
    /// Validate and build a shard spec.
    pub fn new(shard_index: usize, shard_step: usize) -> Result<Self> {
        if shard_step == 0 {
            return Err(ScrapeError::validation("shard_step must be at least 1"));
        }
        if shard_index >= shard_step {
            return Err(ScrapeError::validation(format!(
                "shard_index {shard_index} is out of range for shard_step {shard_step}"
            )));
        }
        Ok(Self {
            shard_index,
            shard_step,
        })
    }

    /// A spec that owns every index.
    pub fn single() -> Self {
        Self {
            shard_index: 0,
            shard_step: 1,
        }
    }

    pub fn shard_index(&self) -> usize {
        self.shard_index
    }

    pub fn shard_step(&self) -> usize {
        self.shard_step
    }

    /// Whether `index` is assigned to this shard.
    pub fn belongs(&self, index: usize) -> bool {
        belongs(index, self.shard_index, self.shard_step)
    }

    /// The indices of `range` assigned to this shard, ascending.
    pub fn assigned(&self, range: Range<usize>) -> impl Iterator<Item = usize> + use<> {
        let spec = *self;
        range.filter(move |i| spec.belongs(*i))
    }
}

impl Default for ShardSpec {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard_index, self.shard_step)
    }
}

/// Pure partition function. A zero `shard_step` owns nothing.
pub fn belongs(index: usize, shard_index: usize, shard_step: usize) -> bool {
    shard_step != 0 && index % shard_step == shard_index
}

// ---------------------------------------------------------------------------
// RenderOutcome
// ---------------------------------------------------------------------------

/// Result of rendering one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Page rendered; values in document order (possibly empty).
    Success(Vec<String>),
    /// No data: timeout, missing element, page-level error. Session still usable.
    Empty,
    /// Session is unusable and must be discarded.
    Crash,
}

impl RenderOutcome {
    /// Collapse into the values worth buffering, if any.
    pub fn into_values(self) -> Option<Vec<String>> {
        match self {
            Self::Success(values) if !values.is_empty() => Some(values),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RowUpdate / RangeWrite
// ---------------------------------------------------------------------------

/// A pending write of extracted values to one destination row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    /// 1-based destination row.
    pub row_index: usize,
    /// Values laid out left to right from the start column.
    pub values: Vec<String>,
}

impl RowUpdate {
    pub fn new(row_index: usize, values: Vec<String>) -> Self {
        Self { row_index, values }
    }

    /// Address this row at `start`, producing the wire form.
    pub fn at(&self, start: &ColumnRef) -> RangeWrite {
        RangeWrite {
            start_cell: start.cell(self.row_index),
            values: self.values.clone(),
        }
    }
}

/// One range write as sent to the tabular store: `{start_cell, values}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeWrite {
    /// A1 cell such as `AJ5` (worksheet qualification is added by the store).
    pub start_cell: String,
    pub values: Vec<String>,
}

// ---------------------------------------------------------------------------
// ColumnRef
// ---------------------------------------------------------------------------

static COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{1,3}$").expect("static column regex"));

/// Validated A1 column letters (`A` through `ZZZ`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef(String);

impl ColumnRef {
    /// Parse column letters, case-insensitively.
    pub fn parse(letters: &str) -> Result<Self> {
        let upper = letters.trim().to_ascii_uppercase();
        if !COLUMN_RE.is_match(&upper) {
            return Err(ScrapeError::validation(format!(
                "invalid column reference '{letters}': expected letters A..ZZZ"
            )));
        }
        Ok(Self(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A1 cell for `row` in this column.
    pub fn cell(&self, row: usize) -> String {
        format!("{}{row}", self.0)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ColumnRef {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = ScrapeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.0
    }
}
