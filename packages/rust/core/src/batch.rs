//! Buffered writes to the destination store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use shardscrape_sheets::SheetsClient;
use shardscrape_shared::{ColumnRef, RangeWrite, Result as ScrapeResult, RowUpdate, StoreError};

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Destination for batched range writes.
///
/// One call is one request: either every range is written or none is.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Write all ranges. Returns the number of ranges written.
    async fn write(&self, writes: &[RangeWrite]) -> Result<usize, StoreError>;

    /// Confirm the destination exists and accepts this client. Called once
    /// before any item is processed; an error aborts the run.
    async fn check(&self) -> ScrapeResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: TabularStore + ?Sized> TabularStore for Arc<T> {
    async fn write(&self, writes: &[RangeWrite]) -> Result<usize, StoreError> {
        (**self).write(writes).await
    }

    async fn check(&self) -> ScrapeResult<()> {
        (**self).check().await
    }
}

/// A worksheet in a Google spreadsheet.
pub struct SheetsStore {
    client: Arc<SheetsClient>,
    spreadsheet_id: String,
    worksheet: String,
}

impl SheetsStore {
    pub fn new(
        client: Arc<SheetsClient>,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
    ) -> Self {
        Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
        }
    }
}

#[async_trait]
impl TabularStore for SheetsStore {
    async fn write(&self, writes: &[RangeWrite]) -> Result<usize, StoreError> {
        self.client
            .batch_update(&self.spreadsheet_id, &self.worksheet, writes)
            .await
    }

    async fn check(&self) -> ScrapeResult<()> {
        self.client
            .check_worksheet(&self.spreadsheet_id, &self.worksheet)
            .await
    }
}

// ---------------------------------------------------------------------------
// BatchWriter
// ---------------------------------------------------------------------------

/// Outcome of one flush attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushResult {
    /// Nothing was pending; no request was sent.
    Nothing,
    /// All pending rows were written and the batch was cleared.
    Flushed(usize),
    /// The store is throttling writes. The batch is kept.
    RateLimited(String),
    /// Any other store failure. The batch is kept.
    Failed(String),
}

/// Accumulates row updates and sends them as one request.
///
/// Every range starts at the configured column, so columns to its left are
/// never written.
pub struct BatchWriter<S> {
    store: S,
    start_column: ColumnRef,
    capacity: usize,
    pending: Vec<RowUpdate>,
}

impl<S: TabularStore> BatchWriter<S> {
    /// `capacity` is the flush threshold; values below 1 are treated as 1.
    pub fn new(store: S, start_column: ColumnRef, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            start_column,
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, update: RowUpdate) {
        self.pending.push(update);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the flush threshold has been reached.
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Send the whole batch as one request. Clears it only on success.
    #[instrument(skip(self), fields(rows = self.pending.len()))]
    pub async fn flush(&mut self) -> FlushResult {
        if self.pending.is_empty() {
            return FlushResult::Nothing;
        }

        let writes: Vec<RangeWrite> = self
            .pending
            .iter()
            .map(|update| update.at(&self.start_column))
            .collect();

        match self.store.write(&writes).await {
            Ok(_) => {
                let rows = self.pending.len();
                self.pending.clear();
                debug!(rows, "batch written");
                FlushResult::Flushed(rows)
            }
            Err(StoreError::RateLimited(reason)) => FlushResult::RateLimited(reason),
            Err(StoreError::Failed(reason)) => FlushResult::Failed(reason),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Records every request and answers from a script (default: success).
    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub requests: Mutex<Vec<Vec<RangeWrite>>>,
        pub script: Mutex<VecDeque<Result<(), StoreError>>>,
        /// When set, `check` fails with this message.
        pub unreachable: Option<String>,
    }

    impl FakeStore {
        pub(crate) fn scripted(script: Vec<Result<(), StoreError>>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                script: Mutex::new(script.into()),
                unreachable: None,
            }
        }

        pub(crate) fn unreachable(reason: &str) -> Self {
            Self {
                unreachable: Some(reason.to_string()),
                ..Default::default()
            }
        }

        pub(crate) fn requests(&self) -> Vec<Vec<RangeWrite>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TabularStore for FakeStore {
        async fn write(&self, writes: &[RangeWrite]) -> Result<usize, StoreError> {
            self.requests.lock().unwrap().push(writes.to_vec());
            match self.script.lock().unwrap().pop_front() {
                Some(Err(e)) => Err(e),
                _ => Ok(writes.len()),
            }
        }

        async fn check(&self) -> ScrapeResult<()> {
            match &self.unreachable {
                Some(reason) => Err(shardscrape_shared::ScrapeError::Network(reason.clone())),
                None => Ok(()),
            }
        }
    }

    fn col(letters: &str) -> ColumnRef {
        ColumnRef::parse(letters).unwrap()
    }

    #[tokio::test]
    async fn flush_sends_all_rows_at_start_column() {
        let mut writer = BatchWriter::new(FakeStore::default(), col("AJ"), 2);
        writer.add(RowUpdate::new(2, vec!["1.2".into(), "3.4".into()]));
        assert!(!writer.is_full());
        writer.add(RowUpdate::new(9, vec!["x".into()]));
        assert!(writer.is_full());

        assert_eq!(writer.flush().await, FlushResult::Flushed(2));
        assert!(writer.is_empty());

        let requests = writer.store().requests();
        assert_eq!(requests.len(), 1);
        let cells: Vec<_> = requests[0].iter().map(|w| w.start_cell.as_str()).collect();
        assert_eq!(cells, vec!["AJ2", "AJ9"]);
    }

    #[tokio::test]
    async fn empty_flush_sends_nothing() {
        let mut writer = BatchWriter::new(FakeStore::default(), col("AJ"), 5);
        assert_eq!(writer.flush().await, FlushResult::Nothing);
        assert!(writer.store().requests().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_keeps_batch() {
        let store = FakeStore::scripted(vec![Err(StoreError::RateLimited("429".into()))]);
        let mut writer = BatchWriter::new(store, col("AJ"), 1);
        writer.add(RowUpdate::new(3, vec!["v".into()]));

        assert!(matches!(writer.flush().await, FlushResult::RateLimited(_)));
        assert_eq!(writer.len(), 1);

        // Next attempt succeeds and resends the same rows.
        assert_eq!(writer.flush().await, FlushResult::Flushed(1));
        let requests = writer.store().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
    }

    #[tokio::test]
    async fn other_failures_keep_batch() {
        let store = FakeStore::scripted(vec![Err(StoreError::Failed("500".into()))]);
        let mut writer = BatchWriter::new(store, col("B"), 1);
        writer.add(RowUpdate::new(3, vec!["v".into()]));
        assert!(matches!(writer.flush().await, FlushResult::Failed(_)));
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let writer = BatchWriter::new(FakeStore::default(), col("A"), 0);
        assert_eq!(writer.capacity(), 1);
    }
}
