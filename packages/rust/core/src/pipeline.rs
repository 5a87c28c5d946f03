//! The shard control loop: checkpoint → render → buffer → flush, per item.
//!
//! Per assigned item the loop
//!
//! 1. skips blank targets,
//! 2. renders through the [`SessionSlot`] (one retry after a crash),
//! 3. buffers non-empty results,
//! 4. saves `index + 1` as the checkpoint,
//! 5. flushes when the batch is full, backing off on a rate limit,
//! 6. sleeps the throttle interval.
//!
//! When the loop ends, for any reason, pending rows get one final flush and
//! the session is closed before the outcome is returned.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use shardscrape_shared::{Result, RowUpdate, RunConfig, ShardSpec, WorkItem};

use crate::batch::{BatchWriter, FlushResult, TabularStore};
use crate::checkpoint::FileCheckpoint;
use crate::session::{RENDER_ATTEMPTS, SessionFactory, SessionSlot};

/// Counters for one finished (or aborted) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub shard: ShardSpec,
    /// Checkpoint value the run started from.
    pub resumed_from: usize,
    /// Checkpoint value the run ended with.
    pub next_index: usize,
    /// Items assigned to this shard in the remaining range.
    pub assigned: usize,
    /// Items whose checkpoint was advanced.
    pub processed: usize,
    /// Items skipped for a blank target.
    pub blank: usize,
    /// Items that rendered but yielded no values.
    pub empty: usize,
    /// Items whose values were buffered.
    pub buffered: usize,
    /// Rendering attempts that ended in a crash.
    pub crashes: usize,
    /// Items given up on after crashing on every attempt.
    pub abandoned: usize,
    pub flushes: usize,
    pub rows_written: usize,
    pub rate_limited: usize,
    pub flush_failures: usize,
    /// Rows still pending after the final flush. These are lost.
    pub unflushed: usize,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback trait for CLI or headless usage.
pub trait ProgressReporter: Send + Sync {
    /// Called once before the first item.
    fn started(&self, assigned: usize, resume_at: usize);
    /// Called after an item's checkpoint has been saved.
    fn item_done(&self, item: &WorkItem, buffered: bool);
    /// Called after every flush attempt that sent a request.
    fn flushed(&self, result: &FlushResult);
    /// Called when the run ends, successful or not.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn started(&self, _assigned: usize, _resume_at: usize) {}
    fn item_done(&self, _item: &WorkItem, _buffered: bool) {}
    fn flushed(&self, _result: &FlushResult) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// ControlLoop
// ---------------------------------------------------------------------------

/// Owns everything one shard needs for a run.
pub struct ControlLoop<F: SessionFactory, S: TabularStore> {
    config: RunConfig,
    checkpoint: FileCheckpoint,
    sessions: SessionSlot<F>,
    batch: BatchWriter<S>,
}

impl<F: SessionFactory, S: TabularStore> ControlLoop<F, S> {
    pub fn new(config: RunConfig, factory: F, store: S) -> Self {
        let checkpoint = FileCheckpoint::new(&config.checkpoint_path);
        let batch = BatchWriter::new(store, config.start_column.clone(), config.batch_size);
        Self {
            config,
            checkpoint,
            sessions: SessionSlot::new(factory),
            batch,
        }
    }

    /// Process this shard's share of `items`, resuming from the checkpoint.
    ///
    /// Errors: unreadable checkpoint, unreachable destination, first browser
    /// launch, checkpoint write failure, or failure to open a replacement
    /// session. Errors raised after
    /// the first item still get the final flush and session close.
    #[instrument(skip_all, fields(shard = %self.config.shard))]
    pub async fn run(
        mut self,
        items: &[WorkItem],
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let resume_at = self.checkpoint.load()?;
        let upper = items.len().min(self.config.max_index);

        let mut summary = RunSummary {
            shard: self.config.shard,
            resumed_from: resume_at,
            next_index: resume_at,
            assigned: self.config.shard.assigned(resume_at..upper).count(),
            ..Default::default()
        };

        info!(
            resume_at,
            upper,
            assigned = summary.assigned,
            batch_size = self.batch.capacity(),
            checkpoint = ?self.checkpoint.path(),
            "starting run"
        );
        progress.started(summary.assigned, resume_at);

        if summary.assigned == 0 {
            info!("nothing left to do for this shard");
            summary.elapsed = start.elapsed();
            progress.done(&summary);
            return Ok(summary);
        }

        // Destination and launch failures surface here, before any
        // checkpoint is touched.
        self.batch.store().check().await?;
        self.sessions.ensure_open().await?;

        let outcome = self.drive(items, resume_at, upper, &mut summary, progress).await;
        if let Err(e) = &outcome {
            error!(error = %e, next_index = summary.next_index, "run aborted");
        }

        self.drain(&mut summary, progress).await;
        self.sessions.close().await;

        summary.elapsed = start.elapsed();
        progress.done(&summary);
        outcome?;

        info!(
            processed = summary.processed,
            buffered = summary.buffered,
            rows_written = summary.rows_written,
            unflushed = summary.unflushed,
            crashes = summary.crashes,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run complete"
        );
        Ok(summary)
    }

    async fn drive(
        &mut self,
        items: &[WorkItem],
        resume_at: usize,
        upper: usize,
        summary: &mut RunSummary,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        for index in self.config.shard.assigned(resume_at..upper) {
            self.process(&items[index], summary, progress).await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(index = item.index, label = %item.label))]
    async fn process(
        &mut self,
        item: &WorkItem,
        summary: &mut RunSummary,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        if item.is_blank() {
            info!("skipped, no target");
            summary.blank += 1;
            self.advance(item.index, summary)?;
            progress.item_done(item, false);
            return Ok(());
        }

        debug!(url = %item.target, "rendering");
        let rendered = self.sessions.render(&item.target).await?;
        summary.crashes += rendered.crashes;
        if rendered.crashes >= RENDER_ATTEMPTS {
            summary.abandoned += 1;
        }

        let buffered = match rendered.outcome.into_values() {
            Some(values) => {
                let count = values.len();
                self.batch.add(RowUpdate::new(item.row_index(), values));
                summary.buffered += 1;
                info!(values = count, pending = self.batch.len(), "buffered");
                true
            }
            None => {
                info!("no values extracted");
                summary.empty += 1;
                false
            }
        };

        self.advance(item.index, summary)?;
        progress.item_done(item, buffered);

        if self.batch.is_full() {
            let result = self.batch.flush().await;
            record_flush(&result, self.batch.len(), summary, progress);
            if matches!(result, FlushResult::RateLimited(_)) {
                warn!(
                    backoff_secs = self.config.quota_backoff.as_secs(),
                    "write quota exceeded, backing off"
                );
                tokio::time::sleep(self.config.quota_backoff).await;
            }
        }

        tokio::time::sleep(self.config.throttle).await;
        Ok(())
    }

    /// Persist `index + 1`; the item is done as far as resumption goes.
    fn advance(&mut self, index: usize, summary: &mut RunSummary) -> Result<()> {
        let next = index + 1;
        self.checkpoint.save(next)?;
        summary.next_index = next;
        summary.processed += 1;
        Ok(())
    }

    /// One last flush attempt, without backoff.
    async fn drain(&mut self, summary: &mut RunSummary, progress: &dyn ProgressReporter) {
        if self.batch.is_empty() {
            return;
        }

        info!(rows = self.batch.len(), "final flush");
        let result = self.batch.flush().await;
        record_flush(&result, self.batch.len(), summary, progress);

        summary.unflushed = self.batch.len();
        if summary.unflushed > 0 {
            error!(
                rows = summary.unflushed,
                "rows left unwritten after final flush; their items are already checkpointed"
            );
        }
    }
}

fn record_flush(
    result: &FlushResult,
    pending: usize,
    summary: &mut RunSummary,
    progress: &dyn ProgressReporter,
) {
    match result {
        FlushResult::Nothing => return,
        FlushResult::Flushed(rows) => {
            summary.flushes += 1;
            summary.rows_written += rows;
            info!(rows, total = summary.rows_written, "batch flushed");
        }
        FlushResult::RateLimited(reason) => {
            summary.rate_limited += 1;
            warn!(%reason, pending, "batch rejected by quota, keeping rows");
        }
        FlushResult::Failed(reason) => {
            summary.flush_failures += 1;
            error!(%reason, pending, "batch write failed, keeping rows");
        }
    }
    progress.flushed(result);
}
