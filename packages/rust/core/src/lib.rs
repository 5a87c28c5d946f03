//! Fault-tolerant control loop for sharded, resumable scrape runs.
//!
//! This crate ties together the work list, the rendering session, the
//! checkpoint file, and the batched writes to the destination store.

pub mod batch;
pub mod checkpoint;
pub mod pipeline;
pub mod session;
pub mod source;

pub use batch::{BatchWriter, FlushResult, SheetsStore, TabularStore};
pub use checkpoint::FileCheckpoint;
pub use pipeline::{ControlLoop, ProgressReporter, RunSummary, SilentProgress};
pub use session::{RENDER_ATTEMPTS, RenderSession, Rendered, SessionFactory, SessionSlot};
pub use source::{FileSource, SheetsSource, SourceLister};
