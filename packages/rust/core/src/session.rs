//! Rendering session contract and crash recovery.
//!
//! The control loop never talks to a browser directly. It goes through a
//! [`SessionSlot`], which holds at most one live session and replaces it when
//! the engine crashes.

use async_trait::async_trait;
use tracing::{info, warn};

use shardscrape_renderer::{ChromeLauncher, ChromeSession};
use shardscrape_shared::{RenderOutcome, Result};

/// Attempts per item: the first try plus one retry on a fresh session.
pub const RENDER_ATTEMPTS: usize = 2;

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// One live rendering engine.
#[async_trait]
pub trait RenderSession: Send {
    /// Load `target`, wait for it to settle, and extract the values.
    ///
    /// Never fails: timeouts and missing content are [`RenderOutcome::Empty`],
    /// a dead engine is [`RenderOutcome::Crash`].
    async fn fetch_and_extract(&mut self, target: &str) -> RenderOutcome;

    /// Release the engine. Best-effort; never fails.
    async fn close(self);
}

/// Opens fresh sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: RenderSession;

    async fn open(&self) -> Result<Self::Session>;
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn fetch_and_extract(&mut self, target: &str) -> RenderOutcome {
        ChromeSession::fetch_and_extract(self, target).await
    }

    async fn close(self) {
        ChromeSession::close(self).await
    }
}

#[async_trait]
impl SessionFactory for ChromeLauncher {
    type Session = ChromeSession;

    async fn open(&self) -> Result<ChromeSession> {
        ChromeLauncher::open(self).await
    }
}

// ---------------------------------------------------------------------------
// SessionSlot
// ---------------------------------------------------------------------------

/// Result of rendering one item through the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// `Success` or `Empty`; never `Crash`.
    pub outcome: RenderOutcome,
    /// How many attempts ended in a crash (0..=RENDER_ATTEMPTS).
    pub crashes: usize,
}

/// Holds the single live session and applies the retry policy.
pub struct SessionSlot<F: SessionFactory> {
    factory: F,
    live: Option<F::Session>,
    opened: usize,
}

impl<F: SessionFactory> SessionSlot<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            live: None,
            opened: 0,
        }
    }

    /// Make sure a session is open, opening one if needed.
    pub async fn ensure_open(&mut self) -> Result<&mut F::Session> {
        let session = match self.live.take() {
            Some(session) => session,
            None => {
                let session = self.factory.open().await?;
                self.opened += 1;
                info!(sessions_opened = self.opened, "renderer session ready");
                session
            }
        };
        Ok(self.live.insert(session))
    }

    /// Render one target, recovering from at most one crash.
    ///
    /// On a crash the dead session is closed and the target is retried once on
    /// a new session. A second crash gives up on the target and reports it as
    /// empty; the slot is left without a session and reopens on next use.
    /// Failing to open a replacement session is an error.
    pub async fn render(&mut self, target: &str) -> Result<Rendered> {
        for attempt in 1..=RENDER_ATTEMPTS {
            let session = self.ensure_open().await?;
            let outcome = session.fetch_and_extract(target).await;
            if outcome != RenderOutcome::Crash {
                return Ok(Rendered {
                    outcome,
                    crashes: attempt - 1,
                });
            }

            self.discard().await;
            if attempt < RENDER_ATTEMPTS {
                warn!(attempt, "renderer crashed, reopening session and retrying");
            }
        }

        warn!("renderer crashed again, giving up on this item");
        Ok(Rendered {
            outcome: RenderOutcome::Empty,
            crashes: RENDER_ATTEMPTS,
        })
    }

    #[cfg(test)]
    pub(crate) fn opened(&self) -> usize {
        self.opened
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.live.is_some()
    }

    /// Close and drop the current session, if any.
    async fn discard(&mut self) {
        if let Some(session) = self.live.take() {
            session.close().await;
        }
    }

    /// Close the live session. Safe to call with no session open.
    pub async fn close(mut self) {
        self.discard().await;
    }
}
