//! Crash-aware headless Chrome session.
//!
//! A [`ChromeSession`] owns one browser process and one page. Its lifecycle is
//! `Usable → {Crashed, Closed}`: once the engine stops answering, the session
//! reports [`RenderOutcome::Crash`] and must be closed and replaced by the caller.
//! Closing consumes the session, so a closed session cannot be used again.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use shardscrape_shared::{BrowserConfig, RenderOutcome, Result, ScrapeError};

use crate::cookies::load_cookies;
use crate::extract::{Extractor, SelectorExtractor};

/// Interval between visibility checks while waiting for the ready selector.
const READY_POLL: Duration = Duration::from_millis(250);

/// Extra headroom given to individual CDP commands beyond the navigation timeout.
const COMMAND_HEADROOM: Duration = Duration::from_secs(15);

/// How long the engine gets to answer a trivial command after a navigation
/// timeout before it is treated as hung.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a graceful browser shutdown may take before the process is killed.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

/// Opens [`ChromeSession`]s. Cheap to keep around for the whole run.
pub struct ChromeLauncher {
    config: Arc<BrowserConfig>,
    extractor: Arc<dyn Extractor>,
}

impl ChromeLauncher {
    /// Build a launcher that extracts with the configured value selector.
    pub fn new(config: BrowserConfig) -> Result<Self> {
        let extractor = SelectorExtractor::new(&config.value_selector)?;
        Ok(Self::with_extractor(config, Arc::new(extractor)))
    }

    /// Build a launcher with a custom extractor.
    pub fn with_extractor(config: BrowserConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            config: Arc::new(config),
            extractor,
        }
    }

    /// Launch Chrome, open a blank page, and apply saved cookies best-effort.
    #[instrument(skip_all)]
    pub async fn open(&self) -> Result<ChromeSession> {
        let config = &self.config;
        info!(headless = config.headless, "launching browser");

        let mut builder = CdpBrowserConfig::builder()
            .no_sandbox()
            .window_size(config.window_width, config.window_height)
            .request_timeout(Duration::from_secs(config.page_load_timeout_secs) + COMMAND_HEADROOM)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={}", config.user_agent));
        if config.disable_images {
            builder = builder.arg("--blink-settings=imagesEnabled=false");
        }
        builder = if config.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(exe) = &config.executable {
            builder = builder.chrome_executable(exe);
        }
        let cdp_config = builder
            .build()
            .map_err(|e| ScrapeError::Render(format!("invalid browser config: {e}")))?;

        let (browser, mut events) = Browser::launch(cdp_config)
            .await
            .map_err(|e| ScrapeError::Render(format!("failed to launch browser: {e}")))?;

        // The CDP connection only makes progress while its handler is polled.
        // The task ends when the browser goes away, which is how crashes surface.
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "cdp handler event error");
                }
            }
            debug!("cdp handler finished");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(ScrapeError::Render(format!("failed to open page: {e}")));
            }
        };

        let session = ChromeSession {
            browser,
            page,
            handler,
            extractor: Arc::clone(&self.extractor),
            config: Arc::clone(&self.config),
            state: SessionState::Usable,
        };

        match session.apply_cookies().await {
            Ok(0) => {}
            Ok(applied) => info!(applied, "cookies applied"),
            Err(e) => warn!(error = %e, "could not apply saved cookies, continuing without them"),
        }

        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Usable,
    Crashed,
}

/// One live browser plus the page all targets are rendered in.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    extractor: Arc<dyn Extractor>,
    config: Arc<BrowserConfig>,
    state: SessionState,
}

impl ChromeSession {
    /// Navigate to `target`, wait for the ready selector, and extract values.
    ///
    /// Never returns an error: page-level trouble is [`RenderOutcome::Empty`],
    /// engine or transport trouble is [`RenderOutcome::Crash`].
    pub async fn fetch_and_extract(&mut self, target: &str) -> RenderOutcome {
        if self.state != SessionState::Usable {
            return RenderOutcome::Crash;
        }
        if self.handler.is_finished() {
            warn!(url = %target, "browser connection is gone");
            self.state = SessionState::Crashed;
            return RenderOutcome::Crash;
        }

        let outcome = self.render(target).await;
        if outcome == RenderOutcome::Crash {
            self.state = SessionState::Crashed;
        }
        outcome
    }

    async fn render(&self, target: &str) -> RenderOutcome {
        let nav_timeout = Duration::from_secs(self.config.page_load_timeout_secs);
        match tokio::time::timeout(nav_timeout, self.page.goto(target)).await {
            Err(_) => {
                debug!(url = %target, "navigation timed out, checking the engine");
                let reply = tokio::time::timeout(LIVENESS_TIMEOUT, self.page.evaluate("1"))
                    .await
                    .ok()
                    .map(|r| r.map(drop));
                return after_nav_timeout(reply);
            }
            Ok(Err(e)) => return classify("navigation", &e),
            Ok(Ok(_)) => {}
        }

        if let Err(outcome) = self.wait_until_ready().await {
            return outcome;
        }

        match self.page.content().await {
            Ok(html) => {
                let values = self.extractor.extract(&html);
                debug!(url = %target, count = values.len(), extractor = self.extractor.name(), "extracted");
                RenderOutcome::Success(values)
            }
            Err(e) => classify("content", &e),
        }
    }

    /// Poll until the ready selector is visible or the ready timeout passes.
    async fn wait_until_ready(&self) -> std::result::Result<(), RenderOutcome> {
        let deadline = Instant::now() + Duration::from_secs(self.config.ready_timeout_secs);
        let script = visibility_script(&self.config.ready_selector);

        loop {
            match self.page.evaluate(script.as_str()).await {
                Ok(result) => {
                    if result.into_value::<bool>().unwrap_or(false) {
                        return Ok(());
                    }
                }
                Err(e) => {
                    let outcome = classify("ready check", &e);
                    if outcome == RenderOutcome::Crash {
                        return Err(outcome);
                    }
                }
            }

            if Instant::now() >= deadline {
                debug!(selector = %self.config.ready_selector, "ready selector never became visible");
                return Err(RenderOutcome::Empty);
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    /// Visit the cookie origin, set every saved cookie, and reload.
    /// Returns how many cookies were accepted.
    async fn apply_cookies(&self) -> Result<usize> {
        let path = Path::new(&self.config.cookies_file);
        let Some(cookies) = load_cookies(path)? else {
            debug!(?path, "no cookies file");
            return Ok(0);
        };

        let origin = &self.config.cookie_origin;
        self.page
            .goto(origin.as_str())
            .await
            .map_err(|e| ScrapeError::Render(format!("cookie origin {origin}: {e}")))?;
        tokio::time::sleep(Duration::from_millis(self.config.cookie_settle_ms)).await;

        let mut applied = 0;
        for cookie in &cookies {
            let param = match cookie.to_param(origin) {
                Ok(param) => param,
                Err(e) => {
                    debug!(name = %cookie.name, error = %e, "skipping cookie");
                    continue;
                }
            };
            match self.page.set_cookie(param).await {
                Ok(_) => applied += 1,
                Err(e) => debug!(name = %cookie.name, error = %e, "cookie rejected"),
            }
        }

        self.page
            .reload()
            .await
            .map_err(|e| ScrapeError::Render(format!("reload after cookies: {e}")))?;
        tokio::time::sleep(Duration::from_millis(self.config.reload_settle_ms)).await;

        Ok(applied)
    }

    /// Best-effort teardown. Errors are logged and dropped.
    pub async fn close(self) {
        let ChromeSession {
            mut browser,
            page,
            handler,
            ..
        } = self;

        if let Err(e) = page.close().await {
            debug!(error = %e, "page close failed");
        }

        match tokio::time::timeout(CLOSE_GRACE, browser.close()).await {
            Ok(Ok(_)) => {
                if let Err(e) = browser.wait().await {
                    debug!(error = %e, "browser wait failed");
                }
            }
            Ok(Err(e)) => {
                debug!(error = %e, "browser close failed, killing");
                kill(&mut browser).await;
            }
            Err(_) => {
                debug!("browser close timed out, killing");
                kill(&mut browser).await;
            }
        }

        handler.abort();
    }
}

async fn kill(browser: &mut Browser) {
    if let Some(Err(e)) = browser.kill().await {
        debug!(error = %e, "browser kill failed");
    }
}

/// Decide whether a CDP error leaves the session usable.
fn classify(stage: &str, err: &CdpError) -> RenderOutcome {
    if is_engine_failure(err) {
        warn!(stage, error = %err, "rendering engine failure");
        RenderOutcome::Crash
    } else {
        debug!(stage, error = %err, "page-level render failure");
        RenderOutcome::Empty
    }
}

/// A slow page is `Empty`; an engine that no longer answers is `Crash`.
/// `reply` is `None` when the liveness command itself timed out.
fn after_nav_timeout(reply: Option<std::result::Result<(), CdpError>>) -> RenderOutcome {
    match reply {
        None => {
            warn!("engine did not answer after navigation timeout");
            RenderOutcome::Crash
        }
        Some(Ok(())) => RenderOutcome::Empty,
        Some(Err(e)) => classify("liveness", &e),
    }
}

/// Transport failures and unanswered commands mean the engine is gone.
pub(crate) fn is_engine_failure(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(..)
            | CdpError::Io(..)
            | CdpError::ChannelSendError(..)
            | CdpError::NoResponse
            | CdpError::Timeout
    )
}

/// JS expression that is `true` once `selector` matches a rendered, visible element.
fn visibility_script(selector: &str) -> String {
    let quoted = serde_json::Value::String(selector.to_string()).to_string();
    format!(
        "(() => {{ const el = document.querySelector({quoted}); \
         if (!el) return false; \
         const r = el.getBoundingClientRect(); \
         const s = window.getComputedStyle(el); \
         return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }})()"
    )
}
