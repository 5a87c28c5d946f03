//! Headless Chrome rendering session and value extraction.
//!
//! This crate provides:
//! - [`extract`]: pure HTML → values extraction ([`Extractor`], [`SelectorExtractor`])
//! - [`cookies`]: saved-session warm-start data
//! - [`session`]: a crash-aware Chrome session ([`ChromeLauncher`], [`ChromeSession`])

pub mod cookies;
pub mod extract;
pub mod session;

pub use cookies::{SavedCookie, load_cookies};
pub use extract::{Extractor, SelectorExtractor, normalize_value};
pub use session::{ChromeLauncher, ChromeSession};
