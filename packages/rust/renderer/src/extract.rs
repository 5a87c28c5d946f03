//! Value extraction from rendered HTML.
//!
//! Extractors are pure: given the page source they return the ordered list of
//! values that make up one destination row. They never touch the browser.

use scraper::{Html, Selector};
use shardscrape_shared::{Result, ScrapeError};

/// Trait for page-specific value extraction.
pub trait Extractor: Send + Sync {
    /// Extract values from the full page HTML, in document order.
    fn extract(&self, html: &str) -> Vec<String>;

    /// Human-readable extractor name for tracing.
    fn name(&self) -> &str;
}

/// Extracts the text of every element matching a CSS selector.
pub struct SelectorExtractor {
    selector: Selector,
    source: String,
}

impl SelectorExtractor {
    /// Compile `css` into an extractor.
    pub fn new(css: &str) -> Result<Self> {
        let selector = Selector::parse(css)
            .map_err(|e| ScrapeError::validation(format!("invalid value selector '{css}': {e:?}")))?;
        Ok(Self {
            selector,
            source: css.to_string(),
        })
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, html: &str) -> Vec<String> {
        let doc = Html::parse_document(html);
        doc.select(&self.selector)
            .map(|el| normalize_value(&el.text().collect::<String>()))
            .collect()
    }

    fn name(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for SelectorExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorExtractor")
            .field("selector", &self.source)
            .finish()
    }
}

/// Make a displayed value safe for the sheet: typographic minus becomes `-`,
/// the empty-set glyph becomes `None`.
pub fn normalize_value(raw: &str) -> String {
    raw.trim().replace('\u{2212}', "-").replace('\u{2205}', "None")
}
