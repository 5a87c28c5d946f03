//! Saved browser cookies used to warm-start a session.
//!
//! The file is a JSON array as exported by common browser tooling. Only
//! `name`, `value`, `path`, `secure` and `expiry` are applied; everything else
//! (notably `domain`) is ignored so the cookies bind to the configured origin.

use std::path::Path;

use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use serde::Deserialize;
use shardscrape_shared::{Result, ScrapeError};

/// One exported cookie.
#[derive(Debug, Clone, Deserialize)]
pub struct SavedCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    /// Expiry as seconds since the epoch.
    #[serde(default)]
    pub expiry: Option<f64>,
}

impl SavedCookie {
    /// Build the CDP parameter binding this cookie to `origin`.
    pub fn to_param(&self, origin: &str) -> std::result::Result<CookieParam, String> {
        let mut builder = CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone())
            .url(origin.to_string());
        if let Some(path) = &self.path {
            builder = builder.path(path.clone());
        }
        if let Some(secure) = self.secure {
            builder = builder.secure(secure);
        }
        if let Some(expiry) = self.expiry {
            builder = builder.expires(TimeSinceEpoch::new(expiry));
        }
        builder.build()
    }
}

/// Read cookies from `path`. Returns `Ok(None)` when the file does not exist.
///
/// Entries that are not objects with a string `name` and `value` are dropped.
pub fn load_cookies(path: &Path) -> Result<Option<Vec<SavedCookie>>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ScrapeError::io(path, e))?;
    let raw: Vec<serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| ScrapeError::parse(format!("{}: {e}", path.display())))?;

    let cookies = raw
        .into_iter()
        .filter_map(|v| serde_json::from_value::<SavedCookie>(v).ok())
        .collect();

    Ok(Some(cookies))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let got = load_cookies(&dir.path().join("cookies.json")).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn loads_and_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "sessionid", "value": "abc", "domain": ".example.com",
                 "path": "/", "secure": true, "httpOnly": true, "expiry": 1893456000},
                {"name": "device_t", "value": "xyz"},
                {"value": "no-name"},
                42
            ]"#,
        )
        .unwrap();

        let cookies = load_cookies(&path).unwrap().unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "sessionid");
        assert_eq!(cookies[0].path.as_deref(), Some("/"));
        assert_eq!(cookies[0].secure, Some(true));
        assert_eq!(cookies[0].expiry, Some(1_893_456_000.0));
        assert!(cookies[1].path.is_none());
    }

    #[test]
    fn garbage_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_cookies(&path).is_err());
    }

    #[test]
    fn param_binds_to_origin() {
        let cookie = SavedCookie {
            name: "sessionid".into(),
            value: "abc".into(),
            path: Some("/".into()),
            secure: Some(true),
            expiry: None,
        };
        let param = cookie.to_param("https://in.example.com/").unwrap();
        assert_eq!(param.name, "sessionid");
        assert_eq!(param.url.as_deref(), Some("https://in.example.com/"));
        assert_eq!(param.secure, Some(true));
        assert!(param.expires.is_none());
    }
}
