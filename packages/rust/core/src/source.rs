//! Where the work list comes from.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};

use shardscrape_sheets::SheetsClient;
use shardscrape_shared::{ColumnRef, Result, ScrapeError, WorkItem};

/// Produces the full, ordered work list. Item `i` has index `i`.
#[async_trait]
pub trait SourceLister: Send + Sync {
    async fn list(&self) -> Result<Vec<WorkItem>>;
}

// ---------------------------------------------------------------------------
// Spreadsheet source
// ---------------------------------------------------------------------------

/// Targets and labels read from two columns of a worksheet.
pub struct SheetsSource {
    client: Arc<SheetsClient>,
    spreadsheet_id: String,
    worksheet: String,
    target_column: ColumnRef,
    label_column: ColumnRef,
}

impl SheetsSource {
    pub fn new(
        client: Arc<SheetsClient>,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
        target_column: ColumnRef,
        label_column: ColumnRef,
    ) -> Self {
        Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
            target_column,
            label_column,
        }
    }
}

#[async_trait]
impl SourceLister for SheetsSource {
    #[instrument(skip_all, fields(spreadsheet = %self.spreadsheet_id, worksheet = %self.worksheet))]
    async fn list(&self) -> Result<Vec<WorkItem>> {
        self.client
            .check_worksheet(&self.spreadsheet_id, &self.worksheet)
            .await?;
        let targets = self
            .client
            .read_column(&self.spreadsheet_id, &self.worksheet, &self.target_column)
            .await?;
        let labels = self
            .client
            .read_column(&self.spreadsheet_id, &self.worksheet, &self.label_column)
            .await?;

        let items = zip_columns(targets, labels);
        info!(items = items.len(), "work list loaded");
        Ok(items)
    }
}

/// Pair targets with labels by position. The target column decides the length;
/// a missing or blank label becomes `Row {index}`.
fn zip_columns(targets: Vec<String>, labels: Vec<String>) -> Vec<WorkItem> {
    targets
        .into_iter()
        .enumerate()
        .map(|(index, target)| {
            let label = labels
                .get(index)
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Row {index}"));
            WorkItem::new(index, target, label)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// File source
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    target: String,
}

/// A local JSON array of `{"label": ..., "target": ...}` objects.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SourceLister for FileSource {
    async fn list(&self) -> Result<Vec<WorkItem>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ScrapeError::io(&self.path, e))?;
        let entries: Vec<FileEntry> = serde_json::from_str(&content)
            .map_err(|e| ScrapeError::parse(format!("{}: {e}", self.path.display())))?;

        let (targets, labels) = entries
            .into_iter()
            .map(|e| (e.target, e.label.unwrap_or_default()))
            .unzip();
        let items = zip_columns(targets, labels);
        info!(path = ?self.path, items = items.len(), "work list loaded");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardscrape_sheets::TokenSource;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn zips_by_target_column_length() {
        let items = zip_columns(
            vec!["https://a".into(), "".into(), "https://c".into()],
            vec!["Alpha".into(), "  ".into()],
        );
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].label, "Alpha");
        assert!(items[1].is_blank());
        assert_eq!(items[1].label, "Row 1");
        assert_eq!(items[2].label, "Row 2");
        assert_eq!(items[2].index, 2);
    }

    #[tokio::test]
    async fn file_source_reads_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(
            &path,
            r#"[
                {"label": "ACME", "target": " https://example.com/acme "},
                {"target": ""},
                {"label": "Globex", "target": "https://example.com/globex"}
            ]"#,
        )
        .unwrap();

        let items = FileSource::new(&path).list().await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].target, "https://example.com/acme");
        assert!(items[1].is_blank());
        assert_eq!(items[1].label, "Row 1");
        assert_eq!(items[2].label, "Globex");
    }

    #[tokio::test]
    async fn file_source_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, r#"{"target": "https://x"}"#).unwrap();
        let err = FileSource::new(&path).list().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Parse { .. }));
    }

    #[tokio::test]
    async fn sheets_source_reads_both_columns() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/src"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sheets": [{"properties": {"title": "Sheet1"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/src/values/'Sheet1'!G:G"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [["https://a", "", "https://c"]]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/src/values/'Sheet1'!A:A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [["Alpha", "Beta"]]
            })))
            .mount(&server)
            .await;

        let client = SheetsClient::new(TokenSource::Static("t".into()))
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let source = SheetsSource::new(
            Arc::new(client),
            "src",
            "Sheet1",
            ColumnRef::parse("G").unwrap(),
            ColumnRef::parse("A").unwrap(),
        );

        let items = source.list().await.unwrap();
        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Alpha", "Beta", "Row 2"]);
        assert!(items[1].is_blank());
    }

    #[tokio::test]
    async fn sheets_source_missing_tab_fails_before_reading() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/src"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sheets": [{"properties": {"title": "Other"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/src/values/'Sheet1'!G:G"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SheetsClient::new(TokenSource::Static("t".into()))
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let source = SheetsSource::new(
            Arc::new(client),
            "src",
            "Sheet1",
            ColumnRef::parse("G").unwrap(),
            ColumnRef::parse("A").unwrap(),
        );

        let err = source.list().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Validation { .. }));
    }
}
