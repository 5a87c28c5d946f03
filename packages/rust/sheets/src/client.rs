//! HTTP client for the `spreadsheets.values` endpoints.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use shardscrape_shared::{ColumnRef, RangeWrite, Result, ScrapeError, StoreError};

use crate::a1;
use crate::auth::{TokenSource, excerpt};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/";

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("shardscrape/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Error status Google attaches to quota rejections.
const QUOTA_STATUS: &str = "RESOURCE_EXHAUSTED";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Authenticated Sheets client.
pub struct SheetsClient {
    http: Client,
    base_url: Url,
    auth: TokenSource,
}

impl SheetsClient {
    /// Create a client against the production API.
    pub fn new(auth: TokenSource) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScrapeError::Network(format!("failed to build HTTP client: {e}")))?;
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| ScrapeError::config(format!("bad base URL: {e}")))?;

        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    /// Point the client at another API root (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ScrapeError::config(format!("base URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Confirm the spreadsheet is reachable with these credentials and has a
    /// tab named `worksheet`.
    #[instrument(skip(self))]
    pub async fn check_worksheet(&self, spreadsheet_id: &str, worksheet: &str) -> Result<()> {
        let mut url = self.endpoint(&["v4", "spreadsheets", spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let token = self.auth.bearer().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ScrapeError::Network(format!("spreadsheet {spreadsheet_id}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Network(format!(
                "spreadsheet {spreadsheet_id}: HTTP {status}: {}",
                excerpt(&body)
            )));
        }

        let meta: SpreadsheetMeta = response
            .json()
            .await
            .map_err(|e| ScrapeError::parse(format!("spreadsheet {spreadsheet_id}: {e}")))?;

        if !meta.sheets.iter().any(|s| s.properties.title == worksheet) {
            let titles: Vec<&str> = meta.sheets.iter().map(|s| s.properties.title.as_str()).collect();
            return Err(ScrapeError::validation(format!(
                "spreadsheet {spreadsheet_id} has no worksheet '{worksheet}' (found: {})",
                titles.join(", ")
            )));
        }

        debug!("worksheet reachable");
        Ok(())
    }

    /// Read one whole column, top to bottom.
    ///
    /// Blank cells inside the data come back as empty strings; trailing blank
    /// cells are omitted by the API.
    #[instrument(skip(self), fields(column = %column))]
    pub async fn read_column(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
        column: &ColumnRef,
    ) -> Result<Vec<String>> {
        let range = a1::column_range(worksheet, column);
        let mut url = self.endpoint(&["v4", "spreadsheets", spreadsheet_id, "values", &range])?;
        url.query_pairs_mut().append_pair("majorDimension", "COLUMNS");

        let token = self.auth.bearer().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ScrapeError::Network(format!("{range}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Network(format!(
                "{range}: HTTP {status}: {}",
                excerpt(&body)
            )));
        }

        let parsed: ValueRange = response
            .json()
            .await
            .map_err(|e| ScrapeError::parse(format!("{range}: {e}")))?;

        let cells: Vec<String> = parsed
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(cell_to_string)
            .collect();

        debug!(%range, cells = cells.len(), "column read");
        Ok(cells)
    }

    /// Write every range in one `values:batchUpdate` request.
    ///
    /// Values are sent `RAW`, one row per range. Returns the number of ranges
    /// written.
    #[instrument(skip(self, writes), fields(ranges = writes.len()))]
    pub async fn batch_update(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
        writes: &[RangeWrite],
    ) -> std::result::Result<usize, StoreError> {
        let url = self
            .endpoint(&["v4", "spreadsheets", spreadsheet_id, "values:batchUpdate"])
            .map_err(|e| StoreError::Failed(e.to_string()))?;

        let data: Vec<serde_json::Value> = writes
            .iter()
            .map(|w| {
                serde_json::json!({
                    "range": a1::qualify(worksheet, &w.start_cell),
                    "majorDimension": "ROWS",
                    "values": [w.values],
                })
            })
            .collect();
        let body = serde_json::json!({
            "valueInputOption": "RAW",
            "data": data,
        });

        let token = self
            .auth
            .bearer()
            .await
            .map_err(|e| StoreError::Failed(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Failed(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(writes.len());
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &text))
    }
}

/// Map a non-success response onto the store error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> StoreError {
    let detail = format!("HTTP {status}: {}", excerpt(body));
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains(QUOTA_STATUS) {
        StoreError::RateLimited(detail)
    } else {
        StoreError::Failed(detail)
    }
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SheetsClient {
        SheetsClient::new(TokenSource::Static("test-token".into()))
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    #[tokio::test]
    async fn reads_column_with_blank_cells() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/src-id/values/'Sheet1'!G:G"))
            .and(query_param("majorDimension", "COLUMNS"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "Sheet1!G1:G4",
                "majorDimension": "COLUMNS",
                "values": [["URL", "https://example.com/a", "", "https://example.com/c"]]
            })))
            .mount(&server)
            .await;

        let col = ColumnRef::parse("G").unwrap();
        let cells = client_for(&server)
            .read_column("src-id", "Sheet1", &col)
            .await
            .unwrap();
        assert_eq!(
            cells,
            vec!["URL", "https://example.com/a", "", "https://example.com/c"]
        );
    }

    #[tokio::test]
    async fn empty_column_has_no_values_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "range": "Sheet1!A1:A1000",
                "majorDimension": "COLUMNS"
            })))
            .mount(&server)
            .await;

        let col = ColumnRef::parse("A").unwrap();
        let cells = client_for(&server)
            .read_column("src-id", "Sheet1", &col)
            .await
            .unwrap();
        assert!(cells.is_empty());
    }

    #[tokio::test]
    async fn read_failure_is_a_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Requested entity was not found."))
            .mount(&server)
            .await;

        let col = ColumnRef::parse("G").unwrap();
        let err = client_for(&server)
            .read_column("missing", "Sheet1", &col)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Network(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn check_worksheet_finds_tab() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/dest-id"))
            .and(query_param("fields", "sheets.properties.title"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sheets": [
                    {"properties": {"title": "Sheet1"}},
                    {"properties": {"title": "Sheet2"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .check_worksheet("dest-id", "Sheet2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn check_worksheet_missing_tab_is_a_validation_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/dest-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sheets": [{"properties": {"title": "Sheet1"}}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_worksheet("dest-id", "Sheet2")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Validation { .. }));
        assert!(err.to_string().contains("Sheet2"));
    }

    #[tokio::test]
    async fn check_worksheet_unknown_spreadsheet_is_a_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/wrong-id"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string("Requested entity was not found."),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_worksheet("wrong-id", "Sheet2")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Network(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn batch_update_sends_rows_at_start_column() {
        let server = MockServer::start().await;

        let expected = serde_json::json!({
            "valueInputOption": "RAW",
            "data": [
                {"range": "'Sheet2'!AJ2", "majorDimension": "ROWS", "values": [["1.2", "3.4"]]},
                {"range": "'Sheet2'!AJ5", "majorDimension": "ROWS", "values": [["-7"]]}
            ]
        });

        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/dest-id/values:batchUpdate"))
            .and(body_json(expected))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "spreadsheetId": "dest-id",
                "totalUpdatedRows": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let writes = vec![
            RangeWrite {
                start_cell: "AJ2".into(),
                values: vec!["1.2".into(), "3.4".into()],
            },
            RangeWrite {
                start_cell: "AJ5".into(),
                values: vec!["-7".into()],
            },
        ];
        let written = client_for(&server)
            .batch_update("dest-id", "Sheet2", &writes)
            .await
            .unwrap();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn batch_update_detects_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(
                r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#,
            ))
            .mount(&server)
            .await;

        let writes = vec![RangeWrite {
            start_cell: "AJ2".into(),
            values: vec!["1".into()],
        }];
        let err = client_for(&server)
            .batch_update("dest-id", "Sheet2", &writes)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RateLimited(_)));
    }

    #[tokio::test]
    async fn batch_update_other_errors_are_failures() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let writes = vec![RangeWrite {
            start_cell: "AJ2".into(),
            values: vec!["1".into()],
        }];
        let err = client_for(&server)
            .batch_update("dest-id", "Sheet2", &writes)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Failed(_)));
    }

    #[test]
    fn quota_status_in_body_counts_as_rate_limit() {
        let err = classify_failure(StatusCode::FORBIDDEN, "Quota exceeded: RESOURCE_EXHAUSTED");
        assert!(matches!(err, StoreError::RateLimited(_)));
    }

    #[test]
    fn non_string_cells_are_stringified() {
        assert_eq!(cell_to_string(serde_json::json!(12.5)), "12.5");
        assert_eq!(cell_to_string(serde_json::Value::Null), "");
    }
}
