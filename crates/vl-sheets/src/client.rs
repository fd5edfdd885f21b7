//! Sheets v4 values API client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use vl_core::record::{COLUMN_COUNT, header_row};
use vl_core::{HeaderStatus, IntervalRecord, IntervalStore, Row, StoreError, StoreOp};

use crate::auth::{ServiceAccountKey, TokenProvider};
use crate::{SheetsError, parse_api_error};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
/// Size of a newly created worksheet.
const NEW_SHEET_ROWS: u32 = 1000;
/// Last column letter of the six-column layout.
const LAST_COLUMN: char = 'F';
const EXIT_COLUMN_LETTER: char = 'F';

/// A worksheet in a Google spreadsheet, used as an interval store.
///
/// Values are written with `valueInputOption=RAW` so identifiers and times
/// read back exactly as written.
pub struct SheetsStore {
    http: reqwest::Client,
    auth: TokenProvider,
    spreadsheet_id: String,
    sheet_name: String,
}

impl fmt::Debug for SheetsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsStore")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet_name", &self.sheet_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

impl SheetsStore {
    /// Creates a store for `sheet_name` inside the spreadsheet.
    pub fn new(
        key: ServiceAccountKey,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Result<Self, SheetsError> {
        let spreadsheet_id = spreadsheet_id.into();
        let sheet_name = sheet_name.into();
        if spreadsheet_id.trim().is_empty() {
            return Err(SheetsError::Empty("spreadsheet ID"));
        }
        if sheet_name.trim().is_empty() {
            return Err(SheetsError::Empty("sheet name"));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(SheetsError::ClientBuild)?;
        let auth = TokenProvider::new(http.clone(), key)?;

        Ok(Self {
            http,
            auth,
            spreadsheet_id,
            sheet_name,
        })
    }

    /// Builds `<api>/<spreadsheet><suffix>/<segments...>?<query>`.
    ///
    /// `suffix` is glued to the spreadsheet ID for custom methods such as
    /// `:batchUpdate`.
    fn endpoint(
        &self,
        suffix: &str,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url, SheetsError> {
        let mut url = Url::parse(SHEETS_API_URL)
            .map_err(|e| SheetsError::InvalidResponse(format!("bad API URL: {e}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| SheetsError::InvalidResponse("API URL cannot be a base".into()))?;
            path.push(&format!("{}{suffix}", self.spreadsheet_id));
            for segment in segments {
                path.push(segment);
            }
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<Value, SheetsError> {
        let token = self.auth.access_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(
                parse_api_error(status.as_u16(), &text).unwrap_or_else(|| SheetsError::Api {
                    status: status.as_u16(),
                    message: text,
                }),
            );
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| SheetsError::InvalidResponse(err.to_string()))
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Row>, SheetsError> {
        let url = self.endpoint("", &["values", range], &[])?;
        let value = self.call(Method::GET, url, None).await?;
        parse_value_range(value)
    }

    async fn sheet_exists(&self) -> Result<bool, SheetsError> {
        let url = self.endpoint("", &[], &[("fields", "sheets.properties.title")])?;
        let value = self.call(Method::GET, url, None).await?;
        let spreadsheet: Spreadsheet = serde_json::from_value(value)
            .map_err(|err| SheetsError::InvalidResponse(err.to_string()))?;
        Ok(spreadsheet
            .sheets
            .iter()
            .any(|s| s.properties.title == self.sheet_name))
    }

    async fn add_sheet(&self) -> Result<(), SheetsError> {
        let url = self.endpoint(":batchUpdate", &[], &[])?;
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": self.sheet_name,
                        "gridProperties": {
                            "rowCount": NEW_SHEET_ROWS,
                            "columnCount": COLUMN_COUNT,
                        }
                    }
                }
            }]
        });
        self.call(Method::POST, url, Some(body)).await?;
        tracing::info!(sheet = %self.sheet_name, "created worksheet");
        Ok(())
    }

    async fn put_values(&self, range: &str, rows: Vec<Row>) -> Result<(), SheetsError> {
        let url = self.endpoint("", &["values", range], &[("valueInputOption", "RAW")])?;
        let body = json!({ "range": range, "values": rows });
        self.call(Method::PUT, url, Some(body)).await?;
        Ok(())
    }

    async fn ensure_header_impl(&self) -> Result<HeaderStatus, SheetsError> {
        let mut created = false;
        if !self.sheet_exists().await? {
            self.add_sheet().await?;
            created = true;
        }

        let header_range = a1_range(&self.sheet_name, &format!("A1:{LAST_COLUMN}1"));
        let found = self
            .get_values(&header_range)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let status = header_status(created, found);
        if status != HeaderStatus::Unchanged {
            self.put_values(&header_range, vec![header_row()]).await?;
        }
        Ok(status)
    }

    async fn append_impl(&self, record: &IntervalRecord) -> Result<(), SheetsError> {
        let range = a1_range(&self.sheet_name, &format!("A:{LAST_COLUMN}"));
        let append_segment = format!("{range}:append");
        let url = self.endpoint(
            "",
            &["values", append_segment.as_str()],
            &[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ],
        )?;
        let body = json!({ "range": range, "values": [record.to_row()] });
        self.call(Method::POST, url, Some(body)).await?;
        Ok(())
    }

    async fn update_exit_time_impl(&self, index: usize, exit_time: &str) -> Result<(), SheetsError> {
        let range = exit_cell_range(&self.sheet_name, index);
        self.put_values(&range, vec![vec![exit_time.to_string()]])
            .await
    }
}

#[async_trait]
impl IntervalStore for SheetsStore {
    async fn ensure_header(&self) -> Result<HeaderStatus, StoreError> {
        self.ensure_header_impl()
            .await
            .map_err(|e| StoreError::unavailable(StoreOp::EnsureHeader, e))
    }

    async fn append(&self, record: &IntervalRecord) -> Result<(), StoreError> {
        self.append_impl(record)
            .await
            .map_err(|e| StoreError::unavailable(StoreOp::Append, e))
    }

    async fn read_all(&self) -> Result<Vec<Row>, StoreError> {
        let range = a1_range(&self.sheet_name, &format!("A:{LAST_COLUMN}"));
        self.get_values(&range)
            .await
            .map_err(|e| StoreError::unavailable(StoreOp::ReadAll, e))
    }

    async fn update_exit_time(&self, index: usize, exit_time: &str) -> Result<(), StoreError> {
        self.update_exit_time_impl(index, exit_time)
            .await
            .map_err(|e| StoreError::unavailable(StoreOp::UpdateExitTime, e))
    }
}

/// Formats an A1 range on a named sheet, quoting the name.
fn a1_range(sheet: &str, cells: &str) -> String {
    format!("'{}'!{cells}", sheet.replace('\'', "''"))
}

/// A1 address of the exit time cell for the zero-based row `index`.
///
/// Sheet rows are 1-based, so row 0 (the header) is row 1 on the sheet.
fn exit_cell_range(sheet: &str, index: usize) -> String {
    a1_range(sheet, &format!("{EXIT_COLUMN_LETTER}{}", index + 1))
}

/// Decides what preparing the header means given what is on row 1.
///
/// A sheet that was just added, or whose first row is blank, gets a new
/// header; any other mismatch is overwritten and reported.
fn header_status(created: bool, found: Row) -> HeaderStatus {
    if found == header_row() {
        HeaderStatus::Unchanged
    } else if created || found.iter().all(|cell| cell.is_empty()) {
        HeaderStatus::Created
    } else {
        HeaderStatus::Replaced { found }
    }
}

/// Converts a `ValueRange` response into rows of strings.
///
/// The API omits trailing empty cells and may return numbers or booleans for
/// cells that were not entered as text.
fn parse_value_range(value: Value) -> Result<Vec<Row>, SheetsError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let range: ValueRange =
        serde_json::from_value(value).map_err(|err| SheetsError::InvalidResponse(err.to_string()))?;
    Ok(range
        .values
        .into_iter()
        .map(|row| row.into_iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
