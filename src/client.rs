//! REST client for the list API.
//!
//! [`Backend`] is the seam the grid controller talks through; [`HttpBackend`]
//! implements it over HTTP with `reqwest`.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BulkFailure, Error, Result};
use crate::field::FieldDefinition;
use crate::row::Row;
use crate::tracker::BulkOperation;

/// Paging, filtering and sorting of a row fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Field name to case-insensitive substring
    pub filters: Map<String, Value>,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl DataQuery {
    /// Query-string pairs in the names the data endpoint expects
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(size) = self.page_size {
            pairs.push(("pageSize", size.to_string()));
        }
        if !self.filters.is_empty() {
            pairs.push(("filters", Value::Object(self.filters.clone()).to_string()));
        }
        if let Some(field) = &self.sort_field {
            pairs.push(("sortField", field.clone()));
            pairs.push(("sortOrder", self.sort_order.as_str().to_string()));
        }
        pairs
    }
}

/// One page of rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowPage {
    pub items: Vec<Row>,
    pub total: u64,
}

/// Result of a bulk commit the backend accepted for processing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Excel,
    Csv,
}

impl ExportFormat {
    /// Path segment of the export endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Excel => "excel",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Excel => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "excel" => Some(ExportFormat::Excel),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }
}

/// A downloaded export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Operations the grid needs from the list backend
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_fields(&self) -> Result<Vec<FieldDefinition>>;

    async fn fetch_rows(&self, query: &DataQuery) -> Result<RowPage>;

    /// Create one row, returning the backend id when reported
    async fn create_item(&self, data: &Map<String, Value>) -> Result<Option<i64>>;

    async fn delete_item(&self, id: i64) -> Result<()>;

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkOutcome>;

    async fn export(&self, format: ExportFormat) -> Result<ExportFile>;

    async fn search(&self, term: &str) -> Result<RowPage>;
}

#[derive(Deserialize)]
struct FieldsBody {
    fields: Option<Vec<FieldDefinition>>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ItemBody {
    #[serde(default)]
    success: bool,
    id: Option<i64>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    operations: &'a [BulkOperation],
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    #[serde(rename = "searchTerm")]
    search_term: &'a str,
}

/// [`Backend`] over the list server's REST API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:5000`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpBackend { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }
}

/// Pull the verbatim error text out of a failed response
async fn error_text(action: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| format!("HTTP {status}"));
    Error::operation(action, message)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_fields(&self) -> Result<Vec<FieldDefinition>> {
        let response = self.client.get(self.url("fields")).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("GET /api/fields -> {status}");

        let parsed: FieldsBody = serde_json::from_str(&body)
            .map_err(|e| Error::Schema(format!("malformed field list: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(Error::Schema(error));
        }
        if !status.is_success() {
            return Err(Error::Schema(format!("HTTP {status}")));
        }
        parsed
            .fields
            .ok_or_else(|| Error::Schema("response has no fields".to_string()))
    }

    async fn fetch_rows(&self, query: &DataQuery) -> Result<RowPage> {
        let response = self
            .client
            .get(self.url("data"))
            .query(&query.to_pairs())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_text("load data", response).await);
        }
        let body: Value = response.json().await?;
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(Error::operation("load data", error));
        }
        serde_json::from_value(body).map_err(|e| Error::operation("load data", e.to_string()))
    }

    async fn create_item(&self, data: &Map<String, Value>) -> Result<Option<i64>> {
        let response = self.client.post(self.url("item")).json(data).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let parsed: ItemBody = serde_json::from_str(&body)
            .map_err(|_| Error::operation("create", format!("HTTP {status}")))?;
        if !parsed.success {
            let message = parsed.error.unwrap_or_else(|| format!("HTTP {status}"));
            return Err(Error::operation("create", message));
        }
        Ok(parsed.id)
    }

    async fn delete_item(&self, id: i64) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("item/{id}")))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_text("delete", response).await)
        }
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkOutcome> {
        let response = self
            .client
            .post(self.url("bulk"))
            .json(&BulkRequest { operations })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        // A rejected bulk still carries the per-operation error list
        if let Ok(outcome) = serde_json::from_str::<BulkOutcome>(&body) {
            return Ok(outcome);
        }
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| format!("HTTP {status}"));
        Err(Error::operation("bulk save", message))
    }

    async fn export(&self, format: ExportFormat) -> Result<ExportFile> {
        let response = self
            .client
            .get(self.url(&format!("export/{}", format.as_str())))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_text("export", response).await);
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().await?.to_vec();
        Ok(ExportFile {
            filename: filename_from_headers(&headers)
                .unwrap_or_else(|| format!("export.{}", format.extension())),
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            bytes,
        })
    }

    async fn search(&self, term: &str) -> Result<RowPage> {
        let response = self
            .client
            .post(self.url("search"))
            .json(&SearchRequest { search_term: term })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_text("search", response).await);
        }
        response
            .json()
            .await
            .map_err(|e| Error::operation("search", e.to_string()))
    }
}

/// Filename from a `Content-Disposition` header, if one is given
pub fn filename_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    parse_disposition_filename(value)
}

fn parse_disposition_filename(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let name = part.strip_prefix("filename=")?;
        let name = name.trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_pairs_use_the_endpoint_names() {
        let mut query = DataQuery {
            page: Some(2),
            page_size: Some(50),
            sort_field: Some("Title".into()),
            sort_order: SortOrder::Desc,
            ..DataQuery::default()
        };
        query.filters.insert("Status".into(), json!("open"));

        assert_eq!(
            query.to_pairs(),
            vec![
                ("page", "2".to_string()),
                ("pageSize", "50".to_string()),
                ("filters", r#"{"Status":"open"}"#.to_string()),
                ("sortField", "Title".to_string()),
                ("sortOrder", "desc".to_string()),
            ]
        );
        assert!(DataQuery::default().to_pairs().is_empty());
    }

    #[test]
    fn disposition_filename() {
        assert_eq!(
            parse_disposition_filename(r#"attachment; filename="list_data_20240101_000000.csv""#),
            Some("list_data_20240101_000000.csv".to_string())
        );
        assert_eq!(parse_disposition_filename("attachment"), None);
    }

    #[test]
    fn export_formats() {
        assert_eq!(ExportFormat::parse("EXCEL"), Some(ExportFormat::Excel));
        assert_eq!(ExportFormat::parse("pdf"), None);
        assert_eq!(ExportFormat::Csv.extension(), "csv");
    }
}
