#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use listsheet::{
    Backend, BulkFailure, BulkOperation, DataQuery, Error, ExportFile, ExportFormat,
    FieldDefinition, FieldType, Result, Row, RowPage,
};
use listsheet::client::BulkOutcome;
use serde_json::{Map, Value, json};

/// In-memory backend that records every call it receives
#[derive(Default)]
pub struct FakeBackend {
    pub fields: Vec<FieldDefinition>,
    pub rows: Mutex<Vec<Row>>,
    pub calls: Mutex<Vec<String>>,
    pub bulk_requests: Mutex<Vec<Vec<BulkOperation>>>,
    pub created: Mutex<Vec<Map<String, Value>>>,
    pub fail_fields: Option<String>,
    pub fail_delete: Option<i64>,
    /// Number of upcoming row fetches that fail with a network error
    pub fail_fetches: Mutex<usize>,
    pub bulk_errors: Vec<BulkFailure>,
}

impl FakeBackend {
    pub fn with_rows(fields: Vec<FieldDefinition>, rows: Vec<Value>) -> Self {
        FakeBackend {
            fields,
            rows: Mutex::new(
                rows.into_iter()
                    .map(|r| serde_json::from_value(r).unwrap())
                    .collect(),
            ),
            ..FakeBackend::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

pub fn task_fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new("Title", "Title", FieldType::Text).required(),
        FieldDefinition::new("Status", "Status", FieldType::Choice)
            .with_choices(["Open", "Closed"]),
        FieldDefinition::new("Owner", "Owner", FieldType::Text),
    ]
}

pub fn task_rows() -> Vec<Value> {
    vec![
        json!({"ID": 1, "Title": "one", "Status": "Open", "Owner": "Alice"}),
        json!({"ID": 2, "Title": "two", "Status": "Open", "Owner": "Carol"}),
        json!({"ID": 3, "Title": "three", "Status": "Closed", "Owner": "Dave"}),
        json!({"ID": 7, "Title": "seven", "Status": "Open", "Owner": "Alice"}),
    ]
}

#[async_trait]
impl Backend for FakeBackend {
    async fn fetch_fields(&self) -> Result<Vec<FieldDefinition>> {
        self.record("fields");
        match &self.fail_fields {
            Some(message) => Err(Error::Schema(message.clone())),
            None => Ok(self.fields.clone()),
        }
    }

    async fn fetch_rows(&self, _query: &DataQuery) -> Result<RowPage> {
        self.record("data");
        {
            let mut remaining = self.fail_fetches.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Network("connection reset".into()));
            }
        }
        let items = self.rows.lock().unwrap().clone();
        Ok(RowPage {
            total: items.len() as u64,
            items,
        })
    }

    async fn create_item(&self, data: &Map<String, Value>) -> Result<Option<i64>> {
        self.record("create");
        self.created.lock().unwrap().push(data.clone());
        let mut rows = self.rows.lock().unwrap();
        let id = rows.iter().filter_map(|r| r.id).max().unwrap_or(0) + 1;
        rows.push(Row::with_id(id, data.clone()));
        Ok(Some(id))
    }

    async fn delete_item(&self, id: i64) -> Result<()> {
        self.record(format!("delete {id}"));
        if self.fail_delete == Some(id) {
            return Err(Error::Operation {
                action: "delete".into(),
                message: format!("Item {id} not found"),
            });
        }
        self.rows.lock().unwrap().retain(|r| r.id != Some(id));
        Ok(())
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkOutcome> {
        self.record("bulk");
        self.bulk_requests.lock().unwrap().push(operations.to_vec());
        Ok(BulkOutcome {
            success: self.bulk_errors.is_empty(),
            errors: self.bulk_errors.clone(),
        })
    }

    async fn export(&self, format: ExportFormat) -> Result<ExportFile> {
        self.record(format!("export {}", format.as_str()));
        Ok(ExportFile {
            filename: format!("export.{}", format.extension()),
            content_type: None,
            bytes: Vec::new(),
        })
    }

    async fn search(&self, term: &str) -> Result<RowPage> {
        self.record(format!("search {term}"));
        let items: Vec<Row> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.values.values().any(|v| v.as_str().is_some_and(|s| s.contains(term))))
            .cloned()
            .collect();
        Ok(RowPage {
            total: items.len() as u64,
            items,
        })
    }
}
