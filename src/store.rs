//! Server-side list storage.
//!
//! [`ListProvider`] is what the REST handlers run against. Querying, search
//! and bulk application are provided on top of the five primitive operations,
//! so a provider only has to know how to read and write single rows.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{error, info};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::client::{BulkOutcome, SortOrder};
use crate::column::{parse_datetime, plain_text};
use crate::error::BulkFailure;
use crate::field::{FieldDefinition, FieldType};
use crate::form::validate;
use crate::row::{ID_FIELD, Row};
use crate::saving::{Snapshot, load_snapshot, save_snapshot};
use crate::tracker::BulkOperation;

/// Storage layout of date/time values returned to clients
pub const STORED_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Failure of a single list operation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item {0} not found")]
    NotFound(i64),

    #[error("{0}")]
    Invalid(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] std::io::Error),
}

/// Filter, sort and page selection of a data request
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    /// 1-based
    pub page: usize,
    pub page_size: usize,
    pub filters: Map<String, Value>,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
}

impl ItemQuery {
    pub fn first_page(page_size: usize) -> Self {
        ItemQuery {
            page: 1,
            page_size,
            filters: Map::new(),
            sort_field: None,
            sort_order: SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemPage {
    pub items: Vec<Row>,
    /// Matches before paging
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Storage backend behind the REST API
///
/// Implementors provide the five row primitives; paging, search and bulk
/// application come for free.
pub trait ListProvider: Send {
    /// Field schema of the list
    fn fields(&self) -> Vec<FieldDefinition>;

    /// Every row in id order, values normalised for display
    fn items(&self) -> Vec<Row>;

    /// Creates a row
    ///
    /// # Arguments
    /// * `data` - Field values; keys that do not name a field are ignored
    ///
    /// # Returns
    /// * `Result<i64, StoreError>` - Id of the new row, or `Invalid` when a
    ///   required field is missing
    fn create(&mut self, data: &Map<String, Value>) -> Result<i64, StoreError>;

    /// Merges `data` into the row `id`
    ///
    /// # Arguments
    /// * `id` - Row to change
    /// * `data` - Changed field values only
    ///
    /// # Returns
    /// * `Result<(), StoreError>` - `NotFound` when the row does not exist
    fn update(&mut self, id: i64, data: &Map<String, Value>) -> Result<(), StoreError>;

    /// Removes the row `id`, failing with `NotFound` when it does not exist
    fn delete(&mut self, id: i64) -> Result<(), StoreError>;

    /// Filters, sorts and pages the rows
    ///
    /// Filters are case-insensitive substrings per field. Numbers sort
    /// numerically, everything else as text.
    ///
    /// # Arguments
    /// * `query` - Page, page size, filters and sort order
    ///
    /// # Returns
    /// * `ItemPage` - The requested page and the match count before paging
    fn query(&self, query: &ItemQuery) -> ItemPage {
        let mut items = self.items();

        if !query.filters.is_empty() {
            items.retain(|row| matches_filters(row, &query.filters));
        }
        if let Some(field) = &query.sort_field {
            items.sort_by(|a, b| compare_values(&cell(a, field), &cell(b, field)));
            if query.sort_order == SortOrder::Desc {
                items.reverse();
            }
        }

        let total = items.len();
        let page = query.page.max(1);
        let page_size = query.page_size.max(1);
        let items = items
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        ItemPage {
            items,
            total,
            page,
            page_size,
        }
    }

    /// Rows where any value, the id included, contains `term`
    fn search(&self, term: &str) -> Vec<Row> {
        let items = self.items();
        let term = term.to_lowercase();
        if term.is_empty() {
            return items;
        }
        items
            .into_iter()
            .filter(|row| {
                row.id.is_some_and(|id| id.to_string().contains(&term))
                    || row
                        .values
                        .values()
                        .any(|v| plain_text(v).to_lowercase().contains(&term))
            })
            .collect()
    }

    /// Apply operations one by one in submitted order. A failure is recorded
    /// and does not undo or stop the others.
    fn bulk_update(&mut self, operations: &[BulkOperation]) -> BulkOutcome {
        let mut errors = Vec::new();
        for op in operations {
            let result = match op {
                BulkOperation::Create { data } => self.create(data).map(|_| ()),
                BulkOperation::Update { id, data } => self.update(*id, data),
                BulkOperation::Delete { id } => self.delete(*id),
            };
            if let Err(e) = result {
                errors.push(BulkFailure {
                    id: op.id(),
                    action: op.action().to_string(),
                    error: e.to_string(),
                });
            }
        }

        BulkOutcome {
            success: errors.is_empty(),
            errors,
        }
    }
}

fn cell(row: &Row, field: &str) -> Value {
    if field == ID_FIELD {
        return row.id.map(Value::from).unwrap_or(Value::Null);
    }
    row.value(field)
}

fn matches_filters(row: &Row, filters: &Map<String, Value>) -> bool {
    filters.iter().all(|(field, wanted)| {
        let wanted = plain_text(wanted).to_lowercase();
        plain_text(&cell(row, field)).to_lowercase().contains(&wanted)
    })
}

/// Numbers compare numerically, everything else as text; absent sorts first
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => plain_text(a).cmp(&plain_text(b)),
    }
}

/// In-memory list with optional snapshot persistence
#[derive(Debug)]
pub struct MemoryList {
    fields: Vec<FieldDefinition>,
    items: BTreeMap<i64, Map<String, Value>>,
    next_id: i64,
    snapshot: Option<PathBuf>,
}

impl MemoryList {
    /// Empty list without persistence
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        MemoryList {
            fields,
            items: BTreeMap::new(),
            next_id: 1,
            snapshot: None,
        }
    }

    /// Opens a list persisted at `path`
    ///
    /// The list starts empty when the file does not exist yet. Every later
    /// mutation rewrites the snapshot; a mutation whose snapshot cannot be
    /// written is undone.
    ///
    /// # Arguments
    /// * `fields` - Field schema of the list
    /// * `path` - Snapshot file (gzip-compressed JSON)
    ///
    /// # Returns
    /// * `Result<MemoryList, StoreError>` - The list, or `Snapshot` when an
    ///   existing file cannot be read
    pub fn open(fields: Vec<FieldDefinition>, path: PathBuf) -> Result<Self, StoreError> {
        let mut list = MemoryList::new(fields);
        if path.exists() {
            let snapshot = load_snapshot(&path)?;
            for row in snapshot.items {
                if let Some(id) = row.id {
                    list.items.insert(id, row.values);
                }
            }
            let max_id = list.items.keys().next_back().copied().unwrap_or(0);
            list.next_id = snapshot.next_id.max(max_id + 1);
            info!("Loaded {} items from {}", list.items.len(), path.display());
        }
        list.snapshot = Some(path);
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keep only keys that name a field; `ID` is never writable
    fn writable(&self, data: &Map<String, Value>) -> Map<String, Value> {
        data.iter()
            .filter(|(key, _)| key.as_str() != ID_FIELD && self.fields.iter().any(|f| &f.name == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn check_required(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let errors = validate(&self.fields, values);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Invalid(errors.join(", ")))
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let snapshot = Snapshot {
            next_id: self.next_id,
            items: self
                .items
                .iter()
                .map(|(id, values)| Row::with_id(*id, values.clone()))
                .collect(),
        };
        save_snapshot(&snapshot, path).map_err(|e| {
            error!("Writing snapshot {} failed: {e}", path.display());
            StoreError::from(e)
        })
    }

    fn normalise(&self, id: i64, values: &Map<String, Value>) -> Row {
        let mut row = Row::with_id(id, values.clone());
        for field in &self.fields {
            if field.field_type != FieldType::DateTime {
                continue;
            }
            if let Some(Value::String(raw)) = row.values.get(&field.name) {
                if let Some(dt) = parse_datetime(raw) {
                    let formatted = dt.format(STORED_DATETIME_FORMAT).to_string();
                    row.set(&field.name, Value::String(formatted));
                }
            }
        }
        row
    }
}

impl ListProvider for MemoryList {
    fn fields(&self) -> Vec<FieldDefinition> {
        self.fields.clone()
    }

    fn items(&self) -> Vec<Row> {
        self.items
            .iter()
            .map(|(id, values)| self.normalise(*id, values))
            .collect()
    }

    fn create(&mut self, data: &Map<String, Value>) -> Result<i64, StoreError> {
        let values = self.writable(data);
        self.check_required(&values)?;

        let id = self.next_id;
        self.items.insert(id, values);
        self.next_id += 1;
        if let Err(e) = self.persist() {
            self.items.remove(&id);
            self.next_id = id;
            return Err(e);
        }
        Ok(id)
    }

    fn update(&mut self, id: i64, data: &Map<String, Value>) -> Result<(), StoreError> {
        let changes = self.writable(data);
        let current = self.items.get(&id).ok_or(StoreError::NotFound(id))?;

        let mut merged = current.clone();
        merged.extend(changes);
        self.check_required(&merged)?;

        let previous = self.items.insert(id, merged);
        if let Err(e) = self.persist() {
            if let Some(previous) = previous {
                self.items.insert(id, previous);
            }
            return Err(e);
        }
        Ok(())
    }

    fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let removed = self.items.remove(&id).ok_or(StoreError::NotFound(id))?;
        if let Err(e) = self.persist() {
            self.items.insert(id, removed);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("Title", "Title", FieldType::Text).required(),
            FieldDefinition::new("Status", "Status", FieldType::Choice)
                .with_choices(["Open", "Closed"]),
            FieldDefinition::new("Cost", "Cost", FieldType::Number),
            FieldDefinition::new("Due", "Due", FieldType::DateTime),
        ]
    }

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> MemoryList {
        let mut list = MemoryList::new(fields());
        for (title, status, cost) in [("beta", "Open", 30), ("alpha", "Closed", 4), ("gamma", "Open", 100)] {
            list.create(&data(json!({"Title": title, "Status": status, "Cost": cost})))
                .unwrap();
        }
        list
    }

    #[test]
    fn ids_increase_and_unknown_keys_are_dropped() {
        let mut list = MemoryList::new(fields());
        let a = list.create(&data(json!({"Title": "a", "ID": 99, "Bogus": 1}))).unwrap();
        let b = list.create(&data(json!({"Title": "b"}))).unwrap();
        assert_eq!((a, b), (1, 2));

        let items = list.items();
        assert_eq!(items[0].id, Some(1));
        assert_eq!(Value::Object(items[0].values.clone()), json!({"Title": "a"}));
    }

    #[test]
    fn required_fields_are_enforced() {
        let mut list = MemoryList::new(fields());
        let err = list.create(&data(json!({"Status": "Open"}))).unwrap_err();
        assert_eq!(err.to_string(), "Title is required");

        let id = list.create(&data(json!({"Title": "x"}))).unwrap();
        assert!(matches!(
            list.update(id, &data(json!({"Title": ""}))),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            list.update(42, &data(json!({"Title": "y"}))),
            Err(StoreError::NotFound(42))
        ));
    }

    #[test]
    fn datetimes_are_normalised_on_read() {
        let mut list = MemoryList::new(fields());
        list.create(&data(json!({"Title": "x", "Due": "2024-05-06T07:08:09Z"})))
            .unwrap();
        assert_eq!(list.items()[0].value("Due"), json!("2024-05-06 07:08:09"));
    }

    #[test]
    fn query_filters_sorts_and_pages() {
        let list = seeded();

        let mut query = ItemQuery::first_page(2);
        query.sort_field = Some("Cost".into());
        query.sort_order = SortOrder::Desc;
        let page = list.query(&query);
        assert_eq!(page.total, 3);
        let costs: Vec<Value> = page.items.iter().map(|r| r.value("Cost")).collect();
        assert_eq!(costs, vec![json!(100), json!(30)]);

        query.page = 2;
        assert_eq!(list.query(&query).items.len(), 1);

        let mut filtered = ItemQuery::first_page(10);
        filtered.filters.insert("Status".into(), json!("open"));
        filtered.sort_field = Some("Title".into());
        let titles: Vec<Value> = list
            .query(&filtered)
            .items
            .iter()
            .map(|r| r.value("Title"))
            .collect();
        assert_eq!(titles, vec![json!("beta"), json!("gamma")]);
    }

    #[test]
    fn search_matches_any_value() {
        let list = seeded();
        assert_eq!(list.search("ALP").len(), 1);
        assert_eq!(list.search("").len(), 3);
        assert!(list.search("zzz").is_empty());
    }

    #[test]
    fn bulk_applies_independently() {
        let mut list = seeded();
        let outcome = list.bulk_update(&[
            BulkOperation::Update {
                id: 1,
                data: data(json!({"Status": "Closed"})),
            },
            BulkOperation::Update {
                id: 77,
                data: data(json!({"Status": "Closed"})),
            },
            BulkOperation::Create {
                data: data(json!({"Title": "delta"})),
            },
            BulkOperation::Delete { id: 2 },
        ]);

        assert!(!outcome.success);
        assert_eq!(
            outcome.errors,
            vec![BulkFailure {
                id: Some(77),
                action: "update".into(),
                error: "Item 77 not found".into(),
            }]
        );
        assert_eq!(list.len(), 3);
        assert_eq!(list.items()[0].value("Status"), json!("Closed"));
    }

    #[test]
    fn snapshot_is_written_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.json.gz");

        let mut list = MemoryList::open(fields(), path.clone()).unwrap();
        assert!(list.is_empty());
        list.create(&data(json!({"Title": "kept"}))).unwrap();
        list.create(&data(json!({"Title": "gone"}))).unwrap();
        list.delete(2).unwrap();

        let mut reopened = MemoryList::open(fields(), path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.create(&data(json!({"Title": "next"}))).unwrap(), 3);
    }

    #[test]
    fn failed_snapshot_write_leaves_the_list_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = seeded();
        list.snapshot = Some(dir.path().join("missing").join("list.json.gz"));

        let err = list.create(&data(json!({"Title": "x"}))).unwrap_err();
        assert!(matches!(err, StoreError::Snapshot(_)));
        assert_eq!(list.len(), 3);

        assert!(list.update(1, &data(json!({"Title": "renamed"}))).is_err());
        assert_eq!(list.items()[0].value("Title"), json!("beta"));

        assert!(list.delete(2).is_err());
        assert_eq!(list.len(), 3);

        // the id that failed to persist is handed out again
        list.snapshot = None;
        assert_eq!(list.create(&data(json!({"Title": "x"}))).unwrap(), 4);
    }
}
