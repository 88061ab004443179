//! Grid controller.
//!
//! Owns everything one editing session needs: the schema, the derived
//! columns, the visible rows and the change tracker. Each operation takes
//! `&mut self` and awaits its own request, so a session never has two
//! requests in flight.

use log::{error, info, warn};
use serde_json::{Map, Value};

use crate::client::{Backend, DataQuery, ExportFile, ExportFormat};
use crate::column::{ColumnSpec, columns_for};
use crate::error::{Error, Result};
use crate::field::{FieldDefinition, find_field};
use crate::form::{FormInput, build_form, validate};
use crate::row::Row;
use crate::tracker::{ChangeTracker, RowKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Ready,
    /// Initial load failed; the message is shown instead of the grid
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing was pending, no request was made
    NothingToSave,
    Saved { operations: usize },
}

/// A row as displayed in the grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub row: Row,
    token: Option<RowKey>,
}

impl GridRow {
    fn loaded(row: Row) -> Self {
        GridRow { row, token: None }
    }

    /// Pending-set key: the backend id, or the token minted on first edit
    pub fn key(&self) -> Option<RowKey> {
        self.row
            .id
            .map(RowKey::Persisted)
            .or_else(|| self.token.clone())
    }
}

/// State of one grid editing session over a [`Backend`]
pub struct GridController<B> {
    backend: B,
    fields: Vec<FieldDefinition>,
    columns: Vec<ColumnSpec>,
    rows: Vec<GridRow>,
    total: u64,
    tracker: ChangeTracker,
    query: DataQuery,
    state: LoadState,
}

impl<B: Backend> GridController<B> {
    /// Creates an idle controller; call [`Self::load`] before editing
    pub fn new(backend: B) -> Self {
        GridController {
            backend,
            fields: Vec::new(),
            columns: Vec::new(),
            rows: Vec::new(),
            total: 0,
            tracker: ChangeTracker::new(),
            query: DataQuery::default(),
            state: LoadState::Idle,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Load schema, build columns, then load rows.
    ///
    /// The schema is fetched once per session. Any failure leaves the
    /// controller in [`LoadState::Failed`] and stops the sequence.
    pub async fn load(&mut self) -> Result<()> {
        if self.fields.is_empty() {
            match self.backend.fetch_fields().await {
                Ok(fields) => {
                    self.columns = columns_for(&fields);
                    self.fields = fields;
                }
                Err(e) => return Err(self.fail_load(e)),
            }
        }

        if let Err(e) = self.load_rows().await {
            return Err(self.fail_load(e));
        }
        self.state = LoadState::Ready;
        info!(
            "Loaded {} fields and {} rows",
            self.fields.len(),
            self.rows.len()
        );
        Ok(())
    }

    fn fail_load(&mut self, e: Error) -> Error {
        error!("Initial load failed: {e}");
        self.state = LoadState::Failed(e.to_string());
        e
    }

    /// Re-fetch rows with the current query.
    ///
    /// Unsaved rows that still have pending edits stay in the grid after the
    /// fetched rows.
    pub async fn load_rows(&mut self) -> Result<()> {
        let page = self.backend.fetch_rows(&self.query).await?;
        self.show_rows(page.items, page.total);
        Ok(())
    }

    fn show_rows(&mut self, items: Vec<Row>, total: u64) {
        let previous = std::mem::take(&mut self.rows);
        let tracker = &self.tracker;
        self.total = total;
        self.rows = items.into_iter().map(GridRow::loaded).collect();
        self.rows.extend(previous.into_iter().filter(|r| {
            r.row.id.is_none() && r.token.as_ref().is_some_and(|key| tracker.contains(key))
        }));
    }

    /// Append an empty row to the grid and return its index.
    ///
    /// The row gets its temporary token on the first edit.
    pub fn add_row(&mut self) -> usize {
        self.rows.push(GridRow::loaded(Row::default()));
        self.rows.len() - 1
    }

    /// Apply a cell edit to the grid row at `index` and track it.
    ///
    /// # Arguments
    /// * `index` - Position of the row in [`Self::rows`]
    /// * `field` - Internal field name
    /// * `value` - New cell value
    ///
    /// # Returns
    /// * `bool` - False when nothing changed: unknown row or field, or the
    ///   value equals the current one
    pub fn edit_cell(&mut self, index: usize, field: &str, value: Value) -> bool {
        if find_field(&self.fields, field).is_none() {
            warn!("Edit of unknown field {field} ignored");
            return false;
        }
        let Some(grid_row) = self.rows.get_mut(index) else {
            warn!("Edit of missing row {index} ignored");
            return false;
        };

        let old = grid_row.row.value(field);
        if old == value {
            return false;
        }

        let key = match grid_row.key() {
            Some(key) => key,
            None => {
                let key = self.tracker.mint_token();
                grid_row.token = Some(key.clone());
                key
            }
        };

        let snapshot = grid_row.row.clone();
        grid_row.row.set(field, value.clone());
        self.tracker.record_edit(key, &snapshot, field, &old, value)
    }

    /// Commit every pending change as one bulk request.
    ///
    /// On success the pending set is cleared and rows are re-fetched. On a
    /// reported failure the pending set is kept as-is so the user can save
    /// again; nothing is rolled back.
    ///
    /// # Returns
    /// * `Result<SaveOutcome>` - `NothingToSave` without a request when
    ///   nothing is pending, `BulkRejected` listing every reported failure
    pub async fn save_all(&mut self) -> Result<SaveOutcome> {
        if self.tracker.is_empty() {
            info!("No changes to save");
            return Ok(SaveOutcome::NothingToSave);
        }

        let operations = self.tracker.operations();
        let outcome = self.backend.bulk(&operations).await?;
        if !outcome.success {
            warn!("Bulk save reported {} failures", outcome.errors.len());
            return Err(Error::BulkRejected(outcome.errors));
        }

        self.tracker.clear();
        // committed creates come back from the backend with their ids
        self.rows.retain(|r| r.row.id.is_some());
        info!("Saved {} changes", operations.len());
        self.load_rows().await?;
        Ok(SaveOutcome::Saved {
            operations: operations.len(),
        })
    }

    /// Drop all pending edits and reload rows from the backend
    pub async fn refresh(&mut self) -> Result<()> {
        if !self.tracker.is_empty() {
            info!("Discarding {} pending rows", self.tracker.len());
        }
        self.tracker.clear();
        self.load_rows().await
    }

    /// Delete the rows at the given grid indices.
    ///
    /// Unsaved rows are dropped locally. Saved rows are deleted one request
    /// at a time; the first failure aborts the rest and earlier deletions
    /// stand.
    ///
    /// # Arguments
    /// * `selected` - Grid indices; duplicates and out-of-range entries are
    ///   ignored
    ///
    /// # Returns
    /// * `Result<usize>` - Number of rows removed, or `DeleteAborted` naming
    ///   the row that failed and the rows already deleted
    pub async fn delete_rows(&mut self, selected: &[usize]) -> Result<usize> {
        let mut indices: Vec<usize> = selected
            .iter()
            .copied()
            .filter(|&i| i < self.rows.len())
            .collect();
        indices.sort_unstable();
        indices.dedup();

        let mut ids = Vec::new();
        let mut unsaved = Vec::new();
        for &index in &indices {
            match self.rows[index].key() {
                Some(RowKey::Persisted(id)) => ids.push(id),
                Some(key) => unsaved.push(key),
                None => {}
            }
        }

        // Unsaved rows never reached the backend
        let local = indices
            .iter()
            .filter(|&&i| self.rows[i].row.id.is_none())
            .count();
        for key in &unsaved {
            self.tracker.discard(key);
        }
        let mut position = 0;
        self.rows.retain(|r| {
            let keep = !(indices.binary_search(&position).is_ok() && r.row.id.is_none());
            position += 1;
            keep
        });

        let mut deleted = Vec::new();
        for id in ids {
            if let Err(e) = self.backend.delete_item(id).await {
                let message = match e {
                    Error::Operation { message, .. } => message,
                    other => other.to_string(),
                };
                error!("Deleting row {id} failed: {message}");
                self.rows
                    .retain(|r| r.row.id.is_none_or(|row_id| !deleted.contains(&row_id)));
                return Err(Error::DeleteAborted {
                    id,
                    deleted,
                    message,
                });
            }
            self.tracker.discard(&RowKey::Persisted(id));
            deleted.push(id);
        }

        if !deleted.is_empty() {
            self.load_rows().await?;
        }
        Ok(deleted.len() + local)
    }

    /// Input set of the add/edit row form
    pub fn form(&self, existing: Option<usize>) -> Vec<FormInput> {
        let row = existing.and_then(|i| self.rows.get(i)).map(|r| &r.row);
        build_form(&self.fields, row)
    }

    /// Validate and create a single row, then reload.
    ///
    /// Nothing is sent when validation fails.
    pub async fn submit_row(&mut self, data: Map<String, Value>) -> Result<Option<i64>> {
        let errors = validate(&self.fields, &data);
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        let id = self.backend.create_item(&data).await?;
        info!("Created row {id:?}");
        self.load_rows().await?;
        Ok(id)
    }

    pub async fn export(&self, format: ExportFormat) -> Result<ExportFile> {
        self.backend.export(format).await
    }

    /// Replace the visible rows with the matches for `term`; unsaved rows
    /// with pending edits are kept
    pub async fn search(&mut self, term: &str) -> Result<()> {
        let page = self.backend.search(term).await?;
        self.show_rows(page.items, page.total);
        Ok(())
    }

    /// Paging/sorting/filtering applied by the next [`Self::load_rows`]
    pub fn query_mut(&mut self) -> &mut DataQuery {
        &mut self.query
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Error banner text after a failed initial load
    pub fn banner(&self) -> Option<&str> {
        match &self.state {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.tracker.is_empty()
    }
}
