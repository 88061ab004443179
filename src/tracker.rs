//! Pending change tracking.
//!
//! The tracker accumulates uncommitted cell edits per row and turns them into
//! the operations of one bulk commit. Rows the backend already knows are keyed
//! by their id; rows created in the grid get a `new_<millis>` token that stays
//! attached to the row until it is committed.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::row::Row;

/// Prefix of temporary row tokens
pub const TEMP_PREFIX: &str = "new_";

/// Identifier of a row inside the pending set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Persisted(i64),
    Temporary(String),
}

impl RowKey {
    pub fn is_temporary(&self) -> bool {
        matches!(self, RowKey::Temporary(_))
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            RowKey::Persisted(id) => Some(*id),
            RowKey::Temporary(_) => None,
        }
    }

    /// Parse the textual form used in the grid (`"7"` or `"new_1700000000000"`)
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.starts_with(TEMP_PREFIX) {
            return Some(RowKey::Temporary(raw.to_string()));
        }
        raw.parse().ok().map(RowKey::Persisted)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Persisted(id) => write!(f, "{id}"),
            RowKey::Temporary(token) => f.write_str(token),
        }
    }
}

/// Uncommitted edits of one row
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    /// Row as it was before the first edit of this pending session
    pub original: Row,
    /// Only the fields actually edited, last write wins
    pub changes: Map<String, Value>,
}

/// One entry of a bulk request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BulkOperation {
    Create { data: Map<String, Value> },
    Update { id: i64, data: Map<String, Value> },
    Delete { id: i64 },
}

impl BulkOperation {
    pub fn action(&self) -> &'static str {
        match self {
            BulkOperation::Create { .. } => "create",
            BulkOperation::Update { .. } => "update",
            BulkOperation::Delete { .. } => "delete",
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            BulkOperation::Create { .. } => None,
            BulkOperation::Update { id, .. } | BulkOperation::Delete { id } => Some(*id),
        }
    }
}

/// Session-scoped set of pending row changes
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    pending: BTreeMap<RowKey, PendingChange>,
    last_token: i64,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// State transition for one cell edit.
    ///
    /// `snapshot` is the row before this edit; it is only kept when this is
    /// the first edit of the row. An edit that does not change the value
    /// leaves the tracker untouched.
    pub fn on_cell_edited(
        mut self,
        key: RowKey,
        snapshot: &Row,
        field: &str,
        old_value: &Value,
        new_value: Value,
    ) -> Self {
        self.record_edit(key, snapshot, field, old_value, new_value);
        self
    }

    /// In-place form of [`ChangeTracker::on_cell_edited`]; returns whether
    /// anything was recorded.
    pub fn record_edit(
        &mut self,
        key: RowKey,
        snapshot: &Row,
        field: &str,
        old_value: &Value,
        new_value: Value,
    ) -> bool {
        if *old_value == new_value {
            return false;
        }

        let entry = self.pending.entry(key).or_insert_with(|| PendingChange {
            original: snapshot.clone(),
            changes: Map::new(),
        });
        entry.changes.insert(field.to_string(), new_value);
        true
    }

    /// Mint a temporary token from the current time
    pub fn mint_token(&mut self) -> RowKey {
        self.mint_token_at(Utc::now().timestamp_millis())
    }

    /// Mint a temporary token for `millis`, bumped forward when that
    /// timestamp was already handed out by this tracker
    pub fn mint_token_at(&mut self, millis: i64) -> RowKey {
        let millis = millis.max(self.last_token + 1);
        self.last_token = millis;
        RowKey::Temporary(format!("{TEMP_PREFIX}{millis}"))
    }

    pub fn get(&self, key: &RowKey) -> Option<&PendingChange> {
        self.pending.get(key)
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &PendingChange)> {
        self.pending.iter()
    }

    /// Drop the entry of one row
    pub fn discard(&mut self, key: &RowKey) -> Option<PendingChange> {
        self.pending.remove(key)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Operations of a bulk commit, one per pending row.
    ///
    /// New rows become `create` with the snapshot merged under the changes,
    /// existing rows become `update` carrying only the changed fields.
    pub fn operations(&self) -> Vec<BulkOperation> {
        self.pending
            .iter()
            .map(|(key, change)| match key {
                RowKey::Temporary(_) => BulkOperation::Create {
                    data: deep_merge(&change.original.values, &change.changes),
                },
                RowKey::Persisted(id) => BulkOperation::Update {
                    id: *id,
                    data: change.changes.clone(),
                },
            })
            .collect()
    }
}

/// Recursive object merge, `overlay` wins on conflicts
pub fn deep_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let combined = match (merged.get(key), value) {
            (Some(Value::Object(old)), Value::Object(new)) => Value::Object(deep_merge(old, new)),
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}
