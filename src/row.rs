use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name under which the backend returns the system identifier
pub const ID_FIELD: &str = "ID";

/// One list row: field values plus the backend identifier, if assigned.
///
/// Serialized as a flat JSON object with the identifier under `ID`, the same
/// shape the data endpoint returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl Row {
    pub fn new(values: Map<String, Value>) -> Self {
        Row { id: None, values }
    }

    pub fn with_id(id: i64, values: Map<String, Value>) -> Self {
        Row {
            id: Some(id),
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Value of a field, `Null` when the row has no entry for it
    pub fn value(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }
}

/// True when a submitted value counts as "not provided"
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}
