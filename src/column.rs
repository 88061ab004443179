//! Grid column mapping.
//!
//! Turns the list schema into the column definitions the grid widget is
//! configured with: which editor a cell opens, how its value is rendered,
//! and how the column filters. The mapping is a pure function of the field.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::field::{FieldDefinition, FieldType};

/// Style class applied to the header of required columns
pub const REQUIRED_CLASS: &str = "required-field";

/// Display format for date/time cells
pub const DATETIME_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Editor {
    Text,
    Number,
    DateTime,
    /// Enumerated values only, no free text
    Select { options: Vec<String> },
    Checkbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    Plain,
    DateTime,
    Checkbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    Text,
    Numeric,
}

/// Column configuration for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub field: String,
    pub header: String,
    pub editor: Editor,
    pub renderer: Renderer,
    pub filter: Filter,
    pub required: bool,
    pub css_class: Option<&'static str>,
}

impl ColumnSpec {
    /// Text shown in a cell of this column for `value`
    pub fn display(&self, value: &Value) -> String {
        match self.renderer {
            Renderer::DateTime => format_datetime(value),
            Renderer::Checkbox => {
                if is_truthy(value) {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            Renderer::Plain => plain_text(value),
        }
    }
}

/// Map one field to its column definition
///
/// # Examples
/// ```
/// use listsheet::{FieldDefinition, FieldType};
/// use listsheet::column::{column_for, Editor};
///
/// let status = FieldDefinition::new("Status", "Status", FieldType::Choice)
///     .required()
///     .with_choices(["Open", "Closed"]);
/// let column = column_for(&status);
/// assert_eq!(column.header, "Status *");
/// assert_eq!(column.editor, Editor::Select { options: vec!["Open".into(), "Closed".into()] });
/// ```
pub fn column_for(field: &FieldDefinition) -> ColumnSpec {
    let (editor, renderer, filter) = match &field.field_type {
        FieldType::DateTime => (Editor::DateTime, Renderer::DateTime, Filter::Text),
        FieldType::Number => (Editor::Number, Renderer::Plain, Filter::Numeric),
        FieldType::Choice => (
            Editor::Select {
                options: field.choices.clone(),
            },
            Renderer::Plain,
            Filter::Text,
        ),
        FieldType::Boolean => (Editor::Checkbox, Renderer::Checkbox, Filter::Text),
        FieldType::Text | FieldType::Other(_) => (Editor::Text, Renderer::Plain, Filter::Text),
    };

    let header = if field.required {
        format!("{} *", field.title)
    } else {
        field.title.clone()
    };

    ColumnSpec {
        field: field.name.clone(),
        header,
        editor,
        renderer,
        filter,
        required: field.required,
        css_class: field.required.then_some(REQUIRED_CLASS),
    }
}

pub fn columns_for(fields: &[FieldDefinition]) -> Vec<ColumnSpec> {
    fields.iter().map(column_for).collect()
}

/// Parse a stored date/time value.
///
/// Accepts RFC 3339 plus the plain layouts list backends commonly return.
/// Values without an offset are taken as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Render a date/time value in local time; empty for absent values
pub fn format_datetime(value: &Value) -> String {
    format_datetime_in(value, &Local)
}

/// Render a date/time value in the given time zone
pub fn format_datetime_in<Tz>(value: &Value, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match value {
        Value::Null => String::new(),
        Value::String(s) if s.is_empty() => String::new(),
        Value::String(s) => match parse_datetime(s) {
            Some(dt) => dt
                .with_timezone(tz)
                .format(DATETIME_DISPLAY_FORMAT)
                .to_string(),
            None => s.clone(),
        },
        other => plain_text(other),
    }
}

/// Checkbox semantics for loosely typed values
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

pub(crate) fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
