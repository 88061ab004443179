use serde::Serialize;
use serde_json::{Map, Value};

use crate::column::{Editor, column_for, parse_datetime};
use crate::field::{FieldDefinition, FieldType};
use crate::row::{Row, is_blank};

/// One input of the add/edit row form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormInput {
    pub name: String,
    pub label: String,
    /// Same editor the grid uses for the field
    pub editor: Editor,
    pub required: bool,
    pub value: Value,
}

/// Build the row form, one input per field, pre-filled from `existing`.
pub fn build_form(fields: &[FieldDefinition], existing: Option<&Row>) -> Vec<FormInput> {
    fields
        .iter()
        .map(|field| {
            let column = column_for(field);
            FormInput {
                name: field.name.clone(),
                label: column.header,
                editor: column.editor,
                required: field.required,
                value: existing.map(|row| row.value(&field.name)).unwrap_or(Value::Null),
            }
        })
        .collect()
}

/// Presence check for required fields.
///
/// Produces `"<title> is required"` for every required field whose value is
/// missing, `null` or the empty string. Types are not checked here.
///
/// # Examples
/// ```
/// use listsheet::{FieldDefinition, FieldType};
/// use listsheet::form::validate;
/// use serde_json::{json, Map};
///
/// let fields = vec![FieldDefinition::new("Title", "Title", FieldType::Text).required()];
/// let mut data = Map::new();
/// data.insert("Title".into(), json!(""));
/// assert_eq!(validate(&fields, &data), vec!["Title is required".to_string()]);
/// ```
pub fn validate(fields: &[FieldDefinition], data: &Map<String, Value>) -> Vec<String> {
    fields
        .iter()
        .filter(|field| field.required && is_blank(data.get(&field.name)))
        .map(|field| format!("{} is required", field.title))
        .collect()
}

/// Server-side validation: required keys must be present and supplied
/// values must fit their field type.
pub fn check_types(fields: &[FieldDefinition], data: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();

    for field in fields {
        let Some(value) = data.get(&field.name) else {
            if field.required {
                errors.push(format!("{} is required", field.title));
            }
            continue;
        };

        match &field.field_type {
            FieldType::DateTime => {
                if let Value::String(s) = value {
                    if !s.is_empty() && parse_datetime(s).is_none() {
                        errors.push(format!("{} has invalid date format", field.title));
                    }
                }
            }
            FieldType::Number => {
                let numeric = match value {
                    Value::Null | Value::Number(_) => true,
                    Value::String(s) => s.trim().parse::<f64>().is_ok(),
                    _ => false,
                };
                if !numeric {
                    errors.push(format!("{} must be a number", field.title));
                }
            }
            FieldType::Choice => {
                if let Value::String(s) = value {
                    if !s.is_empty() && !field.choices.iter().any(|c| c == s) {
                        errors.push(format!("{} has invalid choice: {}", field.title, s));
                    }
                }
            }
            FieldType::Text | FieldType::Boolean | FieldType::Other(_) => {}
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("Title", "Title", FieldType::Text).required(),
            FieldDefinition::new("Owner", "Assigned To", FieldType::Text).required(),
            FieldDefinition::new("Status", "Status", FieldType::Choice)
                .with_choices(["Open", "Closed"]),
            FieldDefinition::new("Cost", "Cost", FieldType::Number),
            FieldDefinition::new("Due", "Due Date", FieldType::DateTime),
        ]
    }

    #[test]
    fn empty_submission_reports_each_required_field_once() {
        let errors = validate(&schema(), &Map::new());
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("Title"));
        assert!(errors[1].contains("Assigned To"));
    }

    #[test]
    fn presence_is_the_only_rule() {
        let data = json!({"Title": "x", "Owner": 0, "Cost": "not a number"});
        assert!(validate(&schema(), data.as_object().unwrap()).is_empty());
    }

    #[test]
    fn form_is_prefilled_from_the_row() {
        let row: Row = serde_json::from_value(json!({"ID": 3, "Title": "Fix", "Status": "Open"})).unwrap();
        let form = build_form(&schema(), Some(&row));

        assert_eq!(form.len(), 5);
        assert_eq!(form[0].label, "Title *");
        assert_eq!(form[0].value, json!("Fix"));
        assert_eq!(form[1].value, Value::Null);
        assert_eq!(
            form[2].editor,
            Editor::Select {
                options: vec!["Open".into(), "Closed".into()]
            }
        );
        assert!(build_form(&schema(), None).iter().all(|i| i.value.is_null()));
    }

    #[test]
    fn type_checks() {
        let data = json!({
            "Title": "x",
            "Status": "Pending",
            "Cost": "12a",
            "Due": "tomorrow"
        });
        let errors = check_types(&schema(), data.as_object().unwrap());
        assert_eq!(
            errors,
            vec![
                "Assigned To is required",
                "Status has invalid choice: Pending",
                "Cost must be a number",
                "Due Date has invalid date format",
            ]
        );
    }
}
