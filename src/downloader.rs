use chrono::{DateTime, Local};
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use serde_json::Value;

use crate::client::ExportFormat;
use crate::column::plain_text;
use crate::field::FieldDefinition;
use crate::row::{ID_FIELD, Row};

/// Column keys of an export: `ID` followed by every field name
fn export_columns(fields: &[FieldDefinition]) -> Vec<&str> {
    std::iter::once(ID_FIELD)
        .chain(fields.iter().map(|f| f.name.as_str()))
        .collect()
}

fn export_value(row: &Row, column: &str) -> Value {
    if column == ID_FIELD {
        return row.id.map(Value::from).unwrap_or(Value::Null);
    }
    row.value(column)
}

/// Convert list rows to CSV format
///
/// The header row holds the column keys. Values containing commas, quotes or
/// newlines are quoted, with embedded quotes doubled.
///
/// # Examples
/// ```
/// use listsheet::{FieldDefinition, FieldType, Row};
/// use listsheet::downloader::to_csv;
/// use serde_json::json;
///
/// let fields = vec![FieldDefinition::new("Title", "Title", FieldType::Text)];
/// let rows = vec![Row::with_id(1, json!({"Title": "a, b"}).as_object().unwrap().clone())];
/// assert_eq!(to_csv(&fields, &rows), "ID,Title\n1,\"a, b\"\n");
/// ```
pub fn to_csv(fields: &[FieldDefinition], rows: &[Row]) -> String {
    let columns = export_columns(fields);
    let mut csv_content = String::new();

    push_csv_line(&mut csv_content, columns.iter().map(|c| c.to_string()));
    for row in rows {
        push_csv_line(
            &mut csv_content,
            columns.iter().map(|c| plain_text(&export_value(row, c))),
        );
    }

    csv_content
}

fn push_csv_line(out: &mut String, values: impl Iterator<Item = String>) {
    for (i, value) in values.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if value.contains(',') || value.contains('"') || value.contains('\n') {
            out.push('"');
            out.push_str(&value.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&value);
        }
    }
    out.push('\n');
}

/// Convert list rows to XLSX format using rust_xlsxwriter
///
/// Numbers and booleans keep their cell types, everything else is written
/// as text. Empty values leave the cell blank.
pub fn to_xlsx(fields: &[FieldDefinition], rows: &[Row]) -> Result<Vec<u8>, XlsxError> {
    let columns = export_columns(fields);
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();

    for (c, name) in columns.iter().enumerate() {
        worksheet.write_string(0, c as u16, *name)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let xl_row = (r + 1) as u32;
        for (c, column) in columns.iter().enumerate() {
            let xl_col = c as u16;
            match export_value(row, column) {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet.write_boolean(xl_row, xl_col, b)?;
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) => {
                        worksheet.write_number(xl_row, xl_col, f)?;
                    }
                    None => {
                        worksheet.write_string(xl_row, xl_col, &n.to_string())?;
                    }
                },
                other => {
                    worksheet.write_string(xl_row, xl_col, &plain_text(&other))?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer()
}

/// Download name of an export, e.g. `Tasks_data_20240102_030405.csv`
pub fn export_filename(list_name: &str, format: ExportFormat, now: DateTime<Local>) -> String {
    let prefix: String = list_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "{}_data_{}.{}",
        prefix,
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

pub fn content_type(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ExportFormat::Csv => "text/csv",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use chrono::TimeZone;
    use serde_json::json;

    fn rows() -> Vec<Row> {
        vec![
            serde_json::from_value(json!({"ID": 1, "Title": "say \"hi\"", "Cost": 2.5})).unwrap(),
            serde_json::from_value(json!({"ID": 2, "Title": "plain", "Done": true})).unwrap(),
        ]
    }

    fn fields() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("Title", "Title", FieldType::Text),
            FieldDefinition::new("Cost", "Cost", FieldType::Number),
            FieldDefinition::new("Done", "Done", FieldType::Boolean),
        ]
    }

    #[test]
    fn csv_escapes_and_leaves_gaps() {
        assert_eq!(
            to_csv(&fields(), &rows()),
            "ID,Title,Cost,Done\n1,\"say \"\"hi\"\"\",2.5,\n2,plain,,true\n"
        );
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = to_xlsx(&fields(), &rows()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn filename_carries_list_and_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            export_filename("My Tasks", ExportFormat::Excel, now),
            "My_Tasks_data_20240102_030405.xlsx"
        );
    }
}
