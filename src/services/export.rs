//! CSV rendering for list/grid exports and reports.

use serde_json::Value;

use super::Entity;

fn needs_quotes(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
}

fn push_field(out: &mut String, field: &str) {
    if needs_quotes(field) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (index, field) in fields.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

/// Text form of one JSON cell. Nulls become empty cells.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders entities with the given header order; missing keys are empty.
pub fn entities_to_csv(columns: &[&str], entities: &[Entity]) -> Vec<u8> {
    let mut out = String::new();
    push_record(&mut out, columns.iter().copied());

    for entity in entities {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| entity.get(*column).map(cell_text).unwrap_or_default())
            .collect();
        push_record(&mut out, cells.iter().map(String::as_str));
    }

    out.into_bytes()
}

pub fn csv_filename(stem: &str) -> String {
    format!("{}.csv", stem.replace(['/', ' '], "-"))
}
