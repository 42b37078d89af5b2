//! Header-row table to row map conversion shared by every source.

use serde_json::Value;

use crate::models::ScheduleRow;

/// Turn a value grid into rows keyed by the header row.
///
/// Header cells are trimmed and lowercased; blank ones become `col_{index}`. Rows
/// whose cells are all blank are dropped. Short rows are padded with empty cells.
pub fn rows_from_grid(grid: &[Vec<Value>]) -> Vec<ScheduleRow> {
    let Some((header, body)) = grid.split_first() else {
        return Vec::new();
    };

    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let name = cell_text(cell).trim().to_lowercase();
            if name.is_empty() {
                format!("col_{index}")
            } else {
                name
            }
        })
        .collect();

    body.iter()
        .filter(|cells| cells.iter().any(|c| !cell_text(c).trim().is_empty()))
        .map(|cells| {
            columns
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let value = cells.get(index).map(cell_text).unwrap_or_default();
                    (column.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Cell value as text; numbers and booleans keep their JSON spelling
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid(value: Value) -> Vec<Vec<Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_header_normalisation_and_blank_rows() {
        let rows = rows_from_grid(&grid(json!([
            [" Equipment ", "", "HOUR"],
            ["cam-01", "x", 9],
            ["", " ", ""],
            ["cam-02"]
        ])));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("equipment"), Some("cam-01"));
        assert_eq!(rows[0].get("col_1"), Some("x"));
        assert_eq!(rows[0].get("hour"), Some("9"));
        assert_eq!(rows[1].get("hour"), Some(""));
    }

    #[test]
    fn test_empty_grid_yields_no_rows() {
        assert!(rows_from_grid(&[]).is_empty());
        assert!(rows_from_grid(&grid(json!([["equipment", "day"]]))).is_empty());
    }
}
