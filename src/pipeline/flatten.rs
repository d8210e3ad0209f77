//! Table flattening: one row per element, nested objects as dotted columns.
//!
//! `{"Font": {"family_name": "Inter"}}` becomes the column `Font.family_name`.
//! Arrays (`Kids`, `CharBounds`, `Bounds`) are kept as JSON values in a single
//! column. Rows whose `Text` is missing, not a string, or shorter than
//! [`MIN_TEXT_CHARS`] characters are dropped.

use crate::error::DeckError;
use crate::model::{json_kind, Document};
use serde::Serialize;
use serde_json::{Map, Value};

/// Shortest `Text` (in characters) a row must carry to be kept.
pub const MIN_TEXT_CHARS: usize = 3;

/// Flat, row-per-element view of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    /// Column names in first-seen order.
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The `Text` cell of every row, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(|r| r.get("Text").and_then(Value::as_str))
    }

    /// All `Text` cells joined with single spaces.
    pub fn joined_text(&self) -> String {
        self.texts().collect::<Vec<_>>().join(" ")
    }

    /// Cells of `column`, `None` where a row lacks it.
    pub fn column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = Option<&'a Value>> + 'a {
        self.rows.iter().map(move |r| r.get(column))
    }
}

/// Flatten a normalized document.
pub fn flatten(document: &Document) -> Result<Table, DeckError> {
    let value = serde_json::to_value(document)
        .map_err(|e| DeckError::Internal(format!("serialise document: {e}")))?;
    flatten_value(&value)
}

/// Flatten a raw structured-data value.
///
/// Fails with [`DeckError::Schema`] when `elements` is missing or not an
/// array, or when a non-empty element list has no `Text` field anywhere.
pub fn flatten_value(value: &Value) -> Result<Table, DeckError> {
    let elements = match value.get("elements") {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(DeckError::Schema(format!(
                "`elements` must be an array, found {}",
                json_kind(other)
            )))
        }
        None => return Err(DeckError::Schema("missing top-level `elements` key".into())),
    };

    if !elements.is_empty() && !elements.iter().any(|e| e.get("Text").is_some()) {
        return Err(DeckError::Schema(
            "no element carries a `Text` field".into(),
        ));
    }

    let mut table = Table::default();
    for (i, element) in elements.iter().enumerate() {
        let Value::Object(obj) = element else {
            return Err(DeckError::Schema(format!(
                "element {i} is {}, expected an object",
                json_kind(element)
            )));
        };
        if !is_substantive(obj.get("Text")) {
            continue;
        }

        let mut row = Map::new();
        flatten_into("", obj, &mut row);
        for key in row.keys() {
            if !table.columns.iter().any(|c| c == key) {
                table.columns.push(key.clone());
            }
        }
        table.rows.push(row);
    }
    Ok(table)
}

fn is_substantive(text: Option<&Value>) -> bool {
    matches!(text, Some(Value::String(s)) if s.chars().count() >= MIN_TEXT_CHARS)
}

fn flatten_into(prefix: &str, obj: &Map<String, Value>, row: &mut Map<String, Value>) {
    for (key, value) in obj {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(&name, inner, row),
            other => {
                row.insert(name, other.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_and_missing_text_is_dropped() {
        let table = flatten_value(&json!({
            "elements": [
                {"Text": "Foooobarrrrrrr", "Page": 1},
                {"Text": "ab", "Page": 1},
                {"Path": "//Document/Figure", "Page": 1},
                {"Text": null},
                {"Text": "abc"}
            ]
        }))
        .unwrap();

        assert_eq!(table.texts().collect::<Vec<_>>(), vec!["Foooobarrrrrrr", "abc"]);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let table = flatten_value(&json!({"elements": [{"Text": "€€"}, {"Text": "€€€"}]})).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn nested_objects_become_dotted_columns() {
        let table = flatten_value(&json!({
            "elements": [{
                "Text": "Traction",
                "Font": {"family_name": "Inter", "weight": 700},
                "PercentileBounds": {"left": 0.1, "top": 0.2, "right": 0.3, "bottom": 0.4},
                "Kids": [{"Text": "child"}],
                "CharBounds": [[1, 2, 3, 4]]
            }]
        }))
        .unwrap();

        let row = &table.rows[0];
        assert_eq!(row["Font.family_name"], "Inter");
        assert_eq!(row["Font.weight"], 700);
        assert_eq!(row["PercentileBounds.left"], 0.1);
        assert!(row["Kids"].is_array());
        assert!(row["CharBounds"].is_array());
        assert!(table.columns.iter().any(|c| c == "PercentileBounds.bottom"));
    }

    #[test]
    fn missing_elements_is_a_schema_error() {
        let err = flatten_value(&json!({"pages": []})).unwrap_err();
        assert!(matches!(err, DeckError::Schema(_)));

        let err = flatten_value(&json!({"elements": {"Text": "x"}})).unwrap_err();
        assert!(matches!(err, DeckError::Schema(_)));
    }

    #[test]
    fn no_text_field_anywhere_is_a_schema_error() {
        let err = flatten_value(&json!({"elements": [{"Path": "//Figure"}]})).unwrap_err();
        assert!(matches!(err, DeckError::Schema(_)));
    }

    #[test]
    fn empty_element_list_gives_empty_table() {
        let table = flatten_value(&json!({"elements": []})).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.joined_text(), "");
    }

    #[test]
    fn joined_text_uses_single_spaces() {
        let doc = Document::from_slice(
            br#"{"elements":[{"Text":"Acme Robotics"},{"Text":"Series A"},{"Text":"$5M"}]}"#,
        )
        .unwrap();
        let table = flatten(&doc).unwrap();
        assert_eq!(table.joined_text(), "Acme Robotics Series A $5M");
        assert_eq!(table.column("Text").filter(Option::is_some).count(), 3);
    }
}
