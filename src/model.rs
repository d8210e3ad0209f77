//! Data model for extraction results.
//!
//! The extraction service returns a JSON tree whose field names are
//! PascalCase (`Page`, `Bounds`, `Kids`, `Text`, …). [`Element`] names the
//! fields the pipeline reads or writes and keeps everything else (fonts,
//! paths, attributes, …) in [`Element::attributes`] so a normalized document
//! serialises back with no data lost.

use crate::error::DeckError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Absolute bounding box `[left, bottom, right, top]`, origin bottom-left.
pub type Bounds = [f64; 4];

/// Physical size of one selected page, in the service's coordinate units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    /// 0-based index into the page-limited PDF.
    pub page_index: usize,
    pub width: f64,
    pub height: f64,
}

/// A box expressed as fractions of the page, origin top-left.
///
/// Values are not clamped: source bounds outside the page box produce
/// values outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// One structural unit of an extraction result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "Page", default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    /// `None` when absent, `null` or `[]`.
    #[serde(
        rename = "Bounds",
        default,
        deserialize_with = "empty_bounds_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub bounds: Option<Bounds>,

    #[serde(rename = "CharBounds", default, skip_serializing_if = "Option::is_none")]
    pub char_bounds: Option<Vec<Bounds>>,

    #[serde(rename = "Kids", default, skip_serializing_if = "Option::is_none")]
    pub kids: Option<Vec<Element>>,

    #[serde(rename = "Text", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(
        rename = "PercentileBounds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub percentile_bounds: Option<PercentileBounds>,

    #[serde(
        rename = "PercentileCharBounds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub percentile_char_bounds: Option<Vec<PercentileBounds>>,

    /// Every other field of the element, passed through untouched.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

fn empty_bounds_as_none<'de, D>(deserializer: D) -> Result<Option<Bounds>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<Vec<f64>> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(values) if values.is_empty() => Ok(None),
        Some(values) => Bounds::try_from(values.as_slice())
            .map(Some)
            .map_err(|_| {
                serde::de::Error::invalid_length(values.len(), &"an empty array or 4 numbers")
            }),
    }
}

impl Element {
    /// Element with text only; handy for building documents by hand.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// The top-level extraction result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub elements: Vec<Element>,

    /// Top-level fields other than `elements` (version, pages, metadata).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            elements,
            extra: Map::new(),
        }
    }

    /// Parse a structured-data payload.
    ///
    /// A payload without a top-level `elements` array is a
    /// [`DeckError::Schema`] error rather than a generic JSON error, so
    /// callers can tell an incompatible result from a truncated one.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DeckError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| DeckError::Schema(format!("payload is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Build a document from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, DeckError> {
        match value.get("elements") {
            Some(Value::Array(_)) => {}
            Some(other) => {
                return Err(DeckError::Schema(format!(
                    "`elements` must be an array, found {}",
                    json_kind(other)
                )))
            }
            None => return Err(DeckError::Schema("missing top-level `elements` key".into())),
        }
        serde_json::from_value(value).map_err(|e| DeckError::Schema(e.to_string()))
    }

    /// Non-empty `Text` values in document order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.elements
            .iter()
            .filter_map(|e| e.text.as_deref())
            .filter(|t| !t.is_empty())
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn element_keeps_unknown_fields() {
        let raw = json!({
            "Page": 1,
            "Bounds": [1.0, 2.0, 3.0, 4.0],
            "Text": "Revenue",
            "Font": {"family_name": "Calibri", "weight": 700},
            "Path": "//Document/P"
        });
        let element: Element = serde_json::from_value(raw).unwrap();
        assert_eq!(element.page, Some(1));
        assert_eq!(element.bounds, Some([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(element.attributes["Path"], "//Document/P");

        let back = serde_json::to_value(&element).unwrap();
        assert_eq!(back["Font"]["family_name"], "Calibri");
        assert!(back.get("PercentileBounds").is_none());
    }

    #[test]
    fn empty_bounds_read_as_absent() {
        let element: Element =
            serde_json::from_value(json!({"Page": 1, "Bounds": [], "Text": "Team"})).unwrap();
        assert_eq!(element.bounds, None);

        let element: Element = serde_json::from_value(json!({"Bounds": null})).unwrap();
        assert_eq!(element.bounds, None);
    }

    #[test]
    fn partial_bounds_are_rejected() {
        let err = Document::from_value(json!({"elements": [{"Page": 1, "Bounds": [1.0, 2.0]}]}))
            .unwrap_err();
        assert!(matches!(err, DeckError::Schema(_)), "got: {err:?}");
    }

    #[test]
    fn null_text_reads_as_absent() {
        let element: Element = serde_json::from_value(json!({"Text": null})).unwrap();
        assert_eq!(element.text, None);
    }

    #[test]
    fn missing_elements_is_schema_error() {
        let err = Document::from_slice(br#"{"version": {"json_export": "1.0"}}"#).unwrap_err();
        assert!(matches!(err, DeckError::Schema(_)), "got: {err:?}");
    }

    #[test]
    fn non_array_elements_is_schema_error() {
        let err = Document::from_value(json!({"elements": {"Text": "x"}})).unwrap_err();
        assert!(err.to_string().contains("an object"), "got: {err}");
    }

    #[test]
    fn document_keeps_top_level_extras() {
        let doc = Document::from_value(json!({
            "version": {"page_segmentation": "1.0"},
            "elements": [{"Text": "Team"}, {"Text": ""}]
        }))
        .unwrap();
        assert_eq!(doc.elements.len(), 2);
        assert!(doc.extra.contains_key("version"));
        assert_eq!(doc.texts().collect::<Vec<_>>(), vec!["Team"]);
    }
}
