//! Event types and serialization.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single event dimension value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
}

impl FieldValue {
    /// Borrow the text value, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a JSON scalar. Null and compound values have no field value.
    pub fn from_json(value: &Value) -> Option<FieldValue> {
        match value {
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
            Value::Number(n) => n
                .as_i64()
                .map(FieldValue::Integer)
                .or_else(|| n.as_f64().map(FieldValue::Number)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// An event record: field names mapped to scalar values, in insertion order.
///
/// Writing an existing field replaces its value in place. Writing an absent
/// value removes the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    fields: Vec<(String, FieldValue)>,
}

/// Caller-supplied fields applied on top of an enriched event.
pub type Dimensions = Event;

impl Event {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.set(key, Some(value.into()));
    }

    /// Set or clear a field.
    pub fn set(&mut self, key: impl Into<String>, value: Option<FieldValue>) {
        let key = key.into();
        let position = self.fields.iter().position(|(k, _)| *k == key);
        match (position, value) {
            (Some(i), Some(v)) => self.fields[i].1 = v,
            (Some(i), None) => {
                self.fields.remove(i);
            }
            (None, Some(v)) => self.fields.push((key, v)),
            (None, None) => {}
        }
    }

    /// Apply every field of `other` on top of this record.
    pub fn extend(&mut self, other: &Event) {
        for (key, value) in &other.fields {
            self.set(key.clone(), Some(value.clone()));
        }
    }

    /// Get a field.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a text field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    /// Whether the field is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a record from a JSON object, skipping null and non-scalar members.
    pub fn from_json(value: &Value) -> Result<Event, crate::Error> {
        match value {
            Value::Null => Ok(Event::new()),
            Value::Object(map) => Ok(Event {
                fields: map
                    .iter()
                    .filter_map(|(k, v)| FieldValue::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            }),
            other => Err(crate::Error::InvalidCommand(format!(
                "expected an object of dimensions, got {}",
                other
            ))),
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// An uncaught script error reported by the page.
///
/// Deserializes from the shape of a DOM `ErrorEvent`:
/// `{ "message", "filename", "lineno", "colno", "error": { "name", "message" } }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorEvent {
    pub message: Option<String>,
    pub filename: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub lineno: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub colno: Option<i64>,
    pub error: Option<ErrorDetail>,
}

/// The thrown value attached to an [`ErrorEvent`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorDetail {
    pub name: Option<String>,
    pub message: Option<String>,
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))),
        Some(other) => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

impl ErrorEvent {
    /// Create an error event from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach the thrown error's name and message.
    pub fn with_error(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetail {
            name: Some(name.into()),
            message: Some(message.into()),
        });
        self
    }

    /// Attach the source location.
    pub fn at(mut self, filename: impl Into<String>, lineno: i64, colno: i64) -> Self {
        self.filename = Some(filename.into());
        self.lineno = Some(lineno);
        self.colno = Some(colno);
        self
    }

    /// Dimensions describing this error, before caller overrides.
    pub(crate) fn dimensions(&self) -> Dimensions {
        let detail = self.error.as_ref();
        let error_type = detail
            .and_then(|e| e.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Error".into());
        let message = detail
            .and_then(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .or_else(|| self.message.clone());

        let mut dims = Dimensions::new().with("error_type", error_type);
        dims.set("message", message.map(FieldValue::Text));
        dims.set("lineno", self.lineno.map(FieldValue::Integer));
        dims.set("colno", self.colno.map(FieldValue::Integer));
        dims.set("filename", self.filename.clone().map(FieldValue::Text));
        dims
    }
}
