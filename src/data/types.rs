//! Record types shared across the data layer boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Data layer errors surfaced through [`super::DataQuery`].
#[derive(Debug, Error)]
pub enum DataError {
    #[error("unknown record type `{0}`")]
    UnknownType(String),

    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("record data parsing error")]
    Json(#[from] serde_json::Error),

    #[error("record of type `{type_name}` is missing an `id` field")]
    MissingId { type_name: String },
}

/// One externally owned data record.
///
/// This engine never mutates records; it reads one field per binding
/// and otherwise passes the record id through opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record type, e.g. `Post`. Case-sensitive.
    #[serde(rename = "type", default)]
    pub type_name: String,

    /// Unique id within the type.
    pub id: String,

    /// Field name → value. Nested objects are navigated with dotted
    /// field paths.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Record {
    /// Navigate a dotted field path through this record's fields.
    ///
    /// Returns `None` when any component is absent or a non-object is
    /// reached before the path ends.
    pub fn field(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut value = self.fields.get(first)?;
        for component in rest {
            value = value.as_object()?.get(component)?;
        }
        Some(value)
    }
}

/// A record change notification, used to trigger incremental
/// reconciliation.
#[derive(Debug, Clone)]
pub enum DataEvent {
    Added(Record),
    Updated(Record),
    Removed { type_name: String, id: String },
}

impl DataEvent {
    /// Record type this event concerns.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Added(record) | Self::Updated(record) => &record.type_name,
            Self::Removed { type_name, .. } => type_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: Value) -> Record {
        Record {
            type_name: "Post".to_owned(),
            id: "1".to_owned(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_field_top_level() {
        let rec = record(json!({"slug": "hello"}));
        assert_eq!(rec.field(&path(&["slug"])), Some(&json!("hello")));
    }

    #[test]
    fn test_field_nested() {
        let rec = record(json!({"frontmatter": {"slug": "hello"}}));
        assert_eq!(
            rec.field(&path(&["frontmatter", "slug"])),
            Some(&json!("hello"))
        );
    }

    #[test]
    fn test_field_missing() {
        let rec = record(json!({"slug": "hello"}));
        assert_eq!(rec.field(&path(&["title"])), None);
        assert_eq!(rec.field(&path(&["slug", "deeper"])), None);
        assert_eq!(rec.field(&[]), None);
    }

    #[test]
    fn test_record_deserializes_flattened_fields() {
        let rec: Record =
            serde_json::from_value(json!({"id": "7", "slug": "x", "title": "X"})).unwrap();
        assert_eq!(rec.id, "7");
        assert_eq!(rec.fields.get("slug"), Some(&json!("x")));
    }

    #[test]
    fn test_data_event_type_name() {
        let event = DataEvent::Removed {
            type_name: "Post".to_owned(),
            id: "1".to_owned(),
        };
        assert_eq!(event.type_name(), "Post");
    }
}
