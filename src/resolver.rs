//! Collection resolution: pattern × records → page descriptors.
//!
//! Resolution is lazy and restartable: [`resolve`] queries the data
//! layer once and returns an iterator that builds descriptors on
//! demand, holding no state between runs. Per-record failures (missing
//! field, unusable value, empty slug) are yielded as [`RecordSkip`]s so
//! one bad record never aborts the rest of the batch.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::data::{DataError, DataQuery, Record};
use crate::pattern::{RoutePattern, Segment};
use crate::slug::{slugify, EmptySlugError};

/// Template-level resolution failure: nothing was produced.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("pattern `{0}` binds more than one record type")]
    MixedTypes(String),
}

/// Why a single record produced no page. Skips are aggregated into the
/// reconciliation report, never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("field `{0}` is missing")]
    MissingField(String),

    #[error("field `{0}` is not a sluggable value")]
    UnusableValue(String),

    #[error(transparent)]
    EmptySlug(#[from] EmptySlugError),
}

/// One skipped record, attributed to its template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSkip {
    pub template: PathBuf,
    pub record_id: String,
    pub reason: SkipReason,
}

/// Opaque context handed to the page-creation collaborator alongside
/// the output path. Rendering reads it; this engine only builds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageContext {
    pub record_id: String,
    /// The raw field value the binding matched, pre-slugification.
    pub value: Value,
}

/// The unit this engine produces: one concrete page that must exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageDescriptor {
    /// Output path, literal segments verbatim, bindings slugified.
    /// Unique across all live descriptors at any instant.
    pub path: String,
    /// Owning template, relative to the routes root.
    pub template: PathBuf,
    pub record_id: String,
    pub context: PageContext,
}

/// Enumerate the concrete pages a pattern produces against the current
/// records.
///
/// The returned iterator is finite and restartable; calling `resolve`
/// again starts a fresh enumeration with no carried-over state.
pub fn resolve<'a>(
    pattern: &'a RoutePattern,
    template: &'a Path,
    query: &dyn DataQuery,
) -> Result<impl Iterator<Item = Result<PageDescriptor, RecordSkip>> + 'a, ResolveError> {
    let (record_type, _) = pattern.binding();
    if !pattern.binds_single_type() {
        return Err(ResolveError::MixedTypes(pattern.to_string()));
    }

    let records = query.all_of_type(record_type)?;
    Ok(records
        .into_iter()
        .map(move |record| resolve_record(pattern, template, record)))
}

/// Build the descriptor for one record, or the reason it was skipped.
fn resolve_record(
    pattern: &RoutePattern,
    template: &Path,
    record: Record,
) -> Result<PageDescriptor, RecordSkip> {
    let skip = |reason: SkipReason| RecordSkip {
        template: template.to_path_buf(),
        record_id: record.id.clone(),
        reason,
    };

    let mut parts: Vec<String> = Vec::with_capacity(pattern.segments().len());
    let mut bound_value: Option<Value> = None;

    for segment in pattern.segments() {
        match segment {
            Segment::Literal(text) => parts.push(text.clone()),
            Segment::Binding { field_path, .. } => {
                let field = field_path.join(".");
                let value = record
                    .field(field_path)
                    .ok_or_else(|| skip(SkipReason::MissingField(field.clone())))?
                    .clone();
                let text = value_text(&value)
                    .ok_or_else(|| skip(SkipReason::UnusableValue(field)))?;
                let slug = slugify(&text).map_err(|e| skip(SkipReason::EmptySlug(e)))?;
                parts.push(slug);
                bound_value.get_or_insert(value);
            }
        }
    }

    Ok(PageDescriptor {
        path: parts.join("/"),
        template: template.to_path_buf(),
        record_id: record.id.clone(),
        context: PageContext {
            record_id: record.id,
            value: bound_value.unwrap_or(Value::Null),
        },
    })
}

/// Textual form of a bindable value. Objects, arrays and null have no
/// slug representation.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl RoutePattern {
    /// Whether every binding in this pattern names the same record
    /// type. Resolution expands one record per page, so bindings on two
    /// types in one pattern cannot be satisfied.
    fn binds_single_type(&self) -> bool {
        let mut first: Option<&str> = None;
        self.segments().iter().all(|segment| match segment {
            Segment::Binding { record_type, .. } => match first {
                None => {
                    first = Some(record_type.as_str());
                    true
                }
                Some(t) => t == record_type.as_str(),
            },
            Segment::Literal(_) => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::JsonStore;
    use serde_json::json;

    fn store_with(records: &[(&str, Value)]) -> JsonStore {
        let store = JsonStore::new();
        for (id, fields) in records {
            store.insert(Record {
                type_name: "Post".to_owned(),
                id: (*id).to_owned(),
                fields: fields.as_object().cloned().unwrap(),
            });
        }
        store
    }

    fn pattern(source: &str) -> RoutePattern {
        RoutePattern::parse(source).unwrap().unwrap()
    }

    fn collect(
        pattern: &RoutePattern,
        store: &JsonStore,
    ) -> (Vec<PageDescriptor>, Vec<RecordSkip>) {
        let mut pages = Vec::new();
        let mut skips = Vec::new();
        for item in resolve(pattern, Path::new("template"), store).unwrap() {
            match item {
                Ok(page) => pages.push(page),
                Err(skip) => skips.push(skip),
            }
        }
        (pages, skips)
    }

    #[test]
    fn test_resolve_two_records() {
        let store = store_with(&[
            ("1", json!({"slug": "my-first-post"})),
            ("2", json!({"slug": "another-post"})),
        ]);
        let pattern = pattern("blog/{Post.slug}");

        let (pages, skips) = collect(&pattern, &store);
        assert!(skips.is_empty());

        let paths: Vec<_> = pages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, ["blog/my-first-post", "blog/another-post"]);
        assert_eq!(pages[0].context.record_id, "1");
        assert_eq!(pages[1].context.record_id, "2");
    }

    #[test]
    fn test_resolve_slugifies_binding_only() {
        let store = store_with(&[("1", json!({"title": "Hello World!"}))]);
        let pattern = pattern("Docs/{Post.title}");

        let (pages, _) = collect(&pattern, &store);
        // Literal segment stays verbatim, binding is slugified
        assert_eq!(pages[0].path, "Docs/hello-world");
    }

    #[test]
    fn test_resolve_context_carries_raw_value() {
        let store = store_with(&[("1", json!({"slug": "Hello World"}))]);
        let pattern = pattern("{Post.slug}");

        let (pages, _) = collect(&pattern, &store);
        assert_eq!(pages[0].context.value, json!("Hello World"));
        assert_eq!(pages[0].path, "hello-world");
    }

    #[test]
    fn test_resolve_missing_field_skips_record_only() {
        let store = store_with(&[
            ("1", json!({"slug": "good"})),
            ("2", json!({"title": "no slug here"})),
        ]);
        let pattern = pattern("{Post.slug}");

        let (pages, skips) = collect(&pattern, &store);
        assert_eq!(pages.len(), 1);
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].record_id, "2");
        assert!(matches!(skips[0].reason, SkipReason::MissingField(_)));
    }

    #[test]
    fn test_resolve_empty_slug_skips() {
        let store = store_with(&[("1", json!({"slug": "???"}))]);
        let pattern = pattern("{Post.slug}");

        let (pages, skips) = collect(&pattern, &store);
        assert!(pages.is_empty());
        assert!(matches!(skips[0].reason, SkipReason::EmptySlug(_)));
    }

    #[test]
    fn test_resolve_object_value_is_unusable() {
        let store = store_with(&[("1", json!({"slug": {"nested": true}}))]);
        let pattern = pattern("{Post.slug}");

        let (_, skips) = collect(&pattern, &store);
        assert!(matches!(skips[0].reason, SkipReason::UnusableValue(_)));
    }

    #[test]
    fn test_resolve_numeric_value() {
        let store = store_with(&[("1", json!({"year": 2024}))]);
        let pattern = pattern("archive/{Post.year}");

        let (pages, _) = collect(&pattern, &store);
        assert_eq!(pages[0].path, "archive/2024");
    }

    #[test]
    fn test_resolve_nested_field() {
        let store = store_with(&[("1", json!({"meta": {"slug": "deep"}}))]);
        let pattern = pattern("{Post.meta.slug}");

        let (pages, _) = collect(&pattern, &store);
        assert_eq!(pages[0].path, "deep");
    }

    #[test]
    fn test_resolve_unknown_type_is_template_error() {
        let store = JsonStore::new();
        let pattern = pattern("{Ghost.slug}");
        assert!(matches!(
            resolve(&pattern, Path::new("t"), &store).err(),
            Some(ResolveError::Data(DataError::UnknownType(_)))
        ));
    }

    #[test]
    fn test_resolve_is_restartable() {
        let store = store_with(&[("1", json!({"slug": "a"}))]);
        let pattern = pattern("{Post.slug}");

        let (first, _) = collect(&pattern, &store);
        let (second, _) = collect(&pattern, &store);
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_mixed_types_rejected() {
        let store = store_with(&[("1", json!({"slug": "a"}))]);
        let pattern = pattern("{Post.slug}/{Author.name}");
        assert!(matches!(
            resolve(&pattern, Path::new("t"), &store).err(),
            Some(ResolveError::MixedTypes(_))
        ));
    }
}
