//! Page sink: where resolved pages go.
//!
//! The engine decides *which* pages exist; the sink collaborator owns
//! rendering and serving. [`ManifestSink`] is the built-in sink, which
//! keeps a `pages.json` manifest of the live page set in the output
//! directory (one entry per page, sorted by path for stable diffs).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::resolver::{PageContext, PageDescriptor};

/// The page-creation collaborator consumed by the reconciler.
pub trait PageSink: Send + Sync {
    fn create_page(&self, page: &PageDescriptor) -> Result<()>;
    fn delete_page(&self, path: &str) -> Result<()>;
}

impl<S: PageSink> PageSink for std::sync::Arc<S> {
    fn create_page(&self, page: &PageDescriptor) -> Result<()> {
        (**self).create_page(page)
    }

    fn delete_page(&self, path: &str) -> Result<()> {
        (**self).delete_page(path)
    }
}

/// One manifest entry, serialized into `pages.json`.
#[derive(Debug, Clone, Serialize)]
struct ManifestEntry {
    template: PathBuf,
    context: PageContext,
}

/// Sink that materializes the page set as `<output>/pages.json`.
pub struct ManifestSink {
    output: PathBuf,
    pages: RwLock<BTreeMap<String, ManifestEntry>>,
}

impl ManifestSink {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            pages: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of live pages in the manifest.
    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }

    fn write_manifest(&self) -> Result<()> {
        let manifest = self.output.join("pages.json");
        fs::create_dir_all(&self.output)
            .with_context(|| format!("Failed to create {}", self.output.display()))?;

        let pages = self.pages.read();
        let json = serde_json::to_string_pretty(&*pages)?;
        fs::write(&manifest, json)
            .with_context(|| format!("Failed to write {}", manifest.display()))
    }
}

impl PageSink for ManifestSink {
    fn create_page(&self, page: &PageDescriptor) -> Result<()> {
        self.pages.write().insert(
            page.path.clone(),
            ManifestEntry {
                template: page.template.clone(),
                context: page.context.clone(),
            },
        );
        self.write_manifest()
    }

    fn delete_page(&self, path: &str) -> Result<()> {
        self.pages.write().remove(path);
        self.write_manifest()
    }
}

/// What a sink was asked to do, in order. Test double.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOp {
    Created(String),
    Deleted(String),
}

/// Sink that records its calls; used by reconciler and engine tests.
#[derive(Default)]
pub struct RecordingSink {
    ops: Mutex<Vec<SinkOp>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<SinkOp> {
        self.ops.lock().clone()
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
    }
}

impl PageSink for RecordingSink {
    fn create_page(&self, page: &PageDescriptor) -> Result<()> {
        self.ops.lock().push(SinkOp::Created(page.path.clone()));
        Ok(())
    }

    fn delete_page(&self, path: &str) -> Result<()> {
        self.ops.lock().push(SinkOp::Deleted(path.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(path: &str, id: &str) -> PageDescriptor {
        PageDescriptor {
            path: path.to_owned(),
            template: Path::new("blog/{Post.slug}").to_path_buf(),
            record_id: id.to_owned(),
            context: PageContext {
                record_id: id.to_owned(),
                value: json!("raw"),
            },
        }
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ManifestSink::new(dir.path());

        sink.create_page(&page("blog/b", "2")).unwrap();
        sink.create_page(&page("blog/a", "1")).unwrap();

        let raw = fs::read_to_string(dir.path().join("pages.json")).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let keys: Vec<_> = manifest.as_object().unwrap().keys().cloned().collect();
        // Sorted by path
        assert_eq!(keys, ["blog/a", "blog/b"]);
        assert_eq!(manifest["blog/a"]["context"]["record_id"], json!("1"));
    }

    #[test]
    fn test_manifest_delete() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ManifestSink::new(dir.path());

        sink.create_page(&page("blog/a", "1")).unwrap();
        sink.delete_page("blog/a").unwrap();
        assert_eq!(sink.page_count(), 0);

        let raw = fs::read_to_string(dir.path().join("pages.json")).unwrap();
        assert_eq!(raw.trim(), "{}");
    }

    #[test]
    fn test_recording_sink_orders_ops() {
        let sink = RecordingSink::new();
        sink.create_page(&page("a", "1")).unwrap();
        sink.delete_page("a").unwrap();
        assert_eq!(
            sink.ops(),
            [SinkOp::Created("a".into()), SinkOp::Deleted("a".into())]
        );
    }
}
