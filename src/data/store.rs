//! JSON-file-backed record store.
//!
//! The built-in [`DataQuery`] implementation: a thread-safe in-memory
//! map of record type → records, loaded from a single JSON file shaped
//! like `{"Post": [{"id": "1", "slug": "hello"}, ...]}`.
//!
//! Reloading re-reads the file and emits the minimal [`DataEvent`]
//! stream (added / updated / removed, diffed by record id) to every
//! subscriber, so a file edit triggers exactly the reconciliation it
//! warrants.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::types::{DataError, DataEvent, Record};
use super::DataQuery;

/// Thread-safe record store.
///
/// # Thread safety
///
/// Records sit behind an `RwLock`: queries take the read lock, reload
/// takes the write lock. Subscriber senders are behind their own mutex
/// so notification never holds the record lock.
#[derive(Default)]
pub struct JsonStore {
    path: Option<PathBuf>,
    records: RwLock<FxHashMap<String, Vec<Record>>>,
    subscribers: Mutex<Vec<Sender<DataEvent>>>,
}

impl JsonStore {
    /// Empty in-memory store, for tests and embedding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON records file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref().to_path_buf();
        let records = read_records(&path)?;
        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Insert or replace a record, notifying subscribers.
    ///
    /// Mostly a test and embedding convenience; file-backed stores
    /// change through [`reload`](Self::reload).
    pub fn insert(&self, record: Record) {
        let event = {
            let mut records = self.records.write();
            let bucket = records.entry(record.type_name.clone()).or_default();
            match bucket.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => {
                    *existing = record.clone();
                    DataEvent::Updated(record)
                }
                None => {
                    bucket.push(record.clone());
                    DataEvent::Added(record)
                }
            }
        };
        self.notify(event);
    }

    /// Remove a record by type and id, notifying subscribers.
    pub fn remove(&self, type_name: &str, id: &str) {
        let removed = {
            let mut records = self.records.write();
            records
                .get_mut(type_name)
                .is_some_and(|bucket| {
                    let before = bucket.len();
                    bucket.retain(|r| r.id != id);
                    bucket.len() != before
                })
        };
        if removed {
            self.notify(DataEvent::Removed {
                type_name: type_name.to_owned(),
                id: id.to_owned(),
            });
        }
    }

    /// Re-read the backing file and emit the add/update/remove diff.
    ///
    /// Returns the number of events emitted. In-memory stores have no
    /// backing file and reload as a no-op.
    pub fn reload(&self) -> Result<usize, DataError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        let fresh = read_records(path)?;

        let events = {
            let mut records = self.records.write();
            let events = diff_records(&records, &fresh);
            *records = fresh;
            events
        };

        let count = events.len();
        for event in events {
            self.notify(event);
        }
        Ok(count)
    }

    fn notify(&self, event: DataEvent) {
        // Drop subscribers whose receiving end has hung up
        self.subscribers
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

impl DataQuery for JsonStore {
    fn all_of_type(&self, type_name: &str) -> Result<Vec<Record>, DataError> {
        self.records
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| DataError::UnknownType(type_name.to_owned()))
    }

    fn subscribe(&self, sender: Sender<DataEvent>) {
        self.subscribers.lock().push(sender);
    }
}

/// Parse the records file: a JSON object of type name → record array.
fn read_records(path: &Path) -> Result<FxHashMap<String, Vec<Record>>, DataError> {
    let raw = fs::read_to_string(path).map_err(|e| DataError::Io(path.to_path_buf(), e))?;
    let by_type: FxHashMap<String, Vec<Value>> = serde_json::from_str(&raw)?;

    let mut records = FxHashMap::default();
    for (type_name, values) in by_type {
        let mut bucket = Vec::with_capacity(values.len());
        for value in values {
            let mut record: Record = serde_json::from_value(value)?;
            record.type_name = type_name.clone();
            if record.id.is_empty() {
                return Err(DataError::MissingId {
                    type_name: type_name.clone(),
                });
            }
            bucket.push(record);
        }
        records.insert(type_name, bucket);
    }
    Ok(records)
}

/// Minimal event stream turning `old` into `new`, diffed by record id.
fn diff_records(
    old: &FxHashMap<String, Vec<Record>>,
    new: &FxHashMap<String, Vec<Record>>,
) -> Vec<DataEvent> {
    let mut events = Vec::new();

    for (type_name, fresh) in new {
        let stale = old.get(type_name).map(Vec::as_slice).unwrap_or(&[]);
        for record in fresh {
            match stale.iter().find(|r| r.id == record.id) {
                None => events.push(DataEvent::Added(record.clone())),
                Some(previous) if previous != record => {
                    events.push(DataEvent::Updated(record.clone()));
                }
                Some(_) => {}
            }
        }
    }

    for (type_name, stale) in old {
        let fresh = new.get(type_name).map(Vec::as_slice).unwrap_or(&[]);
        for record in stale {
            if !fresh.iter().any(|r| r.id == record.id) {
                events.push(DataEvent::Removed {
                    type_name: type_name.clone(),
                    id: record.id.clone(),
                });
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::sync::mpsc;

    fn post(id: &str, slug: &str) -> Record {
        Record {
            type_name: "Post".to_owned(),
            id: id.to_owned(),
            fields: json!({"slug": slug}).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_all_of_type_known() {
        let store = JsonStore::new();
        store.insert(post("1", "hello"));
        store.insert(post("2", "world"));

        let records = store.all_of_type("Post").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_all_of_type_unknown_is_error() {
        let store = JsonStore::new();
        assert!(matches!(
            store.all_of_type("Ghost"),
            Err(DataError::UnknownType(ref t)) if t == "Ghost"
        ));
    }

    #[test]
    fn test_insert_notifies_added_then_updated() {
        let store = JsonStore::new();
        let (tx, rx) = mpsc::channel();
        store.subscribe(tx);

        store.insert(post("1", "hello"));
        store.insert(post("1", "renamed"));

        assert!(matches!(rx.try_recv().unwrap(), DataEvent::Added(_)));
        assert!(matches!(rx.try_recv().unwrap(), DataEvent::Updated(_)));
    }

    #[test]
    fn test_remove_notifies() {
        let store = JsonStore::new();
        store.insert(post("1", "hello"));

        let (tx, rx) = mpsc::channel();
        store.subscribe(tx);
        store.remove("Post", "1");

        assert!(matches!(
            rx.try_recv().unwrap(),
            DataEvent::Removed { ref id, .. } if id == "1"
        ));
        assert!(store.all_of_type("Post").unwrap().is_empty());
    }

    #[test]
    fn test_remove_absent_is_silent() {
        let store = JsonStore::new();
        let (tx, rx) = mpsc::channel();
        store.subscribe(tx);

        store.remove("Post", "nope");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Post": [{{"id": "1", "slug": "my-first-post"}}]}}"#
        )
        .unwrap();

        let store = JsonStore::load(file.path()).unwrap();
        let records = store.all_of_type("Post").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].type_name, "Post");
        assert_eq!(records[0].fields["slug"], json!("my-first-post"));
    }

    #[test]
    fn test_load_rejects_missing_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Post": [{{"id": "", "slug": "x"}}]}}"#).unwrap();
        assert!(matches!(
            JsonStore::load(file.path()),
            Err(DataError::MissingId { .. })
        ));
    }

    #[test]
    fn test_reload_emits_minimal_diff() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"Post": [{{"id": "1", "slug": "keep"}}, {{"id": "2", "slug": "old"}}]}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let store = JsonStore::load(file.path()).unwrap();
        let (tx, rx) = mpsc::channel();
        store.subscribe(tx);

        // id 1 unchanged, id 2 removed, id 3 added
        fs::write(
            file.path(),
            r#"{"Post": [{"id": "1", "slug": "keep"}, {"id": "3", "slug": "new"}]}"#,
        )
        .unwrap();
        let emitted = store.reload().unwrap();
        assert_eq!(emitted, 2);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            DataEvent::Added(r) if r.id == "3"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            DataEvent::Removed { id, .. } if id == "2"
        )));
    }

    #[test]
    fn test_reload_in_memory_is_noop() {
        let store = JsonStore::new();
        assert_eq!(store.reload().unwrap(), 0);
    }
}
