//! Filesystem watcher for route templates.
//!
//! Monitors the routes directory and emits added/changed/removed
//! lifecycle events for files whose names match the collection route
//! grammar.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Watcher Thread                          │
//! │                                                            │
//! │  ┌──────────┐    ┌───────────┐    ┌─────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer │───▶│ Sender<WatchEvent>  │  │
//! │  │ events   │    │ (per-path)│    │ (engine loop)       │  │
//! │  └──────────┘    └───────────┘    └─────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Before the thread starts, a full scan of the root emits a synthetic
//! `Added` for every pre-existing matching file, so baseline events
//! always precede live ones. Events are paths relative to the root
//! with the extension stripped (the template's route identity).

use crate::log;
use notify::{
    event::{ModifyKind, RenameMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;
use walkdir::WalkDir;

// =============================================================================
// Constants
// =============================================================================

/// Default debounce window: wide enough to swallow editor multi-write
/// saves, narrow enough to feel immediate.
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Idle wakeup interval, bounds how long a stop request can wait.
const IDLE_TICK_MS: u64 = 250;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

// =============================================================================
// Types
// =============================================================================

/// Template file lifecycle event. Paths are route identities: relative
/// to the watched root, extension stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(p) | Self::Changed(p) | Self::Removed(p) => p,
        }
    }
}

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("failed to scan `{0}`")]
    Scan(PathBuf, #[source] walkdir::Error),

    #[error("failed to watch `{0}`")]
    Watch(PathBuf, #[source] notify::Error),
}

/// Predicate selecting the files this watcher reports on, applied to
/// the route identity.
pub type Matcher = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Absolute filesystem path → route identity (relative, no extension).
fn route_path(path: &Path, root: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    match rel.extension().and_then(|e| e.to_str()) {
        // A dot inside a brace group belongs to a binding, not an
        // extension boundary: `{Post.slug}` has no extension to strip
        Some(ext) if !ext.contains('}') => Some(rel.with_extension("")),
        _ => Some(rel.to_path_buf()),
    }
}

// =============================================================================
// Debounce State
// =============================================================================

/// Coalesces rapid events per path within a debounce window.
///
/// Multiple events for one path collapse to the last event for that
/// path; independent paths are unaffected by each other.
struct Debouncer {
    window: Duration,
    pending: FxHashMap<PathBuf, WatchEvent>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: FxHashMap::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: WatchEvent) {
        let key = event.path().to_path_buf();
        let merged = match (self.pending.remove(&key), event) {
            // A change right after a create is still a create to the
            // consumer, which has not seen the file yet
            (Some(WatchEvent::Added(p)), WatchEvent::Changed(_)) => WatchEvent::Added(p),
            (_, event) => event,
        };
        self.pending.insert(key, merged);
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self.last_event.is_some_and(|t| t.elapsed() >= self.window)
    }

    fn take(&mut self) -> Vec<WatchEvent> {
        self.last_event = None;
        self.pending.drain().map(|(_, event)| event).collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_millis(IDLE_TICK_MS)
        } else {
            self.window
        }
    }
}

// =============================================================================
// Event Mapping
// =============================================================================

/// Map a raw notify event to watch events for matching route files.
fn map_event(event: &Event, root: &Path, matcher: &Matcher) -> Vec<WatchEvent> {
    let make = |path: &PathBuf, kind: fn(PathBuf) -> WatchEvent| -> Option<WatchEvent> {
        if is_temp_file(path) {
            return None;
        }
        let route = route_path(path, root)?;
        matcher(&route).then(|| kind(route))
    };

    match &event.kind {
        EventKind::Create(_) => event.paths.iter().filter_map(|p| make(p, WatchEvent::Added)).collect(),
        EventKind::Remove(_) => event.paths.iter().filter_map(|p| make(p, WatchEvent::Removed)).collect(),
        // A rename with both ends known is a remove plus an add
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            [
                make(&event.paths[0], WatchEvent::Removed),
                make(&event.paths[1], WatchEvent::Added),
            ]
            .into_iter()
            .flatten()
            .collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().filter_map(|p| make(p, WatchEvent::Removed)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().filter_map(|p| make(p, WatchEvent::Added)).collect()
        }
        EventKind::Modify(_) => event.paths.iter().filter_map(|p| make(p, WatchEvent::Changed)).collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// Handle to a running watcher thread.
///
/// `stop()` requests shutdown, finishes delivery of events already
/// queued, and joins the thread; no events are emitted after it
/// returns. Dropping the handle stops the watcher too.
pub struct WatchHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Watches a routes directory for template lifecycle events.
pub struct RouteWatcher;

impl RouteWatcher {
    /// Scan the root and start watching it.
    ///
    /// The notify watch is established first, then the baseline scan
    /// runs, both before this function returns: a file created at any
    /// point lands in the baseline, the live stream, or (in the
    /// overlap) both, never in neither. A duplicate `Added` is
    /// harmless to upsert consumers.
    pub fn spawn(
        root: impl AsRef<Path>,
        debounce: Duration,
        matcher: Matcher,
        tx: Sender<WatchEvent>,
    ) -> Result<WatchHandle, WatcherError> {
        let root = root.as_ref().to_path_buf();

        let connection =
            connect(&root).map_err(|e| WatcherError::Watch(root.clone(), e))?;

        for event in Self::scan(&root, &matcher)? {
            if tx.send(event).is_err() {
                break;
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || watch_loop(connection, &root, debounce, &matcher, &tx, &stop))
        };

        Ok(WatchHandle {
            stop,
            thread: Some(thread),
        })
    }

    /// Full scan: one synthetic `Added` per existing matching file.
    pub fn scan(root: &Path, matcher: &Matcher) -> Result<Vec<WatchEvent>, WatcherError> {
        let mut events = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| WatcherError::Scan(root.to_path_buf(), e))?;
            if !entry.file_type().is_file() || is_temp_file(entry.path()) {
                continue;
            }
            if let Some(route) = route_path(entry.path(), root)
                && matcher(&route)
            {
                events.push(WatchEvent::Added(route));
            }
        }
        Ok(events)
    }
}

/// A live notify backend and its raw event channel. The watcher half
/// must stay alive as long as the channel is read.
type Connection = (RecommendedWatcher, Receiver<notify::Result<Event>>);

fn connect(root: &Path) -> Result<Connection, notify::Error> {
    let (raw_tx, raw_rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(raw_tx)?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok((watcher, raw_rx))
}

/// Blocking watch loop with debouncing; runs until stopped or the
/// consumer hangs up. Starts on an already-established connection and
/// degrades to backoff retries when the backend dies.
fn watch_loop(
    mut connection: Connection,
    root: &Path,
    debounce: Duration,
    matcher: &Matcher,
    tx: &Sender<WatchEvent>,
    stop: &AtomicBool,
) {
    let mut backoff = INITIAL_BACKOFF;

    'reconnect: loop {
        let (_watcher, raw_rx) = &connection;
        let mut debouncer = Debouncer::new(debounce);

        loop {
            if stop.load(Ordering::SeqCst) {
                // Graceful stop: flush what was already queued
                flush(&mut debouncer, tx);
                return;
            }
            match raw_rx.recv_timeout(debouncer.timeout()) {
                Ok(Ok(event)) => {
                    for mapped in map_event(&event, root, matcher) {
                        debouncer.add(mapped);
                    }
                }
                Ok(Err(e)) => log!("watch"; "error: {e}"),
                Err(RecvTimeoutError::Timeout) => {
                    if debouncer.ready() && !flush(&mut debouncer, tx) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Backend died; flush and reconnect with backoff
                    flush(&mut debouncer, tx);
                    log!("watch"; "backend disconnected, reconnecting");
                    break;
                }
            }
        }

        while !stop.load(Ordering::SeqCst) {
            thread::sleep(backoff);
            backoff = (backoff * 2).min(MAX_BACKOFF);
            match connect(root) {
                Ok(fresh) => {
                    connection = fresh;
                    backoff = INITIAL_BACKOFF;
                    continue 'reconnect;
                }
                Err(e) => {
                    log!("watch"; "degraded: cannot watch {}: {e}, retrying in {backoff:?}", root.display());
                }
            }
        }
        return;
    }
}

/// Deliver pending debounced events. Returns false when the consumer
/// has hung up.
fn flush(debouncer: &mut Debouncer, tx: &Sender<WatchEvent>) -> bool {
    for event in debouncer.take() {
        if tx.send(event).is_err() {
            return false;
        }
    }
    true
}
