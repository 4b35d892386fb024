//! The engine: watcher events in, page lifecycle out.
//!
//! Watcher and data-layer notifications are funneled into one channel
//! and applied by a single consumer loop, so the reconciler's state
//! only ever has one writer and callback re-entrancy cannot occur.
//!
//! ```text
//! RouteWatcher ──WatchEvent──┐
//!                            ├──▶ EngineEvent ──▶ Reconciler ──▶ PageSink
//! DataQuery  ────DataEvent───┘        (mpsc, single consumer)
//! ```

use std::{
    path::Path,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};

use crate::data::{DataEvent, DataQuery};
use crate::log;
use crate::pattern::RoutePattern;
use crate::reconcile::{Outcome, Reconciler};
use crate::sink::PageSink;
use crate::watch::{Matcher, RouteWatcher, WatchEvent};

/// Everything the consumer loop reacts to.
pub enum EngineEvent {
    Route(WatchEvent),
    Data(DataEvent),
    Shutdown,
}

/// The matching rule: the base name (extension already stripped by the
/// watcher) parses as a collection route.
pub fn collection_matcher() -> Matcher {
    Arc::new(|path: &Path| matches!(RoutePattern::parse(&path.to_string_lossy()), Ok(Some(_))))
}

/// Owns the reconciler and the event channel; one per routes root.
pub struct Engine<S: PageSink> {
    query: Arc<dyn DataQuery>,
    reconciler: Reconciler<S>,
    tx: Sender<EngineEvent>,
    rx: Receiver<EngineEvent>,
}

impl<S: PageSink> Engine<S> {
    pub fn new(query: Arc<dyn DataQuery>, sink: S) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            query,
            reconciler: Reconciler::new(sink),
            tx,
            rx,
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    /// A sender that injects events into the loop; `Shutdown` makes
    /// [`run`](Self::run) finish its in-flight event and return.
    pub fn sender(&self) -> Sender<EngineEvent> {
        self.tx.clone()
    }

    /// One-shot full pass: scan the routes root, register every
    /// collection template and reconcile all pages.
    pub fn scan(&self, root: &Path) -> Result<Outcome> {
        let events = RouteWatcher::scan(root, &collection_matcher())
            .with_context(|| format!("Failed to scan {}", root.display()))?;

        let mut outcome = Outcome::default();
        for event in events {
            outcome.merge(self.apply(EngineEvent::Route(event)));
        }
        Ok(outcome)
    }

    /// Blocking event loop: baseline scan, then live watcher and data
    /// events until a `Shutdown` arrives.
    pub fn run(&self, root: &Path, debounce: Duration) -> Result<()> {
        // Watcher bridge; baseline Added events are queued before
        // spawn returns, so they precede every live event
        let (watch_tx, watch_rx) = mpsc::channel();
        let handle = RouteWatcher::spawn(root, debounce, collection_matcher(), watch_tx)
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        let forward = {
            let tx = self.tx.clone();
            thread::spawn(move || {
                for event in watch_rx {
                    if tx.send(EngineEvent::Route(event)).is_err() {
                        break;
                    }
                }
            })
        };

        // Data layer bridge
        let (data_tx, data_rx) = mpsc::channel();
        self.query.subscribe(data_tx);
        {
            let tx = self.tx.clone();
            thread::spawn(move || {
                for event in data_rx {
                    if tx.send(EngineEvent::Data(event)).is_err() {
                        break;
                    }
                }
            });
        }

        log!("watch"; "watching {} ({} templates)", root.display(), self.reconciler.template_count());

        while let Ok(event) = self.rx.recv() {
            if matches!(event, EngineEvent::Shutdown) {
                break;
            }
            let outcome = self.apply(event);
            log_outcome(&outcome);
        }

        handle.stop();
        forward.join().ok();
        log!("watch"; "stopped; {} pages live", self.reconciler.snapshot().len());
        Ok(())
    }

    fn apply(&self, event: EngineEvent) -> Outcome {
        let query = &*self.query;
        match event {
            EngineEvent::Route(WatchEvent::Added(path) | WatchEvent::Changed(path)) => {
                self.reconciler.template_upserted(&path, query)
            }
            EngineEvent::Route(WatchEvent::Removed(path)) => {
                self.reconciler.template_removed(&path)
            }
            EngineEvent::Data(event) => self.reconciler.record_event(&event, query),
            EngineEvent::Shutdown => Outcome::default(),
        }
    }
}

/// Log what a pass changed, and everything it had to skip or exclude.
pub fn log_outcome(outcome: &Outcome) {
    let diff = &outcome.diff;
    if !diff.is_empty() {
        log!(
            "reconcile";
            "+{} ~{} -{} pages",
            diff.created.len(),
            diff.updated.len(),
            diff.deleted.len()
        );
    }
    for skip in &outcome.report.skipped {
        log!("reconcile"; "skipped record `{}`: {}", skip.record_id, skip.reason);
    }
    for error in &outcome.report.template_errors {
        log!("error"; "{error}");
    }
}
