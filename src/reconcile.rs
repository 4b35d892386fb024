//! Page reconciliation.
//!
//! The reconciler owns the authoritative mapping of
//! `(template, record id)` → live page and computes the minimal
//! create/update/delete diff on every template or data event. The
//! mapping is in-memory only and rebuilt by a full pass on restart.
//!
//! # Single-writer discipline
//!
//! Only the reconciler mutates its state, one event at a time; all
//! resolution is pure. `reconcile_all` resolves templates in parallel
//! but applies the results serially under one write lock.
//!
//! # Collisions
//!
//! Two distinct pairs resolving to one output path is a fail-fast
//! error: neither page is silently dropped, the colliding template's
//! pages are left untouched for the pass, and the error names both
//! records so the caller can pick a more specific field.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::data::{DataEvent, DataQuery};
use crate::log;
use crate::pattern::{PatternError, RoutePattern};
use crate::resolver::{resolve, PageDescriptor, RecordSkip, ResolveError};
use crate::sink::PageSink;

/// `(template identity, record id)`: the unit of reconciliation.
pub type PairKey = (PathBuf, String);

/// Two distinct `(template, record)` pairs claiming one output path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "route collision at `{path}`: record `{first_record}` (template `{first_template}`) vs record `{second_record}` (template `{second_template}`)"
)]
pub struct RouteCollisionError {
    pub path: String,
    pub first_template: PathBuf,
    pub first_record: String,
    pub second_template: PathBuf,
    pub second_record: String,
}

/// Template-level failure: the template produced no pages this pass.
#[derive(Debug, Error)]
pub enum TemplateErrorKind {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Collision(#[from] RouteCollisionError),
}

/// A template-level error, attributed to its template.
#[derive(Debug, Error)]
#[error("template `{template}`: {kind}")]
pub struct TemplateError {
    pub template: PathBuf,
    pub kind: TemplateErrorKind,
}

/// The minimal page lifecycle change set one reconciliation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    pub created: Vec<PageDescriptor>,
    /// Same pair, same path, changed context. A changed path is never
    /// an update: paths are identity downstream, so it lands here as
    /// one `deleted` plus one `created`.
    pub updated: Vec<PageDescriptor>,
    pub deleted: Vec<PageDescriptor>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Everything that went wrong without aborting the pass. Per-record
/// skips and template-level errors are aggregated here; nothing is
/// silently swallowed.
#[derive(Debug, Default)]
pub struct Report {
    pub skipped: Vec<RecordSkip>,
    pub template_errors: Vec<TemplateError>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.template_errors.is_empty()
    }
}

/// One reconciliation's terminal result: the applied diff plus the
/// error report.
#[derive(Debug, Default)]
pub struct Outcome {
    pub diff: Diff,
    pub report: Report,
}

impl Outcome {
    /// Fold another outcome into this one (e.g. per-template outcomes
    /// of a startup scan).
    pub fn merge(&mut self, other: Outcome) {
        self.diff.created.extend(other.diff.created);
        self.diff.updated.extend(other.diff.updated);
        self.diff.deleted.extend(other.diff.deleted);
        self.report.skipped.extend(other.report.skipped);
        self.report.template_errors.extend(other.report.template_errors);
    }
}

/// Fresh resolution of one template, before diffing against state.
struct Resolution {
    template: PathBuf,
    pages: Vec<PageDescriptor>,
    skipped: Vec<RecordSkip>,
}

/// One template's planned state change: removals computed against the
/// current state, plus the creations and updates to land after them.
struct Plan {
    template: PathBuf,
    pages: Vec<PageDescriptor>,
    deletions: Vec<PairKey>,
    creations: Vec<PageDescriptor>,
    updates: Vec<PageDescriptor>,
}

/// The reconciler: registered templates, live page state, and the sink
/// that receives page lifecycle side effects.
pub struct Reconciler<S> {
    templates: RwLock<FxHashMap<PathBuf, RoutePattern>>,
    state: RwLock<FxHashMap<PairKey, PageDescriptor>>,
    sink: S,
}

impl<S: PageSink> Reconciler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            templates: RwLock::new(FxHashMap::default()),
            state: RwLock::new(FxHashMap::default()),
            sink,
        }
    }

    /// Consistent snapshot of the live page set, sorted by path.
    pub fn snapshot(&self) -> Vec<PageDescriptor> {
        let mut pages: Vec<_> = self.state.read().values().cloned().collect();
        pages.sort_by(|a, b| a.path.cmp(&b.path));
        pages
    }

    pub fn template_count(&self) -> usize {
        self.templates.read().len()
    }

    /// Register a template (watcher `Added`/`Changed`) and reconcile
    /// its pages.
    ///
    /// Static files (no binding syntax) are not this engine's concern
    /// and produce an empty outcome. Malformed names are reported once
    /// and the template stays unregistered.
    pub fn template_upserted(&self, template: &Path, query: &dyn DataQuery) -> Outcome {
        let mut outcome = Outcome::default();

        let pattern = match RoutePattern::parse(&template.to_string_lossy()) {
            Ok(Some(pattern)) => pattern,
            Ok(None) => return outcome,
            Err(e) => {
                push_template_error(&mut outcome.report, template, e.into());
                return outcome;
            }
        };

        self.templates
            .write()
            .insert(template.to_path_buf(), pattern.clone());

        match resolve_template(template, &pattern, query) {
            Ok(resolution) => self.apply(vec![resolution], &mut outcome),
            Err(kind) => push_template_error(&mut outcome.report, template, kind),
        }
        outcome
    }

    /// Drop a template (watcher `Removed`) and delete all its pages.
    pub fn template_removed(&self, template: &Path) -> Outcome {
        let mut outcome = Outcome::default();
        self.templates.write().remove(template);

        let mut state = self.state.write();
        let doomed: Vec<PairKey> = state
            .keys()
            .filter(|(t, _)| t == template)
            .cloned()
            .collect();
        for key in doomed {
            if let Some(page) = state.remove(&key) {
                self.delete_page(&page, &mut outcome.diff);
            }
        }
        outcome
    }

    /// Re-reconcile exactly the templates whose binding names the
    /// event's record type.
    pub fn record_event(&self, event: &DataEvent, query: &dyn DataQuery) -> Outcome {
        let affected: Vec<(PathBuf, RoutePattern)> = {
            let templates = self.templates.read();
            templates
                .iter()
                .filter(|(_, p)| p.binds_type(event.type_name()))
                .map(|(t, p)| (t.clone(), p.clone()))
                .collect()
        };
        self.reconcile_templates(affected, query)
    }

    /// Full pass over every registered template.
    ///
    /// Idempotent: a second pass with no intervening events yields an
    /// empty diff.
    pub fn reconcile_all(&self, query: &dyn DataQuery) -> Outcome {
        let templates: Vec<(PathBuf, RoutePattern)> = {
            let templates = self.templates.read();
            templates
                .iter()
                .map(|(t, p)| (t.clone(), p.clone()))
                .collect()
        };
        self.reconcile_templates(templates, query)
    }

    fn reconcile_templates(
        &self,
        mut templates: Vec<(PathBuf, RoutePattern)>,
        query: &dyn DataQuery,
    ) -> Outcome {
        // Deterministic application order regardless of map iteration
        templates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut outcome = Outcome::default();

        // Resolution is pure and per-template independent; only the
        // apply phase below mutates state.
        let results: Vec<(PathBuf, Result<Resolution, TemplateErrorKind>)> = templates
            .par_iter()
            .map(|(template, pattern)| {
                (template.clone(), resolve_template(template, pattern, query))
            })
            .collect();

        let mut resolutions = Vec::with_capacity(results.len());
        for (template, result) in results {
            match result {
                Ok(resolution) => resolutions.push(resolution),
                Err(kind) => push_template_error(&mut outcome.report, &template, kind),
            }
        }

        self.apply(resolutions, &mut outcome);
        outcome
    }

    /// Diff fresh resolutions against the live state and emit page
    /// lifecycle side effects. The only state writer.
    ///
    /// Every removal of the pass lands before any creation, so a page
    /// created at a path another record is leaving in the same pass is
    /// never torn down by that record's departure.
    fn apply(&self, resolutions: Vec<Resolution>, outcome: &mut Outcome) {
        let mut state = self.state.write();

        let mut plans = Vec::with_capacity(resolutions.len());
        for mut resolution in resolutions {
            outcome.report.skipped.append(&mut resolution.skipped);
            plans.push(plan(&state, resolution));
        }

        // A colliding template is dropped whole, so its removals stop
        // counting as vacated paths, which can expose further
        // collisions; iterate until the survivor set is stable.
        let mut live = vec![true; plans.len()];
        loop {
            let vacating: FxHashSet<&PairKey> = plans
                .iter()
                .zip(&live)
                .filter(|(_, ok)| **ok)
                .flat_map(|(plan, _)| plan.deletions.iter())
                .collect();

            let mut changed = false;
            for (plan, ok) in plans.iter().zip(live.iter_mut()) {
                if !*ok {
                    continue;
                }
                if let Err(collision) = check_collisions(&state, plan, &vacating) {
                    log!("reconcile"; "{collision}");
                    push_template_error(&mut outcome.report, &plan.template, collision.into());
                    *ok = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        for (plan, ok) in plans.iter().zip(&live) {
            if !*ok {
                continue;
            }
            for key in &plan.deletions {
                if let Some(page) = state.remove(key) {
                    self.delete_page(&page, &mut outcome.diff);
                }
            }
        }

        for (plan, ok) in plans.into_iter().zip(live) {
            if !ok {
                continue;
            }
            let Plan {
                template,
                creations,
                updates,
                ..
            } = plan;
            for page in creations {
                self.create_page(&page, &mut outcome.diff.created);
                state.insert((template.clone(), page.record_id.clone()), page);
            }
            for page in updates {
                self.create_page(&page, &mut outcome.diff.updated);
                state.insert((template.clone(), page.record_id.clone()), page);
            }
        }
    }

    fn create_page(&self, page: &PageDescriptor, bucket: &mut Vec<PageDescriptor>) {
        if let Err(e) = self.sink.create_page(page) {
            log!("reconcile"; "page sink failed for `{}`: {e}", page.path);
        }
        bucket.push(page.clone());
    }

    fn delete_page(&self, page: &PageDescriptor, diff: &mut Diff) {
        if let Err(e) = self.sink.delete_page(&page.path) {
            log!("reconcile"; "page sink failed for `{}`: {e}", page.path);
        }
        diff.deleted.push(page.clone());
    }
}

/// Resolve one template fully, collecting per-record skips.
fn resolve_template(
    template: &Path,
    pattern: &RoutePattern,
    query: &dyn DataQuery,
) -> Result<Resolution, TemplateErrorKind> {
    let mut pages = Vec::new();
    let mut skipped = Vec::new();

    for item in resolve(pattern, template, query).map_err(TemplateErrorKind::from)? {
        match item {
            Ok(page) => pages.push(page),
            Err(skip) => {
                log!("resolve"; "skipping record `{}`: {}", skip.record_id, skip.reason);
                skipped.push(skip);
            }
        }
    }

    Ok(Resolution {
        template: template.to_path_buf(),
        pages,
        skipped,
    })
}

/// Diff one template's fresh pages against the current state:
/// removals (absent records plus old paths of moved records), then
/// creations and context updates.
fn plan(state: &FxHashMap<PairKey, PageDescriptor>, resolution: Resolution) -> Plan {
    let Resolution {
        template, pages, ..
    } = resolution;

    let fresh_ids: FxHashSet<&str> = pages.iter().map(|p| p.record_id.as_str()).collect();
    let mut deletions: Vec<PairKey> = state
        .keys()
        .filter(|(t, id)| t == &template && !fresh_ids.contains(id.as_str()))
        .cloned()
        .collect();

    let mut creations = Vec::new();
    let mut updates = Vec::new();
    for page in &pages {
        let key = (template.clone(), page.record_id.clone());
        match state.get(&key) {
            None => creations.push(page.clone()),
            Some(old) if old.path != page.path => {
                // Delete-old + create-new, never a rename
                deletions.push(key);
                creations.push(page.clone());
            }
            Some(old) if old.context != page.context => updates.push(page.clone()),
            Some(_) => {}
        }
    }

    Plan {
        template,
        pages,
        deletions,
        creations,
        updates,
    }
}

/// Fail if two fresh pages share a path, or a fresh page claims a path
/// held by another template's live page that is not vacating it this
/// pass.
fn check_collisions(
    state: &FxHashMap<PairKey, PageDescriptor>,
    plan: &Plan,
    vacating: &FxHashSet<&PairKey>,
) -> Result<(), RouteCollisionError> {
    let mut seen: FxHashMap<&str, &PageDescriptor> = FxHashMap::default();
    for page in &plan.pages {
        if let Some(first) = seen.insert(&page.path, page) {
            return Err(RouteCollisionError {
                path: page.path.clone(),
                first_template: first.template.clone(),
                first_record: first.record_id.clone(),
                second_template: page.template.clone(),
                second_record: page.record_id.clone(),
            });
        }
    }

    for (key, other) in state {
        if other.template == plan.template || vacating.contains(key) {
            continue;
        }
        if let Some(page) = seen.get(other.path.as_str()) {
            return Err(RouteCollisionError {
                path: other.path.clone(),
                first_template: other.template.clone(),
                first_record: other.record_id.clone(),
                second_template: page.template.clone(),
                second_record: page.record_id.clone(),
            });
        }
    }

    Ok(())
}

fn push_template_error(report: &mut Report, template: &Path, kind: TemplateErrorKind) {
    log!("reconcile"; "template `{}` excluded: {kind}", template.display());
    report.template_errors.push(TemplateError {
        template: template.to_path_buf(),
        kind,
    });
}
