//! Apply a validated plan.
//!
//! Creations run first, kind by kind in dependency order, so link targets
//! exist before anything references them. Each new identifier is recorded
//! against its alias for everything applied afterwards. One item's failure
//! is recorded and never stops the others.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use genoportal_common::entities::{Entity, IdMap, Linked, SubmissionScope};
use genoportal_common::{EntityKind, Repository, SubmissionConfig};

use crate::diff::{compute_patch, PlanAction, PlannedItem, SubmissionPlan};

/// Per-kind outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub created: usize,
    pub not_created: usize,
    pub patched: usize,
    pub not_patched: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpsertOutcome {
    pub tallies: BTreeMap<EntityKind, Tally>,
    /// Identifiers of created or patched files, for downstream processing.
    pub uploaded_files: Vec<String>,
    /// Human-readable summary, one line per kind.
    pub messages: Vec<String>,
    pub failures: Vec<String>,
}

impl UpsertOutcome {
    fn tally(&mut self, kind: EntityKind) -> &mut Tally {
        self.tallies.entry(kind).or_default()
    }
}

/// Does `value` mention `alias` anywhere?
fn mentions(value: &Value, alias: &str) -> bool {
    match value {
        Value::String(s) => s == alias,
        Value::Array(items) => items.iter().any(|v| mentions(v, alias)),
        Value::Object(map) => map.values().any(|v| mentions(v, alias)),
        _ => false,
    }
}

/// Remove top-level fields that still reference any of `aliases`,
/// returning their names.
fn strip_fields(props: &mut Map<String, Value>, aliases: &BTreeSet<String>) -> Vec<String> {
    let stripped: Vec<String> = props
        .iter()
        .filter(|(_, value)| aliases.iter().any(|alias| mentions(value, alias)))
        .map(|(field, _)| field.clone())
        .collect();
    for field in &stripped {
        props.remove(field);
    }
    stripped
}

/// A creation whose payload lost fields pointing at items not created yet.
struct Deferred {
    id: String,
    row: Option<usize>,
    entity: Entity,
    fields: Vec<String>,
}

pub struct Upserter<'a, R: Repository + ?Sized> {
    repo: &'a R,
    scope: SubmissionScope,
    config: &'a SubmissionConfig,
}

impl<'a, R: Repository + ?Sized> Upserter<'a, R> {
    pub fn new(repo: &'a R, scope: SubmissionScope, config: &'a SubmissionConfig) -> Self {
        Self { repo, scope, config }
    }

    #[instrument(skip(self, plan), fields(items = plan.items.len()))]
    pub async fn apply(&self, plan: &SubmissionPlan) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();
        let mut ids: IdMap = plan.existing.clone();
        let mut pending = plan.pending_creations();
        let mut deferred: Vec<Deferred> = Vec::new();

        let mut items: Vec<&PlannedItem> = plan.items.iter().collect();
        items.sort_by_key(|item| item.kind());

        // ── Creations ────────────────────────────────────────────────────────
        for item in items.iter().filter(|item| item.action == PlanAction::Create) {
            let kind = item.kind();
            let alias = item.alias().to_string();
            pending.remove(&alias);

            let mut entity = item.entity.clone();
            entity.resolve_references(&ids);
            let mut props = match entity.to_properties(&self.scope) {
                Ok(props) => props,
                Err(e) => {
                    self.record_failure(&mut outcome, item, "create", &e.to_string());
                    outcome.tally(kind).not_created += 1;
                    continue;
                }
            };
            let waiting: BTreeSet<String> = entity
                .pending_aliases()
                .into_iter()
                .filter(|a| pending.contains(a))
                .collect();
            let stripped = strip_fields(&mut props, &waiting);

            match self.repo.create(kind, &props).await {
                Ok(id) => {
                    debug!(alias = %alias, id = %id, "Created");
                    if kind == EntityKind::FileSubmitted {
                        outcome.uploaded_files.push(id.clone());
                    }
                    if !stripped.is_empty() {
                        deferred.push(Deferred {
                            id: id.clone(),
                            row: item.row,
                            entity: item.entity.clone(),
                            fields: stripped,
                        });
                    }
                    ids.insert(alias, id);
                    outcome.tally(kind).created += 1;
                }
                Err(e) => {
                    self.record_failure(&mut outcome, item, "create", &e.to_string());
                    outcome.tally(kind).not_created += 1;
                }
            }
        }

        // ── Links to items created later in the run ──────────────────────────
        for later in deferred {
            let mut entity = later.entity.clone();
            entity.resolve_references(&ids);
            let props = match entity.to_properties(&self.scope) {
                Ok(props) => props,
                Err(e) => {
                    self.record_deferred_failure(&mut outcome, &later, &e.to_string());
                    continue;
                }
            };
            let unresolved: BTreeSet<String> = entity.pending_aliases().into_iter().collect();
            let mut missing: Vec<&str> = Vec::new();
            let mut patch: Map<String, Value> = Map::new();
            for field in &later.fields {
                let Some(value) = props.get(field) else { continue };
                let targets: Vec<&str> = unresolved
                    .iter()
                    .filter(|alias| mentions(value, alias))
                    .map(String::as_str)
                    .collect();
                if targets.is_empty() {
                    patch.insert(field.clone(), value.clone());
                } else {
                    missing.extend(targets);
                }
            }

            let mut failed = false;
            if !missing.is_empty() {
                missing.sort_unstable();
                missing.dedup();
                let reason = format!("linked item(s) {} were not created", missing.join(", "));
                self.record_deferred_failure(&mut outcome, &later, &reason);
                failed = true;
            }
            if patch.is_empty() {
                continue;
            }
            if let Err(e) = self.repo.patch(&later.id, &patch).await {
                if failed {
                    warn!(alias = entity.alias(), "Deferred links not applied: {}", e);
                } else {
                    self.record_deferred_failure(&mut outcome, &later, &e.to_string());
                }
            }
        }

        // ── Patches and no-ops ───────────────────────────────────────────────
        for item in &items {
            let kind = item.kind();
            match &item.action {
                PlanAction::Create => {}
                PlanAction::NoOp { .. } => outcome.tally(kind).unchanged += 1,
                PlanAction::Patch { id, stored, schema, .. } => {
                    let mut entity = item.entity.clone();
                    entity.resolve_references(&ids);
                    let patch = match entity.to_properties(&self.scope) {
                        Ok(candidate) => compute_patch(&candidate, stored, schema, self.config),
                        Err(e) => {
                            self.record_failure(&mut outcome, item, "patch", &e.to_string());
                            outcome.tally(kind).not_patched += 1;
                            continue;
                        }
                    };
                    if patch.is_empty() {
                        outcome.tally(kind).unchanged += 1;
                        continue;
                    }
                    match self.repo.patch(id, &patch).await {
                        Ok(()) => {
                            debug!(alias = item.alias(), id = %id, fields = patch.len(), "Patched");
                            if kind == EntityKind::FileSubmitted {
                                outcome.uploaded_files.push(id.clone());
                            }
                            outcome.tally(kind).patched += 1;
                        }
                        Err(e) => {
                            self.record_failure(&mut outcome, item, "patch", &e.to_string());
                            outcome.tally(kind).not_patched += 1;
                        }
                    }
                }
            }
        }

        outcome.messages = summary_lines(&outcome.tallies);
        info!(
            created = outcome.tallies.values().map(|t| t.created).sum::<usize>(),
            patched = outcome.tallies.values().map(|t| t.patched).sum::<usize>(),
            failures = outcome.failures.len(),
            "Submission applied"
        );
        outcome
    }

    /// A deferred link patch counts once as not patched, however many of
    /// its fields went missing.
    fn record_deferred_failure(&self, outcome: &mut UpsertOutcome, later: &Deferred, error: &str) {
        let (kind, alias) = (later.entity.kind(), later.entity.alias());
        warn!(alias, "Deferred links not applied: {}", error);
        let prefix = later.row.map(|n| format!("Row {} - ", n)).unwrap_or_default();
        outcome.failures.push(format!(
            "{}{} {}: links to items created later could not be set: {}",
            prefix,
            kind.label(),
            alias,
            error
        ));
        outcome.tally(kind).not_patched += 1;
    }

    fn record_failure(&self, outcome: &mut UpsertOutcome, item: &PlannedItem, action: &str, error: &str) {
        warn!(alias = item.alias(), action, "Item not applied: {}", error);
        let prefix = item.row.map(|n| format!("Row {} - ", n)).unwrap_or_default();
        outcome.failures.push(format!(
            "{}{} {}: {} failed: {}",
            prefix,
            item.kind().label(),
            item.alias(),
            action,
            error
        ));
    }
}

/// One line per kind that saw any activity.
pub fn summary_lines(tallies: &BTreeMap<EntityKind, Tally>) -> Vec<String> {
    tallies
        .iter()
        .filter(|(_, t)| **t != Tally::default())
        .map(|(kind, t)| {
            let mut line = format!(
                "{}: {} created, {} patched, {} unchanged",
                kind.label(),
                t.created,
                t.patched,
                t.unchanged
            );
            if t.not_created + t.not_patched > 0 {
                line.push_str(&format!(" ({} not created, {} not patched)", t.not_created, t.not_patched));
            }
            line
        })
        .collect()
}
