//! Plan creations and patches against what the repository already holds.
//!
//! Every candidate is looked up by alias. Absent items become creations;
//! present ones get a field-level patch, empty patches are no-ops. Both are
//! checked with the repository's validator before anything is written.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use genoportal_common::entities::{Entity, IdMap, Linked, SubmissionScope};
use genoportal_common::repository::FieldKind;
use genoportal_common::{EntityKind, ItemSchema, Repository, SubmissionConfig, ValidationIssue, ValidationMode};

use crate::normalizer::NormalizedSubmission;

/// Fields that differ between `candidate` and `stored`.
///
/// Single values (scalars, links, embedded objects) are replaced when they
/// differ. Arrays are extended with the items not already stored and never
/// shrink. Create-only fields are left alone.
pub fn compute_patch(
    candidate: &Map<String, Value>,
    stored: &Map<String, Value>,
    schema: &ItemSchema,
    config: &SubmissionConfig,
) -> Map<String, Value> {
    let mut patch = Map::new();
    for (field, value) in candidate {
        if config.is_create_only(field) {
            continue;
        }
        match schema.field_kind(field, value) {
            FieldKind::Scalar | FieldKind::Link | FieldKind::Object => {
                if stored.get(field) != Some(value) {
                    patch.insert(field.clone(), value.clone());
                }
            }
            FieldKind::LinkArray | FieldKind::ScalarArray | FieldKind::ObjectArray => {
                let mut merged: Vec<Value> = stored
                    .get(field)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let before = merged.len();
                let incoming = match value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                for item in incoming {
                    if !merged.contains(&item) {
                        merged.push(item);
                    }
                }
                if merged.len() > before {
                    patch.insert(field.clone(), Value::Array(merged));
                }
            }
        }
    }
    patch
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanAction {
    Create,
    Patch {
        id: String,
        /// Stored properties and schema, kept so the patch can be recomputed
        /// once newly created identifiers are known.
        stored: Map<String, Value>,
        schema: ItemSchema,
        patch: Map<String, Value>,
    },
    NoOp { id: String },
}

#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub entity: Entity,
    pub row: Option<usize>,
    pub action: PlanAction,
}

impl PlannedItem {
    pub fn kind(&self) -> EntityKind {
        self.entity.kind()
    }

    pub fn alias(&self) -> &str {
        self.entity.alias()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PlanCounts {
    pub validated: usize,
    pub errored: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionPlan {
    /// Items that passed validation, in creation order of kinds.
    pub items: Vec<PlannedItem>,
    /// alias → identifier of every candidate already on record.
    pub existing: IdMap,
    pub counts: BTreeMap<EntityKind, PlanCounts>,
    pub errors: Vec<String>,
}

impl SubmissionPlan {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Aliases this plan will create.
    pub fn pending_creations(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .filter(|item| item.action == PlanAction::Create)
            .map(|item| item.alias().to_string())
            .collect()
    }
}

fn row_prefix(row: Option<usize>) -> String {
    row.map(|n| format!("Row {} - ", n)).unwrap_or_default()
}

pub struct Differ<'a, R: Repository + ?Sized> {
    repo: &'a R,
    scope: SubmissionScope,
    config: &'a SubmissionConfig,
}

impl<'a, R: Repository + ?Sized> Differ<'a, R> {
    pub fn new(repo: &'a R, scope: SubmissionScope, config: &'a SubmissionConfig) -> Self {
        Self { repo, scope, config }
    }

    #[instrument(skip(self, normalized), fields(entities = normalized.entities.len()))]
    pub async fn plan(&self, normalized: &NormalizedSubmission) -> SubmissionPlan {
        let mut plan = SubmissionPlan::default();
        let mut stored: BTreeMap<String, (String, Map<String, Value>)> = BTreeMap::new();
        let mut looked_up: Vec<&Entity> = Vec::new();

        // ── Lookup ───────────────────────────────────────────────────────────
        for entity in &normalized.entities {
            let row = normalized.origin_rows.get(entity.alias()).copied();
            match self.repo.get(entity.alias()).await {
                Ok(Some(item)) => {
                    plan.existing.insert(entity.alias().to_string(), item.id.clone());
                    stored.insert(entity.alias().to_string(), (item.id, item.properties));
                    looked_up.push(entity);
                }
                Ok(None) => looked_up.push(entity),
                Err(e) => {
                    warn!(alias = entity.alias(), "Lookup failed: {}", e);
                    plan.errors.push(format!(
                        "{}{} {}: lookup failed: {}",
                        row_prefix(row),
                        entity.kind().label(),
                        entity.alias(),
                        e
                    ));
                    plan.counts.entry(entity.kind()).or_default().errored += 1;
                }
            }
        }

        let pending: BTreeSet<String> = looked_up
            .iter()
            .map(|e| e.alias().to_string())
            .filter(|alias| !plan.existing.contains_key(alias))
            .collect();

        // ── Diff and validate ────────────────────────────────────────────────
        let mut schemas: BTreeMap<EntityKind, ItemSchema> = BTreeMap::new();
        for entity in looked_up {
            let kind = entity.kind();
            let row = normalized.origin_rows.get(entity.alias()).copied();
            let prefix = format!("{}{} {}", row_prefix(row), kind.label(), entity.alias());

            match self.plan_one(entity, &plan.existing, stored.get(entity.alias()), &mut schemas).await {
                Ok((action, issues)) => {
                    let issues = blocking_issues(issues, &pending);
                    if issues.is_empty() {
                        debug!(alias = entity.alias(), action = action_name(&action), "Planned");
                        plan.counts.entry(kind).or_default().validated += 1;
                        plan.items.push(PlannedItem { entity: entity.clone(), row, action });
                    } else {
                        plan.counts.entry(kind).or_default().errored += 1;
                        plan.errors.extend(issues.into_iter().map(|issue| format!("{}: {}", prefix, issue)));
                    }
                }
                Err(message) => {
                    plan.counts.entry(kind).or_default().errored += 1;
                    plan.errors.push(format!("{}: {}", prefix, message));
                }
            }
        }

        info!(
            planned = plan.items.len(),
            existing = plan.existing.len(),
            errors = plan.errors.len(),
            "Submission planned"
        );
        plan
    }

    /// Decide one entity's action and collect its validation issues.
    async fn plan_one(
        &self,
        entity: &Entity,
        existing: &IdMap,
        stored: Option<&(String, Map<String, Value>)>,
        schemas: &mut BTreeMap<EntityKind, ItemSchema>,
    ) -> Result<(PlanAction, Vec<ValidationIssue>), String> {
        let kind = entity.kind();
        let mut resolved = entity.clone();
        resolved.resolve_references(existing);
        let candidate = resolved.to_properties(&self.scope).map_err(|e| e.to_string())?;

        let Some((id, stored)) = stored else {
            let issues = self
                .repo
                .validate(kind, &candidate, &ValidationMode::Create)
                .await
                .map_err(|e| format!("could not be validated: {}", e))?;
            return Ok((PlanAction::Create, issues));
        };

        let schema = match schemas.get(&kind) {
            Some(schema) => schema.clone(),
            None => {
                let schema = self
                    .repo
                    .get_schema(kind)
                    .await
                    .map_err(|e| format!("schema unavailable: {}", e))?;
                schemas.insert(kind, schema.clone());
                schema
            }
        };

        let patch = compute_patch(&candidate, stored, &schema, self.config);
        if patch.is_empty() {
            return Ok((PlanAction::NoOp { id: id.clone() }, Vec::new()));
        }

        let issues = self
            .repo
            .validate(kind, &patch, &ValidationMode::Patch { id: id.clone() })
            .await
            .map_err(|e| format!("could not be validated: {}", e))?;
        Ok((
            PlanAction::Patch { id: id.clone(), stored: stored.clone(), schema, patch },
            issues,
        ))
    }
}

/// Issues that still count once links to items created in this run are
/// forgiven.
fn blocking_issues(issues: Vec<ValidationIssue>, pending: &BTreeSet<String>) -> Vec<String> {
    issues
        .into_iter()
        .filter(|issue| !issue.target.as_ref().is_some_and(|target| pending.contains(target)))
        .map(|issue| issue.to_string())
        .collect()
}

fn action_name(action: &PlanAction) -> &'static str {
    match action {
        PlanAction::Create => "create",
        PlanAction::Patch { .. } => "patch",
        PlanAction::NoOp { .. } => "no-op",
    }
}
