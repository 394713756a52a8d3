/// Core entity types assembled from a submission sheet.
/// Every entity is keyed by a deterministic alias until the upsert phase
/// assigns it a persisted identifier.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::Result;

/// Open extension map for properties that have no first-class field.
pub type Extra = Map<String, Value>;

/// alias → persisted identifier, filled in as items are found or created.
pub type IdMap = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// Declaration order is the creation order used by the upserter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    FileSubmitted,
    Sample,
    Individual,
    Family,
    SampleProcessing,
    Report,
    Case,
}

impl EntityKind {
    pub const POST_ORDER: [EntityKind; 7] = [
        EntityKind::FileSubmitted,
        EntityKind::Sample,
        EntityKind::Individual,
        EntityKind::Family,
        EntityKind::SampleProcessing,
        EntityKind::Report,
        EntityKind::Case,
    ];

    /// Output key / item type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::FileSubmitted    => "file_submitted",
            EntityKind::Sample           => "sample",
            EntityKind::Individual       => "individual",
            EntityKind::Family           => "family",
            EntityKind::SampleProcessing => "sample_processing",
            EntityKind::Report           => "report",
            EntityKind::Case             => "case",
        }
    }

    /// Word used inside aliases, e.g. `TEST:analysis-A1`.
    pub fn alias_prefix(&self) -> &'static str {
        match self {
            EntityKind::FileSubmitted    => "file",
            EntityKind::Sample           => "sample",
            EntityKind::Individual       => "individual",
            EntityKind::Family           => "family",
            EntityKind::SampleProcessing => "analysis",
            EntityKind::Report           => "report",
            EntityKind::Case             => "case",
        }
    }

    /// Human-facing name for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::FileSubmitted    => "File",
            EntityKind::Sample           => "Sample",
            EntityKind::Individual       => "Individual",
            EntityKind::Family           => "Family",
            EntityKind::SampleProcessing => "Analysis",
            EntityKind::Report           => "Report",
            EntityKind::Case             => "Case",
        }
    }

    /// Collection segment of persisted identifiers.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::FileSubmitted    => "files-submitted",
            EntityKind::Sample           => "samples",
            EntityKind::Individual       => "individuals",
            EntityKind::Family           => "families",
            EntityKind::SampleProcessing => "sample-processings",
            EntityKind::Report           => "reports",
            EntityKind::Case             => "cases",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        EntityKind::POST_ORDER.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build `<project>:<kind>-<natural key>` with embedded whitespace removed.
pub fn make_alias(project: &str, kind: EntityKind, key: &str) -> String {
    let raw = format!("{}:{}-{}", project, kind.alias_prefix(), key);
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// A link to another entity: either an alias still pending resolution or an
/// identifier already assigned by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    Alias(String),
    Persisted(String),
}

impl Reference {
    pub fn alias(alias: impl Into<String>) -> Self {
        Reference::Alias(alias.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Reference::Alias(a) | Reference::Persisted(a) => a,
        }
    }

    /// The alias, if this reference has not been resolved yet.
    pub fn pending_alias(&self) -> Option<&str> {
        match self {
            Reference::Alias(a) => Some(a),
            Reference::Persisted(_) => None,
        }
    }

    pub fn resolve(&mut self, ids: &IdMap) {
        if let Reference::Alias(alias) = self {
            if let Some(id) = ids.get(alias.as_str()) {
                *self = Reference::Persisted(id.clone());
            }
        }
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Anything that holds links to other entities.
pub trait Linked {
    fn references_mut(&mut self) -> Vec<&mut Reference>;

    fn resolve_references(&mut self, ids: &IdMap) {
        for reference in self.references_mut() {
            reference.resolve(ids);
        }
    }

    /// Aliases still waiting for an identifier.
    fn pending_aliases(&mut self) -> Vec<String> {
        self.references_mut()
            .into_iter()
            .filter_map(|r| r.pending_alias().map(str::to_string))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Sub-objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhenotypicFeature {
    pub phenotypic_feature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disorder {
    pub disorder: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_primary_diagnosis: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedFile {
    pub relationship_type: String,
    pub file: Reference,
}

pub const PAIRED_WITH: &str = "paired with";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraFile {
    pub filename: String,
    pub file_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtherSpecimenId {
    pub id_type: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Requisition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_rejected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrective_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_taken_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Requisition {
    pub fn is_empty(&self) -> bool {
        *self == Requisition::default()
    }
}

// ---------------------------------------------------------------------------
// Individual
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Individual {
    #[serde(skip)]
    pub alias: String,
    pub individual_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ancestry: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub life_status: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disorders: Vec<Disorder>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub phenotypic_features: Vec<PhenotypicFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mother: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub father: Option<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<Reference>,
    /// Pedigree-mode proband flag; recorded on the family, never persisted here.
    #[serde(skip)]
    pub proband: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Linked for Individual {
    fn references_mut(&mut self) -> Vec<&mut Reference> {
        let mut refs: Vec<&mut Reference> = self.samples.iter_mut().collect();
        refs.extend(self.mother.as_mut());
        refs.extend(self.father.as_mut());
        refs
    }
}

// ---------------------------------------------------------------------------
// Family
// ---------------------------------------------------------------------------

/// Transient relation slots gathered from accessioning rows. Propagated onto
/// individuals at finalization and never persisted on the family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyRelations {
    pub mother: Option<Reference>,
    pub father: Option<Reference>,
    pub siblings: Vec<Reference>,
}

impl FamilyRelations {
    pub fn is_empty(&self) -> bool {
        self.mother.is_none() && self.father.is_none() && self.siblings.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Family {
    #[serde(skip)]
    pub alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proband: Option<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub family_phenotypic_features: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ingestion_ids: Vec<String>,
    #[serde(skip)]
    pub relations: FamilyRelations,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Linked for Family {
    fn references_mut(&mut self) -> Vec<&mut Reference> {
        let mut refs: Vec<&mut Reference> = self.members.iter_mut().collect();
        refs.extend(self.proband.as_mut());
        refs
    }
}

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sample {
    #[serde(skip)]
    pub alias: String,
    pub specimen_accession: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workup_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requisition: Option<Requisition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub other_specimen_ids: Vec<OtherSpecimenId>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Linked for Sample {
    fn references_mut(&mut self) -> Vec<&mut Reference> {
        self.files.iter_mut().collect()
    }
}

// ---------------------------------------------------------------------------
// Analysis (sample processing)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleProcessing {
    #[serde(skip)]
    pub alias: String,
    pub analysis_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub families: Vec<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Reference>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Linked for SampleProcessing {
    fn references_mut(&mut self) -> Vec<&mut Reference> {
        self.samples
            .iter_mut()
            .chain(self.families.iter_mut())
            .chain(self.files.iter_mut())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Submitted file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileSubmitted {
    #[serde(skip)]
    pub alias: String,
    pub filename: String,
    pub file_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genome_build: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paired_end: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_files: Vec<RelatedFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_files: Vec<ExtraFile>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl FileSubmitted {
    /// Distinct "paired with" targets recorded on this file.
    pub fn paired_targets(&self) -> Vec<&Reference> {
        let mut targets: Vec<&Reference> = self
            .related_files
            .iter()
            .filter(|r| r.relationship_type == PAIRED_WITH)
            .map(|r| &r.file)
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }
}

impl Linked for FileSubmitted {
    fn references_mut(&mut self) -> Vec<&mut Reference> {
        self.related_files.iter_mut().map(|r| &mut r.file).collect()
    }
}

// ---------------------------------------------------------------------------
// Case / Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    #[serde(skip)]
    pub alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    pub sample_processing: Reference,
    pub individual: Reference,
    pub family: Reference,
    pub sample: Reference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ingestion_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Linked for Case {
    fn references_mut(&mut self) -> Vec<&mut Reference> {
        let mut refs = vec![
            &mut self.sample_processing,
            &mut self.individual,
            &mut self.family,
            &mut self.sample,
        ];
        refs.extend(self.report.as_mut());
        refs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    #[serde(skip)]
    pub alias: String,
    pub description: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Linked for Report {
    fn references_mut(&mut self) -> Vec<&mut Reference> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Tagged union
// ---------------------------------------------------------------------------

/// Project and institution stamped onto every emitted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionScope {
    pub project: String,
    pub institution: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    FileSubmitted(FileSubmitted),
    Sample(Sample),
    Individual(Individual),
    Family(Family),
    SampleProcessing(SampleProcessing),
    Report(Report),
    Case(Case),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::FileSubmitted(_)    => EntityKind::FileSubmitted,
            Entity::Sample(_)           => EntityKind::Sample,
            Entity::Individual(_)       => EntityKind::Individual,
            Entity::Family(_)           => EntityKind::Family,
            Entity::SampleProcessing(_) => EntityKind::SampleProcessing,
            Entity::Report(_)           => EntityKind::Report,
            Entity::Case(_)             => EntityKind::Case,
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            Entity::FileSubmitted(e)    => &e.alias,
            Entity::Sample(e)           => &e.alias,
            Entity::Individual(e)       => &e.alias,
            Entity::Family(e)           => &e.alias,
            Entity::SampleProcessing(e) => &e.alias,
            Entity::Report(e)           => &e.alias,
            Entity::Case(e)             => &e.alias,
        }
    }

    /// Serialize into the item shape sent to the repository: aliases,
    /// project and institution stamped in, empty values dropped.
    pub fn to_properties(&self, scope: &SubmissionScope) -> Result<Map<String, Value>> {
        let value = match self {
            Entity::FileSubmitted(e)    => serde_json::to_value(e)?,
            Entity::Sample(e)           => serde_json::to_value(e)?,
            Entity::Individual(e)       => serde_json::to_value(e)?,
            Entity::Family(e)           => serde_json::to_value(e)?,
            Entity::SampleProcessing(e) => serde_json::to_value(e)?,
            Entity::Report(e)           => serde_json::to_value(e)?,
            Entity::Case(e)             => serde_json::to_value(e)?,
        };
        let mut props = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        props.insert("aliases".to_string(), Value::Array(vec![Value::String(self.alias().to_string())]));
        props.insert("project".to_string(), Value::String(scope.project.clone()));
        props.insert("institution".to_string(), Value::String(scope.institution.clone()));
        prune_empty(&mut props);
        Ok(props)
    }
}

impl Linked for Entity {
    fn references_mut(&mut self) -> Vec<&mut Reference> {
        match self {
            Entity::FileSubmitted(e)    => e.references_mut(),
            Entity::Sample(e)           => e.references_mut(),
            Entity::Individual(e)       => e.references_mut(),
            Entity::Family(e)           => e.references_mut(),
            Entity::SampleProcessing(e) => e.references_mut(),
            Entity::Report(e)           => e.references_mut(),
            Entity::Case(e)             => e.references_mut(),
        }
    }
}

/// Remove null, empty-string, empty-array and empty-object values, recursively.
pub fn prune_empty(map: &mut Map<String, Value>) {
    for value in map.values_mut() {
        prune_value(value);
    }
    map.retain(|_, v| !is_empty_value(v));
}

fn prune_value(value: &mut Value) {
    match value {
        Value::Object(inner) => prune_empty(inner),
        Value::Array(items) => {
            items.iter_mut().for_each(prune_value);
            items.retain(|v| !is_empty_value(v));
        }
        _ => {}
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> SubmissionScope {
        SubmissionScope { project: "TEST".into(), institution: "hms".into() }
    }

    #[test]
    fn test_alias_strips_whitespace() {
        assert_eq!(make_alias("TEST", EntityKind::Individual, "IND 1 "), "TEST:individual-IND1");
        assert_eq!(make_alias("TEST", EntityKind::SampleProcessing, "A1"), "TEST:analysis-A1");
    }

    #[test]
    fn test_post_order_matches_ordering() {
        let mut kinds = EntityKind::POST_ORDER.to_vec();
        kinds.sort();
        assert_eq!(kinds, EntityKind::POST_ORDER.to_vec());
        assert_eq!(EntityKind::parse("sample_processing"), Some(EntityKind::SampleProcessing));
        assert_eq!(EntityKind::parse("gene"), None);
    }

    #[test]
    fn test_reference_resolution() {
        let mut ids = IdMap::new();
        ids.insert("TEST:sample-S1-WGS".into(), "/samples/abc/".into());

        let mut individual = Individual {
            alias: "TEST:individual-IND1".into(),
            individual_id: "IND1".into(),
            samples: vec![Reference::alias("TEST:sample-S1-WGS")],
            mother: Some(Reference::alias("TEST:individual-IND2")),
            ..Default::default()
        };
        individual.resolve_references(&ids);

        assert_eq!(individual.samples, vec![Reference::Persisted("/samples/abc/".into())]);
        assert_eq!(individual.pending_aliases(), vec!["TEST:individual-IND2".to_string()]);
    }

    #[test]
    fn test_properties_are_stamped_and_pruned() {
        let mut extra = Extra::new();
        extra.insert("age".into(), json!(""));
        extra.insert("birth_year".into(), json!(1990));
        let entity = Entity::Individual(Individual {
            alias: "TEST:individual-IND1".into(),
            individual_id: "IND1".into(),
            sex: Some("F".into()),
            extra,
            ..Default::default()
        });

        let props = entity.to_properties(&scope()).unwrap();
        assert_eq!(props["project"], json!("TEST"));
        assert_eq!(props["institution"], json!("hms"));
        assert_eq!(props["aliases"], json!(["TEST:individual-IND1"]));
        assert_eq!(props["birth_year"], json!(1990));
        assert!(!props.contains_key("age"));
        assert!(!props.contains_key("samples"));
    }

    #[test]
    fn test_paired_targets_are_distinct() {
        let file = FileSubmitted {
            related_files: vec![
                RelatedFile { relationship_type: PAIRED_WITH.into(), file: Reference::alias("a") },
                RelatedFile { relationship_type: PAIRED_WITH.into(), file: Reference::alias("a") },
                RelatedFile { relationship_type: "derived from".into(), file: Reference::alias("b") },
            ],
            ..Default::default()
        };
        assert_eq!(file.paired_targets(), vec![&Reference::alias("a")]);
    }
}
