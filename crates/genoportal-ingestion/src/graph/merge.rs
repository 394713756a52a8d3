//! Cross-row merge rules.
//!
//! Scalars: first writer wins. Lists: set union, order of first appearance.
//! Single links that must agree (parents, proband): a differing second value
//! is a conflict and the first value is kept.

use genoportal_common::entities::{
    Case, Extra, Family, FileSubmitted, Individual, Report, Sample, SampleProcessing,
};
use genoportal_common::Reference;
use serde_json::Value;

/// Two rows disagree on a value that cannot hold both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub field: &'static str,
    pub existing: String,
    pub incoming: String,
}

pub trait Merge {
    fn alias(&self) -> &str;

    /// Fold `incoming` into `self`, returning every conflict found.
    fn merge(&mut self, incoming: Self) -> Vec<Conflict>;
}

pub fn union<T: PartialEq>(into: &mut Vec<T>, from: Vec<T>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

fn first_writer<T>(into: &mut Option<T>, from: Option<T>) {
    if into.is_none() {
        *into = from;
    }
}

/// Merge a link that may only take one value.
pub fn merge_link(
    field: &'static str,
    into: &mut Option<Reference>,
    from: Option<Reference>,
    conflicts: &mut Vec<Conflict>,
) {
    match (into.as_ref(), from) {
        (_, None) => {}
        (None, Some(incoming)) => *into = Some(incoming),
        (Some(existing), Some(incoming)) if *existing != incoming => conflicts.push(Conflict {
            field,
            existing: existing.as_str().to_string(),
            incoming: incoming.as_str().to_string(),
        }),
        _ => {}
    }
}

/// Merge a link every instance carries; the first value is kept.
fn merge_required_link(field: &'static str, into: &Reference, from: Reference, conflicts: &mut Vec<Conflict>) {
    if *into != from {
        conflicts.push(Conflict {
            field,
            existing: into.as_str().to_string(),
            incoming: from.as_str().to_string(),
        });
    }
}

fn merge_extra(into: &mut Extra, from: Extra) {
    for (key, value) in from {
        match (into.get_mut(&key), value) {
            (None, value) => {
                into.insert(key, value);
            }
            (Some(Value::Array(existing)), Value::Array(incoming)) => union(existing, incoming),
            _ => {}
        }
    }
}

impl Merge for Individual {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn merge(&mut self, incoming: Self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        first_writer(&mut self.sex, incoming.sex);
        first_writer(&mut self.life_status, incoming.life_status);
        union(&mut self.ancestry, incoming.ancestry);
        union(&mut self.disorders, incoming.disorders);
        union(&mut self.phenotypic_features, incoming.phenotypic_features);
        union(&mut self.samples, incoming.samples);
        merge_link("mother", &mut self.mother, incoming.mother, &mut conflicts);
        merge_link("father", &mut self.father, incoming.father, &mut conflicts);
        self.proband = match (self.proband, incoming.proband) {
            (Some(a), Some(b)) => Some(a || b),
            (a, b) => a.or(b),
        };
        merge_extra(&mut self.extra, incoming.extra);
        conflicts
    }
}

impl Merge for Family {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn merge(&mut self, incoming: Self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        first_writer(&mut self.family_id, incoming.family_id);
        union(&mut self.members, incoming.members);
        merge_link("proband", &mut self.proband, incoming.proband, &mut conflicts);
        union(&mut self.family_phenotypic_features, incoming.family_phenotypic_features);
        union(&mut self.ingestion_ids, incoming.ingestion_ids);
        merge_link("mother", &mut self.relations.mother, incoming.relations.mother, &mut conflicts);
        merge_link("father", &mut self.relations.father, incoming.relations.father, &mut conflicts);
        union(&mut self.relations.siblings, incoming.relations.siblings);
        merge_extra(&mut self.extra, incoming.extra);
        conflicts
    }
}

impl Merge for Sample {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn merge(&mut self, incoming: Self) -> Vec<Conflict> {
        first_writer(&mut self.workup_type, incoming.workup_type);
        first_writer(&mut self.requisition, incoming.requisition);
        union(&mut self.files, incoming.files);
        union(&mut self.other_specimen_ids, incoming.other_specimen_ids);
        merge_extra(&mut self.extra, incoming.extra);
        Vec::new()
    }
}

impl Merge for SampleProcessing {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn merge(&mut self, incoming: Self) -> Vec<Conflict> {
        union(&mut self.samples, incoming.samples);
        union(&mut self.families, incoming.families);
        union(&mut self.files, incoming.files);
        // Derived; the most recent computation replaces the old one.
        if incoming.analysis_type.is_some() {
            self.analysis_type = incoming.analysis_type;
        }
        merge_extra(&mut self.extra, incoming.extra);
        Vec::new()
    }
}

impl Merge for FileSubmitted {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn merge(&mut self, incoming: Self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        first_writer(&mut self.genome_build, incoming.genome_build);
        first_writer(&mut self.variant_type, incoming.variant_type);
        first_writer(&mut self.paired_end, incoming.paired_end);

        let before = self.related_files.clone();
        union(&mut self.related_files, incoming.related_files);
        let targets: Vec<String> = self.paired_targets().iter().map(|r| r.as_str().to_string()).collect();
        if targets.len() > 1 {
            conflicts.push(Conflict {
                field: "paired file",
                existing: targets[0].clone(),
                incoming: targets[1..].join(", "),
            });
            self.related_files = before;
        }

        union(&mut self.extra_files, incoming.extra_files);
        merge_extra(&mut self.extra, incoming.extra);
        conflicts
    }
}

impl Merge for Case {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn merge(&mut self, incoming: Self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        merge_required_link("sample", &self.sample, incoming.sample, &mut conflicts);
        merge_required_link("individual", &self.individual, incoming.individual, &mut conflicts);
        merge_required_link("analysis", &self.sample_processing, incoming.sample_processing, &mut conflicts);
        merge_required_link("family", &self.family, incoming.family, &mut conflicts);
        first_writer(&mut self.case_id, incoming.case_id);
        first_writer(&mut self.report, incoming.report);
        union(&mut self.ingestion_ids, incoming.ingestion_ids);
        merge_extra(&mut self.extra, incoming.extra);
        conflicts
    }
}

impl Merge for Report {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn merge(&mut self, incoming: Self) -> Vec<Conflict> {
        merge_extra(&mut self.extra, incoming.extra);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genoportal_common::entities::{RelatedFile, PAIRED_WITH};
    use serde_json::json;

    #[test]
    fn test_scalars_first_writer_lists_union() {
        let mut first = Individual {
            alias: "TEST:individual-IND1".into(),
            sex: Some("F".into()),
            samples: vec![Reference::alias("s1")],
            ..Default::default()
        };
        let second = Individual {
            alias: "TEST:individual-IND1".into(),
            sex: Some("M".into()),
            life_status: Some("alive".into()),
            samples: vec![Reference::alias("s2"), Reference::alias("s1")],
            ..Default::default()
        };
        assert!(first.merge(second).is_empty());
        assert_eq!(first.sex.as_deref(), Some("F"));
        assert_eq!(first.life_status.as_deref(), Some("alive"));
        assert_eq!(first.samples, vec![Reference::alias("s1"), Reference::alias("s2")]);
    }

    #[test]
    fn test_family_mother_conflict() {
        let mut family = Family { alias: "TEST:family-A1".into(), ..Default::default() };
        family.relations.mother = Some(Reference::alias("TEST:individual-IND2"));
        let mut other = Family { alias: "TEST:family-A1".into(), ..Default::default() };
        other.relations.mother = Some(Reference::alias("TEST:individual-IND9"));

        let conflicts = family.merge(other);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "mother");
        assert_eq!(family.relations.mother, Some(Reference::alias("TEST:individual-IND2")));
    }

    #[test]
    fn test_analysis_type_is_replaced() {
        let mut analysis = SampleProcessing { analysis_type: Some("WGS".into()), ..Default::default() };
        analysis.merge(SampleProcessing { analysis_type: Some("WGS-Trio".into()), ..Default::default() });
        assert_eq!(analysis.analysis_type.as_deref(), Some("WGS-Trio"));
        analysis.merge(SampleProcessing::default());
        assert_eq!(analysis.analysis_type.as_deref(), Some("WGS-Trio"));
    }

    #[test]
    fn test_second_pairing_target_is_conflict() {
        let paired = |target: &str| RelatedFile {
            relationship_type: PAIRED_WITH.into(),
            file: Reference::alias(target),
        };
        let mut file = FileSubmitted { related_files: vec![paired("b")], ..Default::default() };
        let conflicts = file.merge(FileSubmitted { related_files: vec![paired("c")], ..Default::default() });
        assert_eq!(conflicts.len(), 1);
        assert_eq!(file.paired_targets(), vec![&Reference::alias("b")]);

        assert!(file.merge(FileSubmitted { related_files: vec![paired("b")], ..Default::default() }).is_empty());
    }

    #[test]
    fn test_case_sample_conflict_keeps_first() {
        let case = |sample: &str| Case {
            alias: "TEST:case-C1".into(),
            case_id: Some("C1".into()),
            sample_processing: Reference::alias("TEST:analysis-A1"),
            individual: Reference::alias("TEST:individual-IND1"),
            family: Reference::alias("TEST:family-A1"),
            sample: Reference::alias(sample),
            report: None,
            ingestion_ids: vec!["ing-1".into()],
            extra: Extra::new(),
        };
        let mut first = case("TEST:sample-S1-WGS");
        let conflicts = first.merge(case("TEST:sample-S2-WGS"));
        assert_eq!(
            conflicts,
            vec![Conflict {
                field: "sample",
                existing: "TEST:sample-S1-WGS".into(),
                incoming: "TEST:sample-S2-WGS".into(),
            }]
        );
        assert_eq!(first.sample, Reference::alias("TEST:sample-S1-WGS"));
        assert!(first.merge(case("TEST:sample-S1-WGS")).is_empty());
    }

    #[test]
    fn test_extra_arrays_union() {
        let mut sample = Sample::default();
        sample.extra.insert("tags".into(), json!(["a"]));
        sample.extra.insert("notes".into(), json!("first"));
        let mut incoming = Sample::default();
        incoming.extra.insert("tags".into(), json!(["b", "a"]));
        incoming.extra.insert("notes".into(), json!("second"));
        sample.merge(incoming);
        assert_eq!(sample.extra["tags"], json!(["a", "b"]));
        assert_eq!(sample.extra["notes"], json!("first"));
    }
}
