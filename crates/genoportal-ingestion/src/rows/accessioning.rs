//! Accessioning (case) rows.
//!
//! Each row describes one sample of one individual taken into one analysis.
//! The family is keyed by the analysis id; the relation column fills the
//! family's proband slot or its transient mother/father/sibling slots.

use genoportal_common::entities::{Family, OtherSpecimenId, Sample, SampleProcessing};
use genoportal_common::EntityKind;

use super::{mapping, Accession, CaseSeed, FileCell, FileLevel, Relation, RowEntities, RowExtractor};
use crate::models::FramedRow;
use crate::normalise::{is_truthy, split_list};

/// Natural sample key: specimen, upper-cased workup, optional test number.
fn sample_key(specimen: &str, workup: Option<&str>, test_number: Option<&str>) -> String {
    let mut key = specimen.to_string();
    for part in [workup, test_number].into_iter().flatten() {
        key.push('-');
        key.push_str(part);
    }
    key
}

/// `type:id` entries; an entry without a type is filed under `other`.
fn other_specimen_ids(cell: &str) -> Vec<OtherSpecimenId> {
    split_list(cell)
        .into_iter()
        .map(|entry| match entry.split_once(':') {
            Some((id_type, id)) if !id_type.trim().is_empty() => OtherSpecimenId {
                id_type: id_type.trim().to_string(),
                id: id.trim().to_string(),
            },
            _ => OtherSpecimenId { id_type: "other".to_string(), id: entry },
        })
        .collect()
}

pub(super) fn extract(extractor: &RowExtractor<'_>, row: &FramedRow) -> RowEntities {
    let config = extractor.config();
    let mut errors = Vec::new();
    let mut individual = extractor.individual(row, &mut errors);

    // Required columns, present by now.
    let analysis_id = row.get("analysis id").unwrap_or_default();
    let specimen = row.get("specimen id").unwrap_or_default();
    let relation = Relation::parse(row.get("relation to proband").unwrap_or_default());

    // ── Family ───────────────────────────────────────────────────────────────
    let individual_ref = extractor.reference(EntityKind::Individual, &individual.individual_id);
    let mut family = Family {
        alias: extractor.alias(EntityKind::Family, analysis_id),
        family_id: row.get("family id").map(str::to_string),
        members: vec![individual_ref.clone()],
        ..Default::default()
    };
    match &relation {
        Relation::Proband  => family.proband = Some(individual_ref),
        Relation::Mother   => family.relations.mother = Some(individual_ref),
        Relation::Father   => family.relations.father = Some(individual_ref),
        Relation::Sibling  => family.relations.siblings.push(individual_ref),
        Relation::Other(_) => {}
    }

    // ── Sample ───────────────────────────────────────────────────────────────
    let workup = row.get("workup type").map(|w| w.to_uppercase());
    if workup.is_none() {
        errors.push(format!("Row {} - missing workup type for specimen {}", row.number, specimen));
    }
    let key = sample_key(specimen, workup.as_deref(), row.get("test number"));
    let mut sample = Sample {
        alias: extractor.alias(EntityKind::Sample, &key),
        specimen_accession: specimen.to_string(),
        workup_type: workup.clone(),
        requisition: mapping::requisition(row),
        other_specimen_ids: row.get("other specimen ids").map(other_specimen_ids).unwrap_or_default(),
        ..Default::default()
    };
    if let Some(test_number) = row.get("test number") {
        sample.extra.insert("test_number".to_string(), test_number.into());
    }
    mapping::apply_columns(row, mapping::SAMPLE_COLUMNS, &mut sample.extra);
    mapping::apply_additional_fields(row, config, EntityKind::Sample, &mut sample.extra);
    individual.samples.push(extractor.reference(EntityKind::Sample, &key));

    // ── Analysis ─────────────────────────────────────────────────────────────
    let analysis = SampleProcessing {
        alias: extractor.alias(EntityKind::SampleProcessing, analysis_id),
        analysis_id: analysis_id.to_string(),
        samples: vec![extractor.reference(EntityKind::Sample, &key)],
        families: vec![extractor.reference(EntityKind::Family, analysis_id)],
        ..Default::default()
    };

    // ── Files ────────────────────────────────────────────────────────────────
    let genome_build = row.get("genome build").and_then(|raw| {
        let canonical = config.canonical_genome_build(raw);
        if canonical.is_none() {
            let accepted: Vec<&str> = config.genome_builds.values().map(String::as_str).collect();
            errors.push(format!(
                "Row {} - invalid genome build {}; accepted values are {}",
                row.number,
                raw,
                accepted.join(", ")
            ));
        }
        canonical
    });
    let variant_type = row.get("variant type").and_then(|raw| {
        let canonical = config.canonical_variant_type(raw);
        if canonical.is_none() {
            errors.push(format!(
                "Row {} - invalid variant type {}; accepted values are {}",
                row.number,
                raw,
                config.variant_types.join(", ")
            ));
        }
        canonical
    });
    let file_cells = [("files", FileLevel::Sample), ("case files", FileLevel::Analysis)]
        .into_iter()
        .filter_map(|(column, level)| {
            row.get(column).map(|cell| FileCell {
                level,
                cell: cell.to_string(),
                genome_build: genome_build.clone(),
                variant_type: variant_type.clone(),
            })
        })
        .collect();

    let case = CaseSeed {
        case_id: row.get("case id").map(str::to_string),
        report_required: row.get("report required").map(is_truthy).unwrap_or(false),
    };

    RowEntities {
        row: row.number,
        individual,
        family,
        relation: Some(relation),
        accession: Some(Accession { sample, analysis, workup, case, file_cells }),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genoportal_common::{Reference, SubmissionConfig, SubmissionType};
    use pretty_assertions::assert_eq;

    fn base(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut cells = vec![
            ("individual id", "IND1"),
            ("relation to proband", "Proband"),
            ("analysis id", "A1"),
            ("specimen id", "S1"),
            ("workup type", "wgs"),
        ];
        cells.extend_from_slice(extra);
        cells
    }

    fn extract_row(number: usize, cells: &[(&str, &str)]) -> RowEntities {
        let config = SubmissionConfig::default();
        RowExtractor::new("TEST", &config, SubmissionType::Accessioning)
            .extract(&FramedRow::from_pairs(number, cells))
            .unwrap()
    }

    #[test]
    fn test_proband_row() {
        let entities = extract_row(3, &base(&[("report required", "Y")]));
        let accession = entities.accession.unwrap();

        assert!(entities.errors.is_empty());
        assert_eq!(entities.family.alias, "TEST:family-A1");
        assert_eq!(entities.family.proband, Some(Reference::alias("TEST:individual-IND1")));
        assert_eq!(accession.sample.alias, "TEST:sample-S1-WGS");
        assert_eq!(entities.individual.samples, vec![Reference::alias("TEST:sample-S1-WGS")]);
        assert_eq!(accession.analysis.alias, "TEST:analysis-A1");
        assert_eq!(accession.analysis.families, vec![Reference::alias("TEST:family-A1")]);
        assert!(accession.case.report_required);
    }

    #[test]
    fn test_test_number_distinguishes_samples() {
        let entities = extract_row(3, &base(&[("test number", "2")]));
        assert_eq!(entities.accession.unwrap().sample.alias, "TEST:sample-S1-WGS-2");
    }

    #[test]
    fn test_relation_slots() {
        let mut cells = base(&[]);
        cells[1] = ("relation to proband", "Brother");
        let entities = extract_row(4, &cells);
        assert_eq!(entities.family.relations.siblings, vec![Reference::alias("TEST:individual-IND1")]);
        assert_eq!(entities.family.proband, None);
        assert_eq!(entities.relation, Some(Relation::Sibling));
    }

    #[test]
    fn test_missing_workup_is_collected() {
        let cells: Vec<_> = base(&[]).into_iter().filter(|(h, _)| *h != "workup type").collect();
        let entities = extract_row(5, &cells);
        assert_eq!(entities.errors.len(), 1);
        assert!(entities.errors[0].starts_with("Row 5 - missing workup type"));
        assert_eq!(entities.accession.unwrap().sample.alias, "TEST:sample-S1");
    }

    #[test]
    fn test_files_and_vocabularies() {
        let entities = extract_row(
            2,
            &base(&[
                ("files", "a_R1.fastq.gz, a_R2.fastq.gz"),
                ("case files", "a.vcf.gz"),
                ("genome build", "hg38"),
                ("variant type", "indel"),
            ]),
        );
        let accession = entities.accession.unwrap();

        assert_eq!(accession.file_cells.len(), 2);
        assert_eq!(accession.file_cells[0].level, FileLevel::Sample);
        assert_eq!(accession.file_cells[1].genome_build.as_deref(), Some("GRCh38"));
        assert_eq!(accession.file_cells[1].variant_type, None);
        assert_eq!(entities.errors.len(), 1);
        assert!(entities.errors[0].contains("invalid variant type indel"));
    }

    #[test]
    fn test_other_specimen_ids() {
        assert_eq!(
            other_specimen_ids("mrn: 123, 456"),
            vec![
                OtherSpecimenId { id_type: "mrn".into(), id: "123".into() },
                OtherSpecimenId { id_type: "other".into(), id: "456".into() },
            ]
        );
    }
}
