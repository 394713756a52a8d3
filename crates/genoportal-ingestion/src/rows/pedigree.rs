//! Family-history (pedigree) rows.
//!
//! One row per family member. Parents are given by individual id, with `0`
//! or a blank meaning "not in this pedigree".

use genoportal_common::entities::Family;
use genoportal_common::EntityKind;

use super::{RowEntities, RowExtractor};
use crate::models::FramedRow;
use crate::normalise::is_truthy;

/// Parent id cell, unless it is a "no parent" placeholder.
fn parent_id<'r>(row: &'r FramedRow, column: &str) -> Option<&'r str> {
    row.get(column).filter(|id| *id != "0")
}

pub(super) fn extract(extractor: &RowExtractor<'_>, row: &FramedRow) -> RowEntities {
    let mut errors = Vec::new();
    let mut individual = extractor.individual(row, &mut errors);
    let family_id = row.get("family id").unwrap_or_default();
    let individual_ref = extractor.reference(EntityKind::Individual, &individual.individual_id);

    individual.mother = parent_id(row, "mother id").map(|id| extractor.reference(EntityKind::Individual, id));
    individual.father = parent_id(row, "father id").map(|id| extractor.reference(EntityKind::Individual, id));
    if individual.mother.is_some() && individual.mother == individual.father {
        errors.push(format!(
            "Row {} - individual {} has the same mother and father",
            row.number, individual.individual_id
        ));
        individual.father = None;
    }

    let proband = row.get("proband").map(is_truthy);
    individual.proband = proband;

    let family = Family {
        alias: extractor.alias(EntityKind::Family, family_id),
        family_id: Some(family_id.to_string()),
        members: vec![individual_ref.clone()],
        proband: proband.filter(|p| *p).map(|_| individual_ref),
        ..Default::default()
    };

    RowEntities {
        row: row.number,
        individual,
        family,
        relation: None,
        accession: None,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genoportal_common::{Reference, SubmissionConfig, SubmissionType};

    #[test]
    fn test_pedigree_row() {
        let config = SubmissionConfig::default();
        let extractor = RowExtractor::new("TEST", &config, SubmissionType::FamilyHistory);
        let entities = extractor
            .extract(&FramedRow::from_pairs(
                3,
                &[
                    ("family id", "FAM1"),
                    ("individual id", "IND1"),
                    ("sex", "M"),
                    ("mother id", "IND2"),
                    ("father id", "0"),
                    ("proband", "Y"),
                    ("hpo terms", "HP:0000118"),
                ],
            ))
            .unwrap();

        assert!(entities.errors.is_empty());
        assert_eq!(entities.family.alias, "TEST:family-FAM1");
        assert_eq!(entities.family.family_id.as_deref(), Some("FAM1"));
        assert_eq!(entities.family.proband, Some(Reference::alias("TEST:individual-IND1")));
        assert_eq!(entities.individual.mother, Some(Reference::alias("TEST:individual-IND2")));
        assert_eq!(entities.individual.father, None);
        assert_eq!(entities.individual.proband, Some(true));
        assert!(entities.accession.is_none());
    }

    #[test]
    fn test_non_proband_leaves_slot_empty() {
        let config = SubmissionConfig::default();
        let extractor = RowExtractor::new("TEST", &config, SubmissionType::FamilyHistory);
        let entities = extractor
            .extract(&FramedRow::from_pairs(4, &[("family id", "FAM1"), ("individual id", "IND2"), ("sex", "F"), ("proband", "N")]))
            .unwrap();
        assert_eq!(entities.family.proband, None);
        assert_eq!(entities.individual.proband, Some(false));
    }

    #[test]
    fn test_same_parent_twice_is_rejected() {
        let config = SubmissionConfig::default();
        let extractor = RowExtractor::new("TEST", &config, SubmissionType::FamilyHistory);
        let entities = extractor
            .extract(&FramedRow::from_pairs(
                5,
                &[
                    ("family id", "FAM1"),
                    ("individual id", "IND3"),
                    ("sex", "F"),
                    ("mother id", "IND2"),
                    ("father id", "IND2"),
                ],
            ))
            .unwrap();
        assert_eq!(entities.errors.len(), 1);
        assert_eq!(entities.individual.father, None);
    }
}
