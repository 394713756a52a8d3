//! Row extraction: one framed row → per-entity pieces plus row errors.
//!
//! Two flavours share the column tables in `mapping`:
//! - `accessioning`: individual, family, sample, analysis, files, case seed
//! - `pedigree`: individual and family only, with parents and proband flag

pub mod accessioning;
pub mod mapping;
pub mod pedigree;

use genoportal_common::entities::{
    make_alias, Disorder, Family, Individual, PhenotypicFeature, SampleProcessing, Sample,
};
use genoportal_common::{EntityKind, Reference, SubmissionConfig, SubmissionType};
use thiserror::Error;

use crate::models::FramedRow;
use crate::normalise::{abbreviate, parse_terms, split_list, OntologyKind};

/// The row is missing required columns and was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Row {row} - missing required field(s) {}", .missing.join(", "))]
pub struct RowError {
    pub row: usize,
    pub missing: Vec<String>,
}

/// Relation-to-proband vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relation {
    Proband,
    Mother,
    Father,
    Sibling,
    /// Anything else; must already be on record through family history.
    Other(String),
}

impl Relation {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "proband" => Relation::Proband,
            "mother" => Relation::Mother,
            "father" => Relation::Father,
            "sibling" | "sib" | "brother" | "sister" | "full sibling" | "full brother"
            | "full sister" => Relation::Sibling,
            _ => Relation::Other(raw.trim().to_string()),
        }
    }

    /// Lower-case name used when deriving the analysis type.
    pub fn label(&self) -> String {
        match self {
            Relation::Proband  => "proband".to_string(),
            Relation::Mother   => "mother".to_string(),
            Relation::Father   => "father".to_string(),
            Relation::Sibling  => "sibling".to_string(),
            Relation::Other(s) => s.to_lowercase(),
        }
    }
}

/// Which entity a file cell attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLevel {
    Sample,
    Analysis,
}

/// A raw file cell awaiting resolution, with the row's build and variant type.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCell {
    pub level: FileLevel,
    pub cell: String,
    pub genome_build: Option<String>,
    pub variant_type: Option<String>,
}

/// Row inputs to the case synthesised after all rows are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseSeed {
    pub case_id: Option<String>,
    pub report_required: bool,
}

/// The sample-side entities of an accessioning row.
#[derive(Debug, Clone, PartialEq)]
pub struct Accession {
    pub sample: Sample,
    pub analysis: SampleProcessing,
    /// Upper-cased workup type, if the row gave one.
    pub workup: Option<String>,
    pub case: CaseSeed,
    pub file_cells: Vec<FileCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowEntities {
    pub row: usize,
    pub individual: Individual,
    pub family: Family,
    /// Accessioning only.
    pub relation: Option<Relation>,
    /// Accessioning only.
    pub accession: Option<Accession>,
    /// Non-fatal problems; the entities above are still usable.
    pub errors: Vec<String>,
}

pub struct RowExtractor<'a> {
    project: String,
    config: &'a SubmissionConfig,
    submission_type: SubmissionType,
}

impl<'a> RowExtractor<'a> {
    pub fn new(project: impl Into<String>, config: &'a SubmissionConfig, submission_type: SubmissionType) -> Self {
        Self { project: project.into(), config, submission_type }
    }

    pub fn alias(&self, kind: EntityKind, key: &str) -> String {
        make_alias(&self.project, kind, key)
    }

    pub fn reference(&self, kind: EntityKind, key: &str) -> Reference {
        Reference::alias(self.alias(kind, key))
    }

    pub fn config(&self) -> &SubmissionConfig {
        self.config
    }

    pub fn extract(&self, row: &FramedRow) -> Result<RowEntities, RowError> {
        let missing: Vec<String> = self
            .config
            .required_columns(self.submission_type)
            .iter()
            .filter(|column| !row.has(column))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RowError { row: row.number, missing });
        }

        Ok(match self.submission_type {
            SubmissionType::Accessioning  => accessioning::extract(self, row),
            SubmissionType::FamilyHistory => pedigree::extract(self, row),
        })
    }

    /// Individual fields common to both flavours. `individual id` is
    /// guaranteed present by the required-column check.
    fn individual(&self, row: &FramedRow, errors: &mut Vec<String>) -> Individual {
        let individual_id = row.get("individual id").unwrap_or_default().to_string();
        let mut individual = Individual {
            alias: self.alias(EntityKind::Individual, &individual_id),
            individual_id,
            sex: row.get("sex").map(abbreviate),
            life_status: row.get("life status").map(|s| s.to_lowercase()),
            ancestry: row
                .get("ancestry")
                .or_else(|| row.get("race"))
                .map(split_list)
                .unwrap_or_default(),
            ..Default::default()
        };

        if let Some(cell) = row.get("hpo terms") {
            let (valid, invalid) = parse_terms(cell, OntologyKind::Phenotype);
            report_invalid_terms(row.number, OntologyKind::Phenotype, &invalid, errors);
            individual.phenotypic_features = valid
                .into_iter()
                .map(|phenotypic_feature| PhenotypicFeature { phenotypic_feature })
                .collect();
        }

        let primary = row.get("primary diagnosis").map(|cell| {
            let (valid, invalid) = parse_terms(cell, OntologyKind::Disorder);
            report_invalid_terms(row.number, OntologyKind::Disorder, &invalid, errors);
            valid
        });
        for disorder in primary.iter().flatten() {
            individual.disorders.push(Disorder { disorder: disorder.clone(), is_primary_diagnosis: true });
        }
        if let Some(cell) = row.get("mondo terms") {
            let (valid, invalid) = parse_terms(cell, OntologyKind::Disorder);
            report_invalid_terms(row.number, OntologyKind::Disorder, &invalid, errors);
            for disorder in valid {
                if !individual.disorders.iter().any(|d| d.disorder == disorder) {
                    individual.disorders.push(Disorder { disorder, is_primary_diagnosis: false });
                }
            }
        }

        mapping::apply_columns(row, mapping::INDIVIDUAL_COLUMNS, &mut individual.extra);
        mapping::apply_additional_fields(row, self.config, EntityKind::Individual, &mut individual.extra);
        individual
    }
}

fn report_invalid_terms(row: usize, kind: OntologyKind, invalid: &[String], errors: &mut Vec<String>) {
    if !invalid.is_empty() {
        errors.push(format!("Row {} - invalid {} term(s) {}", row, kind.label(), invalid.join(", ")));
    }
}
