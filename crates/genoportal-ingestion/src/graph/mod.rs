//! The submission graph: every entity of one submission, keyed by alias.
//!
//! Rows are folded in strictly in sheet order. Relationship propagation,
//! analysis types, pedigree checks and case synthesis wait for the
//! `finalize_*` pass, since they depend on the fully merged state.

pub mod cases;
pub mod merge;
pub mod relations;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use genoportal_common::entities::{
    Case, Entity, Family, FileSubmitted, Individual, Report, Sample, SampleProcessing,
};
use genoportal_common::SubmissionConfig;

use crate::rows::RowEntities;
use cases::CaseSeed;
use merge::{Conflict, Merge};

/// Per-analysis inputs to the analysis type.
#[derive(Debug, Default)]
struct AnalysisContribution {
    relations: BTreeSet<String>,
    workups: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct SubmissionGraph {
    pub individuals: BTreeMap<String, Individual>,
    pub families: BTreeMap<String, Family>,
    pub samples: BTreeMap<String, Sample>,
    pub analyses: BTreeMap<String, SampleProcessing>,
    pub files: BTreeMap<String, FileSubmitted>,
    pub cases: BTreeMap<String, Case>,
    pub reports: BTreeMap<String, Report>,
    /// alias → row that first introduced it.
    origin_rows: BTreeMap<String, usize>,
    /// sample alias → owning individual alias.
    sample_owner: BTreeMap<String, String>,
    contributions: BTreeMap<String, AnalysisContribution>,
    case_seeds: BTreeMap<(String, String), CaseSeed>,
    errors: Vec<String>,
}

fn merge_entity<T: Merge>(
    map: &mut BTreeMap<String, T>,
    origin_rows: &mut BTreeMap<String, usize>,
    errors: &mut Vec<String>,
    row: usize,
    entity: T,
) {
    let alias = entity.alias().to_string();
    match map.get_mut(&alias) {
        Some(existing) => {
            for conflict in existing.merge(entity) {
                errors.push(conflict_message(row, &alias, &conflict));
            }
        }
        None => {
            debug!(alias = %alias, row, "New entity");
            origin_rows.entry(alias.clone()).or_insert(row);
            map.insert(alias, entity);
        }
    }
}

fn conflict_message(row: usize, alias: &str, conflict: &Conflict) -> String {
    format!(
        "Row {} - conflicting {} for {}: {} vs {}",
        row, conflict.field, alias, conflict.existing, conflict.incoming
    )
}

impl SubmissionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn origin_rows(&self) -> &BTreeMap<String, usize> {
        &self.origin_rows
    }

    /// Row that first introduced `alias`.
    pub fn origin_row(&self, alias: &str) -> Option<usize> {
        self.origin_rows.get(alias).copied()
    }

    /// Fold one extracted row and the files resolved from its file cells.
    pub fn add_row(&mut self, entities: RowEntities, files: Vec<FileSubmitted>) {
        let RowEntities { row, individual, family, relation, accession, errors } = entities;
        self.errors.extend(errors);

        let individual_alias = individual.alias.clone();
        let individual_id = individual.individual_id.clone();
        let family_alias = family.alias.clone();
        merge_entity(&mut self.individuals, &mut self.origin_rows, &mut self.errors, row, individual);
        merge_entity(&mut self.families, &mut self.origin_rows, &mut self.errors, row, family);

        for file in files {
            merge_entity(&mut self.files, &mut self.origin_rows, &mut self.errors, row, file);
        }

        let Some(accession) = accession else {
            return;
        };
        let sample_alias = accession.sample.alias.clone();
        let analysis_alias = accession.analysis.alias.clone();

        match self.sample_owner.get(&sample_alias) {
            Some(owner) if *owner != individual_alias => {
                let conflict = Conflict {
                    field: "individual",
                    existing: owner.clone(),
                    incoming: individual_alias.clone(),
                };
                self.errors.push(conflict_message(row, &sample_alias, &conflict));
            }
            Some(_) => {}
            None => {
                self.sample_owner.insert(sample_alias.clone(), individual_alias.clone());
            }
        }

        let contribution = self.contributions.entry(analysis_alias.clone()).or_default();
        if let Some(relation) = &relation {
            contribution.relations.insert(relation.label());
        }
        contribution.workups.extend(accession.workup.clone());

        let seed = CaseSeed {
            row,
            analysis_id: accession.analysis.analysis_id.clone(),
            analysis: analysis_alias.clone(),
            sample: sample_alias.clone(),
            specimen: accession.sample.specimen_accession.clone(),
            workup: accession.workup.clone(),
            individual: individual_alias,
            individual_id,
            family: family_alias,
            case_id: accession.case.case_id.clone(),
            report_required: accession.case.report_required,
        };
        match self.case_seeds.get_mut(&(analysis_alias.clone(), sample_alias.clone())) {
            Some(existing) => existing.absorb(seed),
            None => {
                self.case_seeds.insert((analysis_alias, sample_alias), seed);
            }
        }

        merge_entity(&mut self.samples, &mut self.origin_rows, &mut self.errors, row, accession.sample);
        merge_entity(&mut self.analyses, &mut self.origin_rows, &mut self.errors, row, accession.analysis);
    }

    /// Accessioning post-processing: parents onto children, analysis types,
    /// cases and reports.
    pub fn finalize_accessioning(&mut self, project: &str, ingestion_id: &str) {
        for (individual, conflict) in relations::add_individual_relations(&mut self.families, &mut self.individuals) {
            let row = self.origin_row(&individual).unwrap_or_default();
            self.errors.push(conflict_message(row, &individual, &conflict));
        }

        for (alias, contribution) in &self.contributions {
            if let Some(analysis) = self.analyses.get_mut(alias) {
                analysis.analysis_type = relations::analysis_type(&contribution.relations, &contribution.workups);
                debug!(analysis = %alias, analysis_type = ?analysis.analysis_type, "Derived analysis type");
            }
        }

        let (cases, reports) = cases::synthesize(project, ingestion_id, &self.case_seeds);
        for (row, case) in cases {
            merge_entity(&mut self.cases, &mut self.origin_rows, &mut self.errors, row, case);
        }
        for (row, report) in reports {
            merge_entity(&mut self.reports, &mut self.origin_rows, &mut self.errors, row, report);
        }
        self.tag_families(ingestion_id);
    }

    /// Family-history post-processing: parents must be submitted too, and
    /// each family gets its pooled phenotypes.
    pub fn finalize_pedigree(&mut self, config: &SubmissionConfig, ingestion_id: &str) {
        for (child, field, parent) in relations::missing_parents(&self.individuals) {
            let row = self.origin_row(&child).unwrap_or_default();
            self.errors.push(format!(
                "Row {} - {} {} of {} is not in this family history",
                row, field, parent, child
            ));
        }

        let pooled: Vec<(String, Vec<String>)> = self
            .families
            .values()
            .map(|family| {
                let terms = relations::pooled_phenotypes(family, &self.individuals, config.max_family_phenotypes);
                (family.alias.clone(), terms)
            })
            .collect();
        for (alias, terms) in pooled {
            if let Some(family) = self.families.get_mut(&alias) {
                family.family_phenotypic_features = terms;
            }
        }
        self.tag_families(ingestion_id);
    }

    fn tag_families(&mut self, ingestion_id: &str) {
        for family in self.families.values_mut() {
            if !family.ingestion_ids.iter().any(|id| id == ingestion_id) {
                family.ingestion_ids.push(ingestion_id.to_string());
            }
        }
    }

    /// Every entity, in creation order of kinds and alias order within a kind.
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities = Vec::new();
        entities.extend(self.files.values().cloned().map(Entity::FileSubmitted));
        entities.extend(self.samples.values().cloned().map(Entity::Sample));
        entities.extend(self.individuals.values().cloned().map(Entity::Individual));
        entities.extend(self.families.values().cloned().map(Entity::Family));
        entities.extend(self.analyses.values().cloned().map(Entity::SampleProcessing));
        entities.extend(self.reports.values().cloned().map(Entity::Report));
        entities.extend(self.cases.values().cloned().map(Entity::Case));
        info!(
            individuals = self.individuals.len(),
            families = self.families.len(),
            samples = self.samples.len(),
            analyses = self.analyses.len(),
            files = self.files.len(),
            cases = self.cases.len(),
            "Submission graph assembled"
        );
        entities
    }
}
