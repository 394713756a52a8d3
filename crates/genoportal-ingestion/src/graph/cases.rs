//! Case and report synthesis.

use std::collections::BTreeMap;

use genoportal_common::entities::{make_alias, Case, Extra, Report};
use genoportal_common::{EntityKind, Reference};

/// Everything the rows said about one (analysis, sample) pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSeed {
    pub row: usize,
    pub analysis_id: String,
    pub analysis: String,
    pub sample: String,
    pub specimen: String,
    pub workup: Option<String>,
    pub individual: String,
    pub individual_id: String,
    pub family: String,
    pub case_id: Option<String>,
    pub report_required: bool,
}

impl CaseSeed {
    /// Fold a later row for the same pairing: first case id wins, a report
    /// is required if any row asked for one.
    pub fn absorb(&mut self, later: CaseSeed) {
        if self.case_id.is_none() {
            self.case_id = later.case_id;
        }
        self.report_required |= later.report_required;
    }

    fn base_key(&self) -> String {
        match &self.case_id {
            Some(case_id) => case_id.clone(),
            None => format!("{}-{}", self.analysis_id, self.specimen),
        }
    }
}

/// Build one case per seed, plus its report when required, each tagged with
/// the seed's row and sorted by it.
///
/// The natural key is the explicit case id, else analysis id + specimen.
/// When two samples of one specimen share an analysis, the workup type is
/// appended so their cases stay apart. Seeds that share an explicit case id
/// share an alias; the caller merges them.
pub fn synthesize(
    project: &str,
    ingestion_id: &str,
    seeds: &BTreeMap<(String, String), CaseSeed>,
) -> (Vec<(usize, Case)>, Vec<(usize, Report)>) {
    let mut key_counts: BTreeMap<String, usize> = BTreeMap::new();
    for seed in seeds.values() {
        *key_counts.entry(seed.base_key()).or_default() += 1;
    }

    let mut cases = Vec::new();
    let mut reports = Vec::new();
    for seed in seeds.values() {
        let base = seed.base_key();
        let key = match (&seed.workup, key_counts.get(&base)) {
            (Some(workup), Some(count)) if *count > 1 && seed.case_id.is_none() => format!("{}-{}", base, workup),
            _ => base,
        };

        let report = seed.report_required.then(|| Report {
            alias: make_alias(project, EntityKind::Report, &key),
            description: format!(
                "Analysis Report for Individual ID {} (Analysis {})",
                seed.individual_id, seed.analysis_id
            ),
            extra: Extra::new(),
        });

        cases.push((seed.row, Case {
            alias: make_alias(project, EntityKind::Case, &key),
            case_id: seed.case_id.clone(),
            sample_processing: Reference::alias(seed.analysis.clone()),
            individual: Reference::alias(seed.individual.clone()),
            family: Reference::alias(seed.family.clone()),
            sample: Reference::alias(seed.sample.clone()),
            report: report.as_ref().map(|r| Reference::alias(r.alias.clone())),
            ingestion_ids: vec![ingestion_id.to_string()],
            extra: Extra::new(),
        }));
        reports.extend(report.map(|r| (seed.row, r)));
    }
    cases.sort_by_key(|(row, _)| *row);
    reports.sort_by_key(|(row, _)| *row);
    (cases, reports)
}
