//! Data models for the submission pipeline.

use std::collections::BTreeMap;

use genoportal_common::entities::SubmissionScope;
use genoportal_common::{EntityKind, SubmissionType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who is submitting what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionInput {
    pub project: String,
    pub institution: String,
    pub submission_type: SubmissionType,
    /// Ingestion/session identifier tagged onto created families and cases.
    pub ingestion_id: String,
}

impl SubmissionInput {
    pub fn scope(&self) -> SubmissionScope {
        SubmissionScope {
            project: self.project.clone(),
            institution: self.institution.clone(),
        }
    }
}

/// One data row zipped against the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedRow {
    /// 1-based position in the original input, blank and instruction rows included.
    pub number: usize,
    /// `(normalised header, cell)` in column order.
    pub cells: Vec<(String, String)>,
}

impl FramedRow {
    /// Trimmed, non-empty value of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(header, _)| header == column)
            .map(|(_, cell)| cell.trim())
            .filter(|cell| !cell.is_empty())
    }

    pub fn has(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(number: usize, cells: &[(&str, &str)]) -> Self {
        Self {
            number,
            cells: cells.iter().map(|(h, c)| (h.to_string(), c.to_string())).collect(),
        }
    }
}

/// Normalised graph, one alias-keyed map per entity kind, plus every error
/// found while building it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutput {
    pub individual: BTreeMap<String, Map<String, Value>>,
    pub family: BTreeMap<String, Map<String, Value>>,
    pub sample: BTreeMap<String, Map<String, Value>>,
    pub sample_processing: BTreeMap<String, Map<String, Value>>,
    pub file_submitted: BTreeMap<String, Map<String, Value>>,
    pub case: BTreeMap<String, Map<String, Value>>,
    pub report: BTreeMap<String, Map<String, Value>>,
    pub errors: Vec<String>,
}

impl SubmissionOutput {
    pub fn items(&self, kind: EntityKind) -> &BTreeMap<String, Map<String, Value>> {
        match kind {
            EntityKind::Individual       => &self.individual,
            EntityKind::Family           => &self.family,
            EntityKind::Sample           => &self.sample,
            EntityKind::SampleProcessing => &self.sample_processing,
            EntityKind::FileSubmitted    => &self.file_submitted,
            EntityKind::Case             => &self.case,
            EntityKind::Report           => &self.report,
        }
    }

    pub fn items_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<String, Map<String, Value>> {
        match kind {
            EntityKind::Individual       => &mut self.individual,
            EntityKind::Family           => &mut self.family,
            EntityKind::Sample           => &mut self.sample,
            EntityKind::SampleProcessing => &mut self.sample_processing,
            EntityKind::FileSubmitted    => &mut self.file_submitted,
            EntityKind::Case             => &mut self.case,
            EntityKind::Report           => &mut self.report,
        }
    }
}
