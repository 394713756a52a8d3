//! Column → property tables.
//!
//! Columns here land in an entity's open property map. First-class fields
//! (sex, workup type, file cells, ...) are read by the row extractors
//! directly and are not listed.

use genoportal_common::entities::{Extra, Requisition};
use genoportal_common::{EntityKind, SubmissionConfig};

use crate::models::FramedRow;
use crate::normalise::{abbreviate, coerce_value};

/// `(normalised column header, property name)`.
pub type ColumnMap = &'static [(&'static str, &'static str)];

pub const INDIVIDUAL_COLUMNS: ColumnMap = &[
    ("date of birth", "date_of_birth"),
    ("gestational age", "gestational_age"),
    ("deceased", "is_deceased"),
    ("pregnancy", "is_pregnancy"),
    ("termination of pregnancy", "is_termination_of_pregnancy"),
    ("spontaneous abortion", "is_spontaneous_abortion"),
    ("still birth", "is_still_birth"),
    ("no children by choice", "is_no_children_by_choice"),
    ("infertile", "is_infertile"),
];

pub const SAMPLE_COLUMNS: ColumnMap = &[
    ("date collected", "specimen_collection_date"),
    ("date recd at ref lab", "date_received"),
    ("specimen notes", "specimen_notes"),
    ("sequencing lab", "sequencing_lab"),
    ("test requested", "test_requested"),
    ("physician provider", "ordering_physician"),
    ("date of sequencing", "sequencing_date"),
];

pub const REQUISITION_COLUMNS: ColumnMap = &[
    ("req accepted y n", "accepted_rejected"),
    ("reason rejected", "rejection_reason"),
    ("corrective action taken", "corrective_action"),
    ("corrective action taken by", "action_taken_by"),
    ("correction notes", "notes"),
];

/// Copy every mapped column present in `row` into `extra`, abbreviations
/// applied. An earlier column wins over a later one for the same property.
pub fn apply_columns(row: &FramedRow, columns: ColumnMap, extra: &mut Extra) {
    for (column, property) in columns {
        if extra.contains_key(*property) {
            continue;
        }
        if let Some(cell) = row.get(column) {
            extra.insert(property.to_string(), coerce_value(property, &abbreviate(cell)));
        }
    }
}

/// Copy the configured additional fields for `kind`. The column for a
/// property is its name with underscores read as spaces.
pub fn apply_additional_fields(row: &FramedRow, config: &SubmissionConfig, kind: EntityKind, extra: &mut Extra) {
    for property in config.additional_fields_for(kind) {
        if extra.contains_key(property) {
            continue;
        }
        let column = property.replace('_', " ");
        if let Some(cell) = row.get(&column) {
            extra.insert(property.clone(), coerce_value(property, cell));
        }
    }
}

/// `y`/`accepted` → `Accepted`, `n`/`rejected` → `Rejected`; other text is
/// kept for the validator to judge.
fn normalize_accepted_rejected(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        "y" | "yes" | "accepted" => "Accepted".to_string(),
        "n" | "no" | "rejected"  => "Rejected".to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Requisition sub-object, or `None` when the row has no requisition columns.
pub fn requisition(row: &FramedRow) -> Option<Requisition> {
    let cell = |property: &str| {
        REQUISITION_COLUMNS
            .iter()
            .find(|(_, p)| *p == property)
            .and_then(|(column, _)| row.get(column))
            .map(str::to_string)
    };
    let requisition = Requisition {
        accepted_rejected: cell("accepted_rejected").map(|v| normalize_accepted_rejected(&v)),
        rejection_reason: cell("rejection_reason"),
        corrective_action: cell("corrective_action"),
        action_taken_by: cell("action_taken_by"),
        notes: cell("notes"),
    };
    (!requisition.is_empty()).then_some(requisition)
}
