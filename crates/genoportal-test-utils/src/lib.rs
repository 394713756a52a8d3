//! Shared fixtures for genoportal tests: a file-format registry, item
//! schemas, sheet builders and a seeded in-memory repository.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use genoportal_common::repository::FieldKind;
use genoportal_common::{EntityKind, FileFormat, ItemSchema, MemoryRepository, PersistedItem};

pub const PROJECT: &str = "TEST";
pub const INSTITUTION: &str = "TEST-INST";

// ── File formats ──────────────────────────────────────────────────────────────

/// The standard sequencing catalog.
pub fn default_file_formats() -> Vec<FileFormat> {
    FileFormat::standard_catalog()
}

// ── Schemas ───────────────────────────────────────────────────────────────────

fn schema(kind: EntityKind, fields: &[(&str, FieldKind)], required: &[&str]) -> (String, ItemSchema) {
    let schema = ItemSchema {
        item_type: kind.as_str().to_string(),
        properties: fields.iter().map(|(f, k)| (f.to_string(), *k)).collect(),
        required: required.iter().map(|s| s.to_string()).collect(),
        additional_properties: true,
    };
    (kind.as_str().to_string(), schema)
}

/// Schemas declaring every link so validation checks targets exist.
pub fn default_schemas() -> BTreeMap<String, ItemSchema> {
    use FieldKind::*;
    [
        schema(
            EntityKind::Individual,
            &[
                ("mother", Link),
                ("father", Link),
                ("samples", LinkArray),
                ("ancestry", ScalarArray),
                ("disorders", ObjectArray),
                ("phenotypic_features", ObjectArray),
            ],
            &["individual_id"],
        ),
        schema(
            EntityKind::Family,
            &[
                ("members", LinkArray),
                ("proband", Link),
                ("family_phenotypic_features", ScalarArray),
                ("ingestion_ids", ScalarArray),
            ],
            &[],
        ),
        schema(
            EntityKind::Sample,
            &[("files", LinkArray), ("requisition", Object), ("other_specimen_ids", ObjectArray)],
            &["specimen_accession"],
        ),
        schema(
            EntityKind::SampleProcessing,
            &[("samples", LinkArray), ("families", LinkArray), ("files", LinkArray)],
            &["analysis_id"],
        ),
        schema(
            EntityKind::FileSubmitted,
            &[("related_files", ObjectArray), ("extra_files", ObjectArray)],
            &["filename", "file_format"],
        ),
        schema(
            EntityKind::Case,
            &[
                ("sample_processing", Link),
                ("individual", Link),
                ("family", Link),
                ("sample", Link),
                ("report", Link),
                ("ingestion_ids", ScalarArray),
            ],
            &["sample_processing", "individual", "family", "sample"],
        ),
        schema(EntityKind::Report, &[], &["description"]),
    ]
    .into_iter()
    .collect()
}

// ── Repository ────────────────────────────────────────────────────────────────

/// Empty repository with the default schemas and formats.
pub fn seeded_repository() -> MemoryRepository {
    MemoryRepository::new(default_schemas(), default_file_formats())
}

/// An item as if created by an earlier submission.
pub fn persisted(kind: EntityKind, alias: &str, properties: Value) -> PersistedItem {
    let mut properties: Map<String, Value> = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    properties.insert("aliases".to_string(), Value::Array(vec![Value::String(alias.to_string())]));
    PersistedItem {
        id: format!("/{}/{}/", kind.collection(), Uuid::new_v4()),
        item_type: kind.as_str().to_string(),
        properties,
    }
}

// ── Sheets ────────────────────────────────────────────────────────────────────

/// Builds a raw cell matrix as a spreadsheet reader would hand it over.
#[derive(Debug, Clone, Default)]
pub struct SheetBuilder {
    rows: Vec<Vec<String>>,
}

impl SheetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Title or instruction rows above the header.
    pub fn preamble(mut self, line: &str) -> Self {
        self.rows.push(vec![line.to_string()]);
        self
    }

    pub fn header(self, columns: &[&str]) -> Self {
        self.row(columns)
    }

    pub fn row(mut self, cells: &[&str]) -> Self {
        self.rows.push(cells.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn build(self) -> Vec<Vec<String>> {
        self.rows
    }
}

pub const ACCESSIONING_HEADER: [&str; 8] = [
    "Individual ID",
    "Relation to Proband",
    "Analysis ID",
    "Specimen ID",
    "Workup Type",
    "Sex",
    "Files",
    "Report Required",
];

/// Accessioning sheet with the standard header, including the example row
/// most templates carry under it.
pub fn accessioning_sheet(rows: &[[&str; 8]]) -> Vec<Vec<String>> {
    let mut sheet = SheetBuilder::new()
        .preamble("Accessioning submission")
        .header(&ACCESSIONING_HEADER)
        .row(&["", "(proband/mother/father)", "", "", "(WGS/WES)", "(M/F/U)", "", "(Y/N)"]);
    for row in rows {
        sheet = sheet.row(row);
    }
    sheet.build()
}

pub const PEDIGREE_HEADER: [&str; 7] = [
    "Family ID",
    "Individual ID",
    "Mother ID",
    "Father ID",
    "Sex",
    "Proband (Y/N)",
    "HPO terms",
];

pub fn pedigree_sheet(rows: &[[&str; 7]]) -> Vec<Vec<String>> {
    let mut sheet = SheetBuilder::new().header(&PEDIGREE_HEADER);
    for row in rows {
        sheet = sheet.row(row);
    }
    sheet.build()
}
