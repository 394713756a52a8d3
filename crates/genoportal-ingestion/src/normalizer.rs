//! Sheet → normalised submission graph.
//!
//! Drives framing, row extraction, file resolution and graph merging over the
//! whole sheet, then runs the finalisation pass for the submission type.
//! Only a missing header aborts; everything else lands in `errors`.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use genoportal_common::entities::{make_alias, Entity, FileSubmitted};
use genoportal_common::{EntityKind, Repository, SubmissionConfig, SubmissionType};

use crate::error::Result;
use crate::files::FileNameResolver;
use crate::graph::SubmissionGraph;
use crate::models::{FramedRow, SubmissionInput, SubmissionOutput};
use crate::rows::{FileLevel, Relation, RowEntities, RowExtractor};
use crate::sheet::{SheetFramer, HEADER_SENTINEL};

/// Columns that list submitted files.
const FILE_COLUMNS: [&str; 2] = ["files", "case files"];

/// The normalised graph in both shapes: JSON-ready output and typed
/// entities for the diff/upsert phases.
#[derive(Debug, Clone)]
pub struct NormalizedSubmission {
    pub output: SubmissionOutput,
    /// Creation order of kinds, alias order within a kind.
    pub entities: Vec<Entity>,
    /// alias → row that first introduced it.
    pub origin_rows: BTreeMap<String, usize>,
}

impl NormalizedSubmission {
    pub fn errors(&self) -> &[String] {
        &self.output.errors
    }

    pub fn is_valid(&self) -> bool {
        self.output.errors.is_empty()
    }
}

pub struct SubmissionNormalizer<'a, R: Repository + ?Sized> {
    input: &'a SubmissionInput,
    config: &'a SubmissionConfig,
    repo: &'a R,
}

impl<'a, R: Repository + ?Sized> SubmissionNormalizer<'a, R> {
    pub fn new(input: &'a SubmissionInput, config: &'a SubmissionConfig, repo: &'a R) -> Self {
        Self { input, config, repo }
    }

    #[instrument(skip(self, rows), fields(project = %self.input.project, submission_type = self.input.submission_type.as_str()))]
    pub async fn normalize<I>(&self, rows: I) -> Result<NormalizedSubmission>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let framed: Vec<FramedRow> = SheetFramer::new(rows, HEADER_SENTINEL)?.collect();
        info!(rows = framed.len(), "Sheet framed");

        let extractor = RowExtractor::new(&self.input.project, self.config, self.input.submission_type);
        let mut graph = SubmissionGraph::new();
        let mut resolver = self.file_resolver(&framed, &mut graph).await;

        for row in &framed {
            let mut entities = match extractor.extract(row) {
                Ok(entities) => entities,
                Err(e) => {
                    debug!(row = row.number, "Row dropped: {}", e);
                    graph.push_error(e.to_string());
                    continue;
                }
            };

            let files = match resolver.as_mut() {
                Some(resolver) => resolve_files(resolver, &mut entities),
                None => Vec::new(),
            };

            if let Some(Relation::Other(relation)) = entities.relation.clone() {
                if let Some(message) = self.verify_relation(&entities, &relation).await {
                    entities.errors.push(message);
                }
            }

            graph.add_row(entities, files);
        }

        if let Some(resolver) = &resolver {
            for message in resolver.global_errors() {
                graph.push_error(message);
            }
        }

        match self.input.submission_type {
            SubmissionType::Accessioning => {
                graph.finalize_accessioning(&self.input.project, &self.input.ingestion_id)
            }
            SubmissionType::FamilyHistory => graph.finalize_pedigree(self.config, &self.input.ingestion_id),
        }

        let entities = graph.entities();
        let scope = self.input.scope();
        let mut output = SubmissionOutput {
            errors: graph.errors().to_vec(),
            ..Default::default()
        };
        for entity in &entities {
            output
                .items_mut(entity.kind())
                .insert(entity.alias().to_string(), entity.to_properties(&scope)?);
        }

        info!(entities = entities.len(), errors = output.errors.len(), "Submission normalised");
        Ok(NormalizedSubmission {
            output,
            entities,
            origin_rows: graph.origin_rows().clone(),
        })
    }

    /// A resolver over every file name in the sheet, or `None` when no row
    /// lists files. The format registry is fetched only in the latter case.
    async fn file_resolver(&self, framed: &[FramedRow], graph: &mut SubmissionGraph) -> Option<FileNameResolver> {
        let cells = framed
            .iter()
            .flat_map(|row| FILE_COLUMNS.iter().filter_map(move |column| row.get(column)));
        let names = FileNameResolver::scan_names(cells);
        if names.is_empty() {
            return None;
        }

        match self.repo.file_formats().await {
            Ok(catalog) => {
                debug!(names = names.len(), formats = catalog.len(), "File resolver ready");
                Some(FileNameResolver::new(&self.input.project, catalog, names))
            }
            Err(e) => {
                warn!("File format registry unavailable: {}", e);
                graph.push_error(format!("Unable to load accepted file formats; files were not processed: {}", e));
                None
            }
        }
    }

    /// An unrecognised relation is accepted only when the individual is
    /// already a member of the family on record. Lookup failures count as
    /// absence. Returns the row error, if any.
    async fn verify_relation(&self, entities: &RowEntities, relation: &str) -> Option<String> {
        let individual = &entities.individual;
        let family_alias = match &entities.family.family_id {
            Some(family_id) => make_alias(&self.input.project, EntityKind::Family, family_id),
            None => entities.family.alias.clone(),
        };

        let individual_item = self.lookup(&individual.alias).await;
        let family_item = self.lookup(&family_alias).await;
        let on_record = match (individual_item, family_item) {
            (Some(person), Some(family)) => {
                family.list_contains("members", &person.id)
                    || person.aliases().iter().any(|alias| family.list_contains("members", alias))
            }
            _ => false,
        };
        if on_record {
            debug!(individual = %individual.alias, family = %family_alias, "Relation found on record");
            return None;
        }

        Some(format!(
            "Row {} - relation \"{}\" of individual {} is not recognized and {} is not a member of family {} on record; \
             for extended relations please submit family history first",
            entities.row, relation, individual.individual_id, individual.individual_id, family_alias
        ))
    }

    async fn lookup(&self, alias: &str) -> Option<genoportal_common::PersistedItem> {
        match self.repo.get(alias).await {
            Ok(item) => item,
            Err(e) => {
                warn!(alias, "Lookup failed, treating as absent: {}", e);
                None
            }
        }
    }
}

/// Resolve a row's file cells and attach the aliases to its sample or analysis.
fn resolve_files(resolver: &mut FileNameResolver, entities: &mut RowEntities) -> Vec<FileSubmitted> {
    let Some(accession) = entities.accession.as_mut() else {
        return Vec::new();
    };

    let mut files = Vec::new();
    for cell in &accession.file_cells {
        let resolved = resolver.resolve_cell(
            &cell.cell,
            entities.row,
            cell.genome_build.as_deref(),
            cell.variant_type.as_deref(),
        );
        let target = match cell.level {
            FileLevel::Sample   => &mut accession.sample.files,
            FileLevel::Analysis => &mut accession.analysis.files,
        };
        crate::graph::merge::union(target, resolved.aliases);
        entities.errors.extend(resolved.errors);
        files.extend(resolved.files);
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use genoportal_common::entities::SubmissionScope;
    use genoportal_common::{MemoryRepository, PersistedItem};
    use serde_json::json;

    fn input(submission_type: SubmissionType) -> SubmissionInput {
        SubmissionInput {
            project: "TEST".into(),
            institution: "hms".into(),
            submission_type,
            ingestion_id: "ing-1".into(),
        }
    }

    fn sheet(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    const HEADER: &[&str] = &["Individual ID", "Relation to Proband", "Analysis ID", "Specimen ID", "Workup Type", "Family ID"];

    #[tokio::test]
    async fn test_header_not_found_aborts() {
        let repo = MemoryRepository::default();
        let config = SubmissionConfig::default();
        let input = input(SubmissionType::Accessioning);
        let normalizer = SubmissionNormalizer::new(&input, &config, &repo);
        let result = normalizer.normalize(sheet(&[&["Patient"], &["IND1"]])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stamps_scope_and_collects_row_errors() {
        let repo = MemoryRepository::default();
        let config = SubmissionConfig::default();
        let input = input(SubmissionType::Accessioning);
        let normalizer = SubmissionNormalizer::new(&input, &config, &repo);
        let normalized = normalizer
            .normalize(sheet(&[
                HEADER,
                &["IND1", "proband", "A1", "S1", "WGS", ""],
                &["IND2", "mother", "", "S2", "WGS", ""],
            ]))
            .await
            .unwrap();

        assert_eq!(normalized.errors(), &["Row 3 - missing required field(s) analysis id".to_string()]);
        let individual = &normalized.output.individual["TEST:individual-IND1"];
        assert_eq!(individual["project"], json!("TEST"));
        assert_eq!(individual["institution"], json!("hms"));
        assert_eq!(individual["samples"], json!(["TEST:sample-S1-WGS"]));
        assert!(!normalized.output.individual.contains_key("TEST:individual-IND2"));
    }

    #[tokio::test]
    async fn test_unknown_relation_requires_family_history() {
        let repo = MemoryRepository::default();
        let config = SubmissionConfig::default();
        let input = input(SubmissionType::Accessioning);
        let normalizer = SubmissionNormalizer::new(&input, &config, &repo);
        let normalized = normalizer
            .normalize(sheet(&[
                HEADER,
                &["IND1", "proband", "A1", "S1", "WGS", "FAM1"],
                &["IND5", "uncle", "A1", "S5", "WGS", "FAM1"],
            ]))
            .await
            .unwrap();

        assert_eq!(normalized.errors().len(), 1);
        assert!(normalized.errors()[0].starts_with("Row 3 - relation \"uncle\""));
        assert!(normalized.errors()[0].contains("submit family history first"));
    }

    #[tokio::test]
    async fn test_unknown_relation_on_record_is_accepted() {
        let repo = MemoryRepository::default();
        repo.insert(PersistedItem {
            id: "/individuals/5/".into(),
            item_type: "individual".into(),
            properties: json!({"aliases": ["TEST:individual-IND5"]}).as_object().cloned().unwrap_or_default(),
        })
        .await;
        repo.insert(PersistedItem {
            id: "/families/1/".into(),
            item_type: "family".into(),
            properties: json!({"aliases": ["TEST:family-FAM1"], "members": ["/individuals/5/"]})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        })
        .await;

        let config = SubmissionConfig::default();
        let input = input(SubmissionType::Accessioning);
        let normalizer = SubmissionNormalizer::new(&input, &config, &repo);
        let normalized = normalizer
            .normalize(sheet(&[
                HEADER,
                &["IND1", "proband", "A1", "S1", "WGS", "FAM1"],
                &["IND5", "uncle", "A1", "S5", "WGS", "FAM1"],
            ]))
            .await
            .unwrap();

        assert!(normalized.is_valid(), "{:?}", normalized.errors());
        let analysis = &normalized.output.sample_processing["TEST:analysis-A1"];
        assert_eq!(analysis["analysis_type"], json!("WGS-Group"));
    }

    #[tokio::test]
    async fn test_lookup_failure_counts_as_absence() {
        let repo = MemoryRepository::default().fail_lookup_of("TEST:individual-IND5");
        let config = SubmissionConfig::default();
        let input = input(SubmissionType::Accessioning);
        let normalizer = SubmissionNormalizer::new(&input, &config, &repo);
        let normalized = normalizer
            .normalize(sheet(&[HEADER, &["IND5", "cousin", "A1", "S5", "WGS", ""]]))
            .await
            .unwrap();
        assert_eq!(normalized.errors().len(), 1);
        assert!(normalized.errors()[0].contains("family history"));
    }

    #[test]
    fn test_scope_from_input() {
        assert_eq!(
            input(SubmissionType::FamilyHistory).scope(),
            SubmissionScope { project: "TEST".into(), institution: "hms".into() }
        );
    }
}
