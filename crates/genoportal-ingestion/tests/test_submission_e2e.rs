//! End-to-end submissions against the in-memory repository.

use pretty_assertions::assert_eq;
use serde_json::json;

use genoportal_common::{EntityKind, MemoryRepository, Repository, SubmissionConfig, SubmissionType};
use genoportal_ingestion::{run_submission, SubmissionError, SubmissionInput, SubmissionJob, SubmissionStatus};
use genoportal_test_utils::{accessioning_sheet, pedigree_sheet, seeded_repository, INSTITUTION, PROJECT};

fn job(submission_type: SubmissionType, ingestion_id: &str, commit: bool) -> SubmissionJob {
    SubmissionJob {
        input: SubmissionInput {
            project: PROJECT.to_string(),
            institution: INSTITUTION.to_string(),
            submission_type,
            ingestion_id: ingestion_id.to_string(),
        },
        commit,
    }
}

fn accessioning(ingestion_id: &str, commit: bool) -> SubmissionJob {
    job(SubmissionType::Accessioning, ingestion_id, commit)
}

async fn stored(repo: &MemoryRepository, alias: &str) -> serde_json::Map<String, serde_json::Value> {
    repo.get(alias)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{} not stored", alias))
        .properties
}

#[tokio::test]
async fn test_duo_then_trio() {
    let repo = seeded_repository();
    let config = SubmissionConfig::default();

    let duo = accessioning_sheet(&[
        ["IND1", "proband", "A1", "S1", "WGS", "F", "", "Y"],
        ["IND2", "mother", "A1", "S2", "WGS", "F", "", ""],
    ]);
    let report = run_submission(duo, &accessioning("ing-1", true), &config, &repo).await.unwrap();
    assert_eq!(report.status, SubmissionStatus::Committed, "{:?}", report.errors);

    let family = &report.output.family["TEST:family-A1"];
    assert_eq!(family["proband"], json!("TEST:individual-IND1"));
    assert!(!family.contains_key("mother"));
    assert_eq!(report.output.individual["TEST:individual-IND1"]["mother"], json!("TEST:individual-IND2"));
    assert_eq!(report.output.sample_processing["TEST:analysis-A1"]["analysis_type"], json!("WGS"));

    let mother_id = repo.get("TEST:individual-IND2").await.unwrap().unwrap().id;
    assert_eq!(stored(&repo, "TEST:individual-IND1").await["mother"], json!(mother_id));

    let trio = accessioning_sheet(&[
        ["IND1", "proband", "A1", "S1", "WGS", "F", "", "Y"],
        ["IND2", "mother", "A1", "S2", "WGS", "F", "", ""],
        ["IND3", "father", "A1", "S3", "WGS", "M", "", ""],
    ]);
    let report = run_submission(trio, &accessioning("ing-2", true), &config, &repo).await.unwrap();
    assert_eq!(report.status, SubmissionStatus::Committed, "{:?}", report.errors);
    assert_eq!(report.tallies[&EntityKind::SampleProcessing].patched, 1);
    assert_eq!(stored(&repo, "TEST:analysis-A1").await["analysis_type"], json!("WGS-Trio"));

    let father_id = repo.get("TEST:individual-IND3").await.unwrap().unwrap().id;
    assert_eq!(stored(&repo, "TEST:individual-IND1").await["father"], json!(father_id));
    assert_eq!(repo.item_count(EntityKind::Individual).await, 3);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let repo = seeded_repository();
    let config = SubmissionConfig::default();
    let sheet = || {
        accessioning_sheet(&[
            ["IND1", "proband", "A1", "S1", "WGS", "F", "a_R1.fastq.gz, a_R2.fastq.gz", "Y"],
            ["IND2", "mother", "A1", "S2", "WGS", "F", "b.bam, b.bam.bai", ""],
            ["IND3", "father", "A1", "S3", "WGS", "M", "", ""],
        ])
    };

    let first = run_submission(sheet(), &accessioning("ing-1", true), &config, &repo).await.unwrap();
    assert_eq!(first.status, SubmissionStatus::Committed, "{:?}", first.errors);
    assert!(first.failures.is_empty(), "{:?}", first.failures);
    assert_eq!(first.uploaded_files.len(), 3);
    let snapshot = repo.snapshot().await;

    let second = run_submission(sheet(), &accessioning("ing-2", true), &config, &repo).await.unwrap();
    assert_eq!(second.status, SubmissionStatus::Committed, "{:?}", second.errors);
    for (kind, tally) in &second.tallies {
        assert_eq!((tally.created, tally.patched), (0, 0), "{} changed on re-run", kind);
    }
    assert!(second.uploaded_files.is_empty());
    assert_eq!(repo.snapshot().await.items, snapshot.items);
}

#[tokio::test]
async fn test_fastq_pairing_and_unpaired_file() {
    let repo = seeded_repository();
    let sheet = accessioning_sheet(&[
        ["IND1", "proband", "A1", "S1", "WGS", "F", "sample_R2.fastq.gz", ""],
        ["IND1", "proband", "A1", "S1", "WGS", "F", "sample_R1.fastq.gz", ""],
        ["IND2", "mother", "A1", "S2", "WGS", "F", "sample_abc.fastq.gz", ""],
    ]);
    let report = run_submission(sheet, &accessioning("ing-1", false), &SubmissionConfig::default(), &repo)
        .await
        .unwrap();

    let files = &report.output.file_submitted;
    assert_eq!(files["TEST:file-sample_R1.fastq.gz"]["paired_end"], json!("1"));
    assert_eq!(
        files["TEST:file-sample_R1.fastq.gz"]["related_files"],
        json!([{"relationship_type": "paired with", "file": "TEST:file-sample_R2.fastq.gz"}])
    );
    assert_eq!(
        files["TEST:file-sample_R2.fastq.gz"]["related_files"],
        json!([{"relationship_type": "paired with", "file": "TEST:file-sample_R1.fastq.gz"}])
    );

    assert_eq!(report.status, SubmissionStatus::ValidationFailed);
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert!(report.errors[0].starts_with("Row 6 - "));
    assert!(report.errors[0].contains("sample_abc.fastq.gz"));
    assert!(report.errors[0].contains("unpaired"));
}

#[tokio::test]
async fn test_conflicting_mothers_block_commit() {
    let repo = seeded_repository();
    let sheet = accessioning_sheet(&[
        ["IND1", "proband", "A1", "S1", "WGS", "F", "", ""],
        ["IND2", "mother", "A1", "S2", "WGS", "F", "", ""],
        ["IND4", "mother", "A1", "S4", "WGS", "F", "", ""],
    ]);
    let report = run_submission(sheet, &accessioning("ing-1", true), &SubmissionConfig::default(), &repo)
        .await
        .unwrap();

    assert_eq!(report.status, SubmissionStatus::ValidationFailed);
    assert_eq!(
        report.errors,
        vec!["Row 6 - conflicting mother for TEST:family-A1: TEST:individual-IND2 vs TEST:individual-IND4".to_string()]
    );
    assert_eq!(repo.item_count(EntityKind::Individual).await, 0);
}

#[tokio::test]
async fn test_analysis_samples_are_distinct() {
    let repo = seeded_repository();
    let sheet = accessioning_sheet(&[
        ["IND1", "proband", "A1", "S1", "WGS", "F", "", ""],
        ["IND1", "proband", "A1", "S1", "WGS", "F", "", ""],
        ["IND2", "mother", "A1", "S2", "WGS", "F", "", ""],
    ]);
    let report = run_submission(sheet, &accessioning("ing-1", false), &SubmissionConfig::default(), &repo)
        .await
        .unwrap();

    assert_eq!(report.status, SubmissionStatus::Validated, "{:?}", report.errors);
    assert_eq!(
        report.output.sample_processing["TEST:analysis-A1"]["samples"],
        json!(["TEST:sample-S1-WGS", "TEST:sample-S2-WGS"])
    );
    assert_eq!(report.output.case.len(), 2);
}

#[tokio::test]
async fn test_pedigree_row_missing_sex_is_dropped() {
    let repo = seeded_repository();
    let sheet = pedigree_sheet(&[
        ["FAM1", "IND1", "IND2", "0", "M", "Y", "HP:0000118"],
        ["FAM1", "IND2", "0", "0", "F", "N", "HP_0000118, HP:0001250"],
        ["FAM1", "IND3", "0", "0", "", "N", ""],
    ]);
    let report = run_submission(
        sheet,
        &job(SubmissionType::FamilyHistory, "ing-1", false),
        &SubmissionConfig::default(),
        &repo,
    )
    .await
    .unwrap();

    assert_eq!(report.errors, vec!["Row 4 - missing required field(s) sex".to_string()]);
    let individuals: Vec<&str> = report.output.individual.keys().map(String::as_str).collect();
    assert_eq!(individuals, vec!["TEST:individual-IND1", "TEST:individual-IND2"]);

    let family = &report.output.family["TEST:family-FAM1"];
    assert_eq!(family["proband"], json!("TEST:individual-IND1"));
    assert_eq!(family["family_phenotypic_features"], json!(["HP:0000118", "HP:0001250"]));
}

#[tokio::test]
async fn test_failed_create_does_not_stop_others() {
    let repo = seeded_repository().reject_create_of("TEST:case-A1-S2");
    let sheet = accessioning_sheet(&[
        ["IND1", "proband", "A1", "S1", "WGS", "F", "", ""],
        ["IND2", "mother", "A1", "S2", "WGS", "F", "", ""],
    ]);
    let report = run_submission(sheet, &accessioning("ing-1", true), &SubmissionConfig::default(), &repo)
        .await
        .unwrap();

    assert_eq!(report.status, SubmissionStatus::Committed);
    assert_eq!(report.tallies[&EntityKind::Case].created, 1);
    assert_eq!(report.tallies[&EntityKind::Case].not_created, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("TEST:case-A1-S2"));
    assert_eq!(repo.item_count(EntityKind::Individual).await, 2);
}

#[tokio::test]
async fn test_sheet_without_header_is_rejected() {
    let repo = seeded_repository();
    let rows = vec![vec!["Name".to_string(), "Value".to_string()], vec!["a".to_string(), "b".to_string()]];
    let result = run_submission(rows, &accessioning("ing-1", false), &SubmissionConfig::default(), &repo).await;
    assert!(matches!(result, Err(SubmissionError::HeaderNotFound { .. })));
}
