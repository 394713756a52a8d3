//! End-to-end submission pipeline.
//!
//! Orchestrates the full flow for a single submission:
//!   1. Frame the sheet and extract one entity set per row
//!   2. Merge rows into the submission graph and finalize it
//!   3. Look every entity up and plan creations and patches
//!   4. Validate the plan against the repository's schemas
//!   5. If committing and nothing failed, apply the plan
//!
//! Normalisation or validation errors anywhere stop the run before step 5.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use genoportal_common::{EntityKind, Repository, SubmissionConfig};

use crate::diff::{Differ, PlanCounts};
use crate::error::Result;
use crate::models::{SubmissionInput, SubmissionOutput};
use crate::normalizer::SubmissionNormalizer;
use crate::upsert::{Tally, Upserter};

// ── Job config ────────────────────────────────────────────────────────────────

/// Parameters for a single submission run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub input: SubmissionInput,
    /// Apply the plan. Without it the run stops after validation.
    #[serde(default)]
    pub commit: bool,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    ValidationFailed,
    Validated,
    Committed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub ingestion_id: String,
    pub status: SubmissionStatus,
    /// The normalised graph, keyed by kind and alias.
    pub output: SubmissionOutput,
    pub validation: BTreeMap<EntityKind, PlanCounts>,
    /// Normalisation and validation errors together.
    pub errors: Vec<String>,
    pub tallies: BTreeMap<EntityKind, Tally>,
    pub uploaded_files: Vec<String>,
    pub messages: Vec<String>,
    pub failures: Vec<String>,
    pub duration_ms: u64,
}

impl SubmissionReport {
    fn new(ingestion_id: &str, output: SubmissionOutput) -> Self {
        Self {
            ingestion_id: ingestion_id.to_string(),
            status: SubmissionStatus::ValidationFailed,
            output,
            validation: BTreeMap::new(),
            errors: Vec::new(),
            tallies: BTreeMap::new(),
            uploaded_files: Vec::new(),
            messages: Vec::new(),
            failures: Vec::new(),
            duration_ms: 0,
        }
    }
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

/// Run one submission against `repo`.
///
/// Only a sheet without a header row is an `Err`; everything else is
/// collected into the report.
#[instrument(skip(rows, config, repo), fields(ingestion_id = %job.input.ingestion_id, commit = job.commit))]
pub async fn run_submission<I, R>(
    rows: I,
    job: &SubmissionJob,
    config: &SubmissionConfig,
    repo: &R,
) -> Result<SubmissionReport>
where
    I: IntoIterator<Item = Vec<String>>,
    R: Repository + ?Sized,
{
    let t0 = std::time::Instant::now();
    let scope = job.input.scope();

    // ── 1-2. Normalise ────────────────────────────────────────────────────────
    let normalized = SubmissionNormalizer::new(&job.input, config, repo).normalize(rows).await?;
    let mut report = SubmissionReport::new(&job.input.ingestion_id, normalized.output.clone());
    report.errors.extend(normalized.errors().iter().cloned());

    if !normalized.is_valid() {
        warn!(errors = report.errors.len(), "Submission failed normalisation");
        report.duration_ms = t0.elapsed().as_millis() as u64;
        return Ok(report);
    }

    // ── 3-4. Plan and validate ───────────────────────────────────────────────
    let plan = Differ::new(repo, scope.clone(), config).plan(&normalized).await;
    report.validation = plan.counts.clone();
    report.errors.extend(plan.errors.iter().cloned());

    if !plan.is_valid() {
        warn!(errors = report.errors.len(), "Submission failed validation");
        report.duration_ms = t0.elapsed().as_millis() as u64;
        return Ok(report);
    }
    report.status = SubmissionStatus::Validated;

    // ── 5. Apply ──────────────────────────────────────────────────────────────
    if job.commit {
        let outcome = Upserter::new(repo, scope, config).apply(&plan).await;
        report.tallies = outcome.tallies;
        report.uploaded_files = outcome.uploaded_files;
        report.messages = outcome.messages;
        report.failures = outcome.failures;
        report.status = SubmissionStatus::Committed;
    }

    report.duration_ms = t0.elapsed().as_millis() as u64;
    info!(
        status = ?report.status,
        validated = report.validation.values().map(|c| c.validated).sum::<usize>(),
        duration_ms = report.duration_ms,
        "Submission finished"
    );
    Ok(report)
}
