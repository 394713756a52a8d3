//! genoportal-ingestion: Spreadsheet-to-graph submission pipeline.
//! Covers:
//! - Sheet framing and header normalisation
//! - File name resolution against the format registry (incl. FASTQ pairing)
//! - Row extraction for accessioning and family-history sheets
//! - Cross-row merging into one submission graph
//! - Diffing against the repository and check-only validation
//! - Dependency-ordered upsert

pub mod error;
pub mod models;
pub mod sheet;
pub mod normalise;
pub mod files;
pub mod rows;
pub mod graph;
pub mod normalizer;
pub mod diff;
pub mod upsert;
pub mod pipeline;

pub use error::{Result, SubmissionError};
pub use models::{FramedRow, SubmissionInput, SubmissionOutput};
pub use normalizer::{NormalizedSubmission, SubmissionNormalizer};
pub use diff::{Differ, PlanAction, SubmissionPlan};
pub use upsert::{Tally, UpsertOutcome, Upserter};
pub use pipeline::{run_submission, SubmissionJob, SubmissionReport, SubmissionStatus};
