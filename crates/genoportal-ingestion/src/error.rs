//! Errors that abort a whole submission.
//!
//! Everything row-scoped is collected as a message instead; only framing
//! failures and repository outages surface here.

use genoportal_common::PortalError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SubmissionError>;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Header row not found: no row contains the required column \"{sentinel}\"")]
    HeaderNotFound { sentinel: String },

    #[error("Malformed sheet: {0}")]
    Structure(String),

    #[error(transparent)]
    Repository(#[from] PortalError),
}
