//! genoportal-common: Shared entity model, errors, and the repository
//! collaborator used across all genoportal crates.

pub mod error;
pub mod entities;
pub mod repository;
pub mod memory;
pub mod submission_config;

// Re-export commonly used types
pub use entities::{EntityKind, Reference};
pub use error::{PortalError, Result};
pub use memory::MemoryRepository;
pub use repository::{FileFormat, ItemSchema, PersistedItem, Repository, ValidationIssue, ValidationMode};
pub use submission_config::{SubmissionConfig, SubmissionType};
