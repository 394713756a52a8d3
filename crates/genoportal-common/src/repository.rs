//! The remote item repository, seen from the submission pipeline.
//!
//! Persistence, schema validation and the file-format registry live behind
//! this boundary. Absence is `Ok(None)`; transport or server failures are `Err`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::entities::EntityKind;
use crate::error::Result;

/// An item as stored by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedItem {
    /// Identifier assigned at creation, e.g. `/individuals/<uuid>/`.
    pub id: String,
    pub item_type: String,
    pub properties: Map<String, Value>,
}

impl PersistedItem {
    pub fn aliases(&self) -> Vec<&str> {
        self.properties
            .get("aliases")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Does the array property `field` contain `value`?
    pub fn list_contains(&self, field: &str, value: &str) -> bool {
        self.properties
            .get(field)
            .and_then(Value::as_array)
            .map(|a| a.iter().any(|v| v.as_str() == Some(value)))
            .unwrap_or(false)
    }
}

/// How a property merges and diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Overwritten when the value differs.
    Scalar,
    /// Single linkTo; overwritten when the resolved identifier differs.
    Link,
    /// Array of linkTo identifiers; extended, never shrunk.
    LinkArray,
    /// Array of plain scalars; extended, never shrunk.
    ScalarArray,
    /// Array of embedded objects; extended by structural equality.
    ObjectArray,
    /// Embedded object; replaced when it differs.
    Object,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemSchema {
    pub item_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldKind>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default = "default_additional_properties")]
    pub additional_properties: bool,
}

fn default_additional_properties() -> bool { true }

impl ItemSchema {
    /// Declared kind, or one inferred from the value's shape.
    pub fn field_kind(&self, field: &str, value: &Value) -> FieldKind {
        if let Some(kind) = self.properties.get(field) {
            return *kind;
        }
        match value {
            Value::Array(items) if items.iter().any(Value::is_object) => FieldKind::ObjectArray,
            Value::Array(_) => FieldKind::ScalarArray,
            Value::Object(_) => FieldKind::Object,
            _ => FieldKind::Scalar,
        }
    }

    pub fn is_link(&self, field: &str) -> bool {
        matches!(self.properties.get(field), Some(FieldKind::Link | FieldKind::LinkArray))
    }
}

/// Check-only validation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Patch { id: String },
}

/// One field-level complaint from schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: Option<String>,
    pub message: String,
    /// The link value that could not be resolved, if that is the complaint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ValidationIssue {
    pub fn new(field: Option<&str>, message: impl Into<String>) -> Self {
        Self { field: field.map(str::to_string), message: message.into(), target: None }
    }

    pub fn unresolved_link(field: &str, target: &str) -> Self {
        Self {
            field: Some(field.to_string()),
            message: format!("Unable to resolve link: {}", target),
            target: Some(target.to_string()),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "field '{}': {}", field, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// An accepted file format from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileFormat {
    /// Registry identifier, e.g. `fastq`, `vcf_gz`.
    pub identifier: String,
    pub standard_extension: String,
    #[serde(default)]
    pub other_allowed_extensions: Vec<String>,
    /// Identifiers of formats acceptable as extra files (e.g. indexes).
    #[serde(default)]
    pub extra_file_formats: Vec<String>,
}

impl FileFormat {
    pub fn new(identifier: &str, standard: &str, others: &[&str], extras: &[&str]) -> Self {
        Self {
            identifier: identifier.to_string(),
            standard_extension: standard.to_string(),
            other_allowed_extensions: others.iter().map(|s| s.to_string()).collect(),
            extra_file_formats: extras.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Sequencing formats with their index files as extras.
    pub fn standard_catalog() -> Vec<FileFormat> {
        vec![
            Self::new("fastq", "fastq.gz", &["fq.gz"], &[]),
            Self::new("bam", "bam", &[], &["bai"]),
            Self::new("bai", "bam.bai", &["bai"], &[]),
            Self::new("cram", "cram", &[], &["crai"]),
            Self::new("crai", "cram.crai", &["crai"], &[]),
            Self::new("vcf_gz", "vcf.gz", &[], &["vcf_gz_tbi"]),
            Self::new("vcf_gz_tbi", "vcf.gz.tbi", &["tbi"], &[]),
        ]
    }

    /// Standard extension first, then alternates.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.standard_extension.as_str())
            .chain(self.other_allowed_extensions.iter().map(String::as_str))
    }

    pub fn accepts(&self, extension: &str) -> bool {
        self.extensions().any(|e| e.eq_ignore_ascii_case(extension))
    }

    pub fn is_fastq(&self) -> bool {
        self.identifier.eq_ignore_ascii_case("fastq")
    }
}

/// Remote item repository.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Look up an item by alias, unique key, or identifier.
    async fn get(&self, alias_or_key: &str) -> Result<Option<PersistedItem>>;

    async fn get_schema(&self, kind: EntityKind) -> Result<ItemSchema>;

    /// Check-only validation; nothing is written.
    async fn validate(
        &self,
        kind: EntityKind,
        item: &Map<String, Value>,
        mode: &ValidationMode,
    ) -> Result<Vec<ValidationIssue>>;

    /// Create an item, returning its new identifier.
    async fn create(&self, kind: EntityKind, item: &Map<String, Value>) -> Result<String>;

    async fn patch(&self, id: &str, patch: &Map<String, Value>) -> Result<()>;

    /// The accepted file-format registry.
    async fn file_formats(&self) -> Result<Vec<FileFormat>>;
}
