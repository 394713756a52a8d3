//! Submission configuration.
//!
//! Controls which columns a sheet must carry, which extra columns are copied
//! onto entities, and the vocabularies used during normalisation. Loadable
//! from YAML or JSON; every field falls back to a default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::EntityKind;

/// The two sheet flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Accessioning,
    FamilyHistory,
}

impl SubmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::Accessioning  => "accessioning",
            SubmissionType::FamilyHistory => "family_history",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "accessioning"                          => Some(SubmissionType::Accessioning),
            "family_history" | "pedigree"           => Some(SubmissionType::FamilyHistory),
            _                                       => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Columns every accessioning row must fill (normalised header names).
    #[serde(default = "default_accessioning_required")]
    pub accessioning_required: Vec<String>,

    /// Columns every family-history row must fill.
    #[serde(default = "default_pedigree_required")]
    pub pedigree_required: Vec<String>,

    /// Property names copied verbatim per entity kind; the column is the
    /// property name with underscores read as spaces.
    #[serde(default = "default_additional_fields")]
    pub additional_fields: BTreeMap<String, Vec<String>>,

    /// Lower-cased accepted genome build → canonical spelling.
    #[serde(default = "default_genome_builds")]
    pub genome_builds: BTreeMap<String, String>,

    #[serde(default = "default_variant_types")]
    pub variant_types: Vec<String>,

    /// Upper bound on pooled family phenotypes.
    #[serde(default = "default_max_family_phenotypes")]
    pub max_family_phenotypes: usize,

    /// Properties sent on creation only, never patched.
    #[serde(default = "default_create_only_fields")]
    pub create_only_fields: Vec<String>,
}

fn default_accessioning_required() -> Vec<String> {
    ["individual id", "relation to proband", "analysis id", "specimen id"]
        .iter().map(|s| s.to_string()).collect()
}

fn default_pedigree_required() -> Vec<String> {
    ["family id", "individual id", "sex"].iter().map(|s| s.to_string()).collect()
}

fn default_additional_fields() -> BTreeMap<String, Vec<String>> {
    let mut m = BTreeMap::new();
    m.insert(
        EntityKind::Individual.as_str().to_string(),
        ["age", "age_units", "birth_year", "clinic_notes", "cause_of_death", "age_at_death", "age_at_death_units"]
            .iter().map(|s| s.to_string()).collect(),
    );
    m.insert(
        EntityKind::Sample.as_str().to_string(),
        ["specimen_type", "dna_concentration", "sequencing_date", "indication", "bam_sample_id"]
            .iter().map(|s| s.to_string()).collect(),
    );
    m
}

fn default_genome_builds() -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert("hg19".to_string(), "hg19".to_string());
    m.insert("grch37".to_string(), "GRCh37".to_string());
    m.insert("hg38".to_string(), "GRCh38".to_string());
    m.insert("grch38".to_string(), "GRCh38".to_string());
    m
}

fn default_variant_types() -> Vec<String> {
    vec!["SNV".to_string(), "CNV".to_string(), "SV".to_string()]
}

fn default_max_family_phenotypes() -> usize { 4 }

fn default_create_only_fields() -> Vec<String> {
    vec!["ingestion_ids".to_string()]
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            accessioning_required: default_accessioning_required(),
            pedigree_required: default_pedigree_required(),
            additional_fields: default_additional_fields(),
            genome_builds: default_genome_builds(),
            variant_types: default_variant_types(),
            max_family_phenotypes: default_max_family_phenotypes(),
            create_only_fields: default_create_only_fields(),
        }
    }
}

// ── Helper Methods ─────────────────────────────────────────────────────────────

impl SubmissionConfig {
    /// Load from YAML file
    pub fn from_yaml(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from JSON file
    pub fn from_json(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to YAML file
    pub fn to_yaml(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn required_columns(&self, submission_type: SubmissionType) -> &[String] {
        match submission_type {
            SubmissionType::Accessioning  => &self.accessioning_required,
            SubmissionType::FamilyHistory => &self.pedigree_required,
        }
    }

    pub fn additional_fields_for(&self, kind: EntityKind) -> &[String] {
        self.additional_fields
            .get(kind.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn canonical_genome_build(&self, raw: &str) -> Option<String> {
        self.genome_builds.get(&raw.trim().to_lowercase()).cloned()
    }

    pub fn canonical_variant_type(&self, raw: &str) -> Option<String> {
        self.variant_types
            .iter()
            .find(|v| v.eq_ignore_ascii_case(raw.trim()))
            .cloned()
    }

    pub fn is_create_only(&self, field: &str) -> bool {
        self.create_only_fields.iter().any(|f| f == field)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SubmissionConfig::default();
        assert!(config.required_columns(SubmissionType::FamilyHistory).contains(&"sex".to_string()));
        assert!(config.required_columns(SubmissionType::Accessioning).contains(&"analysis id".to_string()));
        assert_eq!(config.max_family_phenotypes, 4);
        assert!(config.is_create_only("ingestion_ids"));
    }

    #[test]
    fn test_vocabularies() {
        let config = SubmissionConfig::default();
        assert_eq!(config.canonical_genome_build(" HG38 ").as_deref(), Some("GRCh38"));
        assert_eq!(config.canonical_genome_build("grch37").as_deref(), Some("GRCh37"));
        assert!(config.canonical_genome_build("hg17").is_none());
        assert_eq!(config.canonical_variant_type("snv").as_deref(), Some("SNV"));
        assert!(config.canonical_variant_type("indel").is_none());
    }

    #[test]
    fn test_submission_type_parse() {
        assert_eq!(SubmissionType::parse("Accessioning"), Some(SubmissionType::Accessioning));
        assert_eq!(SubmissionType::parse("family history"), Some(SubmissionType::FamilyHistory));
        assert_eq!(SubmissionType::parse("pedigree"), Some(SubmissionType::FamilyHistory));
        assert_eq!(SubmissionType::parse("metadata"), None);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "max_family_phenotypes: 2\nvariant_types: [SNV]\n";
        let parsed: SubmissionConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.max_family_phenotypes, 2);
        assert_eq!(parsed.variant_types, vec!["SNV".to_string()]);
        assert_eq!(parsed.pedigree_required, default_pedigree_required());
        assert!(!parsed.additional_fields_for(EntityKind::Individual).is_empty());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = SubmissionConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: SubmissionConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.genome_builds, parsed.genome_builds);
    }
}
