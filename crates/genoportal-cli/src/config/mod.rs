//! Configuration loading for genoportal.
//! Reads genoportal.toml from the current directory or path in GENOPORTAL_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;

use genoportal_common::SubmissionConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub submission: SubmissionSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_institution")]
    pub institution: String,
}

fn default_project()     -> String { "DEFAULT".to_string() }
fn default_institution() -> String { "DEFAULT".to_string() }

impl Default for PortalConfig {
    fn default() -> Self {
        Self { project: default_project(), institution: default_institution() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot holding items, schemas and the file-format registry.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "./genoportal-store.json".to_string() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionSection {
    /// Optional YAML or JSON file overriding the submission defaults.
    pub config_path: Option<String>,
}


impl Config {
    /// Load configuration from genoportal.toml.
    /// Checks GENOPORTAL_CONFIG env var first, then current directory. A
    /// missing default file means defaults; a missing explicit one is an error.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("GENOPORTAL_CONFIG") {
            Ok(path) => {
                if !Path::new(&path).exists() {
                    anyhow::bail!("Config file not found: {}", path);
                }
                Self::from_file(&path)
            }
            Err(_) if Path::new("genoportal.toml").exists() => Self::from_file("genoportal.toml"),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The submission rules, from `submission.config_path` when set.
    pub fn submission_config(&self) -> anyhow::Result<SubmissionConfig> {
        match &self.submission.config_path {
            Some(path) if path.ends_with(".json") => SubmissionConfig::from_json(path),
            Some(path) => SubmissionConfig::from_yaml(path),
            None => Ok(SubmissionConfig::default()),
        }
    }
}
