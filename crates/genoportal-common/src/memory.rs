//! In-process repository.
//!
//! Backs the CLI's local store and the test suites. Items are indexed by id
//! and by every alias they carry; the whole store round-trips through a JSON
//! snapshot so repeated runs see earlier commits.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entities::EntityKind;
use crate::error::{PortalError, Result};
use crate::repository::{
    FieldKind, FileFormat, ItemSchema, PersistedItem, Repository, ValidationIssue, ValidationMode,
};

/// Serialisable contents of a [`MemoryRepository`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub items: Vec<PersistedItem>,
    #[serde(default)]
    pub schemas: BTreeMap<String, ItemSchema>,
    #[serde(default)]
    pub file_formats: Vec<FileFormat>,
}

#[derive(Debug, Default)]
struct Store {
    items: BTreeMap<String, PersistedItem>,
    aliases: BTreeMap<String, String>,
}

impl Store {
    fn insert(&mut self, item: PersistedItem) {
        for alias in item.aliases() {
            self.aliases.insert(alias.to_string(), item.id.clone());
        }
        self.items.insert(item.id.clone(), item);
    }

    fn find(&self, key: &str) -> Option<&PersistedItem> {
        self.items
            .get(key)
            .or_else(|| self.aliases.get(key).and_then(|id| self.items.get(id)))
    }
}

/// Repository held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    store: RwLock<Store>,
    schemas: BTreeMap<String, ItemSchema>,
    file_formats: Vec<FileFormat>,
    /// Aliases whose creation is refused (failure injection).
    rejected_creates: BTreeSet<String>,
    /// Keys whose lookup fails as if the server were unreachable.
    failing_lookups: BTreeSet<String>,
}

impl MemoryRepository {
    pub fn new(schemas: BTreeMap<String, ItemSchema>, file_formats: Vec<FileFormat>) -> Self {
        Self { schemas, file_formats, ..Default::default() }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut store = Store::default();
        for item in snapshot.items {
            store.insert(item);
        }
        Self {
            store: RwLock::new(store),
            schemas: snapshot.schemas,
            file_formats: snapshot.file_formats,
            ..Default::default()
        }
    }

    /// Fall back to `formats` when the snapshot carried no file-format registry.
    pub fn with_default_file_formats(mut self, formats: Vec<FileFormat>) -> Self {
        if self.file_formats.is_empty() {
            self.file_formats = formats;
        }
        self
    }

    /// Load from a JSON snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current contents to a JSON snapshot file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.snapshot().await)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub async fn snapshot(&self) -> Snapshot {
        let store = self.store.read().await;
        Snapshot {
            items: store.items.values().cloned().collect(),
            schemas: self.schemas.clone(),
            file_formats: self.file_formats.clone(),
        }
    }

    /// Seed an already-persisted item.
    pub async fn insert(&self, item: PersistedItem) {
        self.store.write().await.insert(item);
    }

    pub fn reject_create_of(mut self, alias: impl Into<String>) -> Self {
        self.rejected_creates.insert(alias.into());
        self
    }

    pub fn fail_lookup_of(mut self, key: impl Into<String>) -> Self {
        self.failing_lookups.insert(key.into());
        self
    }

    pub async fn item_count(&self, kind: EntityKind) -> usize {
        let store = self.store.read().await;
        store.items.values().filter(|i| i.item_type == kind.as_str()).count()
    }

    fn schema_for(&self, kind: EntityKind) -> ItemSchema {
        self.schemas.get(kind.as_str()).cloned().unwrap_or_else(|| ItemSchema {
            item_type: kind.as_str().to_string(),
            additional_properties: true,
            ..Default::default()
        })
    }

    fn check(store: &Store, schema: &ItemSchema, item: &Map<String, Value>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for field in &schema.required {
            if !item.contains_key(field) {
                issues.push(ValidationIssue::new(None, format!("'{}' is a required property", field)));
            }
        }

        for (field, value) in item {
            match schema.properties.get(field) {
                None if !schema.additional_properties => {
                    issues.push(ValidationIssue::new(
                        None,
                        format!("Additional properties are not allowed ('{}' was unexpected)", field),
                    ));
                }
                Some(FieldKind::Link) => {
                    if let Some(target) = value.as_str() {
                        if store.find(target).is_none() {
                            issues.push(ValidationIssue::unresolved_link(field, target));
                        }
                    }
                }
                Some(FieldKind::LinkArray) => {
                    for target in value.as_array().into_iter().flatten().filter_map(Value::as_str) {
                        if store.find(target).is_none() {
                            issues.push(ValidationIssue::unresolved_link(field, target));
                        }
                    }
                }
                _ => {}
            }
        }
        issues
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get(&self, alias_or_key: &str) -> Result<Option<PersistedItem>> {
        if self.failing_lookups.contains(alias_or_key) {
            return Err(PortalError::Repository(format!("lookup of {} timed out", alias_or_key)));
        }
        Ok(self.store.read().await.find(alias_or_key).cloned())
    }

    async fn get_schema(&self, kind: EntityKind) -> Result<ItemSchema> {
        Ok(self.schema_for(kind))
    }

    async fn validate(
        &self,
        kind: EntityKind,
        item: &Map<String, Value>,
        mode: &ValidationMode,
    ) -> Result<Vec<ValidationIssue>> {
        let schema = self.schema_for(kind);
        let store = self.store.read().await;
        match mode {
            ValidationMode::Create => Ok(Self::check(&store, &schema, item)),
            ValidationMode::Patch { id } => {
                let existing = store
                    .items
                    .get(id)
                    .ok_or_else(|| PortalError::NotFound(id.clone()))?;
                let mut merged = existing.properties.clone();
                merged.extend(item.clone());
                Ok(Self::check(&store, &schema, &merged))
            }
        }
    }

    async fn create(&self, kind: EntityKind, item: &Map<String, Value>) -> Result<String> {
        let candidate = PersistedItem {
            id: format!("/{}/{}/", kind.collection(), Uuid::new_v4()),
            item_type: kind.as_str().to_string(),
            properties: item.clone(),
        };
        if let Some(alias) = candidate.aliases().into_iter().find(|a| self.rejected_creates.contains(*a)) {
            return Err(PortalError::Repository(format!("create of {} was refused", alias)));
        }

        let mut store = self.store.write().await;
        if let Some(alias) = candidate.aliases().into_iter().find(|a| store.aliases.contains_key(*a)) {
            return Err(PortalError::Repository(format!("alias {} already exists", alias)));
        }
        let id = candidate.id.clone();
        tracing::debug!(item_type = kind.as_str(), id = %id, "Created item");
        store.insert(candidate);
        Ok(id)
    }

    async fn patch(&self, id: &str, patch: &Map<String, Value>) -> Result<()> {
        let mut store = self.store.write().await;
        let mut item = store
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| PortalError::NotFound(id.to_string()))?;
        item.properties.extend(patch.clone());
        store.insert(item);
        Ok(())
    }

    async fn file_formats(&self) -> Result<Vec<FileFormat>> {
        Ok(self.file_formats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn individual_schema() -> ItemSchema {
        let mut properties = BTreeMap::new();
        properties.insert("individual_id".to_string(), FieldKind::Scalar);
        properties.insert("mother".to_string(), FieldKind::Link);
        properties.insert("aliases".to_string(), FieldKind::ScalarArray);
        ItemSchema {
            item_type: "individual".into(),
            properties,
            required: vec!["individual_id".into()],
            additional_properties: false,
        }
    }

    fn repo() -> MemoryRepository {
        let mut schemas = BTreeMap::new();
        schemas.insert("individual".to_string(), individual_schema());
        MemoryRepository::new(schemas, Vec::new())
    }

    #[tokio::test]
    async fn test_create_then_get_by_alias() {
        let repo = repo();
        let item = props(json!({"aliases": ["TEST:individual-IND1"], "individual_id": "IND1"}));
        let id = repo.create(EntityKind::Individual, &item).await.unwrap();

        let found = repo.get("TEST:individual-IND1").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(id.starts_with("/individuals/"));
        assert_eq!(repo.item_count(EntityKind::Individual).await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_alias_is_refused() {
        let repo = repo();
        let item = props(json!({"aliases": ["TEST:individual-IND1"], "individual_id": "IND1"}));
        tokio_test::assert_ok!(repo.create(EntityKind::Individual, &item).await);
        tokio_test::assert_err!(repo.create(EntityKind::Individual, &item).await);
    }

    #[tokio::test]
    async fn test_validation_reports_required_unknown_and_links() {
        let repo = repo();
        let item = props(json!({"mother": "TEST:individual-IND2", "colour": "blue"}));
        let issues = repo.validate(EntityKind::Individual, &item, &ValidationMode::Create).await.unwrap();

        let messages: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
        assert_eq!(issues.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("'individual_id' is a required property")));
        assert!(messages.iter().any(|m| m.contains("'colour' was unexpected")));
        assert!(messages.iter().any(|m| m.contains("TEST:individual-IND2")));
        let targets: Vec<&str> = issues.iter().filter_map(|i| i.target.as_deref()).collect();
        assert_eq!(targets, vec!["TEST:individual-IND2"]);
    }

    #[tokio::test]
    async fn test_default_file_formats_only_fill_an_empty_registry() {
        let empty = MemoryRepository::default().with_default_file_formats(FileFormat::standard_catalog());
        assert_eq!(empty.file_formats().await.unwrap().len(), 7);

        let custom = vec![FileFormat::new("txt", "txt", &[], &[])];
        let seeded = MemoryRepository::new(BTreeMap::new(), custom.clone())
            .with_default_file_formats(FileFormat::standard_catalog());
        assert_eq!(seeded.file_formats().await.unwrap(), custom);
    }

    #[tokio::test]
    async fn test_patch_merges_properties() {
        let repo = repo();
        let item = props(json!({"aliases": ["TEST:individual-IND1"], "individual_id": "IND1"}));
        let id = repo.create(EntityKind::Individual, &item).await.unwrap();
        repo.patch(&id, &props(json!({"sex": "F"}))).await.unwrap();

        let found = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(found.properties["sex"], json!("F"));
        assert_eq!(found.properties["individual_id"], json!("IND1"));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let repo = repo()
            .reject_create_of("TEST:individual-BAD")
            .fail_lookup_of("TEST:family-X");
        let item = props(json!({"aliases": ["TEST:individual-BAD"], "individual_id": "BAD"}));
        tokio_test::assert_err!(repo.create(EntityKind::Individual, &item).await);
        tokio_test::assert_err!(repo.get("TEST:family-X").await);
        assert!(repo.get("TEST:family-Y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_keeps_alias_index() {
        let repo = repo();
        let item = props(json!({"aliases": ["TEST:individual-IND1"], "individual_id": "IND1"}));
        repo.create(EntityKind::Individual, &item).await.unwrap();

        let restored = MemoryRepository::from_snapshot(repo.snapshot().await);
        assert!(restored.get("TEST:individual-IND1").await.unwrap().is_some());
    }
}
