//! Vulnerability datastores keyed by identifier.

mod osv;

pub use osv::OsvDatastore;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::{DatastoreKind, Settings};
use crate::error::AnalysisError;
use crate::model::{Identifier, Vulnerability};

#[async_trait]
pub trait VulnerabilityDatastore: Send + Sync {
    fn name(&self) -> &str;

    /// Checks the datastore is usable before any phase runs.
    async fn preflight(&self) -> Result<(), AnalysisError> {
        Ok(())
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Vec<Vulnerability>, AnalysisError>;
}

/// An in-memory datastore, optionally loaded from a JSON file mapping
/// canonical identifiers to vulnerability lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalDatastore {
    entries: HashMap<String, Vec<Vulnerability>>,
}

impl LocalDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read datastore {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse datastore {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn insert(&mut self, identifier: impl Into<String>, vulnerability: Vulnerability) {
        self.entries
            .entry(identifier.into())
            .or_default()
            .push(vulnerability);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VulnerabilityDatastore for LocalDatastore {
    fn name(&self) -> &str {
        "local"
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Vec<Vulnerability>, AnalysisError> {
        Ok(self
            .entries
            .get(&identifier.canonical())
            .cloned()
            .unwrap_or_default())
    }
}

/// Opens the datastore selected in `settings`.
pub fn open_datastore(settings: &Settings) -> Result<Arc<dyn VulnerabilityDatastore>> {
    match settings.datastore.kind {
        DatastoreKind::Local => {
            let store = match &settings.datastore.path {
                Some(path) => LocalDatastore::load(path)?,
                None => LocalDatastore::new(),
            };
            Ok(Arc::new(store))
        }
        DatastoreKind::Osv => Ok(Arc::new(OsvDatastore::new(Cache::new(
            settings.datastore.cache_ttl_hours,
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confidence, VulnerabilitySource};

    #[tokio::test]
    async fn test_local_lookup_by_canonical_form() {
        let mut store = LocalDatastore::new();
        store.insert(
            "pkg:npm/lodash@4.17.20",
            Vulnerability::new("CVE-2021-23337", VulnerabilitySource::Nvd),
        );

        let hit = Identifier::parse("pkg:npm/lodash@4.17.20", Confidence::High);
        let miss = Identifier::parse("pkg:npm/lodash@4.17.21", Confidence::High);
        assert_eq!(store.lookup(&hit).await.unwrap().len(), 1);
        assert!(store.lookup(&miss).await.unwrap().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vulns.json");
        std::fs::write(
            &path,
            r#"{
  "pkg:npm/minimist@1.2.5": [
    {
      "name": "CVE-2021-44906",
      "severity": "critical",
      "source": "nvd",
      "vulnerable_software": [{ "identifier": "pkg:npm/minimist@1.2.5", "target_software": "node.js" }]
    }
  ]
}"#,
        )
        .unwrap();

        let store = LocalDatastore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalDatastore::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_open_default_datastore() {
        let store = open_datastore(&Settings::default()).unwrap();
        assert_eq!(store.name(), "local");
    }
}
