//! npm manifests: `package.json` and `package-lock.json`.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use super::{Analyzer, EnabledSwitch, FileFilter};
use crate::engine::{AnalysisPhase, DependencyRegistry};
use crate::error::AnalysisError;
use crate::model::{Confidence, Dependency, DependencyState, Ecosystem, Evidence, EvidenceType};

#[derive(Deserialize)]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
    license: Option<License>,
    author: Option<Author>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum License {
    Spdx(String),
    Object {
        #[serde(rename = "type")]
        kind: String,
    },
}

impl License {
    fn into_id(self) -> String {
        match self {
            License::Spdx(id) => id,
            License::Object { kind } => kind,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Author {
    Name(String),
    Object { name: Option<String> },
}

#[derive(Deserialize)]
struct PackageLock {
    /// lockfileVersion 2 and 3
    packages: Option<BTreeMap<String, LockedPackage>>,
    /// lockfileVersion 1
    dependencies: Option<BTreeMap<String, LegacyLockedPackage>>,
}

#[derive(Deserialize)]
struct LockedPackage {
    name: Option<String>,
    version: Option<String>,
    license: Option<License>,
    #[serde(default)]
    link: bool,
}

#[derive(Deserialize)]
struct LegacyLockedPackage {
    version: Option<String>,
    dependencies: Option<BTreeMap<String, LegacyLockedPackage>>,
}

fn record_package(
    state: &mut DependencyState,
    source: &str,
    name: &str,
    version: Option<&str>,
    confidence: Confidence,
) {
    state.ecosystem = Some(Ecosystem::Npm);
    state.name = Some(name.to_string());
    state.evidence.add(
        EvidenceType::Product,
        Evidence::new(source, "name", name, confidence),
    );
    state.evidence.add(
        EvidenceType::Vendor,
        Evidence::new(source, "name", name, confidence),
    );
    if let Some(version) = version {
        state.version = Some(version.to_string());
        state.evidence.add(
            EvidenceType::Version,
            Evidence::new(source, "version", version, confidence),
        );
        state.display_name = format!("{}:{}", name, version);
    } else {
        state.display_name = name.to_string();
    }
}

/// Reads `package.json` for name, version, license and author.
pub struct NodePackageAnalyzer {
    switch: EnabledSwitch,
    filter: FileFilter,
}

impl NodePackageAnalyzer {
    pub fn new() -> Self {
        Self {
            switch: EnabledSwitch::new(),
            filter: FileFilter::new().with_file_names(&["package.json"]),
        }
    }
}

impl Default for NodePackageAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for NodePackageAnalyzer {
    fn name(&self) -> &str {
        "Node.js Package Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::InformationCollection
    }

    fn enabled_setting_key(&self) -> &str {
        "node_package"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    fn file_filter(&self) -> Option<&FileFilter> {
        Some(&self.filter)
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        _registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        let content = tokio::fs::read_to_string(dependency.actual_file_path()).await?;
        let manifest: PackageJson = serde_json::from_str(&content)?;

        let Some(name) = manifest.name.filter(|n| !n.is_empty()) else {
            dependency.update(|s| s.ecosystem = Some(Ecosystem::Npm));
            return Ok(());
        };

        dependency.update(|s| {
            record_package(
                s,
                "package.json",
                &name,
                manifest.version.as_deref().filter(|v| !v.is_empty()),
                Confidence::Highest,
            );
            s.license = manifest.license.map(License::into_id);
            let author = match manifest.author {
                Some(Author::Name(name)) => Some(name),
                Some(Author::Object { name }) => name,
                None => None,
            };
            if let Some(author) = author {
                s.evidence.add(
                    EvidenceType::Vendor,
                    Evidence::new("package.json", "author", author, Confidence::Low),
                );
            }
        });
        Ok(())
    }
}

/// Expands a lock file into one virtual dependency per locked package,
/// then removes the lock file itself from the registry.
pub struct NodeLockAnalyzer {
    switch: EnabledSwitch,
    filter: FileFilter,
}

impl NodeLockAnalyzer {
    pub fn new() -> Self {
        Self {
            switch: EnabledSwitch::new(),
            filter: FileFilter::new().with_file_names(&["package-lock.json", "npm-shrinkwrap.json"]),
        }
    }
}

impl Default for NodeLockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

struct Locked {
    name: String,
    version: Option<String>,
    license: Option<String>,
}

fn collect_legacy(deps: &BTreeMap<String, LegacyLockedPackage>, out: &mut Vec<Locked>) {
    for (name, package) in deps {
        out.push(Locked {
            name: name.clone(),
            version: package.version.clone(),
            license: None,
        });
        if let Some(nested) = &package.dependencies {
            collect_legacy(nested, out);
        }
    }
}

fn locked_packages(lock: PackageLock) -> Vec<Locked> {
    let mut out = Vec::new();
    if let Some(packages) = lock.packages {
        for (path, package) in packages {
            // "" is the project itself
            if path.is_empty() || package.link {
                continue;
            }
            let name = package.name.unwrap_or_else(|| match path.rfind("node_modules/") {
                Some(pos) => path[pos + "node_modules/".len()..].to_string(),
                None => path.clone(),
            });
            out.push(Locked {
                name,
                version: package.version,
                license: package.license.map(License::into_id),
            });
        }
    } else if let Some(deps) = lock.dependencies {
        collect_legacy(&deps, &mut out);
    }
    out
}

#[async_trait]
impl Analyzer for NodeLockAnalyzer {
    fn name(&self) -> &str {
        "Node.js Lock File Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::PreInformationCollection
    }

    fn enabled_setting_key(&self) -> &str {
        "node_lock"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    fn file_filter(&self) -> Option<&FileFilter> {
        Some(&self.filter)
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        let manifest = dependency.actual_file_path();
        let content = tokio::fs::read_to_string(manifest).await?;
        let lock: PackageLock = serde_json::from_str(&content)?;

        let mut seen = BTreeSet::new();
        let mut spawned = 0usize;
        for locked in locked_packages(lock) {
            if !seen.insert((locked.name.clone(), locked.version.clone())) {
                continue;
            }
            let display = match &locked.version {
                Some(v) => format!("{}:{}", locked.name, v),
                None => locked.name.clone(),
            };
            let child = Dependency::new_virtual(manifest, display);
            child.update(|s| {
                record_package(
                    s,
                    "package-lock.json",
                    &locked.name,
                    locked.version.as_deref(),
                    Confidence::Highest,
                );
                s.license = locked.license.clone();
            });
            registry.add(child);
            spawned += 1;
        }

        registry.remove(dependency);
        debug!(manifest = %manifest.display(), spawned, "Expanded lock file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_package_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "package.json",
            r#"{"name": "express", "version": "4.17.1", "license": "MIT", "author": {"name": "TJ Holowaychuk"}}"#,
        );
        let registry = DependencyRegistry::new();
        let dep = registry.add(Dependency::new(path));

        NodePackageAnalyzer::new().analyze(&dep, &registry).await.unwrap();

        dep.read(|s| {
            assert_eq!(s.ecosystem, Some(Ecosystem::Npm));
            assert_eq!(s.name.as_deref(), Some("express"));
            assert_eq!(s.version.as_deref(), Some("4.17.1"));
            assert_eq!(s.license.as_deref(), Some("MIT"));
            assert_eq!(s.display_name, "express:4.17.1");
            assert!(s.evidence.contains_confidence(EvidenceType::Product, Confidence::Highest));
            assert_eq!(s.evidence.get(EvidenceType::Vendor).len(), 2);
        });
    }

    #[tokio::test]
    async fn test_malformed_package_json_is_data_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "package.json", "{ not json");
        let registry = DependencyRegistry::new();
        let dep = registry.add(Dependency::new(path));

        let err = NodePackageAnalyzer::new().analyze(&dep, &registry).await.unwrap_err();
        assert!(matches!(err, AnalysisError::DataCorruption(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_transient_io() {
        let registry = DependencyRegistry::new();
        let dep = registry.add(Dependency::new("/nonexistent/package.json"));
        let err = NodePackageAnalyzer::new().analyze(&dep, &registry).await.unwrap_err();
        assert!(matches!(err, AnalysisError::TransientIo(_)));
    }

    #[tokio::test]
    async fn test_lock_v2_spawns_children_and_removes_itself() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "package-lock.json",
            r#"{
  "name": "app",
  "lockfileVersion": 3,
  "packages": {
    "": { "name": "app", "version": "1.0.0" },
    "node_modules/lodash": { "version": "4.17.20", "license": "MIT" },
    "node_modules/@babel/core": { "version": "7.22.0" },
    "node_modules/a/node_modules/lodash": { "version": "4.17.20" },
    "packages/local": { "link": true }
  }
}"#,
        );
        let registry = DependencyRegistry::new();
        let lock = registry.add(Dependency::new(&path));

        NodeLockAnalyzer::new().analyze(&lock, &registry).await.unwrap();

        assert!(!registry.contains(&lock));
        let mut names: Vec<String> = registry.snapshot().iter().map(|d| d.display_name()).collect();
        names.sort();
        assert_eq!(names, vec!["@babel/core:7.22.0", "lodash:4.17.20"]);
        for child in registry.snapshot() {
            assert!(child.is_virtual());
            assert_eq!(child.actual_file_path(), path.as_path());
            assert_eq!(child.ecosystem(), Some(Ecosystem::Npm));
        }
    }

    #[tokio::test]
    async fn test_lock_v1_nested_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "package-lock.json",
            r#"{
  "lockfileVersion": 1,
  "dependencies": {
    "minimist": { "version": "1.2.5" },
    "mkdirp": { "version": "0.5.1", "dependencies": { "minimist": { "version": "0.0.8" } } }
  }
}"#,
        );
        let registry = DependencyRegistry::new();
        let lock = registry.add(Dependency::new(&path));

        NodeLockAnalyzer::new().analyze(&lock, &registry).await.unwrap();

        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_lock_keeps_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "package-lock.json", "[1, 2");
        let registry = DependencyRegistry::new();
        let lock = registry.add(Dependency::new(&path));

        let err = NodeLockAnalyzer::new().analyze(&lock, &registry).await.unwrap_err();
        assert!(matches!(err, AnalysisError::DataCorruption(_)));
        assert!(registry.contains(&lock));
    }
}
