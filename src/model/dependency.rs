use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{EvidenceCollection, Identifier, Vulnerability};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pypi,
    Golang,
    Nuget,
    Maven,
    Ruby,
    Cargo,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Golang => "golang",
            Ecosystem::Nuget => "nuget",
            Ecosystem::Maven => "maven",
            Ecosystem::Ruby => "ruby",
            Ecosystem::Cargo => "cargo",
        }
    }

    /// Package URL type for this ecosystem.
    pub fn purl_type(&self) -> &'static str {
        match self {
            Ecosystem::Golang => "golang",
            Ecosystem::Ruby => "gem",
            other => other.as_str(),
        }
    }

    /// Ecosystem name as used by OSV.dev.
    pub fn osv_name(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "PyPI",
            Ecosystem::Golang => "Go",
            Ecosystem::Nuget => "NuGet",
            Ecosystem::Maven => "Maven",
            Ecosystem::Ruby => "RubyGems",
            Ecosystem::Cargo => "crates.io",
        }
    }

    pub fn from_purl_type(ty: &str) -> Option<Self> {
        match ty {
            "gem" => Some(Ecosystem::Ruby),
            "go" => Some(Ecosystem::Golang),
            other => other.parse().ok(),
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "npm" | "node" | "nodejs" => Ok(Ecosystem::Npm),
            "pypi" | "python" => Ok(Ecosystem::Pypi),
            "golang" | "go" => Ok(Ecosystem::Golang),
            "nuget" | ".net" => Ok(Ecosystem::Nuget),
            "maven" | "java" => Ok(Ecosystem::Maven),
            "ruby" | "gem" => Ok(Ecosystem::Ruby),
            "cargo" | "rust" => Ok(Ecosystem::Cargo),
            _ => Err(format!("Unknown ecosystem: {}", s)),
        }
    }
}

/// A dependency folded into another one by deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedDependency {
    pub display_name: String,
    pub file_path: PathBuf,
}

/// Mutable analysis state of a dependency.
#[derive(Debug, Clone, Default)]
pub struct DependencyState {
    pub display_name: String,
    pub ecosystem: Option<Ecosystem>,
    pub evidence: EvidenceCollection,
    pub software_identifiers: BTreeMap<String, Identifier>,
    pub vulnerable_identifiers: BTreeMap<String, Identifier>,
    pub suppressed_identifiers: BTreeMap<String, Identifier>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub license: Option<String>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub suppressed_vulnerabilities: Vec<Vulnerability>,
    pub related: Vec<RelatedDependency>,
}

impl DependencyState {
    pub fn add_software_identifier(&mut self, identifier: Identifier) {
        insert_identifier(&mut self.software_identifiers, identifier);
    }

    pub fn add_vulnerable_identifier(&mut self, identifier: Identifier) {
        insert_identifier(&mut self.vulnerable_identifiers, identifier);
    }

    pub fn add_suppressed_identifier(&mut self, identifier: Identifier) {
        insert_identifier(&mut self.suppressed_identifiers, identifier);
    }

    /// Adds a vulnerability unless the same finding is already attached.
    pub fn add_vulnerability(&mut self, vulnerability: Vulnerability) -> bool {
        if self.vulnerabilities.iter().any(|v| v.same_as(&vulnerability)) {
            return false;
        }
        self.vulnerabilities.push(vulnerability);
        true
    }

    pub fn add_suppressed_vulnerability(&mut self, vulnerability: Vulnerability) -> bool {
        if self
            .suppressed_vulnerabilities
            .iter()
            .any(|v| v.same_as(&vulnerability))
        {
            return false;
        }
        self.suppressed_vulnerabilities.push(vulnerability);
        true
    }

    pub fn add_related(&mut self, related: RelatedDependency) {
        if !self.related.contains(&related) {
            self.related.push(related);
        }
    }
}

// The higher-confidence copy wins when the same identifier is seen twice.
fn insert_identifier(set: &mut BTreeMap<String, Identifier>, identifier: Identifier) {
    let key = identifier.canonical();
    match set.get(&key) {
        Some(existing) if existing.confidence >= identifier.confidence => {}
        _ => {
            set.insert(key, identifier);
        }
    }
}

/// A component under analysis.
///
/// Identity (paths, virtual flag) is fixed at construction. Everything an
/// analyzer may change lives in [`DependencyState`] behind a mutex, so a
/// dependency can be shared as `Arc<Dependency>` between the registry and
/// in-flight analyzer invocations.
#[derive(Debug)]
pub struct Dependency {
    id: u64,
    file_path: PathBuf,
    actual_file_path: PathBuf,
    file_name: String,
    is_virtual: bool,
    sha1: Option<String>,
    state: Mutex<DependencyState>,
}

impl Dependency {
    /// A dependency discovered on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = file_name_of(&path);
        Self::build(path.clone(), path, file_name, false)
    }

    /// A dependency discovered on disk, with the SHA-1 of its contents.
    pub fn from_file(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let digest = file_sha1(&path)?;
        Ok(Self::new(path).with_sha1(digest))
    }

    /// A dependency synthesized from a manifest.
    ///
    /// `actual_file_path` stays the manifest; `file_path` gets a `?name`
    /// suffix so each child has a distinct display path.
    pub fn new_virtual(manifest: &Path, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let file_path = PathBuf::from(format!("{}?{}", manifest.display(), display_name));
        Self::build(file_path, manifest.to_path_buf(), display_name, true)
    }

    fn build(file_path: PathBuf, actual_file_path: PathBuf, file_name: String, is_virtual: bool) -> Self {
        let state = DependencyState {
            display_name: file_name.clone(),
            ..DependencyState::default()
        };
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            file_path,
            actual_file_path,
            file_name,
            is_virtual,
            sha1: None,
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn actual_file_path(&self) -> &Path {
        &self.actual_file_path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Lowercase hex SHA-1 of the file contents; `None` for virtual
    /// dependencies.
    pub fn sha1(&self) -> Option<&str> {
        self.sha1.as_deref()
    }

    pub fn with_sha1(mut self, sha1: impl Into<String>) -> Self {
        if !self.is_virtual {
            self.sha1 = Some(sha1.into());
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, DependencyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with shared access to the state.
    pub fn read<R>(&self, f: impl FnOnce(&DependencyState) -> R) -> R {
        f(&self.lock())
    }

    /// Runs `f` with exclusive access to the state.
    pub fn update<R>(&self, f: impl FnOnce(&mut DependencyState) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn display_name(&self) -> String {
        self.read(|s| s.display_name.clone())
    }

    /// Name used for sorting and reports: the resolved name, else the display name.
    pub fn name(&self) -> String {
        self.read(|s| s.name.clone().unwrap_or_else(|| s.display_name.clone()))
    }

    pub fn version(&self) -> Option<String> {
        self.read(|s| s.version.clone())
    }

    pub fn ecosystem(&self) -> Option<Ecosystem> {
        self.read(|s| s.ecosystem)
    }

    pub fn with_ecosystem(self, ecosystem: Ecosystem) -> Self {
        self.update(|s| s.ecosystem = Some(ecosystem));
        self
    }

    pub fn as_related(&self) -> RelatedDependency {
        RelatedDependency {
            display_name: self.display_name(),
            file_path: self.file_path.clone(),
        }
    }
}

pub fn file_sha1(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confidence, VulnerabilitySource};

    #[test]
    fn test_new_dependency_identity() {
        let dep = Dependency::new("/app/lib/spring-core-4.1.jar");
        assert_eq!(dep.file_name(), "spring-core-4.1.jar");
        assert_eq!(dep.display_name(), "spring-core-4.1.jar");
        assert_eq!(dep.file_path(), dep.actual_file_path());
        assert!(!dep.is_virtual());
    }

    #[test]
    fn test_virtual_dependency_keeps_manifest_as_actual_path() {
        let manifest = Path::new("/app/package-lock.json");
        let child = Dependency::new_virtual(manifest, "lodash:4.17.21");
        assert!(child.is_virtual());
        assert_eq!(child.actual_file_path(), manifest);
        assert_eq!(
            child.file_path(),
            Path::new("/app/package-lock.json?lodash:4.17.21")
        );
    }

    #[test]
    fn test_from_file_hashes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.jar");
        std::fs::write(&path, "hello").unwrap();

        let dep = Dependency::from_file(&path).unwrap();
        assert_eq!(dep.sha1(), Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"));
        assert!(Dependency::from_file(dir.path().join("missing.jar")).is_err());
    }

    #[test]
    fn test_virtual_dependency_has_no_hash() {
        let child = Dependency::new_virtual(Path::new("/app/package-lock.json"), "ms:2.1.3").with_sha1("abc");
        assert_eq!(child.sha1(), None);
        assert_eq!(Dependency::new("a.jar").sha1(), None);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Dependency::new("a.jar");
        let b = Dependency::new("a.jar");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_identifiers_unique_by_canonical_form() {
        let dep = Dependency::new("lodash");
        dep.update(|s| {
            s.add_vulnerable_identifier(Identifier::parse("pkg:npm/lodash@4.17.21", Confidence::Low));
            s.add_vulnerable_identifier(Identifier::parse("pkg:npm/lodash@4.17.21", Confidence::High));
            s.add_vulnerable_identifier(Identifier::parse("pkg:npm/lodash@4.17.21", Confidence::Medium));
        });
        dep.read(|s| {
            assert_eq!(s.vulnerable_identifiers.len(), 1);
            let only = s.vulnerable_identifiers.values().next().unwrap();
            assert_eq!(only.confidence, Confidence::High);
        });
    }

    #[test]
    fn test_vulnerabilities_deduplicated() {
        let dep = Dependency::new("lodash");
        dep.update(|s| {
            assert!(s.add_vulnerability(Vulnerability::new("CVE-1", VulnerabilitySource::Nvd)));
            assert!(!s.add_vulnerability(Vulnerability::new("CVE-1", VulnerabilitySource::Nvd)));
            assert!(s.add_vulnerability(Vulnerability::new("CVE-1", VulnerabilitySource::Osv)));
        });
        assert_eq!(dep.read(|s| s.vulnerabilities.len()), 2);
    }

    #[test]
    fn test_ecosystem_parsing() {
        assert_eq!("NPM".parse::<Ecosystem>(), Ok(Ecosystem::Npm));
        assert_eq!("go".parse::<Ecosystem>(), Ok(Ecosystem::Golang));
        assert_eq!(Ecosystem::from_purl_type("gem"), Some(Ecosystem::Ruby));
        assert!("cobol".parse::<Ecosystem>().is_err());
        assert_eq!(Ecosystem::Ruby.purl_type(), "gem");
    }

    #[test]
    fn test_name_falls_back_to_display_name() {
        let dep = Dependency::new("left-pad-1.0.0.tgz");
        assert_eq!(dep.name(), "left-pad-1.0.0.tgz");
        dep.update(|s| s.name = Some("left-pad".to_string()));
        assert_eq!(dep.name(), "left-pad");
    }
}
