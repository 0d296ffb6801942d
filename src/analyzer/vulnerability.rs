use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Analyzer, EnabledSwitch};
use crate::datastore::VulnerabilityDatastore;
use crate::engine::{AnalysisPhase, DependencyRegistry};
use crate::error::AnalysisError;
use crate::model::{Dependency, DependencyState, Ecosystem, Identifier, Vulnerability, VulnerabilitySource};

const ADVISORY_PATHS: &[&str] = &["nodesecurity.io/advisories/", "npmjs.com/advisories/"];
const NODE_TARGETS: &[&str] = &["nodejs", "node.js", "npm", "node_js", "node-js"];
const PYTHON_TARGETS: &[&str] = &["python", "pypi"];

/// Target-software tokens accepted for an ecosystem. Ecosystems without an
/// entry accept every token.
fn target_aliases(ecosystem: Ecosystem) -> Option<&'static [&'static str]> {
    match ecosystem {
        Ecosystem::Npm => Some(NODE_TARGETS),
        Ecosystem::Pypi => Some(PYTHON_TARGETS),
        _ => None,
    }
}

fn target_matches(ecosystem: Option<Ecosystem>, target: Option<&str>) -> bool {
    let target = match target.map(str::trim) {
        None | Some("") | Some("*") | Some("-") => return true,
        Some(t) => t.to_lowercase(),
    };
    match ecosystem.and_then(target_aliases) {
        Some(aliases) => aliases.contains(&target.as_str()),
        None => true,
    }
}

/// Keeps only the affected-software entries that apply to `ecosystem`;
/// vulnerabilities left with none, or that never had any, are dropped.
fn filter_ecosystem(ecosystem: Option<Ecosystem>, vulnerabilities: Vec<Vulnerability>) -> Vec<Vulnerability> {
    vulnerabilities
        .into_iter()
        .filter_map(|mut v| {
            v.vulnerable_software
                .retain(|s| target_matches(ecosystem, s.target_software.as_deref()));
            (!v.vulnerable_software.is_empty()).then_some(v)
        })
        .collect()
}

fn advisory_id(url: &str) -> Option<&str> {
    ADVISORY_PATHS.iter().find_map(|path| {
        let start = url.find(path)? + path.len();
        let id = url[start..].split(['/', '?', '#']).next()?;
        (!id.is_empty()).then_some(id)
    })
}

/// Adds `found`, first dropping npm advisories it supersedes.
fn replace_or_add(state: &mut DependencyState, found: Vulnerability) {
    state.vulnerabilities.retain(|existing| {
        let superseded = existing.source == VulnerabilitySource::Npm
            && existing.references.iter().any(|r| {
                advisory_id(&r.url).or_else(|| advisory_id(&r.name)) == Some(found.name.as_str())
            });
        !superseded
    });
    state.add_vulnerability(found);
}

/// Looks up vulnerable-software identifiers in the datastore.
///
/// Findings are filtered by the dependency's ecosystem. Identifiers that
/// were suppressed are looked up too and their findings recorded as
/// suppressed, unfiltered.
pub struct VulnerabilityAnalyzer {
    switch: EnabledSwitch,
    datastore: Arc<dyn VulnerabilityDatastore>,
}

impl VulnerabilityAnalyzer {
    pub fn new(datastore: Arc<dyn VulnerabilityDatastore>) -> Self {
        Self {
            switch: EnabledSwitch::new(),
            datastore,
        }
    }

    async fn lookup_all(&self, identifiers: &[Identifier]) -> Result<Vec<Vulnerability>, AnalysisError> {
        let mut found = Vec::new();
        for identifier in identifiers {
            found.extend(self.datastore.lookup(identifier).await?);
        }
        Ok(found)
    }
}

#[async_trait]
impl Analyzer for VulnerabilityAnalyzer {
    fn name(&self) -> &str {
        "Vulnerability Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::FindingAnalysis
    }

    fn enabled_setting_key(&self) -> &str {
        "vulnerability"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    async fn prepare(&mut self, _registry: &DependencyRegistry) -> Result<(), AnalysisError> {
        self.datastore.preflight().await?;
        info!(datastore = self.datastore.name(), "Vulnerability datastore ready");
        Ok(())
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        _registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        let (ecosystem, vulnerable, suppressed) = dependency.read(|s| {
            (
                s.ecosystem,
                s.vulnerable_identifiers.values().cloned().collect::<Vec<_>>(),
                s.suppressed_identifiers.values().cloned().collect::<Vec<_>>(),
            )
        });

        let active = filter_ecosystem(ecosystem, self.lookup_all(&vulnerable).await?);
        let audit = self.lookup_all(&suppressed).await?;

        let count = active.len();
        dependency.update(|s| {
            for vulnerability in active {
                if ecosystem == Some(Ecosystem::Npm) {
                    replace_or_add(s, vulnerability);
                } else {
                    s.add_vulnerability(vulnerability);
                }
            }
            for vulnerability in audit {
                s.add_suppressed_vulnerability(vulnerability);
            }
        });
        if count > 0 {
            debug!(dependency = %dependency.display_name(), count, "Matched vulnerabilities");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::LocalDatastore;
    use crate::model::{Confidence, Reference, VulnerableSoftware};

    const LODASH: &str = "pkg:npm/lodash@4.17.20";

    fn with_target(name: &str, target: &str) -> Vulnerability {
        Vulnerability::new(name, VulnerabilitySource::Nvd)
            .with_software(VulnerableSoftware::new(LODASH).with_target(target))
    }

    async fn scan(store: LocalDatastore, dep: Dependency) -> Arc<Dependency> {
        let registry = DependencyRegistry::new();
        let dep = registry.add(dep);
        let mut analyzer = VulnerabilityAnalyzer::new(Arc::new(store));
        analyzer.prepare(&registry).await.unwrap();
        analyzer.analyze(&dep, &registry).await.unwrap();
        dep
    }

    fn npm_dependency() -> Dependency {
        let dep = Dependency::new("/app/node_modules/lodash/package.json").with_ecosystem(Ecosystem::Npm);
        dep.update(|s| s.add_vulnerable_identifier(Identifier::parse(LODASH, Confidence::High)));
        dep
    }

    #[tokio::test]
    async fn test_ecosystem_filter() {
        let mut store = LocalDatastore::new();
        store.insert(LODASH, with_target("CVE-ANDROID", "android"));
        store.insert(LODASH, with_target("CVE-ANY", "*"));
        store.insert(LODASH, with_target("CVE-NODE", "node.js"));

        let dep = scan(store, npm_dependency()).await;

        let names: Vec<String> = dep.read(|s| s.vulnerabilities.iter().map(|v| v.name.clone()).collect());
        assert_eq!(names, vec!["CVE-ANY", "CVE-NODE"]);
    }

    #[test]
    fn test_filter_keeps_only_matching_ranges() {
        let v = Vulnerability::new("CVE-MIXED", VulnerabilitySource::Nvd)
            .with_software(VulnerableSoftware::new(LODASH).with_target("android"))
            .with_software(VulnerableSoftware::new(LODASH).with_target("NodeJS"));
        let kept = filter_ecosystem(Some(Ecosystem::Npm), vec![v]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].vulnerable_software.len(), 1);
        assert_eq!(kept[0].vulnerable_software[0].target_software.as_deref(), Some("NodeJS"));
    }

    #[test]
    fn test_vulnerability_without_ranges_is_dropped() {
        let bare = Vulnerability::new("CVE-NO-RANGES", VulnerabilitySource::Nvd);
        assert!(filter_ecosystem(Some(Ecosystem::Npm), vec![bare.clone()]).is_empty());
        assert!(filter_ecosystem(None, vec![bare]).is_empty());
    }

    #[test]
    fn test_other_ecosystems_accept_any_target() {
        assert!(target_matches(Some(Ecosystem::Maven), Some("android")));
        assert!(target_matches(None, Some("android")));
        assert!(target_matches(Some(Ecosystem::Npm), Some("-")));
        assert!(target_matches(Some(Ecosystem::Npm), None));
        assert!(!target_matches(Some(Ecosystem::Pypi), Some("node.js")));
    }

    #[tokio::test]
    async fn test_npm_advisory_replaced() {
        let mut store = LocalDatastore::new();
        store.insert(
            LODASH,
            Vulnerability::new("123", VulnerabilitySource::Nvd)
                .with_software(VulnerableSoftware::new(LODASH).with_target("npm")),
        );

        let dep = npm_dependency();
        dep.update(|s| {
            s.add_vulnerability(
                Vulnerability::new("123", VulnerabilitySource::Npm).with_reference(Reference::new(
                    "Advisory",
                    "https://nodesecurity.io/advisories/123",
                )),
            )
        });

        let dep = scan(store, dep).await;

        dep.read(|s| {
            let matching: Vec<&Vulnerability> = s.vulnerabilities.iter().filter(|v| v.name == "123").collect();
            assert_eq!(matching.len(), 1);
            assert_eq!(matching[0].source, VulnerabilitySource::Nvd);
        });
    }

    #[tokio::test]
    async fn test_suppressed_identifiers_recorded_unfiltered() {
        let mut store = LocalDatastore::new();
        store.insert(LODASH, with_target("CVE-ANDROID", "android"));

        let dep = Dependency::new("/app/node_modules/lodash/package.json").with_ecosystem(Ecosystem::Npm);
        dep.update(|s| s.add_suppressed_identifier(Identifier::parse(LODASH, Confidence::High)));

        let dep = scan(store, dep).await;

        dep.read(|s| {
            assert!(s.vulnerabilities.is_empty());
            assert_eq!(s.suppressed_vulnerabilities.len(), 1);
        });
    }

    #[test]
    fn test_advisory_id() {
        assert_eq!(advisory_id("https://nodesecurity.io/advisories/123"), Some("123"));
        assert_eq!(advisory_id("https://www.npmjs.com/advisories/1523/versions"), Some("1523"));
        assert_eq!(advisory_id("https://nvd.nist.gov/vuln/detail/CVE-2020-8203"), None);
    }
}
