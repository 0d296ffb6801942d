use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{Dependency, Ecosystem, RelatedDependency, Severity, Vulnerability};

/// A (analyzer, dependency) pair that failed recoverably and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUnit {
    pub analyzer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub display_name: String,
    pub file_path: PathBuf,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecosystem: Option<Ecosystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    pub evidence_count: usize,
    pub identifiers: Vec<String>,
    pub vulnerable_identifiers: Vec<String>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub suppressed_vulnerabilities: Vec<Vulnerability>,
    pub related: Vec<RelatedDependency>,
}

impl DependencyReport {
    pub fn from_dependency(dependency: &Dependency) -> Self {
        dependency.read(|s| Self {
            display_name: s.display_name.clone(),
            file_path: dependency.file_path().to_path_buf(),
            is_virtual: dependency.is_virtual(),
            ecosystem: s.ecosystem,
            name: s.name.clone(),
            version: s.version.clone(),
            license: s.license.clone(),
            sha1: dependency.sha1().map(str::to_string),
            evidence_count: s.evidence.len(),
            identifiers: s.software_identifiers.keys().cloned().collect(),
            vulnerable_identifiers: s.vulnerable_identifiers.keys().cloned().collect(),
            vulnerabilities: s.vulnerabilities.clone(),
            suppressed_vulnerabilities: s.suppressed_vulnerabilities.clone(),
            related: s.related.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub generated_at: DateTime<Utc>,
    pub dependencies: Vec<DependencyReport>,
    pub skipped: Vec<SkippedUnit>,
}

impl ScanReport {
    pub fn new(dependencies: Vec<DependencyReport>, skipped: Vec<SkippedUnit>) -> Self {
        Self {
            generated_at: Utc::now(),
            dependencies,
            skipped,
        }
    }

    pub fn vulnerabilities(&self) -> impl Iterator<Item = (&DependencyReport, &Vulnerability)> {
        self.dependencies
            .iter()
            .flat_map(|d| d.vulnerabilities.iter().map(move |v| (d, v)))
    }

    pub fn vulnerability_count(&self) -> usize {
        self.dependencies.iter().map(|d| d.vulnerabilities.len()).sum()
    }

    pub fn suppressed_count(&self) -> usize {
        self.dependencies
            .iter()
            .map(|d| d.suppressed_vulnerabilities.len())
            .sum()
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.vulnerabilities()
            .filter(|(_, v)| v.severity == severity)
            .count()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.vulnerabilities().map(|(_, v)| v.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VulnerabilitySource;

    #[test]
    fn test_report_from_dependency() {
        let dep = Dependency::new("/app/node_modules/lodash/package.json");
        dep.update(|s| {
            s.name = Some("lodash".to_string());
            s.version = Some("4.17.20".to_string());
            s.add_vulnerability(
                Vulnerability::new("CVE-2021-23337", VulnerabilitySource::Osv).with_score(7.2),
            );
        });

        let report = DependencyReport::from_dependency(&dep);
        assert_eq!(report.name.as_deref(), Some("lodash"));
        assert_eq!(report.vulnerabilities.len(), 1);
        assert!(!report.is_virtual);
    }

    #[test]
    fn test_severity_summary() {
        let dep = Dependency::new("a.jar");
        dep.update(|s| {
            s.add_vulnerability(Vulnerability::new("A", VulnerabilitySource::Nvd).with_score(9.8));
            s.add_vulnerability(Vulnerability::new("B", VulnerabilitySource::Nvd).with_score(5.0));
            s.add_vulnerability(Vulnerability::new("C", VulnerabilitySource::Nvd).with_score(5.5));
        });
        let report = ScanReport::new(vec![DependencyReport::from_dependency(&dep)], Vec::new());

        assert_eq!(report.vulnerability_count(), 3);
        assert_eq!(report.count_severity(Severity::Medium), 2);
        assert_eq!(report.max_severity(), Some(Severity::Critical));
        assert_eq!(ScanReport::new(Vec::new(), Vec::new()).max_severity(), None);
    }
}
