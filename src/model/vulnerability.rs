use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parses a CVSS score into a severity level.
///
/// Supports both numeric scores and CVSS vector strings.
pub fn parse_cvss_score(score: &str) -> Severity {
    if let Ok(cvss) = score.parse::<f32>() {
        return severity_from_score(cvss);
    }

    // Vector strings carry no base score; approximate from the impact metrics
    if score.contains("CVSS:") {
        if score.contains("/C:H") || score.contains("/I:H") || score.contains("/A:H") {
            return Severity::High;
        }
        if score.contains("/C:L") || score.contains("/I:L") || score.contains("/A:L") {
            return Severity::Medium;
        }
        return Severity::Low;
    }

    Severity::Unknown
}

pub fn severity_from_score(cvss: f32) -> Severity {
    match cvss {
        s if s >= 9.0 => Severity::Critical,
        s if s >= 7.0 => Severity::High,
        s if s >= 4.0 => Severity::Medium,
        s if s > 0.0 => Severity::Low,
        _ => Severity::Unknown,
    }
}

/// Where a vulnerability record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VulnerabilitySource {
    Nvd,
    /// npm advisory feeds (audit API, nodesecurity.io)
    Npm,
    Osv,
    RetireJs,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub url: String,
}

impl Reference {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// An affected-software range a vulnerability was matched against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerableSoftware {
    pub identifier: String,
    /// Target-software / ecosystem hint; `None`, `*` and `-` mean unspecified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_software: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_in: Option<String>,
}

impl VulnerableSoftware {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            target_software: None,
            fixed_in: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_software = Some(target.into());
        self
    }

    pub fn with_fixed_in(mut self, version: impl Into<String>) -> Self {
        self.fixed_in = Some(version.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f32>,
    pub severity: Severity,
    pub source: VulnerabilitySource,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub vulnerable_software: Vec<VulnerableSoftware>,
}

impl Vulnerability {
    pub fn new(name: impl Into<String>, source: VulnerabilitySource) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            cvss_score: None,
            severity: Severity::Unknown,
            source,
            references: Vec::new(),
            vulnerable_software: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.cvss_score = Some(score);
        self.severity = severity_from_score(score);
        self
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_software(mut self, software: VulnerableSoftware) -> Self {
        self.vulnerable_software.push(software);
        self
    }

    /// Records are the same finding when name and source agree.
    pub fn same_as(&self, other: &Vulnerability) -> bool {
        self.name == other.name && self.source == other.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cvss_score_numeric() {
        assert_eq!(parse_cvss_score("9.8"), Severity::Critical);
        assert_eq!(parse_cvss_score("7.0"), Severity::High);
        assert_eq!(parse_cvss_score("5.5"), Severity::Medium);
        assert_eq!(parse_cvss_score("0.1"), Severity::Low);
        assert_eq!(parse_cvss_score("0.0"), Severity::Unknown);
        assert_eq!(parse_cvss_score("not a number"), Severity::Unknown);
    }

    #[test]
    fn test_parse_cvss_vector() {
        assert_eq!(
            parse_cvss_score("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N"),
            Severity::High
        );
        assert_eq!(
            parse_cvss_score("CVSS:3.1/AV:L/AC:H/PR:L/UI:R/S:U/C:L/I:N/A:N"),
            Severity::Medium
        );
        assert_eq!(
            parse_cvss_score("CVSS:3.1/AV:L/AC:H/PR:H/UI:R/S:U/C:N/I:N/A:N"),
            Severity::Low
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::Unknown);
    }

    #[test]
    fn test_with_score_sets_severity() {
        let v = Vulnerability::new("CVE-2021-44228", VulnerabilitySource::Nvd).with_score(10.0);
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.cvss_score, Some(10.0));
    }

    #[test]
    fn test_same_as() {
        let a = Vulnerability::new("123", VulnerabilitySource::Npm);
        let b = Vulnerability::new("123", VulnerabilitySource::Npm).with_score(5.0);
        let c = Vulnerability::new("123", VulnerabilitySource::Nvd);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }
}
