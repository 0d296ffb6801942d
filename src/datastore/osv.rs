use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::VulnerabilityDatastore;
use crate::cache::Cache;
use crate::error::AnalysisError;
use crate::model::{
    parse_cvss_score, Identifier, Reference, Severity, Vulnerability, VulnerabilitySource,
    VulnerableSoftware,
};

const OSV_API: &str = "https://api.osv.dev";

/// Looks up package-URL identifiers on OSV.dev.
///
/// Only versioned purls are queried; other identifiers yield no findings.
/// Responses are cached per identifier.
pub struct OsvDatastore {
    client: reqwest::Client,
    cache: Cache,
    base_url: String,
}

impl OsvDatastore {
    pub fn new(cache: Cache) -> Self {
        Self::with_base_url(cache, OSV_API)
    }

    pub fn with_base_url(cache: Cache, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache,
            base_url: base_url.into(),
        }
    }

    async fn query(&self, purl: &str) -> Result<OsvResponse, AnalysisError> {
        let response = self
            .client
            .post(format!("{}/v1/query", self.base_url))
            .json(&OsvQuery {
                package: OsvQueryPackage {
                    purl: purl.to_string(),
                },
            })
            .send()
            .await
            .map_err(|e| AnalysisError::TransientIo(format!("OSV.dev request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AnalysisError::RateLimited("OSV.dev".to_string()));
        }
        if !status.is_success() {
            return Err(AnalysisError::TransientIo(format!(
                "OSV.dev returned {} for {}",
                status, purl
            )));
        }

        response
            .json::<OsvResponse>()
            .await
            .map_err(|e| AnalysisError::DataCorruption(format!("OSV.dev response: {}", e)))
    }
}

#[async_trait]
impl VulnerabilityDatastore for OsvDatastore {
    fn name(&self) -> &str {
        "OSV.dev"
    }

    async fn preflight(&self) -> Result<(), AnalysisError> {
        self.client
            .get(&self.base_url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| AnalysisError::Preflight(format!("cannot reach {}: {}", self.base_url, e)))
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Vec<Vulnerability>, AnalysisError> {
        let Some(purl) = identifier.as_purl() else {
            return Ok(Vec::new());
        };
        if purl.version.is_none() {
            return Ok(Vec::new());
        }

        let key = format!("osv_{}", identifier.canonical());
        if let Some(cached) = self.cache.get::<Vec<Vulnerability>>(&key) {
            debug!(identifier = %identifier, "OSV cache hit");
            return Ok(cached);
        }

        let canonical = identifier.canonical();
        let response = self.query(&canonical).await?;
        let vulnerabilities: Vec<Vulnerability> = response
            .vulns
            .unwrap_or_default()
            .into_iter()
            .map(|v| to_vulnerability(v, &canonical))
            .collect();

        if let Err(e) = self.cache.set(&key, &vulnerabilities) {
            debug!(error = %e, "Failed to cache OSV response");
        }
        Ok(vulnerabilities)
    }
}

#[derive(Serialize)]
struct OsvQuery {
    package: OsvQueryPackage,
}

#[derive(Serialize)]
struct OsvQueryPackage {
    purl: String,
}

#[derive(Deserialize)]
struct OsvResponse {
    vulns: Option<Vec<OsvVuln>>,
}

#[derive(Deserialize)]
struct OsvVuln {
    id: String,
    summary: Option<String>,
    details: Option<String>,
    severity: Option<Vec<OsvSeverity>>,
    affected: Option<Vec<OsvAffected>>,
    references: Option<Vec<OsvReference>>,
}

#[derive(Deserialize)]
struct OsvSeverity {
    score: Option<String>,
}

#[derive(Deserialize)]
struct OsvAffected {
    package: Option<OsvAffectedPackage>,
    ranges: Option<Vec<OsvRange>>,
}

#[derive(Deserialize)]
struct OsvAffectedPackage {
    ecosystem: Option<String>,
    purl: Option<String>,
}

#[derive(Deserialize)]
struct OsvRange {
    events: Option<Vec<OsvEvent>>,
}

#[derive(Deserialize)]
struct OsvEvent {
    fixed: Option<String>,
}

#[derive(Deserialize)]
struct OsvReference {
    #[serde(rename = "type")]
    kind: Option<String>,
    url: Option<String>,
}

fn to_vulnerability(vuln: OsvVuln, queried: &str) -> Vulnerability {
    let severity = parse_severity(&vuln);
    let mut result = Vulnerability::new(vuln.id, VulnerabilitySource::Osv);
    result.severity = severity;
    result.description = vuln.summary.or(vuln.details).unwrap_or_default();

    result.references = vuln
        .references
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| {
            let url = r.url?;
            Some(Reference::new(r.kind.unwrap_or_else(|| "WEB".to_string()), url))
        })
        .collect();

    result.vulnerable_software = vuln
        .affected
        .unwrap_or_default()
        .into_iter()
        .map(|affected| {
            let fixed = affected.ranges.as_ref().and_then(|ranges| {
                ranges.iter().find_map(|range| {
                    range
                        .events
                        .as_ref()?
                        .iter()
                        .find_map(|event| event.fixed.clone())
                })
            });
            let (identifier, ecosystem) = match affected.package {
                Some(p) => (p.purl.unwrap_or_else(|| queried.to_string()), p.ecosystem),
                None => (queried.to_string(), None),
            };
            let mut software = VulnerableSoftware::new(identifier);
            software.target_software = ecosystem;
            software.fixed_in = fixed;
            software
        })
        .collect();
    // OSV only answers for the queried package
    if result.vulnerable_software.is_empty() {
        result.vulnerable_software.push(VulnerableSoftware::new(queried));
    }

    result
}

fn parse_severity(vuln: &OsvVuln) -> Severity {
    vuln.severity
        .iter()
        .flatten()
        .filter_map(|s| s.score.as_deref())
        .map(parse_cvss_score)
        .find(|s| *s != Severity::Unknown)
        .unwrap_or(Severity::Unknown)
}
