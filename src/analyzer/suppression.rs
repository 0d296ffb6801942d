//! Suppression of identifiers and vulnerabilities by configured patterns.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{Analyzer, EnabledSwitch, SuppressionFilter};
use crate::config::Settings;
use crate::engine::{AnalysisPhase, DependencyRegistry};
use crate::error::AnalysisError;
use crate::model::Dependency;

/// Moves matching vulnerable-software identifiers into the suppressed set.
///
/// Suppressed identifiers are still looked up, but their findings are only
/// recorded as suppressed vulnerabilities.
pub struct IdentifierSuppressionAnalyzer {
    switch: EnabledSwitch,
    filter: SuppressionFilter,
}

impl IdentifierSuppressionAnalyzer {
    pub fn new() -> Self {
        Self {
            switch: EnabledSwitch::new(),
            filter: SuppressionFilter::default(),
        }
    }

    /// Patterns applied on top of those configured in settings.
    pub fn with_filter(mut self, filter: SuppressionFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for IdentifierSuppressionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for IdentifierSuppressionAnalyzer {
    fn name(&self) -> &str {
        "Identifier Suppression Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::PostIdentifierAnalysis
    }

    fn enabled_setting_key(&self) -> &str {
        "identifier_suppression"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    fn initialize(&mut self, settings: &Settings) {
        self.filter.extend(settings.suppression.identifiers.iter().cloned());
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        _registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        if self.filter.is_empty() {
            return Ok(());
        }
        let suppressed = dependency.update(|s| {
            let matched: Vec<String> = s
                .vulnerable_identifiers
                .keys()
                .filter(|key| self.filter.matches(key))
                .cloned()
                .collect();
            for key in &matched {
                if let Some(identifier) = s.vulnerable_identifiers.remove(key) {
                    s.add_suppressed_identifier(identifier);
                }
            }
            matched.len()
        });
        if suppressed > 0 {
            debug!(dependency = %dependency.display_name(), suppressed, "Suppressed identifiers");
        }
        Ok(())
    }
}

/// Moves matching active vulnerabilities into the suppressed list.
pub struct VulnerabilitySuppressionAnalyzer {
    switch: EnabledSwitch,
    filter: SuppressionFilter,
}

impl VulnerabilitySuppressionAnalyzer {
    pub fn new() -> Self {
        Self {
            switch: EnabledSwitch::new(),
            filter: SuppressionFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: SuppressionFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for VulnerabilitySuppressionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for VulnerabilitySuppressionAnalyzer {
    fn name(&self) -> &str {
        "Vulnerability Suppression Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::PostFindingAnalysis
    }

    fn enabled_setting_key(&self) -> &str {
        "vulnerability_suppression"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    fn initialize(&mut self, settings: &Settings) {
        self.filter.extend(settings.suppression.vulnerabilities.iter().cloned());
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        _registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        if self.filter.is_empty() {
            return Ok(());
        }
        let suppressed = dependency.update(|s| {
            let (matched, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut s.vulnerabilities)
                .into_iter()
                .partition(|v| self.filter.matches(&v.name));
            s.vulnerabilities = kept;
            let count = matched.len();
            for vulnerability in matched {
                s.add_suppressed_vulnerability(vulnerability);
            }
            count
        });
        if suppressed > 0 {
            debug!(dependency = %dependency.display_name(), suppressed, "Suppressed vulnerabilities");
        }
        Ok(())
    }
}
