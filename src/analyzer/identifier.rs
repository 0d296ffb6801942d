use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{Analyzer, EnabledSwitch};
use crate::config::Settings;
use crate::engine::{AnalysisPhase, DependencyRegistry};
use crate::error::AnalysisError;
use crate::index::IdentificationIndex;
use crate::model::{Confidence, Dependency};

/// Resolves evidence into identifiers through an [`IdentificationIndex`].
///
/// Every candidate is recorded as a software identifier; candidates at or
/// above the configured minimum confidence are also used for vulnerability
/// lookups.
pub struct IdentifierAnalyzer {
    switch: EnabledSwitch,
    index: Arc<dyn IdentificationIndex>,
    min_confidence: Confidence,
}

impl IdentifierAnalyzer {
    pub fn new(index: Arc<dyn IdentificationIndex>) -> Self {
        Self {
            switch: EnabledSwitch::new(),
            index,
            min_confidence: Confidence::Medium,
        }
    }
}

#[async_trait]
impl Analyzer for IdentifierAnalyzer {
    fn name(&self) -> &str {
        "Identifier Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::IdentifierAnalysis
    }

    fn enabled_setting_key(&self) -> &str {
        "identifier"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    fn initialize(&mut self, settings: &Settings) {
        self.min_confidence = settings.min_identifier_confidence;
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        _registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        let count = dependency.update(|s| {
            let candidates = self.index.identify(s);
            let count = candidates.len();
            for identifier in candidates {
                if identifier.confidence >= self.min_confidence {
                    s.add_vulnerable_identifier(identifier.clone());
                }
                s.add_software_identifier(identifier);
            }
            count
        });
        debug!(dependency = %dependency.display_name(), count, "Identified");
        Ok(())
    }
}
