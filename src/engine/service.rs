use serde::Serialize;

use super::AnalysisPhase;
use crate::analyzer::{Analyzer, Stability};
use crate::config::Settings;

/// Selects which registered analyzers take part in a run.
///
/// Selection works on indices into the registration list so the engine
/// keeps ownership of the analyzers and registration order is preserved.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerService {
    allow_experimental: bool,
    allow_retired: bool,
}

/// Static description of an analyzer, used by `list-analyzers`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerInfo {
    pub name: String,
    pub phase: AnalysisPhase,
    pub stability: Stability,
    pub setting_key: String,
    pub parallel_safe: bool,
    pub enabled: bool,
}

impl AnalyzerService {
    pub fn new(settings: &Settings) -> Self {
        Self {
            allow_experimental: settings.allow_experimental,
            allow_retired: settings.allow_retired,
        }
    }

    pub fn stability_allowed(&self, stability: Stability) -> bool {
        match stability {
            Stability::Stable => true,
            Stability::Experimental => self.allow_experimental,
            Stability::Retired => self.allow_retired,
        }
    }

    /// Enabled, allowed analyzers bound to any of `phases`, in registration order.
    pub fn select(&self, analyzers: &[Box<dyn Analyzer>], phases: &[AnalysisPhase]) -> Vec<usize> {
        analyzers
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                phases.contains(&a.phase()) && a.is_enabled() && self.stability_allowed(a.stability())
            })
            .map(|(i, _)| i)
            .collect()
    }

    pub fn for_phase(&self, analyzers: &[Box<dyn Analyzer>], phase: AnalysisPhase) -> Vec<usize> {
        self.select(analyzers, &[phase])
    }

    pub fn describe(&self, analyzers: &[Box<dyn Analyzer>]) -> Vec<AnalyzerInfo> {
        analyzers
            .iter()
            .map(|a| AnalyzerInfo {
                name: a.name().to_string(),
                phase: a.phase(),
                stability: a.stability(),
                setting_key: a.enabled_setting_key().to_string(),
                parallel_safe: a.parallel_safe(),
                enabled: a.is_enabled() && self.stability_allowed(a.stability()),
            })
            .collect()
    }
}
