use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{Analyzer, EnabledSwitch};
use crate::engine::{AnalysisPhase, DependencyRegistry};
use crate::error::AnalysisError;
use crate::model::{parse_version, Dependency, DependencyState, DependencyVersion, Evidence, EvidenceType};

const FILE: &str = "file";
const VERSION: &str = "version";
const POM_SOURCES: &[&str] = &["pom", "nexus", "central"];
const MANIFEST: &str = "Manifest";
const IMPLEMENTATION_VERSION: &str = "Implementation-Version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trusted {
    File,
    Pom,
    Manifest,
}

fn trusted_source(evidence: &Evidence) -> Option<Trusted> {
    if evidence.is_from(FILE, VERSION) {
        Some(Trusted::File)
    } else if evidence.name == VERSION && POM_SOURCES.contains(&evidence.source.as_str()) {
        Some(Trusted::Pom)
    } else if evidence.is_from(MANIFEST, IMPLEMENTATION_VERSION) {
        Some(Trusted::Manifest)
    } else {
        None
    }
}

/// Prunes conflicting version evidence.
///
/// With a resolved version, every other version value is dropped. Without
/// one, the file name, pom and manifest versions vote: when any two of them
/// agree, version evidence outside the agreeing sources is dropped. If the
/// surviving evidence then names a single version it becomes the resolved one.
pub struct VersionFilterAnalyzer {
    switch: EnabledSwitch,
}

impl VersionFilterAnalyzer {
    pub fn new() -> Self {
        Self {
            switch: EnabledSwitch::new(),
        }
    }
}

impl Default for VersionFilterAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn filter_versions(state: &mut DependencyState) -> usize {
    if let Some(version) = state.version.clone() {
        return state
            .evidence
            .retain(EvidenceType::Version, |e| e.value == version);
    }

    // The last entry per source wins, as later analyzers refine earlier ones
    let mut votes: [Option<DependencyVersion>; 3] = [None, None, None];
    for e in state.evidence.get(EvidenceType::Version) {
        if let Some(source) = trusted_source(e) {
            votes[source as usize] = Some(DependencyVersion::new(&e.value));
        }
    }
    if votes.iter().flatten().count() < 2 {
        return 0;
    }

    let agrees = |source: Trusted| -> bool {
        let Some(mine) = &votes[source as usize] else {
            return false;
        };
        votes
            .iter()
            .enumerate()
            .any(|(i, other)| i != source as usize && other.as_ref() == Some(mine))
    };
    let agreeing: Vec<Trusted> = [Trusted::File, Trusted::Pom, Trusted::Manifest]
        .into_iter()
        .filter(|s| agrees(*s))
        .collect();
    if agreeing.is_empty() {
        return 0;
    }

    state.evidence.retain(EvidenceType::Version, |e| {
        trusted_source(e).is_some_and(|s| agreeing.contains(&s))
    })
}

fn promote_version(state: &mut DependencyState) {
    if state.version.is_some() {
        return;
    }
    let mut parsed = state
        .evidence
        .get(EvidenceType::Version)
        .iter()
        .map(|e| parse_version(&e.value));
    let Some(Some(first)) = parsed.next() else {
        return;
    };
    if parsed.all(|v| v.as_ref() == Some(&first)) {
        state.version = Some(first.to_string());
    }
}

#[async_trait]
impl Analyzer for VersionFilterAnalyzer {
    fn name(&self) -> &str {
        "Version Filter Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::PostInformationCollection2
    }

    fn enabled_setting_key(&self) -> &str {
        "version_filter"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        _registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        let removed = dependency.update(|s| {
            let removed = filter_versions(s);
            promote_version(s);
            removed
        });
        if removed > 0 {
            debug!(dependency = %dependency.display_name(), removed, "Filtered version evidence");
        }
        Ok(())
    }
}
