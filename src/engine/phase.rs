use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a scan, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisPhase {
    Initial,
    PreInformationCollection,
    InformationCollection,
    PostInformationCollection1,
    PostInformationCollection2,
    PreIdentifierAnalysis,
    IdentifierAnalysis,
    PostIdentifierAnalysis,
    PreFindingAnalysis,
    FindingAnalysis,
    PostFindingAnalysis,
    Final,
}

impl AnalysisPhase {
    pub const ALL: [AnalysisPhase; 12] = [
        AnalysisPhase::Initial,
        AnalysisPhase::PreInformationCollection,
        AnalysisPhase::InformationCollection,
        AnalysisPhase::PostInformationCollection1,
        AnalysisPhase::PostInformationCollection2,
        AnalysisPhase::PreIdentifierAnalysis,
        AnalysisPhase::IdentifierAnalysis,
        AnalysisPhase::PostIdentifierAnalysis,
        AnalysisPhase::PreFindingAnalysis,
        AnalysisPhase::FindingAnalysis,
        AnalysisPhase::PostFindingAnalysis,
        AnalysisPhase::Final,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisPhase::Initial => "initial",
            AnalysisPhase::PreInformationCollection => "pre-information-collection",
            AnalysisPhase::InformationCollection => "information-collection",
            AnalysisPhase::PostInformationCollection1 => "post-information-collection-1",
            AnalysisPhase::PostInformationCollection2 => "post-information-collection-2",
            AnalysisPhase::PreIdentifierAnalysis => "pre-identifier-analysis",
            AnalysisPhase::IdentifierAnalysis => "identifier-analysis",
            AnalysisPhase::PostIdentifierAnalysis => "post-identifier-analysis",
            AnalysisPhase::PreFindingAnalysis => "pre-finding-analysis",
            AnalysisPhase::FindingAnalysis => "finding-analysis",
            AnalysisPhase::PostFindingAnalysis => "post-finding-analysis",
            AnalysisPhase::Final => "final",
        }
    }
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which part of the pipeline a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Standalone,
    /// Collect evidence only (through post-information-collection-2).
    EvidenceCollection,
    /// Resolve identifiers and findings on already collected evidence.
    EvidenceProcessing,
}

impl Mode {
    pub fn phases(&self) -> &'static [AnalysisPhase] {
        match self {
            Mode::Standalone => &AnalysisPhase::ALL,
            Mode::EvidenceCollection => &AnalysisPhase::ALL[..5],
            Mode::EvidenceProcessing => &AnalysisPhase::ALL[5..],
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standalone" => Ok(Mode::Standalone),
            "evidence-collection" | "collection" => Ok(Mode::EvidenceCollection),
            "evidence-processing" | "processing" => Ok(Mode::EvidenceProcessing),
            _ => Err(format!(
                "Unknown mode: {}. Use 'standalone', 'evidence-collection' or 'evidence-processing'",
                s
            )),
        }
    }
}
