//! The analyzer contract and the built-in analyzers.
//!
//! An analyzer is bound to one [`AnalysisPhase`] and is invoked by the
//! engine once per dependency in that phase. Whole-set analyzers use a
//! [`SingleRun`] latch so that only the first invocation does any work.

mod bundling;
mod capability;
mod file_name;
mod identifier;
mod node;
mod suppression;
mod version_filter;
mod vulnerability;

pub use bundling::{DependencyBundlingAnalyzer, MergeCriterion, SameHash, SameIdentifiersAndPath, SameNpmPackage};
pub use capability::{EnabledSwitch, FileFilter, SingleRun, SuppressionFilter};
pub use file_name::FileNameAnalyzer;
pub use identifier::IdentifierAnalyzer;
pub use node::{NodeLockAnalyzer, NodePackageAnalyzer};
pub use suppression::{IdentifierSuppressionAnalyzer, VulnerabilitySuppressionAnalyzer};
pub use version_filter::VersionFilterAnalyzer;
pub use vulnerability::VulnerabilityAnalyzer;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Settings;
use crate::datastore::VulnerabilityDatastore;
use crate::engine::{AnalysisPhase, DependencyRegistry};
use crate::error::AnalysisError;
use crate::index::PurlIndex;
use crate::model::Dependency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Experimental,
    Retired,
}

impl Stability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::Experimental => "experimental",
            Stability::Retired => "retired",
        }
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    fn phase(&self) -> AnalysisPhase;

    /// Key under `[analyzers]` in the settings file.
    fn enabled_setting_key(&self) -> &str;

    fn switch(&self) -> &EnabledSwitch;

    fn stability(&self) -> Stability {
        Stability::Stable
    }

    /// Whether `analyze` may run concurrently for different dependencies.
    fn parallel_safe(&self) -> bool {
        true
    }

    fn file_filter(&self) -> Option<&FileFilter> {
        None
    }

    fn is_enabled(&self) -> bool {
        self.switch().is_enabled()
    }

    fn disable(&self) {
        self.switch().disable()
    }

    /// Stores the settings the analyzer needs. The engine has already
    /// applied the analyzer's enabled flag.
    fn initialize(&mut self, _settings: &Settings) {}

    /// One-time setup before any phase runs. Returning
    /// [`AnalysisError::Configuration`] disables the analyzer; any other
    /// error aborts the scan.
    async fn prepare(&mut self, _registry: &DependencyRegistry) -> Result<(), AnalysisError> {
        Ok(())
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError>;

    async fn close(&mut self) -> Result<(), AnalysisError> {
        Ok(())
    }
}

/// The built-in analyzers in registration order.
pub fn default_analyzers(datastore: Arc<dyn VulnerabilityDatastore>) -> Vec<Box<dyn Analyzer>> {
    vec![
        Box::new(NodeLockAnalyzer::new()),
        Box::new(FileNameAnalyzer::new()),
        Box::new(NodePackageAnalyzer::new()),
        Box::new(VersionFilterAnalyzer::new()),
        Box::new(IdentifierAnalyzer::new(Arc::new(PurlIndex))),
        Box::new(IdentifierSuppressionAnalyzer::new()),
        Box::new(VulnerabilityAnalyzer::new(datastore)),
        Box::new(VulnerabilitySuppressionAnalyzer::new()),
        Box::new(DependencyBundlingAnalyzer::new()),
    ]
}
