use async_trait::async_trait;
use std::sync::Arc;

use super::{Analyzer, EnabledSwitch, FileFilter};
use crate::engine::{AnalysisPhase, DependencyRegistry};
use crate::error::AnalysisError;
use crate::model::{
    parse_pre_version, parse_version, Confidence, Dependency, Evidence, EvidenceType,
};

/// Archive and binary types whose names usually carry name and version.
const EXTENSIONS: &[&str] = &[
    "jar", "war", "ear", "sar", "aar", "zip", "tgz", "whl", "egg", "nupkg", "gem", "dll", "exe",
];

/// Archives whose names say nothing about the component.
const IGNORED_FILES: &[&str] = &["classes.jar", "bundle.zip"];

/// Derives product, vendor and version evidence from the file name.
pub struct FileNameAnalyzer {
    switch: EnabledSwitch,
    filter: FileFilter,
}

impl FileNameAnalyzer {
    pub fn new() -> Self {
        Self {
            switch: EnabledSwitch::new(),
            filter: FileFilter::new().with_extensions(EXTENSIONS),
        }
    }
}

impl Default for FileNameAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for FileNameAnalyzer {
    fn name(&self) -> &str {
        "File Name Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::InformationCollection
    }

    fn enabled_setting_key(&self) -> &str {
        "file_name"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    fn file_filter(&self) -> Option<&FileFilter> {
        Some(&self.filter)
    }

    async fn analyze(
        &self,
        dependency: &Arc<Dependency>,
        _registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        if dependency.is_virtual() {
            return Ok(());
        }
        let path = dependency.actual_file_path();
        let file_name = dependency.file_name().to_lowercase();
        if IGNORED_FILES.contains(&file_name.as_str()) {
            return Ok(());
        }

        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            return Ok(());
        };
        let package_name = parse_pre_version(&stem).to_string();

        dependency.update(|s| {
            if let Some(version) = parse_version(&stem) {
                // A bare number such as the "2" in struts2 is weak evidence
                let confidence = if version.parts().len() < 2 {
                    Confidence::Medium
                } else {
                    Confidence::High
                };
                s.evidence.add(
                    EvidenceType::Version,
                    Evidence::new("file", "version", version.to_string(), confidence),
                );
            }
            s.evidence.add(
                EvidenceType::Product,
                Evidence::new("file", "name", package_name.clone(), Confidence::High),
            );
            s.evidence.add(
                EvidenceType::Vendor,
                Evidence::new("file", "name", package_name, Confidence::High),
            );
        });
        Ok(())
    }
}
