//! Folding redundant dependencies into one survivor.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Analyzer, EnabledSwitch, SingleRun};
use crate::engine::{AnalysisPhase, DependencyRegistry};
use crate::error::AnalysisError;
use crate::model::{npm_versions_match, Dependency, Ecosystem};

/// File-name fragments that mark the main artifact of a split library.
const CORE_MARKERS: &[&str] = &["core", "kernel", "server", "project", "engine"];

/// Decides which dependencies are the same logical artifact.
pub trait MergeCriterion: Send + Sync {
    fn should_merge(&self, left: &Dependency, right: &Dependency) -> bool;

    /// Whether `left` survives a merge with `right`.
    fn left_survives(&self, left: &Dependency, right: &Dependency) -> bool {
        is_core(left, right)
    }
}

/// Merges dependencies in the same directory whose vulnerable-software
/// identifiers are identical and non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameIdentifiersAndPath;

impl MergeCriterion for SameIdentifiersAndPath {
    fn should_merge(&self, left: &Dependency, right: &Dependency) -> bool {
        let left_ids: Vec<String> = left.read(|s| s.vulnerable_identifiers.keys().cloned().collect());
        let right_ids: Vec<String> = right.read(|s| s.vulnerable_identifiers.keys().cloned().collect());
        !left_ids.is_empty() && left_ids == right_ids && same_base_path(left, right)
    }
}

/// Merges copies of the same file found at different paths. Copies nested
/// in a war or ear archive are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameHash;

impl MergeCriterion for SameHash {
    fn should_merge(&self, left: &Dependency, right: &Dependency) -> bool {
        match (left.sha1(), right.sha1()) {
            (Some(l), Some(r)) => l == r && !inside_web_archive(left) && !inside_web_archive(right),
            _ => false,
        }
    }

    fn left_survives(&self, left: &Dependency, right: &Dependency) -> bool {
        first_path_is_shortest(left, right)
    }
}

/// Merges npm packages with the same name and matching versions, such as a
/// lock-file entry and the installed `package.json`. A file-backed package
/// survives over a virtual one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameNpmPackage;

impl MergeCriterion for SameNpmPackage {
    fn should_merge(&self, left: &Dependency, right: &Dependency) -> bool {
        let key = |d: &Dependency| d.read(|s| (s.ecosystem, s.name.clone(), s.version.clone()));
        match (key(left), key(right)) {
            (
                (Some(Ecosystem::Npm), Some(left_name), Some(left_version)),
                (Some(Ecosystem::Npm), Some(right_name), Some(right_version)),
            ) => left_name == right_name && npm_versions_match(&left_version, &right_version),
            _ => false,
        }
    }

    fn left_survives(&self, left: &Dependency, _right: &Dependency) -> bool {
        !left.is_virtual()
    }
}

fn inside_web_archive(dependency: &Dependency) -> bool {
    let path = dependency.file_path().to_string_lossy().replace('\\', "/");
    path.contains(".war/") || path.contains(".ear/")
}

/// Fewer path segments wins; ties go to the lexically smaller path.
fn first_path_is_shortest(left: &Dependency, right: &Dependency) -> bool {
    let l = left.file_path().to_string_lossy().replace('\\', "/");
    let r = right.file_path().to_string_lossy().replace('\\', "/");
    let (lc, rc) = (l.matches('/').count(), r.matches('/').count());
    if lc == rc {
        l <= r
    } else {
        lc < rc
    }
}

fn same_base_path(left: &Dependency, right: &Dependency) -> bool {
    let parent = |d: &Dependency| {
        d.file_path()
            .parent()
            .map(|p| p.to_string_lossy().to_lowercase())
    };
    parent(left) == parent(right)
}

/// Picks the main artifact of a pair: a virtual dependency over a file, a
/// name carrying a core marker, else the shorter file name.
fn is_core(left: &Dependency, right: &Dependency) -> bool {
    if left.is_virtual() != right.is_virtual() {
        return left.is_virtual();
    }
    let l = left.file_name().to_lowercase();
    let r = right.file_name().to_lowercase();
    for marker in CORE_MARKERS {
        match (l.contains(marker), r.contains(marker)) {
            (true, false) => return true,
            (false, true) => return false,
            _ => {}
        }
    }
    l.len() <= r.len()
}

fn merge(survivor: &Dependency, absorbed: &Dependency) {
    let moved = absorbed.update(|s| std::mem::take(&mut s.related));
    let related = absorbed.as_related();
    survivor.update(|s| {
        s.add_related(related);
        for r in moved {
            s.add_related(r);
        }
    });
}

/// Merges dependencies that are the same logical artifact.
///
/// Runs once over the whole registry. Within a sweep each dependency
/// absorbs at most one partner; sweeps repeat until one merges nothing, so
/// running the analyzer again changes nothing. For each pair the first
/// criterion that matches decides the survivor.
pub struct DependencyBundlingAnalyzer {
    switch: EnabledSwitch,
    latch: SingleRun,
    criteria: Vec<Box<dyn MergeCriterion>>,
}

impl DependencyBundlingAnalyzer {
    pub fn new() -> Self {
        Self::with_criteria(vec![
            Box::new(SameHash),
            Box::new(SameIdentifiersAndPath),
            Box::new(SameNpmPackage),
        ])
    }

    pub fn with_criteria(criteria: Vec<Box<dyn MergeCriterion>>) -> Self {
        Self {
            switch: EnabledSwitch::new(),
            latch: SingleRun::new(),
            criteria,
        }
    }

    /// One sweep; returns the ids of absorbed dependencies.
    fn sweep(&self, registry: &DependencyRegistry) -> HashSet<u64> {
        let mut deps: Vec<(String, Arc<Dependency>)> = registry
            .snapshot()
            .into_iter()
            .map(|d| (d.name(), d))
            .collect();
        deps.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.file_path().cmp(b.1.file_path())));

        let mut removed = HashSet::new();
        for i in 0..deps.len() {
            let left = &deps[i].1;
            if removed.contains(&left.id()) {
                continue;
            }
            for (_, right) in &deps[i + 1..] {
                if removed.contains(&right.id()) {
                    continue;
                }
                let Some(criterion) = self.criteria.iter().find(|c| c.should_merge(left, right)) else {
                    continue;
                };
                if criterion.left_survives(left, right) {
                    merge(left, right);
                    removed.insert(right.id());
                } else {
                    merge(right, left);
                    removed.insert(left.id());
                }
                break;
            }
        }
        removed
    }
}

impl Default for DependencyBundlingAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for DependencyBundlingAnalyzer {
    fn name(&self) -> &str {
        "Dependency Bundling Analyzer"
    }

    fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::Final
    }

    fn enabled_setting_key(&self) -> &str {
        "bundling"
    }

    fn switch(&self) -> &EnabledSwitch {
        &self.switch
    }

    fn parallel_safe(&self) -> bool {
        false
    }

    async fn prepare(&mut self, _registry: &DependencyRegistry) -> Result<(), AnalysisError> {
        self.latch.reset();
        Ok(())
    }

    async fn analyze(
        &self,
        _dependency: &Arc<Dependency>,
        registry: &DependencyRegistry,
    ) -> Result<(), AnalysisError> {
        if !self.latch.claim() {
            return Ok(());
        }
        let mut total = 0;
        loop {
            let removed = self.sweep(registry);
            if removed.is_empty() {
                break;
            }
            total += registry.remove_all(&removed);
            debug!(merged = removed.len(), "Bundling sweep");
        }
        if total > 0 {
            info!(merged = total, remaining = registry.len(), "Bundled dependencies");
        }
        Ok(())
    }
}
