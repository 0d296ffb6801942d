//! The scan engine: runs analyzers phase by phase over the dependency registry.
//!
//! # Execution
//!
//! 1. Every analyzer is initialized when the engine is built.
//! 2. Selected analyzers are prepared in registration order.
//! 3. For each phase of the configured [`Mode`], each analyzer bound to it
//!    makes one pass over a snapshot of the registry. Parallel-safe
//!    analyzers run up to `worker_threads` invocations at once; others run
//!    one at a time in snapshot order. A pass finishes completely before
//!    the next one starts.
//! 4. Prepared analyzers are closed in reverse registration order, whether
//!    or not the scan succeeded.
//!
//! # Example
//!
//! ```no_run
//! use compscan::{analyzer::default_analyzers, datastore::LocalDatastore, Engine, Settings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let datastore = Arc::new(LocalDatastore::default());
//!     let mut engine = Engine::new(Settings::default(), default_analyzers(datastore));
//!     engine.add_dependency(compscan::model::Dependency::new("package.json"));
//!     let outcome = engine.analyze_dependencies().await?;
//!     let report = engine.report(outcome);
//!     println!("{} dependencies", report.dependencies.len());
//!     Ok(())
//! }
//! ```

mod phase;
mod registry;
mod service;

pub use phase::{AnalysisPhase, Mode};
pub use registry::DependencyRegistry;
pub use service::{AnalyzerInfo, AnalyzerService};

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analyzer::Analyzer;
use crate::config::Settings;
use crate::error::{AnalysisError, ErrorScope, ScanError};
use crate::model::{Dependency, DependencyReport, ScanReport, SkippedUnit};

/// What a completed scan degraded on.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub skipped: Vec<SkippedUnit>,
    /// Analyzers switched off during the scan.
    pub disabled: Vec<String>,
}

/// Runs registered analyzers over a shared dependency registry.
///
/// Concurrent invocations within a pass overlap at their await points but
/// are all polled on the task that called [`Engine::analyze_dependencies`].
/// `worker_threads` bounds how many are in flight, not how many OS threads
/// run them, so CPU-heavy analyzers should move that work to
/// `tokio::task::spawn_blocking`.
pub struct Engine {
    analyzers: Vec<Box<dyn Analyzer>>,
    registry: DependencyRegistry,
    settings: Settings,
}

impl Engine {
    /// Builds an engine and initializes every analyzer with `settings`.
    pub fn new(settings: Settings, mut analyzers: Vec<Box<dyn Analyzer>>) -> Self {
        for analyzer in analyzers.iter_mut() {
            let enabled = settings.analyzer_enabled(analyzer.enabled_setting_key());
            analyzer.switch().set(enabled);
            analyzer.initialize(&settings);
            debug!(analyzer = analyzer.name(), enabled, "Initialized analyzer");
        }

        Self {
            analyzers,
            registry: DependencyRegistry::new(),
            settings,
        }
    }

    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn analyzers(&self) -> &[Box<dyn Analyzer>] {
        &self.analyzers
    }

    pub fn describe_analyzers(&self) -> Vec<AnalyzerInfo> {
        AnalyzerService::new(&self.settings).describe(&self.analyzers)
    }

    pub fn add_dependency(&self, dependency: Dependency) -> Arc<Dependency> {
        self.registry.add(dependency)
    }

    /// Whether any enabled analyzer with a file filter wants `path`.
    pub fn accept(&self, path: &Path) -> bool {
        let service = AnalyzerService::new(&self.settings);
        service
            .select(&self.analyzers, self.settings.mode.phases())
            .into_iter()
            .filter_map(|i| self.analyzers[i].file_filter())
            .any(|filter| filter.accepts(path))
    }

    /// Runs every phase of the configured mode over the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when an analyzer fails to prepare or raises a
    /// scan-fatal error. Prepared analyzers are closed before returning.
    pub async fn analyze_dependencies(&mut self) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();
        let service = AnalyzerService::new(&self.settings);
        let phases = self.settings.mode.phases();
        let selected = service.select(&self.analyzers, phases);
        let mut outcome = ScanOutcome::default();

        info!(
            mode = ?self.settings.mode,
            analyzers = selected.len(),
            dependencies = self.registry.len(),
            "Starting analysis"
        );

        let mut prepared: Vec<usize> = Vec::with_capacity(selected.len());
        for &i in &selected {
            let analyzer = &mut self.analyzers[i];
            match analyzer.prepare(&self.registry).await {
                Ok(()) => prepared.push(i),
                Err(AnalysisError::Configuration(reason)) => {
                    warn!(analyzer = analyzer.name(), %reason, "Disabling misconfigured analyzer");
                    analyzer.disable();
                    outcome.disabled.push(analyzer.name().to_string());
                }
                Err(source) => {
                    error!(analyzer = analyzer.name(), error = %source, "Analyzer failed to prepare");
                    analyzer.disable();
                    let err = ScanError::Preflight {
                        analyzer: analyzer.name().to_string(),
                        source,
                    };
                    self.close_all(&prepared).await;
                    return Err(err);
                }
            }
        }

        let result = self.run_phases(phases, &prepared, &mut outcome).await;
        self.close_all(&prepared).await;

        match result {
            Ok(()) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    dependencies = self.registry.len(),
                    skipped = outcome.skipped.len(),
                    "Analysis complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "Analysis aborted");
                Err(e)
            }
        }
    }

    /// Builds a report from the current registry contents.
    pub fn report(&self, outcome: ScanOutcome) -> ScanReport {
        let dependencies = self
            .registry
            .snapshot()
            .iter()
            .map(|d| DependencyReport::from_dependency(d))
            .collect();
        ScanReport::new(dependencies, outcome.skipped)
    }

    async fn run_phases(
        &self,
        phases: &[AnalysisPhase],
        prepared: &[usize],
        outcome: &mut ScanOutcome,
    ) -> Result<(), ScanError> {
        let service = AnalyzerService::new(&self.settings);
        let workers = self.settings.workers();

        for &phase in phases {
            let bound: Vec<usize> = service
                .for_phase(&self.analyzers, phase)
                .into_iter()
                .filter(|i| prepared.contains(i))
                .collect();
            if bound.is_empty() {
                continue;
            }
            debug!(%phase, analyzers = bound.len(), "Entering phase");

            for i in bound {
                self.run_pass(self.analyzers[i].as_ref(), phase, workers, outcome)
                    .await?;
            }
        }
        Ok(())
    }

    /// One analyzer over one registry snapshot.
    async fn run_pass(
        &self,
        analyzer: &dyn Analyzer,
        phase: AnalysisPhase,
        workers: usize,
        outcome: &mut ScanOutcome,
    ) -> Result<(), ScanError> {
        if !analyzer.is_enabled() {
            return Ok(());
        }

        let started = Instant::now();
        let snapshot = self.registry.snapshot();
        let width = if analyzer.parallel_safe() { workers.max(1) } else { 1 };
        let registry = &self.registry;
        let halted = AtomicBool::new(false);

        info!(
            analyzer = analyzer.name(),
            %phase,
            dependencies = snapshot.len(),
            width,
            "Running analyzer"
        );

        // The dispatch decision is taken when the stream pulls a unit, so
        // removals, halts and self-disabling seen by then are honored.
        let mut units = stream::iter(snapshot.iter())
            .map(|dependency| {
                let dispatch = analyzer.is_enabled()
                    && !halted.load(Ordering::Acquire)
                    && registry.contains(dependency)
                    && analyzer
                        .file_filter()
                        .map_or(true, |f| f.accepts(dependency.actual_file_path()));
                async move {
                    if !dispatch {
                        return (dependency, None);
                    }
                    let result = AssertUnwindSafe(analyzer.analyze(dependency, registry))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(AnalysisError::Unexpected(panic_message(panic))));
                    (dependency, Some(result))
                }
            })
            .buffer_unordered(width);

        let mut fatal: Option<ScanError> = None;
        let mut processed = 0usize;

        while let Some((dependency, result)) = units.next().await {
            let Some(result) = result else {
                continue;
            };
            processed += 1;

            let Err(err) = result else {
                continue;
            };
            let name = dependency.display_name();
            match err.scope() {
                ErrorScope::Unit => {
                    warn!(analyzer = analyzer.name(), dependency = %name, error = %err, "Skipping dependency");
                    outcome.skipped.push(SkippedUnit {
                        analyzer: analyzer.name().to_string(),
                        dependency: Some(name),
                        reason: err.to_string(),
                    });
                }
                ErrorScope::Plugin => {
                    if analyzer.is_enabled() {
                        warn!(analyzer = analyzer.name(), error = %err, "Disabling analyzer for the rest of the scan");
                        analyzer.disable();
                        outcome.disabled.push(analyzer.name().to_string());
                    }
                    outcome.skipped.push(SkippedUnit {
                        analyzer: analyzer.name().to_string(),
                        dependency: Some(name),
                        reason: err.to_string(),
                    });
                }
                ErrorScope::Scan => {
                    error!(analyzer = analyzer.name(), dependency = %name, error = %err, "Scan-fatal error");
                    halted.store(true, Ordering::Release);
                    if fatal.is_none() {
                        fatal = Some(ScanError::Aborted {
                            analyzer: analyzer.name().to_string(),
                            dependency: Some(name),
                            source: err,
                        });
                    }
                }
            }
        }

        debug!(
            analyzer = analyzer.name(),
            processed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analyzer pass finished"
        );

        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close_all(&mut self, prepared: &[usize]) {
        for &i in prepared.iter().rev() {
            let analyzer = &mut self.analyzers[i];
            if let Err(e) = analyzer.close().await {
                warn!(analyzer = analyzer.name(), error = %e, "Failed to close analyzer");
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
