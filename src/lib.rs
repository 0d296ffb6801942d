//! Software composition analysis: identifies third-party components in a
//! codebase and matches them against known vulnerabilities.
//!
//! Files found by [`discovery`] become [`model::Dependency`] entries in the
//! [`Engine`]'s registry. The engine runs the [`analyzer`]s phase by phase,
//! collecting evidence, resolving identifiers and attaching findings, then
//! renders a [`model::ScanReport`].

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod datastore;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod output;

pub use cache::Cache;
pub use config::Settings;
pub use engine::{AnalysisPhase, DependencyRegistry, Engine, Mode, ScanOutcome};
pub use error::{AnalysisError, ScanError};
pub use model::{Dependency, ScanReport, Severity, Vulnerability};
