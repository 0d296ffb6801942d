//! Core data types for dependencies, evidence, identifiers and findings.
//!
//! - [`Dependency`] - a component under analysis, shared between analyzers
//! - [`Evidence`] / [`EvidenceCollection`] - confidence-ranked facts
//! - [`Identifier`] - a package URL or generic coordinate
//! - [`Vulnerability`] - a known vulnerability matched to a dependency
//! - [`ScanReport`] - the rendered result of a scan
//!
//! # Example
//!
//! ```
//! use compscan::model::{Confidence, Dependency, Evidence, EvidenceType};
//!
//! let dep = Dependency::new("lib/spring-core-4.1.jar");
//! dep.update(|s| {
//!     s.evidence.add(
//!         EvidenceType::Version,
//!         Evidence::new("file", "version", "4.1", Confidence::Medium),
//!     )
//! });
//!
//! assert_eq!(dep.read(|s| s.evidence.len()), 1);
//! ```

mod dependency;
mod evidence;
mod identifier;
mod report;
mod version;
mod vulnerability;

pub use dependency::*;
pub use evidence::*;
pub use identifier::*;
pub use report::*;
pub use version::*;
pub use vulnerability::*;
