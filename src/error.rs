//! Error taxonomy shared by analyzers and the scan engine.

use thiserror::Error;

/// How far an [`AnalysisError`] reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Only the failing (analyzer, dependency) pair is skipped.
    Unit,
    /// The analyzer is disabled for the rest of the scan.
    Plugin,
    /// The whole scan is aborted.
    Scan,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    TransientIo(String),

    #[error("malformed input: {0}")]
    DataCorruption(String),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("preflight failed: {0}")]
    Preflight(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AnalysisError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            AnalysisError::Configuration(_)
            | AnalysisError::TransientIo(_)
            | AnalysisError::DataCorruption(_) => ErrorScope::Unit,
            AnalysisError::RateLimited(_) => ErrorScope::Plugin,
            AnalysisError::Preflight(_) | AnalysisError::Fatal(_) | AnalysisError::Unexpected(_) => {
                ErrorScope::Scan
            }
        }
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(e: std::io::Error) -> Self {
        AnalysisError::TransientIo(e.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        AnalysisError::DataCorruption(e.to_string())
    }
}

/// A scan-fatal failure surfaced by [`crate::Engine::analyze_dependencies`].
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("analyzer '{analyzer}' failed to prepare: {source}")]
    Preflight {
        analyzer: String,
        #[source]
        source: AnalysisError,
    },

    #[error("analyzer '{analyzer}' aborted the scan{}: {source}", on_dependency(.dependency))]
    Aborted {
        analyzer: String,
        dependency: Option<String>,
        #[source]
        source: AnalysisError,
    },
}

fn on_dependency(dependency: &Option<String>) -> String {
    match dependency {
        Some(name) => format!(" on {}", name),
        None => String::new(),
    }
}

impl ScanError {
    pub fn analyzer(&self) -> &str {
        match self {
            ScanError::Preflight { analyzer, .. } | ScanError::Aborted { analyzer, .. } => analyzer,
        }
    }

    pub fn dependency(&self) -> Option<&str> {
        match self {
            ScanError::Preflight { .. } => None,
            ScanError::Aborted { dependency, .. } => dependency.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_scopes() {
        assert_eq!(AnalysisError::TransientIo("x".into()).scope(), ErrorScope::Unit);
        assert_eq!(AnalysisError::DataCorruption("x".into()).scope(), ErrorScope::Unit);
        assert_eq!(AnalysisError::Configuration("x".into()).scope(), ErrorScope::Unit);
        assert_eq!(AnalysisError::RateLimited("x".into()).scope(), ErrorScope::Plugin);
        assert_eq!(AnalysisError::Preflight("x".into()).scope(), ErrorScope::Scan);
        assert_eq!(AnalysisError::Fatal("x".into()).scope(), ErrorScope::Scan);
        assert_eq!(AnalysisError::Unexpected("x".into()).scope(), ErrorScope::Scan);
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Aborted {
            analyzer: "Vulnerability Analyzer".to_string(),
            dependency: Some("lodash".to_string()),
            source: AnalysisError::Fatal("index corrupt".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "analyzer 'Vulnerability Analyzer' aborted the scan on lodash: fatal: index corrupt"
        );
        assert_eq!(err.dependency(), Some("lodash"));
    }

    #[test]
    fn test_json_error_is_data_corruption() {
        let err: AnalysisError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, AnalysisError::DataCorruption(_)));
    }
}
