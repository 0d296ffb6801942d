//! Configuration file handling.
//!
//! Settings are read from a TOML file. Every key is optional; missing keys
//! take the defaults below.
//!
//! # Configuration Location
//!
//! - Linux: `~/.config/compscan/config.toml`
//! - macOS: `~/Library/Application Support/compscan/config.toml`
//! - Windows: `%APPDATA%\compscan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! mode = "standalone"
//! allow_experimental = false
//! allow_retired = false
//! worker_threads = 0
//! min_identifier_confidence = "MEDIUM"
//!
//! [analyzers]
//! node_lock = true
//!
//! [suppression]
//! identifiers = ["pkg:npm/left-pad*"]
//! vulnerabilities = ["CVE-2020-1234"]
//!
//! [datastore]
//! kind = "local"
//! path = "vulns.json"
//! cache_ttl_hours = 24
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::Mode;
use crate::model::Confidence;

/// Scan settings shared by the engine and every analyzer.
///
/// # Example
///
/// ```no_run
/// use compscan::Settings;
///
/// let settings = Settings::load().unwrap();
/// println!("Workers: {}", settings.workers());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Which phases run.
    pub mode: Mode,

    /// Run analyzers marked experimental.
    pub allow_experimental: bool,

    /// Run analyzers marked retired.
    pub allow_retired: bool,

    /// Maximum concurrent invocations of a parallel-safe analyzer.
    ///
    /// `0` uses the available parallelism of the host.
    pub worker_threads: usize,

    /// Identifiers below this confidence are reported but not used for
    /// vulnerability lookup.
    pub min_identifier_confidence: Confidence,

    /// Per-analyzer enabled flags, keyed by the analyzer's setting key.
    pub analyzers: BTreeMap<String, bool>,

    pub suppression: SuppressionConfig,

    pub datastore: DatastoreConfig,
}

/// Suppression rules consumed by the suppression analyzers.
///
/// Entries support `*` wildcards (e.g. `"pkg:npm/@types/*"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// Identifier patterns whose vulnerabilities are recorded as suppressed.
    pub identifiers: Vec<String>,

    /// Vulnerability names that are moved to the suppressed list.
    pub vulnerabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreKind {
    #[default]
    Local,
    Osv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub kind: DatastoreKind,

    /// JSON file backing the local datastore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// How long to cache remote lookups, in hours.
    pub cache_ttl_hours: u64,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            kind: DatastoreKind::Local,
            path: None,
            cache_ttl_hours: 24,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Standalone,
            allow_experimental: false,
            allow_retired: false,
            worker_threads: 0,
            min_identifier_confidence: Confidence::Medium,
            analyzers: BTreeMap::new(),
            suppression: SuppressionConfig::default(),
            datastore: DatastoreConfig::default(),
        }
    }
}

impl Settings {
    /// Loads settings from the default config file, or defaults if it
    /// doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Loads settings from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Saves the settings to the default config file, creating the parent
    /// directory if needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("compscan")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let settings = Settings::default();
        toml::to_string_pretty(&settings).unwrap_or_default()
    }

    /// The configured flag for an analyzer; analyzers are on unless
    /// switched off.
    pub fn analyzer_enabled(&self, key: &str) -> bool {
        self.analyzers.get(key).copied().unwrap_or(true)
    }

    /// Effective worker count, never zero.
    pub fn workers(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();

        assert_eq!(settings.mode, Mode::Standalone);
        assert!(!settings.allow_experimental);
        assert!(!settings.allow_retired);
        assert_eq!(settings.min_identifier_confidence, Confidence::Medium);
        assert_eq!(settings.datastore.kind, DatastoreKind::Local);
        assert_eq!(settings.datastore.cache_ttl_hours, 24);
        assert!(settings.suppression.identifiers.is_empty());
        assert!(settings.workers() >= 1);
    }

    #[test]
    fn test_analyzer_enabled_defaults_to_true() {
        let mut settings = Settings::default();
        settings.analyzers.insert("node_lock".to_string(), false);

        assert!(!settings.analyzer_enabled("node_lock"));
        assert!(settings.analyzer_enabled("file_name"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
mode = "evidence-collection"
worker_threads = 2
min_identifier_confidence = "HIGH"

[analyzers]
bundling = false

[suppression]
vulnerabilities = ["CVE-2020-1234"]

[datastore]
kind = "osv"
"#,
        )
        .unwrap();

        assert_eq!(settings.mode, Mode::EvidenceCollection);
        assert_eq!(settings.workers(), 2);
        assert_eq!(settings.min_identifier_confidence, Confidence::High);
        assert!(!settings.analyzer_enabled("bundling"));
        assert_eq!(settings.suppression.vulnerabilities, vec!["CVE-2020-1234"]);
        assert_eq!(settings.datastore.kind, DatastoreKind::Osv);
        assert_eq!(settings.datastore.cache_ttl_hours, 24);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.allow_experimental = true;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert!(loaded.allow_experimental);
    }

    #[test]
    fn test_generate_default_config_parses() {
        let text = Settings::generate_default_config();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed.mode, Mode::Standalone);
    }
}
