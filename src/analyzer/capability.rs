//! Small building blocks analyzers compose instead of inheriting behavior.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Runtime enabled flag. Analyzers may be switched off by settings, by a
/// configuration error in `prepare`, or by the engine after rate limiting.
#[derive(Debug)]
pub struct EnabledSwitch(AtomicBool);

impl EnabledSwitch {
    pub fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }

    pub fn disable(&self) {
        self.set(false);
    }
}

impl Default for EnabledSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot latch for analyzers that process the whole registry on their
/// first invocation in a phase.
#[derive(Debug, Default)]
pub struct SingleRun {
    claimed: AtomicBool,
}

impl SingleRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for exactly one caller until [`SingleRun::reset`].
    pub fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn reset(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

/// Accepts files by exact name or extension, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    file_names: Vec<String>,
    extensions: Vec<String>,
}

impl FileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_names(mut self, names: &[&str]) -> Self {
        self.file_names
            .extend(names.iter().map(|n| n.to_lowercase()));
        self
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions.extend(
            extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase()),
        );
        self
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
            return false;
        };
        if self.file_names.iter().any(|n| *n == name) {
            return true;
        }
        match path.extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

/// Matches identifiers or vulnerability names against suppression patterns.
#[derive(Debug, Clone, Default)]
pub struct SuppressionFilter {
    patterns: Vec<String>,
}

impl SuppressionFilter {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Adds patterns not already present.
    pub fn extend(&mut self, patterns: impl IntoIterator<Item = String>) {
        for pattern in patterns {
            if !self.patterns.contains(&pattern) {
                self.patterns.push(pattern);
            }
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, text)
            } else {
                pattern == text
            }
        })
    }
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Prefix before the first *
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Suffix after the last *
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("lodash*", "lodash.debounce"));
        assert!(glob_match("*-cli", "typescript-cli"));
        assert!(glob_match("*lodash*", "my-lodash-plugin"));
        assert!(glob_match("pkg:npm/%40types/*", "pkg:npm/%40types/node@18.0.0"));
        assert!(!glob_match("@types/*", "@babel/core"));
        assert!(!glob_match("a*b*c", "acb"));
    }

    #[test]
    fn test_suppression_filter() {
        let filter = SuppressionFilter::new(vec![
            "CVE-2020-1234".to_string(),
            "pkg:npm/left-pad*".to_string(),
        ]);
        assert!(filter.matches("CVE-2020-1234"));
        assert!(filter.matches("pkg:npm/left-pad@1.0.0"));
        assert!(!filter.matches("CVE-2020-12345"));
        assert!(SuppressionFilter::default().is_empty());
    }

    #[test]
    fn test_single_run_claims_once() {
        let latch = SingleRun::new();
        assert!(latch.claim());
        assert!(!latch.claim());
        latch.reset();
        assert!(latch.claim());
    }

    #[test]
    fn test_enabled_switch() {
        let switch = EnabledSwitch::new();
        assert!(switch.is_enabled());
        switch.disable();
        assert!(!switch.is_enabled());
        switch.set(true);
        assert!(switch.is_enabled());
    }

    #[test]
    fn test_file_filter() {
        let filter = FileFilter::new()
            .with_file_names(&["package.json"])
            .with_extensions(&[".jar", "war"]);
        assert!(filter.accepts(Path::new("/app/package.json")));
        assert!(filter.accepts(Path::new("/app/Package.JSON")));
        assert!(filter.accepts(Path::new("lib/spring-core-4.1.jar")));
        assert!(filter.accepts(Path::new("app.WAR")));
        assert!(!filter.accepts(Path::new("/app/package-lock.json")));
        assert!(!filter.accepts(Path::new("README")));
    }
}
