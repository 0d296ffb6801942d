//! Finding the files to analyze.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::engine::Engine;
use crate::model::Dependency;

/// Directories never worth descending into.
const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn", "target", ".idea", ".vscode"];

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && SKIPPED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
}

/// Files under `root` that some enabled analyzer accepts, sorted by path.
///
/// `root` may also be a single file.
pub fn collect_files(engine: &Engine, root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        anyhow::bail!("Path does not exist: {}", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).into_iter().filter_entry(|e| !is_skipped(e)) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && engine.accept(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Adds every accepted file under `root` to the engine's registry.
pub fn discover(engine: &Engine, root: &Path) -> Result<usize> {
    let files = collect_files(engine, root)
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    let count = files.len();
    for path in files {
        debug!(path = %path.display(), "Discovered");
        let dependency = match Dependency::from_file(&path) {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not hash file");
                Dependency::new(path)
            }
        };
        engine.add_dependency(dependency);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{FileNameAnalyzer, NodeLockAnalyzer, NodePackageAnalyzer};
    use crate::config::Settings;
    use std::fs;

    fn engine() -> Engine {
        Engine::new(
            Settings::default(),
            vec![
                Box::new(NodeLockAnalyzer::new()),
                Box::new(FileNameAnalyzer::new()),
                Box::new(NodePackageAnalyzer::new()),
            ],
        )
    }

    #[test]
    fn test_discover_accepted_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();
        fs::write(root.join("package-lock.json"), "{}").unwrap();
        fs::write(root.join("README.md"), "# app").unwrap();
        fs::write(root.join("lib/spring-core-4.1.jar"), "").unwrap();
        fs::write(root.join(".git/package.json"), "{}").unwrap();

        let engine = engine();
        let count = discover(&engine, root).unwrap();

        assert_eq!(count, 3);
        let mut names: Vec<String> = engine
            .registry()
            .snapshot()
            .iter()
            .map(|d| d.file_name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["package-lock.json", "package.json", "spring-core-4.1.jar"]);
        assert!(engine.registry().snapshot().iter().all(|d| d.sha1().is_some()));
    }

    #[test]
    fn test_disabled_analyzer_stops_discovery() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let mut settings = Settings::default();
        settings.analyzers.insert("node_package".to_string(), false);
        let engine = Engine::new(settings, vec![Box::new(NodePackageAnalyzer::new())]);

        assert!(collect_files(&engine, dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, "{}").unwrap();
        assert_eq!(collect_files(&engine(), &path).unwrap(), vec![path]);
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&engine(), &dir.path().join("absent")).is_err());
    }
}
