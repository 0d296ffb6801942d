//! Loose version parsing used when comparing version evidence.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+[a-z]{1,3}$|[a-z]{1,3}[_-]?\d+|\d+|(rc|release|snapshot|beta|alpha)$)")
        .expect("version part pattern is valid")
});

static IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\d+(\.\d+){1,6}([._-]?(snapshot|release|final|alpha|beta|rc$|[a-z]{1,3}[_-]?\d{1,8}|[a-z]\b|\d{1,8}\b))?",
    )
    .expect("version pattern is valid")
});

static SINGLE_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(\.\d+){0,6}([._-]?(snapshot|release|final|alpha|beta|rc$|[a-zA-Z]{1,3}[_-]?\d{1,8}))?")
        .expect("single version pattern is valid")
});

static PRE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)[_-](\d+\.\d{1,6})+").expect("pre-version pattern is valid")
});

/// A version split into comparable parts (`"2.3.1"` → `["2", "3", "1"]`).
///
/// Equality is deliberately loose: trailing zero parts are ignored
/// (`1.0 == 1.0.0`) but a single part never equals three or more
/// (`2 != 2.3.1`).
#[derive(Debug, Clone, Eq)]
pub struct DependencyVersion {
    parts: Vec<String>,
}

impl DependencyVersion {
    pub fn new(version: &str) -> Self {
        let lower = version.to_lowercase();
        let mut parts: Vec<String> = PART
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect();
        if parts.is_empty() {
            parts.push(version.to_string());
        }
        Self { parts }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl PartialEq for DependencyVersion {
    fn eq(&self, other: &Self) -> bool {
        let min = self.parts.len().min(other.parts.len());
        let max = self.parts.len().max(other.parts.len());
        if min == 1 && max >= 3 {
            return false;
        }
        if self.parts[..min] != other.parts[..min] {
            return false;
        }
        self.parts[min..].iter().all(|p| p == "0") && other.parts[min..].iter().all(|p| p == "0")
    }
}

impl fmt::Display for DependencyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

/// Extracts the first version-looking token from free text such as a file name.
pub fn parse_version(text: &str) -> Option<DependencyVersion> {
    if text == "-" {
        return Some(DependencyVersion {
            parts: vec![text.to_string()],
        });
    }
    let found = IN_TEXT
        .find(text)
        .or_else(|| SINGLE_IN_TEXT.find(text))?
        .as_str();
    let found = match found.strip_suffix("-py2") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => found,
    };
    Some(DependencyVersion::new(found))
}

/// The part of `text` before its version, e.g. `spring-core` for
/// `spring-core-4.1`. Text without a version is returned unchanged.
pub fn parse_pre_version(text: &str) -> &str {
    if parse_version(text).is_none() {
        return text;
    }
    PRE_VERSION
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
}

/// Whether two npm version strings can name the same package.
///
/// Either side may be an exact version (`4.17.20`, `v4.17.20`) or a range
/// as written in `package.json` (`^4.17.0`, `>=1.5.4 <2.0.0`, `1 || 2`).
/// Two ranges are never compared with each other.
pub fn npm_versions_match(current: &str, next: &str) -> bool {
    let (current, next) = (current.trim(), next.trim());
    if current.is_empty() || next.is_empty() {
        return false;
    }
    if current == next || current == "*" || next == "*" {
        return true;
    }
    match (current.contains(' '), next.contains(' ')) {
        (true, true) => false,
        (true, false) => satisfies(next, current),
        (false, true) => satisfies(current, next),
        (false, false) => satisfies(current, next) || satisfies(next, current),
    }
}

fn satisfies(version: &str, range: &str) -> bool {
    let Some(start) = version.find(|c: char| c.is_ascii_digit()) else {
        return false;
    };
    let Ok(version) = semver::Version::parse(&version[start..]) else {
        return false;
    };
    range
        .split("||")
        .filter_map(npm_requirement)
        .any(|req| req.matches(&version))
}

/// Converts one npm range alternative into a `semver` requirement. npm
/// separates comparators with spaces and treats a bare version as exact.
fn npm_requirement(range: &str) -> Option<semver::VersionReq> {
    let mut comparators = Vec::new();
    let mut operator = String::new();
    for token in range.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            operator.push_str(token);
            continue;
        }
        let comparator = format!("{}{}", std::mem::take(&mut operator), token.trim_start_matches('v'));
        let exact = comparator.starts_with(|c: char| c.is_ascii_digit())
            && !comparator.contains(['x', 'X', '*']);
        comparators.push(if exact { format!("={}", comparator) } else { comparator });
    }
    if comparators.is_empty() {
        return None;
    }
    semver::VersionReq::parse(&comparators.join(", ")).ok()
}
