use serde::{Deserialize, Serialize};
use std::fmt;

use super::Confidence;

/// A package URL coordinate (`pkg:type/namespace/name@version`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageUrl {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PackageUrl {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into().to_lowercase(),
            namespace: None,
            name: name.into(),
            version: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Parses the canonical `pkg:` form produced by [`fmt::Display`].
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("pkg:")?;
        let (path, version) = match rest.rsplit_once('@') {
            Some((path, version)) if !version.is_empty() => (path, Some(version.to_string())),
            _ => (rest, None),
        };
        let mut segments = path.split('/');
        let ty = segments.next().filter(|t| !t.is_empty())?;
        let remaining: Vec<String> = segments.map(decode).collect();
        let (namespace, name) = match remaining.as_slice() {
            [] => return None,
            [name] => (None, name.clone()),
            [ns @ .., name] => (Some(ns.join("/")), name.clone()),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            ty: ty.to_lowercase(),
            namespace,
            name,
            version,
        })
    }
}

fn encode(segment: &str) -> String {
    segment.replace('@', "%40")
}

fn decode(segment: &str) -> String {
    segment.replace("%40", "@")
}

impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/", self.ty)?;
        if let Some(namespace) = &self.namespace {
            write!(f, "{}/", encode(namespace))?;
        }
        write!(f, "{}", encode(&self.name))?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Coordinate {
    Purl(PackageUrl),
    Generic { value: String },
}

/// A coordinate used for reporting and as the vulnerability datastore key.
///
/// Identifiers are unique by their canonical string form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub coordinate: Coordinate,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Identifier {
    pub fn purl(purl: PackageUrl, confidence: Confidence) -> Self {
        Self {
            coordinate: Coordinate::Purl(purl),
            confidence,
            url: None,
        }
    }

    pub fn generic(value: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            coordinate: Coordinate::Generic {
                value: value.into(),
            },
            confidence,
            url: None,
        }
    }

    /// Builds a purl identifier when `value` parses as one, a generic one otherwise.
    pub fn parse(value: &str, confidence: Confidence) -> Self {
        match PackageUrl::parse(value) {
            Some(purl) => Self::purl(purl, confidence),
            None => Self::generic(value, confidence),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn as_purl(&self) -> Option<&PackageUrl> {
        match &self.coordinate {
            Coordinate::Purl(purl) => Some(purl),
            Coordinate::Generic { .. } => None,
        }
    }

    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.coordinate {
            Coordinate::Purl(purl) => write!(f, "{}", purl),
            Coordinate::Generic { value } => write!(f, "{}", value),
        }
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Identifier {}
