use serde::{Deserialize, Serialize};
use std::fmt;

/// Certainty attached to a piece of evidence or an identifier.
///
/// Variants are declared from weakest to strongest so the derived `Ord` gives
/// `Highest > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Highest,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
            Confidence::Highest => "HIGHEST",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Confidence::Low),
            "MEDIUM" => Ok(Confidence::Medium),
            "HIGH" => Ok(Confidence::High),
            "HIGHEST" => Ok(Confidence::Highest),
            _ => Err(format!(
                "Unknown confidence: {}. Use LOW, MEDIUM, HIGH or HIGHEST",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Vendor,
    Product,
    Version,
}

impl EvidenceType {
    pub const ALL: [EvidenceType; 3] = [
        EvidenceType::Vendor,
        EvidenceType::Product,
        EvidenceType::Version,
    ];
}

/// A single collected fact about a dependency.
///
/// Two pieces of evidence are the same fact when `source`, `name` and `value`
/// match; confidence does not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub source: String,
    pub name: String,
    pub value: String,
    pub confidence: Confidence,
}

impl Evidence {
    pub fn new(
        source: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            value: value.into(),
            confidence,
        }
    }

    pub fn is_from(&self, source: &str, name: &str) -> bool {
        self.source == source && self.name == name
    }
}

impl PartialEq for Evidence {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.name == other.name && self.value == other.value
    }
}

impl Eq for Evidence {}

/// Vendor, product and version evidence for one dependency.
///
/// Entries keep insertion order so that evidence accumulated by analyzers in
/// registration order is reproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceCollection {
    vendors: Vec<Evidence>,
    products: Vec<Evidence>,
    versions: Vec<Evidence>,
}

impl EvidenceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, kind: EvidenceType) -> &Vec<Evidence> {
        match kind {
            EvidenceType::Vendor => &self.vendors,
            EvidenceType::Product => &self.products,
            EvidenceType::Version => &self.versions,
        }
    }

    fn bucket_mut(&mut self, kind: EvidenceType) -> &mut Vec<Evidence> {
        match kind {
            EvidenceType::Vendor => &mut self.vendors,
            EvidenceType::Product => &mut self.products,
            EvidenceType::Version => &mut self.versions,
        }
    }

    /// Adds evidence, returning `false` when the same fact is already present.
    ///
    /// A duplicate carrying a stronger confidence replaces the stored entry.
    pub fn add(&mut self, kind: EvidenceType, evidence: Evidence) -> bool {
        let bucket = self.bucket_mut(kind);
        match bucket.iter().position(|e| *e == evidence) {
            Some(pos) => {
                if evidence.confidence > bucket[pos].confidence {
                    bucket.remove(pos);
                    bucket.insert(pos, evidence);
                }
                false
            }
            None => {
                bucket.push(evidence);
                true
            }
        }
    }

    pub fn remove(&mut self, kind: EvidenceType, evidence: &Evidence) -> bool {
        let bucket = self.bucket_mut(kind);
        let before = bucket.len();
        bucket.retain(|e| e != evidence);
        bucket.len() != before
    }

    /// Removes every entry of `kind` for which `keep` returns false.
    pub fn retain<F>(&mut self, kind: EvidenceType, keep: F) -> usize
    where
        F: FnMut(&Evidence) -> bool,
    {
        let bucket = self.bucket_mut(kind);
        let before = bucket.len();
        bucket.retain(keep);
        before - bucket.len()
    }

    pub fn get(&self, kind: EvidenceType) -> &[Evidence] {
        self.bucket(kind)
    }

    /// Evidence of `kind` at or above `confidence`, in insertion order.
    pub fn at_least(&self, kind: EvidenceType, confidence: Confidence) -> Vec<&Evidence> {
        self.bucket(kind)
            .iter()
            .filter(|e| e.confidence >= confidence)
            .collect()
    }

    /// The strongest evidence of `kind`; the earliest entry wins a tie.
    pub fn best(&self, kind: EvidenceType) -> Option<&Evidence> {
        self.bucket(kind).iter().fold(None, |best: Option<&Evidence>, e| match best {
            Some(b) if b.confidence >= e.confidence => Some(b),
            _ => Some(e),
        })
    }

    pub fn contains(&self, kind: EvidenceType, evidence: &Evidence) -> bool {
        self.bucket(kind).contains(evidence)
    }

    pub fn contains_confidence(&self, kind: EvidenceType, confidence: Confidence) -> bool {
        self.bucket(kind).iter().any(|e| e.confidence == confidence)
    }

    pub fn len(&self) -> usize {
        self.vendors.len() + self.products.len() + self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
