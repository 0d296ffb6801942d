//! Resolving collected evidence into candidate identifiers.

use crate::model::{Confidence, DependencyState, Ecosystem, EvidenceType, Identifier, PackageUrl};

/// Turns a dependency's evidence into identifiers, strongest first.
pub trait IdentificationIndex: Send + Sync {
    fn identify(&self, state: &DependencyState) -> Vec<Identifier>;
}

/// Builds package URLs straight from product and version evidence.
///
/// Each distinct product value yields one candidate; its confidence is the
/// weaker of the product and version evidence it was built from.
/// Dependencies without an ecosystem get a generic
/// `vendor:product:version` identifier instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurlIndex;

impl IdentificationIndex for PurlIndex {
    fn identify(&self, state: &DependencyState) -> Vec<Identifier> {
        let evidence = &state.evidence;

        let mut products: Vec<(String, Confidence)> = Vec::new();
        for e in evidence.get(EvidenceType::Product) {
            match products.iter_mut().find(|(v, _)| *v == e.value) {
                Some(entry) => entry.1 = entry.1.max(e.confidence),
                None => products.push((e.value.clone(), e.confidence)),
            }
        }
        if products.is_empty() {
            if let Some(name) = &state.name {
                products.push((name.clone(), Confidence::High));
            }
        }

        let version = evidence
            .best(EvidenceType::Version)
            .map(|e| (e.value.clone(), e.confidence))
            .or_else(|| state.version.clone().map(|v| (v, Confidence::High)));
        let vendor = evidence
            .best(EvidenceType::Vendor)
            .map(|e| e.value.clone());

        let mut candidates: Vec<Identifier> = products
            .into_iter()
            .map(|(product, product_confidence)| {
                let confidence = match &version {
                    Some((_, c)) => product_confidence.min(*c),
                    None => Confidence::Low,
                };
                let version = version.as_ref().map(|(v, _)| v.as_str());
                match state.ecosystem {
                    Some(ecosystem) => {
                        Identifier::purl(build_purl(ecosystem, &product, vendor.as_deref(), version), confidence)
                    }
                    None => {
                        let vendor = vendor.as_deref().unwrap_or(&product);
                        let value = match version {
                            Some(v) => format!("{}:{}:{}", vendor, product, v),
                            None => format!("{}:{}", vendor, product),
                        };
                        Identifier::generic(value, confidence)
                    }
                }
            })
            .collect();

        // Stable: equal confidence keeps evidence order
        candidates.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        candidates
    }
}

fn build_purl(ecosystem: Ecosystem, product: &str, vendor: Option<&str>, version: Option<&str>) -> PackageUrl {
    let mut purl = match ecosystem {
        Ecosystem::Npm => match product.strip_prefix('@').and_then(|p| p.split_once('/')) {
            Some((scope, name)) => {
                PackageUrl::new(ecosystem.purl_type(), name).with_namespace(format!("@{}", scope))
            }
            None => PackageUrl::new(ecosystem.purl_type(), product),
        },
        Ecosystem::Maven => {
            let purl = PackageUrl::new(ecosystem.purl_type(), product);
            match vendor {
                Some(group) if group != product => purl.with_namespace(group),
                _ => purl,
            }
        }
        Ecosystem::Pypi => PackageUrl::new(ecosystem.purl_type(), product.to_lowercase().replace('_', "-")),
        _ => PackageUrl::new(ecosystem.purl_type(), product),
    };
    if let Some(version) = version {
        purl = purl.with_version(version);
    }
    purl
}
