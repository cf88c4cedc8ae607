//! Reconciliation of pre-existing roster data with newly discovered values.
//!
//! Both merges keep existing entries first in their original order, append
//! new values in sorted order, and are idempotent.

use std::collections::{BTreeSet, HashSet};

use crate::domain_utils;
use crate::tag_id::TagId;

/// Merge existing tag entries with discovered container IDs.
///
/// The "checked, nothing found" sentinel is dropped as soon as any real
/// identifier is present.
pub fn merge_tag_ids(existing: &[String], discovered: &BTreeSet<TagId>, no_tag_sentinel: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged: Vec<String> = existing
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(|s| s.to_string())
        .collect();

    for id in discovered {
        if seen.insert(id.as_str().to_string()) {
            merged.push(id.as_str().to_string());
        }
    }

    if merged.len() > 1 && merged.iter().any(|s| s == no_tag_sentinel) {
        merged.retain(|s| s != no_tag_sentinel);
    }

    merged
}

/// Merge existing subdomain entries with discovered ones, every entry
/// normalized to `https://<host>`.
pub fn merge_subdomains(existing: &[String], discovered: &BTreeSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    let existing_urls = existing.iter().filter_map(|s| domain_utils::to_https_url(s));
    let discovered_urls: BTreeSet<String> = discovered
        .iter()
        .filter_map(|s| domain_utils::to_https_url(s))
        .collect();

    for url in existing_urls.chain(discovered_urls) {
        if seen.insert(url.clone()) {
            merged.push(url);
        }
    }

    merged
}
