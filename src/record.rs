//! Per-organization state carried through a run.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::domain_utils::{self, DomainRule};
use crate::tag_id::TagId;

/// Why a record did or did not go through discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Waiting for the orchestrator
    Pending,
    /// Existing tag IDs were present at load time
    SkippedExisting,
    /// Website was missing
    NoWebsite,
    /// Went through enumeration and the extraction pipeline
    Processed,
}

/// One row of the roster.
///
/// Built once at load time and mutated only by the task that owns it.
#[derive(Debug, Clone)]
pub struct OrganizationRecord {
    /// Zero-based data row index in the roster
    pub row: usize,
    pub organization: String,
    /// Raw website cell, or the no-website sentinel
    pub website: String,
    pub registrable_domain: Option<String>,
    pub existing_tag_ids: Vec<String>,
    pub existing_subdomains: Vec<String>,
    /// Subdomain URLs from the input plus enumeration, `https://` normalized
    pub discovered_subdomains: BTreeSet<String>,
    pub discovered_tag_ids: BTreeSet<TagId>,
    pub merged_tag_ids: Vec<String>,
    pub merged_subdomains: Vec<String>,
    pub status: RecordStatus,
}

impl OrganizationRecord {
    pub fn new(
        row: usize,
        organization: impl Into<String>,
        website: impl Into<String>,
        existing_tag_ids: Vec<String>,
        existing_subdomains: Vec<String>,
        no_website_sentinel: &str,
        rule: DomainRule,
    ) -> Self {
        let website = website.into();
        let website = if website.trim().is_empty() {
            no_website_sentinel.to_string()
        } else {
            website.trim().to_string()
        };

        let registrable_domain = if website == no_website_sentinel {
            None
        } else {
            Some(domain_utils::extract_registrable_domain_with(&website, rule))
                .filter(|d| !d.is_empty())
        };

        let discovered_subdomains = existing_subdomains
            .iter()
            .filter_map(|s| domain_utils::to_https_url(s))
            .collect();

        Self {
            row,
            organization: organization.into(),
            merged_tag_ids: existing_tag_ids.clone(),
            merged_subdomains: existing_subdomains.clone(),
            website,
            registrable_domain,
            existing_tag_ids,
            existing_subdomains,
            discovered_subdomains,
            discovered_tag_ids: BTreeSet::new(),
            status: RecordStatus::Pending,
        }
    }

    pub fn has_website(&self) -> bool {
        self.registrable_domain.is_some()
    }

    /// Rows with existing tag IDs are never sent through the pipeline.
    ///
    /// With `recheck_no_tag`, a row holding only the sentinel is eligible again.
    pub fn has_existing_tags(&self, no_tag_sentinel: &str, recheck_no_tag: bool) -> bool {
        if self.existing_tag_ids.is_empty() {
            return false;
        }
        !(recheck_no_tag && self.existing_tag_ids.iter().all(|t| t == no_tag_sentinel))
    }

    /// Label used in user-facing lists
    pub fn label(&self) -> String {
        if self.organization.trim().is_empty() {
            format!("row {} ({})", self.row + 1, self.website)
        } else {
            format!("{} ({})", self.organization, self.website)
        }
    }

    /// The no-tag sentinel alone still counts as missing
    pub fn is_missing_tags(&self) -> bool {
        !self.merged_tag_ids.iter().any(|t| TagId::parse(t).is_some())
    }
}

/// Split a comma-separated cell, trimming entries and dropping empties
pub fn split_cell(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
