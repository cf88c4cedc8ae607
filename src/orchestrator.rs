//! Drives every organization through enumeration, extraction and merge, then
//! runs the serial rescue pass over records that are still empty.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use futures::future::join_all;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::discovery::{enumerate_subdomains, SubdomainSource};
use crate::domain_utils;
use crate::extraction::ExtractionPipeline;
use crate::governor::ConcurrencyGovernor;
use crate::logger::RunLogger;
use crate::merge::{merge_subdomains, merge_tag_ids};
use crate::record::{OrganizationRecord, RecordStatus};

/// The parts of the configuration the orchestrator needs
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub subdomain_enabled: bool,
    pub exclude_prefixes: Vec<String>,
    pub no_tag_sentinel: String,
    pub recheck_no_tag: bool,
    pub rescue_enabled: bool,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            subdomain_enabled: config.discovery.subdomain_enabled,
            exclude_prefixes: config.discovery.exclude_prefixes.clone(),
            no_tag_sentinel: config.roster.no_tag_sentinel.clone(),
            recheck_no_tag: config.roster.recheck_no_tag,
            rescue_enabled: config.rescue.enabled,
        }
    }
}

/// An organization where more than one distinct container was found
#[derive(Debug, Clone, Serialize)]
pub struct MultipleContainers {
    pub label: String,
    pub count: usize,
    pub tag_ids: Vec<String>,
}

/// Outcome of a run, printed at the end and optionally exported as JSON
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub skipped_existing: usize,
    pub no_website: usize,
    pub processed: usize,
    pub found_in_main_pass: usize,
    pub rescued: usize,
    pub missing_after_main: Vec<String>,
    pub missing_after_rescue: Vec<String>,
    pub multiple_containers: Vec<MultipleContainers>,
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
}

impl RunSummary {
    /// Write the summary as pretty-printed JSON
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
        Ok(())
    }
}

pub struct Orchestrator {
    settings: RunSettings,
    governor: ConcurrencyGovernor,
    source: Arc<dyn SubdomainSource>,
    pipeline: Arc<ExtractionPipeline>,
    logger: RunLogger,
}

impl Orchestrator {
    pub fn new(
        settings: RunSettings,
        governor: ConcurrencyGovernor,
        source: Arc<dyn SubdomainSource>,
        pipeline: Arc<ExtractionPipeline>,
        logger: RunLogger,
    ) -> Self {
        Self {
            settings,
            governor,
            source,
            pipeline,
            logger,
        }
    }

    /// Process every record in place and report what happened.
    pub async fn run(&self, records: &mut [OrganizationRecord]) -> RunSummary {
        let started: DateTime<Local> = Local::now();
        let mut summary = RunSummary {
            total: records.len(),
            started_at: started.to_rfc3339(),
            ..RunSummary::default()
        };

        self.classify(records);
        summary.skipped_existing = count_status(records, RecordStatus::SkippedExisting);
        summary.no_website = count_status(records, RecordStatus::NoWebsite);
        let eligible = count_status(records, RecordStatus::Pending);
        self.logger.info(&format!(
            "{} organizations loaded: {} to process, {} already tagged, {} without website",
            summary.total, eligible, summary.skipped_existing, summary.no_website
        ));

        if self.settings.subdomain_enabled && eligible > 0 {
            self.enumeration_phase(records).await;
        }

        self.extraction_phase(records, eligible).await;
        summary.processed = count_status(records, RecordStatus::Processed);
        summary.missing_after_main = missing_labels(records);
        summary.found_in_main_pass = summary.processed - summary.missing_after_main.len();
        self.logger.info(&format!(
            "{} organizations still missing a tag ID after the main pass",
            summary.missing_after_main.len()
        ));

        if self.settings.rescue_enabled && !summary.missing_after_main.is_empty() {
            summary.rescued = self.rescue_pass(records).await;
        }
        summary.missing_after_rescue = missing_labels(records);
        if self.settings.rescue_enabled {
            self.logger.info(&format!(
                "{} organizations still missing a tag ID after the rescue pass",
                summary.missing_after_rescue.len()
            ));
        }

        summary.multiple_containers = records
            .iter()
            .filter(|r| r.discovered_tag_ids.len() > 1)
            .map(|r| MultipleContainers {
                label: r.label(),
                count: r.discovered_tag_ids.len(),
                tag_ids: r.discovered_tag_ids.iter().map(|t| t.to_string()).collect(),
            })
            .collect();

        let finished = Local::now();
        summary.finished_at = finished.to_rfc3339();
        summary.duration_secs = (finished - started).num_milliseconds() as f64 / 1000.0;
        debug!("Peak browser sessions during run: {}", self.governor.browser_peak());
        summary
    }

    fn classify(&self, records: &mut [OrganizationRecord]) {
        for record in records.iter_mut() {
            record.status = if record.has_existing_tags(&self.settings.no_tag_sentinel, self.settings.recheck_no_tag) {
                RecordStatus::SkippedExisting
            } else if !record.has_website() {
                RecordStatus::NoWebsite
            } else {
                RecordStatus::Pending
            };
        }
    }

    async fn enumeration_phase(&self, records: &mut [OrganizationRecord]) {
        info!("Enumerating subdomains");
        let pending = records.iter_mut().filter(|r| r.status == RecordStatus::Pending);
        join_all(pending.map(|record| self.enumerate(record))).await;
    }

    async fn enumerate(&self, record: &mut OrganizationRecord) {
        let Some(domain) = record.registrable_domain.clone() else {
            return;
        };
        let _slot = match self.governor.enumeration_slot().await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Enumeration skipped for {}: {}", domain, e);
                return;
            }
        };

        let found = enumerate_subdomains(self.source.as_ref(), &domain, &self.settings.exclude_prefixes).await;
        debug!("{} subdomain(s) kept for {}", found.len(), domain);
        record.discovered_subdomains.extend(found);
    }

    async fn extraction_phase(&self, records: &mut [OrganizationRecord], eligible: usize) {
        info!("Extracting tag IDs");
        self.logger.start_progress(eligible as u64, "Extracting tag IDs").await;

        let pending = records.iter_mut().filter(|r| r.status == RecordStatus::Pending);
        join_all(pending.map(|record| self.process(record))).await;

        self.logger.finish_progress("Main pass complete").await;
    }

    async fn process(&self, record: &mut OrganizationRecord) {
        let _slot = match self.governor.organization_slot().await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Skipping {}: {}", record.label(), e);
                return;
            }
        };

        let candidates = candidate_hosts(record);
        self.logger.update_progress(&record.organization).await;
        let extraction = self.pipeline.extract_organization(&candidates).await;
        debug!(
            "{}: {} of {} candidate host(s) live, {} container(s) found",
            record.label(),
            extraction.live_hosts.len(),
            candidates.len(),
            extraction.tag_ids.len()
        );

        record.discovered_tag_ids = extraction.tag_ids;
        self.apply_merge(record);
        record.status = RecordStatus::Processed;

        if record.is_missing_tags() {
            self.logger.warn(&format!("No tag ID found for {}", record.label()));
        } else {
            self.logger.debug(&format!("{} -> {}", record.label(), record.merged_tag_ids.join(", ")));
        }
        self.logger.advance_progress(1).await;
    }

    fn apply_merge(&self, record: &mut OrganizationRecord) {
        record.merged_tag_ids = merge_tag_ids(
            &record.existing_tag_ids,
            &record.discovered_tag_ids,
            &self.settings.no_tag_sentinel,
        );
        record.merged_subdomains = merge_subdomains(&record.existing_subdomains, &record.discovered_subdomains);
    }

    /// One serial, longer-patience browser attempt per still-empty record
    /// against its website URL. Returns how many were recovered.
    async fn rescue_pass(&self, records: &mut [OrganizationRecord]) -> usize {
        let mut rescued = 0;
        let targets: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == RecordStatus::Processed && r.is_missing_tags())
            .map(|(i, _)| i)
            .collect();
        self.logger.info(&format!("Rescue pass over {} organization(s)", targets.len()));

        for index in targets {
            let record = &mut records[index];
            let url = domain_utils::website_url(&record.website);
            let found = self.pipeline.rescue(&url).await;
            if found.is_empty() {
                self.logger.warn(&format!("Rescue found nothing for {}", record.label()));
                continue;
            }

            record.discovered_tag_ids.extend(found);
            self.apply_merge(record);
            self.logger.info(&format!("Rescued {} -> {}", record.label(), record.merged_tag_ids.join(", ")));
            rescued += 1;
        }

        rescued
    }
}

/// Base domain first, then every known subdomain, without duplicates
pub fn candidate_hosts(record: &OrganizationRecord) -> Vec<String> {
    let Some(domain) = record.registrable_domain.as_deref() else {
        return Vec::new();
    };

    let base = format!("https://{}", domain);
    let mut hosts = vec![base.clone()];
    hosts.extend(record.discovered_subdomains.iter().filter(|s| **s != base).cloned());
    hosts
}

fn count_status(records: &[OrganizationRecord], status: RecordStatus) -> usize {
    records.iter().filter(|r| r.status == status).count()
}

fn missing_labels(records: &[OrganizationRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.status == RecordStatus::Processed && r.is_missing_tags())
        .map(|r| r.label())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_utils::DomainRule;

    #[test]
    fn test_candidate_hosts_base_first_without_duplicates() {
        let mut record = OrganizationRecord::new(
            0,
            "Acme",
            "http://www.acme.com",
            Vec::new(),
            vec!["acme.com".to_string(), "blog.acme.com".to_string()],
            "N/A",
            DomainRule::LastTwoLabels,
        );
        record.discovered_subdomains.insert("https://app.acme.com".to_string());

        assert_eq!(
            candidate_hosts(&record),
            vec!["https://acme.com", "https://app.acme.com", "https://blog.acme.com"]
        );
    }

    #[test]
    fn test_candidate_hosts_empty_without_website() {
        let record = OrganizationRecord::new(0, "Acme", "", Vec::new(), Vec::new(), "N/A", DomainRule::LastTwoLabels);
        assert!(candidate_hosts(&record).is_empty());
    }

    #[test]
    fn test_summary_exports_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = RunSummary {
            total: 2,
            missing_after_main: vec!["Acme (acme.com)".to_string()],
            ..RunSummary::default()
        };
        summary.export_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total"], 2);
        assert_eq!(value["missing_after_main"][0], "Acme (acme.com)");
    }
}
