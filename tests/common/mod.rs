//! Shared test doubles and helpers for integration tests.

#![allow(dead_code)]

pub mod mocks;
pub mod wiremock_helpers;

use std::sync::Arc;
use std::time::Duration;

use gtmfinder::config::{AppConfig, ConcurrencyConfig, HttpConfig};
use gtmfinder::discovery::SubdomainSource;
use gtmfinder::domain_utils::DomainRule;
use gtmfinder::extraction::{BrowserDriver, CaptureSettings, ExtractionPipeline, PageFetcher};
use gtmfinder::governor::ConcurrencyGovernor;
use gtmfinder::logger::RunLogger;
use gtmfinder::{Orchestrator, OrganizationRecord, RunSettings};

/// Short capture timings so browser tests finish quickly
pub fn quick_capture() -> CaptureSettings {
    CaptureSettings {
        headless: true,
        page_load_timeout: Duration::from_millis(100),
        poll_window: Duration::from_millis(30),
        poll_interval: Duration::from_millis(10),
    }
}

pub fn concurrency(organizations: usize, browser_sessions: usize) -> ConcurrencyConfig {
    ConcurrencyConfig {
        organizations,
        per_host_connections: 5,
        browser_sessions,
        enumeration_workers: 10,
    }
}

pub fn http_config(fetch_timeout_secs: u64) -> HttpConfig {
    HttpConfig {
        user_agent: "gtmfinder-tests/1.0".to_string(),
        fetch_timeout_secs,
        liveness_timeout_secs: fetch_timeout_secs,
        fallback_timeout_secs: fetch_timeout_secs,
        max_redirects: 3,
    }
}

pub fn pipeline(
    fetcher: Arc<dyn PageFetcher>,
    browser: Arc<dyn BrowserDriver>,
    governor: &ConcurrencyGovernor,
) -> ExtractionPipeline {
    ExtractionPipeline::new(fetcher, browser, governor.clone(), quick_capture(), quick_capture())
}

pub fn settings(rescue_enabled: bool) -> RunSettings {
    let config = AppConfig::embedded().unwrap();
    RunSettings {
        rescue_enabled,
        ..RunSettings::from_config(&config)
    }
}

/// Orchestrator wired to the given doubles, plus its governor for assertions
pub fn orchestrator(
    fetcher: Arc<dyn PageFetcher>,
    browser: Arc<dyn BrowserDriver>,
    source: Arc<dyn SubdomainSource>,
    caps: ConcurrencyConfig,
    settings: RunSettings,
) -> (Orchestrator, ConcurrencyGovernor) {
    let governor = ConcurrencyGovernor::from_config(&caps);
    let pipeline = Arc::new(pipeline(fetcher, browser, &governor));
    let orchestrator = Orchestrator::new(settings, governor.clone(), source, pipeline, RunLogger::silent());
    (orchestrator, governor)
}

pub fn record(row: usize, organization: &str, website: &str, tags: &[&str]) -> OrganizationRecord {
    OrganizationRecord::new(
        row,
        organization,
        website,
        tags.iter().map(|s| s.to_string()).collect(),
        Vec::new(),
        "N/A",
        DomainRule::LastTwoLabels,
    )
}

/// The standard GTM snippet with both loader shapes
pub fn gtm_snippet(id: &str) -> String {
    format!(
        r#"<html><head><script async src="https://www.googletagmanager.com/gtm.js?id={id}"></script></head>
<body><noscript><iframe src="https://www.googletagmanager.com/ns.html?id={id}" height="0" width="0"></iframe></noscript></body></html>"#
    )
}
