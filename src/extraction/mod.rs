//! Tag container extraction: liveness filtering and the three-tier waterfall.
//!
//! For each live candidate host the tiers run in order of cost and the first
//! one to produce an identifier wins:
//!
//! 1. HTTP fetch, scanning the final URL, every redirect hop and the body
//! 2. Headless browser capture, polling network traffic and the rendered DOM
//! 3. Raw HTML fetch with a plain pattern scan
//!
//! Every tier failure is soft. Errors and empty results both fall through to
//! the next tier.

pub mod browser;
pub mod http;

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{BrowserConfig, RescueConfig};
use crate::domain_utils;
use crate::error::ProbeError;
use crate::governor::{ConcurrencyGovernor, Slot};
use crate::tag_id::{self, TagId};

pub use browser::ChromeDriver;
pub use http::HttpFetcher;

/// Result of a Tier 1 fetch
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub final_url: String,
    /// Every URL visited before the final one, in order
    pub redirect_chain: Vec<String>,
    pub body: String,
}

/// HTTP capability used by the liveness probe and Tiers 1 and 3.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET following redirects, recording the chain
    async fn get(&self, url: &str) -> Result<FetchedPage, ProbeError>;

    /// Plain GET returning the body text
    async fn get_raw(&self, url: &str) -> Result<String, ProbeError>;

    /// HEAD following redirects, returning the final status code
    async fn head_status(&self, url: &str) -> Result<u16, ProbeError>;
}

/// Browser capability used by Tier 2 and the rescue pass.
///
/// Called from a blocking thread; implementations may block freely.
pub trait BrowserDriver: Send + Sync {
    /// Start a session with traffic capture enabled and navigate to `url`.
    ///
    /// A navigation that does not settle within the page-load timeout is not
    /// an error; the session continues with whatever loaded.
    fn open(&self, url: &str, settings: &CaptureSettings) -> Result<Box<dyn BrowserSession>, ProbeError>;
}

/// A live browser session. Dropping it tears the session down.
pub trait BrowserSession {
    /// URLs of network traffic captured since the previous call
    fn drain_requests(&mut self) -> Vec<String>;

    /// Current rendered document
    fn page_source(&mut self) -> Result<String, ProbeError>;
}

/// Timing for one browser capture
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub poll_window: Duration,
    pub poll_interval: Duration,
}

impl From<&BrowserConfig> for CaptureSettings {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            page_load_timeout: Duration::from_secs(config.page_load_timeout_secs),
            poll_window: Duration::from_secs(config.poll_window_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl From<&RescueConfig> for CaptureSettings {
    fn from(config: &RescueConfig) -> Self {
        Self {
            headless: config.headless,
            page_load_timeout: Duration::from_secs(config.page_load_timeout_secs),
            poll_window: Duration::from_secs(config.poll_window_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Http,
    Browser,
    RawHtml,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Http => "http",
            Tier::Browser => "browser",
            Tier::RawHtml => "raw-html",
        };
        f.write_str(name)
    }
}

/// Outcome of a single tier attempt.
#[derive(Debug)]
pub enum TierOutcome {
    Found(BTreeSet<TagId>),
    NotFound,
    SoftError(ProbeError),
}

impl TierOutcome {
    fn from_result(result: Result<BTreeSet<TagId>, ProbeError>) -> Self {
        match result {
            Ok(ids) if ids.is_empty() => TierOutcome::NotFound,
            Ok(ids) => TierOutcome::Found(ids),
            Err(e) => TierOutcome::SoftError(e),
        }
    }

    /// Collapse not-found and soft errors into an empty set
    pub fn into_ids(self) -> BTreeSet<TagId> {
        match self {
            TierOutcome::Found(ids) => ids,
            TierOutcome::NotFound | TierOutcome::SoftError(_) => BTreeSet::new(),
        }
    }
}

/// Which tier, if any, produced the identifiers for one host
#[derive(Debug, Clone)]
pub struct HostExtraction {
    pub url: String,
    pub tier: Option<Tier>,
    pub tag_ids: BTreeSet<TagId>,
}

/// Aggregated extraction result for one organization
#[derive(Debug, Clone, Default)]
pub struct OrgExtraction {
    pub live_hosts: Vec<String>,
    pub per_host: Vec<HostExtraction>,
    pub tag_ids: BTreeSet<TagId>,
}

/// The waterfall driver. Cheap to share behind an `Arc`.
pub struct ExtractionPipeline {
    fetcher: Arc<dyn PageFetcher>,
    browser: Arc<dyn BrowserDriver>,
    governor: ConcurrencyGovernor,
    tier2: CaptureSettings,
    rescue: CaptureSettings,
}

impl ExtractionPipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        browser: Arc<dyn BrowserDriver>,
        governor: ConcurrencyGovernor,
        tier2: CaptureSettings,
        rescue: CaptureSettings,
    ) -> Self {
        Self {
            fetcher,
            browser,
            governor,
            tier2,
            rescue,
        }
    }

    async fn host_slot(&self, url: &str) -> Result<Slot, ProbeError> {
        let host = domain_utils::connection_key(url);
        self.governor.host_slot(&host).await.map_err(|e| ProbeError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// HEAD probe; success and redirect status classes count as live.
    pub async fn is_live(&self, url: &str) -> bool {
        let _slot = match self.host_slot(url).await {
            Ok(slot) => slot,
            Err(_) => return false,
        };

        match self.fetcher.head_status(url).await {
            Ok(status) => {
                debug!("Liveness {} -> {}", url, status);
                (200..400).contains(&status)
            }
            Err(e) => {
                debug!("Liveness probe failed: {}", e);
                false
            }
        }
    }

    /// Keep only candidates that pass the liveness probe, preserving order
    pub async fn filter_live(&self, candidates: &[String]) -> Vec<String> {
        let checks = join_all(candidates.iter().map(|url| self.is_live(url))).await;
        candidates
            .iter()
            .zip(checks)
            .filter(|(_, live)| *live)
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Tier 1: fetch with redirects and scan the final URL, the chain and the body
    pub async fn tier_http(&self, url: &str) -> TierOutcome {
        let _slot = match self.host_slot(url).await {
            Ok(slot) => slot,
            Err(e) => return TierOutcome::SoftError(e),
        };

        let result = self.fetcher.get(url).await.map(|page| {
            let visited = std::iter::once(page.final_url.as_str())
                .chain(page.redirect_chain.iter().map(|s| s.as_str()));
            let mut ids = tag_id::scan_urls(visited);
            ids.extend(tag_id::scan_loader_references(&page.body));
            ids
        });
        TierOutcome::from_result(result)
    }

    /// Tier 2: browser capture on the blocking pool, holding a browser slot
    /// for the whole session.
    pub async fn tier_browser(&self, url: &str, settings: &CaptureSettings) -> TierOutcome {
        let slot = match self.governor.browser_slot().await {
            Ok(slot) => slot,
            Err(e) => return TierOutcome::SoftError(ProbeError::automation(url, e)),
        };

        let driver = self.browser.clone();
        let url_owned = url.to_string();
        let settings = settings.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            run_capture(driver.as_ref(), &url_owned, &settings)
        });

        match handle.await {
            Ok(result) => TierOutcome::from_result(result),
            Err(e) => TierOutcome::SoftError(ProbeError::automation(url, format!("browser task panicked: {}", e))),
        }
    }

    /// Tier 3: raw GET and pattern scan of the body text
    pub async fn tier_raw_html(&self, url: &str) -> TierOutcome {
        let _slot = match self.host_slot(url).await {
            Ok(slot) => slot,
            Err(e) => return TierOutcome::SoftError(e),
        };

        let result = self
            .fetcher
            .get_raw(url)
            .await
            .map(|body| tag_id::scan_loader_references(&body));
        TierOutcome::from_result(result)
    }

    /// Run the waterfall for one host, stopping at the first tier with a result
    pub async fn extract_host(&self, url: &str) -> HostExtraction {
        for tier in [Tier::Http, Tier::Browser, Tier::RawHtml] {
            let outcome = match tier {
                Tier::Http => self.tier_http(url).await,
                Tier::Browser => self.tier_browser(url, &self.tier2).await,
                Tier::RawHtml => self.tier_raw_html(url).await,
            };

            match outcome {
                TierOutcome::Found(tag_ids) => {
                    debug!("{} tier found {} container(s) on {}", tier, tag_ids.len(), url);
                    return HostExtraction {
                        url: url.to_string(),
                        tier: Some(tier),
                        tag_ids,
                    };
                }
                TierOutcome::NotFound => debug!("{} tier found nothing on {}", tier, url),
                TierOutcome::SoftError(e) => warn!("{} tier failed on {}: {}", tier, url, e),
            }
        }

        HostExtraction {
            url: url.to_string(),
            tier: None,
            tag_ids: BTreeSet::new(),
        }
    }

    /// Liveness filter, then the waterfall over every live host; the result is
    /// the union of all per-host identifiers.
    pub async fn extract_organization(&self, candidates: &[String]) -> OrgExtraction {
        let live_hosts = self.filter_live(candidates).await;
        if live_hosts.is_empty() {
            debug!("No live hosts among {} candidate(s)", candidates.len());
            return OrgExtraction::default();
        }

        let per_host = join_all(live_hosts.iter().map(|url| self.extract_host(url))).await;
        let tag_ids = per_host.iter().flat_map(|h| h.tag_ids.iter().cloned()).collect();

        OrgExtraction {
            live_hosts,
            per_host,
            tag_ids,
        }
    }

    /// Longer-patience browser capture used by the rescue pass
    pub async fn rescue(&self, url: &str) -> BTreeSet<TagId> {
        match self.tier_browser(url, &self.rescue).await {
            TierOutcome::SoftError(e) => {
                warn!("Rescue attempt failed on {}: {}", url, e);
                BTreeSet::new()
            }
            outcome => outcome.into_ids(),
        }
    }
}

/// Poll a browser session until an identifier shows up or the window closes.
///
/// Blocking; runs on the blocking pool. The session is dropped, and so torn
/// down, on every return path.
pub fn run_capture(
    driver: &dyn BrowserDriver,
    url: &str,
    settings: &CaptureSettings,
) -> Result<BTreeSet<TagId>, ProbeError> {
    let mut session = driver.open(url, settings)?;
    let deadline = Instant::now() + settings.poll_window;
    let mut found = BTreeSet::new();

    loop {
        let requests = session.drain_requests();
        found.extend(tag_id::scan_urls(requests.iter().map(|s| s.as_str())));

        match session.page_source() {
            Ok(html) => found.extend(tag_id::scan_loader_references(&html)),
            Err(e) => debug!("Could not read document for {}: {}", url, e),
        }

        let now = Instant::now();
        if !found.is_empty() || now >= deadline {
            break;
        }
        std::thread::sleep(settings.poll_interval.min(deadline - now));
    }

    Ok(found)
}
