//! Scripted stand-ins for the HTTP, browser and subfinder capabilities.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gtmfinder::discovery::SubdomainSource;
use gtmfinder::extraction::{BrowserDriver, BrowserSession, CaptureSettings, FetchedPage, PageFetcher};
use gtmfinder::ProbeError;

fn network_error(url: &str) -> ProbeError {
    ProbeError::Network {
        url: url.to_string(),
        reason: "connection refused".to_string(),
    }
}

/// Fetcher answering from fixed tables. Unknown URLs fail like dead hosts.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, FetchedPage>,
    raw: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    calls: Mutex<Vec<(&'static str, String)>>,
    /// Every call waits this long before answering
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host answers HEAD with 200
    pub fn live(mut self, url: &str) -> Self {
        self.statuses.insert(url.to_string(), 200);
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                final_url: url.to_string(),
                redirect_chain: Vec::new(),
                body: body.to_string(),
            },
        );
        self
    }

    pub fn redirected_page(mut self, url: &str, chain: &[&str], final_url: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                final_url: final_url.to_string(),
                redirect_chain: chain.iter().map(|s| s.to_string()).collect(),
                body: body.to_string(),
            },
        );
        self
    }

    pub fn raw(mut self, url: &str, body: &str) -> Self {
        self.raw.insert(url.to_string(), body.to_string());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn serve(&self, kind: &'static str, url: &str) {
        self.calls.lock().unwrap().push((kind, url.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Most calls observed in progress at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Calls of one kind ("get", "raw" or "head"), optionally for one URL
    pub fn count(&self, kind: &str, url: Option<&str>) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, u)| *k == kind && url.map_or(true, |wanted| u == wanted))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage, ProbeError> {
        self.serve("get", url).await;
        self.pages.get(url).cloned().ok_or_else(|| network_error(url))
    }

    async fn get_raw(&self, url: &str) -> Result<String, ProbeError> {
        self.serve("raw", url).await;
        self.raw.get(url).cloned().ok_or_else(|| network_error(url))
    }

    async fn head_status(&self, url: &str) -> Result<u16, ProbeError> {
        self.serve("head", url).await;
        self.statuses.get(url).copied().ok_or_else(|| network_error(url))
    }
}

#[derive(Default)]
struct SessionCounters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    opened_urls: Mutex<Vec<String>>,
}

/// Browser whose sessions reveal preset traffic and DOM per URL.
#[derive(Default)]
pub struct ScriptedBrowser {
    traffic: HashMap<String, Vec<String>>,
    dom: HashMap<String, String>,
    /// Any URL not listed in `traffic` or `dom` gets this traffic instead
    fallback_traffic: Vec<String>,
    failing: Vec<String>,
    hold: Duration,
    counters: Arc<SessionCounters>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traffic(mut self, url: &str, requests: &[&str]) -> Self {
        self.traffic.insert(url.to_string(), requests.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn dom(mut self, url: &str, html: &str) -> Self {
        self.dom.insert(url.to_string(), html.to_string());
        self
    }

    pub fn fallback_traffic(mut self, requests: &[&str]) -> Self {
        self.fallback_traffic = requests.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Opening a session for `url` fails like a crashed browser
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    /// Keep each session busy this long when it opens
    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.counters.opened_urls.lock().unwrap().clone()
    }
}

impl BrowserDriver for ScriptedBrowser {
    fn open(&self, url: &str, _settings: &CaptureSettings) -> Result<Box<dyn BrowserSession>, ProbeError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.opened_urls.lock().unwrap().push(url.to_string());

        if self.failing.iter().any(|f| f == url) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            return Err(ProbeError::automation(url, "browser crashed"));
        }

        let now = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);

        if !self.hold.is_zero() {
            std::thread::sleep(self.hold);
        }

        let traffic = match (self.traffic.get(url), self.dom.contains_key(url)) {
            (Some(requests), _) => requests.clone(),
            (None, true) => Vec::new(),
            (None, false) => self.fallback_traffic.clone(),
        };

        Ok(Box::new(ScriptedSession {
            traffic,
            dom: self.dom.get(url).cloned().unwrap_or_default(),
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedSession {
    traffic: Vec<String>,
    dom: String,
    counters: Arc<SessionCounters>,
}

impl BrowserSession for ScriptedSession {
    fn drain_requests(&mut self) -> Vec<String> {
        std::mem::take(&mut self.traffic)
    }

    fn page_source(&mut self) -> Result<String, ProbeError> {
        Ok(self.dom.clone())
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Enumeration source with canned output per domain
#[derive(Default)]
pub struct MockSource {
    results: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hosts(mut self, domain: &str, hosts: &[&str]) -> Self {
        self.results.insert(domain.to_string(), hosts.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn failing(mut self, domain: &str) -> Self {
        self.failing.push(domain.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubdomainSource for MockSource {
    async fn discover(&self, domain: &str) -> Result<Vec<String>, ProbeError> {
        self.calls.lock().unwrap().push(domain.to_string());
        if self.failing.iter().any(|d| d == domain) {
            return Err(ProbeError::ToolInvocation {
                tool: "subfinder".to_string(),
                domain: domain.to_string(),
                reason: "exit status 2".to_string(),
            });
        }
        Ok(self.results.get(domain).cloned().unwrap_or_default())
    }
}
