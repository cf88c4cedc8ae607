//! headless_chrome-backed browser driver for Tier 2 and the rescue pass.

use headless_chrome::{Browser, Tab};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::{BrowserDriver, BrowserSession, CaptureSettings};
use crate::browser_pool;
use crate::error::ProbeError;

const HANDLER_NAME: &str = "gtm_capture";

/// Launches a fresh Chrome process per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeDriver;

impl BrowserDriver for ChromeDriver {
    fn open(&self, url: &str, settings: &CaptureSettings) -> Result<Box<dyn BrowserSession>, ProbeError> {
        // Idle allowance must outlive page load plus the poll window or Chrome
        // drops the connection mid-capture.
        let idle_timeout = settings.page_load_timeout + settings.poll_window + Duration::from_secs(30);
        let browser = browser_pool::launch(settings.headless, idle_timeout).map_err(|e| ProbeError::automation(url, e))?;

        let tab = browser
            .new_tab()
            .map_err(|e| ProbeError::automation(url, format!("failed to create tab: {}", e)))?;
        tab.set_default_timeout(settings.page_load_timeout);

        let captured = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = captured.clone();
        tab.register_response_handling(
            HANDLER_NAME,
            Box::new(move |event_params, _fetch_body| {
                if let Ok(mut urls) = sink.lock() {
                    urls.push(event_params.response.url.clone());
                }
            }),
        )
        .map_err(|e| ProbeError::automation(url, format!("failed to register response handler: {}", e)))?;

        tab.navigate_to(url)
            .map_err(|e| ProbeError::automation(url, format!("navigation failed: {}", e)))?;

        if let Err(e) = tab.wait_until_navigated() {
            warn!("Page load for {} did not finish in {:?}, continuing: {}", url, settings.page_load_timeout, e);
        }

        Ok(Box::new(ChromeSession {
            _browser: browser,
            tab,
            captured,
            url: url.to_string(),
        }))
    }
}

/// One Chrome process with a single capturing tab
pub struct ChromeSession {
    // Held so the Chrome process lives as long as the tab
    _browser: Browser,
    tab: Arc<Tab>,
    captured: Arc<Mutex<Vec<String>>>,
    url: String,
}

impl BrowserSession for ChromeSession {
    fn drain_requests(&mut self) -> Vec<String> {
        match self.captured.lock() {
            Ok(mut urls) => std::mem::take(&mut *urls),
            Err(_) => Vec::new(),
        }
    }

    fn page_source(&mut self) -> Result<String, ProbeError> {
        self.tab
            .get_content()
            .map_err(|e| ProbeError::automation(&self.url, format!("failed to read document: {}", e)))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let _ = self.tab.deregister_response_handling(HANDLER_NAME);
        if let Err(e) = self.tab.close(false) {
            debug!("Closing tab for {} failed: {}", self.url, e);
        }
    }
}
