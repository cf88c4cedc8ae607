//! reqwest-backed page fetcher for the liveness probe and Tiers 1 and 3.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{FetchedPage, PageFetcher};
use crate::config::HttpConfig;
use crate::error::ProbeError;

pub struct HttpFetcher {
    /// Redirects followed by hand so every hop is recorded
    page_client: Client,
    raw_client: Client,
    probe_client: Client,
    max_redirects: usize,
    fetch_timeout: Duration,
    fallback_timeout: Duration,
    liveness_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let page_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.fetch_timeout())
            .redirect(Policy::none())
            .build()?;

        let raw_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.fallback_timeout())
            .redirect(Policy::limited(config.max_redirects))
            .build()?;

        let probe_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.liveness_timeout())
            .redirect(Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            page_client,
            raw_client,
            probe_client,
            max_redirects: config.max_redirects,
            fetch_timeout: config.fetch_timeout(),
            fallback_timeout: config.fallback_timeout(),
            liveness_timeout: config.liveness_timeout(),
        })
    }

    async fn follow_redirects(&self, url: &str) -> Result<FetchedPage, ProbeError> {
        let mut current = Url::parse(url).map_err(|e| ProbeError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut redirect_chain = Vec::new();

        for _ in 0..=self.max_redirects {
            let response = self
                .page_client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| ProbeError::from_reqwest(current.as_str(), e, self.fetch_timeout))?;

            if response.status().is_redirection() {
                if let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                    let next = current.join(location).map_err(|e| ProbeError::Malformed {
                        url: current.to_string(),
                        reason: format!("bad redirect target '{}': {}", location, e),
                    })?;
                    debug!("{} redirected to {}", current, next);
                    redirect_chain.push(current.to_string());
                    current = next;
                    continue;
                }
            }

            let final_url = response.url().to_string();
            let body = response
                .text()
                .await
                .map_err(|e| ProbeError::from_reqwest(&final_url, e, self.fetch_timeout))?;

            return Ok(FetchedPage {
                final_url,
                redirect_chain,
                body,
            });
        }

        Err(ProbeError::Network {
            url: url.to_string(),
            reason: format!("more than {} redirects", self.max_redirects),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// `fetch_timeout` bounds the whole attempt, every hop and the body read included
    async fn get(&self, url: &str) -> Result<FetchedPage, ProbeError> {
        tokio::time::timeout(self.fetch_timeout, self.follow_redirects(url))
            .await
            .map_err(|_| ProbeError::Timeout {
                url: url.to_string(),
                timeout: self.fetch_timeout,
            })?
    }

    async fn get_raw(&self, url: &str) -> Result<String, ProbeError> {
        let response = self
            .raw_client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(url, e, self.fallback_timeout))?;

        response
            .text()
            .await
            .map_err(|e| ProbeError::from_reqwest(url, e, self.fallback_timeout))
    }

    async fn head_status(&self, url: &str) -> Result<u16, ProbeError> {
        let response = self
            .probe_client
            .head(url)
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(url, e, self.liveness_timeout))?;

        Ok(response.status().as_u16())
    }
}
