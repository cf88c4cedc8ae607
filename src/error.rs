//! Soft failures raised while probing a single host or domain.
//!
//! None of these abort a run: each is caught at the tier (or enumeration)
//! boundary and treated as "this attempt found nothing".

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("{tool} failed for {domain}: {reason}")]
    ToolInvocation {
        tool: String,
        domain: String,
        reason: String,
    },

    #[error("browser automation failed for {url}: {reason}")]
    Automation { url: String, reason: String },
}

impl ProbeError {
    /// Classify a reqwest error raised while talking to `url`.
    pub fn from_reqwest(url: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else if err.is_decode() || err.is_body() {
            ProbeError::Malformed {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            ProbeError::Network {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    pub fn automation(url: &str, reason: impl std::fmt::Display) -> Self {
        ProbeError::Automation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
