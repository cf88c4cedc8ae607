//! Concurrency limits shared by every task in a run.
//!
//! Four independent caps: organizations processed at once, connections per
//! host, live browser sessions, and enumeration workers. All permits are RAII
//! guards, so a cap is released on every exit path including errors and
//! cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{AcquireError, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::config::ConcurrencyConfig;

/// Tracks how many holders are active and the highest count ever observed
#[derive(Debug, Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A held permit that also keeps its gauge current.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    gauge: Arc<Gauge>,
}

impl Slot {
    fn new(permit: OwnedSemaphorePermit, gauge: Arc<Gauge>) -> Self {
        gauge.enter();
        Self { _permit: permit, gauge }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.gauge.leave();
    }
}

/// One bounded pool with usage tracking
#[derive(Debug, Clone)]
struct Pool {
    semaphore: Arc<Semaphore>,
    gauge: Arc<Gauge>,
    capacity: usize,
}

impl Pool {
    fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            gauge: Arc::new(Gauge::default()),
            capacity,
        }
    }

    async fn acquire(&self) -> Result<Slot, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(Slot::new(permit, self.gauge.clone()))
    }

    fn active(&self) -> usize {
        self.gauge.active.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }
}

/// Per-host connection pools, created lazily on first use
#[derive(Debug, Clone)]
pub struct HostLimiter {
    pools: Arc<Mutex<HashMap<String, Pool>>>,
    per_host: usize,
}

impl HostLimiter {
    pub fn new(per_host: usize) -> Self {
        Self {
            pools: Arc::new(Mutex::new(HashMap::new())),
            per_host,
        }
    }

    /// Acquire a connection slot for `host`
    pub async fn acquire(&self, host: &str) -> Result<Slot, AcquireError> {
        let pool = {
            let mut pools = self.pools.lock().await;
            pools
                .entry(host.to_string())
                .or_insert_with(|| Pool::new(self.per_host))
                .clone()
        };

        pool.acquire().await
    }

    /// Highest number of simultaneous connections seen for `host`
    pub async fn peak(&self, host: &str) -> usize {
        let pools = self.pools.lock().await;
        pools.get(host).map(|p| p.peak()).unwrap_or(0)
    }
}

/// Shared concurrency caps for a run
#[derive(Debug, Clone)]
pub struct ConcurrencyGovernor {
    organizations: Pool,
    enumeration: Pool,
    browser: Pool,
    hosts: HostLimiter,
}

impl ConcurrencyGovernor {
    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self {
            organizations: Pool::new(config.organizations),
            enumeration: Pool::new(config.enumeration_workers),
            browser: Pool::new(config.browser_sessions),
            hosts: HostLimiter::new(config.per_host_connections),
        }
    }

    pub async fn organization_slot(&self) -> Result<Slot, AcquireError> {
        self.organizations.acquire().await
    }

    pub async fn enumeration_slot(&self) -> Result<Slot, AcquireError> {
        self.enumeration.acquire().await
    }

    /// Held for the whole lifetime of one browser session
    pub async fn browser_slot(&self) -> Result<Slot, AcquireError> {
        let slot = self.browser.acquire().await?;
        debug!(
            "Browser slot acquired ({}/{} in use)",
            self.browser.active(),
            self.browser.capacity
        );
        Ok(slot)
    }

    pub async fn host_slot(&self, host: &str) -> Result<Slot, AcquireError> {
        self.hosts.acquire(host).await
    }

    pub fn browser_active(&self) -> usize {
        self.browser.active()
    }

    pub fn browser_peak(&self) -> usize {
        self.browser.peak()
    }

    pub fn organizations_peak(&self) -> usize {
        self.organizations.peak()
    }

    pub fn enumeration_peak(&self) -> usize {
        self.enumeration.peak()
    }

    pub async fn host_peak(&self, host: &str) -> usize {
        self.hosts.peak(host).await
    }

    /// Log configured caps
    pub fn log_config(&self) {
        debug!(
            "Concurrency: organizations={}, per-host={}, browser sessions={}, enumeration workers={}",
            self.organizations.capacity,
            self.hosts.per_host,
            self.browser.capacity,
            self.enumeration.capacity
        );
    }
}
