//! Chrome process launching for browser capture sessions.
//!
//! How many sessions may be alive at once is decided by the
//! [`ConcurrencyGovernor`](crate::governor::ConcurrencyGovernor); this module
//! only knows how to start one Chrome process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const FIRST_DEBUG_PORT: u16 = 9222;
const LAST_DEBUG_PORT: u16 = 9322;

/// Assign a unique debug port per browser instance to avoid port conflicts.
static LAUNCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Rotates through the debug port range; a single atomic increment keeps
/// concurrent callers inside it.
fn next_debug_port() -> u16 {
    let span = usize::from(LAST_DEBUG_PORT - FIRST_DEBUG_PORT) + 1;
    let offset = LAUNCH_COUNTER.fetch_add(1, Ordering::Relaxed) % span;
    // offset < span <= u16::MAX
    FIRST_DEBUG_PORT + offset as u16
}

fn is_container() -> bool {
    std::env::var("GTMFINDER_CONTAINER").is_ok() || Path::new("/.dockerenv").exists()
}

/// Chrome binary from `CHROME_PATH`, then well-known locations. `None` lets
/// headless_chrome search on its own.
fn chrome_path() -> Option<PathBuf> {
    std::env::var("CHROME_PATH").ok().map(PathBuf::from).or_else(|| {
        // WSL: Windows Chrome installation
        let wsl_path = Path::new("/mnt/c/Program Files/Google/Chrome/Application/chrome.exe");
        if wsl_path.exists() {
            Some(wsl_path.to_path_buf())
        } else {
            None
        }
    })
}

/// Launch one Chrome process.
///
/// The sandbox is disabled automatically inside containers. `idle_timeout`
/// bounds how long the DevTools connection may sit without traffic.
pub fn launch(headless: bool, idle_timeout: Duration) -> anyhow::Result<headless_chrome::Browser> {
    let options = headless_chrome::LaunchOptions::default_builder()
        .headless(headless)
        .sandbox(!is_container())
        .path(chrome_path())
        .port(Some(next_debug_port()))
        .window_size(Some((1920, 1080)))
        .idle_browser_timeout(idle_timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build Chrome launch options: {}", e))?;

    headless_chrome::Browser::new(options).map_err(|e| anyhow::anyhow!("Failed to launch Chrome: {}", e))
}
