//! Subdomain discovery using Project Discovery's subfinder tool.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain_utils;
use crate::error::ProbeError;

const TOOL_NAME: &str = "subfinder";

/// Anything that can list candidate hosts for a registrable domain.
#[async_trait]
pub trait SubdomainSource: Send + Sync {
    /// Raw candidate hosts, one entry per output line
    async fn discover(&self, domain: &str) -> Result<Vec<String>, ProbeError>;
}

pub struct SubfinderDiscovery {
    binary_path: PathBuf,
    timeout: Duration,
}

impl SubfinderDiscovery {
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self { binary_path, timeout }
    }

    pub fn is_available(&self) -> bool {
        self.binary_path.exists() || which::which(&self.binary_path).is_ok()
    }

    /// Get installation instructions for subfinder
    pub fn get_installation_instructions() -> String {
        let mut instructions = String::new();
        instructions.push_str("subfinder was not found; subdomain enumeration will be skipped.\n");
        instructions.push_str("Install it with Go:\n");
        instructions.push_str("   go install -v github.com/projectdiscovery/subfinder/v2/cmd/subfinder@latest\n");
        match std::env::consts::OS {
            "macos" => instructions.push_str("or with Homebrew:\n   brew install subfinder\n"),
            "windows" => instructions.push_str("or with Scoop:\n   scoop install subfinder\n"),
            _ => instructions.push_str("or download a release from https://github.com/projectdiscovery/subfinder/releases/latest\n"),
        }
        instructions.push_str("then put it on PATH or pass --subfinder-path <path>\n");
        instructions
    }

    fn tool_error(&self, domain: &str, reason: impl Into<String>) -> ProbeError {
        ProbeError::ToolInvocation {
            tool: TOOL_NAME.to_string(),
            domain: domain.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SubdomainSource for SubfinderDiscovery {
    async fn discover(&self, domain: &str) -> Result<Vec<String>, ProbeError> {
        if !self.is_available() {
            return Err(self.tool_error(domain, format!("binary not found at {:?}", self.binary_path)));
        }

        debug!("Running subfinder for domain: {}", domain);

        let child = Command::new(&self.binary_path)
            .args(["-d", domain, "-silent"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.tool_error(domain, format!("failed to spawn: {}", e)))?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.tool_error(domain, format!("failed to collect output: {}", e))),
            Err(_) => return Err(self.tool_error(domain, format!("timed out after {:?}", self.timeout))),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.tool_error(
                domain,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let results = parse_subfinder_output(&String::from_utf8_lossy(&output.stdout));
        debug!("Subfinder found {} hosts for {}", results.len(), domain);
        Ok(results)
    }
}

/// Parse `-silent` output: one host per non-empty line
pub fn parse_subfinder_output(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// Drop noise from raw enumeration output and normalize survivors to
/// `https://<host>`.
///
/// Removed: the bare domain and its `www.` form, hosts outside the domain, and
/// hosts starting with any operational prefix.
pub fn filter_subdomains(raw: &[String], domain: &str, exclude_prefixes: &[String]) -> BTreeSet<String> {
    let domain = domain.to_lowercase();
    let www_domain = format!("www.{}", domain);
    let suffix = format!(".{}", domain);

    raw.iter()
        .map(|entry| domain_utils::host_of(entry).to_lowercase())
        .filter(|host| !host.is_empty())
        .filter(|host| *host != domain && *host != www_domain)
        .filter(|host| host.ends_with(&suffix))
        .filter(|host| !exclude_prefixes.iter().any(|p| host.starts_with(p.as_str())))
        .map(|host| format!("https://{}", host))
        .collect()
}

/// Enumerate and filter subdomains for one domain. Tool failures are logged
/// and yield an empty set.
pub async fn enumerate_subdomains(
    source: &dyn SubdomainSource,
    domain: &str,
    exclude_prefixes: &[String],
) -> BTreeSet<String> {
    match source.discover(domain).await {
        Ok(raw) => filter_subdomains(&raw, domain, exclude_prefixes),
        Err(e) => {
            warn!("Subdomain enumeration failed for {}: {}", domain, e);
            BTreeSet::new()
        }
    }
}
