//! Configuration management for gtmfinder
//!
//! Configuration is loaded from `./config/gtmfinder.toml` (or the path given
//! with `--config`). When no file exists the embedded copy of the same file is
//! used, so every default lives in the config template and nowhere else.

use serde::Deserialize;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain_utils::DomainRule;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/gtmfinder.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/gtmfinder.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' must be greater than zero")]
    ZeroValue { field: String },

    #[error("Configuration field '{field}' must be at least '{minimum_field}'")]
    BelowMinimum { field: String, minimum_field: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    pub browser: BrowserConfig,
    #[serde(default)]
    pub rescue: RescueConfig,
    pub roster: RosterConfig,
}

/// HTTP client configuration shared by the liveness probe and Tiers 1 and 3
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
    pub liveness_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
    pub max_redirects: usize,
}

/// Independent parallelism caps, one per cost tier
#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfig {
    pub organizations: usize,
    pub per_host_connections: usize,
    pub browser_sessions: usize,
    pub enumeration_workers: usize,
}

/// Subdomain enumeration via subfinder
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_subdomain_enabled")]
    pub subdomain_enabled: bool,
    #[serde(default = "default_subfinder_path")]
    pub subfinder_path: String,
    #[serde(default = "default_subfinder_timeout_secs")]
    pub subfinder_timeout_secs: u64,
    #[serde(default)]
    pub domain_rule: DomainRule,
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,
}

fn default_subdomain_enabled() -> bool {
    true
}

fn default_subfinder_path() -> String {
    "subfinder".to_string()
}

fn default_subfinder_timeout_secs() -> u64 {
    120
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            subdomain_enabled: default_subdomain_enabled(),
            subfinder_path: default_subfinder_path(),
            subfinder_timeout_secs: default_subfinder_timeout_secs(),
            domain_rule: DomainRule::default(),
            exclude_prefixes: Vec::new(),
        }
    }
}

/// Tier 2 headless browser capture settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub page_load_timeout_secs: u64,
    pub poll_window_secs: u64,
    pub poll_interval_ms: u64,
}

/// Final serial retry over rows that are still empty
#[derive(Debug, Clone, Deserialize)]
pub struct RescueConfig {
    #[serde(default = "default_rescue_enabled")]
    pub enabled: bool,
    #[serde(default = "default_rescue_headless")]
    pub headless: bool,
    #[serde(default = "default_rescue_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,
    #[serde(default = "default_rescue_poll_window_secs")]
    pub poll_window_secs: u64,
    #[serde(default = "default_rescue_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_rescue_enabled() -> bool {
    true
}

fn default_rescue_headless() -> bool {
    true
}

fn default_rescue_page_load_timeout_secs() -> u64 {
    90
}

fn default_rescue_poll_window_secs() -> u64 {
    20
}

fn default_rescue_poll_interval_ms() -> u64 {
    1000
}

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            enabled: default_rescue_enabled(),
            headless: default_rescue_headless(),
            page_load_timeout_secs: default_rescue_page_load_timeout_secs(),
            poll_window_secs: default_rescue_poll_window_secs(),
            poll_interval_ms: default_rescue_poll_interval_ms(),
        }
    }
}

/// Column names and sentinels of the input roster
#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    pub organization_column: String,
    pub website_column: String,
    pub tag_column: String,
    pub subdomain_column: String,
    pub no_website_sentinel: String,
    pub no_tag_sentinel: String,
    #[serde(default)]
    pub recheck_no_tag: bool,
}

impl HttpConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from the default path, falling back to the embedded defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::load_from_path(Path::new(CONFIG_PATH)) {
            Err(ConfigError::FileNotFound(_)) => Self::embedded(),
            other => other,
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse the configuration compiled into the binary
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("http.user_agent", &self.http.user_agent)?;
        require_positive("http.fetch_timeout_secs", self.http.fetch_timeout_secs)?;
        require_positive("http.liveness_timeout_secs", self.http.liveness_timeout_secs)?;
        require_positive("http.fallback_timeout_secs", self.http.fallback_timeout_secs)?;

        require_positive("concurrency.organizations", self.concurrency.organizations as u64)?;
        require_positive("concurrency.per_host_connections", self.concurrency.per_host_connections as u64)?;
        require_positive("concurrency.browser_sessions", self.concurrency.browser_sessions as u64)?;
        require_positive("concurrency.enumeration_workers", self.concurrency.enumeration_workers as u64)?;

        if self.discovery.subdomain_enabled {
            require_non_empty("discovery.subfinder_path", &self.discovery.subfinder_path)?;
            require_positive("discovery.subfinder_timeout_secs", self.discovery.subfinder_timeout_secs)?;
        }

        require_positive("browser.page_load_timeout_secs", self.browser.page_load_timeout_secs)?;
        require_positive("browser.poll_interval_ms", self.browser.poll_interval_ms)?;
        if self.rescue.enabled {
            require_positive("rescue.page_load_timeout_secs", self.rescue.page_load_timeout_secs)?;
            require_positive("rescue.poll_interval_ms", self.rescue.poll_interval_ms)?;
            require_at_least(
                "rescue.page_load_timeout_secs",
                self.rescue.page_load_timeout_secs,
                "browser.page_load_timeout_secs",
                self.browser.page_load_timeout_secs,
            )?;
            require_at_least(
                "rescue.poll_window_secs",
                self.rescue.poll_window_secs,
                "browser.poll_window_secs",
                self.browser.poll_window_secs,
            )?;
        }

        require_non_empty("roster.website_column", &self.roster.website_column)?;
        require_non_empty("roster.tag_column", &self.roster.tag_column)?;
        require_non_empty("roster.subdomain_column", &self.roster.subdomain_column)?;
        require_non_empty("roster.no_website_sentinel", &self.roster.no_website_sentinel)?;
        require_non_empty("roster.no_tag_sentinel", &self.roster.no_tag_sentinel)?;

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        Self::write_default_config(Path::new(CONFIG_PATH))
    }

    pub fn write_default_config(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyRequired {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroValue {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn require_at_least(field: &str, value: u64, minimum_field: &str, minimum: u64) -> Result<(), ConfigError> {
    if value < minimum {
        return Err(ConfigError::BelowMinimum {
            field: field.to_string(),
            minimum_field: minimum_field.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Result<AppConfig, _> = toml::from_str(DEFAULT_CONFIG);
        assert!(config.is_ok(), "Default config should parse: {:?}", config.err());
    }

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::embedded().expect("Default config should validate");
        assert_eq!(config.concurrency.organizations, 10);
        assert_eq!(config.concurrency.per_host_connections, 5);
        assert_eq!(config.concurrency.browser_sessions, 3);
        assert_eq!(config.concurrency.enumeration_workers, 10);
        assert_eq!(config.discovery.subfinder_timeout_secs, 120);
        assert_eq!(config.discovery.domain_rule, DomainRule::LastTwoLabels);
        assert!(config.discovery.exclude_prefixes.contains(&"mail.".to_string()));
        assert_eq!(config.roster.tag_column, "GTM  ID");
    }

    #[test]
    fn test_optional_sections_use_defaults() {
        let config_str = r#"
[http]
user_agent = "test/1.0"
fetch_timeout_secs = 20
liveness_timeout_secs = 5
fallback_timeout_secs = 10
max_redirects = 10

[concurrency]
organizations = 4
per_host_connections = 2
browser_sessions = 1
enumeration_workers = 2

[browser]
headless = true
page_load_timeout_secs = 30
poll_window_secs = 5
poll_interval_ms = 500

[roster]
organization_column = "Organization Name"
website_column = "Website"
tag_column = "GTM ID"
subdomain_column = "Subdomains"
no_website_sentinel = "N/A"
no_tag_sentinel = "No Tag"
"#;

        let config = AppConfig::from_toml(config_str).expect("Config should parse without optional sections");

        assert!(config.discovery.subdomain_enabled);
        assert_eq!(config.discovery.subfinder_path, "subfinder");
        assert_eq!(config.discovery.subfinder_timeout_secs, 120);
        assert!(config.discovery.exclude_prefixes.is_empty());
        assert!(config.rescue.enabled);
        assert_eq!(config.rescue.page_load_timeout_secs, 90);
        assert_eq!(config.rescue.poll_window_secs, 20);
        assert!(!config.roster.recheck_no_tag);
    }

    #[test]
    fn test_rescue_is_more_patient_than_browser_tier() {
        let config = AppConfig::embedded().unwrap();
        assert!(config.rescue.page_load_timeout_secs > config.browser.page_load_timeout_secs);
        assert!(config.rescue.poll_window_secs > config.browser.poll_window_secs);
    }

    #[test]
    fn test_rescue_shorter_than_browser_tier_rejected() {
        let content = DEFAULT_CONFIG.replace("page_load_timeout_secs = 90", "page_load_timeout_secs = 30");
        match AppConfig::from_toml(&content) {
            Err(ConfigError::BelowMinimum { field, .. }) => assert_eq!(field, "rescue.page_load_timeout_secs"),
            other => panic!("expected BelowMinimum error, got {:?}", other),
        }

        let disabled = content.replace("enabled = true\nheadless", "enabled = false\nheadless");
        assert!(AppConfig::from_toml(&disabled).is_ok());
    }

    #[test]
    fn test_zero_browser_cap_rejected() {
        let content = DEFAULT_CONFIG.replace("browser_sessions = 3", "browser_sessions = 0");
        match AppConfig::from_toml(&content) {
            Err(ConfigError::ZeroValue { field }) => assert_eq!(field, "concurrency.browser_sessions"),
            other => panic!("expected ZeroValue error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let content = DEFAULT_CONFIG.replace(
            "user_agent = \"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36\"",
            "user_agent = \"\"",
        );
        assert!(matches!(
            AppConfig::from_toml(&content),
            Err(ConfigError::EmptyRequired { .. })
        ));
    }

    #[test]
    fn test_missing_file_reported() {
        let result = AppConfig::load_from_path(Path::new("/nonexistent/gtmfinder.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_write_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("gtmfinder.toml");
        AppConfig::write_default_config(&path).unwrap();
        let loaded = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.http.max_redirects, 10);
    }
}
