use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gtmfinder")]
#[command(about = "Discover Google Tag Manager container IDs for a roster of organizations")]
#[command(version)]
pub struct Cli {
    /// Create default configuration file at ./config/gtmfinder.toml
    #[arg(long)]
    pub init: bool,

    /// Roster CSV with organization, website, tag ID and subdomain columns
    #[arg(short, long, value_name = "CSV", required_unless_present = "init")]
    pub input: Option<PathBuf>,

    /// Output CSV (defaults to <input>_updated.csv next to the input)
    #[arg(short, long, value_name = "CSV")]
    pub output: Option<PathBuf>,

    /// Configuration file (defaults to ./config/gtmfinder.toml, then built-in defaults)
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Verbose logging (use -v for INFO, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Skip the final rescue pass over organizations still missing a tag ID
    #[arg(long)]
    pub no_rescue: bool,

    /// Probe only the base domain; do not run subdomain enumeration
    #[arg(long)]
    pub no_subdomains: bool,

    /// Path to the subfinder binary (overrides config)
    #[arg(long, value_name = "PATH")]
    pub subfinder_path: Option<String>,

    /// Organizations processed concurrently (overrides config)
    #[arg(long, value_name = "N")]
    pub org_concurrency: Option<usize>,

    /// Maximum simultaneous browser sessions (overrides config)
    #[arg(long, value_name = "N")]
    pub browser_sessions: Option<usize>,

    /// Also write the run summary as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,
}
