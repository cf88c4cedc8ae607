pub mod browser_pool;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod domain_utils;
pub mod error;
pub mod extraction;
pub mod governor;
pub mod logger;
pub mod merge;
pub mod orchestrator;
pub mod record;
pub mod roster;
pub mod tag_id;

pub use error::ProbeError;
pub use orchestrator::{Orchestrator, RunSettings, RunSummary};
pub use record::OrganizationRecord;
pub use tag_id::TagId;
