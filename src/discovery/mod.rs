//! Subdomain enumeration feeding the candidate host list of each organization.

pub mod subfinder;

pub use subfinder::{enumerate_subdomains, filter_subdomains, SubdomainSource, SubfinderDiscovery};
