use serde::Deserialize;

/// How a host is reduced to its registrable domain
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DomainRule {
    /// Keep the last two dot-separated labels (`foo.example.co.uk` -> `co.uk`)
    #[default]
    LastTwoLabels,
    /// Keep three labels when the last two form a known compound suffix
    CompoundSuffix,
}

/// Two-label public suffixes honoured by `DomainRule::CompoundSuffix`
const COMPOUND_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "co.au", "com.au", "net.au", "org.au",
    "co.nz", "co.jp", "co.kr", "com.br", "com.mx", "com.cn", "co.za", "co.in",
];

/// Normalize a website string to its registrable domain.
///
/// Missing schemes are treated as `http://`, ports are dropped and any number
/// of leading `www.` labels are removed. Never fails: malformed input yields a
/// degenerate (possibly empty) string.
pub fn extract_registrable_domain(website: &str) -> String {
    extract_registrable_domain_with(website, DomainRule::LastTwoLabels)
}

pub fn extract_registrable_domain_with(website: &str, rule: DomainRule) -> String {
    let mut host = host_of(website).to_lowercase();

    while let Some(rest) = host.strip_prefix("www.") {
        host = rest.to_string();
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() < 2 {
        return host;
    }

    let last_two = parts[parts.len() - 2..].join(".");
    match rule {
        DomainRule::LastTwoLabels => last_two,
        DomainRule::CompoundSuffix => {
            if COMPOUND_SUFFIXES.contains(&last_two.as_str()) && parts.len() >= 3 {
                parts[parts.len() - 3..].join(".")
            } else {
                last_two
            }
        }
    }
}

/// Extract the bare host from a URL-ish string: scheme, userinfo, path,
/// query, fragment and port are all stripped. Case is preserved.
pub fn host_of(input: &str) -> &str {
    let trimmed = input.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };

    let authority_end = without_scheme
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(without_scheme.len());
    let authority = &without_scheme[..authority_end];

    let host_port = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };

    host_port.split(':').next().unwrap_or("")
}

/// Normalize a subdomain entry (bare host or URL) to `https://<host>`.
/// Returns `None` for entries without a host.
pub fn to_https_url(entry: &str) -> Option<String> {
    let host = host_of(entry);
    if host.is_empty() {
        None
    } else {
        Some(format!("https://{}", host.to_lowercase()))
    }
}

/// URL used to reach an organization's own website
pub fn website_url(website: &str) -> String {
    let trimmed = website.trim();
    if trimmed.to_lowercase().starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Host used as the per-destination concurrency key for a URL
pub fn connection_key(url: &str) -> String {
    host_of(url).to_lowercase()
}
