//! Container identifiers and the loader URL shapes that carry them.
//!
//! Two loader shapes are recognised: the script loader (`gtm.js?id=GTM-XXXX`)
//! and the no-script iframe loader (`ns.html?id=GTM-XXXX`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use url::Url;

static TAG_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^GTM-[A-Z0-9-]{4,}$").unwrap()
});
static SCRIPT_LOADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)gtm\.js\?id=(GTM-[A-Z0-9-]{4,})").unwrap()
});
static NOSCRIPT_LOADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ns\.html\?id=(GTM-[A-Z0-9-]{4,})").unwrap()
});

/// A container identifier, compared by exact string after trimming.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagId(String);

impl TagId {
    /// Validate a candidate identifier. Only surrounding whitespace is removed.
    pub fn parse(candidate: &str) -> Option<Self> {
        let trimmed = candidate.trim();
        if TAG_ID_RE.is_match(trimmed) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TagId> for String {
    fn from(id: TagId) -> Self {
        id.0
    }
}

/// Scan arbitrary text (HTML, rendered DOM) for either loader shape.
pub fn scan_loader_references(text: &str) -> BTreeSet<TagId> {
    let mut found = BTreeSet::new();
    for regex in [&*SCRIPT_LOADER_RE, &*NOSCRIPT_LOADER_RE] {
        for cap in regex.captures_iter(text) {
            if let Some(id) = cap.get(1).and_then(|m| TagId::parse(m.as_str())) {
                found.insert(id);
            }
        }
    }
    found
}

/// Inspect a single URL (final URL, redirect hop, captured request) for a
/// loader path carrying an `id` query parameter.
///
/// Unparseable URLs are skipped rather than reported.
pub fn scan_loader_url(raw: &str) -> Option<TagId> {
    let parsed = Url::parse(raw).ok()?;
    let path = parsed.path().to_ascii_lowercase();
    if !(path.ends_with("/gtm.js") || path.ends_with("/ns.html")) {
        return None;
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .and_then(|(_, value)| TagId::parse(&value))
}

/// Scan a batch of URLs, accepting either a structured loader URL or an
/// inline loader reference embedded anywhere in the URL text.
pub fn scan_urls<'a>(urls: impl IntoIterator<Item = &'a str>) -> BTreeSet<TagId> {
    let mut found = BTreeSet::new();
    for url in urls {
        if let Some(id) = scan_loader_url(url) {
            found.insert(id);
        } else {
            found.extend(scan_loader_references(url));
        }
    }
    found
}
