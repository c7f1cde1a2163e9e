use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain is empty")]
    Empty,

    #[error("invalid domain: {domain}")]
    Invalid { domain: String },
}

/// A parsed target site.
///
/// `root` is `scheme://host[:port]`, `base` is the root followed by any base
/// path the caller supplied, never ending in `/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryTarget {
    pub domain: String,
    pub root: String,
    pub base: String,
}

impl DiscoveryTarget {
    pub fn parse(domain: &str) -> Result<Self, DomainError> {
        let trimmed = domain.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Empty);
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        let invalid = || DomainError::Invalid {
            domain: trimmed.to_string(),
        };
        let url = Url::parse(&with_scheme).map_err(|_| invalid())?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid());
        }
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;

        let root = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        let path = url.path().trim_end_matches('/');
        let base = format!("{root}{path}");

        Ok(Self {
            domain: trimmed.to_string(),
            root,
            base,
        })
    }

    pub fn join(&self, suffix: &str) -> String {
        if suffix.starts_with('/') {
            format!("{}{}", self.base, suffix)
        } else {
            format!("{}/{}", self.base, suffix)
        }
    }
}

/// Canonical form used for candidate deduplication: fragment dropped, a run
/// of trailing slashes collapsed to one.
pub fn normalize_candidate_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.host_str()?;
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.ends_with("//") {
        let collapsed = format!("{}/", path.trim_end_matches('/'));
        url.set_path(&collapsed);
    }
    Some(url.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Absolute,
    RootRelative,
    Relative,
}

pub fn classify_entry(entry: &str) -> EntryKind {
    let lower = entry.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        EntryKind::Absolute
    } else if entry.starts_with('/') {
        EntryKind::RootRelative
    } else {
        EntryKind::Relative
    }
}

/// Splits the free-form comma separated override list into trimmed,
/// non-empty entries.
pub fn parse_manual_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub fn resolve_manual_entry(target: &DiscoveryTarget, entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }
    let joined = match classify_entry(entry) {
        EntryKind::Absolute => entry.to_string(),
        EntryKind::RootRelative => format!("{}{}", target.root, entry),
        EntryKind::Relative => format!("{}/{}", target.base, entry),
    };
    normalize_candidate_url(&joined)
}

/// Resolves an `href` found on the root page the way a browser would.
pub fn resolve_href(target: &DiscoveryTarget, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let base = Url::parse(&format!("{}/", target.base)).ok()?;
    let joined = base.join(href).ok()?;
    normalize_candidate_url(joined.as_str())
}
