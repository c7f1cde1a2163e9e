pub mod resolve;

use std::time::Duration;

use regex::Regex;

use crate::model::{dedup_candidates, Candidate, Origin};
use crate::prober::{self, AcceptedStatus};
use crate::progress::{ProgressSender, StatusLog};
use crate::runner::CancelToken;

pub use resolve::{DiscoveryTarget, DomainError};

pub const SITEMAP_TIMEOUT: Duration = Duration::from_secs(10);
pub const CRAWL_TIMEOUT: Duration = Duration::from_secs(10);
pub const PATTERN_TIMEOUT: Duration = Duration::from_secs(3);

pub const COMMON_API_PATHS: &[&str] = &[
    "/api",
    "/api/v1",
    "/api/v2",
    "/api/health",
    "/api/status",
    "/api/users",
    "/api/ping",
    "/api/version",
    "/api/graphql",
    "/health",
    "/healthz",
    "/status",
    "/ping",
    "/version",
    "/users",
    "/v1",
    "/graphql",
];

/// Statuses that mark a guessed path as a real endpoint. A 401/403 still
/// proves the route exists.
pub const PATTERN_STATUSES: [u16; 3] = [200, 401, 403];

const API_MARKER: &str = "/api/";

/// The cascade order. Later strategies only run when every earlier one came
/// back empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Manual,
    Sitemap,
    Crawl,
    Pattern,
}

pub const CASCADE: [Strategy; 4] = [
    Strategy::Manual,
    Strategy::Sitemap,
    Strategy::Crawl,
    Strategy::Pattern,
];

impl Strategy {
    pub fn origin(&self) -> Origin {
        match self {
            Strategy::Manual => Origin::Manual,
            Strategy::Sitemap => Origin::Sitemap,
            Strategy::Crawl => Origin::Crawl,
            Strategy::Pattern => Origin::Pattern,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
    pub status_log: Vec<String>,
    pub cancelled: bool,
}

impl Discovery {
    pub fn origin(&self) -> Option<Origin> {
        self.candidates.first().map(|c| c.origin)
    }
}

/// Decodes the predefined XML entities and numeric character references.
/// Unknown or malformed references are left as they are.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let Ok(entity_re) = Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);") else {
        return raw.to_string();
    };
    entity_re
        .replace_all(raw, |cap: &regex::Captures| {
            let name = &cap[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => name[1..].parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

pub fn extract_sitemap_locs(xml: &str) -> Vec<String> {
    let Ok(loc_re) = Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>") else {
        return Vec::new();
    };
    loc_re
        .captures_iter(xml)
        .map(|cap| decode_entities(cap[1].trim()))
        .filter(|loc| !loc.is_empty())
        .collect()
}

pub fn extract_api_hrefs(html: &str) -> Vec<String> {
    let Ok(href_re) = Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)')"#) else {
        return Vec::new();
    };
    href_re
        .captures_iter(html)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|href| href.contains(API_MARKER))
        .collect()
}

async fn fetch_text(client: &reqwest::Client, url: &str, timeout: Duration) -> Option<String> {
    let resp = match client.get(url).timeout(timeout).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(url, error = %e, "discovery fetch failed");
            return None;
        }
    };
    if !resp.status().is_success() {
        tracing::debug!(url, status = resp.status().as_u16(), "discovery fetch rejected");
        return None;
    }
    match resp.text().await {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!(url, error = %e, "failed to read discovery response");
            None
        }
    }
}

fn from_manual(target: &DiscoveryTarget, manual: &[String]) -> Vec<String> {
    manual
        .iter()
        .filter_map(|entry| {
            let resolved = resolve::resolve_manual_entry(target, entry);
            if resolved.is_none() {
                tracing::warn!(entry = entry.as_str(), "skipping unresolvable manual endpoint");
            }
            resolved
        })
        .collect()
}

async fn from_sitemap(client: &reqwest::Client, target: &DiscoveryTarget) -> Vec<String> {
    let url = target.join("/sitemap.xml");
    let Some(xml) = fetch_text(client, &url, SITEMAP_TIMEOUT).await else {
        return Vec::new();
    };
    extract_sitemap_locs(&xml)
        .into_iter()
        .filter(|loc| loc.contains(API_MARKER))
        .filter_map(|loc| resolve::normalize_candidate_url(&loc))
        .collect()
}

async fn from_crawl(client: &reqwest::Client, target: &DiscoveryTarget) -> Vec<String> {
    let url = format!("{}/", target.base);
    let Some(html) = fetch_text(client, &url, CRAWL_TIMEOUT).await else {
        return Vec::new();
    };
    extract_api_hrefs(&html)
        .into_iter()
        .filter_map(|href| resolve::resolve_href(target, &href))
        .collect()
}

async fn from_patterns(
    client: &reqwest::Client,
    target: &DiscoveryTarget,
    cancel: &CancelToken,
    log: &mut StatusLog,
) -> Vec<String> {
    let accepted = AcceptedStatus::exactly(PATTERN_STATUSES);
    let total = COMMON_API_PATHS.len();
    let mut out = Vec::new();
    for (i, suffix) in COMMON_API_PATHS.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let url = target.join(suffix);
        log.push(format!("Trying common pattern {}/{}: {}", i + 1, total, suffix));
        match prober::head_status(client, &url, PATTERN_TIMEOUT).await {
            Some(status) if accepted.accepts(status) => {
                if let Some(url) = resolve::normalize_candidate_url(&url) {
                    out.push(url);
                }
            }
            Some(status) => tracing::debug!(url = url.as_str(), status, "pattern rejected"),
            None => {}
        }
    }
    out
}

fn stage_message(strategy: Strategy, target: &DiscoveryTarget) -> String {
    match strategy {
        Strategy::Manual => "Using manually specified endpoints".to_string(),
        Strategy::Sitemap => format!("Checking {}/sitemap.xml for API endpoints", target.base),
        Strategy::Crawl => format!("Crawling {}/ for API links", target.base),
        Strategy::Pattern => "Probing common API patterns".to_string(),
    }
}

/// Runs the discovery cascade for `target`.
///
/// A non-empty `manual` list short-circuits everything else and no request
/// is made, even when none of its entries resolve. Stage failures are
/// swallowed; when every stage comes back empty the final status message
/// says so. Cancelling `cancel` abandons the stage in flight and returns
/// no candidates.
pub async fn discover(
    client: &reqwest::Client,
    target: &DiscoveryTarget,
    manual: &[String],
    cancel: &CancelToken,
    progress: Option<ProgressSender>,
) -> Discovery {
    let mut log = StatusLog::new(progress);

    for strategy in CASCADE {
        if strategy == Strategy::Manual && manual.is_empty() {
            continue;
        }
        if cancel.is_cancelled() {
            return cancelled_discovery(log);
        }
        log.push(stage_message(strategy, target));
        let stage = async {
            match strategy {
                Strategy::Manual => from_manual(target, manual),
                Strategy::Sitemap => from_sitemap(client, target).await,
                Strategy::Crawl => from_crawl(client, target).await,
                Strategy::Pattern => from_patterns(client, target, cancel, &mut log).await,
            }
        };
        let urls = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            urls = stage => Some(urls),
        };
        let Some(urls) = urls else {
            return cancelled_discovery(log);
        };
        let candidates = dedup_candidates(urls, strategy.origin());
        if strategy == Strategy::Manual && candidates.is_empty() {
            log.push("None of the manual endpoints could be resolved");
            return Discovery {
                candidates,
                status_log: log.into_messages(),
                cancelled: false,
            };
        }
        if !candidates.is_empty() {
            log.push(format!(
                "Found {} endpoint(s) via {}",
                candidates.len(),
                strategy.origin()
            ));
            return Discovery {
                candidates,
                status_log: log.into_messages(),
                cancelled: false,
            };
        }
    }

    log.push(format!("No API endpoints found for {}", target.domain));
    Discovery {
        candidates: Vec::new(),
        status_log: log.into_messages(),
        cancelled: false,
    }
}

fn cancelled_discovery(mut log: StatusLog) -> Discovery {
    log.push("Discovery cancelled");
    Discovery {
        candidates: Vec::new(),
        status_log: log.into_messages(),
        cancelled: true,
    }
}
