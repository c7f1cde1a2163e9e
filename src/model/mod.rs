use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a candidate endpoint was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Manual,
    Sitemap,
    Crawl,
    Pattern,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Manual => "manual",
            Origin::Sitemap => "sitemap",
            Origin::Crawl => "crawl",
            Origin::Pattern => "pattern",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub origin: Origin,
}

impl Candidate {
    pub fn new(url: impl Into<String>, origin: Origin) -> Self {
        Self {
            url: url.into(),
            origin,
        }
    }
}

/// Builds a candidate list from already normalized urls, dropping exact
/// duplicates while keeping first-seen order.
pub fn dedup_candidates<I>(urls: I, origin: Origin) -> Vec<Candidate>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for url in urls {
        if seen.insert(url.clone()) {
            out.push(Candidate::new(url, origin));
        }
    }
    out
}

/// Drops candidates whose url was already seen, keeping the first one and
/// its origin.
pub fn dedup_candidate_list(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

/// Outcome of probing one endpoint.
///
/// `status` and `latency` are either both set or both absent, and `body`
/// and `error` are never set together. Use [`TestResult::responded`] and
/// [`TestResult::failed`] to build values that hold those rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub endpoint: String,
    pub status: Option<u16>,
    pub latency: Option<f64>,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn responded(
        endpoint: impl Into<String>,
        status: u16,
        latency_ms: f64,
        pass: bool,
        body: Option<serde_json::Value>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            status: Some(status),
            latency: Some(latency_ms),
            pass,
            body,
            error: None,
        }
    }

    pub fn failed(endpoint: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            status: None,
            latency: None,
            pass: false,
            body: None,
            error: Some(error.into()),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.status.is_some() == self.latency.is_some()
            && !(self.body.is_some() && self.error.is_some())
            && (self.status.is_some() || !self.pass)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub candidates: Vec<Candidate>,
    pub results: Vec<TestResult>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn stats(&self) -> RunStats {
        RunStats::from_results(&self.results)
    }

    pub fn discovered_urls(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.url.clone()).collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub average_latency_ms: f64,
    pub success_rate: f64,
}

impl RunStats {
    pub fn from_results(results: &[TestResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.pass).count();
        let latencies: Vec<f64> = results.iter().filter_map(|r| r.latency).collect();
        let average_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        let success_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64
        };
        Self {
            total,
            passed,
            failed: total - passed,
            average_latency_ms,
            success_rate,
        }
    }
}

/// Lifecycle of a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Discovering,
    Testing,
    Complete,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Failed)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Discovering)
                | (RunState::Idle, RunState::Testing)
                | (RunState::Discovering, RunState::Testing)
                | (RunState::Discovering, RunState::Failed)
                | (RunState::Testing, RunState::Complete)
                | (RunState::Testing, RunState::Failed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Idle => "idle",
            RunState::Discovering => "discovering",
            RunState::Testing => "testing",
            RunState::Complete => "complete",
            RunState::Failed => "failed",
        };
        f.write_str(label)
    }
}
