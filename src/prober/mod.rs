use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::model::TestResult;

/// Decides whether a received status counts as a pass for a probing phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedStatus {
    any_success: bool,
    codes: HashSet<u16>,
}

impl AcceptedStatus {
    /// Any 2xx status.
    pub fn success() -> Self {
        Self {
            any_success: true,
            codes: HashSet::new(),
        }
    }

    /// Any 2xx status, or one of `codes`.
    pub fn success_or<I: IntoIterator<Item = u16>>(codes: I) -> Self {
        Self {
            any_success: true,
            codes: codes.into_iter().collect(),
        }
    }

    /// Only the listed codes.
    pub fn exactly<I: IntoIterator<Item = u16>>(codes: I) -> Self {
        Self {
            any_success: false,
            codes: codes.into_iter().collect(),
        }
    }

    pub fn accepts(&self, status: u16) -> bool {
        (self.any_success && (200..300).contains(&status)) || self.codes.contains(&status)
    }
}

impl Default for AcceptedStatus {
    fn default() -> Self {
        Self::success()
    }
}

pub(crate) fn is_json_content_type(value: &str) -> bool {
    let media = value.split(';').next().unwrap_or_default().trim();
    media.to_ascii_lowercase().contains("json")
}

pub(crate) fn classify_error(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("request timed out after {}ms", timeout.as_millis())
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else if err.is_redirect() {
        format!("redirect loop: {err}")
    } else if err.is_builder() {
        format!("invalid request: {err}")
    } else {
        format!("request failed: {err}")
    }
}

/// Issues one GET against `url` and folds the outcome into a [`TestResult`].
///
/// Transport failures never escape: they become a result with no status, no
/// latency and a readable `error`.
pub async fn probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    accepted: &AcceptedStatus,
) -> TestResult {
    let start = Instant::now();
    let resp = match client.get(url).timeout(timeout).send().await {
        Ok(resp) => resp,
        Err(e) => {
            let message = classify_error(&e, timeout);
            tracing::debug!(url, error = %message, "probe failed");
            return TestResult::failed(url, message);
        }
    };
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = resp.status().as_u16();
    let pass = accepted.accepts(status);

    let wants_json = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(is_json_content_type)
        .unwrap_or(false);

    let body = if wants_json {
        match resp.bytes().await {
            Ok(bytes) => serde_json::from_slice::<serde_json::Value>(&bytes).ok(),
            Err(e) => {
                tracing::debug!(url, error = %e, "failed to read response body");
                None
            }
        }
    } else {
        None
    };

    tracing::debug!(url, status, latency_ms, pass, "probe finished");
    TestResult::responded(url, status, latency_ms, pass, body)
}

/// Issues one HEAD against `url` and reports the status, or `None` on any
/// transport failure.
pub(crate) async fn head_status(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Option<u16> {
    match client.head(url).timeout(timeout).send().await {
        Ok(resp) => Some(resp.status().as_u16()),
        Err(e) => {
            tracing::debug!(url, error = %classify_error(&e, timeout), "head probe failed");
            None
        }
    }
}
