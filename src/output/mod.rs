use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{RunSummary, TestResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

/// The exported file. Field names are part of the file format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub domain: String,
    pub timestamp: String,
    pub discovered: Vec<String>,
    pub results: Vec<TestResult>,
}

impl ExportDocument {
    pub fn from_summary(summary: &RunSummary) -> Self {
        Self {
            domain: summary.domain.clone(),
            timestamp: format_timestamp(&summary.timestamp),
            discovered: summary.discovered_urls(),
            results: summary.results.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormattedReport {
    pub json: serde_json::Value,
    pub text: String,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn format(summary: &RunSummary) -> FormattedReport {
    let doc = ExportDocument::from_summary(summary);
    let json = serde_json::to_value(&doc).unwrap_or(serde_json::Value::Null);
    FormattedReport {
        json,
        text: render_share_text(summary),
    }
}

fn result_line(r: &TestResult) -> String {
    let mark = if r.pass { "✅" } else { "❌" };
    match r.latency {
        Some(latency) => format!("{} — {} ({}ms)", r.endpoint, mark, latency.round() as u64),
        None => format!("{} — {} (no response)", r.endpoint, mark),
    }
}

pub fn render_share_text(summary: &RunSummary) -> String {
    let stats = summary.stats();
    let mut out = String::new();
    out.push_str(&format!("API Health Check Results for {}:\n", summary.domain));
    out.push_str(&format!(
        "✅ {}/{} endpoints passed\n",
        stats.passed, stats.total
    ));
    out.push_str(&format!(
        "📊 Average latency: {}ms\n",
        stats.average_latency_ms.round() as u64
    ));
    if !summary.results.is_empty() {
        out.push('\n');
    }
    for r in &summary.results {
        out.push_str(&result_line(r));
        out.push('\n');
    }
    out
}

pub fn render_text(summary: &RunSummary) -> Vec<u8> {
    render_share_text(summary).into_bytes()
}

pub fn render_json(summary: &RunSummary) -> Vec<u8> {
    let doc = ExportDocument::from_summary(summary);
    serde_json::to_vec_pretty(&doc).unwrap_or_else(|_| b"{}\n".to_vec())
}

pub fn parse_export(data: &[u8]) -> Result<ExportDocument, serde_json::Error> {
    serde_json::from_slice(data)
}

/// `https://api.example.com:8443` becomes `api_example_com_8443`.
pub fn sanitize_domain(domain: &str) -> String {
    let trimmed = domain.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    without_scheme
        .trim_end_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn export_file_name(domain: &str, unix_millis: i64) -> String {
    format!(
        "api-test-results-{}-{}.json",
        sanitize_domain(domain),
        unix_millis
    )
}
