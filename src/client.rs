use std::str::FromStr;
use std::time::Duration;

use crate::runner::RunnerError;

pub const DEFAULT_USER_AGENT: &str = concat!(
    "apihealth/",
    env!("CARGO_PKG_VERSION"),
    " (+endpoint discovery)"
);

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub user_agent: String,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub follow_redirects: bool,
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            header: None,
            follow_redirects: true,
            accept_invalid_certs: false,
            timeout: Duration::from_secs(10),
        }
    }
}

pub(crate) fn parse_header_line(
    line: &str,
) -> Result<(reqwest::header::HeaderName, reqwest::header::HeaderValue), RunnerError> {
    let invalid = || RunnerError::InvalidHeader {
        header: line.to_string(),
    };
    let (key, value) = line.split_once(':').ok_or_else(invalid)?;
    let key = reqwest::header::HeaderName::from_str(key.trim()).map_err(|_| invalid())?;
    let value = reqwest::header::HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
    Ok((key, value))
}

/// Builds the client shared by discovery and the test phase. Per-request
/// timeouts set by the callers override `options.timeout`.
pub fn build_client(options: &ClientOptions) -> Result<reqwest::Client, RunnerError> {
    let mut headers = reqwest::header::HeaderMap::new();
    let user_agent = reqwest::header::HeaderValue::from_str(options.user_agent.trim())
        .map_err(|_| RunnerError::InvalidHeader {
            header: format!("User-Agent: {}", options.user_agent),
        })?;
    headers.insert(reqwest::header::USER_AGENT, user_agent);
    if let Some(line) = options.header.as_deref().filter(|h| !h.trim().is_empty()) {
        let (key, value) = parse_header_line(line)?;
        headers.append(key, value);
    }

    let redirect_policy = if options.follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .redirect(redirect_policy)
        .timeout(options.timeout)
        .danger_accept_invalid_hostnames(options.accept_invalid_certs)
        .danger_accept_invalid_certs(options.accept_invalid_certs);

    if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| RunnerError::ProxySetup {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| RunnerError::HttpClientBuild { source: e })
}
