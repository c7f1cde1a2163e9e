use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::client::DEFAULT_USER_AGENT;
use crate::discovery::{self, DiscoveryTarget};
use crate::model::{Candidate, Origin, RunState};
use crate::progress::Progress;
use crate::runner::{self, CancelToken, Options, Runner, TestConfig};

fn options_for(domain: &str) -> Options {
    Options {
        domain: domain.to_string(),
        timeout_ms: 2_000,
        ..Options::default()
    }
}

async fn requested_paths(server: &MockServer) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| (r.method.to_string(), r.url.path().to_string()))
        .collect()
}

#[tokio::test]
async fn manual_endpoints_skip_network_discovery() {
    let server = MockServer::start().await;
    let runner = Runner::new(Options {
        manual_endpoints: vec!["/api/ping".to_string(), "api/health".to_string()],
        ..options_for(&server.uri())
    })
    .unwrap();

    let found = runner.discover(&CancelToken::new(), None).await;
    assert!(requested_paths(&server).await.is_empty());
    assert_eq!(found.origin(), Some(Origin::Manual));
    assert_eq!(
        found
            .candidates
            .iter()
            .map(|c| c.url.clone())
            .collect::<Vec<_>>(),
        vec![
            format!("{}/api/ping", server.uri()),
            format!("{}/api/health", server.uri())
        ]
    );
    assert_eq!(found.status_log[0], "Using manually specified endpoints");
}

#[tokio::test]
async fn unresolvable_manual_list_does_not_fall_back() {
    let server = MockServer::start().await;
    let target = DiscoveryTarget::parse(&server.uri()).unwrap();
    let client = reqwest::Client::new();
    let found = discovery::discover(
        &client,
        &target,
        &["http://".to_string()],
        &CancelToken::new(),
        None,
    )
    .await;
    assert!(found.candidates.is_empty());
    assert!(requested_paths(&server).await.is_empty());
    assert_eq!(
        found.status_log.last().map(String::as_str),
        Some("None of the manual endpoints could be resolved")
    );
}

#[tokio::test]
async fn sitemap_api_locations_win() {
    let server = MockServer::start().await;
    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{uri}/api/users</loc></url>
  <url><loc>{uri}/about</loc></url>
  <url><loc>{uri}/api/orders</loc></url>
  <url><loc>{uri}/api/users#dup</loc></url>
</urlset>"#,
        uri = server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"[{"id":1}]"#.as_bytes(), "application/json"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let runner = Runner::new(options_for(&server.uri())).unwrap();
    let summary = runner.run().await.unwrap();

    let paths = requested_paths(&server).await;
    assert!(!paths.iter().any(|(m, _)| m == "HEAD"));
    assert!(!paths.iter().any(|(_, p)| p == "/"));

    assert!(summary.candidates.iter().all(|c| c.origin == Origin::Sitemap));
    assert_eq!(
        summary.discovered_urls(),
        vec![
            format!("{}/api/users", server.uri()),
            format!("{}/api/orders", server.uri())
        ]
    );
    assert_eq!(summary.results.len(), 2);

    let users = &summary.results[0];
    assert_eq!(users.status, Some(200));
    assert!(users.pass);
    assert_eq!(users.body, Some(serde_json::json!([{"id": 1}])));
    assert!(users.latency.unwrap() >= 0.0);

    let orders = &summary.results[1];
    assert_eq!(orders.status, Some(500));
    assert!(!orders.pass);
    assert!(orders.error.is_none());

    let stats = summary.stats();
    assert_eq!(stats.passed, 1);
    assert_eq!(stats.success_rate, 0.5);
}

#[tokio::test]
async fn crawl_runs_when_sitemap_is_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
<a href="/api/items">items</a>
<a href="/api/items#top">again</a>
<a href="/about">about</a>
</body></html>"#,
        ))
        .mount(&server)
        .await;

    let target = DiscoveryTarget::parse(&server.uri()).unwrap();
    let found = discovery::discover(
        &reqwest::Client::new(),
        &target,
        &[],
        &CancelToken::new(),
        None,
    )
    .await;

    assert_eq!(found.origin(), Some(Origin::Crawl));
    assert_eq!(found.candidates.len(), 1);
    assert_eq!(found.candidates[0].url, format!("{}/api/items", server.uri()));
    assert!(!requested_paths(&server)
        .await
        .iter()
        .any(|(m, _)| m == "HEAD"));
}

#[tokio::test]
async fn sitemap_without_api_locations_falls_through_to_crawl() {
    let server = MockServer::start().await;
    let sitemap = format!(
        r#"<urlset><url><loc>{uri}/about</loc></url><url><loc>{uri}/blog</loc></url></urlset>"#,
        uri = server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<a href="/api/search?q=x&amp;page=2">search</a>"#),
        )
        .mount(&server)
        .await;

    let target = DiscoveryTarget::parse(&server.uri()).unwrap();
    let found = discovery::discover(
        &reqwest::Client::new(),
        &target,
        &[],
        &CancelToken::new(),
        None,
    )
    .await;

    assert_eq!(found.origin(), Some(Origin::Crawl));
    assert_eq!(
        found.candidates[0].url,
        format!("{}/api/search?q=x&page=2", server.uri())
    );
    let paths = requested_paths(&server).await;
    assert!(paths.contains(&("GET".to_string(), "/sitemap.xml".to_string())));
    assert!(paths.contains(&("GET".to_string(), "/".to_string())));
    assert!(!paths.iter().any(|(m, _)| m == "HEAD"));
}

#[tokio::test]
async fn crawl_identifies_itself_with_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", DEFAULT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/api/me">me</a>"#))
        .mount(&server)
        .await;

    let runner = Runner::new(options_for(&server.uri())).unwrap();
    let found = runner.discover(&CancelToken::new(), None).await;

    // The homepage only answers when the identifying agent is sent.
    assert_eq!(found.origin(), Some(Origin::Crawl));
    assert_eq!(found.candidates[0].url, format!("{}/api/me", server.uri()));
}

#[tokio::test]
async fn cancelling_during_discovery_stops_the_cascade() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;

    let runner = Runner::new(options_for(&server.uri())).unwrap();
    let cancel = CancelToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        })
    };

    let started = std::time::Instant::now();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let summary = runner.run_with(&cancel, Some(tx)).await.unwrap();
    trigger.await.unwrap();

    assert!(summary.cancelled);
    assert!(summary.candidates.is_empty());
    assert!(summary.results.is_empty());
    assert!(started.elapsed() < Duration::from_millis(1_500));

    let heads = requested_paths(&server)
        .await
        .into_iter()
        .filter(|(m, _)| m == "HEAD")
        .count();
    assert!(heads <= 1, "{heads} HEAD requests after cancel");

    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Progress::Status(message) = event {
            statuses.push(message);
        }
    }
    assert_eq!(statuses.last().map(String::as_str), Some("Discovery cancelled"));
}

#[tokio::test]
async fn cancelled_token_makes_no_discovery_requests() {
    let server = MockServer::start().await;
    let cancel = CancelToken::new();
    cancel.cancel();

    let target = DiscoveryTarget::parse(&server.uri()).unwrap();
    let found = discovery::discover(&reqwest::Client::new(), &target, &[], &cancel, None).await;

    assert!(found.cancelled);
    assert!(found.candidates.is_empty());
    assert!(requested_paths(&server).await.is_empty());
}

#[tokio::test]
async fn pattern_stage_keeps_only_existing_routes() {
    let server = MockServer::start().await;
    for (route, status) in [("/api", 200), ("/health", 401), ("/status", 404), ("/v1", 403)] {
        Mock::given(method("HEAD"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let target = DiscoveryTarget::parse(&server.uri()).unwrap();
    let found = discovery::discover(
        &reqwest::Client::new(),
        &target,
        &[],
        &CancelToken::new(),
        Some(tx),
    )
    .await;

    assert_eq!(found.origin(), Some(Origin::Pattern));
    assert_eq!(
        found
            .candidates
            .iter()
            .map(|c| c.url.clone())
            .collect::<Vec<_>>(),
        vec![
            format!("{}/api", server.uri()),
            format!("{}/health", server.uri()),
            format!("{}/v1", server.uri())
        ]
    );

    let heads = requested_paths(&server)
        .await
        .into_iter()
        .filter(|(m, _)| m == "HEAD")
        .count();
    assert_eq!(heads, discovery::COMMON_API_PATHS.len());

    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Progress::Status(message) = event {
            statuses.push(message);
        }
    }
    assert_eq!(statuses, found.status_log);
    assert!(statuses.contains(&"Trying common pattern 17/17: /graphql".to_string()));
}

#[tokio::test]
async fn nothing_found_completes_with_empty_summary() {
    let server = MockServer::start().await;
    let runner = Runner::new(options_for(&server.uri())).unwrap();
    let summary = runner.run().await.unwrap();
    assert!(summary.candidates.is_empty());
    assert!(summary.results.is_empty());
    assert_eq!(summary.stats().success_rate, 0.0);
}

#[tokio::test]
async fn every_candidate_gets_one_result_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;

    let candidates: Vec<Candidate> = (0..12)
        .map(|i| Candidate::new(format!("{}/api/item/{i}", server.uri()), Origin::Manual))
        .collect();
    let config = TestConfig {
        concurrency: 3,
        ..TestConfig::default()
    };
    let summary = runner::run_tests(
        &reqwest::Client::new(),
        &server.uri(),
        candidates.clone(),
        &config,
        &CancelToken::new(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.results.len(), candidates.len());
    for (candidate, result) in candidates.iter().zip(&summary.results) {
        assert_eq!(candidate.url, result.endpoint);
        assert!(result.pass);
        assert!(result.is_well_formed());
    }
}

#[tokio::test]
async fn invalid_json_body_is_left_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/broken"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("{not json".as_bytes(), "application/json"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/api/broken", server.uri());
    let result = crate::prober::probe(
        &reqwest::Client::new(),
        &url,
        Duration::from_secs(2),
        &crate::prober::AcceptedStatus::default(),
    )
    .await;
    assert_eq!(result.status, Some(200));
    assert!(result.pass);
    assert!(result.body.is_none());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1_500)))
        .mount(&server)
        .await;

    let url = format!("{}/api/slow", server.uri());
    let result = crate::prober::probe(
        &reqwest::Client::new(),
        &url,
        Duration::from_millis(100),
        &crate::prober::AcceptedStatus::default(),
    )
    .await;
    assert_eq!(result.status, None);
    assert_eq!(result.latency, None);
    assert!(!result.pass);
    assert!(result.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn unreachable_host_yields_failed_result() {
    let runner = Runner::new(Options {
        manual_endpoints: vec!["/api/health".to_string()],
        ..options_for("http://127.0.0.1:1")
    })
    .unwrap();
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.results.len(), 1);
    let result = &summary.results[0];
    assert_eq!(result.endpoint, "http://127.0.0.1:1/api/health");
    assert_eq!(result.status, None);
    assert_eq!(result.latency, None);
    assert!(!result.pass);
    assert!(result.error.is_some());
    assert!(result.body.is_none());
}

#[tokio::test]
async fn run_reports_lifecycle_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let runner = Runner::new(Options {
        manual_endpoints: vec!["/api/ping".to_string()],
        ..options_for(&server.uri())
    })
    .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let summary = runner.run_with(&CancelToken::new(), Some(tx)).await.unwrap();
    assert_eq!(summary.results.len(), 1);

    let mut states = Vec::new();
    let mut finished = 0;
    let mut announced = None;
    while let Some(event) = rx.recv().await {
        match event {
            Progress::State(state) => states.push(state),
            Progress::Candidates { count } => announced = Some(count),
            Progress::ProbeFinished { index, .. } => {
                assert_eq!(index, 0);
                finished += 1;
            }
            Progress::Status(_) => {}
        }
    }
    assert_eq!(
        states,
        vec![
            RunState::Idle,
            RunState::Discovering,
            RunState::Testing,
            RunState::Complete
        ]
    );
    assert_eq!(announced, Some(1));
    assert_eq!(finished, 1);
}

#[tokio::test]
async fn cancelling_returns_completed_results_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let candidates: Vec<Candidate> = (0..4)
        .map(|i| Candidate::new(format!("{}/api/slow/{i}", server.uri()), Origin::Manual))
        .collect();
    let config = TestConfig {
        concurrency: 1,
        timeout: Duration::from_secs(10),
        ..TestConfig::default()
    };
    let cancel = CancelToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };

    let started = std::time::Instant::now();
    let summary = runner::run_tests(
        &reqwest::Client::new(),
        &server.uri(),
        candidates,
        &config,
        &cancel,
        None,
    )
    .await
    .unwrap();
    trigger.await.unwrap();

    assert!(summary.cancelled);
    assert!(summary.results.len() < summary.candidates.len());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn export_round_trips_a_real_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let runner = Runner::new(Options {
        manual_endpoints: vec!["/api/ok".to_string(), "/api/missing".to_string()],
        ..options_for(&server.uri())
    })
    .unwrap();
    let summary = runner.run().await.unwrap();

    let doc = crate::output::parse_export(&crate::output::render_json(&summary)).unwrap();
    assert_eq!(doc.domain, summary.domain);
    assert_eq!(doc.discovered, summary.discovered_urls());
    assert_eq!(doc.results.len(), summary.results.len());
    for (a, b) in doc.results.iter().zip(&summary.results) {
        assert_eq!(a.endpoint, b.endpoint);
        assert_eq!(a.status, b.status);
        assert_eq!(a.pass, b.pass);
    }
    assert_eq!(doc.results[0].body, Some(serde_json::json!({"ok": true})));
    assert_eq!(doc.results[1].status, Some(404));
}
