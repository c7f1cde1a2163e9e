use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task;

use crate::client::{self, ClientOptions};
use crate::discovery::{self, Discovery, DiscoveryTarget, DomainError};
use crate::model::{self, Candidate, RunState, RunSummary, TestResult};
use crate::prober::{self, AcceptedStatus};
use crate::progress::{self, Progress, ProgressSender};

#[derive(Clone, Debug)]
pub struct Options {
    pub domain: String,
    pub manual_endpoints: Vec<String>,
    pub concurrency: usize,
    pub rate: u32,
    pub timeout_ms: u64,
    pub accepted: AcceptedStatus,
    pub client: ClientOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            domain: String::new(),
            manual_endpoints: Vec::new(),
            concurrency: 10,
            rate: 0,
            timeout_ms: 10_000,
            accepted: AcceptedStatus::default(),
            client: ClientOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("domain is empty")]
    EmptyDomain,

    #[error("invalid domain: {domain}")]
    InvalidDomain { domain: String },

    #[error("invalid concurrency {value}, expected positive integer")]
    InvalidConcurrency { value: usize },

    #[error("invalid timeout {value}ms, expected positive integer")]
    InvalidTimeout { value: u64 },

    #[error("invalid header '{header}', expected 'Key: Value'")]
    InvalidHeader { header: String },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid run state transition {from} -> {to}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

impl From<DomainError> for RunnerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Empty => RunnerError::EmptyDomain,
            DomainError::Invalid { domain } => RunnerError::InvalidDomain { domain },
        }
    }
}

/// External stop signal for a run. Clones share the same state.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct TestConfig {
    pub timeout: Duration,
    pub concurrency: usize,
    pub rate: u32,
    pub accepted: AcceptedStatus,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            concurrency: 10,
            rate: 0,
            accepted: AcceptedStatus::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct ProbeJob {
    index: usize,
    url: String,
}

struct Lifecycle<'a> {
    state: RunState,
    sink: Option<&'a ProgressSender>,
}

impl<'a> Lifecycle<'a> {
    fn new(sink: Option<&'a ProgressSender>) -> Self {
        progress::emit(sink, Progress::State(RunState::Idle));
        Self {
            state: RunState::Idle,
            sink,
        }
    }

    fn advance(&mut self, next: RunState) -> Result<(), RunnerError> {
        if !self.state.can_transition_to(next) {
            return Err(RunnerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "run state changed");
        self.state = next;
        progress::emit(self.sink, Progress::State(next));
        Ok(())
    }
}

/// Probes every candidate with at most `config.concurrency` requests in
/// flight and returns the results in candidate order. Repeated urls are
/// tested once, under their first-seen origin.
///
/// Workers hand results to a single collector over a channel. Cancelling
/// `cancel` stops new probes from being issued; the summary then holds only
/// the probes that had already completed.
pub async fn run_tests(
    client: &reqwest::Client,
    domain: &str,
    candidates: Vec<Candidate>,
    config: &TestConfig,
    cancel: &CancelToken,
    progress: Option<ProgressSender>,
) -> Result<RunSummary, RunnerError> {
    let timestamp = Utc::now();
    let candidates = model::dedup_candidate_list(candidates);
    let total = candidates.len();
    let worker_count = config.concurrency.max(1).min(total.max(1));

    let (job_tx, job_rx) = mpsc::channel::<ProbeJob>(1024);
    let (result_tx, mut result_rx) = mpsc::channel::<(usize, TestResult)>(1024);

    let dispatch_handle = task::spawn({
        let jobs: Vec<ProbeJob> = candidates
            .iter()
            .enumerate()
            .map(|(index, c)| ProbeJob {
                index,
                url: c.url.clone(),
            })
            .collect();
        let rate = config.rate;
        let cancel = cancel.clone();
        async move {
            let limiter = NonZeroU32::new(rate).map(|r| RateLimiter::direct(Quota::per_second(r)));
            for job in jobs {
                if cancel.is_cancelled() {
                    break;
                }
                if let Some(lim) = limiter.as_ref() {
                    lim.until_ready().await;
                }
                if job_tx.send(job).await.is_err() {
                    break;
                }
            }
        }
    });

    let job_rx = Arc::new(Mutex::new(job_rx));
    let mut workers = FuturesUnordered::new();
    for _ in 0..worker_count {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let client = client.clone();
        let cancel = cancel.clone();
        let timeout = config.timeout;
        let accepted = config.accepted.clone();
        workers.push(task::spawn(async move {
            loop {
                let next = { job_rx.lock().await.recv().await };
                let Some(job) = next else {
                    break;
                };
                if cancel.is_cancelled() {
                    break;
                }
                let result = prober::probe(&client, &job.url, timeout, &accepted).await;
                if result_tx.send((job.index, result)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut collected: Vec<(usize, TestResult)> = Vec::with_capacity(total);
    let mut cancelled = false;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            next = result_rx.recv() => match next {
                Some((index, result)) => {
                    progress::emit(
                        progress.as_ref(),
                        Progress::ProbeFinished {
                            index,
                            result: result.clone(),
                        },
                    );
                    collected.push((index, result));
                }
                None => break,
            },
        }
    }

    if cancelled {
        while let Ok((index, result)) = result_rx.try_recv() {
            collected.push((index, result));
        }
        drop(result_rx);
        tracing::info!(
            completed = collected.len(),
            total,
            "run cancelled, returning completed results"
        );
    } else {
        dispatch_handle
            .await
            .map_err(|e| RunnerError::TaskJoin { source: e })?;
        while let Some(worker) = workers.next().await {
            worker.map_err(|e| RunnerError::TaskJoin { source: e })?;
        }
    }

    collected.sort_by_key(|(index, _)| *index);
    let results = collected.into_iter().map(|(_, r)| r).collect();

    Ok(RunSummary {
        domain: domain.to_string(),
        timestamp,
        candidates,
        results,
        cancelled,
    })
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
    target: DiscoveryTarget,
    client: reqwest::Client,
}

impl Runner {
    /// Validates the invocation. Nothing touches the network until one of
    /// the async methods is called.
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        let target = DiscoveryTarget::parse(&options.domain)?;
        if options.concurrency == 0 {
            return Err(RunnerError::InvalidConcurrency {
                value: options.concurrency,
            });
        }
        if options.timeout_ms == 0 {
            return Err(RunnerError::InvalidTimeout {
                value: options.timeout_ms,
            });
        }
        let client = client::build_client(&options.client)?;
        Ok(Self {
            options,
            target,
            client,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn target(&self) -> &DiscoveryTarget {
        &self.target
    }

    fn test_config(&self) -> TestConfig {
        TestConfig {
            timeout: Duration::from_millis(self.options.timeout_ms),
            concurrency: self.options.concurrency,
            rate: self.options.rate,
            accepted: self.options.accepted.clone(),
        }
    }

    pub async fn discover(
        &self,
        cancel: &CancelToken,
        progress: Option<ProgressSender>,
    ) -> Discovery {
        discovery::discover(
            &self.client,
            &self.target,
            &self.options.manual_endpoints,
            cancel,
            progress,
        )
        .await
    }

    pub async fn test(
        &self,
        candidates: Vec<Candidate>,
        cancel: &CancelToken,
        progress: Option<ProgressSender>,
    ) -> Result<RunSummary, RunnerError> {
        run_tests(
            &self.client,
            &self.target.domain,
            candidates,
            &self.test_config(),
            cancel,
            progress,
        )
        .await
    }

    pub async fn run(&self) -> Result<RunSummary, RunnerError> {
        self.run_with(&CancelToken::new(), None).await
    }

    /// Discovery followed by the test phase, reporting lifecycle changes on
    /// `progress`.
    pub async fn run_with(
        &self,
        cancel: &CancelToken,
        progress: Option<ProgressSender>,
    ) -> Result<RunSummary, RunnerError> {
        let mut lifecycle = Lifecycle::new(progress.as_ref());

        lifecycle.advance(RunState::Discovering)?;
        let found = self.discover(cancel, progress.clone()).await;
        if found.cancelled {
            tracing::info!("run cancelled during discovery");
        }

        lifecycle.advance(RunState::Testing)?;
        progress::emit(
            progress.as_ref(),
            Progress::Candidates {
                count: found.candidates.len(),
            },
        );
        if !found.candidates.is_empty() {
            progress::emit(
                progress.as_ref(),
                Progress::Status(format!(
                    "Testing {} endpoint(s)",
                    found.candidates.len()
                )),
            );
        }
        match self.test(found.candidates, cancel, progress.clone()).await {
            Ok(summary) => {
                lifecycle.advance(RunState::Complete)?;
                Ok(summary)
            }
            Err(e) => {
                lifecycle.advance(RunState::Failed)?;
                Err(e)
            }
        }
    }
}
