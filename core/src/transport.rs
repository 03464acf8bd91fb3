//! Injected HTTP transport.
//!
//! # Design
//! The pipeline never performs I/O itself. It hands an encoded `HttpRequest`
//! and a completion to a `Transport`, which runs the round-trip wherever it
//! likes and invokes the completion exactly once. A transport that drops the
//! completion instead is tolerated by the pipeline (the call fails with
//! `TransportError::Abandoned`) but is a bug in the transport.
//!
//! `UreqTransport` is the stock implementation: a fixed pool of worker
//! threads, sized by `TransportConfig::workers`, pulls requests off a shared
//! queue and runs one blocking ureq call each. A burst of calls queues
//! behind the pool instead of spawning a thread per call. Completions run on
//! the worker, so a completion that blocks on another request through the
//! same transport holds a worker until that request finishes.
//!
//! 4xx/5xx responses are returned as data because the envelope, not the
//! status line, decides the outcome.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Callback a transport must invoke exactly once per request.
pub type Completion = Box<dyn FnOnce(Result<HttpResponse, TransportError>) + Send + 'static>;

pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest, complete: Completion);
}

/// Settings for `UreqTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Whole-request timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Sent as `User-Agent` unless the request already carries one.
    pub user_agent: Option<String>,
    /// Worker threads running round-trips. At least one is always started.
    pub workers: usize,
    /// Response bodies longer than this fail with `ResponseTooLarge`.
    pub max_response_bytes: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(10)),
            user_agent: None,
            workers: 4,
            max_response_bytes: 10 * 1024 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_response_bytes(mut self, limit: u64) -> Self {
        self.max_response_bytes = limit;
        self
    }
}

type Job = (HttpRequest, Completion);

/// The agent plus the settings one round-trip needs.
#[derive(Clone)]
struct RoundTrip {
    agent: ureq::Agent,
    config: TransportConfig,
}

/// Blocking ureq round-trips on a bounded worker pool.
///
/// Clones share the pool. The workers exit once every clone is dropped and
/// the queue has drained.
#[derive(Clone)]
pub struct UreqTransport {
    round_trip: RoundTrip,
    jobs: mpsc::Sender<Job>,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport")
            .field("config", &self.round_trip.config)
            .finish_non_exhaustive()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl UreqTransport {
    pub fn new(config: TransportConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout)
            .build()
            .new_agent();
        let round_trip = RoundTrip { agent, config };

        let (jobs, queue) = mpsc::channel::<Job>();
        let queue = Arc::new(Mutex::new(queue));
        let workers = round_trip.config.workers.max(1);
        for index in 0..workers {
            let queue = Arc::clone(&queue);
            let worker = round_trip.clone();
            let spawned = thread::Builder::new()
                .name(format!("bili-transport-{index}"))
                .spawn(move || worker_loop(&worker, &queue));
            if let Err(e) = spawned {
                tracing::error!(error = %e, index, "failed to spawn transport worker");
            }
        }
        tracing::debug!(workers, "transport pool started");

        Self { round_trip, jobs }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.round_trip.config
    }

    /// Run one round-trip on the calling thread, bypassing the pool.
    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.round_trip.execute(request)
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest, complete: Completion) {
        // Fails only when no worker is alive to own the queue.
        if let Err(mpsc::SendError((_, complete))) = self.jobs.send((request, complete)) {
            tracing::error!("transport failure: no worker available");
            complete(Err(TransportError::Unavailable));
        }
    }
}

fn worker_loop(round_trip: &RoundTrip, queue: &Mutex<mpsc::Receiver<Job>>) {
    loop {
        let job = queue.lock().unwrap_or_else(|e| e.into_inner()).recv();
        let Ok((request, complete)) = job else {
            break;
        };
        let outcome = round_trip.execute(request);
        if catch_unwind(AssertUnwindSafe(|| complete(outcome))).is_err() {
            tracing::error!("request completion panicked");
        }
    }
}

impl RoundTrip {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            mut headers,
            body,
        } = request;

        if let Some(agent) = &self.config.user_agent {
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("user-agent")) {
                headers.push(("user-agent".to_string(), agent.clone()));
            }
        }
        let body = body.unwrap_or_default();

        let result = match method {
            HttpMethod::Get => with_headers(self.agent.get(&url), &headers).call(),
            HttpMethod::Post => with_headers(self.agent.post(&url), &headers).send(body.as_bytes()),
            HttpMethod::Put => with_headers(self.agent.put(&url), &headers).send(body.as_bytes()),
            // DELETE carries its form body like every other non-GET method.
            HttpMethod::Delete => {
                with_headers(self.agent.delete(&url).force_send_body(), &headers)
                    .send(body.as_bytes())
            }
        };

        let mut response = result.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(self.config.max_response_bytes)
            .read_to_vec()
            .map_err(transport_error)?;

        tracing::debug!(%method, %url, status, bytes = body.len(), "response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (key, value) in headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

fn transport_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(e) => TransportError::Io(e.to_string()),
        ureq::Error::BadUri(uri) => TransportError::InvalidUrl(uri),
        ureq::Error::BodyExceedsLimit(limit) => TransportError::ResponseTooLarge(limit),
        err @ (ureq::Error::Protocol(_) | ureq::Error::LargeResponseHeader(..)) => {
            TransportError::Protocol(err.to_string())
        }
        other => TransportError::Connect(other.to_string()),
    }
}
