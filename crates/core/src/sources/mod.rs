//! External bibliographic source adapters.
//!
//! Every source follows the same template: an adapter supplies
//! [`SourceAdapter::build_request`] and [`SourceAdapter::parse_response`]
//! hooks, and the shared [`SourceDriver`] runs the flow: rate limit check,
//! circuit check, HTTP call with a per-source timeout, status policy, parse.
//! Adapters never raise: the driver always returns a [`SourceResponse`]
//! envelope, and parse errors inside an adapter degrade to an empty list.
//!
//! Status policy: 2xx parses and resets the source's breaker; 4xx other
//! than 429 is a non-fatal failure (no breaker increment); 429, 5xx,
//! timeouts, and network errors increment the breaker.

pub mod arxiv;
pub mod core_ac;
pub mod crossref;
pub mod doaj;
pub mod europepmc;
pub mod hal;
pub mod internet_archive;
pub mod openalex;
pub mod pubmed;
pub mod semantic_scholar;
pub mod unpaywall;
pub mod zenodo;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::breaker::CircuitBreaker;
use crate::config::CoreConfig;
use crate::limiter::RateLimiter;
use crate::paper::PaperDraft;

/// An outbound request assembled by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl SourceRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Response envelope returned for every adapter call, success or not.
#[derive(Debug, Clone)]
pub struct SourceResponse {
    pub papers: Vec<PaperDraft>,
    pub source: String,
    pub ok: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl SourceResponse {
    fn skipped(source: &str) -> Self {
        Self {
            papers: Vec::new(),
            source: source.to_string(),
            ok: true,
            latency_ms: 0,
            error: None,
        }
    }

    fn failed(source: &str, latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            papers: Vec::new(),
            source: source.to_string(),
            ok: false,
            latency_ms,
            error: Some(error.into()),
        }
    }
}

/// Per-source logic: request construction and response parsing.
///
/// `build_request` returns `None` when the source needs configuration (an
/// API key or contact email) that is absent; the driver then skips the
/// source with `ok=true` and no papers. `follow_up` lets a source chain one
/// second request derived from the first response (PubMed resolves ids
/// before fetching records); the default is no follow-up.
pub trait SourceAdapter: Send + Sync {
    fn tag(&self) -> &'static str;

    fn build_request(&self, query: &str, theme: &str, language: &str) -> Option<SourceRequest>;

    fn parse_response(&self, bytes: &[u8], content_type: &str) -> Vec<PaperDraft>;

    fn follow_up(&self, _bytes: &[u8]) -> Option<SourceRequest> {
        None
    }
}

/// Plain HTTP reply passed back to the driver.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Transport failure classes the driver distinguishes.
#[derive(Debug, Clone)]
pub enum TransportError {
    Timeout,
    Network(String),
}

/// HTTP seam under the driver, so tests can script replies and observe
/// whether a call reached the wire at all.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: &SourceRequest, timeout: Duration)
        -> Result<HttpReply, TransportError>;
}

/// Production transport over a shared reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("paperscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        request: &SourceRequest,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        let mut builder = self
            .client
            .get(&request.url)
            .query(&request.params)
            .timeout(timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?
            .to_vec();
        Ok(HttpReply {
            status,
            content_type,
            body,
        })
    }
}

/// Shared driver executing the template flow for any adapter.
pub struct SourceDriver {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
}

impl SourceDriver {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            breaker,
            timeout,
        }
    }

    /// Run one adapter call end to end. Never returns an error; every
    /// outcome is reported inside the envelope.
    pub async fn fetch(
        &self,
        adapter: &dyn SourceAdapter,
        query: &str,
        theme: &str,
        language: &str,
    ) -> SourceResponse {
        let source = adapter.tag();
        let started = Instant::now();

        let Some(request) = adapter.build_request(query, theme, language) else {
            tracing::debug!(source, "source unconfigured, skipped");
            return SourceResponse::skipped(source);
        };

        if !self.limiter.try_acquire(source) {
            return SourceResponse::failed(source, 0, "rate_limited");
        }
        if !self.breaker.allow(source) {
            metrics::counter!("paperscan_source_circuit_rejections", "source" => source)
                .increment(1);
            return SourceResponse::failed(source, 0, "circuit_open");
        }

        let mut reply = match self.transport_get(&request).await {
            Ok(reply) => reply,
            Err(err) => return self.transport_failure(source, started, err),
        };

        if (200..300).contains(&reply.status) {
            if let Some(next) = adapter.follow_up(&reply.body) {
                reply = match self.transport_get(&next).await {
                    Ok(reply) => reply,
                    Err(err) => return self.transport_failure(source, started, err),
                };
                if !(200..300).contains(&reply.status) {
                    return self.status_failure(source, started, reply.status);
                }
            }
            let papers = adapter.parse_response(&reply.body, &reply.content_type);
            self.breaker.on_success(source);
            let latency_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(source, count = papers.len(), latency_ms, "source ok");
            metrics::histogram!("paperscan_source_latency_ms", "source" => source)
                .record(latency_ms as f64);
            return SourceResponse {
                papers,
                source: source.to_string(),
                ok: true,
                latency_ms,
                error: None,
            };
        }

        self.status_failure(source, started, reply.status)
    }

    /// One wire call bounded by the per-source timeout. The timeout is
    /// enforced here even when the transport ignores its hint.
    async fn transport_get(&self, request: &SourceRequest) -> Result<HttpReply, TransportError> {
        match tokio::time::timeout(self.timeout, self.transport.get(request, self.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn transport_failure(
        &self,
        source: &'static str,
        started: Instant,
        err: TransportError,
    ) -> SourceResponse {
        self.breaker.on_failure(source);
        metrics::counter!("paperscan_source_failures", "source" => source).increment(1);
        let latency_ms = started.elapsed().as_millis() as u64;
        match err {
            TransportError::Timeout => {
                tracing::warn!(source, "source timed out");
                SourceResponse::failed(source, latency_ms, "timeout")
            }
            TransportError::Network(detail) => {
                tracing::warn!(source, detail, "source network error");
                SourceResponse::failed(source, latency_ms, "network_error")
            }
        }
    }

    fn status_failure(
        &self,
        source: &'static str,
        started: Instant,
        status: u16,
    ) -> SourceResponse {
        let latency_ms = started.elapsed().as_millis() as u64;
        if status == 429 || status >= 500 {
            self.breaker.on_failure(source);
            metrics::counter!("paperscan_source_failures", "source" => source).increment(1);
            tracing::warn!(source, status, "source rejected request");
        } else {
            // Client errors other than 429 say the request was wrong, not
            // that the source is down; the breaker stays untouched.
            tracing::debug!(source, status, "source returned client error");
        }
        SourceResponse::failed(source, latency_ms, format!("http_{status}"))
    }
}

/// All configured adapters in declaration order. This order is the merge
/// order after federation, so it is part of observable behavior.
pub fn registry(config: &CoreConfig) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(crossref::Crossref::new(config.contact_email.clone())),
        Arc::new(pubmed::PubMed::new()),
        Arc::new(semantic_scholar::SemanticScholar::new(
            config.semantic_scholar_api_key.clone(),
        )),
        Arc::new(arxiv::Arxiv::new()),
        Arc::new(openalex::OpenAlex::new(config.contact_email.clone())),
        Arc::new(europepmc::EuropePmc::new()),
        Arc::new(doaj::Doaj::new()),
        Arc::new(zenodo::Zenodo::new()),
        Arc::new(core_ac::CoreAc::new(config.core_api_key.clone())),
        Arc::new(internet_archive::InternetArchive::new()),
        Arc::new(unpaywall::Unpaywall::new(config.contact_email.clone())),
        Arc::new(hal::Hal::new()),
    ]
}

/// Shared helper: read a JSON string that some APIs return as either a bare
/// string or a singleton array.
pub(crate) fn string_or_first(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items
            .first()
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{system_clock, ManualClock};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoAdapter;

    impl SourceAdapter for EchoAdapter {
        fn tag(&self) -> &'static str {
            "echo"
        }
        fn build_request(&self, query: &str, _theme: &str, _language: &str) -> Option<SourceRequest> {
            Some(SourceRequest::new("https://example.org/search").param("q", query))
        }
        fn parse_response(&self, bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
            let text = String::from_utf8_lossy(bytes);
            text.lines()
                .map(|line| PaperDraft {
                    title: line.to_string(),
                    abstract_text: format!("abstract for {line}"),
                    authors: vec![],
                    source: "echo".to_string(),
                    document_type: "article".to_string(),
                    publication_date: None,
                    doi: None,
                    url: None,
                })
                .collect()
        }
    }

    struct UnconfiguredAdapter;

    impl SourceAdapter for UnconfiguredAdapter {
        fn tag(&self) -> &'static str {
            "keyless"
        }
        fn build_request(&self, _q: &str, _t: &str, _l: &str) -> Option<SourceRequest> {
            None
        }
        fn parse_response(&self, _bytes: &[u8], _content_type: &str) -> Vec<PaperDraft> {
            Vec::new()
        }
    }

    /// Scripted transport: pops replies in order and counts wire calls.
    struct ScriptedTransport {
        replies: Mutex<Vec<Result<HttpReply, TransportError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            _request: &SourceRequest,
            _timeout: Duration,
        ) -> Result<HttpReply, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                Err(TransportError::Network("script exhausted".to_string()))
            } else {
                replies.remove(0)
            }
        }
    }

    fn ok_reply(body: &str) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status: 200,
            content_type: "text/plain".to_string(),
            body: body.as_bytes().to_vec(),
        })
    }

    fn status_reply(status: u16) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status,
            content_type: "text/plain".to_string(),
            body: Vec::new(),
        })
    }

    fn driver(transport: Arc<ScriptedTransport>) -> SourceDriver {
        let clock = system_clock();
        SourceDriver::new(
            transport,
            Arc::new(RateLimiter::new(100.0, 100.0, clock.clone())),
            Arc::new(CircuitBreaker::with_defaults(clock)),
            Duration::from_secs(8),
        )
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let transport = ScriptedTransport::new(vec![ok_reply("Paper A\nPaper B")]);
        let driver = driver(transport.clone());
        let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
        assert!(response.ok);
        assert_eq!(response.source, "echo");
        assert_eq!(response.papers.len(), 2);
        assert!(response.error.is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_source_skipped_ok() {
        let transport = ScriptedTransport::new(vec![]);
        let driver = driver(transport.clone());
        let response = driver.fetch(&UnconfiguredAdapter, "q", "t", "en").await;
        assert!(response.ok);
        assert!(response.papers.is_empty());
        assert!(response.error.is_none());
        assert_eq!(transport.calls(), 0, "no outbound request");
    }

    #[tokio::test]
    async fn test_server_error_counts_toward_breaker() {
        let clock = Arc::new(ManualClock::new());
        let breaker = Arc::new(CircuitBreaker::new(2, Duration::from_secs(30), clock.clone()));
        let transport =
            ScriptedTransport::new(vec![status_reply(500), status_reply(503), ok_reply("x")]);
        let driver = SourceDriver::new(
            transport.clone(),
            Arc::new(RateLimiter::new(100.0, 100.0, clock.clone())),
            breaker.clone(),
            Duration::from_secs(8),
        );

        for _ in 0..2 {
            let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
            assert!(!response.ok);
        }
        // Circuit is now open: no wire call happens.
        let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("circuit_open"));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_plain_4xx_does_not_trip_breaker() {
        let clock = Arc::new(ManualClock::new());
        let breaker = Arc::new(CircuitBreaker::new(1, Duration::from_secs(30), clock.clone()));
        let transport = ScriptedTransport::new(vec![status_reply(404), ok_reply("x")]);
        let driver = SourceDriver::new(
            transport.clone(),
            Arc::new(RateLimiter::new(100.0, 100.0, clock.clone())),
            breaker.clone(),
            Duration::from_secs(8),
        );

        let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("http_404"));

        // Threshold is one failure, yet the next call still goes out.
        let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
        assert!(response.ok);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_429_trips_breaker() {
        let clock = Arc::new(ManualClock::new());
        let breaker = Arc::new(CircuitBreaker::new(1, Duration::from_secs(30), clock.clone()));
        let transport = ScriptedTransport::new(vec![status_reply(429), ok_reply("x")]);
        let driver = SourceDriver::new(
            transport.clone(),
            Arc::new(RateLimiter::new(100.0, 100.0, clock.clone())),
            breaker.clone(),
            Duration::from_secs(8),
        );

        let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
        assert_eq!(response.error.as_deref(), Some("http_429"));
        let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
        assert_eq!(response.error.as_deref(), Some("circuit_open"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_reported_and_counted() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout)]);
        let driver = driver(transport.clone());
        let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_rate_limited_envelope() {
        let clock = system_clock();
        let transport = ScriptedTransport::new(vec![ok_reply("x"), ok_reply("y")]);
        let driver = SourceDriver::new(
            transport.clone(),
            Arc::new(RateLimiter::new(1.0, 0.0001, clock.clone())),
            Arc::new(CircuitBreaker::with_defaults(clock)),
            Duration::from_secs(8),
        );
        assert!(driver.fetch(&EchoAdapter, "q", "t", "en").await.ok);
        let response = driver.fetch(&EchoAdapter, "q", "t", "en").await;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("rate_limited"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_registry_declaration_order() {
        let tags: Vec<&str> = registry(&CoreConfig::default())
            .iter()
            .map(|a| a.tag())
            .collect();
        assert_eq!(
            tags,
            vec![
                "crossref",
                "pubmed",
                "semantic_scholar",
                "arxiv",
                "openalex",
                "europepmc",
                "doaj",
                "zenodo",
                "core",
                "internet_archive",
                "unpaywall",
                "hal",
            ]
        );
    }
}
