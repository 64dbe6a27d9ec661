//! Resilient HTTP fetching with bounded exponential backoff
//!
//! `ResilientClient` is shared by the consumption and price providers. It
//! knows nothing about payloads: it sends a `RequestSpec`, classifies the
//! outcome, and retries only transient failures (network errors and gateway
//! timeouts). Authentication failures and other error statuses return
//! immediately.

use crate::config::FetchConfig;
use crate::error::{LedgerError, Result};
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// One HTTP request, independent of the client that sends it
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestSpec {
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST with a JSON body and matching content type
    pub fn post_json<S: Into<String>, T: Serialize>(url: S, body: &T) -> Result<Self> {
        Ok(Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(serde_json::to_string(body)?),
        })
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Raw response as seen by the transport
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Performs a single attempt.
///
/// Any HTTP status is `Ok`; `Err` is reserved for failures below HTTP
/// (connect, TLS, timeout, truncated body) and must be `Transient`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, spec: &RequestSpec) -> Result<FetchResponse>;
}

/// `reqwest`-backed transport (Rustls)
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| LedgerError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, spec: &RequestSpec) -> Result<FetchResponse> {
        let mut request = self.client.request(spec.method.clone(), &spec.url);
        for (key, value) in &spec.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &spec.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(FetchResponse { status, body })
    }
}

/// Attempt budget and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    /// Delay before the second attempt; doubles after that
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: Duration::from_secs(config.base_delay_secs),
        }
    }

    /// Delay slept before attempt `k` (0-based): zero for the first, then `base * 2^(k-1)`
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor)
    }
}

/// Gateway timeouts are the only retried status class
pub fn is_transient_status(status: u16) -> bool {
    status == 504
}

pub fn is_auth_status(status: u16) -> bool {
    status == 401 || status == 403
}

/// Shared HTTP client with retry; cheap to clone
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    logger: StructuredLogger,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            logger: get_logger("fetch"),
        }
    }

    /// Build the production client from configuration
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(
            Duration::from_secs(config.request_timeout_secs),
            &config.user_agent,
        )?;
        Ok(Self::new(Arc::new(transport), RetryPolicy::from_config(config)))
    }

    /// Send `spec`, retrying transient failures until the budget is spent
    pub async fn request(&self, spec: &RequestSpec) -> Result<FetchResponse> {
        let mut last_error: Option<LedgerError> = None;

        for attempt in 0..self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.delay_before(attempt);
                self.logger.warn(&format!(
                    "Retrying {} {} (attempt {}/{}) in {:?}",
                    spec.method,
                    spec.url,
                    attempt + 1,
                    self.policy.max_retries,
                    delay
                ));
                tokio::time::sleep(delay).await;
            }

            match self.attempt(spec).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => {
                    self.logger.debug(&format!(
                        "Transient failure for {} {}: {}",
                        spec.method, spec.url, e
                    ));
                    last_error = Some(e);
                }
                Err(e) => {
                    if e.is_auth() {
                        self.logger
                            .error(&format!("Authentication rejected by {}: {}", spec.url, e));
                    }
                    return Err(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| LedgerError::transient("no attempt was made"));
        self.logger.error(&format!(
            "Giving up on {} {} after {} attempts: {}",
            spec.method, spec.url, self.policy.max_retries, last
        ));
        Err(LedgerError::fetch_exhausted(self.policy.max_retries, last))
    }

    async fn attempt(&self, spec: &RequestSpec) -> Result<FetchResponse> {
        let response = self.transport.execute(spec).await?;
        classify(response)
    }
}

/// Map an HTTP response onto success or the error taxonomy
fn classify(response: FetchResponse) -> Result<FetchResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let status = response.status;
    let snippet: String = response.body.chars().take(200).collect();
    if is_transient_status(status) {
        Err(LedgerError::transient(format!("HTTP {}: {}", status, snippet)))
    } else if is_auth_status(status) {
        Err(LedgerError::auth(format!("HTTP {}: {}", status, snippet)))
    } else {
        Err(LedgerError::api(status, snippet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays canned outcomes; repeats the last one when the script runs out
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<FetchResponse>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<FetchResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn status(code: u16) -> Result<FetchResponse> {
        Ok(FetchResponse {
            status: code,
            body: format!("status {}", code),
        })
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, _spec: &RequestSpec) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().map(|r| match r {
                    Ok(resp) => Ok(resp.clone()),
                    Err(e) => Err(LedgerError::transient(e.to_string())),
                })
            };
            next.unwrap_or_else(|| status(200))
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> ResilientClient {
        ResilientClient::new(transport, RetryPolicy::default())
    }

    #[test]
    fn backoff_schedule_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|k| policy.delay_before(k).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 2, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn five_gateway_timeouts_exhaust_the_budget() {
        let transport = ScriptedTransport::new(vec![status(504)]);
        let started = tokio::time::Instant::now();

        let err = client(transport.clone())
            .request(&RequestSpec::get("http://prices.test/api"))
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 5);
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(started.elapsed() < Duration::from_secs(31));
        match err {
            LedgerError::FetchExhausted { attempts, last } => {
                assert_eq!(attempts, 5);
                assert!(last.is_transient());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_not_retried() {
        let transport = ScriptedTransport::new(vec![status(401), status(200)]);
        let started = tokio::time::Instant::now();

        let err = client(transport.clone())
            .request(&RequestSpec::get("http://meter.test/api"))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Auth { .. }));
        assert_eq!(transport.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn other_error_statuses_fail_fast() {
        let transport = ScriptedTransport::new(vec![status(500), status(200)]);
        let err = client(transport.clone())
            .request(&RequestSpec::get("http://prices.test/api"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Api { status: 500, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_network_errors() {
        let transport = ScriptedTransport::new(vec![
            Err(LedgerError::transient("connection reset")),
            status(504),
            status(200),
        ]);
        let started = tokio::time::Instant::now();

        let response = client(transport.clone())
            .request(&RequestSpec::get("http://prices.test/api"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.calls(), 3);
        // 1s before the second attempt, 2s before the third
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[test]
    fn post_json_sets_content_type() {
        let spec = RequestSpec::post_json("http://x.test", &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.body.as_deref(), Some("{\"a\":1}"));
        assert!(
            spec.headers
                .iter()
                .any(|(k, v)| k == "Content-Type" && v == "application/json")
        );
    }
}
