//! Resilient client for the scan HTTP API.
//!
//! The client executes logical read requests against the best available
//! upstream node, transparently handling rate limits, transient failures,
//! and duplicate concurrent calls. Successful reads are cached for a fixed
//! TTL and identical concurrent reads are collapsed into a single network
//! call.
//!
//! All methods take `&self`; the intended way to use the client from
//! several tasks is to clone it. Cloning is cheap and clones share the
//! node list, the response cache, and the in-flight registry.
use crate::{
    constants,
    endpoints::{ApiError, Endpoint, QueryResult},
    types::responses::{
        ConsensusResponse, GovernanceResponse, OverviewResponse, SuperValidatorsResponse,
        UpdatesResponse, ValidatorsResponse,
    },
};
use futures::future::{BoxFuture, FutureExt, Shared};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{
    header::{HeaderMap, ACCEPT, RETRY_AFTER},
    StatusCode,
};
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

/// Characters escaped when embedding a value in a URL path segment or query
/// string; everything outside the RFC 3986 unreserved set.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single URL path segment or query value.
pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string()
}

/// Rate-limit snapshot for a node, taken from `X-RateLimit-*` response
/// headers. Once `now >= reset` the window is treated as cleared.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    /// Calls remaining in the current window.
    pub remaining: i64,
    /// Unix timestamp (seconds) at which the window resets.
    pub reset:     u64,
    /// Window ceiling.
    pub limit:     i64,
}

/// Snapshot of one node's health, as returned by [`Client::node_status`].
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub endpoint:           Endpoint,
    pub consecutive_errors: u32,
    pub rate_limit:         Option<RateLimitInfo>,
    /// Whether this node is the one requests are currently routed to.
    pub is_active:          bool,
}

/// Configuration for a [`Client`].
pub struct ClientConfig {
    endpoints:               Vec<Endpoint>,
    cache_ttl:               Duration,
    max_retries:             u32,
    rate_limit_wait_ceiling: Duration,
    request_timeout:         Duration,
    page_delay:              Duration,
}

impl Default for ClientConfig {
    fn default() -> Self { Self::new(default_endpoints()) }
}

impl ClientConfig {
    /// A configuration with the given endpoints and default tuning: a 120 s
    /// cache TTL, 3 attempts per logical request, a 60 s rate-limit wait
    /// ceiling, and a 30 s per-attempt timeout.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            cache_ttl: constants::DEFAULT_CACHE_TTL,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            rate_limit_wait_ceiling: constants::DEFAULT_RATE_LIMIT_WAIT_CEILING,
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            page_delay: constants::DEFAULT_PAGE_DELAY,
        }
    }

    /// Set how long a successful response stays valid in the cache.
    /// The default value is 120 seconds.
    pub fn set_cache_ttl(self, cache_ttl: Duration) -> Self { Self { cache_ttl, ..self } }

    /// Set the number of attempts for a single logical request. Defaults
    /// to 3 if not set explicitly.
    pub fn set_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            ..self
        }
    }

    /// Set the longest the client will sleep waiting for a rate-limit
    /// window to reset before switching node instead. Defaults to 60
    /// seconds.
    pub fn set_rate_limit_wait_ceiling(self, rate_limit_wait_ceiling: Duration) -> Self {
        Self {
            rate_limit_wait_ceiling,
            ..self
        }
    }

    /// Set the bound on a single request attempt. Defaults to 30 seconds.
    pub fn set_request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    /// Set the pause between pages when paginating bulk listings. Defaults
    /// to 400 milliseconds.
    pub fn set_page_delay(self, page_delay: Duration) -> Self { Self { page_delay, ..self } }
}

/// The two public scan endpoints queried when no explicit configuration is
/// supplied.
fn default_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new("https://api.cantonnodes.com", "Canton Nodes Primary", 1),
        Endpoint::new(
            "https://scan.global.canton.network.sync.global",
            "Global Synchronizer",
            2,
        ),
    ]
}

#[derive(Debug, Error)]
/// Error constructing a [`Client`].
pub enum ClientBuildError {
    #[error("At least one endpoint must be configured.")]
    NoEndpoints,
    #[error("Failed to construct HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Runtime state of one upstream node.
#[derive(Debug, Clone)]
struct Node {
    endpoint:           Endpoint,
    rate_limit:         Option<RateLimitInfo>,
    last_error:         Option<Instant>,
    consecutive_errors: u32,
}

impl Node {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            rate_limit: None,
            last_error: None,
            consecutive_errors: 0,
        }
    }
}

/// Outcome of checking the current node's rate-limit window before a
/// request.
enum RateLimitGate {
    /// No active limit; issue the request.
    Ready,
    /// The window resets soon; sleep this long and then issue the request.
    Wait(Duration),
    /// The wait would exceed the ceiling; move to another node.
    Switch,
}

/// Node list and active-node pointer. The pointer always references a
/// valid index; nodes are never removed, only their error and rate-limit
/// state changes.
struct Routing {
    nodes:   Vec<Node>,
    current: usize,
}

impl Routing {
    fn new(mut endpoints: Vec<Endpoint>) -> Self {
        endpoints.sort_by_key(|e| e.priority);
        Self {
            nodes:   endpoints.into_iter().map(Node::new).collect(),
            current: 0,
        }
    }

    fn current_node(&self) -> &Node { &self.nodes[self.current] }

    fn current_node_mut(&mut self) -> &mut Node { &mut self.nodes[self.current] }

    /// Count a failed request against the current node.
    fn record_failure(&mut self, now: Instant) {
        let node = self.current_node_mut();
        node.consecutive_errors += 1;
        node.last_error = Some(now);
    }

    /// Walk forward circularly from the current node, skipping nodes with
    /// too many consecutive errors, until an eligible node is found or the
    /// walk wraps. On a full wrap, nodes whose last error is older than the
    /// cooldown get their error count reset so a later call can select
    /// them; the walk itself does not restart.
    fn switch_to_next_node(&mut self, now: Instant) {
        let start = self.current;
        loop {
            self.current = (self.current + 1) % self.nodes.len();
            if self.nodes[self.current].consecutive_errors < constants::NODE_ERROR_THRESHOLD {
                return;
            }
            if self.current == start {
                break;
            }
        }
        for node in &mut self.nodes {
            if node.consecutive_errors >= constants::NODE_ERROR_THRESHOLD {
                if let Some(at) = node.last_error {
                    if now.duration_since(at) > constants::NODE_ERROR_COOLDOWN {
                        node.consecutive_errors = 0;
                    }
                }
            }
        }
    }

    /// Check the current node's cached rate-limit window. A window whose
    /// reset time has passed is cleared.
    fn rate_limit_gate(&mut self, now_ms: u64, ceiling: Duration) -> RateLimitGate {
        let node = self.current_node_mut();
        let Some(info) = node.rate_limit else {
            return RateLimitGate::Ready;
        };
        let reset_ms = info.reset.saturating_mul(1000);
        if now_ms >= reset_ms {
            node.rate_limit = None;
            return RateLimitGate::Ready;
        }
        if info.remaining > 0 {
            return RateLimitGate::Ready;
        }
        let wait = Duration::from_millis(reset_ms - now_ms);
        if wait < ceiling {
            RateLimitGate::Wait(wait)
        } else {
            RateLimitGate::Switch
        }
    }
}

struct CacheEntry {
    data:      serde_json::Value,
    stored_at: Instant,
}

type SharedFetch = Shared<BoxFuture<'static, QueryResult<serde_json::Value>>>;

struct Inner {
    http:      reqwest::Client,
    config:    ClientConfig,
    routing:   Mutex<Routing>,
    cache:     Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

#[derive(Clone)]
/// Client that can perform read queries against the scan API with caching,
/// in-flight deduplication, rate-limit handling, and node failover.
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Construct a client from the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientBuildError> {
        if config.endpoints.is_empty() {
            return Err(ClientBuildError::NoEndpoints);
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let routing = Routing::new(config.endpoints.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                routing: Mutex::new(routing),
                cache: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// The pause applied between pages when paginating bulk listings.
    pub fn page_delay(&self) -> Duration { self.inner.config.page_delay }

    /// Snapshot of every node's health and which node is active.
    pub fn node_status(&self) -> Vec<NodeStatus> {
        let routing = lock(&self.inner.routing);
        routing
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| NodeStatus {
                endpoint:           node.endpoint.clone(),
                consecutive_errors: node.consecutive_errors,
                rate_limit:         node.rate_limit,
                is_active:          index == routing.current,
            })
            .collect()
    }

    /// Drop all cached responses, e.g. for a forced refresh.
    pub fn clear_cache(&self) { lock(&self.inner.cache).clear(); }

    /// Execute a read request for `path` with the given query parameters,
    /// using the configured retry budget. Cached and deduplicated; see
    /// [`fetch_with_retries`](Self::fetch_with_retries).
    pub async fn fetch(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> QueryResult<serde_json::Value> {
        self.fetch_with_retries(path, params, self.inner.config.max_retries)
            .await
    }

    /// Execute a read request for `path` with an explicit retry budget.
    ///
    /// A valid cached response is returned without touching the network.
    /// If an identical request is already in flight, the caller is attached
    /// to it and receives the same outcome rather than issuing a second
    /// call. Successful responses are cached for the configured TTL; the
    /// in-flight marker is removed exactly once after settlement so a
    /// failed request can be retried fresh.
    pub async fn fetch_with_retries(
        &self,
        path: &str,
        params: &[(&str, &str)],
        max_retries: u32,
    ) -> QueryResult<serde_json::Value> {
        let path_and_query = join_path_and_query(path, params);
        let key = cache_key(path, params);

        if let Some(entry) = self.cache_lookup(&key) {
            tracing::debug!(key = %key, "serving response from cache");
            return Ok(entry);
        }

        let shared = {
            let mut in_flight = lock(&self.inner.in_flight);
            if let Some(pending) = in_flight.get(&key) {
                tracing::debug!(key = %key, "attaching to in-flight request");
                pending.clone()
            } else {
                let this = self.clone();
                let task_key = key.clone();
                // The settlement bookkeeping lives inside the shared future
                // so it runs exactly once, no matter how many callers
                // awaited the result.
                let work: SharedFetch = async move {
                    let result = this.request_with_failover(&path_and_query, max_retries).await;
                    if let Ok(value) = &result {
                        lock(&this.inner.cache).insert(task_key.clone(), CacheEntry {
                            data:      value.clone(),
                            stored_at: Instant::now(),
                        });
                    }
                    lock(&this.inner.in_flight).remove(&task_key);
                    result
                }
                .boxed()
                .shared();
                in_flight.insert(key.clone(), work.clone());
                // Drive the request to completion even if every caller is
                // dropped, so an abandoned page load still populates the
                // cache for the next one.
                tokio::spawn({
                    let work = work.clone();
                    async move {
                        let _ = work.await;
                    }
                });
                work
            }
        };
        shared.await
    }

    fn cache_lookup(&self, key: &str) -> Option<serde_json::Value> {
        let cache = lock(&self.inner.cache);
        let entry = cache.get(key)?;
        if entry.stored_at.elapsed() < self.inner.config.cache_ttl {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    /// One attempt loop over the node list: rate-limit gate, request,
    /// classify the outcome, fail over where that can help.
    async fn request_with_failover(
        &self,
        path_and_query: &str,
        max_retries: u32,
    ) -> QueryResult<serde_json::Value> {
        let ceiling = self.inner.config.rate_limit_wait_ceiling;
        let mut last_error: Option<ApiError> = None;
        for attempt in 0..max_retries.max(1) {
            let retries_left = attempt + 1 < max_retries.max(1);

            let gate = lock(&self.inner.routing).rate_limit_gate(unix_now_ms(), ceiling);
            match gate {
                RateLimitGate::Ready => {}
                RateLimitGate::Wait(wait) => {
                    tracing::debug!(
                        wait_ms = wait.as_millis() as u64,
                        "rate limited; waiting for window reset"
                    );
                    tokio::time::sleep(wait).await;
                }
                RateLimitGate::Switch => {
                    tracing::warn!("rate-limit window too long; switching node");
                    lock(&self.inner.routing).switch_to_next_node(Instant::now());
                    continue;
                }
            }

            let (url, node_name) = {
                let routing = lock(&self.inner.routing);
                let node = routing.current_node();
                (
                    format!("{}{}", node.endpoint.url, path_and_query),
                    node.endpoint.name.clone(),
                )
            };

            let response = match self
                .inner
                .http
                .get(&url)
                .header(ACCEPT, "application/json")
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    // Network-level failure with no HTTP status to
                    // interpret.
                    let error = ApiError::UpstreamUnavailable {
                        message: format!("request to {node_name} failed: {err}"),
                        status:  None,
                    };
                    let mut routing = lock(&self.inner.routing);
                    routing.record_failure(Instant::now());
                    if retries_left {
                        tracing::warn!(node = %node_name, error = %err, "network error; failing over");
                        routing.switch_to_next_node(Instant::now());
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
            };

            if let Some(info) = rate_limit_from_headers(response.headers()) {
                lock(&self.inner.routing).current_node_mut().rate_limit = Some(info);
            }

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_from_headers(response.headers())
                    .unwrap_or(constants::DEFAULT_RETRY_AFTER_SECS);
                let error = ApiError::RateLimited {
                    node:        node_name.clone(),
                    retry_after: Some(retry_after),
                };
                let mut routing = lock(&self.inner.routing);
                routing.record_failure(Instant::now());
                routing.switch_to_next_node(Instant::now());
                if retries_left {
                    tracing::warn!(node = %node_name, "rate limited; failing over");
                    last_error = Some(error);
                    continue;
                }
                return Err(error);
            }

            if status.is_server_error() {
                let error = ApiError::UpstreamUnavailable {
                    message: format!("{node_name} returned HTTP {status}"),
                    status:  Some(status.as_u16()),
                };
                let mut routing = lock(&self.inner.routing);
                routing.record_failure(Instant::now());
                if retries_left {
                    tracing::warn!(node = %node_name, %status, "server error; failing over");
                    routing.switch_to_next_node(Instant::now());
                    last_error = Some(error);
                    continue;
                }
                return Err(error);
            }

            if !status.is_success() {
                // A request-shape error says nothing about node health.
                lock(&self.inner.routing).current_node_mut().consecutive_errors = 0;
                return Err(ApiError::UpstreamRejected {
                    status:  status.as_u16(),
                    message: status
                        .canonical_reason()
                        .unwrap_or("request rejected")
                        .to_string(),
                });
            }

            lock(&self.inner.routing).current_node_mut().consecutive_errors = 0;
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|err| ApiError::Parse(err.to_string()));
        }
        Err(last_error.unwrap_or(ApiError::UpstreamUnavailable {
            message: "all retry attempts failed".to_string(),
            status:  None,
        }))
    }

    async fn fetch_as<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> QueryResult<T> {
        let value = self.fetch(path, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// GET `/api/validators`.
    pub async fn get_validators(&self) -> QueryResult<ValidatorsResponse> {
        self.fetch_as("/api/validators", &[]).await
    }

    /// GET `/api/consensus`.
    pub async fn get_consensus(&self) -> QueryResult<ConsensusResponse> {
        self.fetch_as("/api/consensus", &[]).await
    }

    /// GET `/api/super-validators`.
    pub async fn get_super_validators(&self) -> QueryResult<SuperValidatorsResponse> {
        self.fetch_as("/api/super-validators", &[]).await
    }

    /// GET `/api/v2/updates?limit=...&nextToken=...`.
    pub async fn get_updates(
        &self,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> QueryResult<UpdatesResponse> {
        let limit = limit.map(|l| l.to_string());
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(limit) = limit.as_deref() {
            params.push(("limit", limit));
        }
        if let Some(token) = next_token {
            params.push(("nextToken", token));
        }
        self.fetch_as("/api/v2/updates", &params).await
    }

    /// GET `/api/v2/updates/:updateId/:recordTime` — single update detail.
    /// The record time is percent-encoded into the path.
    pub async fn get_update_detail(
        &self,
        update_id: &str,
        record_time: &str,
    ) -> QueryResult<serde_json::Value> {
        let path = format!(
            "/api/v2/updates/{}/{}",
            encode_segment(update_id),
            encode_segment(record_time)
        );
        self.fetch(&path, &[]).await
    }

    /// GET `/api/governance`.
    pub async fn get_governance(&self) -> QueryResult<GovernanceResponse> {
        self.fetch_as("/api/governance", &[]).await
    }

    /// GET `/api/overview`.
    pub async fn get_overview(&self) -> QueryResult<OverviewResponse> {
        self.fetch_as("/api/overview", &[]).await
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Normalized cache key: path plus the query pairs sorted by key, so that
/// parameter order does not split the cache.
fn cache_key(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let mut pairs: Vec<_> = params.to_vec();
    pairs.sort();
    let query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode_segment(k), encode_segment(v)))
        .collect();
    format!("{}?{}", path, query.join("&"))
}

fn join_path_and_query(path: &str, params: &[(&str, &str)]) -> String {
    // The request URL reuses the normalized key so the URL on the wire and
    // the cache key always agree.
    cache_key(path, params)
}

fn rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let parse_i64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
    };
    let remaining = parse_i64("X-RateLimit-Remaining")?;
    let reset = parse_i64("X-RateLimit-Reset").filter(|r| *r >= 0)? as u64;
    let limit = parse_i64("X-RateLimit-Limit")?;
    Some(RateLimitInfo {
        remaining,
        reset,
        limit,
    })
}

fn retry_after_from_headers(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}
