//! Upstream endpoint configuration and the error taxonomy for queries
//! against the scan API. Return values of all queries are parsed and
//! wrapped in structured values.
use thiserror::Error;

/// A candidate upstream endpoint the client can route requests to.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Base URL of the node, without a trailing slash.
    pub url:      String,
    /// Display name used in logs and error messages.
    pub name:     String,
    /// Selection priority. Lower values are preferred.
    pub priority: u32,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, name: impl Into<String>, priority: u32) -> Self {
        let mut url = url.into();
        while url.ends_with('/') {
            url.pop();
        }
        Self {
            url,
            name: name.into(),
            priority,
        }
    }
}

#[derive(Debug, Clone, Error)]
/// Connection, rate-limit, or response parsing error. Errors are cheap to
/// clone so that deduplicated concurrent callers all observe the same
/// failure.
pub enum ApiError {
    /// The upstream returned 429 and the retry budget is exhausted.
    #[error("Rate limit exceeded on {node}")]
    RateLimited {
        /// Name of the node that reported the limit.
        node:        String,
        /// Suggested wait before retrying, in seconds.
        retry_after: Option<u64>,
    },
    /// A 5xx response or a network-level failure. Retried with node
    /// failover until the retry budget runs out.
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable {
        message: String,
        status:  Option<u16>,
    },
    /// Any other non-2xx response. Retrying an identical malformed request
    /// cannot succeed, so this is surfaced immediately.
    #[error("Upstream rejected the request with HTTP {status}: {message}")]
    UpstreamRejected { status: u16, message: String },
    /// The response body could not be decoded.
    #[error("Error parsing response: {0}")]
    Parse(String),
}

impl ApiError {
    /// The HTTP status attached to the error, where one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited { .. } => Some(429),
            ApiError::UpstreamUnavailable { status, .. } => *status,
            ApiError::UpstreamRejected { status, .. } => Some(*status),
            ApiError::Parse(_) => None,
        }
    }

    /// Whether the error came from an upstream rate limit.
    pub fn is_rate_limited(&self) -> bool { matches!(self, ApiError::RateLimited { .. }) }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self { Self::Parse(err.to_string()) }
}

/// Result of a scan API query. This is a simple alias for
/// [std::Result](https://doc.rust-lang.org/std/result/enum.Result.html)
/// that fixes the error type to be [`ApiError`].
pub type QueryResult<A> = Result<A, ApiError>;
