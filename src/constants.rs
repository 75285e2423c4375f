use std::time::Duration;

/// How long a successful response stays valid in the client cache.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(120_000);

/// Default number of attempts for a single logical request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Longest the client will sleep waiting for a rate-limit window to reset
/// before switching to another node instead.
pub const DEFAULT_RATE_LIMIT_WAIT_CEILING: Duration = Duration::from_millis(60_000);

/// Default bound on a single request attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A node is skipped during failover once it has accumulated this many
/// consecutive errors.
pub const NODE_ERROR_THRESHOLD: u32 = 5;

/// A skipped node becomes eligible again once its last error is older than
/// this cooldown.
pub const NODE_ERROR_COOLDOWN: Duration = Duration::from_millis(60_000);

/// Retry-after hint reported when the upstream sends a 429 without a
/// `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Page size used when paginating the updates listing.
pub const UPDATES_PAGE_SIZE: u32 = 500;

/// Absolute ceiling on the number of update pages fetched for one query.
pub const UPDATES_MAX_PAGES: u32 = 25;

/// Pause between update pages to stay under upstream rate limits.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(400);

/// Nominal number of mining rounds per day, used to normalize rewards.
pub const ROUNDS_PER_DAY: u64 = 144;

/// Default cap on records returned by bulk range queries.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 2_000;
