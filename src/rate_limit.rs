/// Rate limiting module for throttling anonymous writes
///
/// Implements sliding window rate limiting using in-memory storage (DashMap).
/// Each abuse-prone action is checked once per identity dimension (session,
/// IP, fingerprint) and rejected if any one of them is exhausted.
///
/// This state is process-local and resets on restart. It is a soft throttle,
/// not a source of truth for bans. Behind NAT many legitimate clients share an
/// IP and can throttle each other through the IP dimension.
///
/// Limits are configurable via database settings and support hot reload.
///
/// # Example Usage
///
/// ```rust,ignore
/// use crate::rate_limit::LimitedAction;
///
/// state.throttle.check(LimitedAction::Post, &identity)?;
/// ```
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::identity::Identity;

/// Error returned when rate limit is exceeded
#[derive(Debug, Clone)]
pub struct RateLimitError {
    /// Number of seconds until the rate limit resets
    pub retry_after_seconds: u64,
}

/// Swappable limiter backend. The in-memory implementation below is per
/// process; a shared store can implement the same trait for multi-instance
/// deployments.
pub trait RateLimiter: Send + Sync {
    /// Admit one request against every key, or none of them.
    ///
    /// The request is recorded under all keys only if every key is within
    /// `max_requests` for `window`. Otherwise nothing is recorded and the
    /// longest wait among the exhausted keys is returned.
    fn check_keys(
        &self,
        keys: &[String],
        max_requests: usize,
        window: Duration,
    ) -> Result<(), RateLimitError>;

    /// Drop keys with no requests inside `max_window`.
    fn cleanup_old_entries(&self, max_window: Duration);

    fn tracked_keys(&self) -> usize;
}

/// Rate limiter using in-memory storage
pub struct SlidingWindowLimiter {
    /// Map of (action:dimension:identifier) -> Request timestamps
    requests: DashMap<String, Vec<Instant>>,
    /// Serializes multi-key checks so two requests can't both pass the check
    /// phase before either records.
    gate: Mutex<()>,
}

impl SlidingWindowLimiter {
    /// Create a new rate limiter
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            gate: Mutex::new(()),
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check_keys(
        &self,
        keys: &[String],
        max_requests: usize,
        window: Duration,
    ) -> Result<(), RateLimitError> {
        let _guard = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let mut retry_after: Option<Duration> = None;

        for key in keys {
            let mut entry = self.requests.entry(key.clone()).or_default();

            // Remove requests outside the time window (sliding window)
            entry.retain(|&timestamp| now.duration_since(timestamp) < window);

            if entry.len() >= max_requests {
                // How long until the oldest request leaves the window
                let wait = entry
                    .first()
                    .map(|&oldest| window.saturating_sub(now.duration_since(oldest)))
                    .unwrap_or(window);
                retry_after = Some(retry_after.map_or(wait, |current| current.max(wait)));
            }
        }

        if let Some(wait) = retry_after {
            return Err(RateLimitError {
                retry_after_seconds: wait.as_secs() + 1, // Round up
            });
        }

        for key in keys {
            self.requests.entry(key.clone()).or_default().push(now);
        }

        Ok(())
    }

    fn cleanup_old_entries(&self, max_window: Duration) {
        let now = Instant::now();
        self.requests.retain(|_, timestamps| {
            timestamps.retain(|&timestamp| now.duration_since(timestamp) < max_window);
            !timestamps.is_empty()
        });
    }

    fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}

/// Throttled write actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedAction {
    Post,
    Comment,
    Report,
    AdminLogin,
}

impl LimitedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Report => "report",
            Self::AdminLogin => "login",
        }
    }
}

/// Rate limit configuration loaded from database settings
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitPolicy {
    pub post_max: usize,
    pub post_window: Duration,
    pub comment_max: usize,
    pub comment_window: Duration,
    pub report_max: usize,
    pub report_window: Duration,
    pub login_max: usize,
    pub login_window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            post_max: 2,
            post_window: Duration::from_secs(30 * 60),
            comment_max: 1,
            comment_window: Duration::from_secs(10),
            report_max: 1,
            report_window: Duration::from_secs(60),
            login_max: 5,
            login_window: Duration::from_secs(300),
        }
    }
}

impl RateLimitPolicy {
    /// Load rate limit configuration from the Config settings
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let max = |action: &str, default: usize| {
            config
                .get_int_or(&format!("rate_limit.{}.max_requests", action), default as i64)
                .max(1) as usize
        };
        let window = |action: &str, default: Duration| {
            Duration::from_secs(
                config
                    .get_int_or(
                        &format!("rate_limit.{}.window_seconds", action),
                        default.as_secs() as i64,
                    )
                    .max(1) as u64,
            )
        };

        Self {
            post_max: max("post", defaults.post_max),
            post_window: window("post", defaults.post_window),
            comment_max: max("comment", defaults.comment_max),
            comment_window: window("comment", defaults.comment_window),
            report_max: max("report", defaults.report_max),
            report_window: window("report", defaults.report_window),
            login_max: max("login", defaults.login_max),
            login_window: window("login", defaults.login_window),
        }
    }

    pub fn limit_for(&self, action: LimitedAction) -> (usize, Duration) {
        match action {
            LimitedAction::Post => (self.post_max, self.post_window),
            LimitedAction::Comment => (self.comment_max, self.comment_window),
            LimitedAction::Report => (self.report_max, self.report_window),
            LimitedAction::AdminLogin => (self.login_max, self.login_window),
        }
    }

    fn longest_window(&self) -> Duration {
        [
            self.post_window,
            self.comment_window,
            self.report_window,
            self.login_window,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

/// Applies the current policy to identities.
pub struct Throttle {
    limiter: Arc<dyn RateLimiter>,
    policy: ArcSwap<RateLimitPolicy>,
}

impl Throttle {
    pub fn new(limiter: Arc<dyn RateLimiter>, policy: RateLimitPolicy) -> Self {
        Self {
            limiter,
            policy: ArcSwap::from_pointee(policy),
        }
    }

    /// Reload rate limits from config (call when rate limit settings are changed)
    pub fn reload(&self, config: &Config) {
        self.policy.store(Arc::new(RateLimitPolicy::from_config(config)));
        log::info!("Rate limit configuration reloaded");
    }

    /// Get the current rate limit configuration
    pub fn policy(&self) -> Arc<RateLimitPolicy> {
        self.policy.load_full()
    }

    /// Check one action against every identity dimension that is present.
    /// Most restrictive wins.
    pub fn check(&self, action: LimitedAction, identity: &Identity) -> Result<(), RateLimitError> {
        let (max_requests, window) = self.policy.load().limit_for(action);
        let name = action.as_str();

        let mut keys = vec![
            format!("{}:session:{}", name, identity.session_id),
            format!("{}:ip:{}", name, identity.client_ip),
        ];
        if let Some(fingerprint) = &identity.fingerprint {
            keys.push(format!("{}:fp:{}", name, fingerprint));
        }

        self.limiter.check_keys(&keys, max_requests, window)
    }

    /// Check a login attempt, keyed by IP only.
    pub fn check_login(&self, ip: &str) -> Result<(), RateLimitError> {
        let (max_requests, window) = self.policy.load().limit_for(LimitedAction::AdminLogin);
        self.limiter
            .check_keys(&[format!("login:ip:{}", ip)], max_requests, window)
    }

    pub fn cleanup(&self) {
        self.limiter.cleanup_old_entries(self.policy.load().longest_window());
        log::debug!("Rate limiter tracking {} keys", self.limiter.tracked_keys());
    }
}
