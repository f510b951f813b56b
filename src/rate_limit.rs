use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// Actions that can be throttled. Views are not limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Upload,
    Message,
    Like,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Upload => "upload",
            Action::Message => "message",
            Action::Like => "like",
        })
    }
}

/// Sliding window limiter held in process memory, one window per (action, actor).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    windows: Arc<DashMap<(Action, Uuid), VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { windows: Arc::new(DashMap::new()), enabled }
    }

    /// Records an attempt and returns whether it fits in the window.
    pub fn check(&self, action: Action, actor: Uuid, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut hits = self.windows.entry((action, actor)).or_default();
        while hits.front().is_some_and(|t| now.duration_since(*t) >= window) {
            hits.pop_front();
        }
        if hits.len() >= limit {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Drops actors with no attempt inside `window`.
    pub fn prune(&self, window: Duration) {
        let now = Instant::now();
        self.windows.retain(|_, hits| hits.back().is_some_and(|t| now.duration_since(*t) < window));
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub upload_limit: usize,
    pub upload_window: Duration,
    pub message_limit: usize,
    pub message_window: Duration,
    pub like_limit: usize,
    pub like_window: Duration,
}

impl RateLimitConfig {
    /// Limits from `RL_*` variables; windows are in seconds.
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn secs_env(name: &str, default: u64) -> Duration {
            Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default))
        }
        Self {
            upload_limit: usize_env("RL_UPLOAD_LIMIT", 10),
            upload_window: secs_env("RL_UPLOAD_WINDOW", 3600),
            message_limit: usize_env("RL_MESSAGE_LIMIT", 30),
            message_window: secs_env("RL_MESSAGE_WINDOW", 60),
            like_limit: usize_env("RL_LIKE_LIMIT", 60),
            like_window: secs_env("RL_LIKE_WINDOW", 60),
        }
    }

    pub fn limit_for(&self, action: Action) -> (usize, Duration) {
        match action {
            Action::Upload => (self.upload_limit, self.upload_window),
            Action::Message => (self.message_limit, self.message_window),
            Action::Like => (self.like_limit, self.like_window),
        }
    }

    pub fn longest_window(&self) -> Duration {
        self.upload_window.max(self.message_window).max(self.like_window)
    }
}

/// Handler-facing guard keyed by the acting user.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }

    pub fn allow(&self, action: Action, actor: Uuid) -> bool {
        let (limit, window) = self.cfg.limit_for(action);
        let allowed = self.limiter.check(action, actor, limit, window);
        if !allowed {
            tracing::info!(%actor, %action, limit, "rate limited");
        }
        allowed
    }

    pub fn allow_upload(&self, actor: Uuid) -> bool {
        self.allow(Action::Upload, actor)
    }

    pub fn allow_message(&self, actor: Uuid) -> bool {
        self.allow(Action::Message, actor)
    }

    pub fn allow_like(&self, actor: Uuid) -> bool {
        self.allow(Action::Like, actor)
    }
}
