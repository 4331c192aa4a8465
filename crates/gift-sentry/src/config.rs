//! Engine tuning.
//!
//! A named profile supplies defaults; every knob can then be overridden
//! individually through `GIFT_SENTRY_*` environment variables.

use crate::types::Index;
use std::time::Duration;

/// Named set of tuning defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Balanced,
    Aggressive,
    Conservative,
}

impl Profile {
    /// Parse a profile name, falling back to [`Profile::Balanced`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "aggressive" => Self::Aggressive,
            "conservative" => Self::Conservative,
            _ => Self::Balanced,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
            Self::Conservative => "conservative",
        }
    }
}

/// Every fixed constant the engine runs with.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub profile: Profile,
    /// Process-wide cap on simultaneous in-flight probes.
    pub max_concurrent_probes: usize,
    /// Per-attempt probe timeout.
    pub probe_timeout: Duration,
    /// Attempts per probe before it is reported as exhausted.
    pub probe_attempts: u32,
    /// Retry delay unit; attempt `n` waits `n × retry_base`.
    pub retry_base: Duration,
    /// Consecutive misses between frontier re-checks.
    pub reanchor_every: u32,
    /// Distance between cursor and frontier that forces a re-anchor.
    pub drift_threshold: Index,
    /// Pause after every miss.
    pub miss_pacing: Duration,
    /// Pause after a failed dispatch before it is re-attempted.
    pub dispatch_retry: Duration,
    /// Minimum interval between dispatches of one sequence.
    pub min_send_interval: Duration,
    /// Pause after a failed walker iteration.
    pub iteration_cooldown: Duration,
    /// Lifetime of a cached frontier estimate.
    pub frontier_ttl: Duration,
    /// Maximum number of cached frontier estimates.
    pub frontier_cache_capacity: usize,
    /// Lower bound of the frontier binary search.
    pub search_low: Index,
    /// Upper bound of the frontier binary search.
    pub search_high: Index,
    /// The search stops once `high - low` is at most this.
    pub search_granularity: Index,
    /// Pause between binary search probes.
    pub search_pacing: Duration,
    /// Interval between premarket scan passes.
    pub premarket_interval: Duration,
    /// Delay between walker spawns at startup.
    pub spawn_stagger: Duration,
}

impl EngineConfig {
    /// Defaults for a profile, without any environment overrides.
    pub fn for_profile(profile: Profile) -> Self {
        let balanced = Self {
            profile,
            max_concurrent_probes: 50,
            probe_timeout: Duration::from_secs(15),
            probe_attempts: 3,
            retry_base: Duration::from_millis(500),
            reanchor_every: 100,
            drift_threshold: 1000,
            miss_pacing: Duration::from_millis(10),
            dispatch_retry: Duration::from_secs(1),
            min_send_interval: Duration::from_millis(100),
            iteration_cooldown: Duration::from_secs(5),
            frontier_ttl: Duration::from_secs(300),
            frontier_cache_capacity: 1024,
            search_low: 1,
            search_high: 1_000_000,
            search_granularity: 100,
            search_pacing: Duration::from_millis(10),
            premarket_interval: Duration::from_secs(300),
            spawn_stagger: Duration::from_millis(50),
        };
        match profile {
            Profile::Balanced => balanced,
            Profile::Aggressive => Self {
                max_concurrent_probes: 80,
                retry_base: Duration::from_millis(250),
                reanchor_every: 50,
                miss_pacing: Duration::from_millis(5),
                dispatch_retry: Duration::from_millis(500),
                premarket_interval: Duration::from_secs(120),
                ..balanced
            },
            Profile::Conservative => Self {
                max_concurrent_probes: 20,
                retry_base: Duration::from_secs(1),
                reanchor_every: 200,
                miss_pacing: Duration::from_millis(50),
                dispatch_retry: Duration::from_secs(2),
                premarket_interval: Duration::from_secs(600),
                ..balanced
            },
        }
    }

    /// Profile from `GIFT_SENTRY_PROFILE` plus per-knob overrides.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = lookup("GIFT_SENTRY_PROFILE")
            .map(|raw| Profile::parse(&raw))
            .unwrap_or(Profile::Balanced);
        let d = Self::for_profile(profile);
        let num = |name: &str, default: u64| -> u64 {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let millis = |name: &str, default: Duration| -> Duration {
            Duration::from_millis(num(name, default.as_millis() as u64))
        };
        let secs = |name: &str, default: Duration| -> Duration {
            Duration::from_secs(num(name, default.as_secs()))
        };

        Self {
            profile,
            max_concurrent_probes: num(
                "GIFT_SENTRY_MAX_CONCURRENT_PROBES",
                d.max_concurrent_probes as u64,
            )
            .max(1) as usize,
            probe_timeout: millis("GIFT_SENTRY_PROBE_TIMEOUT_MS", d.probe_timeout),
            probe_attempts: num("GIFT_SENTRY_PROBE_ATTEMPTS", d.probe_attempts as u64)
                .clamp(1, 10) as u32,
            retry_base: millis("GIFT_SENTRY_RETRY_BASE_MS", d.retry_base),
            reanchor_every: num("GIFT_SENTRY_REANCHOR_EVERY", d.reanchor_every as u64)
                .clamp(1, u32::MAX as u64) as u32,
            drift_threshold: num("GIFT_SENTRY_DRIFT_THRESHOLD", d.drift_threshold),
            miss_pacing: millis("GIFT_SENTRY_MISS_PACING_MS", d.miss_pacing),
            dispatch_retry: millis("GIFT_SENTRY_DISPATCH_RETRY_MS", d.dispatch_retry),
            min_send_interval: millis("GIFT_SENTRY_MIN_SEND_INTERVAL_MS", d.min_send_interval),
            iteration_cooldown: millis("GIFT_SENTRY_ITERATION_COOLDOWN_MS", d.iteration_cooldown),
            frontier_ttl: secs("GIFT_SENTRY_FRONTIER_TTL_SECS", d.frontier_ttl),
            premarket_interval: secs("GIFT_SENTRY_PREMARKET_INTERVAL_SECS", d.premarket_interval)
                .max(Duration::from_secs(1)),
            ..d
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Balanced)
    }
}
