//! Pool lifecycle types.
//!
//! This module defines the states a managed pool moves through, the policies
//! that govern re-initialization and idle-connection faults, and the outcome
//! of [`LifecycleManager::ensure_pool`](crate::LifecycleManager::ensure_pool).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Default maximum pool age before mandatory recreation.
pub const DEFAULT_HEALTH_WINDOW: Duration = Duration::from_millis(30_000);

/// Default upper bound of the randomized backoff between retries.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(50);

/// Environment variable overriding the health window, in milliseconds.
pub const ENV_MAX_AGE: &str = "DBPOOL_MAXAGE";

/// Environment variable enabling verbose lifecycle tracing.
pub const ENV_DEBUG: &str = "PG_DEBUG";

/// Lifecycle state of the managed pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// No pool has been built, or the last one was discarded.
    Absent,
    /// A pool younger than the health window is available.
    Live,
    /// The current pool is at or past the health window.
    Stale,
}

impl PoolPhase {
    /// Classify a pool by its age.
    #[must_use]
    pub fn classify(age: Option<Duration>, health_window: Duration) -> Self {
        match age {
            None => Self::Absent,
            Some(age) if age >= health_window => Self::Stale,
            Some(_) => Self::Live,
        }
    }

    /// Check if a pool can be handed out as is.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// How concurrent callers coordinate (re)initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitStrategy {
    /// One caller builds behind an async mutex; the others await it and then
    /// observe the live pool.
    #[default]
    Coalesced,
    /// Callers race. Losers of a stale-pool teardown get
    /// [`Ensured::Wait`] and are expected to back off with
    /// [`wait_for_pool`](crate::LifecycleManager::wait_for_pool).
    BestEffort,
}

/// What to do when the current pool reports a fault on an idle connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Log the fault and exit the process with status 1, letting the
    /// platform replace the execution environment.
    #[default]
    Terminate,
    /// Drop the pool; the next caller builds a fresh one.
    Discard,
}

/// Behavioral options of a [`LifecycleManager`](crate::LifecycleManager).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct LifecycleOptions {
    /// Maximum pool age before mandatory recreation.
    pub health_window: Duration,
    /// Upper bound of the randomized backoff.
    pub jitter_max: Duration,
    /// Initialization strategy.
    pub strategy: InitStrategy,
    /// Idle-connection fault policy.
    pub fault_policy: FaultPolicy,
    /// Log state transitions at `info` instead of `debug`.
    pub verbose: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            health_window: DEFAULT_HEALTH_WINDOW,
            jitter_max: DEFAULT_JITTER_MAX,
            strategy: InitStrategy::default(),
            fault_policy: FaultPolicy::default(),
            verbose: false,
        }
    }
}

impl LifecycleOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `DBPOOL_MAXAGE` and `PG_DEBUG` from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary variable lookup.
    ///
    /// An unparseable `DBPOOL_MAXAGE` is ignored with a warning.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        if let Some(raw) = lookup(ENV_MAX_AGE) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => options.health_window = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid {ENV_MAX_AGE}"),
            }
        }
        if let Some(raw) = lookup(ENV_DEBUG) {
            options.verbose = matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1");
        }
        options
    }

    /// Set the health window.
    #[must_use]
    pub fn health_window(mut self, window: Duration) -> Self {
        self.health_window = window;
        self
    }

    /// Set the jitter bound.
    #[must_use]
    pub fn jitter_max(mut self, max: Duration) -> Self {
        self.jitter_max = max;
        self
    }

    /// Set the initialization strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: InitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the fault policy.
    #[must_use]
    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Enable or disable verbose transition logging.
    #[must_use]
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }
}

/// Outcome of [`LifecycleManager::ensure_pool`](crate::LifecycleManager::ensure_pool).
#[derive(Debug)]
pub enum Ensured<P> {
    /// The pool is ready for use.
    Ready(Arc<P>),
    /// Another caller is replacing the pool; back off and read the current
    /// pool afterwards.
    Wait,
}

impl<P> Ensured<P> {
    /// Check if this is the wait signal.
    #[must_use]
    pub fn is_wait(&self) -> bool {
        matches!(self, Self::Wait)
    }

    /// Get the pool, if ready.
    #[must_use]
    pub fn ready(self) -> Option<Arc<P>> {
        match self {
            Self::Ready(pool) => Some(pool),
            Self::Wait => None,
        }
    }
}

impl<P> Clone for Ensured<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Ready(pool) => Self::Ready(Arc::clone(pool)),
            Self::Wait => Self::Wait,
        }
    }
}

/// A uniformly random delay in `[0, max)`, at millisecond granularity.
#[must_use]
pub fn jitter(max: Duration) -> Duration {
    let bound = max.as_millis() as u64;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..bound))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_classification() {
        let window = Duration::from_secs(30);
        assert_eq!(PoolPhase::classify(None, window), PoolPhase::Absent);
        assert_eq!(
            PoolPhase::classify(Some(Duration::from_secs(29)), window),
            PoolPhase::Live
        );
        assert_eq!(PoolPhase::classify(Some(window), window), PoolPhase::Stale);
        assert!(PoolPhase::Live.is_usable());
        assert!(!PoolPhase::Stale.is_usable());
    }

    #[test]
    fn test_default_options() {
        let options = LifecycleOptions::default();
        assert_eq!(options.health_window, Duration::from_millis(30_000));
        assert_eq!(options.jitter_max, Duration::from_millis(50));
        assert_eq!(options.strategy, InitStrategy::Coalesced);
        assert_eq!(options.fault_policy, FaultPolicy::Terminate);
        assert!(!options.verbose);
    }

    #[test]
    fn test_options_from_lookup() {
        let options = LifecycleOptions::from_lookup(|key| match key {
            "DBPOOL_MAXAGE" => Some("5000".into()),
            "PG_DEBUG" => Some("TRUE".into()),
            _ => None,
        });
        assert_eq!(options.health_window, Duration::from_millis(5000));
        assert!(options.verbose);

        let options = LifecycleOptions::from_lookup(|key| match key {
            "DBPOOL_MAXAGE" => Some("soon".into()),
            "PG_DEBUG" => Some("0".into()),
            _ => None,
        });
        assert_eq!(options.health_window, DEFAULT_HEALTH_WINDOW);
        assert!(!options.verbose);
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(Duration::from_millis(50)) < Duration::from_millis(50));
        }
    }

    #[test]
    fn test_ensured_accessors() {
        let ready = Ensured::Ready(Arc::new(7u8));
        assert!(!ready.is_wait());
        assert_eq!(*ready.clone().ready().unwrap(), 7);
        assert!(Ensured::<u8>::Wait.ready().is_none());
    }
}
