//! Self-healing pool lifecycle manager.
//!
//! The manager owns at most one driver pool at a time and recycles it once
//! it outlives the health window, so connections authenticated with
//! short-lived tokens are replaced before the server rejects them. A stale
//! pool is always ended before its replacement is built.
//!
//! ```text
//!            build                  age >= window
//! Absent ───────────▶ Live ───────────────────────▶ Stale
//!   ▲                  │ fault (Discard)             │ end + jitter
//!   └──────────────────┴─────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use lambda_pg_auth::TokenProvider;
use lambda_pg_types::{DbPool, PoolDriver, PoolFault};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{PoolConfig, PoolConfigPatch};
use crate::error::PoolError;
use crate::lifecycle::{Ensured, FaultPolicy, InitStrategy, LifecycleOptions, PoolPhase, jitter};

/// Log a lifecycle transition at `info` in verbose mode, `debug` otherwise.
macro_rules! transition {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

struct Current<P> {
    pool: Arc<P>,
    created_at: Instant,
    generation: u64,
    /// Configuration epoch the pool was built from.
    epoch: u64,
}

impl<P> Current<P> {
    fn age(&self) -> std::time::Duration {
        Instant::now().saturating_duration_since(self.created_at)
    }
}

struct Inner<D: PoolDriver> {
    driver: D,
    config: Mutex<PoolConfig>,
    tokens: Option<Arc<dyn TokenProvider>>,
    options: LifecycleOptions,
    slot: Mutex<Option<Current<D::Pool>>>,
    initializing: AtomicUsize,
    init_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    /// Bumped by every `reconfigure`, under the `config` lock.
    epoch: AtomicU64,
    closed: AtomicBool,
}

/// Marks the manager as initializing for as long as it is alive.
struct InitGuard<'a> {
    count: &'a AtomicUsize,
}

impl<'a> InitGuard<'a> {
    fn raise(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self { count }
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Inspection<P> {
    Live(Arc<P>),
    Stale(u64),
    Absent,
}

/// Builder for [`LifecycleManager`].
pub struct LifecycleManagerBuilder<D: PoolDriver> {
    driver: D,
    config: PoolConfig,
    tokens: Option<Arc<dyn TokenProvider>>,
    options: LifecycleOptions,
}

impl<D: PoolDriver> LifecycleManagerBuilder<D> {
    /// Set the pool configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the provider used when no static password is configured.
    #[must_use]
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(provider);
        self
    }

    /// Set the lifecycle options.
    #[must_use]
    pub fn options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the manager. No pool is created until first use.
    pub fn build(self) -> Result<LifecycleManager<D>, PoolError> {
        self.config.validate()?;
        Ok(LifecycleManager {
            inner: Arc::new(Inner {
                driver: self.driver,
                config: Mutex::new(self.config),
                tokens: self.tokens,
                options: self.options,
                slot: Mutex::new(None),
                initializing: AtomicUsize::new(0),
                init_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

/// Owns the current pool and replaces it when it goes stale or faults.
///
/// Cloning the manager is cheap and shares the pool.
///
/// # Example
///
/// ```rust,ignore
/// use lambda_pg_pool::{Ensured, LifecycleManager, PoolConfig};
///
/// let manager = LifecycleManager::builder(driver)
///     .config(PoolConfig::from_env()?)
///     .token_provider(Arc::new(RdsIamSigner::new()))
///     .build()?;
///
/// match manager.ensure_pool().await? {
///     Ensured::Ready(pool) => { /* pool.connect().await ... */ }
///     Ensured::Wait => manager.wait_for_pool().await,
/// }
/// ```
pub struct LifecycleManager<D: PoolDriver> {
    inner: Arc<Inner<D>>,
}

impl<D: PoolDriver> Clone for LifecycleManager<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: PoolDriver> std::fmt::Debug for LifecycleManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("phase", &self.phase())
            .field("generation", &self.generation())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl<D: PoolDriver> LifecycleManager<D> {
    /// Create a builder around a driver.
    pub fn builder(driver: D) -> LifecycleManagerBuilder<D> {
        LifecycleManagerBuilder {
            driver,
            config: PoolConfig::default(),
            tokens: None,
            options: LifecycleOptions::default(),
        }
    }

    /// Create a manager with default options and no token provider.
    pub fn new(driver: D, config: PoolConfig) -> Result<Self, PoolError> {
        Self::builder(driver).config(config).build()
    }

    /// Get the lifecycle options.
    #[must_use]
    pub fn options(&self) -> &LifecycleOptions {
        &self.inner.options
    }

    /// Get a copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> PoolConfig {
        self.inner.config.lock().clone()
    }

    /// Get the underlying driver.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> PoolPhase {
        let slot = self.inner.slot.lock();
        match slot.as_ref() {
            Some(current) if current.epoch != self.inner.epoch.load(Ordering::SeqCst) => {
                PoolPhase::Stale
            }
            current => PoolPhase::classify(
                current.map(Current::age),
                self.inner.options.health_window,
            ),
        }
    }

    /// Generation of the most recently built pool (0 before the first build).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Check if some caller is inside [`ensure_pool`](Self::ensure_pool).
    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.inner.initializing.load(Ordering::SeqCst) > 0
    }

    /// Check if [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The raw current pool, without any staleness check.
    #[must_use]
    pub fn current(&self) -> Option<Arc<D::Pool>> {
        self.inner
            .slot
            .lock()
            .as_ref()
            .map(|current| Arc::clone(&current.pool))
    }

    /// Return a usable pool, building or replacing it as needed.
    ///
    /// A live pool is returned as is (the same `Arc` on every call). A stale
    /// pool is ended and, after a jittered pause, replaced. Under
    /// [`InitStrategy::BestEffort`] a caller that loses the teardown race, or
    /// whose teardown fails, gets [`Ensured::Wait`].
    pub async fn ensure_pool(&self) -> Result<Ensured<D::Pool>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        match self.inner.options.strategy {
            InitStrategy::Coalesced => self.ensure_coalesced().await,
            InitStrategy::BestEffort => self.ensure_best_effort().await,
        }
    }

    /// Sleep in jittered steps until no caller is initializing.
    pub async fn wait_for_pool(&self) {
        while self.is_initializing() {
            let pause = jitter(self.inner.options.jitter_max)
                .max(std::time::Duration::from_millis(1));
            tokio::time::sleep(pause).await;
        }
    }

    /// End and clear the current pool if it is still `pool`.
    ///
    /// Returns `false` if the slot already holds a different pool (or none).
    pub async fn discard(&self, pool: &Arc<D::Pool>) -> bool {
        let taken = {
            let mut slot = self.inner.slot.lock();
            match slot.as_ref() {
                Some(current) if Arc::ptr_eq(&current.pool, pool) => slot.take(),
                _ => None,
            }
        };
        match taken {
            Some(current) => {
                transition!(
                    self.inner.options.verbose,
                    generation = current.generation,
                    "discarding pool"
                );
                end_quietly(&current.pool, current.generation).await;
                true
            }
            None => false,
        }
    }

    /// Merge `patch` into the configuration and rebuild in the background.
    ///
    /// The current pool reference is dropped immediately (and ended in a
    /// background task), then a new pool is initialized by a spawned task.
    /// A build already in flight from the previous configuration is never
    /// installed. Failures of the spawned task are logged, never returned;
    /// the handle only exists so callers that want to can await completion.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn reconfigure(&self, patch: PoolConfigPatch) -> JoinHandle<()> {
        tracing::debug!(?patch, "reconfiguring pool");
        {
            let mut config = self.inner.config.lock();
            config.apply(patch);
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }

        let old = self.inner.slot.lock().take();
        if let Some(old) = old {
            tokio::spawn(async move {
                end_quietly(&old.pool, old.generation).await;
            });
        }

        let manager = self.clone();
        tokio::spawn(async move {
            match manager.ensure_pool().await {
                Ok(Ensured::Ready(_)) => {
                    transition!(
                        manager.inner.options.verbose,
                        generation = manager.generation(),
                        "pool rebuilt after reconfiguration"
                    );
                }
                Ok(Ensured::Wait) => {
                    tracing::debug!("pool rebuild after reconfiguration deferred");
                }
                Err(e) => {
                    tracing::error!(error = %e, "pool rebuild after reconfiguration failed");
                }
            }
        })
    }

    /// End the current pool and refuse further use.
    ///
    /// A pool whose build is in flight is ended as soon as it completes.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let old = self.inner.slot.lock().take();
        if let Some(old) = old {
            end_quietly(&old.pool, old.generation).await;
        }
        tracing::info!("pool manager closed");
    }

    fn inspect(&self) -> Inspection<D::Pool> {
        let slot = self.inner.slot.lock();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        match slot.as_ref() {
            None => Inspection::Absent,
            Some(current)
                if current.epoch != epoch
                    || current.age() >= self.inner.options.health_window =>
            {
                Inspection::Stale(current.generation)
            }
            Some(current) => Inspection::Live(Arc::clone(&current.pool)),
        }
    }

    fn take_generation(&self, generation: u64) -> Option<Current<D::Pool>> {
        let mut slot = self.inner.slot.lock();
        match slot.as_ref() {
            Some(current) if current.generation == generation => slot.take(),
            _ => None,
        }
    }

    async fn ensure_coalesced(&self) -> Result<Ensured<D::Pool>, PoolError> {
        if let Inspection::Live(pool) = self.inspect() {
            return Ok(Ensured::Ready(pool));
        }

        let _init = self.inner.init_lock.lock().await;
        let _flag = InitGuard::raise(&self.inner.initializing);
        loop {
            match self.inspect() {
                Inspection::Live(pool) => return Ok(Ensured::Ready(pool)),
                Inspection::Stale(generation) => {
                    if let Some(old) = self.take_generation(generation) {
                        transition!(
                            self.inner.options.verbose,
                            generation,
                            age_ms = old.age().as_millis() as u64,
                            "pool is stale, ending it"
                        );
                        end_quietly(&old.pool, old.generation).await;
                    }
                    tokio::time::sleep(jitter(self.inner.options.jitter_max)).await;
                }
                Inspection::Absent => {
                    let fresh = self.build().await?;
                    if let Some(pool) = self.install(fresh).await? {
                        return Ok(Ensured::Ready(pool));
                    }
                }
            }
        }
    }

    async fn ensure_best_effort(&self) -> Result<Ensured<D::Pool>, PoolError> {
        let _flag = InitGuard::raise(&self.inner.initializing);
        loop {
            match self.inspect() {
                Inspection::Live(pool) => return Ok(Ensured::Ready(pool)),
                Inspection::Stale(generation) => {
                    let Some(old) = self.take_generation(generation) else {
                        tracing::debug!(generation, "stale pool already taken, waiting");
                        return Ok(Ensured::Wait);
                    };
                    transition!(
                        self.inner.options.verbose,
                        generation,
                        age_ms = old.age().as_millis() as u64,
                        "pool is stale, ending it"
                    );
                    if let Err(e) = old.pool.end().await {
                        tracing::warn!(generation, error = %e, "failed to end stale pool, waiting");
                        return Ok(Ensured::Wait);
                    }
                    tokio::time::sleep(jitter(self.inner.options.jitter_max)).await;
                }
                Inspection::Absent => {
                    let fresh = self.build().await?;
                    if let Some(pool) = self.install(fresh).await? {
                        return Ok(Ensured::Ready(pool));
                    }
                }
            }
        }
    }

    /// Put a freshly built pool in the slot.
    ///
    /// If a concurrent builder got there first, the fresh pool is ended and
    /// the installed one is returned, so only one pool is ever current. A
    /// pool built from a configuration that `reconfigure` has since replaced
    /// is ended and `None` is returned so the caller builds again. A pool
    /// finished after `close` is ended and the call fails.
    async fn install(&self, fresh: Current<D::Pool>) -> Result<Option<Arc<D::Pool>>, PoolError> {
        let (outcome, rejected) = {
            let mut slot = self.inner.slot.lock();
            if self.is_closed() {
                (Err(PoolError::Closed), Some(fresh))
            } else if fresh.epoch != self.inner.epoch.load(Ordering::SeqCst) {
                (Ok(None), Some(fresh))
            } else if let Some(existing) = slot.as_ref() {
                (Ok(Some(Arc::clone(&existing.pool))), Some(fresh))
            } else {
                let pool = Arc::clone(&fresh.pool);
                *slot = Some(fresh);
                (Ok(Some(pool)), None)
            }
        };

        if let Some(rejected) = rejected {
            match &outcome {
                Err(_) => tracing::debug!(
                    generation = rejected.generation,
                    "manager closed during build, ending the new pool"
                ),
                Ok(None) => tracing::debug!(
                    generation = rejected.generation,
                    "configuration changed during build, ending the new pool"
                ),
                Ok(Some(_)) => tracing::debug!(
                    generation = rejected.generation,
                    "another caller installed a pool first, ending the duplicate"
                ),
            }
            end_quietly(&rejected.pool, rejected.generation).await;
        }
        outcome
    }

    async fn build(&self) -> Result<Current<D::Pool>, PoolError> {
        let (config, epoch) = {
            let config = self.inner.config.lock();
            (config.clone(), self.inner.epoch.load(Ordering::SeqCst))
        };
        config.validate()?;

        let password = match (&config.password, &self.inner.tokens) {
            (Some(password), _) => Some(password.clone()),
            (None, Some(provider)) => {
                let provider = Arc::clone(provider);
                let request = config.token_request()?;
                let token = provider.token(&request).await?;
                tracing::debug!(provider = provider.name(), "fetched credential token");
                Some(token.into_secret())
            }
            (None, None) => None,
        };
        let options = config.connect_options(password)?;

        let pool = self
            .inner
            .driver
            .build(&options)
            .await
            .map_err(|source| PoolError::Init { source })?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pool = Arc::new(pool);
        self.watch_faults(&pool, generation);

        transition!(
            self.inner.options.verbose,
            generation,
            host = %options.host,
            max = options.max_size,
            "pool created"
        );
        Ok(Current {
            pool,
            created_at: Instant::now(),
            generation,
            epoch,
        })
    }

    fn watch_faults(&self, pool: &Arc<D::Pool>, generation: u64) {
        let mut faults = pool.subscribe_faults();
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                match faults.recv().await {
                    Ok(fault) => {
                        if !on_fault(&inner, generation, fault) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(generation, skipped, "fault receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Apply the fault policy. Returns whether to keep watching.
fn on_fault<D: PoolDriver>(inner: &Weak<Inner<D>>, generation: u64, fault: PoolFault) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };

    let retired = {
        let mut slot = inner.slot.lock();
        match slot.as_ref() {
            Some(current) if current.generation == generation => match inner.options.fault_policy
            {
                FaultPolicy::Terminate => None,
                FaultPolicy::Discard => slot.take(),
            },
            _ => {
                tracing::debug!(generation, message = %fault.message, "ignoring fault from retired pool");
                return false;
            }
        }
    };

    match inner.options.fault_policy {
        FaultPolicy::Terminate => {
            tracing::error!(
                generation,
                message = %fault.message,
                "unexpected error on idle client, terminating process"
            );
            std::process::exit(1);
        }
        FaultPolicy::Discard => {
            tracing::error!(
                generation,
                message = %fault.message,
                "unexpected error on idle client, discarding pool"
            );
            if let Some(old) = retired {
                tokio::spawn(async move {
                    end_quietly(&old.pool, old.generation).await;
                });
            }
            false
        }
    }
}

async fn end_quietly<P: DbPool>(pool: &Arc<P>, generation: u64) {
    if let Err(e) = pool.end().await {
        tracing::warn!(generation, error = %e, "failed to end pool");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use lambda_pg_auth::StaticToken;
    use lambda_pg_testing::MockDriver;

    use super::*;

    fn config() -> PoolConfig {
        PoolConfig::new().host("db.internal").user("app")
    }

    fn manager(driver: &MockDriver, options: LifecycleOptions) -> LifecycleManager<MockDriver> {
        LifecycleManager::builder(driver.clone())
            .config(config())
            .options(options)
            .build()
            .unwrap()
    }

    async fn ready(manager: &LifecycleManager<MockDriver>) -> Arc<lambda_pg_testing::MockPool> {
        manager.ensure_pool().await.unwrap().ready().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_pool_is_reused() {
        let driver = MockDriver::new();
        let manager = manager(&driver, LifecycleOptions::default());
        assert_eq!(manager.phase(), PoolPhase::Absent);

        let first = ready(&manager).await;
        tokio::time::advance(Duration::from_secs(29)).await;
        let second = ready(&manager).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(driver.builds(), 1);
        assert_eq!(manager.phase(), PoolPhase::Live);
        assert_eq!(manager.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_pool_is_ended_before_replacement() {
        let driver = MockDriver::new();
        let manager = manager(&driver, LifecycleOptions::default());

        let first = ready(&manager).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(manager.phase(), PoolPhase::Stale);

        let second = ready(&manager).await;
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.is_ended());
        assert!(!second.is_ended());
        assert_eq!(driver.builds(), 2);
        assert_eq!(driver.ends(), 1);
        assert_eq!(driver.live_pools(), 1);
        assert_eq!(second.id(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_window_is_configurable() {
        let driver = MockDriver::new();
        let manager = manager(
            &driver,
            LifecycleOptions::new().health_window(Duration::from_secs(1)),
        );
        ready(&manager).await;
        tokio::time::advance(Duration::from_millis(1500)).await;
        ready(&manager).await;
        assert_eq!(driver.builds(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_stale_teardown_failure_waits() {
        let driver = MockDriver::new();
        let manager = manager(
            &driver,
            LifecycleOptions::new().strategy(InitStrategy::BestEffort),
        );
        ready(&manager).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        driver.set_end_failure(true);
        assert!(manager.ensure_pool().await.unwrap().is_wait());
        assert!(manager.current().is_none());
        assert!(!manager.is_initializing());

        driver.set_end_failure(false);
        ready(&manager).await;
        assert_eq!(driver.builds(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_stale_teardown_failure_still_rebuilds() {
        let driver = MockDriver::new();
        let manager = manager(&driver, LifecycleOptions::default());
        ready(&manager).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        driver.set_end_failure(true);
        let pool = ready(&manager).await;
        assert_eq!(pool.id(), 2);
        assert_eq!(driver.builds(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_build() {
        let driver = MockDriver::builder()
            .with_build_delay(Duration::from_millis(100))
            .build();
        let manager = manager(&driver, LifecycleOptions::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.ensure_pool().await.unwrap().ready().unwrap() })
            })
            .collect();

        let mut pools = Vec::new();
        for handle in handles {
            pools.push(handle.await.unwrap());
        }
        assert_eq!(driver.builds(), 1);
        assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
        assert!(!manager.is_initializing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_failure_is_init_error() {
        let driver = MockDriver::new();
        driver.set_build_failure(Some("connection refused"));
        let manager = manager(&driver, LifecycleOptions::default());

        let err = manager.ensure_pool().await.unwrap_err();
        assert!(matches!(err, PoolError::Init { .. }));
        assert!(err.to_string().starts_with("error on connecting to database"));
        assert!(!manager.is_initializing());
        assert_eq!(manager.phase(), PoolPhase::Absent);
    }

    #[tokio::test]
    async fn test_token_fetched_when_no_password() {
        let driver = MockDriver::new();
        let manager = LifecycleManager::builder(driver.clone())
            .config(config())
            .token_provider(Arc::new(StaticToken::new("signed-token")))
            .build()
            .unwrap();
        ready(&manager).await;
        assert_eq!(
            driver.last_options().unwrap().password.as_deref(),
            Some("signed-token")
        );
    }

    #[tokio::test]
    async fn test_static_password_wins_over_token() {
        let driver = MockDriver::new();
        let manager = LifecycleManager::builder(driver.clone())
            .config(config().password("static"))
            .token_provider(Arc::new(StaticToken::new("signed-token")))
            .build()
            .unwrap();
        ready(&manager).await;
        assert_eq!(
            driver.last_options().unwrap().password.as_deref(),
            Some("static")
        );
    }

    #[tokio::test]
    async fn test_missing_signing_input_is_credential_error() {
        let driver = MockDriver::new();
        let manager = LifecycleManager::builder(driver.clone())
            .config(PoolConfig::new().user("app"))
            .token_provider(Arc::new(StaticToken::new("t")))
            .build()
            .unwrap();
        let err = manager.ensure_pool().await.unwrap_err();
        assert!(matches!(err, PoolError::Credential(_)));
        assert_eq!(driver.builds(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_at_build() {
        let err = LifecycleManager::new(MockDriver::new(), config().max(0)).unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_discard_only_clears_matching_pool() {
        let driver = MockDriver::new();
        let manager = manager(&driver, LifecycleOptions::default());
        let pool = ready(&manager).await;

        assert!(manager.discard(&pool).await);
        assert!(pool.is_ended());
        assert!(manager.current().is_none());
        assert!(!manager.discard(&pool).await);

        let fresh = ready(&manager).await;
        assert!(!manager.discard(&pool).await);
        assert!(Arc::ptr_eq(&manager.current().unwrap(), &fresh));
    }

    #[tokio::test]
    async fn test_reconfigure_rebuilds_with_new_config() {
        let driver = MockDriver::new();
        let manager = manager(&driver, LifecycleOptions::default());
        let old = ready(&manager).await;

        manager
            .reconfigure(PoolConfigPatch::new().max(3).host("replica.internal"))
            .await
            .unwrap();

        let options = driver.last_options().unwrap();
        assert_eq!(options.max_size, 3);
        assert_eq!(options.host, "replica.internal");
        assert_eq!(manager.config().max, 3);
        assert!(!Arc::ptr_eq(&old, &manager.current().unwrap()));
        assert_eq!(driver.builds(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_during_build_uses_new_config() {
        let driver = MockDriver::builder()
            .with_build_delay(Duration::from_millis(100))
            .build();
        let manager = manager(&driver, LifecycleOptions::default());

        let caller = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_pool().await.unwrap().ready().unwrap() })
        };
        tokio::task::yield_now().await;
        assert!(manager.is_initializing());

        let rebuild = manager.reconfigure(PoolConfigPatch::new().max(3).host("replica.internal"));
        let pool = caller.await.unwrap();
        rebuild.await.unwrap();

        // The build started before the patch is ended, never installed
        assert_eq!(driver.builds(), 2);
        assert_eq!(driver.live_pools(), 1);
        assert_eq!(pool.id(), 2);
        assert!(Arc::ptr_eq(&manager.current().unwrap(), &pool));

        let options = driver.last_options().unwrap();
        assert_eq!(options.host, "replica.internal");
        assert_eq!(options.max_size, 3);
        assert_eq!(manager.phase(), PoolPhase::Live);
        assert!(Arc::ptr_eq(&ready(&manager).await, &pool));
    }

    #[tokio::test]
    async fn test_reconfigure_failure_is_not_returned() {
        let driver = MockDriver::new();
        let manager = manager(&driver, LifecycleOptions::default());
        driver.set_build_failure(Some("refused"));
        manager.reconfigure(PoolConfigPatch::new().max(2)).await.unwrap();
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_fault_discards_current_pool() {
        let driver = MockDriver::new();
        let manager = manager(
            &driver,
            LifecycleOptions::new().fault_policy(FaultPolicy::Discard),
        );
        let pool = ready(&manager).await;

        assert!(driver.inject_fault("terminating connection due to administrator command"));
        for _ in 0..100 {
            if manager.current().is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(manager.current().is_none());

        let fresh = ready(&manager).await;
        assert!(!Arc::ptr_eq(&pool, &fresh));
    }

    #[tokio::test]
    async fn test_fault_from_retired_pool_is_ignored() {
        let driver = MockDriver::new();
        let manager = manager(
            &driver,
            LifecycleOptions::new().fault_policy(FaultPolicy::Terminate),
        );
        let old = ready(&manager).await;
        manager.discard(&old).await;
        let fresh = ready(&manager).await;

        // Terminate would exit the test process if this were not ignored
        driver.inject_fault_on(old.id(), "late fault");
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(Arc::ptr_eq(&manager.current().unwrap(), &fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_pool_returns_when_idle() {
        let driver = MockDriver::builder()
            .with_build_delay(Duration::from_millis(200))
            .build();
        let manager = manager(&driver, LifecycleOptions::default());

        let builder = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_pool().await.unwrap() })
        };
        tokio::task::yield_now().await;
        assert!(manager.is_initializing());

        manager.wait_for_pool().await;
        assert!(!manager.is_initializing());
        assert!(manager.current().is_some());
        builder.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_ends_pool_and_refuses_use() {
        let driver = MockDriver::new();
        let manager = manager(&driver, LifecycleOptions::default());
        let pool = ready(&manager).await;

        manager.close().await;
        assert!(pool.is_ended());
        assert!(manager.is_closed());
        assert!(matches!(
            manager.ensure_pool().await.unwrap_err(),
            PoolError::Closed
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_build_ends_fresh_pool() {
        let driver = MockDriver::builder()
            .with_build_delay(Duration::from_millis(100))
            .build();
        let manager = manager(&driver, LifecycleOptions::default());

        let caller = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_pool().await })
        };
        tokio::task::yield_now().await;
        assert!(manager.is_initializing());

        manager.close().await;
        let result = caller.await.unwrap();

        assert!(matches!(result, Err(PoolError::Closed)));
        assert_eq!(driver.builds(), 1);
        assert_eq!(driver.ends(), 1);
        assert_eq!(driver.live_pools(), 0);
        assert!(manager.current().is_none());
        assert!(!manager.is_initializing());
    }
}
