//! Core resource pool implementation

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::config::PoolConfig;
use crate::errors::{BoxError, PoolError, PoolResult};
use crate::metrics::{MetricsTracker, PoolMetrics};

type Factory<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;
type Destructor<T> = Box<dyn Fn(T) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Point-in-time view of a pool's internal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Resources immediately available in the buffer
    pub available: usize,

    /// Callers currently parked on an empty buffer
    pub waiting: usize,

    /// A fill cycle is in progress
    pub filling: bool,

    /// A drain cycle is in progress
    pub draining: bool,
}

struct PoolState<T> {
    buffer: VecDeque<T>,
    waiters: VecDeque<oneshot::Sender<T>>,
    // Presence doubles as the cycle flag; the channel is the completion
    // event concurrent callers coalesce onto.
    filling: Option<watch::Sender<bool>>,
    draining: Option<watch::Sender<bool>>,
}

struct PoolInner<T: Send + 'static> {
    config: PoolConfig<T>,
    factory: Factory<T>,
    destructor: Destructor<T>,
    state: Mutex<PoolState<T>>,
    // Bumped at the start of every drain cycle; in-flight backoff sleeps
    // race it and abandon their slot when it fires.
    cancel: watch::Sender<bool>,
    metrics: MetricsTracker,
}

/// Buffered pool of reusable resources
///
/// Resources are built by an async factory (with jittered retry on failure),
/// recycled through `get`/`put` in FIFO order, gated by optional health
/// checks on return, and disposed by an async destructor. Cloning the pool
/// is cheap and every clone operates on the same buffer.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use weirpool::{Pool, PoolConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
///
/// let pool = Pool::new(
///     || async { Ok(NEXT_ID.fetch_add(1, Ordering::Relaxed)) },
///     |_id| async { Ok(()) },
///     PoolConfig::new().with_max(4).with_min(1),
/// )
/// .await;
///
/// assert_eq!(pool.size(), 4);
///
/// let id = pool.get().await;
/// pool.put(id).await.unwrap();
/// assert_eq!(pool.size(), 4);
/// # }
/// ```
pub struct Pool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Pool<T> {
    /// Create a new pool around a factory and a destructor
    ///
    /// When `config.buffer_on_start` is set the call fills the buffer to
    /// `config.max` before returning; construction failures during that
    /// fill are logged, never propagated.
    ///
    /// # Panics
    ///
    /// Panics if `config.min` exceeds `config.max`.
    pub async fn new<F, FFut, D, DFut>(factory: F, destructor: D, config: PoolConfig<T>) -> Self
    where
        F: Fn() -> FFut + Send + Sync + 'static,
        FFut: Future<Output = Result<T, BoxError>> + Send + 'static,
        D: Fn(T) -> DFut + Send + Sync + 'static,
        DFut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        assert!(
            config.min <= config.max,
            "refill threshold (min) must not exceed pool capacity (max)"
        );

        let capacity = config.max;
        let (cancel, _) = watch::channel(false);
        let pool = Self {
            inner: Arc::new(PoolInner {
                factory: Box::new(
                    move || -> BoxFuture<'static, Result<T, BoxError>> { Box::pin(factory()) },
                ),
                destructor: Box::new(
                    move |value| -> BoxFuture<'static, Result<(), BoxError>> {
                        Box::pin(destructor(value))
                    },
                ),
                state: Mutex::new(PoolState {
                    buffer: VecDeque::with_capacity(capacity),
                    waiters: VecDeque::new(),
                    filling: None,
                    draining: None,
                }),
                cancel,
                metrics: MetricsTracker::default(),
                config,
            }),
        };

        if pool.inner.config.buffer_on_start {
            if let Err(error) = pool.fill(pool.inner.config.max).await {
                warn!(error = %error, "initial fill did not complete cleanly");
            }
        }
        pool
    }

    /// Number of resources immediately available
    pub fn size(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    /// Snapshot of buffer level, waiter count, and active cycles
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.buffer.len(),
            waiting: state.waiters.len(),
            filling: state.filling.is_some(),
            draining: state.draining.is_some(),
        }
    }

    /// Snapshot of the pool's lifetime counters
    pub fn metrics(&self) -> PoolMetrics {
        let (available, waiting) = {
            let state = self.inner.state.lock();
            (state.buffer.len(), state.waiters.len())
        };
        self.inner
            .metrics
            .snapshot(available, waiting, self.inner.config.max)
    }

    /// Take a resource from the pool
    ///
    /// Serves the oldest buffered resource first. When the buffer is empty
    /// the caller is parked in a FIFO waiter queue and a one-resource fill
    /// is kicked off in the background; the waiter is registered either way
    /// and resolves on the next resource that reaches the pool.
    pub async fn get(&self) -> T {
        let waiter = {
            let mut state = self.inner.state.lock();
            if let Some(value) = state.buffer.pop_front() {
                self.inner.metrics.retrieved.fetch_add(1, Ordering::Relaxed);
                self.maybe_refill(&mut state);
                return value;
            }
            self.inner
                .metrics
                .empty_events
                .fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        self.spawn_fill(1);

        let value = waiter
            .await
            .expect("pool state dropped while a caller was waiting");
        self.inner.metrics.retrieved.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Return a resource to the pool
    ///
    /// The value is compared against every buffered resource first; handing
    /// back something that is already pooled is a programming error and
    /// fails with [`PoolError::DuplicateValue`] no matter what state the
    /// pool is in. Detection uses `==`, so pooled types should have
    /// identity-like equality (wrap a connection id rather than pooling
    /// interchangeable constants).
    ///
    /// A healthy value is appended and pending waiters are served in FIFO
    /// order. The value goes to the destructor instead when the buffer is
    /// full, a drain is in progress, or a configured health check fails;
    /// none of those cases is an error for the caller.
    pub async fn put(&self, value: T) -> PoolResult<()>
    where
        T: PartialEq,
    {
        {
            let state = self.inner.state.lock();
            if state.buffer.iter().any(|held| held == &value) {
                return Err(PoolError::DuplicateValue);
            }
            if state.buffer.len() >= self.inner.config.max || state.draining.is_some() {
                drop(state);
                self.reject(value).await;
                return Ok(());
            }
        }

        if !self.inner.config.checks.evaluate(&value).await {
            self.reject(value).await;
            return Ok(());
        }

        // The async check suspended; every gate has to be re-validated.
        let rejected = {
            let mut state = self.inner.state.lock();
            if state.buffer.iter().any(|held| held == &value) {
                return Err(PoolError::DuplicateValue);
            }
            if state.buffer.len() >= self.inner.config.max || state.draining.is_some() {
                Some(value)
            } else {
                state.buffer.push_back(value);
                self.flush_waiters(&mut state);
                None
            }
        };
        match rejected {
            Some(value) => self.reject(value).await,
            None => {
                self.inner.metrics.returned.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Run a callback with a pooled resource
    ///
    /// On callback success the resource is returned to the pool and the
    /// callback's output is handed back. On failure the resource is sent
    /// straight to the destructor (a failed callback taints it) and the
    /// error is logged; the error never propagates to the caller.
    ///
    /// The callback receives the resource by value and must hand it back in
    /// the result tuple so the pool can reclaim it on either path.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::atomic::{AtomicU64, Ordering};
    ///
    /// use weirpool::{Pool, PoolConfig};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// static NEXT_ID: AtomicU64 = AtomicU64::new(21);
    ///
    /// let pool = Pool::new(
    ///     || async { Ok(NEXT_ID.fetch_add(1, Ordering::Relaxed)) },
    ///     |_| async { Ok(()) },
    ///     PoolConfig::new().with_max(1).with_min(0),
    /// )
    /// .await;
    ///
    /// let doubled = pool
    ///     .with_resource(|value| async move {
    ///         let result = Ok::<_, std::convert::Infallible>(value * 2);
    ///         (value, result)
    ///     })
    ///     .await;
    ///
    /// assert_eq!(doubled, Some(42));
    /// # }
    /// ```
    pub async fn with_resource<F, Fut, R, E>(&self, callback: F) -> Option<R>
    where
        T: PartialEq,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = (T, Result<R, E>)>,
        E: fmt::Display,
    {
        self.with_resource_or_else(callback, |error| {
            warn!(%error, "resource callback failed");
        })
        .await
    }

    /// Like [`Pool::with_resource`], routing a callback failure to `on_error`
    /// instead of the log
    pub async fn with_resource_or_else<F, Fut, R, E, H>(&self, callback: F, on_error: H) -> Option<R>
    where
        T: PartialEq,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = (T, Result<R, E>)>,
        H: FnOnce(E),
    {
        let value = self.get().await;
        let (value, outcome) = callback(value).await;
        match outcome {
            Ok(result) => {
                if let Err(error) = self.put(value).await {
                    warn!(error = %error, "could not return resource after use");
                }
                Some(result)
            }
            Err(error) => {
                // A failed callback means the resource cannot be trusted;
                // skip the health checks and dispose of it directly.
                self.destroy(value).await;
                on_error(error);
                None
            }
        }
    }

    /// Fill the buffer up to capacity
    ///
    /// If a fill cycle is already running the call waits for that cycle to
    /// complete instead of starting another one. The call fails with
    /// [`PoolError::RetryLimitExceeded`] only when every slot of the cycle
    /// it started exhausted its retries; background refills triggered by
    /// `get`/`put` log the same condition and move on.
    pub async fn buffer(&self) -> PoolResult<()> {
        self.fill(self.inner.config.max).await
    }

    /// Destroy every buffered resource
    ///
    /// Concurrent calls coalesce onto the single active cycle. Pending
    /// backoff sleeps inside fill attempts are cancelled so nothing new is
    /// constructed mid-drain. Resources currently held by callers and
    /// parked waiters are untouched, and the pool remains usable afterward:
    /// the next `get` or `put` starts a fresh fill.
    pub async fn drain(&self) {
        let mut wait_for_cycle = None;
        let victims = {
            let mut state = self.inner.state.lock();
            if let Some(cycle) = &state.draining {
                wait_for_cycle = Some(cycle.subscribe());
                None
            } else {
                let (tx, _rx) = watch::channel(false);
                state.draining = Some(tx);
                Some(state.buffer.drain(..).collect::<Vec<_>>())
            }
        };
        if let Some(mut done) = wait_for_cycle {
            let _ = done.changed().await;
            return;
        }
        let victims = victims.expect("victims present when no drain cycle is in flight");

        self.inner.cancel.send_replace(true);

        let supervisor = {
            let pool = self.clone();
            tokio::spawn(pool.run_drain_cycle(victims))
        };
        if supervisor.await.is_err() {
            warn!("drain cycle supervisor failed");
        }
    }

    /// Bring the buffer up to `target`, coalescing onto an in-flight cycle.
    async fn fill(&self, target: usize) -> PoolResult<()> {
        let mut wait_for_cycle = None;
        let deficit = {
            let mut state = self.inner.state.lock();
            if let Some(cycle) = &state.filling {
                wait_for_cycle = Some(cycle.subscribe());
                None
            } else if state.draining.is_some() {
                None
            } else {
                let deficit = target.saturating_sub(state.buffer.len());
                if deficit == 0 {
                    None
                } else {
                    let (tx, _rx) = watch::channel(false);
                    state.filling = Some(tx);
                    Some(deficit)
                }
            }
        };
        if let Some(mut done) = wait_for_cycle {
            let _ = done.changed().await;
            return Ok(());
        }
        let Some(deficit) = deficit else {
            return Ok(());
        };

        // The cycle runs on its own task so the flag is cleared and the
        // completion event fires even if this caller is dropped mid-wait.
        let supervisor = {
            let pool = self.clone();
            tokio::spawn(pool.run_fill_cycle(deficit))
        };
        match supervisor.await {
            Ok(result) => result,
            Err(error) => {
                warn!(error = %error, "fill cycle supervisor failed");
                Ok(())
            }
        }
    }

    async fn run_fill_cycle(self, deficit: usize) -> PoolResult<()> {
        debug!(deficit, "fill cycle started");
        let attempts: Vec<_> = (0..deficit)
            .map(|_| {
                let pool = self.clone();
                tokio::spawn(async move {
                    let value = pool.create().await?;
                    pool.admit(value).await;
                    Ok::<(), PoolError>(())
                })
            })
            .collect();
        let outcomes = join_all(attempts).await;

        if let Some(cycle) = self.inner.state.lock().filling.take() {
            cycle.send_replace(true);
        }

        let mut failures = 0usize;
        let mut exhausted = None;
        for outcome in outcomes {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(PoolError::FillCancelled)) => {
                    failures += 1;
                    debug!("fill attempt cancelled by drain");
                }
                Ok(Err(error)) => {
                    failures += 1;
                    warn!(error = %error, "fill attempt abandoned");
                    exhausted = Some(error);
                }
                Err(error) => {
                    failures += 1;
                    warn!(error = %error, "fill attempt task failed");
                }
            }
        }
        debug!(deficit, failures, "fill cycle finished");

        if failures == deficit && let Some(error) = exhausted {
            return Err(error);
        }
        Ok(())
    }

    async fn run_drain_cycle(self, victims: Vec<T>) {
        debug!(count = victims.len(), "drain cycle started");
        join_all(victims.into_iter().map(|value| self.destroy(value))).await;

        if let Some(cycle) = self.inner.state.lock().draining.take() {
            cycle.send_replace(true);
        }
        debug!("drain cycle finished");
    }

    /// One fill slot: call the factory, backing off with jitter between
    /// failures until the retry budget runs out.
    async fn create(&self) -> PoolResult<T> {
        let mut backoff = Backoff::new(
            self.inner.config.retry_delay,
            self.inner.config.retry_delay_cap,
            self.inner.config.max_retries,
        );
        let mut cancel = self.inner.cancel.subscribe();
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            let error = match (self.inner.factory)().await {
                Ok(value) => {
                    self.inner.metrics.created.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(error) => error,
            };
            self.inner
                .metrics
                .create_failures
                .fetch_add(1, Ordering::Relaxed);

            let Some(delay) = backoff.next() else {
                self.inner
                    .metrics
                    .retry_exhausted
                    .fetch_add(1, Ordering::Relaxed);
                return Err(PoolError::RetryLimitExceeded {
                    attempts,
                    source: error,
                });
            };
            debug!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "construction failed, backing off"
            );
            tokio::select! {
                _ = sleep(delay) => {}
                _ = cancel.changed() => return Err(PoolError::FillCancelled),
            }
            if self.inner.state.lock().draining.is_some() {
                return Err(PoolError::FillCancelled);
            }
        }
    }

    /// Accept a freshly constructed resource. Runs the same gates as `put`
    /// except the identity guard, which cannot trip for a value the factory
    /// just made.
    async fn admit(&self, value: T) {
        let reject_early = {
            let state = self.inner.state.lock();
            state.buffer.len() >= self.inner.config.max || state.draining.is_some()
        };
        if reject_early {
            self.reject(value).await;
            return;
        }

        if !self.inner.config.checks.evaluate(&value).await {
            self.reject(value).await;
            return;
        }

        let rejected = {
            let mut state = self.inner.state.lock();
            if state.buffer.len() >= self.inner.config.max || state.draining.is_some() {
                Some(value)
            } else {
                state.buffer.push_back(value);
                self.flush_waiters(&mut state);
                None
            }
        };
        if let Some(value) = rejected {
            self.reject(value).await;
        }
    }

    /// Serve parked waiters from the buffer head, oldest waiter first.
    fn flush_waiters(&self, state: &mut PoolState<T>) {
        while !state.waiters.is_empty() {
            let Some(value) = state.buffer.pop_front() else {
                break;
            };
            let waiter = state.waiters.pop_front().expect("waiter queue is non-empty");
            match waiter.send(value) {
                Ok(()) => self.maybe_refill(state),
                // The waiter's get future was dropped; keep the resource.
                Err(value) => state.buffer.push_front(value),
            }
        }
    }

    /// Low-water-mark trigger, evaluated after every take from the buffer.
    fn maybe_refill(&self, state: &mut PoolState<T>) {
        if state.buffer.len() <= self.inner.config.min
            && state.draining.is_none()
            && state.filling.is_none()
        {
            self.spawn_fill(self.inner.config.max);
        }
    }

    fn spawn_fill(&self, target: usize) {
        let pool = self.clone();
        tokio::spawn(async move {
            if let Err(error) = pool.fill(target).await {
                warn!(error = %error, "background fill abandoned");
            }
        });
    }

    async fn reject(&self, value: T) {
        self.inner.metrics.rejected.fetch_add(1, Ordering::Relaxed);
        self.destroy(value).await;
    }

    async fn destroy(&self, value: T) {
        if let Err(error) = (self.inner.destructor)(value).await {
            warn!(error = %error, "destructor failed, resource dropped");
        }
        self.inner.metrics.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}
