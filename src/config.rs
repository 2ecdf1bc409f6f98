//! Pool configuration options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::health::HealthChecks;

/// Configuration for pool behavior
///
/// # Examples
///
/// ```
/// use weirpool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::<i32>::new()
///     .with_max(100)
///     .with_min(10)
///     .with_max_retries(5)
///     .with_retry_delay(Duration::from_millis(250));
///
/// assert_eq!(config.max, 100);
/// assert_eq!(config.min, 10);
/// ```
pub struct PoolConfig<T> {
    /// Capacity ceiling: the buffer never holds more than this many resources
    pub max: usize,

    /// Low-water mark: taking the buffer down to this level triggers a
    /// background refill
    pub min: usize,

    /// Construction retries per fill slot before the slot is abandoned
    pub max_retries: usize,

    /// Base step of the retry backoff sequence
    pub retry_delay: Duration,

    /// Ceiling on any single backoff delay
    pub retry_delay_cap: Duration,

    /// Whether construction eagerly fills the buffer to `max`
    pub buffer_on_start: bool,

    pub(crate) checks: HealthChecks<T>,
}

impl<T> Default for PoolConfig<T> {
    fn default() -> Self {
        Self {
            max: 10,
            min: 3,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            retry_delay_cap: Duration::from_secs(30),
            buffer_on_start: true,
            checks: HealthChecks::default(),
        }
    }
}

impl<T> PoolConfig<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity ceiling
    ///
    /// # Examples
    ///
    /// ```
    /// use weirpool::PoolConfig;
    ///
    /// let config = PoolConfig::<i32>::new().with_max(50);
    ///
    /// assert_eq!(config.max, 50);
    /// ```
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Set the low-water mark that triggers a background refill
    pub fn with_min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    /// Set how many times a fill slot retries construction before giving up
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base step of the retry backoff sequence
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the ceiling on any single backoff delay
    pub fn with_retry_delay_cap(mut self, cap: Duration) -> Self {
        self.retry_delay_cap = cap;
        self
    }

    /// Control whether construction eagerly fills the buffer to `max`
    pub fn with_buffer_on_start(mut self, eager: bool) -> Self {
        self.buffer_on_start = eager;
        self
    }

    /// Install a synchronous health check run against every returned resource
    ///
    /// # Examples
    ///
    /// ```
    /// use weirpool::PoolConfig;
    ///
    /// let config = PoolConfig::<i32>::new().with_sync_check(|value| *value >= 0);
    /// ```
    pub fn with_sync_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.checks.sync_check = Some(Arc::new(check));
        self
    }

    /// Install an asynchronous health check, run after the synchronous one
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::future::BoxFuture;
    /// use weirpool::PoolConfig;
    ///
    /// fn responsive(value: &i32) -> BoxFuture<'_, bool> {
    ///     Box::pin(async move { *value < 1_000 })
    /// }
    ///
    /// let config = PoolConfig::new().with_check(responsive);
    /// # let _: weirpool::PoolConfig<i32> = config;
    /// ```
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: for<'a> Fn(&'a T) -> BoxFuture<'a, bool> + Send + Sync + 'static,
    {
        self.checks.async_check = Some(Arc::new(check));
        self
    }
}

impl<T> Clone for PoolConfig<T> {
    fn clone(&self) -> Self {
        Self {
            max: self.max,
            min: self.min,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            retry_delay_cap: self.retry_delay_cap,
            buffer_on_start: self.buffer_on_start,
            checks: self.checks.clone(),
        }
    }
}

impl<T> fmt::Debug for PoolConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max", &self.max)
            .field("min", &self.min)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_delay_cap", &self.retry_delay_cap)
            .field("buffer_on_start", &self.buffer_on_start)
            .field("checks", &self.checks)
            .finish()
    }
}
