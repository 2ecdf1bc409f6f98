//! Return-path health checks

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

type SyncCheck<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type AsyncCheck<T> = Arc<dyn for<'a> Fn(&'a T) -> BoxFuture<'a, bool> + Send + Sync>;

/// Optional predicates gating whether a returned resource re-enters the pool.
///
/// The synchronous predicate always runs first so that cheaply detectable
/// failures never pay for an async round trip; evaluation short-circuits on
/// the first predicate that reports the resource unusable.
pub(crate) struct HealthChecks<T> {
    pub(crate) sync_check: Option<SyncCheck<T>>,
    pub(crate) async_check: Option<AsyncCheck<T>>,
}

impl<T> HealthChecks<T> {
    /// Returns false as soon as any configured check fails.
    pub(crate) async fn evaluate(&self, value: &T) -> bool {
        if let Some(check) = &self.sync_check {
            if !check(value) {
                return false;
            }
        }
        if let Some(check) = &self.async_check {
            if !check(value).await {
                return false;
            }
        }
        true
    }
}

impl<T> Default for HealthChecks<T> {
    fn default() -> Self {
        Self {
            sync_check: None,
            async_check: None,
        }
    }
}

impl<T> Clone for HealthChecks<T> {
    fn clone(&self) -> Self {
        Self {
            sync_check: self.sync_check.clone(),
            async_check: self.async_check.clone(),
        }
    }
}

impl<T> fmt::Debug for HealthChecks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthChecks")
            .field("sync_check", &self.sync_check.is_some())
            .field("async_check", &self.async_check.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn always_ok(_: &i32) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    fn never_ok(_: &i32) -> BoxFuture<'_, bool> {
        Box::pin(async { false })
    }

    #[tokio::test]
    async fn no_checks_accepts_everything() {
        let checks = HealthChecks::<i32>::default();
        assert!(checks.evaluate(&7).await);
    }

    #[tokio::test]
    async fn sync_check_gates_alone() {
        let mut checks = HealthChecks::<i32>::default();
        checks.sync_check = Some(Arc::new(|value| *value > 0));
        assert!(checks.evaluate(&1).await);
        assert!(!checks.evaluate(&-1).await);
    }

    #[tokio::test]
    async fn async_check_gates_alone() {
        let mut checks = HealthChecks::<i32>::default();
        checks.async_check = Some(Arc::new(never_ok));
        assert!(!checks.evaluate(&1).await);
    }

    #[tokio::test]
    async fn both_checks_must_pass() {
        let mut checks = HealthChecks::<i32>::default();
        checks.sync_check = Some(Arc::new(|_| true));
        checks.async_check = Some(Arc::new(always_ok));
        assert!(checks.evaluate(&1).await);
    }

    #[tokio::test]
    async fn sync_failure_short_circuits_the_async_check() {
        static ASYNC_CALLS: AtomicUsize = AtomicUsize::new(0);

        fn tracked(_: &i32) -> BoxFuture<'_, bool> {
            ASYNC_CALLS.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { true })
        }

        let mut checks = HealthChecks::<i32>::default();
        checks.sync_check = Some(Arc::new(|_| false));
        checks.async_check = Some(Arc::new(tracked));

        assert!(!checks.evaluate(&1).await);
        assert_eq!(ASYNC_CALLS.load(Ordering::SeqCst), 0);
    }
}
