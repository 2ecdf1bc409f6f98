//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use weirpool::{Pool, PoolConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(
///     || async { Ok(1u64) },
///     |_| async { Ok(()) },
///     PoolConfig::new().with_max(1).with_min(0),
/// )
/// .await;
///
/// let metrics = pool.metrics();
/// assert_eq!(metrics.created, 1);
/// assert_eq!(metrics.available, 1);
/// # }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Resources successfully constructed by the factory
    pub created: u64,

    /// Individual factory call failures, counted before retry accounting
    pub create_failures: u64,

    /// Fill slots abandoned after exhausting their retry budget
    pub retry_exhausted: u64,

    /// Resources handed out by get
    pub retrieved: u64,

    /// Resources accepted back by put
    pub returned: u64,

    /// Returns routed to the destructor (capacity, drain, or failed health check)
    pub rejected: u64,

    /// Destructor invocations
    pub destroyed: u64,

    /// get calls that found the buffer empty
    pub empty_events: u64,

    /// Resources currently buffered
    pub available: usize,

    /// Callers currently waiting on an empty buffer
    pub waiting: usize,

    /// Configured capacity ceiling
    pub capacity: usize,

    /// Fraction of capacity currently buffered (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a flat string map
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("created".to_string(), self.created.to_string());
        metrics.insert("create_failures".to_string(), self.create_failures.to_string());
        metrics.insert("retry_exhausted".to_string(), self.retry_exhausted.to_string());
        metrics.insert("retrieved".to_string(), self.retrieved.to_string());
        metrics.insert("returned".to_string(), self.returned.to_string());
        metrics.insert("rejected".to_string(), self.rejected.to_string());
        metrics.insert("destroyed".to_string(), self.destroyed.to_string());
        metrics.insert("empty_events".to_string(), self.empty_events.to_string());
        metrics.insert("available".to_string(), self.available.to_string());
        metrics.insert("waiting".to_string(), self.waiting.to_string());
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Exporter for the Prometheus exposition format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Render a metrics snapshot as Prometheus exposition text
    ///
    /// # Examples
    ///
    /// ```
    /// use weirpool::{Pool, PoolConfig};
    /// use weirpool::MetricsExporter;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let pool = Pool::new(
    ///     || async { Ok(1u64) },
    ///     |_| async { Ok(()) },
    ///     PoolConfig::new().with_max(1).with_min(0),
    /// )
    /// .await;
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.metrics(), "demo", None);
    /// assert!(output.contains("weirpool_available"));
    /// assert!(output.contains("pool=\"demo\""));
    /// # }
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        let registry = Registry::new();

        let counter = |name: &str, help: &str, value: u64| {
            let counter = IntCounter::with_opts(Opts::new(name, help).const_labels(labels.clone()))
                .expect("static metric options are valid");
            counter.inc_by(value);
            registry
                .register(Box::new(counter))
                .expect("metric names are unique");
        };

        counter(
            "weirpool_created_total",
            "Resources successfully constructed",
            metrics.created,
        );
        counter(
            "weirpool_create_failures_total",
            "Individual factory call failures",
            metrics.create_failures,
        );
        counter(
            "weirpool_retry_exhausted_total",
            "Fill slots abandoned after exhausting retries",
            metrics.retry_exhausted,
        );
        counter(
            "weirpool_retrieved_total",
            "Resources handed out by get",
            metrics.retrieved,
        );
        counter(
            "weirpool_returned_total",
            "Resources accepted back by put",
            metrics.returned,
        );
        counter(
            "weirpool_rejected_total",
            "Returns routed to the destructor",
            metrics.rejected,
        );
        counter(
            "weirpool_destroyed_total",
            "Destructor invocations",
            metrics.destroyed,
        );
        counter(
            "weirpool_empty_events_total",
            "Gets that found the buffer empty",
            metrics.empty_events,
        );

        let int_gauge = |name: &str, help: &str, value: i64| {
            let gauge = IntGauge::with_opts(Opts::new(name, help).const_labels(labels.clone()))
                .expect("static metric options are valid");
            gauge.set(value);
            registry
                .register(Box::new(gauge))
                .expect("metric names are unique");
        };

        int_gauge(
            "weirpool_available",
            "Resources currently buffered",
            metrics.available as i64,
        );
        int_gauge(
            "weirpool_waiting",
            "Callers waiting on an empty buffer",
            metrics.waiting as i64,
        );
        int_gauge(
            "weirpool_capacity",
            "Configured capacity ceiling",
            metrics.capacity as i64,
        );

        let utilization = Gauge::with_opts(
            Opts::new("weirpool_utilization", "Fraction of capacity currently buffered")
                .const_labels(labels.clone()),
        )
        .expect("static metric options are valid");
        utilization.set(metrics.utilization);
        registry
            .register(Box::new(utilization))
            .expect("metric names are unique");

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .expect("prometheus text encoding");
        String::from_utf8(buffer).expect("prometheus output is valid utf8")
    }
}

/// Internal counter tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub(crate) created: AtomicU64,
    pub(crate) create_failures: AtomicU64,
    pub(crate) retry_exhausted: AtomicU64,
    pub(crate) retrieved: AtomicU64,
    pub(crate) returned: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) destroyed: AtomicU64,
    pub(crate) empty_events: AtomicU64,
}

impl MetricsTracker {
    pub(crate) fn snapshot(&self, available: usize, waiting: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            available as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            created: self.created.load(Ordering::Relaxed),
            create_failures: self.create_failures.load(Ordering::Relaxed),
            retry_exhausted: self.retry_exhausted.load(Ordering::Relaxed),
            retrieved: self.retrieved.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            empty_events: self.empty_events.load(Ordering::Relaxed),
            available,
            waiting,
            capacity,
            utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_utilization() {
        let tracker = MetricsTracker::default();
        tracker.created.store(4, Ordering::Relaxed);

        let metrics = tracker.snapshot(2, 0, 8);
        assert_eq!(metrics.created, 4);
        assert_eq!(metrics.available, 2);
        assert!((metrics.utilization - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_capacity_reports_zero_utilization() {
        let tracker = MetricsTracker::default();
        let metrics = tracker.snapshot(0, 0, 0);
        assert_eq!(metrics.utilization, 0.0);
    }

    #[test]
    fn export_flattens_every_field() {
        let tracker = MetricsTracker::default();
        let exported = tracker.snapshot(1, 2, 3).export();
        assert_eq!(exported.len(), 12);
        assert_eq!(exported.get("available").map(String::as_str), Some("1"));
        assert_eq!(exported.get("waiting").map(String::as_str), Some("2"));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn prometheus_export_carries_labels() {
        let tracker = MetricsTracker::default();
        let metrics = tracker.snapshot(3, 0, 4);

        let mut tags = HashMap::new();
        tags.insert("service".to_string(), "api".to_string());

        let output = MetricsExporter::export_prometheus(&metrics, "primary", Some(&tags));
        assert!(output.contains("weirpool_available"));
        assert!(output.contains("pool=\"primary\""));
        assert!(output.contains("service=\"api\""));
        assert!(output.contains("weirpool_utilization"));
    }
}
