//! # weirpool
//!
//! Buffered async resource pool for expensive-to-create values such as
//! network connections, built on Tokio.
//!
//! ## Features
//!
//! - FIFO buffering: the oldest resource is always served first, bounding
//!   staleness
//! - Parallel fill-up with bounded concurrency; concurrent fill requests
//!   coalesce onto a single cycle
//! - FIFO waiter queue when the buffer runs dry, resolved as resources
//!   arrive
//! - Construction retry with capped, equal-jitter exponential backoff
//! - Optional sync + async health checks gating every returned resource
//! - Idempotent, coalescing drain that disposes of every buffered resource
//! - Lifetime counters with Prometheus export (behind the default `metrics`
//!   feature)
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use weirpool::{Pool, PoolConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
//!
//! let pool = Pool::new(
//!     || async { Ok(NEXT_ID.fetch_add(1, Ordering::Relaxed)) },
//!     |_id| async { Ok(()) },
//!     PoolConfig::new().with_max(4).with_min(1),
//! )
//! .await;
//!
//! assert_eq!(pool.size(), 4);
//!
//! let id = pool.get().await;
//! pool.put(id).await.unwrap();
//! assert_eq!(pool.size(), 4);
//! # }
//! ```

mod backoff;
mod config;
mod errors;
mod health;
mod metrics;
mod pool;

pub use config::PoolConfig;
pub use errors::{BoxError, PoolError, PoolResult};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{Pool, PoolStatus};
