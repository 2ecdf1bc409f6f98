//! Error types for the resource pool

use thiserror::Error;

/// Boxed error produced by factory and destructor callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("resource is already buffered in the pool")]
    DuplicateValue,

    #[error("construction gave up after {attempts} attempts: {source}")]
    RetryLimitExceeded { attempts: usize, source: BoxError },

    #[error("construction attempt cancelled by a drain cycle")]
    FillCancelled,
}

pub type PoolResult<T> = Result<T, PoolError>;
