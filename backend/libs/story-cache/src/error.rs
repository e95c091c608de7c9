//! Cache error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid cache data: {0}")]
    InvalidData(String),
}

impl CacheError {
    /// Connectivity and timeout failures; retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Timeout(_) => true,
            CacheError::Redis(e) => {
                e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error()
            }
            _ => false,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
