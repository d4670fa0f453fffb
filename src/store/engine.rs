use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by store clients. Every one of them ends the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("no store address configured")]
    NoAddress,
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// The one capability the load generator needs from a key-value store.
///
/// Implementations are shared by every load worker and must tolerate
/// concurrent calls.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn write(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;
}
