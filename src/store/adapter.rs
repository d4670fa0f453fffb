use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};

use super::engine::{StoreClient, StoreError};
use super::memory::InMemoryStore;
use super::redis_store::RedisStore;

/// Runtime-selectable store wrapper so the binary can switch between memory and Redis.
pub enum StoreAdapter {
    Memory(InMemoryStore),
    Redis(RedisStore),
}

impl StoreAdapter {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.backend {
            StoreBackend::Memory => Ok(Self::Memory(InMemoryStore::new())),
            StoreBackend::Redis => Ok(Self::Redis(
                RedisStore::connect(&config.addrs, config.cluster).await?,
            )),
        }
    }

    pub fn into_shared(self) -> Arc<dyn StoreClient> {
        match self {
            StoreAdapter::Memory(inner) => Arc::new(inner),
            StoreAdapter::Redis(inner) => Arc::new(inner),
        }
    }
}
