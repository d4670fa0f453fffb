pub mod adapter;
pub mod engine;
pub mod memory;
pub mod redis_store;

pub use adapter::StoreAdapter;
pub use engine::{StoreClient, StoreError};
pub use memory::InMemoryStore;
pub use redis_store::RedisStore;
