use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use tracing::info;

use super::engine::{StoreClient, StoreError};

/// Redis-backed store, either a single server or a cluster.
#[derive(Clone)]
pub enum RedisStore {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
}

impl RedisStore {
    /// Connect to `addrs`. In single mode only the first address is used.
    pub async fn connect(addrs: &[String], cluster: bool) -> Result<Self, StoreError> {
        if addrs.is_empty() {
            return Err(StoreError::NoAddress);
        }
        let urls = addrs.iter().map(|addr| redis_url(addr)).collect::<Vec<_>>();

        if cluster {
            let client = ClusterClient::new(urls.clone())?;
            let conn = client.get_async_connection().await?;
            info!(nodes = ?urls, "connected to redis cluster");
            Ok(Self::Cluster(conn))
        } else {
            let client = redis::Client::open(urls[0].as_str())?;
            let conn = ConnectionManager::new(client).await?;
            info!(url = %urls[0], "connected to redis");
            Ok(Self::Single(conn))
        }
    }
}

#[async_trait::async_trait]
impl StoreClient for RedisStore {
    async fn write(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        match self {
            RedisStore::Single(conn) => set(&mut conn.clone(), key, value, ttl).await,
            RedisStore::Cluster(conn) => set(&mut conn.clone(), key, value, ttl).await,
        }
    }
}

async fn set<C>(conn: &mut C, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>
where
    C: ConnectionLike + Send + Sync,
{
    match ttl {
        // SET EX takes whole seconds and rejects zero.
        Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?,
        None => conn.set::<_, _, ()>(key, value).await?,
    }
    Ok(())
}

fn redis_url(addr: &str) -> String {
    if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}
