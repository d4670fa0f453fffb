use std::time::Duration;

use thiserror::Error;
use tonic::transport::{Channel, Endpoint};

use crate::rpc::service::SettleRequest;
use crate::rpc::service::settlement_client::SettlementClient;
use crate::types::NodeResult;

/// Configuration for reaching the master's settlement endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub connect_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: normalize_endpoint(&endpoint.into()),
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Errors surfaced while settling with the master.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("rpc error: {0}")]
    Rpc(#[from] tonic::Status),
}

/// Worker-side handle to the master's settlement service.
#[derive(Clone)]
pub struct SettleClient {
    inner: SettlementClient<Channel>,
}

impl SettleClient {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let mut endpoint = Endpoint::from_shared(config.endpoint)?;
        if let Some(timeout) = config.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        let channel = endpoint.connect().await?;
        Ok(Self {
            inner: SettlementClient::new(channel),
        })
    }

    /// Send one result. Returns whether the master recorded it; `false` means
    /// the master already held a result for this order.
    pub async fn settle(&self, result: NodeResult) -> Result<bool, ClientError> {
        let mut client = self.inner.clone();
        let response = client
            .settle(SettleRequest {
                result: Some(result.into()),
            })
            .await?
            .into_inner();
        Ok(response.recorded)
    }
}

pub fn normalize_endpoint(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}
