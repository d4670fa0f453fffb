use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Node, NodeOrder};

/// Rejected configuration. Always fatal before any load is generated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),
    #[error("node address list contains an empty entry at position {0}")]
    EmptyAddress(usize),
    #[error("node address {0} is listed more than once")]
    DuplicateAddress(String),
    #[error("node address list is set but --node-addr is missing")]
    MissingLocalAddress,
    #[error("local address {0} is not in the node address list")]
    UnknownLocalAddress(String),
    #[error("redis backend needs at least one store address")]
    MissingStoreAddress,
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Complete configuration of one benchmark node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BenchConfig {
    pub workload: WorkloadConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

/// Local load shape, identical on every node of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// Concurrent load workers.
    pub workers: usize,
    /// Sequential writes issued by each worker.
    pub ops_per_worker: usize,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Optional expiry applied to every written key.
    #[serde(default)]
    pub ttl: Option<Duration>,
}

impl WorkloadConfig {
    pub fn total_ops(&self) -> u64 {
        (self.workers as u64) * (self.ops_per_worker as u64)
    }

    pub fn total_bytes(&self) -> u64 {
        (self.workers as u64) * (self.payload_size as u64)
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            ops_per_worker: 1000,
            payload_size: 32,
            ttl: None,
        }
    }
}

/// Supported store backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Store client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub addrs: Vec<String>,
    /// Build a cluster client instead of a single-server client.
    #[serde(default)]
    pub cluster: bool,
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            addrs: Vec::new(),
            cluster: false,
        }
    }

    pub fn redis(addrs: Vec<String>, cluster: bool) -> Self {
        Self {
            backend: StoreBackend::Redis,
            addrs,
            cluster,
        }
    }
}

/// Multi-node settings. An empty `nodes` list means single-node mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Ordered node addresses; the first entry is the master.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// This node's own entry in `nodes`.
    #[serde(default)]
    pub node_addr: Option<String>,
    /// Bind address for the master's listener, if different from its node address.
    #[serde(default)]
    pub listen_addr: Option<String>,
    /// Upper bound on the master's wait for worker settlements.
    #[serde(default)]
    pub settle_timeout: Option<Duration>,
    /// Upper bound on a worker's connection attempt to the master.
    #[serde(default)]
    pub connect_timeout: Option<Duration>,
}

/// Resolved placement of the local node within a multi-node run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub local: Node,
    pub master: Node,
    pub total_nodes: NodeOrder,
}

impl BenchConfig {
    pub fn new(workload: WorkloadConfig, store: StoreConfig) -> Self {
        Self {
            workload,
            store,
            cluster: ClusterConfig::default(),
        }
    }

    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workload.workers == 0 {
            return Err(ConfigError::NonPositive("worker count"));
        }
        if self.workload.ops_per_worker == 0 {
            return Err(ConfigError::NonPositive("operations per worker"));
        }
        if self.workload.payload_size == 0 {
            return Err(ConfigError::NonPositive("payload size"));
        }
        if self.store.backend == StoreBackend::Redis && self.store.addrs.is_empty() {
            return Err(ConfigError::MissingStoreAddress);
        }
        self.topology()?;
        Ok(())
    }

    /// Resolve the local node's role. `None` means single-node mode.
    pub fn topology(&self) -> Result<Option<Topology>, ConfigError> {
        if self.cluster.nodes.is_empty() {
            return Ok(None);
        }
        let local_addr = self
            .cluster
            .node_addr
            .as_deref()
            .ok_or(ConfigError::MissingLocalAddress)?;
        let local = resolve_node(&self.cluster.nodes, local_addr)?;

        Ok(Some(Topology {
            local,
            master: Node::new(1, self.cluster.nodes[0].trim()),
            total_nodes: self.cluster.nodes.len() as NodeOrder,
        }))
    }
}

/// Find `local` in the ordered address list and derive its order and role.
pub fn resolve_node(addresses: &[String], local: &str) -> Result<Node, ConfigError> {
    let mut seen = HashSet::new();
    for (idx, addr) in addresses.iter().enumerate() {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(ConfigError::EmptyAddress(idx + 1));
        }
        if !seen.insert(addr) {
            return Err(ConfigError::DuplicateAddress(addr.to_string()));
        }
    }

    let local = local.trim();
    addresses
        .iter()
        .position(|addr| addr.trim() == local)
        .map(|idx| Node::new(idx as NodeOrder + 1, local))
        .ok_or_else(|| ConfigError::UnknownLocalAddress(local.to_string()))
}
