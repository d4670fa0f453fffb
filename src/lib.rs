//! Distributed key-value write benchmark.
//!
//! Every node runs the same local write load. In a multi-node run the node
//! listed first acts as master: the others settle their results with it over
//! gRPC and the master reports one summary spanning the whole run.

pub mod barrier;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod results;
pub mod rpc;
pub mod session;
pub mod store;
pub mod summary;
pub mod types;
pub mod workload;

pub use barrier::Barrier;
pub use client::{ClientConfig, ClientError, SettleClient};
pub use config::{
    BenchConfig, ClusterConfig, ConfigError, StoreBackend, StoreConfig, Topology, WorkloadConfig,
};
pub use coordinator::{CoordinatorError, MasterCoordinator, NodeCoordinator, WorkerCoordinator};
pub use results::{Recorded, ResultError, ResultStore};
pub use session::{BenchSession, RunReport, SessionError};
pub use store::{InMemoryStore, RedisStore, StoreAdapter, StoreClient, StoreError};
pub use summary::{SummaryError, summarize};
pub use types::{LocalMeasurement, Node, NodeOrder, NodeResult, NodeRole, RunId, Summary};
pub use workload::{WorkloadError, run_workers};
