use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tonic::transport::Server;
use tonic::transport::server::TcpIncoming;
use tracing::{info, warn};

use crate::barrier::Barrier;
use crate::client::{ClientConfig, ClientError, SettleClient};
use crate::config::Topology;
use crate::results::{Recorded, ResultError, ResultStore};
use crate::rpc::server::SettlementService;
use crate::rpc::service::settlement_server::SettlementServer;
use crate::summary::{SummaryError, summarize};
use crate::types::{Node, NodeOrder, NodeResult, Summary};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("settlement transport failed: {0}")]
    Transport(#[from] ClientError),
    #[error("failed to bind settlement listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start settlement listener: {0}")]
    Listener(String),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error("result carries order {actual} but this node is {expected}")]
    OrderMismatch {
        expected: NodeOrder,
        actual: NodeOrder,
    },
    #[error("node has already settled")]
    AlreadySettled,
    #[error("summary requested before the master settled its own result")]
    NotSettled,
    #[error("only the master node produces a summary")]
    NotMaster,
    #[error("timed out after {timeout:?} with {received} of {expected} node results")]
    SettleTimeout {
        timeout: Duration,
        received: usize,
        expected: NodeOrder,
    },
    #[error("summary attempted with {received} of {expected} node results")]
    Incomplete { received: usize, expected: NodeOrder },
}

/// Capability a session uses to take part in a multi-node run.
#[async_trait]
pub trait NodeCoordinator: Send + Sync {
    fn node(&self) -> &Node;

    fn is_master(&self) -> bool {
        self.node().is_master()
    }

    /// Hand the local result over: workers send it to the master, the master
    /// records it and starts collecting worker settlements.
    async fn settle(&self, result: NodeResult) -> Result<(), CoordinatorError>;

    /// Cross-node summary; only available on the master.
    async fn summary(&self) -> Result<Summary, CoordinatorError>;

    async fn shutdown(&self) {}
}

/// Build the coordinator matching the local node's role.
///
/// For the master this binds the settlement listener right away so workers
/// that finish early never find the port closed.
pub async fn connect(
    topology: &Topology,
    barrier: Arc<Barrier>,
    listen_addr: Option<&str>,
    settle_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
) -> Result<Arc<dyn NodeCoordinator>, CoordinatorError> {
    if topology.local.is_master() {
        let addr = listen_addr.unwrap_or(&topology.local.address);
        let master = MasterCoordinator::bind(
            topology.local.clone(),
            topology.total_nodes,
            barrier,
            addr,
            settle_timeout,
        )
        .await?;
        Ok(Arc::new(master))
    } else {
        let config =
            ClientConfig::new(&topology.master.address).with_connect_timeout(connect_timeout);
        Ok(Arc::new(WorkerCoordinator::new(
            topology.local.clone(),
            config,
        )))
    }
}

struct ServerHandle {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Order-1 node: runs the settlement listener and aggregates every result.
pub struct MasterCoordinator {
    node: Node,
    local_addr: SocketAddr,
    results: Arc<ResultStore>,
    barrier: Arc<Barrier>,
    settle_timeout: Option<Duration>,
    summary: OnceCell<Summary>,
    server: Mutex<Option<ServerHandle>>,
}

impl MasterCoordinator {
    pub async fn bind(
        node: Node,
        total_nodes: NodeOrder,
        barrier: Arc<Barrier>,
        addr: &str,
        settle_timeout: Option<Duration>,
    ) -> Result<Self, CoordinatorError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CoordinatorError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Self::start(node, total_nodes, barrier, listener, settle_timeout)
    }

    /// Serve settlements on an already bound listener.
    pub fn start(
        node: Node,
        total_nodes: NodeOrder,
        barrier: Arc<Barrier>,
        listener: TcpListener,
        settle_timeout: Option<Duration>,
    ) -> Result<Self, CoordinatorError> {
        let local_addr = listener
            .local_addr()
            .map_err(|err| CoordinatorError::Listener(err.to_string()))?;
        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|err| CoordinatorError::Listener(err.to_string()))?;

        let results = Arc::new(ResultStore::new(total_nodes));
        let service = SettlementService::new(results.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let served = Server::builder()
                .add_service(SettlementServer::new(service))
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                warn!(addr = %local_addr, error = %err, "settlement listener failed");
            }
            info!(addr = %local_addr, "settlement listener terminated");
        });
        info!(addr = %local_addr, total_nodes, "settlement listener started");

        Ok(Self {
            node,
            local_addr,
            results,
            barrier,
            settle_timeout,
            summary: OnceCell::new(),
            server: Mutex::new(Some(ServerHandle {
                shutdown_tx,
                handle,
            })),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn results(&self) -> &Arc<ResultStore> {
        &self.results
    }

    /// Summary computed by an earlier `summary()` call, if any.
    pub fn cached_summary(&self) -> Option<Summary> {
        self.summary.get().copied()
    }

    async fn wait_for_workers(&self) -> Result<(), CoordinatorError> {
        let Some(timeout) = self.settle_timeout else {
            self.barrier.wait().await;
            return Ok(());
        };
        if tokio::time::timeout(timeout, self.barrier.wait())
            .await
            .is_err()
        {
            return Err(CoordinatorError::SettleTimeout {
                timeout,
                received: self.results.received().await,
                expected: self.results.total_nodes(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NodeCoordinator for MasterCoordinator {
    fn node(&self) -> &Node {
        &self.node
    }

    async fn settle(&self, result: NodeResult) -> Result<(), CoordinatorError> {
        if result.order != self.node.order {
            return Err(CoordinatorError::OrderMismatch {
                expected: self.node.order,
                actual: result.order,
            });
        }
        if self.results.record_local(result).await? == Recorded::Duplicate {
            return Err(CoordinatorError::AlreadySettled);
        }

        let missing = self.results.arm(self.barrier.clone()).await?;
        info!(
            missing,
            total_nodes = self.results.total_nodes(),
            "master result recorded, awaiting worker settlements"
        );
        Ok(())
    }

    async fn summary(&self) -> Result<Summary, CoordinatorError> {
        if let Some(summary) = self.summary.get() {
            return Ok(*summary);
        }
        if !self.results.is_armed().await {
            return Err(CoordinatorError::NotSettled);
        }

        self.wait_for_workers().await?;

        let results = self.results.snapshot().await;
        let expected = self.results.total_nodes();
        if results.len() != expected as usize {
            return Err(CoordinatorError::Incomplete {
                received: results.len(),
                expected,
            });
        }
        let summary = self.summary.get_or_try_init(|| summarize(&results))?;
        Ok(*summary)
    }

    async fn shutdown(&self) {
        let Some(server) = self.server.lock().await.take() else {
            return;
        };
        let _ = server.shutdown_tx.send(());
        let _ = server.handle.await;
    }
}

/// Any node other than order 1: sends its result to the master exactly once.
pub struct WorkerCoordinator {
    node: Node,
    master: ClientConfig,
    settled: AtomicBool,
}

impl WorkerCoordinator {
    pub fn new(node: Node, master: ClientConfig) -> Self {
        Self {
            node,
            master,
            settled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl NodeCoordinator for WorkerCoordinator {
    fn node(&self) -> &Node {
        &self.node
    }

    async fn settle(&self, result: NodeResult) -> Result<(), CoordinatorError> {
        if result.order != self.node.order {
            return Err(CoordinatorError::OrderMismatch {
                expected: self.node.order,
                actual: result.order,
            });
        }
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(CoordinatorError::AlreadySettled);
        }

        let client = SettleClient::connect(self.master.clone()).await?;
        let recorded = client.settle(result).await?;
        if recorded {
            info!(master = %self.master.endpoint, "result settled with master");
        } else {
            warn!(
                master = %self.master.endpoint,
                order = self.node.order,
                "master already held a result for this order"
            );
        }
        Ok(())
    }

    async fn summary(&self) -> Result<Summary, CoordinatorError> {
        Err(CoordinatorError::NotMaster)
    }
}
