use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Instrument, info, info_span};

use crate::barrier::Barrier;
use crate::config::WorkloadConfig;
use crate::coordinator::{CoordinatorError, NodeCoordinator};
use crate::store::StoreClient;
use crate::summary::{SummaryError, summarize};
use crate::types::{MASTER_ORDER, Node, NodeResult, RunId, Summary, format_secs};
use crate::workload::{WorkloadError, run_workers};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Workload(#[from] WorkloadError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What one node knows at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: RunId,
    /// `None` in single-node mode.
    pub node: Option<Node>,
    pub local: NodeResult,
    /// Present on a single node and on the master of a multi-node run.
    pub summary: Option<Summary>,
}

impl RunReport {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let encoded = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }
}

/// One benchmark run on this node.
///
/// Owns the barrier shared by the load phase and the settlement phase, and
/// the coordinator when the run spans several nodes.
pub struct BenchSession {
    run_id: RunId,
    workload: WorkloadConfig,
    barrier: Arc<Barrier>,
    coordinator: Option<Arc<dyn NodeCoordinator>>,
}

impl BenchSession {
    pub fn new(workload: WorkloadConfig) -> Self {
        Self {
            run_id: RunId::new(),
            workload,
            barrier: Arc::new(Barrier::new()),
            coordinator: None,
        }
    }

    pub fn with_coordinator(mut self, coordinator: Arc<dyn NodeCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Barrier to hand to a master coordinator before attaching it.
    pub fn barrier(&self) -> Arc<Barrier> {
        self.barrier.clone()
    }

    pub fn coordinator(&self) -> Option<&Arc<dyn NodeCoordinator>> {
        self.coordinator.as_ref()
    }

    /// Role label carried by the run span: `master`, `worker` or `single`.
    pub fn role(&self) -> &'static str {
        match &self.coordinator {
            Some(coordinator) if coordinator.is_master() => "master",
            Some(_) => "worker",
            None => "single",
        }
    }

    pub async fn run(&self, store: Arc<dyn StoreClient>) -> Result<RunReport, SessionError> {
        let order = self
            .coordinator
            .as_ref()
            .map(|c| c.node().order)
            .unwrap_or(MASTER_ORDER);
        let span = info_span!("run", run_id = %self.run_id, role = self.role(), order);
        self.run_inner(order, store).instrument(span).await
    }

    async fn run_inner(
        &self,
        order: u32,
        store: Arc<dyn StoreClient>,
    ) -> Result<RunReport, SessionError> {
        info!(
            workers = self.workload.workers,
            ops_per_worker = self.workload.ops_per_worker,
            payload_size = self.workload.payload_size,
            total_ops = self.workload.total_ops(),
            total_bytes = self.workload.total_bytes(),
            "benchmark starting"
        );

        let measurement = run_workers(&self.barrier, &self.workload, store).await?;
        let local = measurement.into_result(order);
        info!(
            total_ops = local.total_ops,
            duration = %format_secs(local.total_dur),
            tps = local.throughput(),
            "benchmark done"
        );

        let Some(coordinator) = &self.coordinator else {
            let summary = summarize([&local])?;
            return Ok(self.report(None, local, Some(summary)));
        };

        coordinator.settle(local).await?;
        if !coordinator.is_master() {
            info!("see summary info on node {MASTER_ORDER}");
            return Ok(self.report(Some(coordinator.node().clone()), local, None));
        }

        let summary = coordinator.summary().await;
        coordinator.shutdown().await;
        let summary = summary?;
        info!(
            nodes = summary.nodes,
            total_ops = summary.total_ops,
            duration = %format_secs(summary.total_dur),
            tps = summary.throughput,
            "summary"
        );
        Ok(self.report(Some(coordinator.node().clone()), local, Some(summary)))
    }

    fn report(&self, node: Option<Node>, local: NodeResult, summary: Option<Summary>) -> RunReport {
        RunReport {
            run_id: self.run_id,
            node,
            local,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::NodeRole;

    /// Records what the session hands it and serves a canned summary.
    struct FakeCoordinator {
        node: Node,
        settled: Mutex<Vec<NodeResult>>,
        summaries: AtomicUsize,
    }

    impl FakeCoordinator {
        fn new(order: u32) -> Self {
            Self {
                node: Node::new(order, format!("10.0.0.{order}:7000")),
                settled: Mutex::new(Vec::new()),
                summaries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NodeCoordinator for FakeCoordinator {
        fn node(&self) -> &Node {
            &self.node
        }

        async fn settle(&self, result: NodeResult) -> Result<(), CoordinatorError> {
            self.settled.lock().unwrap().push(result);
            Ok(())
        }

        async fn summary(&self) -> Result<Summary, CoordinatorError> {
            if !self.is_master() {
                return Err(CoordinatorError::NotMaster);
            }
            self.summaries.fetch_add(1, Ordering::SeqCst);
            Ok(Summary {
                nodes: 2,
                total_ops: 1,
                total_dur: 1,
                throughput: 1000,
            })
        }
    }

    fn workload(workers: usize, ops: usize) -> WorkloadConfig {
        WorkloadConfig {
            workers,
            ops_per_worker: ops,
            payload_size: 8,
            ttl: None,
        }
    }

    #[tokio::test]
    async fn single_node_reports_its_own_summary() {
        let session = BenchSession::new(workload(4, 1000));
        let store = Arc::new(InMemoryStore::new());

        let report = session.run(store.clone()).await.unwrap();
        assert_eq!(report.node, None);
        assert_eq!(report.local.order, 1);
        assert_eq!(report.local.total_ops, 4000);
        let summary = report.summary.unwrap();
        assert_eq!(summary.total_ops, 4000);
        assert_eq!(summary.total_dur, report.local.total_dur);
        assert_eq!(store.len().await, 4000);
    }

    #[tokio::test]
    async fn worker_settles_and_skips_summary() {
        let fake = Arc::new(FakeCoordinator::new(3));
        let session = BenchSession::new(workload(2, 5)).with_coordinator(fake.clone());

        let report = session.run(Arc::new(InMemoryStore::new())).await.unwrap();
        assert_eq!(report.summary, None);
        assert_eq!(report.node.unwrap().role, NodeRole::Worker);

        let settled = fake.settled.lock().unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].order, 3);
        assert_eq!(settled[0].total_ops, 10);
        assert_eq!(fake.summaries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn master_settles_then_summarizes() {
        let fake = Arc::new(FakeCoordinator::new(1));
        let session = BenchSession::new(workload(1, 3)).with_coordinator(fake.clone());

        let report = session.run(Arc::new(InMemoryStore::new())).await.unwrap();
        assert_eq!(report.summary.unwrap().throughput, 1000);
        assert_eq!(fake.settled.lock().unwrap()[0].order, 1);
        assert_eq!(fake.summaries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn role_follows_the_coordinator() {
        assert_eq!(BenchSession::new(workload(1, 1)).role(), "single");
        let master = BenchSession::new(workload(1, 1))
            .with_coordinator(Arc::new(FakeCoordinator::new(1)));
        assert_eq!(master.role(), "master");
        let worker = BenchSession::new(workload(1, 1))
            .with_coordinator(Arc::new(FakeCoordinator::new(2)));
        assert_eq!(worker.role(), "worker");
    }

    #[tokio::test]
    async fn report_round_trips_through_json_file() {
        let session = BenchSession::new(workload(1, 2));
        let report = session.run(Arc::new(InMemoryStore::new())).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let decoded: RunReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded, report);
        assert_eq!(decoded.run_id, session.run_id());
    }
}
