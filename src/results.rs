use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::barrier::Barrier;
use crate::types::{MASTER_ORDER, NodeOrder, NodeResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResultError {
    #[error("node order {order} is outside 1..={total_nodes}")]
    OrderOutOfRange { order: NodeOrder, total_nodes: NodeOrder },
    #[error("node order {0} cannot be settled remotely")]
    ReservedOrder(NodeOrder),
    #[error("node order {0} is not the master's order")]
    NotMasterOrder(NodeOrder),
    #[error("settlement collection is already armed")]
    AlreadyArmed,
}

/// Whether an incoming result was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Inserted,
    /// The order was already present; the first arrival is kept.
    Duplicate,
}

/// Master-owned table of node results keyed by order.
///
/// Worker results may arrive before the master has finished its own load.
/// They are stored right away, but the barrier is only signaled once
/// collection has been armed, so the worker-completion phase of the barrier
/// is never disturbed by early settlements.
pub struct ResultStore {
    total_nodes: NodeOrder,
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    results: BTreeMap<NodeOrder, NodeResult>,
    collecting: Option<Arc<Barrier>>,
}

impl StoreState {
    fn workers_received(&self) -> u64 {
        self.results
            .keys()
            .filter(|order| **order != MASTER_ORDER)
            .count() as u64
    }
}

impl ResultStore {
    pub fn new(total_nodes: NodeOrder) -> Self {
        Self {
            total_nodes,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn total_nodes(&self) -> NodeOrder {
        self.total_nodes
    }

    /// Record the master's own result.
    pub async fn record_local(&self, result: NodeResult) -> Result<Recorded, ResultError> {
        if result.order != MASTER_ORDER {
            return Err(ResultError::NotMasterOrder(result.order));
        }
        Ok(self.insert(result).await)
    }

    /// Record a result received from a worker.
    pub async fn record_remote(&self, result: NodeResult) -> Result<Recorded, ResultError> {
        if result.order == MASTER_ORDER {
            return Err(ResultError::ReservedOrder(result.order));
        }
        if result.order == 0 || result.order > self.total_nodes {
            return Err(ResultError::OrderOutOfRange {
                order: result.order,
                total_nodes: self.total_nodes,
            });
        }
        Ok(self.insert(result).await)
    }

    async fn insert(&self, result: NodeResult) -> Recorded {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.results.get(&result.order) {
            warn!(
                order = result.order,
                kept_ops = existing.total_ops,
                dropped_ops = result.total_ops,
                "discarding duplicate settlement"
            );
            return Recorded::Duplicate;
        }

        state.results.insert(result.order, result);
        if result.order != MASTER_ORDER
            && let Some(barrier) = &state.collecting
        {
            barrier.done();
        }
        debug!(
            order = result.order,
            received = state.results.len(),
            total = self.total_nodes,
            "result recorded"
        );
        Recorded::Inserted
    }

    /// Start counting worker settlements on `barrier`.
    ///
    /// Raises the barrier by the number of worker results still missing and
    /// returns that number.
    pub async fn arm(&self, barrier: Arc<Barrier>) -> Result<u64, ResultError> {
        let mut state = self.state.lock().await;
        if state.collecting.is_some() {
            return Err(ResultError::AlreadyArmed);
        }
        let expected = u64::from(self.total_nodes.saturating_sub(1));
        let missing = expected.saturating_sub(state.workers_received());
        barrier.add(missing);
        state.collecting = Some(barrier);
        Ok(missing)
    }

    pub async fn is_armed(&self) -> bool {
        self.state.lock().await.collecting.is_some()
    }

    pub async fn received(&self) -> usize {
        self.state.lock().await.results.len()
    }

    pub async fn is_complete(&self) -> bool {
        self.received().await == self.total_nodes as usize
    }

    pub async fn get(&self, order: NodeOrder) -> Option<NodeResult> {
        self.state.lock().await.results.get(&order).copied()
    }

    /// Copy of every recorded result in order.
    pub async fn snapshot(&self) -> Vec<NodeResult> {
        self.state.lock().await.results.values().copied().collect()
    }
}
