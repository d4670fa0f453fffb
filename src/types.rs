use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 1-based position of a node in the configured address list.
pub type NodeOrder = u32;
/// Wall-clock timestamp in milliseconds since the Unix epoch.
pub type Millis = u64;

/// Order held by the master node.
pub const MASTER_ORDER: NodeOrder = 1;

/// Current local wall-clock time in milliseconds.
///
/// Nodes never compare clocks with each other beyond this value; a clock set
/// before the epoch reads as zero.
pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as Millis)
        .unwrap_or_default()
}

/// Operations per second over a millisecond span, rounded down and capped
/// at `u64::MAX`.
pub fn throughput(total_ops: u64, total_dur: Millis) -> u64 {
    let dur = u128::from(total_dur.max(1));
    u64::try_from(u128::from(total_ops) * 1000 / dur).unwrap_or(u64::MAX)
}

/// Render a millisecond span as seconds with three decimals.
pub fn format_secs(millis: Millis) -> String {
    format!("{:.3}s", millis as f64 / 1000.0)
}

/// Identifier attached to every log line and report of a single run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Load figures captured by one node before it knows its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMeasurement {
    pub total_ops: u64,
    pub ts_begin: Millis,
    pub ts_end: Millis,
}

impl LocalMeasurement {
    pub fn into_result(self, order: NodeOrder) -> NodeResult {
        NodeResult::new(order, self.total_ops, self.ts_begin, self.ts_end)
    }
}

/// Outcome of one node's local load run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeResult {
    pub order: NodeOrder,
    pub total_ops: u64,
    pub ts_begin: Millis,
    pub ts_end: Millis,
    /// `ts_end - ts_begin`, never below 1.
    pub total_dur: Millis,
}

impl NodeResult {
    pub fn new(order: NodeOrder, total_ops: u64, ts_begin: Millis, ts_end: Millis) -> Self {
        Self {
            order,
            total_ops,
            ts_begin,
            ts_end,
            total_dur: ts_end.saturating_sub(ts_begin).max(1),
        }
    }

    pub fn throughput(&self) -> u64 {
        throughput(self.total_ops, self.total_dur)
    }
}

/// Cross-node aggregate computed by the master.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    pub nodes: u32,
    pub total_ops: u64,
    pub total_dur: Millis,
    pub throughput: u64,
}

/// Role of a node within a multi-node run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Worker,
}

/// A participant in a multi-node run, fixed for the run's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub order: NodeOrder,
    pub address: String,
    pub role: NodeRole,
}

impl Node {
    pub fn new(order: NodeOrder, address: impl Into<String>) -> Self {
        let role = if order == MASTER_ORDER {
            NodeRole::Master
        } else {
            NodeRole::Worker
        };
        Self {
            order,
            address: address.into(),
            role,
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }
}
