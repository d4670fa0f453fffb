pub mod server;

pub mod service {
    tonic::include_proto!("kvbench");
}

use tonic::Status;

use crate::types::NodeResult;
use service::NodeResultMessage;

impl From<NodeResult> for NodeResultMessage {
    fn from(result: NodeResult) -> Self {
        Self {
            order: result.order,
            total_ops: result.total_ops,
            ts_begin: result.ts_begin,
            ts_end: result.ts_end,
            total_dur: result.total_dur,
        }
    }
}

impl TryFrom<NodeResultMessage> for NodeResult {
    type Error = Status;

    fn try_from(msg: NodeResultMessage) -> Result<Self, Self::Error> {
        if msg.ts_end < msg.ts_begin {
            return Err(Status::invalid_argument(format!(
                "result for node {} ends before it begins",
                msg.order
            )));
        }
        // The duration is rederived so a sender cannot report an inconsistent one.
        Ok(NodeResult::new(
            msg.order,
            msg.total_ops,
            msg.ts_begin,
            msg.ts_end,
        ))
    }
}
