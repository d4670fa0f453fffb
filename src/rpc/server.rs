use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::info;

use crate::results::{Recorded, ResultStore};
use crate::types::NodeResult;

use super::service::settlement_server::Settlement;
use super::service::{SettleRequest, SettleResponse};

/// gRPC service through which workers hand their result to the master.
pub struct SettlementService {
    results: Arc<ResultStore>,
}

impl SettlementService {
    pub fn new(results: Arc<ResultStore>) -> Self {
        Self { results }
    }
}

#[tonic::async_trait]
impl Settlement for SettlementService {
    async fn settle(
        &self,
        request: Request<SettleRequest>,
    ) -> Result<Response<SettleResponse>, Status> {
        let remote = request.remote_addr();
        let msg = request
            .into_inner()
            .result
            .ok_or_else(|| Status::invalid_argument("settle request carries no result"))?;
        let result = NodeResult::try_from(msg)?;

        let recorded = self
            .results
            .record_remote(result)
            .await
            .map_err(|err| Status::invalid_argument(err.to_string()))?;

        info!(
            order = result.order,
            total_ops = result.total_ops,
            remote = ?remote,
            duplicate = recorded == Recorded::Duplicate,
            "settlement received"
        );
        Ok(Response::new(SettleResponse {
            recorded: recorded == Recorded::Inserted,
        }))
    }
}
