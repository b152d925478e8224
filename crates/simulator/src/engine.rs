//! Seam between the simulator and a simulation backend.

use async_trait::async_trait;
use serde_json::Value;
use userop_rpc_client::{CallContext, RpcError, SimulationRequest, SimulationRpcClient};

/// Executes a transaction against chain state without broadcasting it and returns the raw
/// trace.
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    /// Simulate `request`, with the block timestamp forced to `block_time` when given.
    async fn simulate_transaction(
        &self,
        ctx: &CallContext,
        request: &SimulationRequest,
        block_time: Option<u64>,
    ) -> Result<Value, RpcError>;
}

#[async_trait]
impl SimulationEngine for SimulationRpcClient {
    async fn simulate_transaction(
        &self,
        ctx: &CallContext,
        request: &SimulationRequest,
        block_time: Option<u64>,
    ) -> Result<Value, RpcError> {
        self.simulate(ctx, request, block_time).await
    }
}
