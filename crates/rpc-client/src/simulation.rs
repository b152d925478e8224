//! Vendor transaction simulation client.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use crate::{context::CallContext, error::RpcError, transport::JsonRpcTransport};

/// Method used when the endpoint does not name its own.
pub const DEFAULT_SIMULATION_METHOD: &str = "tenderly_simulateTransaction";

/// The transaction handed to the simulation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    /// Transaction sender.
    pub from: Address,
    /// `EntryPoint` address.
    pub to: Address,
    /// Gas limit.
    pub gas: U256,
    /// Gas price.
    pub gas_price: U256,
    /// Wei sent.
    pub value: U256,
    /// Encoded `handleOps` or `simulateValidation` call.
    pub data: Bytes,
}

/// Client for a vendor `*_simulateTransaction` endpoint returning a call trace.
#[derive(Debug, Clone)]
pub struct SimulationRpcClient {
    transport: JsonRpcTransport,
    method: String,
}

impl SimulationRpcClient {
    /// Client for `url`, calling `method` or the default method.
    pub fn new(http: reqwest::Client, url: Url, method: Option<String>) -> Self {
        Self {
            transport: JsonRpcTransport::new(http, url, "simulation"),
            method: method.unwrap_or_else(|| DEFAULT_SIMULATION_METHOD.to_string()),
        }
    }

    /// JSON-RPC method used.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Simulates `request` on the latest block, optionally with the block timestamp forced
    /// to `block_time` (unix seconds). Returns the raw trace.
    pub async fn simulate(
        &self,
        ctx: &CallContext,
        request: &SimulationRequest,
        block_time: Option<u64>,
    ) -> Result<Value, RpcError> {
        self.transport.call(ctx, &self.method, simulation_params(request, block_time)?).await
    }
}

fn simulation_params(request: &SimulationRequest, block_time: Option<u64>) -> Result<Value, RpcError> {
    let tx = serde_json::to_value(request)?;
    Ok(match block_time {
        Some(time) => json!([tx, "latest", {}, { "time": format!("{time:#x}") }]),
        None => json!([tx, "latest"]),
    })
}
