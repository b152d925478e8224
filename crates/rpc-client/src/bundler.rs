//! ERC-4337 bundler client.

use alloy_primitives::{Address, B256};
use tracing::info;
use url::Url;
use userop_core::{GasEstimate, UserOperationDraft};

use crate::{
    context::CallContext,
    error::RpcError,
    receipt::{ReceiptPolling, UserOperationReceipt, poll_receipt},
    transport::JsonRpcTransport,
};

/// ERC-4337 bundler JSON-RPC client.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    transport: JsonRpcTransport,
}

impl BundlerClient {
    /// Client for the bundler at `url`.
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { transport: JsonRpcTransport::new(http, url, "bundler") }
    }

    /// Bundler endpoint.
    pub const fn url(&self) -> &Url {
        self.transport.url()
    }

    /// `eth_estimateUserOperationGas`. Paymaster fields on `draft` are sent along so the
    /// estimate covers paymaster validation.
    pub async fn estimate_user_operation_gas(
        &self,
        ctx: &CallContext,
        draft: &UserOperationDraft,
        entry_point: Address,
    ) -> Result<GasEstimate, RpcError> {
        self.transport.call(ctx, "eth_estimateUserOperationGas", (draft, entry_point)).await
    }

    /// `eth_sendUserOperation`, returning the userOpHash computed by the bundler.
    pub async fn send_user_operation(
        &self,
        ctx: &CallContext,
        draft: &UserOperationDraft,
        entry_point: Address,
    ) -> Result<B256, RpcError> {
        let hash: B256 =
            self.transport.call(ctx, "eth_sendUserOperation", (draft, entry_point)).await?;
        info!(sender = %draft.sender, user_op_hash = %hash, "user operation sent");
        Ok(hash)
    }

    /// `eth_getUserOperationReceipt`; `None` while the operation is pending.
    pub async fn get_user_operation_receipt(
        &self,
        ctx: &CallContext,
        hash: B256,
    ) -> Result<Option<UserOperationReceipt>, RpcError> {
        self.transport.call(ctx, "eth_getUserOperationReceipt", [hash]).await
    }

    /// Polls for the receipt of `hash` until it is included or `polling.timeout` elapses.
    pub async fn wait_for_receipt(
        &self,
        ctx: &CallContext,
        hash: B256,
        polling: ReceiptPolling,
    ) -> Result<UserOperationReceipt, RpcError> {
        let receipt =
            poll_receipt(ctx, hash, polling, move || self.get_user_operation_receipt(ctx, hash))
                .await?;
        info!(
            user_op_hash = %hash,
            transaction_hash = %receipt.receipt.transaction_hash,
            success = receipt.success,
            "user operation included"
        );
        Ok(receipt)
    }

    /// `eth_supportedEntryPoints`.
    pub async fn supported_entry_points(&self, ctx: &CallContext) -> Result<Vec<Address>, RpcError> {
        self.transport.call(ctx, "eth_supportedEntryPoints", [(); 0]).await
    }
}
