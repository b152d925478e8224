//! Node reads and raw transaction submission.

use alloy_eips::eip1559::Eip1559Estimation;
use alloy_primitives::{Address, B256, Bytes, U256, aliases::U192};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{TransactionInput, TransactionReceipt, TransactionRequest};
use tracing::{debug, info};
use url::Url;
use userop_core::KnownCall;

use crate::{
    context::CallContext,
    error::RpcError,
    receipt::{ReceiptPolling, poll_receipt},
};

/// Read access to the chain plus raw transaction submission, over an alloy provider.
#[derive(Debug, Clone)]
pub struct PublicClient {
    provider: RootProvider,
}

fn provider_error(e: impl std::fmt::Display) -> RpcError {
    RpcError::Provider(e.to_string())
}

impl PublicClient {
    /// Client for the node at `url`.
    pub fn new(url: Url) -> Self {
        Self { provider: RootProvider::new_http(url) }
    }

    /// Underlying alloy provider.
    pub const fn provider(&self) -> &RootProvider {
        &self.provider
    }

    /// `eth_chainId`.
    pub async fn chain_id(&self, ctx: &CallContext) -> Result<u64, RpcError> {
        ctx.run("eth_chainId", async { self.provider.get_chain_id().await.map_err(provider_error) })
            .await
    }

    /// `EntryPoint.getNonce(sender, 0)`.
    pub async fn get_nonce(
        &self,
        ctx: &CallContext,
        entry_point: Address,
        sender: Address,
    ) -> Result<U256, RpcError> {
        let data = KnownCall::GetNonce { sender, key: U192::ZERO }.abi_encode();
        let request = TransactionRequest::default().to(entry_point).input(TransactionInput::new(data));
        let output: Bytes = ctx
            .run("eth_call", async { self.provider.call(request).await.map_err(provider_error) })
            .await?;
        if output.len() < 32 {
            return Err(RpcError::Decode(format!(
                "getNonce returned {} bytes, expected 32",
                output.len()
            )));
        }
        let nonce = U256::from_be_slice(&output[..32]);
        debug!(%sender, %entry_point, %nonce, "read account nonce");
        Ok(nonce)
    }

    /// Contract code at `address`.
    pub async fn get_code(&self, ctx: &CallContext, address: Address) -> Result<Bytes, RpcError> {
        ctx.run("eth_getCode", async {
            self.provider.get_code_at(address).await.map_err(provider_error)
        })
        .await
    }

    /// Whether `address` has code.
    pub async fn is_deployed(&self, ctx: &CallContext, address: Address) -> Result<bool, RpcError> {
        Ok(!self.get_code(ctx, address).await?.is_empty())
    }

    /// Pending transaction count of an externally owned account.
    pub async fn get_transaction_count(
        &self,
        ctx: &CallContext,
        address: Address,
    ) -> Result<u64, RpcError> {
        ctx.run("eth_getTransactionCount", async {
            self.provider.get_transaction_count(address).pending().await.map_err(provider_error)
        })
        .await
    }

    /// EIP-1559 fee caps from recent fee history.
    pub async fn estimate_fees(&self, ctx: &CallContext) -> Result<Eip1559Estimation, RpcError> {
        ctx.run("eth_feeHistory", async {
            self.provider.estimate_eip1559_fees().await.map_err(provider_error)
        })
        .await
    }

    /// `eth_sendRawTransaction` of an already 2718-encoded transaction.
    pub async fn send_raw_transaction(
        &self,
        ctx: &CallContext,
        encoded: &[u8],
    ) -> Result<B256, RpcError> {
        let hash = ctx
            .run("eth_sendRawTransaction", async {
                let pending =
                    self.provider.send_raw_transaction(encoded).await.map_err(provider_error)?;
                Ok(*pending.tx_hash())
            })
            .await?;
        info!(transaction_hash = %hash, "raw transaction sent");
        Ok(hash)
    }

    /// `eth_getTransactionReceipt`; `None` while pending.
    pub async fn get_transaction_receipt(
        &self,
        ctx: &CallContext,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        ctx.run("eth_getTransactionReceipt", async {
            self.provider.get_transaction_receipt(hash).await.map_err(provider_error)
        })
        .await
    }

    /// Polls `eth_getTransactionReceipt` until the transaction is mined.
    pub async fn wait_for_transaction_receipt(
        &self,
        ctx: &CallContext,
        hash: B256,
        polling: ReceiptPolling,
    ) -> Result<TransactionReceipt, RpcError> {
        let receipt =
            poll_receipt(ctx, hash, polling, move || self.get_transaction_receipt(ctx, hash))
                .await?;
        info!(
            transaction_hash = %hash,
            block_number = ?receipt.block_number,
            status = receipt.status(),
            "transaction mined"
        );
        Ok(receipt)
    }
}
