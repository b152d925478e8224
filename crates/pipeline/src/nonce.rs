//! Nonce resolution for new operations.

use alloy_primitives::{Address, U256};
use tracing::debug;
use userop_core::UserOperationDraft;
use userop_rpc_client::{CallContext, PublicClient, RpcError};

/// Nonce for `draft`: zero for an undeployed sender that carries its factory, otherwise the
/// sequential nonce the `EntryPoint` holds for key 0.
pub async fn resolve_nonce(
    ctx: &CallContext,
    public: &PublicClient,
    entry_point: Address,
    draft: &UserOperationDraft,
) -> Result<U256, RpcError> {
    if draft.factory.is_some() && !public.is_deployed(ctx, draft.sender).await? {
        debug!(sender = %draft.sender, "sender not deployed yet, nonce 0");
        return Ok(U256::ZERO);
    }
    public.get_nonce(ctx, entry_point, draft.sender).await
}
