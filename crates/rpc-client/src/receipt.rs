//! Receipt types and polling.

use std::{
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use alloy_primitives::{Address, B256, U64, U256};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{context::CallContext, error::RpcError};

/// How long and how often to poll for a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolling {
    /// Pause between polls.
    pub interval: Duration,
    /// Upper bound on the whole wait.
    pub timeout: Duration,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self { interval: Duration::from_secs(2), timeout: Duration::from_secs(60) }
    }
}

impl ReceiptPolling {
    /// Polls every `interval` for at most `timeout`.
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Polls that fit in the timeout, never fewer than one.
    pub fn attempts(&self) -> usize {
        if self.interval.is_zero() {
            return 1;
        }
        let attempts = self.timeout.as_millis() / self.interval.as_millis().max(1);
        usize::try_from(attempts).unwrap_or(usize::MAX).max(1)
    }
}

/// Transaction that included the user operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedTransaction {
    /// Bundle transaction hash.
    pub transaction_hash: B256,
    /// Block that included it.
    #[serde(default)]
    pub block_hash: Option<B256>,
    /// Number of that block.
    #[serde(default)]
    pub block_number: Option<U64>,
}

/// `eth_getUserOperationReceipt` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// Operation hash.
    pub user_op_hash: B256,
    /// `EntryPoint` that executed the operation.
    #[serde(default)]
    pub entry_point: Option<Address>,
    /// Smart account.
    pub sender: Address,
    /// Nonce consumed.
    pub nonce: U256,
    /// Sponsoring paymaster, if any.
    #[serde(default)]
    pub paymaster: Option<Address>,
    /// Wei paid for the operation.
    pub actual_gas_cost: U256,
    /// Gas used by the operation.
    pub actual_gas_used: U256,
    /// Whether the account's execution succeeded; validation already passed.
    pub success: bool,
    /// The bundle transaction.
    pub receipt: IncludedTransaction,
}

/// Calls `fetch` every `polling.interval` until it yields a value, `polling.timeout` elapses,
/// or `ctx` is cancelled. The timeout bounds the whole wait, in-flight fetches included.
/// Only retryable failures are retried.
pub(crate) async fn poll_receipt<T, F, Fut>(
    ctx: &CallContext,
    hash: B256,
    polling: ReceiptPolling,
    mut fetch: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, RpcError>>,
{
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let once = move || {
        let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
        let pending = fetch();
        async move { pending.await?.ok_or(RpcError::ReceiptTimeout { hash, attempts: attempt }) }
    };

    let polled = once
        .retry(
            ConstantBuilder::default()
                .with_delay(polling.interval)
                .with_max_times(polling.attempts().saturating_sub(1)),
        )
        .when(|e: &RpcError| !ctx.is_cancelled() && e.is_retryable())
        .notify(|e: &RpcError, after: Duration| {
            debug!(%hash, error = %e, retry_in = ?after, "receipt not available yet");
        });

    tokio::select! {
        biased;
        _ = ctx.token().cancelled() => Err(RpcError::Cancelled { method: "receipt".to_string() }),
        result = tokio::time::timeout(polling.timeout, polled) => result.unwrap_or_else(|_| {
            Err(RpcError::ReceiptTimeout { hash, attempts: attempts.load(Ordering::Relaxed) })
        }),
    }
}
