//! Cancellation and per-call timeouts.

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::error::RpcError;

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-operation cancellation and per-call deadline, passed to every network call.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Duration,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(CancellationToken::new(), DEFAULT_CALL_TIMEOUT)
    }
}

impl CallContext {
    /// Context cancelled by `cancel`, with `timeout` per call.
    pub const fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    /// Same cancellation, different per-call timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self { cancel: self.cancel.clone(), timeout }
    }

    /// A context cancelled together with this one, and independently cancellable.
    pub fn child(&self) -> Self {
        Self { cancel: self.cancel.child_token(), timeout: self.timeout }
    }

    /// Per-call timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Underlying cancellation token.
    pub const fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abandons every call running under this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails fast when the operation is already abandoned.
    pub fn ensure_active(&self, method: &str) -> Result<(), RpcError> {
        if self.is_cancelled() {
            return Err(RpcError::Cancelled { method: method.to_string() });
        }
        Ok(())
    }

    /// Drives `call` under the deadline and the cancellation token. A result that arrives
    /// after cancellation is dropped.
    pub async fn run<T, F>(&self, method: &str, call: F) -> Result<T, RpcError>
    where
        F: Future<Output = Result<T, RpcError>>,
    {
        self.ensure_active(method)?;
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(RpcError::Cancelled { method: method.to_string() });
            }
            outcome = tokio::time::timeout(self.timeout, call) => outcome,
        };
        self.ensure_active(method)?;
        outcome.map_err(|_| RpcError::Timeout { method: method.to_string(), timeout: self.timeout })?
    }
}
