//! Remote call failures.

use std::time::Duration;

use alloy_primitives::B256;

/// Failures of a remote call. Timeouts, cancellation and remote rejections are kept apart
/// so callers can retry the first without retrying the others.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// No response within the caller's deadline.
    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        /// JSON-RPC method that timed out.
        method: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The caller abandoned the operation; any late response was discarded.
    #[error("{method} cancelled")]
    Cancelled {
        /// JSON-RPC method that was in flight.
        method: String,
    },
    /// Missing, expired or rejected credential (HTTP 401/403 or empty token).
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// No paymaster policy covers the sender/target pair (HTTP 404), or the chain lacks the
    /// endpoint.
    #[error("not configured: {0}")]
    NotConfigured(String),
    /// JSON-RPC error object returned by the remote.
    #[error("rpc error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
        /// Optional error data, often the revert payload.
        data: Option<serde_json::Value>,
    },
    /// Non-success HTTP status without a JSON-RPC error body.
    #[error("http status {status}: {body}")]
    HttpStatus {
        /// Status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// Connection level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Error surfaced by the alloy provider.
    #[error("provider error: {0}")]
    Provider(String),
    /// No endpoints are configured for the chain.
    #[error("no endpoints configured for chain {0}")]
    UnknownChain(u64),
    /// The receipt did not show up in time.
    #[error("receipt for {hash} not found after {attempts} attempts")]
    ReceiptTimeout {
        /// User operation or transaction hash.
        hash: B256,
        /// Polls performed.
        attempts: usize,
    },
}

impl RpcError {
    /// Timeouts, connection failures and 5xx/429 responses.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) | Self::ReceiptTimeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Missing paymaster policy or endpoint.
    pub const fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }

    /// The caller cancelled the call.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The remote's message, where the error carries one.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
