//! Signing failures.

use alloy_primitives::Address;
use alloy_signer_local::LocalSignerError;
use userop_core::PackingError;

/// Error type for the signer crate
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The key material could not be loaded
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    /// The signing backend refused or failed to sign
    #[error("signing error: {0}")]
    Signing(String),
    /// A produced signature does not recover to the signer's address
    #[error("signature recovers to {actual}, expected {expected}")]
    AddressMismatch {
        /// Address of the configured signer
        expected: Address,
        /// Address the signature recovers to
        actual: Address,
    },
    /// The operation could not be packed for hashing
    #[error(transparent)]
    Packing(#[from] PackingError),
}

/// Result type for the signer crate
pub type Result<T> = std::result::Result<T, SignerError>;

impl From<alloy_signer::Error> for SignerError {
    fn from(value: alloy_signer::Error) -> Self {
        Self::Signing(value.to_string())
    }
}

impl From<LocalSignerError> for SignerError {
    fn from(value: LocalSignerError) -> Self {
        Self::InvalidKey(value.to_string())
    }
}
