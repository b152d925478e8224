//! Errors raised while building, packing and parsing operations.

use alloy_primitives::U256;

/// Errors raised while packing gas and paymaster fields into their on-chain layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackingError {
    /// The value does not fit in the 128 bits the packed layout reserves for it.
    #[error("{field} value {value} does not fit in 128 bits")]
    FieldOverflow {
        /// Name of the offending field.
        field: &'static str,
        /// Value that overflowed.
        value: U256,
    },
    /// A packed `paymasterAndData` blob is shorter than its fixed 52 byte header.
    #[error("paymasterAndData is {0} bytes, expected at least 52")]
    TruncatedPaymasterAndData(usize),
}

/// Errors raised while deriving or parsing function selectors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    /// Empty signature input.
    #[error("invalid signature: {0:?}")]
    InvalidSignature(String),
    /// A chunk of a selector list is neither a 4 byte hex value nor a function signature.
    #[error("invalid selector input: {0:?}")]
    InvalidSelectorInput(String),
}

/// Input validation errors, reported before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// No sender was supplied.
    #[error("missing sender address")]
    MissingSender,
    /// The sender is not a valid 20 byte address.
    #[error("invalid sender address {0:?}")]
    InvalidSender(String),
    /// A call target is malformed or the zero address.
    #[error("invalid call target {0:?}")]
    InvalidTarget(String),
    /// A numeric string (value, salt, nonce) could not be parsed as an unsigned integer.
    #[error("invalid {field}: {value:?} is not an unsigned integer")]
    InvalidNumber {
        /// Name of the offending field.
        field: &'static str,
        /// Raw input.
        value: String,
    },
    /// A hex payload could not be decoded.
    #[error("invalid hex for {field}: {value:?}")]
    InvalidHex {
        /// Name of the offending field.
        field: &'static str,
        /// Raw input.
        value: String,
    },
    /// A draft was requested without any call.
    #[error("at least one call is required")]
    NoCalls,
    /// Several calls were requested with the direct encoding, which only carries one.
    #[error("direct call encoding carries a single call, got {0}")]
    UnsupportedBatch(usize),
    /// Packing failure.
    #[error(transparent)]
    Packing(#[from] PackingError),
    /// Selector failure.
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// Result alias for core operations.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
