//! User operation and EIP-7702 authorization signing.
//!
//! The pipeline talks to keys only through [`ExternalSigner`]; [`SignatureEngine`] picks the
//! hash and signing scheme for the account being driven.

mod engine;
mod error;
mod signer;

pub use engine::{SignatureEngine, SignatureStrategy, SignedUserOperation, SigningTarget};
pub use error::{Result, SignerError};
pub use signer::{ExternalSigner, LocalKeySigner};
