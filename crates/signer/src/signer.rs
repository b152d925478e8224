//! The signer port and its local key implementation.

use std::{fmt::Debug, str::FromStr};

use alloy_eips::eip7702::Authorization;
use alloy_primitives::{Address, B256, Signature};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use userop_core::TypedUserOperation;

use crate::error::{Result, SignerError};

/// The narrow signing capability the pipeline depends on. Implementations hold the key
/// (a wallet, a remote signer, a local key); this crate never does.
#[async_trait]
pub trait ExternalSigner: Debug + Send + Sync {
    /// Address whose key produces the signatures.
    fn address(&self) -> Address;

    /// Signs a 32 byte hash as an EIP-191 personal message.
    async fn sign_raw_hash(&self, hash: B256) -> Result<Signature>;

    /// Signs the EIP-712 digest of a typed user operation.
    async fn sign_typed_data(&self, payload: &TypedUserOperation) -> Result<Signature>;

    /// Signs an EIP-7702 authorization tuple.
    async fn sign_authorization(&self, authorization: &Authorization) -> Result<Signature>;

    /// Signs a transaction signing hash with no prefix.
    async fn sign_transaction_hash(&self, hash: B256) -> Result<Signature>;
}

/// [`ExternalSigner`] over an in-process secp256k1 key.
#[derive(Debug, Clone)]
pub struct LocalKeySigner {
    inner: PrivateKeySigner,
}

impl LocalKeySigner {
    /// Wraps an alloy key signer.
    pub const fn new(inner: PrivateKeySigner) -> Self {
        Self { inner }
    }

    /// Parses a hex private key, with or without `0x`.
    pub fn from_private_key(key: &str) -> Result<Self> {
        let inner = PrivateKeySigner::from_str(key.trim())
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// A signer with a fresh random key.
    pub fn random() -> Self {
        Self { inner: PrivateKeySigner::random() }
    }
}

#[async_trait]
impl ExternalSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_raw_hash(&self, hash: B256) -> Result<Signature> {
        Ok(self.inner.sign_message(hash.as_slice()).await?)
    }

    async fn sign_typed_data(&self, payload: &TypedUserOperation) -> Result<Signature> {
        Ok(self.inner.sign_hash(&payload.signing_hash()).await?)
    }

    async fn sign_authorization(&self, authorization: &Authorization) -> Result<Signature> {
        Ok(self.inner.sign_hash(&authorization.signature_hash()).await?)
    }

    async fn sign_transaction_hash(&self, hash: B256) -> Result<Signature> {
        Ok(self.inner.sign_hash(&hash).await?)
    }
}
