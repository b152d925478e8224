//! User operation and authorization signing.

use std::{fmt, str::FromStr, sync::Arc};

use alloy_eips::eip7702::SignedAuthorization;
use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};
use tracing::debug;
use userop_core::{
    EntryPointVersion, SigningDomain, TypedUserOperation, UserOperationDraft,
    unsigned_authorization, user_op_hash,
};

use crate::{
    error::{Result, SignerError},
    signer::ExternalSigner,
};

/// How the account expects its user operation signature to be produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignatureStrategy {
    /// Personal-sign of the 32 byte userOpHash, as `SimpleAccount` verifies it.
    #[default]
    RawHash,
    /// EIP-712 typed data over the packed operation.
    TypedData,
}

impl fmt::Display for SignatureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawHash => f.write_str("raw-hash"),
            Self::TypedData => f.write_str("typed-data"),
        }
    }
}

impl FromStr for SignatureStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "raw-hash" | "raw" => Ok(Self::RawHash),
            "typed-data" | "eip712" => Ok(Self::TypedData),
            other => Err(format!("unknown signature strategy {other:?}")),
        }
    }
}

/// The `EntryPoint` an operation is signed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningTarget {
    /// `EntryPoint` folded into the userOpHash.
    pub entry_point: Address,
    /// Selects the hashing scheme.
    pub version: EntryPointVersion,
    /// Chain folded into the userOpHash.
    pub chain_id: u64,
    /// Typed-data domain, bound to `entry_point` unless overridden.
    pub domain: SigningDomain,
}

impl SigningTarget {
    /// Target whose typed-data domain matches `entry_point`.
    pub const fn new(entry_point: Address, version: EntryPointVersion, chain_id: u64) -> Self {
        Self { entry_point, version, chain_id, domain: SigningDomain::new(chain_id, entry_point) }
    }

    /// Replaces the typed-data domain. A domain whose verifying contract differs from the
    /// targeted `EntryPoint` produces signatures the account rejects with AA24.
    pub const fn with_domain(mut self, domain: SigningDomain) -> Self {
        self.domain = domain;
        self
    }
}

/// A signature together with the hash the `EntryPoint` will compute for the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUserOperation {
    /// 65-byte ECDSA signature.
    pub signature: Bytes,
    /// Hash the `EntryPoint` will compute.
    pub user_op_hash: B256,
}

/// Produces user operation signatures with exactly one [`SignatureStrategy`].
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    signer: Arc<dyn ExternalSigner>,
    strategy: SignatureStrategy,
}

impl SignatureEngine {
    /// Engine signing through `signer` with `strategy`.
    pub fn new(signer: Arc<dyn ExternalSigner>, strategy: SignatureStrategy) -> Self {
        Self { signer, strategy }
    }

    /// Address of the signing key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Strategy used for user operations.
    pub const fn strategy(&self) -> SignatureStrategy {
        self.strategy
    }

    /// Underlying signer.
    pub fn signer(&self) -> &Arc<dyn ExternalSigner> {
        &self.signer
    }

    /// Signs `draft` for `target`. The current signature field is ignored.
    pub async fn sign_user_operation(
        &self,
        draft: &UserOperationDraft,
        target: &SigningTarget,
    ) -> Result<SignedUserOperation> {
        let packed = draft.pack()?;
        let hash = user_op_hash(&packed, target.version, target.entry_point, target.chain_id);
        let signature = match self.strategy {
            SignatureStrategy::RawHash => self.signer.sign_raw_hash(hash).await?,
            SignatureStrategy::TypedData => {
                let typed = TypedUserOperation::new(&packed, target.domain);
                self.signer.sign_typed_data(&typed).await?
            }
        };
        debug!(
            sender = %draft.sender,
            user_op_hash = %hash,
            strategy = %self.strategy,
            "signed user operation"
        );
        Ok(SignedUserOperation {
            signature: Bytes::copy_from_slice(&signature.as_bytes()),
            user_op_hash: hash,
        })
    }

    /// Signs `draft` and writes the signature into it, returning the userOpHash.
    pub async fn sign_in_place(
        &self,
        draft: &mut UserOperationDraft,
        target: &SigningTarget,
    ) -> Result<B256> {
        let signed = self.sign_user_operation(draft, target).await?;
        draft.signature = signed.signature;
        Ok(signed.user_op_hash)
    }

    /// Signs an EIP-7702 authorization delegating the signer's account to `delegate`.
    pub async fn sign_authorization(
        &self,
        delegate: Address,
        chain_id: u64,
        nonce: u64,
    ) -> Result<SignedAuthorization> {
        let authorization = unsigned_authorization(chain_id, delegate, nonce);
        let signature = self.signer.sign_authorization(&authorization).await?;
        let signed = authorization.into_signed(signature);

        let expected = self.signer.address();
        match signed.recover_authority() {
            Ok(actual) if actual == expected => {}
            Ok(actual) => return Err(SignerError::AddressMismatch { expected, actual }),
            Err(e) => return Err(SignerError::Signing(e.to_string())),
        }
        debug!(authority = %expected, %delegate, chain_id, nonce, "signed authorization");
        Ok(signed)
    }
}
