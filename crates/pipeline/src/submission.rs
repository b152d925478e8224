//! Bundler submission and the EIP-7702 raw transaction path.

use std::sync::Arc;

use alloy_consensus::{SignableTransaction, TxEip7702};
use alloy_eips::{eip1559::Eip1559Estimation, eip2718::Encodable2718, eip7702::SignedAuthorization};
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_rpc_types::TransactionReceipt;
use tracing::info;
use userop_core::{Call, KnownCall, PipelineStage, UserOperationDraft};
use userop_rpc_client::{
    BundlerClient, CallContext, PublicClient, ReceiptPolling, UserOperationReceipt,
};
use userop_signer::SignatureEngine;

use crate::error::{PipelineError, Result};

/// Gas limit of a delegated transaction when the caller does not set one.
pub const DEFAULT_DELEGATED_GAS_LIMIT: u64 = 500_000;

/// A type-4 transaction the signer's own account sends to itself, installing `delegate` as
/// its code and then running `calls` through it.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegationRequest {
    /// Contract whose code the account delegates to.
    pub delegate: Address,
    /// Empty to only install the delegation.
    pub calls: Vec<Call>,
    /// Gas limit of the transaction.
    pub gas_limit: u64,
    /// Transaction nonce; read from the node when unset.
    pub nonce: Option<u64>,
    /// Fee caps; estimated from fee history when unset.
    pub fees: Option<Eip1559Estimation>,
}

impl DelegationRequest {
    /// Delegates to `delegate` and runs `calls`, with default gas and node-read nonce and fees.
    pub const fn new(delegate: Address, calls: Vec<Call>) -> Self {
        Self { delegate, calls, gas_limit: DEFAULT_DELEGATED_GAS_LIMIT, nonce: None, fees: None }
    }

    fn input(&self) -> Bytes {
        match self.calls.as_slice() {
            [] => Bytes::new(),
            [call] => KnownCall::Execute(call.clone()).abi_encode(),
            calls => KnownCall::ExecuteBatch(calls.to_vec()).abi_encode(),
        }
    }
}

/// A delegated transaction accepted by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedSubmission {
    /// Hash returned by the node.
    pub transaction_hash: B256,
    /// Transaction nonce used.
    pub nonce: u64,
    /// Authorization carried by the transaction.
    pub authorization: SignedAuthorization,
}

/// Hands finished operations to the bundler. Submission failures are returned as is; the
/// caller decides whether to re-simulate and resend.
#[derive(Debug, Clone)]
pub struct SubmissionClient {
    bundler: Arc<BundlerClient>,
}

impl SubmissionClient {
    /// Client submitting to `bundler`.
    pub const fn new(bundler: Arc<BundlerClient>) -> Self {
        Self { bundler }
    }

    /// `eth_sendUserOperation`, returning the userOpHash.
    pub async fn submit(
        &self,
        ctx: &CallContext,
        draft: &UserOperationDraft,
        entry_point: Address,
    ) -> Result<B256> {
        self.bundler
            .send_user_operation(ctx, draft, entry_point)
            .await
            .map_err(|e| PipelineError::rpc(PipelineStage::Submitting, e))
    }

    /// Polls `eth_getUserOperationReceipt` until the operation is included.
    pub async fn wait_for_receipt(
        &self,
        ctx: &CallContext,
        user_op_hash: B256,
        polling: ReceiptPolling,
    ) -> Result<UserOperationReceipt> {
        self.bundler
            .wait_for_receipt(ctx, user_op_hash, polling)
            .await
            .map_err(|e| PipelineError::rpc(PipelineStage::Submitting, e))
    }
}

/// Sends EIP-7702 type-4 transactions straight to a node.
#[derive(Debug, Clone)]
pub struct DelegatedSubmitter {
    public: Arc<PublicClient>,
}

impl DelegatedSubmitter {
    /// Submitter sending through `public`.
    pub const fn new(public: Arc<PublicClient>) -> Self {
        Self { public }
    }

    /// Signs an authorization for `request.delegate`, wraps it in a type-4 transaction from
    /// the signer's account and sends it raw.
    ///
    /// The account is both the authority and the transaction sender, so its nonce is bumped
    /// by the transaction before the authorization list is processed. The authorization is
    /// therefore signed over `nonce + 1`.
    pub async fn submit(
        &self,
        ctx: &CallContext,
        signer: &SignatureEngine,
        chain_id: u64,
        request: &DelegationRequest,
    ) -> Result<DelegatedSubmission> {
        let stage = |e| PipelineError::rpc(PipelineStage::Submitting, e);
        let authority = signer.address();
        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => self.public.get_transaction_count(ctx, authority).await.map_err(stage)?,
        };
        let fees = match request.fees {
            Some(fees) => fees,
            None => self.public.estimate_fees(ctx).await.map_err(stage)?,
        };

        let authorization =
            signer.sign_authorization(request.delegate, chain_id, nonce + 1).await?;
        let tx = TxEip7702 {
            chain_id,
            nonce,
            gas_limit: request.gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to: authority,
            value: U256::ZERO,
            access_list: Default::default(),
            authorization_list: vec![authorization.clone()],
            input: request.input(),
        };
        let signature = signer.signer().sign_transaction_hash(tx.signature_hash()).await?;
        let encoded = tx.into_signed(signature).encoded_2718();

        let transaction_hash = self.public.send_raw_transaction(ctx, &encoded).await.map_err(stage)?;
        info!(
            %authority,
            delegate = %request.delegate,
            nonce,
            %transaction_hash,
            "delegated transaction sent"
        );
        Ok(DelegatedSubmission { transaction_hash, nonce, authorization })
    }

    /// Polls `eth_getTransactionReceipt` until the transaction is mined.
    pub async fn wait_for_receipt(
        &self,
        ctx: &CallContext,
        transaction_hash: B256,
        polling: ReceiptPolling,
    ) -> Result<TransactionReceipt> {
        self.public
            .wait_for_transaction_receipt(ctx, transaction_hash, polling)
            .await
            .map_err(|e| PipelineError::rpc(PipelineStage::Submitting, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::TxEnvelope;
    use alloy_eips::eip2718::Decodable2718;
    use alloy_primitives::hex;
    use serde_json::{Value, json};
    use userop_core::{
        EntryPointVersion,
        test_utils::{CHAIN_ID, sample_call, sample_draft},
    };
    use userop_rpc_client::RpcError;
    use userop_signer::{LocalKeySigner, SignatureStrategy};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method},
    };

    async fn respond(server: &MockServer, rpc_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": rpc_method})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 0, "result": result})),
            )
            .mount(server)
            .await;
    }

    fn url(server: &MockServer) -> reqwest::Url {
        server.uri().parse().unwrap()
    }

    fn client(server: &MockServer) -> SubmissionClient {
        SubmissionClient::new(Arc::new(BundlerClient::new(reqwest::Client::new(), url(server))))
    }

    fn delegated(server: &MockServer) -> DelegatedSubmitter {
        DelegatedSubmitter::new(Arc::new(PublicClient::new(url(server))))
    }

    #[tokio::test]
    async fn bundler_rejection_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32500, "message": "AA25 invalid account nonce"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .submit(&CallContext::default(), &sample_draft(), EntryPointVersion::V07_ADDRESS)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Rpc { stage: PipelineStage::Submitting, source: RpcError::Remote { code: -32500, .. } }
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn delegated_transaction_carries_next_nonce_authorization() {
        let server = MockServer::start().await;
        respond(&server, "eth_getTransactionCount", json!("0x7")).await;
        respond(&server, "eth_sendRawTransaction", json!(B256::repeat_byte(0xcd))).await;

        let signer = SignatureEngine::new(Arc::new(LocalKeySigner::random()), SignatureStrategy::RawHash);
        let delegate = Address::repeat_byte(0x77);
        let mut request = DelegationRequest::new(delegate, vec![sample_call()]);
        request.fees = Some(Eip1559Estimation {
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        });

        let submission = delegated(&server)
            .submit(&CallContext::default(), &signer, CHAIN_ID, &request)
            .await
            .unwrap();
        assert_eq!(submission.transaction_hash, B256::repeat_byte(0xcd));
        assert_eq!(submission.nonce, 7);
        assert_eq!(submission.authorization.nonce, 8);

        let requests = server.received_requests().await.unwrap();
        let raw = requests
            .iter()
            .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
            .find(|body| body["method"] == "eth_sendRawTransaction")
            .unwrap();
        let bytes = hex::decode(raw["params"][0].as_str().unwrap()).unwrap();
        assert_eq!(bytes[0], 0x04);

        let TxEnvelope::Eip7702(signed) = TxEnvelope::decode_2718(&mut bytes.as_slice()).unwrap()
        else {
            panic!("expected a type-4 transaction");
        };
        assert_eq!(signed.tx().nonce, 7);
        assert_eq!(signed.tx().to, signer.address());
        assert_eq!(signed.tx().input, KnownCall::Execute(sample_call()).abi_encode());
        assert_eq!(signed.tx().authorization_list[0].address, delegate);
        assert_eq!(signed.recover_signer().unwrap(), signer.address());
    }
}
