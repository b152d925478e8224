//! ERC-7677 paymaster client.

use alloy_primitives::Address;
use tracing::{debug, info};
use url::Url;
use userop_core::{PaymasterContext, PaymasterData, PaymasterStubData, UserOperationDraft};

use crate::{context::CallContext, error::RpcError, transport::JsonRpcTransport};

/// ERC-7677 paymaster web service client. Each instance carries one bearer token.
#[derive(Debug, Clone)]
pub struct PaymasterClient {
    transport: JsonRpcTransport,
}

impl PaymasterClient {
    /// Fails with [`RpcError::Unauthorized`] before any request when `token` is blank.
    pub fn new(http: reqwest::Client, url: Url, token: &str) -> Result<Self, RpcError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(RpcError::Unauthorized("missing paymaster token".to_string()));
        }
        let transport = JsonRpcTransport::new(http, url, "paymaster")
            .with_bearer(token)
            .with_not_found_as_unconfigured();
        Ok(Self { transport })
    }

    /// `pm_getPaymasterStubData`: placeholder paymaster fields good enough for gas estimation.
    pub async fn get_stub_data(
        &self,
        ctx: &CallContext,
        draft: &UserOperationDraft,
        entry_point: Address,
        chain_id: u64,
        context: &PaymasterContext,
    ) -> Result<PaymasterStubData, RpcError> {
        let params = (draft, entry_point, format!("{chain_id:#x}"), context);
        let stub: PaymasterStubData =
            self.transport.call(ctx, "pm_getPaymasterStubData", params).await?;
        debug!(
            sender = %draft.sender,
            paymaster = %stub.fields.paymaster,
            is_final = stub.is_final,
            "received paymaster stub data"
        );
        Ok(stub)
    }

    /// `pm_getPaymasterData`: the final paymaster payload for a gas-estimated draft.
    pub async fn get_final_data(
        &self,
        ctx: &CallContext,
        draft: &UserOperationDraft,
        entry_point: Address,
        chain_id: u64,
        context: &PaymasterContext,
    ) -> Result<PaymasterData, RpcError> {
        let params = (draft, entry_point, format!("{chain_id:#x}"), context);
        let data: PaymasterData = self.transport.call(ctx, "pm_getPaymasterData", params).await?;
        info!(
            sender = %draft.sender,
            paymaster = %data.fields.paymaster,
            "received final paymaster data"
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Selector, U256};
    use serde_json::json;
    use userop_core::{
        EntryPointVersion,
        test_utils::{CHAIN_ID, PAYMASTER, TARGET, sample_draft},
    };
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method},
    };

    fn context() -> PaymasterContext {
        PaymasterContext::new(TARGET, Selector::new([0xd2, 0x04, 0xc4, 0x5e]))
    }

    fn client(server: &MockServer) -> PaymasterClient {
        PaymasterClient::new(reqwest::Client::new(), server.uri().parse().unwrap(), "token")
            .unwrap()
    }

    #[test]
    fn blank_token_is_unauthorized() {
        let url: Url = "http://localhost:1".parse().unwrap();
        let err = PaymasterClient::new(reqwest::Client::new(), url, "  ").unwrap_err();
        assert!(matches!(err, RpcError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn stub_then_final() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer token"))
            .and(body_partial_json(json!({
                "method": "pm_getPaymasterStubData",
                "params": [{}, EntryPointVersion::V07_ADDRESS, "0x14a34", {"target": TARGET}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "paymaster": PAYMASTER,
                    "paymasterData": "0x00",
                    "paymasterVerificationGasLimit": "0xea60",
                    "paymasterPostOpGasLimit": "0x1",
                    "isFinal": false
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "pm_getPaymasterData"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {"paymaster": PAYMASTER, "paymasterData": "0xdeadbeef"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let ctx = CallContext::default();
        let mut draft = sample_draft();
        let stub = client
            .get_stub_data(&ctx, &draft, EntryPointVersion::V07_ADDRESS, CHAIN_ID, &context())
            .await
            .unwrap();
        assert_eq!(stub.fields.paymaster_verification_gas_limit, Some(U256::from(60_000)));
        assert!(!stub.is_final);

        stub.fields.apply_to(&mut draft);
        let data = client
            .get_final_data(&ctx, &draft, EntryPointVersion::V07_ADDRESS, CHAIN_ID, &context())
            .await
            .unwrap();
        assert_eq!(data.fields.paymaster_data.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        data.fields.apply_to(&mut draft);
        assert_eq!(draft.paymaster_verification_gas_limit, Some(U256::from(60_000)));
    }

    #[tokio::test]
    async fn stub_call_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"paymaster": PAYMASTER, "paymasterData": "0x01"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        let ctx = CallContext::default();
        let draft = sample_draft();
        let before = draft.clone();
        let first = client
            .get_stub_data(&ctx, &draft, EntryPointVersion::V08_ADDRESS, CHAIN_ID, &context())
            .await
            .unwrap();
        let second = client
            .get_stub_data(&ctx, &draft, EntryPointVersion::V08_ADDRESS, CHAIN_ID, &context())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(draft, before);
    }

    #[tokio::test]
    async fn missing_policy_is_not_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("sender not allowlisted"))
            .mount(&server)
            .await;
        let err = client(&server)
            .get_stub_data(
                &CallContext::default(),
                &sample_draft(),
                EntryPointVersion::V07_ADDRESS,
                CHAIN_ID,
                &context(),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_configured());
        assert!(!err.is_retryable());
    }
}
