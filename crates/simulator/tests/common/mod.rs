#![allow(dead_code)]

//! An in-memory `EntryPoint` served over JSON-RPC, enforcing the validation rules the
//! scenario suite targets.

use alloy_primitives::{Address, B256, Bytes, Signature, U256, address, keccak256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use serde_json::{Value, json};
use userop_core::{
    AaCode, EntryPointVersion, PackedUserOperation, SigningDomain, TypedUserOperation,
    UserOperationDraft, abi::handleOpsCall, packing, user_op_hash,
};
use userop_rpc_client::SimulationRequest;
use userop_signer::SignatureStrategy;
use wiremock::{Request, Respond, ResponseTemplate};

pub const FACTORY: Address = address!("91E60e0613810449d098b0b5Ec8b51A0FE8c8985");
pub const NOW: u64 = 1_700_000_000;
pub const MIN_VERIFICATION_GAS: u64 = 50_000;
pub const MIN_PAYMASTER_VERIFICATION_GAS: u64 = 20_000;

#[derive(Debug, Clone)]
pub struct FakeEntryPoint {
    pub entry_point: Address,
    pub version: EntryPointVersion,
    pub chain_id: u64,
    pub strategy: SignatureStrategy,
    pub owner: Address,
    pub sender: Address,
    pub expected_nonce: U256,
    pub deposit: U256,
    pub paymaster_signer: Address,
}

/// Digest the fake paymaster signs: `keccak256(sender ‖ validUntil ‖ validAfter)`.
pub fn paymaster_digest(sender: Address, window: &[u8]) -> B256 {
    let mut preimage = sender.to_vec();
    preimage.extend_from_slice(window);
    keccak256(preimage)
}

/// Time-bounded paymaster data signed by `signer`.
pub fn paymaster_data(signer: &PrivateKeySigner, sender: Address, valid_until: u64) -> Bytes {
    let mut data = U256::from(valid_until).to_be_bytes::<32>().to_vec();
    data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
    let signature = signer.sign_hash_sync(&paymaster_digest(sender, &data)).unwrap();
    data.extend_from_slice(&signature.as_bytes());
    Bytes::from(data)
}

fn failed_op(code: AaCode) -> Value {
    json!({
        "status": false,
        "trace": [
            {"traceAddress": [], "error": "execution reverted",
             "errorReason": format!("FailedOp(0, \"{code} {}\")", code.description())},
            {"traceAddress": [0], "error": "execution reverted"}
        ]
    })
}

impl FakeEntryPoint {
    fn account_signature_valid(&self, op: &PackedUserOperation) -> bool {
        let Ok(signature) = Signature::try_from(op.signature.as_ref()) else {
            return false;
        };
        let recovered = match self.strategy {
            SignatureStrategy::RawHash => {
                let hash = user_op_hash(op, self.version, self.entry_point, self.chain_id);
                signature.recover_address_from_msg(hash.as_slice())
            }
            SignatureStrategy::TypedData => {
                let domain = SigningDomain::new(self.chain_id, self.entry_point);
                let typed = TypedUserOperation::new(op, domain);
                signature.recover_address_from_prehash(&typed.signing_hash())
            }
        };
        recovered.is_ok_and(|address| address == self.owner)
    }

    fn check(&self, op: &PackedUserOperation, beneficiary: Address, now: u64) -> Option<AaCode> {
        let draft = UserOperationDraft::from_packed(op).ok()?;
        if !op.initCode.is_empty() {
            return Some(AaCode::AA10);
        }
        if draft.verification_gas_limit < U256::from(MIN_VERIFICATION_GAS) {
            return Some(AaCode::AA23);
        }
        if draft.paymaster.is_none() {
            let mut gas = draft.call_gas_limit + draft.verification_gas_limit;
            gas += draft.pre_verification_gas;
            if gas * draft.max_fee_per_gas > self.deposit {
                return Some(AaCode::AA21);
            }
        }
        if draft.nonce != self.expected_nonce {
            return Some(AaCode::AA25);
        }
        let paymaster = packing::unpack_paymaster_and_data(&op.paymasterAndData).ok()?;
        if let Some(paymaster) = &paymaster {
            if paymaster.verification_gas_limit < U256::from(MIN_PAYMASTER_VERIFICATION_GAS) {
                return Some(AaCode::AA33);
            }
        }
        if !self.account_signature_valid(op) {
            return Some(AaCode::AA24);
        }
        if let Some(paymaster) = paymaster {
            let data = paymaster.data;
            if data.len() < 64 + 65 {
                return Some(AaCode::AA34);
            }
            let digest = paymaster_digest(draft.sender, &data[..64]);
            let signer = Signature::try_from(&data[64..])
                .and_then(|signature| signature.recover_address_from_prehash(&digest));
            if !signer.is_ok_and(|address| address == self.paymaster_signer) {
                return Some(AaCode::AA34);
            }
            let valid_until = U256::from_be_slice(&data[..32]);
            if !valid_until.is_zero() && U256::from(now) > valid_until {
                return Some(AaCode::AA32);
            }
        }
        if beneficiary.is_zero() {
            return Some(AaCode::AA90);
        }
        None
    }

    /// Trace the endpoint would return for `request`.
    pub fn evaluate(&self, request: &SimulationRequest, block_time: Option<u64>) -> Value {
        if request.to != self.entry_point {
            return json!({"status": false, "trace": [{"traceAddress": [], "error": "invalid opcode"}]});
        }
        let Ok(call) = handleOpsCall::abi_decode(&request.data) else {
            return json!({"status": false, "trace": [{"traceAddress": [], "error": "execution reverted"}]});
        };
        let now = block_time.unwrap_or(NOW);
        for op in &call.ops {
            if op.sender != self.sender {
                return failed_op(AaCode(20));
            }
            if let Some(code) = self.check(op, call.beneficiary, now) {
                return failed_op(code);
            }
        }
        json!({"status": true, "trace": [{"traceAddress": []}]})
    }
}

impl Respond for FakeEntryPoint {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let params = &body["params"];
        let Ok(tx) = serde_json::from_value::<SimulationRequest>(params[0].clone()) else {
            return ResponseTemplate::new(400);
        };
        let block_time = params[3]["time"]
            .as_str()
            .and_then(|time| u64::from_str_radix(time.trim_start_matches("0x"), 16).ok());
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": self.evaluate(&tx, block_time)
        }))
    }
}
