//! Assembly of unsigned drafts from sender, calls and placeholder gas values.

use std::str::FromStr;

use alloy_primitives::{Address, Bytes, U256, hex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    abi::{Call, KnownCall},
    error::{CoreError, Result},
    user_operation::UserOperationDraft,
};

/// Placeholder gas values written into every new draft. They are generous on purpose and
/// are overwritten once the bundler returns an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasDefaults {
    /// Gas available to the account's execution phase.
    pub call_gas_limit: U256,
    /// Gas available to account validation and deployment.
    pub verification_gas_limit: U256,
    /// Overhead the bundler charges for calldata and bookkeeping.
    pub pre_verification_gas: U256,
    /// Fee cap per gas unit.
    pub max_fee_per_gas: U256,
    /// Tip per gas unit.
    pub max_priority_fee_per_gas: U256,
}

impl Default for GasDefaults {
    fn default() -> Self {
        Self {
            call_gas_limit: U256::from(500_000u64),
            verification_gas_limit: U256::from(1_000_000u64),
            pre_verification_gas: U256::from(100_000u64),
            max_fee_per_gas: U256::from(2_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        }
    }
}

/// How the calls end up in the operation's `callData`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallEncoding {
    /// The single call's data is the operation's calldata.
    Direct,
    /// Calls are forwarded through the account's `execute` / `executeBatch`.
    #[default]
    Execute,
}

/// Parses a decimal or `0x`-prefixed unsigned integer.
pub fn parse_uint(field: &'static str, input: &str) -> Result<U256> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str(trimmed)
        .map_err(|_| CoreError::InvalidNumber { field, value: input.to_string() })
}

/// Parses `0x`-prefixed hex bytes; empty input is empty bytes.
pub fn parse_hex(field: &'static str, input: &str) -> Result<Bytes> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "0x" {
        return Ok(Bytes::new());
    }
    hex::decode(trimmed)
        .map(Bytes::from)
        .map_err(|_| CoreError::InvalidHex { field, value: input.to_string() })
}

/// Parses the sender address.
pub fn parse_sender(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::MissingSender);
    }
    match Address::from_str(trimmed) {
        Ok(address) if address != Address::ZERO => Ok(address),
        _ => Err(CoreError::InvalidSender(input.to_string())),
    }
}

fn parse_target(input: &str) -> Result<Address> {
    match Address::from_str(input.trim()) {
        Ok(address) if address != Address::ZERO => Ok(address),
        _ => Err(CoreError::InvalidTarget(input.to_string())),
    }
}

impl Call {
    /// Builds a call from the plain strings handed over by the form layer.
    pub fn parse(target: &str, value: &str, data: &str) -> Result<Self> {
        Ok(Self {
            target: parse_target(target)?,
            value: parse_uint("value", value)?,
            data: parse_hex("data", data)?,
        })
    }
}

/// Incrementally assembles a [`UserOperationDraft`].
#[derive(Debug, Clone)]
pub struct DraftBuilder {
    sender: Address,
    nonce: U256,
    calls: Vec<Call>,
    encoding: CallEncoding,
    gas: GasDefaults,
    factory: Option<(Address, Bytes)>,
}

impl DraftBuilder {
    /// Starts a draft for `sender`.
    pub fn new(sender: &str) -> Result<Self> {
        Ok(Self::for_sender(parse_sender(sender)?))
    }

    /// Starts a draft for an already parsed sender.
    pub fn for_sender(sender: Address) -> Self {
        Self {
            sender,
            nonce: U256::ZERO,
            calls: Vec::new(),
            encoding: CallEncoding::default(),
            gas: GasDefaults::default(),
            factory: None,
        }
    }

    /// Appends one call.
    pub fn call(mut self, call: Call) -> Self {
        self.calls.push(call);
        self
    }

    /// Appends several calls.
    pub fn calls(mut self, calls: impl IntoIterator<Item = Call>) -> Self {
        self.calls.extend(calls);
        self
    }

    /// Overrides how a single call is encoded.
    pub const fn encoding(mut self, encoding: CallEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Overrides the placeholder gas values.
    pub const fn gas_defaults(mut self, gas: GasDefaults) -> Self {
        self.gas = gas;
        self
    }

    /// Nonce read from the `EntryPoint`, zero until set.
    pub const fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    /// Deploys the sender through `factory.createAccount(owner, salt)` on first use.
    pub fn with_factory(mut self, factory: Address, owner: Address, salt: U256) -> Self {
        let factory_data = KnownCall::CreateAccount { owner, salt }.abi_encode();
        self.factory = Some((factory, factory_data));
        self
    }

    fn encode_calls(&self) -> Result<Bytes> {
        for call in &self.calls {
            if call.target == Address::ZERO {
                return Err(CoreError::InvalidTarget(call.target.to_string()));
            }
        }
        match (self.encoding, self.calls.as_slice()) {
            (_, []) => Err(CoreError::NoCalls),
            (CallEncoding::Direct, [call]) => Ok(call.data.clone()),
            (CallEncoding::Direct, calls) => Err(CoreError::UnsupportedBatch(calls.len())),
            (CallEncoding::Execute, [call]) => Ok(KnownCall::Execute(call.clone()).abi_encode()),
            (CallEncoding::Execute, calls) => Ok(KnownCall::ExecuteBatch(calls.to_vec()).abi_encode()),
        }
    }

    /// Validates the inputs and returns the unsigned draft.
    pub fn build(self) -> Result<UserOperationDraft> {
        let call_data = self.encode_calls()?;
        let (factory, factory_data) = match self.factory {
            Some((factory, data)) => (Some(factory), Some(data)),
            None => (None, None),
        };
        let draft = UserOperationDraft {
            sender: self.sender,
            nonce: self.nonce,
            factory,
            factory_data,
            call_data,
            call_gas_limit: self.gas.call_gas_limit,
            verification_gas_limit: self.gas.verification_gas_limit,
            pre_verification_gas: self.gas.pre_verification_gas,
            max_fee_per_gas: self.gas.max_fee_per_gas,
            max_priority_fee_per_gas: self.gas.max_priority_fee_per_gas,
            ..Default::default()
        };
        draft.validate_gas_fields()?;
        debug!(
            sender = %draft.sender,
            calls = self.calls.len(),
            encoding = ?self.encoding,
            deploys = draft.factory.is_some(),
            "built user operation draft"
        );
        Ok(draft)
    }
}

/// Builds a draft for `sender` executing `calls` with default gas placeholders.
pub fn new_draft(sender: &str, calls: Vec<Call>, encoding: CallEncoding) -> Result<UserOperationDraft> {
    DraftBuilder::new(sender)?.calls(calls).encoding(encoding).build()
}
