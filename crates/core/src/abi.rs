//! Calldata encoding for the fixed set of contract calls the pipeline issues.

use alloy_primitives::{Address, Bytes, Selector, U256, aliases::U192};
use alloy_sol_types::{SolCall, sol};

sol! {
    #[allow(missing_docs)]
    #[derive(Default, Debug, PartialEq, Eq)]
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes paymasterAndData;
        bytes signature;
    }

    #[allow(missing_docs)]
    function safeMint(address to, string uri);

    #[allow(missing_docs)]
    function approve(address spender, uint256 amount);

    #[allow(missing_docs)]
    function execute(address dest, uint256 value, bytes func);

    #[allow(missing_docs)]
    function executeBatch(address[] dest, uint256[] value, bytes[] func);

    #[allow(missing_docs)]
    function createAccount(address owner, uint256 salt) returns (address account);

    #[allow(missing_docs)]
    function handleOps(PackedUserOperation[] ops, address beneficiary);

    #[allow(missing_docs)]
    function simulateValidation(PackedUserOperation userOp);

    #[allow(missing_docs)]
    function getNonce(address sender, uint192 key) returns (uint256 nonce);
}

/// A single call issued by the smart account.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Call {
    /// Contract being called.
    pub target: Address,
    /// Wei forwarded with the call.
    pub value: U256,
    /// Calldata.
    pub data: Bytes,
}

/// The call shapes the pipeline knows how to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownCall {
    /// `safeMint(address,string)`
    SafeMint {
        /// Recipient of the token.
        to: Address,
        /// Token metadata URI.
        uri: String,
    },
    /// `approve(address,uint256)`
    Approve {
        /// Spender being approved.
        spender: Address,
        /// Allowance.
        amount: U256,
    },
    /// `execute(address,uint256,bytes)` on the smart account.
    Execute(Call),
    /// `executeBatch(address[],uint256[],bytes[])` on the smart account.
    ExecuteBatch(Vec<Call>),
    /// `createAccount(address,uint256)` on the account factory.
    CreateAccount {
        /// Owner of the counterfactual account.
        owner: Address,
        /// CREATE2 salt.
        salt: U256,
    },
    /// `handleOps((...)[],address)` on the EntryPoint.
    HandleOps {
        /// Operations in the bundle.
        ops: Vec<PackedUserOperation>,
        /// Address receiving the bundle's gas refund.
        beneficiary: Address,
    },
    /// `simulateValidation((...))` on the EntryPoint simulation contract.
    SimulateValidation(PackedUserOperation),
    /// `getNonce(address,uint192)` on the EntryPoint.
    GetNonce {
        /// Account whose nonce is read.
        sender: Address,
        /// Nonce key, 0 for the sequential lane.
        key: U192,
    },
}

impl KnownCall {
    /// Selector of the encoded function.
    pub fn selector(&self) -> Selector {
        let raw = match self {
            Self::SafeMint { .. } => safeMintCall::SELECTOR,
            Self::Approve { .. } => approveCall::SELECTOR,
            Self::Execute(_) => executeCall::SELECTOR,
            Self::ExecuteBatch(_) => executeBatchCall::SELECTOR,
            Self::CreateAccount { .. } => createAccountCall::SELECTOR,
            Self::HandleOps { .. } => handleOpsCall::SELECTOR,
            Self::SimulateValidation(_) => simulateValidationCall::SELECTOR,
            Self::GetNonce { .. } => getNonceCall::SELECTOR,
        };
        Selector::new(raw)
    }

    /// Standard ABI encoding, selector included.
    pub fn abi_encode(&self) -> Bytes {
        let encoded = match self {
            Self::SafeMint { to, uri } => safeMintCall { to: *to, uri: uri.clone() }.abi_encode(),
            Self::Approve { spender, amount } => {
                approveCall { spender: *spender, amount: *amount }.abi_encode()
            }
            Self::Execute(call) => executeCall {
                dest: call.target,
                value: call.value,
                func: call.data.clone(),
            }
            .abi_encode(),
            Self::ExecuteBatch(calls) => executeBatchCall {
                dest: calls.iter().map(|c| c.target).collect(),
                value: calls.iter().map(|c| c.value).collect(),
                func: calls.iter().map(|c| c.data.clone()).collect(),
            }
            .abi_encode(),
            Self::CreateAccount { owner, salt } => {
                createAccountCall { owner: *owner, salt: *salt }.abi_encode()
            }
            Self::HandleOps { ops, beneficiary } => {
                handleOpsCall { ops: ops.clone(), beneficiary: *beneficiary }.abi_encode()
            }
            Self::SimulateValidation(op) => {
                simulateValidationCall { userOp: op.clone() }.abi_encode()
            }
            Self::GetNonce { sender, key } => {
                getNonceCall { sender: *sender, key: *key }.abi_encode()
            }
        };
        Bytes::from(encoded)
    }
}
