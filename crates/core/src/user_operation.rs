//! ERC-4337 v0.7+ user operation draft, its packed form and its hash.

use std::{fmt, str::FromStr};

use alloy_eips::eip7702::SignedAuthorization;
use alloy_primitives::{Address, B256, Bytes, U256, address, keccak256};
use alloy_sol_types::{SolValue, sol};
use serde::{Deserialize, Serialize};

use crate::{
    abi::PackedUserOperation,
    error::PackingError,
    packing::{
        checked_u128, pack_account_gas_limits, pack_gas_fees, pack_init_code,
        pack_paymaster_and_data, unpack_account_gas_limits, unpack_gas_fees,
        unpack_paymaster_and_data,
    },
};

sol! {
    struct UserOperationPackedForHash {
        address sender;
        uint256 nonce;
        bytes32 hashInitCode;
        bytes32 hashCallData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes32 hashPaymasterAndData;
    }

    struct UserOperationHashEncoded {
        bytes32 encodedHash;
        address entryPoint;
        uint256 chainId;
    }

    struct TypedUserOperationStruct {
        bytes32 userOpTypeHash;
        address sender;
        uint256 nonce;
        bytes32 initCodeHash;
        bytes32 callDataHash;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes32 paymasterAndDataHash;
    }

    struct DomainSeparatorData {
        bytes32 typeHash;
        bytes32 nameHash;
        bytes32 versionHash;
        uint256 chainId;
        address verifyingContract;
    }
}

/// EIP-712 type string of the signed part of a packed user operation.
pub const USEROP_TYPEHASH: &str = "PackedUserOperation(address sender,uint256 nonce,bytes initCode,bytes callData,bytes32 accountGasLimits,uint256 preVerificationGas,bytes32 gasFees,bytes paymasterAndData)";
/// EIP-712 domain type string.
pub const EIP712_DOMAIN_TYPEHASH: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

// From EntryPoint.sol
const DOMAIN_NAME: &str = "ERC4337";
const DOMAIN_VERSION: &str = "1";

/// The version of the ERC-4337 `EntryPoint` contract being targeted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPointVersion {
    /// v0.7, user op hash is a plain ABI hash.
    V07,
    /// v0.8, user op hash is an EIP-712 digest.
    #[default]
    V08,
}

impl EntryPointVersion {
    /// The canonical address of the v0.7 `EntryPoint` contract.
    pub const V07_ADDRESS: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");
    /// The canonical address of the v0.8 `EntryPoint` contract.
    pub const V08_ADDRESS: Address = address!("0x4337084D9E255Ff0702461CF8895CE9E3b5Ff108");

    /// Canonical deployment address.
    pub const fn address(self) -> Address {
        match self {
            Self::V07 => Self::V07_ADDRESS,
            Self::V08 => Self::V08_ADDRESS,
        }
    }
}

impl TryFrom<Address> for EntryPointVersion {
    type Error = Address;

    fn try_from(addr: Address) -> Result<Self, Self::Error> {
        if addr == Self::V07_ADDRESS {
            Ok(Self::V07)
        } else if addr == Self::V08_ADDRESS {
            Ok(Self::V08)
        } else {
            Err(addr)
        }
    }
}

impl fmt::Display for EntryPointVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V07 => f.write_str("v0.7"),
            Self::V08 => f.write_str("v0.8"),
        }
    }
}

impl FromStr for EntryPointVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches(['v', 'V']) {
            "0.7" | "07" => Ok(Self::V07),
            "0.8" | "08" => Ok(Self::V08),
            _ => Err(format!("unknown entry point version {s:?}")),
        }
    }
}

/// An operation being assembled. Every field mirrors the unpacked RPC form used by bundlers
/// and paymasters, so the draft serializes directly into `eth_sendUserOperation` params.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationDraft {
    /// Smart account the operation runs as.
    pub sender: Address,
    /// Key (high 192 bits) and sequence (low 64 bits) read from `getNonce`.
    pub nonce: U256,
    /// Account factory, set only while the sender is undeployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    /// `createAccount` calldata for `factory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    /// Calldata executed by the sender.
    pub call_data: Bytes,
    /// Gas for the execution phase.
    pub call_gas_limit: U256,
    /// Gas for validation and deployment.
    pub verification_gas_limit: U256,
    /// Gas charged for calldata and overhead.
    pub pre_verification_gas: U256,
    /// Fee cap per gas unit.
    pub max_fee_per_gas: U256,
    /// Tip per gas unit.
    pub max_priority_fee_per_gas: U256,
    /// Sponsoring paymaster, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Gas for paymaster validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Gas for `postOp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    /// Paymaster specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    /// Empty until signed.
    pub signature: Bytes,
    /// Delegation the sender runs under for this operation, attached unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip7702_auth: Option<SignedAuthorization>,
}

impl UserOperationDraft {
    /// `factory ‖ factoryData`, or empty for a deployed sender.
    pub fn init_code(&self) -> Bytes {
        pack_init_code(self.factory, self.factory_data.as_ref().map(|b| &b[..]))
    }

    /// Packed `paymasterAndData`, empty without a paymaster.
    pub fn paymaster_and_data(&self) -> Result<Bytes, PackingError> {
        pack_paymaster_and_data(
            self.paymaster,
            self.paymaster_verification_gas_limit,
            self.paymaster_post_op_gas_limit,
            self.paymaster_data.as_ref().map(|b| &b[..]),
        )
    }

    /// Checks every field the packed layout limits to 128 bits.
    pub fn validate_gas_fields(&self) -> Result<(), PackingError> {
        checked_u128("callGasLimit", self.call_gas_limit)?;
        checked_u128("verificationGasLimit", self.verification_gas_limit)?;
        checked_u128("preVerificationGas", self.pre_verification_gas)?;
        checked_u128("maxFeePerGas", self.max_fee_per_gas)?;
        checked_u128("maxPriorityFeePerGas", self.max_priority_fee_per_gas)?;
        if let Some(limit) = self.paymaster_verification_gas_limit {
            checked_u128("paymasterVerificationGasLimit", limit)?;
        }
        if let Some(limit) = self.paymaster_post_op_gas_limit {
            checked_u128("paymasterPostOpGasLimit", limit)?;
        }
        Ok(())
    }

    /// The on-chain tuple submitted to `handleOps`.
    pub fn pack(&self) -> Result<PackedUserOperation, PackingError> {
        checked_u128("preVerificationGas", self.pre_verification_gas)?;
        Ok(PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            initCode: self.init_code(),
            callData: self.call_data.clone(),
            accountGasLimits: pack_account_gas_limits(
                self.call_gas_limit,
                self.verification_gas_limit,
            )?,
            preVerificationGas: self.pre_verification_gas,
            gasFees: pack_gas_fees(self.max_fee_per_gas, self.max_priority_fee_per_gas)?,
            paymasterAndData: self.paymaster_and_data()?,
            signature: self.signature.clone(),
        })
    }

    /// Rebuilds a draft from its packed form. The delegation is not part of the packed tuple.
    pub fn from_packed(packed: &PackedUserOperation) -> Result<Self, PackingError> {
        let (call_gas_limit, verification_gas_limit) =
            unpack_account_gas_limits(&packed.accountGasLimits);
        let (max_fee_per_gas, max_priority_fee_per_gas) = unpack_gas_fees(&packed.gasFees);
        let (factory, factory_data) = if packed.initCode.len() >= 20 {
            (
                Some(Address::from_slice(&packed.initCode[..20])),
                Some(Bytes::copy_from_slice(&packed.initCode[20..])),
            )
        } else {
            (None, None)
        };
        let paymaster = unpack_paymaster_and_data(&packed.paymasterAndData)?;

        Ok(Self {
            sender: packed.sender,
            nonce: packed.nonce,
            factory,
            factory_data,
            call_data: packed.callData.clone(),
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas: packed.preVerificationGas,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster: paymaster.as_ref().map(|p| p.paymaster),
            paymaster_verification_gas_limit: paymaster.as_ref().map(|p| p.verification_gas_limit),
            paymaster_post_op_gas_limit: paymaster.as_ref().map(|p| p.post_op_gas_limit),
            paymaster_data: paymaster.map(|p| p.data),
            signature: packed.signature.clone(),
            eip7702_auth: None,
        })
    }

    /// The userOpHash the `EntryPoint` at `entry_point` computes for this draft.
    pub fn hash(
        &self,
        version: EntryPointVersion,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<B256, PackingError> {
        let packed = self.pack()?;
        Ok(user_op_hash(&packed, version, entry_point, chain_id))
    }
}

/// Dispatches to the hash scheme of `version`.
pub fn user_op_hash(
    packed: &PackedUserOperation,
    version: EntryPointVersion,
    entry_point: Address,
    chain_id: u64,
) -> B256 {
    match version {
        EntryPointVersion::V07 => hash_v07(packed, entry_point, chain_id),
        EntryPointVersion::V08 => {
            TypedUserOperation::new(packed, SigningDomain::new(chain_id, entry_point))
                .signing_hash()
        }
    }
}

/// `keccak256(abi.encode(keccak256(abi.encode(fields...)), entryPoint, chainId))`
pub fn hash_v07(packed: &PackedUserOperation, entry_point: Address, chain_id: u64) -> B256 {
    let packed_for_hash = UserOperationPackedForHash {
        sender: packed.sender,
        nonce: packed.nonce,
        hashInitCode: keccak256(&packed.initCode),
        hashCallData: keccak256(&packed.callData),
        accountGasLimits: packed.accountGasLimits,
        preVerificationGas: packed.preVerificationGas,
        gasFees: packed.gasFees,
        hashPaymasterAndData: keccak256(&packed.paymasterAndData),
    };
    let encoded = UserOperationHashEncoded {
        encodedHash: keccak256(packed_for_hash.abi_encode()),
        entryPoint: entry_point,
        chainId: U256::from(chain_id),
    };
    keccak256(encoded.abi_encode())
}

/// The `{name: "ERC4337", version: "1"}` EIP-712 domain, parameterized by chain and
/// verifying contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningDomain {
    /// Chain the signature is valid on.
    pub chain_id: u64,
    /// `EntryPoint` the signature is bound to.
    pub verifying_contract: Address,
}

impl SigningDomain {
    /// Domain for `verifying_contract` on `chain_id`.
    pub const fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self { chain_id, verifying_contract }
    }

    /// EIP-712 domain separator.
    pub fn separator(&self) -> B256 {
        let data = DomainSeparatorData {
            typeHash: keccak256(EIP712_DOMAIN_TYPEHASH.as_bytes()),
            nameHash: keccak256(DOMAIN_NAME.as_bytes()),
            versionHash: keccak256(DOMAIN_VERSION.as_bytes()),
            chainId: U256::from(self.chain_id),
            verifyingContract: self.verifying_contract,
        };
        keccak256(data.abi_encode())
    }
}

/// Typed-data payload handed to a signer: the eight signed fields of a packed operation
/// under a [`SigningDomain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedUserOperation {
    /// Domain the fields are signed under.
    pub domain: SigningDomain,
    /// Packed `sender`.
    pub sender: Address,
    /// Packed `nonce`.
    pub nonce: U256,
    /// Packed `initCode`.
    pub init_code: Bytes,
    /// Packed `callData`.
    pub call_data: Bytes,
    /// Packed `accountGasLimits`.
    pub account_gas_limits: B256,
    /// Packed `preVerificationGas`.
    pub pre_verification_gas: U256,
    /// Packed `gasFees`.
    pub gas_fees: B256,
    /// Packed `paymasterAndData`.
    pub paymaster_and_data: Bytes,
}

impl TypedUserOperation {
    /// Typed payload of `packed` under `domain`.
    pub fn new(packed: &PackedUserOperation, domain: SigningDomain) -> Self {
        Self {
            domain,
            sender: packed.sender,
            nonce: packed.nonce,
            init_code: packed.initCode.clone(),
            call_data: packed.callData.clone(),
            account_gas_limits: packed.accountGasLimits,
            pre_verification_gas: packed.preVerificationGas,
            gas_fees: packed.gasFees,
            paymaster_and_data: packed.paymasterAndData.clone(),
        }
    }

    /// EIP-712 `hashStruct` of the operation.
    pub fn struct_hash(&self) -> B256 {
        let data = TypedUserOperationStruct {
            userOpTypeHash: keccak256(USEROP_TYPEHASH.as_bytes()),
            sender: self.sender,
            nonce: self.nonce,
            initCodeHash: keccak256(&self.init_code),
            callDataHash: keccak256(&self.call_data),
            accountGasLimits: self.account_gas_limits,
            preVerificationGas: self.pre_verification_gas,
            gasFees: self.gas_fees,
            paymasterAndDataHash: keccak256(&self.paymaster_and_data),
        };
        keccak256(data.abi_encode())
    }

    /// `keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ structHash)`
    pub fn signing_hash(&self) -> B256 {
        let mut enc = [0u8; 66];
        enc[0] = 0x19;
        enc[1] = 0x01;
        enc[2..34].copy_from_slice(self.domain.separator().as_slice());
        enc[34..66].copy_from_slice(self.struct_hash().as_slice());
        keccak256(enc)
    }

    /// `eth_signTypedData_v4` request body for wallets that sign typed data themselves.
    pub fn to_eip712_json(&self) -> serde_json::Value {
        serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "PackedUserOperation": [
                    { "name": "sender", "type": "address" },
                    { "name": "nonce", "type": "uint256" },
                    { "name": "initCode", "type": "bytes" },
                    { "name": "callData", "type": "bytes" },
                    { "name": "accountGasLimits", "type": "bytes32" },
                    { "name": "preVerificationGas", "type": "uint256" },
                    { "name": "gasFees", "type": "bytes32" },
                    { "name": "paymasterAndData", "type": "bytes" },
                ],
            },
            "primaryType": "PackedUserOperation",
            "domain": {
                "name": DOMAIN_NAME,
                "version": DOMAIN_VERSION,
                "chainId": self.domain.chain_id,
                "verifyingContract": self.domain.verifying_contract,
            },
            "message": {
                "sender": self.sender,
                "nonce": self.nonce,
                "initCode": self.init_code,
                "callData": self.call_data,
                "accountGasLimits": self.account_gas_limits,
                "preVerificationGas": self.pre_verification_gas,
                "gasFees": self.gas_fees,
                "paymasterAndData": self.paymaster_and_data,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{b256, bytes, hex, uint};
    use alloy_sol_types::{SolStruct, eip712_domain};

    mod typed {
        alloy_sol_types::sol! {
            struct PackedUserOperation {
                address sender;
                uint256 nonce;
                bytes initCode;
                bytes callData;
                bytes32 accountGasLimits;
                uint256 preVerificationGas;
                bytes32 gasFees;
                bytes paymasterAndData;
            }
        }
    }

    fn sepolia_op() -> PackedUserOperation {
        let call_data = hex::decode(concat!(
            "e9ae5c53000000000000000000000000000000000000000000000000000000000000000000000000",
            "00000000000000000000000000000000000000000000000000000040000000000000000000000000",
            "00000000000000000000000000000000000001d8b292cf4a8e1ff21ac27c4f94071cd02c022c414b",
            "00000000000000000000000000000000000000000000000000000000000000009517e29f00000000",
            "00000000000000000000000000000000000000000000000000000002000000000000000000000000",
            "ad6330089d9a1fe89f4020292e1afe9969a5a2fc0000000000000000000000000000000000000000",
            "00000000000000000000006000000000000000000000000000000000000000000000000000000000",
            "00000120000000000000000000000000000000000000000000000000000000000001518000000000",
            "00000000000000000000000000000000000000000000000000000000000000000000000000000000",
            "0000000000000000000000000000018e2fbe89800000000000000000000000000000000000000000",
            "00000000000000000000008000000000000000000000000000000000000000000000000000000000",
            "000000800000000000000000000000002372912728f93ab3daaaebea4f87e6e28476d98700000000",
            "0000000000000000000000000000000000000000002386f26fc10000000000000000000000000000",
            "00000000000000000000000000000000000000600000000000000000000000000000000000000000",
            "0000000000000000000000000000000000000000",
        ))
        .unwrap();
        PackedUserOperation {
            sender: address!("b292Cf4a8E1fF21Ac27C4f94071Cd02C022C414b"),
            nonce: uint!(0xF83D07238A7C8814A48535035602123AD6DBFA63000000000000000000000001_U256),
            initCode: Bytes::default(),
            callData: call_data.into(),
            accountGasLimits: b256!(
                "000000000000000000000000000114fc0000000000000000000000000012c9b5"
            ),
            preVerificationGas: U256::from(48916),
            gasFees: b256!("000000000000000000000000524121000000000000000000000000109a4a441a"),
            paymasterAndData: Bytes::default(),
            signature: bytes!("3c7bfe22c9c2ef8994a9637bcc4df1741c5dc0c25b209545a7aeb20f7770f351479b683bd17c4d55bc32e2a649c8d2dff49dcfcc1f3fd837bcd88d1e69a434cf1c"),
        }
    }

    #[test]
    fn v07_hash_matches_entry_point() {
        let op = sepolia_op();
        assert_eq!(op.callData.len(), 580);
        assert_eq!(
            hash_v07(&op, EntryPointVersion::V07_ADDRESS, 11155111),
            b256!("e486401370d145766c3cf7ba089553214a1230d38662ae532c9b62eb6dadcf7e")
        );
    }

    #[test]
    fn v08_hash_is_typed_data_digest() {
        let op = sepolia_op();
        assert_eq!(
            user_op_hash(&op, EntryPointVersion::V08, EntryPointVersion::V08_ADDRESS, 11155111),
            b256!("b2fbe81199f6292d3f88bacec9c5587681da4e632f5b3dead0f1741a7b65cb94")
        );
    }

    #[test]
    fn manual_digest_matches_sol_struct() {
        let op = sepolia_op();
        let domain = eip712_domain! {
            name: "ERC4337",
            version: "1",
            chain_id: 8453,
            verifying_contract: EntryPointVersion::V08_ADDRESS,
        };
        let expected = typed::PackedUserOperation {
            sender: op.sender,
            nonce: op.nonce,
            initCode: op.initCode.clone(),
            callData: op.callData.clone(),
            accountGasLimits: op.accountGasLimits,
            preVerificationGas: op.preVerificationGas,
            gasFees: op.gasFees,
            paymasterAndData: op.paymasterAndData.clone(),
        }
        .eip712_signing_hash(&domain);

        let typed = TypedUserOperation::new(
            &op,
            SigningDomain::new(8453, EntryPointVersion::V08_ADDRESS),
        );
        assert_eq!(typed.domain.separator(), domain.separator());
        assert_eq!(typed.signing_hash(), expected);
    }

    #[test]
    fn domain_binds_verifying_contract() {
        let op = sepolia_op();
        let right = TypedUserOperation::new(&op, SigningDomain::new(1, EntryPointVersion::V08_ADDRESS));
        let wrong = TypedUserOperation::new(&op, SigningDomain::new(1, EntryPointVersion::V07_ADDRESS));
        assert_ne!(right.signing_hash(), wrong.signing_hash());
    }

    #[test]
    fn draft_round_trips_through_packed_form() {
        let draft = UserOperationDraft {
            sender: address!("1111111111111111111111111111111111111111"),
            nonce: U256::from(7),
            factory: Some(address!("2222222222222222222222222222222222222222")),
            factory_data: Some(bytes!("abcdef")),
            call_data: bytes!("b61d27f6"),
            call_gas_limit: U256::from(0x2dc6c0),
            verification_gas_limit: U256::from(0x1e8480),
            pre_verification_gas: U256::from(0x186a0),
            max_fee_per_gas: U256::from(0x77359400),
            max_priority_fee_per_gas: U256::from(0x3b9aca00),
            paymaster: Some(address!("3333333333333333333333333333333333333333")),
            paymaster_verification_gas_limit: Some(U256::from(0x186a0)),
            paymaster_post_op_gas_limit: Some(U256::from(0x27100)),
            paymaster_data: Some(bytes!("fafb")),
            signature: bytes!("01"),
            eip7702_auth: None,
        };
        let packed = draft.pack().unwrap();
        assert_eq!(packed.initCode.len(), 23);
        assert_eq!(packed.paymasterAndData.len(), 54);
        assert_eq!(UserOperationDraft::from_packed(&packed).unwrap(), draft);
    }

    #[test]
    fn oversized_pre_verification_gas_fails_to_pack() {
        let draft = UserOperationDraft {
            pre_verification_gas: U256::from(u128::MAX) + U256::from(1),
            ..Default::default()
        };
        assert!(matches!(
            draft.pack(),
            Err(PackingError::FieldOverflow { field: "preVerificationGas", .. })
        ));
    }

    #[test]
    fn draft_serializes_as_rpc_user_operation() {
        let draft = UserOperationDraft {
            sender: address!("1111111111111111111111111111111111111111"),
            call_gas_limit: U256::from(0x5208),
            ..Default::default()
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["sender"], "0x1111111111111111111111111111111111111111");
        assert_eq!(json["callGasLimit"], "0x5208");
        assert_eq!(json["callData"], "0x");
        assert!(json.get("paymaster").is_none());
        assert!(json.get("factory").is_none());
        assert!(json.get("eip7702Auth").is_none());
    }

    #[test]
    fn entry_point_version_from_address() {
        assert_eq!(
            EntryPointVersion::try_from(EntryPointVersion::V07_ADDRESS),
            Ok(EntryPointVersion::V07)
        );
        assert_eq!(EntryPointVersion::V08.address(), EntryPointVersion::V08_ADDRESS);
        assert!(EntryPointVersion::try_from(Address::ZERO).is_err());
        assert_eq!("v0.7".parse(), Ok(EntryPointVersion::V07));
        assert_eq!("0.8".parse(), Ok(EntryPointVersion::V08));
        assert_eq!(EntryPointVersion::V08.to_string(), "v0.8");
        assert!("0.6".parse::<EntryPointVersion>().is_err());
    }
}
