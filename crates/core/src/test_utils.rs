//! Fixtures shared by tests across the workspace.

use alloy_primitives::{Address, Bytes, U256, address, bytes};

use crate::{
    abi::Call,
    builder::{CallEncoding, new_draft},
    gas::GasEstimate,
    sponsorship::{PaymasterFields, PaymasterStubData},
    user_operation::UserOperationDraft,
};

/// Deployed smart account used as the default sender.
pub const SENDER: Address = address!("1111111111111111111111111111111111111111");
/// Call target.
pub const TARGET: Address = address!("3333333333333333333333333333333333333333");
/// Sponsoring paymaster.
pub const PAYMASTER: Address = address!("2cc0c7981d846b9f2a16276556f6e8cb52bfb633");
/// Bundle beneficiary.
pub const BENEFICIARY: Address = address!("5555555555555555555555555555555555555555");
/// Base Sepolia.
pub const CHAIN_ID: u64 = 84532;

/// A 1 wei call to [`TARGET`].
pub fn sample_call() -> Call {
    Call { target: TARGET, value: U256::ZERO, data: bytes!("d204c45e") }
}

/// An unsigned draft for [`SENDER`] with nonce 1.
pub fn sample_draft() -> UserOperationDraft {
    let mut draft = new_draft(&SENDER.to_string(), vec![sample_call()], CallEncoding::Execute)
        .unwrap_or_default();
    draft.nonce = U256::from(1);
    draft
}

/// A plausible bundler estimate.
pub fn sample_estimate() -> GasEstimate {
    GasEstimate {
        call_gas_limit: U256::from(0x12c9b5),
        verification_gas_limit: U256::from(0x114fc),
        pre_verification_gas: U256::from(48_916),
        paymaster_verification_gas_limit: Some(U256::from(0x7f72)),
        paymaster_post_op_gas_limit: Some(U256::ZERO),
    }
}

/// A non-final paymaster stub.
pub fn sample_stub() -> PaymasterStubData {
    PaymasterStubData {
        fields: PaymasterFields {
            paymaster: PAYMASTER,
            paymaster_data: Bytes::from_static(&[0u8; 8]),
            paymaster_verification_gas_limit: Some(U256::from(60_000)),
            paymaster_post_op_gas_limit: Some(U256::from(1)),
        },
        is_final: false,
        sponsor: None,
    }
}
