//! Bit-level packing of the v0.7+ `PackedUserOperation` gas fields.
//!
//! `accountGasLimits` holds `verificationGasLimit` in the high 128 bits and `callGasLimit`
//! in the low 128 bits, `gasFees` holds `maxPriorityFeePerGas` high and `maxFeePerGas` low.
//! This matches `UserOperationLib.unpackUints` in EntryPoint v0.7 and v0.8.

use alloy_primitives::{Address, B256, Bytes, U256};

use crate::error::PackingError;

/// Bytes taken by the paymaster address and its two gas limits.
pub const PAYMASTER_DATA_OFFSET: usize = 20 + 16 + 16;

/// Converts `value` to `u128`, refusing anything wider.
pub fn checked_u128(field: &'static str, value: U256) -> Result<u128, PackingError> {
    if value > U256::from(u128::MAX) {
        return Err(PackingError::FieldOverflow { field, value });
    }
    Ok(value.to::<u128>())
}

fn concat_u128(high: u128, low: u128) -> B256 {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(&high.to_be_bytes());
    out[16..].copy_from_slice(&low.to_be_bytes());
    B256::from(out)
}

fn split_u128(packed: &B256) -> (u128, u128) {
    let mut high = [0u8; 16];
    let mut low = [0u8; 16];
    high.copy_from_slice(&packed[..16]);
    low.copy_from_slice(&packed[16..]);
    (u128::from_be_bytes(high), u128::from_be_bytes(low))
}

/// Packs the account gas limits, verification high and call low.
pub fn pack_account_gas_limits(
    call_gas_limit: U256,
    verification_gas_limit: U256,
) -> Result<B256, PackingError> {
    let call = checked_u128("callGasLimit", call_gas_limit)?;
    let verification = checked_u128("verificationGasLimit", verification_gas_limit)?;
    Ok(concat_u128(verification, call))
}

/// Inverse of [`pack_account_gas_limits`], returns `(callGasLimit, verificationGasLimit)`.
pub fn unpack_account_gas_limits(packed: &B256) -> (U256, U256) {
    let (verification, call) = split_u128(packed);
    (U256::from(call), U256::from(verification))
}

/// Packs the fee fields, priority fee high and max fee low.
pub fn pack_gas_fees(max_fee_per_gas: U256, max_priority_fee_per_gas: U256) -> Result<B256, PackingError> {
    let max_fee = checked_u128("maxFeePerGas", max_fee_per_gas)?;
    let priority = checked_u128("maxPriorityFeePerGas", max_priority_fee_per_gas)?;
    Ok(concat_u128(priority, max_fee))
}

/// Inverse of [`pack_gas_fees`], returns `(maxFeePerGas, maxPriorityFeePerGas)`.
pub fn unpack_gas_fees(packed: &B256) -> (U256, U256) {
    let (priority, max_fee) = split_u128(packed);
    (U256::from(max_fee), U256::from(priority))
}

/// `initCode` is the factory address followed by the factory calldata, or empty.
pub fn pack_init_code(factory: Option<Address>, factory_data: Option<&[u8]>) -> Bytes {
    match factory {
        Some(factory) => {
            let factory_data = factory_data.unwrap_or(&[]);
            let mut buf = Vec::with_capacity(20 + factory_data.len());
            buf.extend_from_slice(factory.as_slice());
            buf.extend_from_slice(factory_data);
            Bytes::from(buf)
        }
        None => Bytes::new(),
    }
}

/// Unpacked view of a `paymasterAndData` blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterAndData {
    /// Paymaster contract.
    pub paymaster: Address,
    /// Gas limit for the paymaster's validation.
    pub verification_gas_limit: U256,
    /// Gas limit for the paymaster's postOp.
    pub post_op_gas_limit: U256,
    /// Opaque paymaster payload.
    pub data: Bytes,
}

/// Packs `paymaster ‖ verificationGasLimit(16) ‖ postOpGasLimit(16) ‖ data`.
///
/// Without a paymaster the result is empty. Missing gas limits pack as zero; limits wider
/// than 128 bits are rejected rather than truncated.
pub fn pack_paymaster_and_data(
    paymaster: Option<Address>,
    verification_gas_limit: Option<U256>,
    post_op_gas_limit: Option<U256>,
    data: Option<&[u8]>,
) -> Result<Bytes, PackingError> {
    let Some(paymaster) = paymaster else {
        return Ok(Bytes::new());
    };
    let verification = checked_u128(
        "paymasterVerificationGasLimit",
        verification_gas_limit.unwrap_or_default(),
    )?;
    let post_op = checked_u128("paymasterPostOpGasLimit", post_op_gas_limit.unwrap_or_default())?;
    let data = data.unwrap_or(&[]);

    let mut buf = Vec::with_capacity(PAYMASTER_DATA_OFFSET + data.len());
    buf.extend_from_slice(paymaster.as_slice());
    buf.extend_from_slice(&verification.to_be_bytes());
    buf.extend_from_slice(&post_op.to_be_bytes());
    buf.extend_from_slice(data);
    Ok(Bytes::from(buf))
}

/// Inverse of [`pack_paymaster_and_data`]; `None` for an empty blob.
pub fn unpack_paymaster_and_data(packed: &[u8]) -> Result<Option<PaymasterAndData>, PackingError> {
    if packed.is_empty() {
        return Ok(None);
    }
    if packed.len() < PAYMASTER_DATA_OFFSET {
        return Err(PackingError::TruncatedPaymasterAndData(packed.len()));
    }
    let mut verification = [0u8; 16];
    let mut post_op = [0u8; 16];
    verification.copy_from_slice(&packed[20..36]);
    post_op.copy_from_slice(&packed[36..52]);
    Ok(Some(PaymasterAndData {
        paymaster: Address::from_slice(&packed[..20]),
        verification_gas_limit: U256::from(u128::from_be_bytes(verification)),
        post_op_gas_limit: U256::from(u128::from_be_bytes(post_op)),
        data: Bytes::copy_from_slice(&packed[PAYMASTER_DATA_OFFSET..]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256, bytes};

    #[test]
    fn account_gas_limits_layout() {
        let packed =
            pack_account_gas_limits(U256::from(0x12c9b5), U256::from(0x114fc)).unwrap();
        assert_eq!(
            packed,
            b256!("000000000000000000000000000114fc0000000000000000000000000012c9b5")
        );
        assert_eq!(
            unpack_account_gas_limits(&packed),
            (U256::from(0x12c9b5), U256::from(0x114fc))
        );
    }

    #[test]
    fn gas_fees_layout() {
        let packed =
            pack_gas_fees(U256::from(0x109a4a441au64), U256::from(0x52412100u64)).unwrap();
        assert_eq!(
            packed,
            b256!("000000000000000000000000524121000000000000000000000000109a4a441a")
        );
        assert_eq!(
            unpack_gas_fees(&packed),
            (U256::from(0x109a4a441au64), U256::from(0x52412100u64))
        );
    }

    #[test]
    fn packing_round_trips_at_the_edges() {
        let max = U256::from(u128::MAX);
        for (a, b) in [(U256::ZERO, U256::ZERO), (max, U256::ZERO), (U256::ZERO, max), (max, max)] {
            let packed = pack_account_gas_limits(a, b).unwrap();
            assert_eq!(unpack_account_gas_limits(&packed), (a, b));
            let packed = pack_gas_fees(a, b).unwrap();
            assert_eq!(unpack_gas_fees(&packed), (a, b));
        }
    }

    #[test]
    fn values_over_128_bits_are_rejected() {
        let too_big = U256::from(u128::MAX) + U256::from(1);
        assert_eq!(
            pack_account_gas_limits(U256::from(1), too_big),
            Err(PackingError::FieldOverflow { field: "verificationGasLimit", value: too_big })
        );
        assert_eq!(
            pack_gas_fees(too_big, U256::from(1)),
            Err(PackingError::FieldOverflow { field: "maxFeePerGas", value: too_big })
        );
        assert!(
            pack_paymaster_and_data(Some(Address::ZERO), None, Some(too_big), None).is_err()
        );
    }

    #[test]
    fn paymaster_and_data_is_empty_without_paymaster() {
        let packed =
            pack_paymaster_and_data(None, Some(U256::from(1)), Some(U256::from(2)), Some(&[1, 2]))
                .unwrap();
        assert!(packed.is_empty());
        assert_eq!(unpack_paymaster_and_data(&packed).unwrap(), None);
    }

    #[test]
    fn paymaster_and_data_has_fixed_header() {
        let paymaster = address!("2cc0c7981d846b9f2a16276556f6e8cb52bfb633");
        let data = bytes!("6931c09b529f9957");
        let packed = pack_paymaster_and_data(
            Some(paymaster),
            Some(U256::from(0x7f72)),
            Some(U256::ZERO),
            Some(&data),
        )
        .unwrap();
        assert_eq!(packed.len(), 20 + 16 + 16 + data.len());
        assert_eq!(
            packed,
            bytes!(
                "2cc0c7981d846b9f2a16276556f6e8cb52bfb633"
                "00000000000000000000000000007f72"
                "00000000000000000000000000000000"
                "6931c09b529f9957"
            )
        );
        let unpacked = unpack_paymaster_and_data(&packed).unwrap().unwrap();
        assert_eq!(unpacked.paymaster, paymaster);
        assert_eq!(unpacked.verification_gas_limit, U256::from(0x7f72));
        assert_eq!(unpacked.post_op_gas_limit, U256::ZERO);
        assert_eq!(unpacked.data, data);
    }

    #[test]
    fn truncated_paymaster_and_data_is_rejected() {
        assert_eq!(
            unpack_paymaster_and_data(&[0u8; 30]),
            Err(PackingError::TruncatedPaymasterAndData(30))
        );
    }

    #[test]
    fn init_code_concatenates_factory_and_data() {
        let factory = address!("2222222222222222222222222222222222222222");
        let init = pack_init_code(Some(factory), Some(&[0xab, 0xcd]));
        assert_eq!(init.len(), 22);
        assert_eq!(&init[..20], factory.as_slice());
        assert!(pack_init_code(None, Some(&[1])).is_empty());
    }
}
