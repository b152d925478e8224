//! Bundler gas estimates, percentage scaling and the advisory risk bands.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{error::PackingError, user_operation::UserOperationDraft};

/// `eth_estimateUserOperationGas` result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    /// Gas for the execution phase.
    pub call_gas_limit: U256,
    /// Gas for account validation.
    pub verification_gas_limit: U256,
    /// Gas charged for calldata and overhead.
    pub pre_verification_gas: U256,
    /// Set when a paymaster is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Set when a paymaster is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

/// Advisory classification of a scaling percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskBand {
    /// Below 80%, likely to run out of validation gas (AA23/AA33).
    HighRisk,
    /// 80% to 99%.
    Caution,
    /// At or above the bundler's own estimate.
    Safe,
}

impl RiskBand {
    /// Band of a single field's percentage.
    pub const fn for_percent(percent: u32) -> Self {
        match percent {
            0..80 => Self::HighRisk,
            80..100 => Self::Caution,
            _ => Self::Safe,
        }
    }

    /// The riskier of two bands.
    pub fn worst(self, other: Self) -> Self {
        self.min(other)
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighRisk => f.write_str("high risk of AA23/AA33 (validation out-of-gas)"),
            Self::Caution => f.write_str("caution"),
            Self::Safe => f.write_str("safe"),
        }
    }
}

/// Percentage applied to each estimated field independently. 100 keeps the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasScaling {
    /// Applied to `callGasLimit`.
    pub call_gas_percent: u32,
    /// Applied to `verificationGasLimit`.
    pub verification_gas_percent: u32,
    /// Applied to `preVerificationGas`.
    pub pre_verification_gas_percent: u32,
}

impl Default for GasScaling {
    fn default() -> Self {
        Self::uniform(100)
    }
}

/// Per-field bands produced alongside a scaled estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingReport {
    /// Band of the call gas percentage.
    pub call_gas: RiskBand,
    /// Band of the verification gas percentage.
    pub verification_gas: RiskBand,
    /// Band of the pre-verification gas percentage.
    pub pre_verification_gas: RiskBand,
}

impl ScalingReport {
    /// The riskiest band across all fields.
    pub fn overall(&self) -> RiskBand {
        self.call_gas.worst(self.verification_gas).worst(self.pre_verification_gas)
    }
}

/// `floor(base * percent / 100)`.
pub fn scale_value(base: U256, percent: u32) -> U256 {
    base.saturating_mul(U256::from(percent)) / U256::from(100)
}

impl GasScaling {
    /// The same percentage for every field.
    pub const fn uniform(percent: u32) -> Self {
        Self {
            call_gas_percent: percent,
            verification_gas_percent: percent,
            pre_verification_gas_percent: percent,
        }
    }

    /// Scales the three account-side fields. Paymaster limits come from the paymaster and
    /// are left untouched.
    pub fn apply(&self, estimate: &GasEstimate) -> GasEstimate {
        GasEstimate {
            call_gas_limit: scale_value(estimate.call_gas_limit, self.call_gas_percent),
            verification_gas_limit: scale_value(
                estimate.verification_gas_limit,
                self.verification_gas_percent,
            ),
            pre_verification_gas: scale_value(
                estimate.pre_verification_gas,
                self.pre_verification_gas_percent,
            ),
            ..*estimate
        }
    }

    /// Risk band of each configured percentage.
    pub const fn report(&self) -> ScalingReport {
        ScalingReport {
            call_gas: RiskBand::for_percent(self.call_gas_percent),
            verification_gas: RiskBand::for_percent(self.verification_gas_percent),
            pre_verification_gas: RiskBand::for_percent(self.pre_verification_gas_percent),
        }
    }
}

impl GasEstimate {
    /// Writes the estimate into `draft`, rejecting values the packed layout cannot hold.
    pub fn apply_to(&self, draft: &mut UserOperationDraft) -> Result<(), PackingError> {
        draft.call_gas_limit = self.call_gas_limit;
        draft.verification_gas_limit = self.verification_gas_limit;
        draft.pre_verification_gas = self.pre_verification_gas;
        if draft.paymaster.is_some() {
            if let Some(limit) = self.paymaster_verification_gas_limit {
                draft.paymaster_verification_gas_limit = Some(limit);
            }
            if let Some(limit) = self.paymaster_post_op_gas_limit {
                draft.paymaster_post_op_gas_limit = Some(limit);
            }
        }
        draft.validate_gas_fields()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn estimate() -> GasEstimate {
        GasEstimate {
            call_gas_limit: U256::from(100_000),
            verification_gas_limit: U256::from(77_777),
            pre_verification_gas: U256::from(48_916),
            paymaster_verification_gas_limit: Some(U256::from(30_000)),
            paymaster_post_op_gas_limit: None,
        }
    }

    #[test]
    fn scales_with_floor() {
        let scaled = GasScaling::uniform(150).apply(&estimate());
        assert_eq!(scaled.call_gas_limit, U256::from(150_000));
        assert_eq!(scaled.verification_gas_limit, U256::from(116_665));
        assert_eq!(scaled.pre_verification_gas, U256::from(73_374));
        assert_eq!(scaled.paymaster_verification_gas_limit, Some(U256::from(30_000)));

        let scaled = GasScaling::uniform(33).apply(&estimate());
        assert_eq!(scaled.verification_gas_limit, U256::from(25_666));
    }

    #[test]
    fn fields_scale_independently() {
        let scaling = GasScaling {
            call_gas_percent: 100,
            verification_gas_percent: 200,
            pre_verification_gas_percent: 50,
        };
        let scaled = scaling.apply(&estimate());
        assert_eq!(scaled.call_gas_limit, U256::from(100_000));
        assert_eq!(scaled.verification_gas_limit, U256::from(155_554));
        assert_eq!(scaled.pre_verification_gas, U256::from(24_458));
    }

    #[test]
    fn scaling_is_monotonic() {
        let base = estimate();
        let mut previous = GasScaling::uniform(0).apply(&base);
        for percent in 1..=300 {
            let next = GasScaling::uniform(percent).apply(&base);
            assert!(previous.call_gas_limit <= next.call_gas_limit);
            assert!(previous.verification_gas_limit <= next.verification_gas_limit);
            assert!(previous.pre_verification_gas <= next.pre_verification_gas);
            previous = next;
        }
    }

    #[test]
    fn risk_bands() {
        assert_eq!(RiskBand::for_percent(0), RiskBand::HighRisk);
        assert_eq!(RiskBand::for_percent(79), RiskBand::HighRisk);
        assert_eq!(RiskBand::for_percent(80), RiskBand::Caution);
        assert_eq!(RiskBand::for_percent(99), RiskBand::Caution);
        assert_eq!(RiskBand::for_percent(100), RiskBand::Safe);
        assert_eq!(RiskBand::for_percent(250), RiskBand::Safe);

        let report = GasScaling {
            call_gas_percent: 120,
            verification_gas_percent: 60,
            pre_verification_gas_percent: 90,
        }
        .report();
        assert_eq!(report.verification_gas, RiskBand::HighRisk);
        assert_eq!(report.overall(), RiskBand::HighRisk);
        assert_eq!(GasScaling::default().report().overall(), RiskBand::Safe);
    }

    #[test]
    fn paymaster_limits_only_apply_with_paymaster() {
        let mut draft = UserOperationDraft::default();
        estimate().apply_to(&mut draft).unwrap();
        assert_eq!(draft.verification_gas_limit, U256::from(77_777));
        assert_eq!(draft.paymaster_verification_gas_limit, None);

        draft.paymaster = Some(address!("3333333333333333333333333333333333333333"));
        estimate().apply_to(&mut draft).unwrap();
        assert_eq!(draft.paymaster_verification_gas_limit, Some(U256::from(30_000)));
    }

    #[test]
    fn deserializes_bundler_response() {
        let estimate: GasEstimate = serde_json::from_str(
            r#"{"preVerificationGas":"0xbf14","verificationGasLimit":"0x114fc","callGasLimit":"0x12c9b5","paymasterVerificationGasLimit":"0x0"}"#,
        )
        .unwrap();
        assert_eq!(estimate.pre_verification_gas, U256::from(48_916));
        assert_eq!(estimate.paymaster_verification_gas_limit, Some(U256::ZERO));
        assert_eq!(estimate.paymaster_post_op_gas_limit, None);
    }
}
