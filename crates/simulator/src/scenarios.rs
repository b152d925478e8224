//! Conformance suite for the ERC-4337 validation error taxonomy.
//!
//! Every [`Scenario`] corrupts exactly one aspect of a valid base operation and expects the
//! `EntryPoint` to reject it with its AA code, then re-runs the untouched operation and
//! expects success.

use std::{fmt, str::FromStr, sync::Arc};

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use userop_core::{
    AaCode, EntryPointVersion, KnownCall, SigningDomain, SimulationResult, UserOperationDraft,
};
use userop_rpc_client::CallContext;
use userop_signer::{SignatureEngine, SignatureStrategy, SigningTarget};

use crate::{
    engine::SimulationEngine,
    error::{Result, SimulatorError},
    simulator::PreflightSimulator,
};

/// Fee that makes any realistic operation's prefund exceed the account deposit.
const PREFUND_BREAKING_FEE: u64 = 1_000_000_000_000_000;

/// Length of the `(validUntil, validAfter)` header of time-bounded paymaster data.
const PAYMASTER_WINDOW_LEN: usize = 64;

/// A named fault injected into an otherwise valid operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scenario {
    /// initCode attached to an already deployed sender.
    #[serde(rename = "AA10")]
    SenderAlreadyConstructed,
    /// Unsponsored operation whose prefund exceeds the account deposit.
    #[serde(rename = "AA21")]
    PrefundNotPaid,
    /// `verificationGasLimit` forced to 1.
    #[serde(rename = "AA23")]
    ValidationOutOfGas,
    /// Signed under a typed-data domain bound to the wrong `EntryPoint`.
    #[serde(rename = "AA24")]
    DomainMismatch,
    /// An already consumed nonce.
    #[serde(rename = "AA25")]
    StaleNonce,
    /// Simulated after the paymaster's `validUntil`.
    #[serde(rename = "AA32")]
    PaymasterExpired,
    /// `paymasterVerificationGasLimit` forced to 1.
    #[serde(rename = "AA33")]
    PaymasterOutOfGas,
    /// Tampered paymaster signature.
    #[serde(rename = "AA34")]
    PaymasterSignature,
    /// Zero beneficiary passed to `handleOps`.
    #[serde(rename = "AA90")]
    InvalidBeneficiary,
}

impl Scenario {
    /// Every preset, in AA code order.
    pub const ALL: [Self; 9] = [
        Self::SenderAlreadyConstructed,
        Self::PrefundNotPaid,
        Self::ValidationOutOfGas,
        Self::DomainMismatch,
        Self::StaleNonce,
        Self::PaymasterExpired,
        Self::PaymasterOutOfGas,
        Self::PaymasterSignature,
        Self::InvalidBeneficiary,
    ];

    /// Code the broken run must fail with.
    pub const fn expected_code(&self) -> AaCode {
        match self {
            Self::SenderAlreadyConstructed => AaCode::AA10,
            Self::PrefundNotPaid => AaCode::AA21,
            Self::ValidationOutOfGas => AaCode::AA23,
            Self::DomainMismatch => AaCode::AA24,
            Self::StaleNonce => AaCode::AA25,
            Self::PaymasterExpired => AaCode::AA32,
            Self::PaymasterOutOfGas => AaCode::AA33,
            Self::PaymasterSignature => AaCode::AA34,
            Self::InvalidBeneficiary => AaCode::AA90,
        }
    }

    /// `AAxx` name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SenderAlreadyConstructed => "AA10",
            Self::PrefundNotPaid => "AA21",
            Self::ValidationOutOfGas => "AA23",
            Self::DomainMismatch => "AA24",
            Self::StaleNonce => "AA25",
            Self::PaymasterExpired => "AA32",
            Self::PaymasterOutOfGas => "AA33",
            Self::PaymasterSignature => "AA34",
            Self::InvalidBeneficiary => "AA90",
        }
    }

    /// Whether the scenario needs a sponsored base operation.
    pub const fn needs_paymaster(&self) -> bool {
        matches!(self, Self::PaymasterExpired | Self::PaymasterOutOfGas | Self::PaymasterSignature)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name() == upper)
            .ok_or_else(|| format!("unknown scenario {s:?}"))
    }
}

/// The valid operation every scenario starts from.
#[derive(Debug, Clone)]
pub struct ScenarioBase {
    /// A valid operation for a deployed sender. Its signature is replaced on every run.
    pub draft: UserOperationDraft,
    /// Signing target of the valid runs.
    pub target: SigningTarget,
    /// Beneficiary of the valid runs.
    pub beneficiary: Address,
    /// Factory attached by the AA10 scenario.
    pub factory: Option<Address>,
    /// Block time of the valid runs; the latest block when `None`.
    pub at_time: Option<u64>,
}

/// Outcome of one scenario: the corrupted run and its fixed counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    /// Preset that ran.
    pub scenario: Scenario,
    /// Code the broken run should fail with.
    pub expected: AaCode,
    /// Outcome of the corrupted operation.
    pub broken: SimulationResult,
    /// Outcome of the untouched operation.
    pub fixed: SimulationResult,
}

impl ScenarioReport {
    /// The broken run failed with the expected code and the fixed run succeeded.
    pub fn passed(&self) -> bool {
        !self.broken.success && self.broken.code == Some(self.expected) && self.fixed.success
    }
}

#[derive(Debug)]
struct PreparedRun {
    draft: UserOperationDraft,
    signing_target: SigningTarget,
    beneficiary: Address,
    at_time: Option<u64>,
}

fn unsupported(scenario: Scenario, reason: &'static str) -> SimulatorError {
    SimulatorError::ScenarioUnsupported { scenario: scenario.name(), reason }
}

/// `(validUntil, validAfter)` from ABI encoded time-bounded paymaster data.
pub fn paymaster_window(data: &[u8]) -> Option<(u64, u64)> {
    if data.len() < PAYMASTER_WINDOW_LEN {
        return None;
    }
    let valid_until = U256::from_be_slice(&data[..32]);
    let valid_after = U256::from_be_slice(&data[32..PAYMASTER_WINDOW_LEN]);
    Some((u64::try_from(valid_until).ok()?, u64::try_from(valid_after).ok()?))
}

fn wrong_entry_point(actual: Address) -> Address {
    if actual == EntryPointVersion::V07_ADDRESS {
        EntryPointVersion::V08_ADDRESS
    } else {
        EntryPointVersion::V07_ADDRESS
    }
}

impl ScenarioBase {
    fn valid_run(&self) -> PreparedRun {
        PreparedRun {
            draft: self.draft.clone(),
            signing_target: self.target,
            beneficiary: self.beneficiary,
            at_time: self.at_time,
        }
    }

    fn broken_run(
        &self,
        scenario: Scenario,
        owner: Address,
        strategy: SignatureStrategy,
    ) -> Result<PreparedRun> {
        let mut run = self.valid_run();
        let draft = &mut run.draft;
        if scenario.needs_paymaster() && draft.paymaster.is_none() {
            return Err(unsupported(scenario, "base operation is not sponsored"));
        }

        match scenario {
            Scenario::SenderAlreadyConstructed => {
                if draft.factory.is_some() {
                    return Err(unsupported(scenario, "base sender is not deployed"));
                }
                let factory = self
                    .factory
                    .ok_or_else(|| unsupported(scenario, "no account factory configured"))?;
                draft.factory = Some(factory);
                draft.factory_data =
                    Some(KnownCall::CreateAccount { owner, salt: U256::ZERO }.abi_encode());
            }
            Scenario::PrefundNotPaid => {
                draft.paymaster = None;
                draft.paymaster_data = None;
                draft.paymaster_verification_gas_limit = None;
                draft.paymaster_post_op_gas_limit = None;
                draft.max_fee_per_gas = draft.max_fee_per_gas.max(U256::from(PREFUND_BREAKING_FEE));
            }
            Scenario::ValidationOutOfGas => draft.verification_gas_limit = U256::from(1),
            Scenario::DomainMismatch => {
                if strategy == SignatureStrategy::RawHash {
                    return Err(unsupported(scenario, "raw-hash signatures carry no domain"));
                }
                let target = self.target;
                run.signing_target = target.with_domain(SigningDomain::new(
                    target.chain_id,
                    wrong_entry_point(target.entry_point),
                ));
            }
            Scenario::StaleNonce => {
                draft.nonce = if draft.nonce.is_zero() {
                    U256::from(1)
                } else {
                    draft.nonce - U256::from(1)
                };
            }
            Scenario::PaymasterExpired => {
                let (valid_until, _) = draft
                    .paymaster_data
                    .as_ref()
                    .and_then(|b| paymaster_window(b))
                    .filter(|(until, _)| *until != 0)
                    .ok_or_else(|| unsupported(scenario, "paymaster data carries no expiry"))?;
                run.at_time = Some(valid_until + 1);
            }
            Scenario::PaymasterOutOfGas => {
                draft.paymaster_verification_gas_limit = Some(U256::from(1));
            }
            Scenario::PaymasterSignature => {
                let data = draft.paymaster_data.clone().unwrap_or_default();
                if data.len() <= PAYMASTER_WINDOW_LEN {
                    return Err(unsupported(scenario, "paymaster data carries no signature"));
                }
                let mut tampered = data.to_vec();
                if let Some(last) = tampered.last_mut() {
                    *last ^= 0xff;
                }
                draft.paymaster_data = Some(Bytes::from(tampered));
            }
            Scenario::InvalidBeneficiary => run.beneficiary = Address::ZERO,
        }
        Ok(run)
    }
}

/// Runs scenarios against one base operation.
#[derive(Debug)]
pub struct ScenarioSuite<E> {
    simulator: PreflightSimulator<E>,
    signer: SignatureEngine,
    base: Arc<ScenarioBase>,
}

impl<E> Clone for ScenarioSuite<E> {
    fn clone(&self) -> Self {
        Self {
            simulator: self.simulator.clone(),
            signer: self.signer.clone(),
            base: Arc::clone(&self.base),
        }
    }
}

impl<E: SimulationEngine + 'static> ScenarioSuite<E> {
    /// Suite over `base`, signing with `signer`.
    pub fn new(simulator: PreflightSimulator<E>, signer: SignatureEngine, base: ScenarioBase) -> Self {
        Self { simulator, signer, base: Arc::new(base) }
    }

    /// The valid operation.
    pub fn base(&self) -> &ScenarioBase {
        &self.base
    }

    async fn execute(&self, ctx: &CallContext, mut run: PreparedRun) -> Result<SimulationResult> {
        self.signer.sign_in_place(&mut run.draft, &run.signing_target).await?;
        self.simulator
            .simulate(ctx, &run.draft, self.base.target.entry_point, run.beneficiary, run.at_time)
            .await
    }

    /// Runs the broken and then the fixed variant of `scenario`.
    pub async fn run(&self, ctx: &CallContext, scenario: Scenario) -> Result<ScenarioReport> {
        let broken_run =
            self.base.broken_run(scenario, self.signer.address(), self.signer.strategy())?;
        debug!(%scenario, "running broken variant");
        let broken = self.execute(ctx, broken_run).await?;
        debug!(%scenario, "running fixed variant");
        let fixed = self.execute(ctx, self.base.valid_run()).await?;

        let report =
            ScenarioReport { scenario, expected: scenario.expected_code(), broken, fixed };
        if report.passed() {
            info!(%scenario, "scenario passed");
        } else {
            warn!(
                %scenario,
                broken = %report.broken.describe(),
                fixed = %report.fixed.describe(),
                "scenario failed"
            );
        }
        Ok(report)
    }

    /// Runs `scenarios` concurrently; results come back in scenario order.
    pub async fn run_all(
        &self,
        ctx: &CallContext,
        scenarios: &[Scenario],
    ) -> Vec<(Scenario, Result<ScenarioReport>)> {
        let mut tasks = JoinSet::new();
        for &scenario in scenarios {
            let suite = self.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move { (scenario, suite.run(&ctx, scenario).await) });
        }

        let mut results = Vec::with_capacity(scenarios.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => results.push(outcome),
                Err(e) => warn!(error = %e, "scenario task failed"),
            }
        }
        for &scenario in scenarios {
            if !results.iter().any(|(s, _)| *s == scenario) {
                results.push((scenario, Err(SimulatorError::Task(format!("{scenario} aborted")))));
            }
        }
        results.sort_by_key(|(scenario, _)| *scenario);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use userop_core::test_utils::{BENEFICIARY, CHAIN_ID, PAYMASTER, sample_draft};
    use userop_signer::LocalKeySigner;

    const TYPED: SignatureStrategy = SignatureStrategy::TypedData;

    fn base() -> ScenarioBase {
        ScenarioBase {
            draft: sample_draft(),
            target: SigningTarget::new(
                EntryPointVersion::V07_ADDRESS,
                EntryPointVersion::V07,
                CHAIN_ID,
            ),
            beneficiary: BENEFICIARY,
            factory: None,
            at_time: None,
        }
    }

    fn window(valid_until: u64, valid_after: u64) -> Vec<u8> {
        let mut data = U256::from(valid_until).to_be_bytes::<32>().to_vec();
        data.extend_from_slice(&U256::from(valid_after).to_be_bytes::<32>());
        data
    }

    #[test]
    fn names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>(), Ok(scenario));
            assert_eq!(scenario.name(), scenario.expected_code().to_string());
        }
        assert_eq!("aa23".parse(), Ok(Scenario::ValidationOutOfGas));
        assert!("AA99".parse::<Scenario>().is_err());
    }

    #[test]
    fn each_preset_touches_one_field() {
        let base = base();
        let owner = Address::repeat_byte(0x77);

        let run = base.broken_run(Scenario::ValidationOutOfGas, owner, TYPED).unwrap();
        assert_eq!(run.draft.verification_gas_limit, U256::from(1));
        assert_eq!(run.draft.call_gas_limit, base.draft.call_gas_limit);

        let run = base.broken_run(Scenario::StaleNonce, owner, TYPED).unwrap();
        assert_eq!(run.draft.nonce, U256::ZERO);

        let run = base.broken_run(Scenario::InvalidBeneficiary, owner, TYPED).unwrap();
        assert_eq!(run.beneficiary, Address::ZERO);
        assert_eq!(run.draft, base.draft);

        let run = base.broken_run(Scenario::DomainMismatch, owner, TYPED).unwrap();
        assert_eq!(run.signing_target.domain.verifying_contract, EntryPointVersion::V08_ADDRESS);
        assert_eq!(run.signing_target.entry_point, base.target.entry_point);
        assert_eq!(run.draft, base.draft);
    }

    #[tokio::test]
    async fn domain_mismatch_keeps_user_op_hash() {
        let base = base();
        let engine = SignatureEngine::new(Arc::new(LocalKeySigner::random()), TYPED);
        let broken = base.broken_run(Scenario::DomainMismatch, engine.address(), TYPED).unwrap();
        let fixed = base.valid_run();

        let broken = engine.sign_user_operation(&broken.draft, &broken.signing_target).await.unwrap();
        let fixed = engine.sign_user_operation(&fixed.draft, &fixed.signing_target).await.unwrap();
        assert_eq!(broken.user_op_hash, fixed.user_op_hash);
        assert_ne!(broken.signature, fixed.signature);
    }

    #[test]
    fn domain_mismatch_needs_typed_data() {
        let err = base()
            .broken_run(Scenario::DomainMismatch, Address::ZERO, SignatureStrategy::RawHash)
            .unwrap_err();
        assert!(matches!(err, SimulatorError::ScenarioUnsupported { scenario: "AA24", .. }));
    }

    #[test]
    fn paymaster_presets_need_sponsorship() {
        let base = base();
        let err = base.broken_run(Scenario::PaymasterOutOfGas, Address::ZERO, TYPED).unwrap_err();
        assert!(matches!(err, SimulatorError::ScenarioUnsupported { scenario: "AA33", .. }));
        assert!(base.broken_run(Scenario::SenderAlreadyConstructed, Address::ZERO, TYPED).is_err());
    }

    #[test]
    fn expired_window_moves_block_time() {
        let mut base = base();
        let mut data = window(1_700_000_000, 0);
        data.extend_from_slice(&[0x1b; 65]);
        base.draft.paymaster = Some(PAYMASTER);
        base.draft.paymaster_data = Some(Bytes::from(data));
        base.draft.paymaster_verification_gas_limit = Some(U256::from(60_000));

        assert_eq!(paymaster_window(base.draft.paymaster_data.as_deref().unwrap()), Some((1_700_000_000, 0)));
        let run = base.broken_run(Scenario::PaymasterExpired, Address::ZERO, TYPED).unwrap();
        assert_eq!(run.at_time, Some(1_700_000_001));

        let run = base.broken_run(Scenario::PaymasterSignature, Address::ZERO, TYPED).unwrap();
        let tampered = run.draft.paymaster_data.unwrap();
        assert_eq!(tampered.last(), Some(&0xe4));
        assert_eq!(tampered[..64], base.draft.paymaster_data.as_ref().unwrap()[..64]);

        let run = base.broken_run(Scenario::PrefundNotPaid, Address::ZERO, TYPED).unwrap();
        assert_eq!(run.draft.paymaster, None);
        assert_eq!(run.draft.max_fee_per_gas, U256::from(PREFUND_BREAKING_FEE));
    }
}
