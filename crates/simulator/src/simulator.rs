//! Pre-flight simulation of signed operations.

use std::{fmt, str::FromStr, sync::Arc, time::Instant};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use userop_core::{KnownCall, SimulationResult, UserOperationDraft};
use userop_rpc_client::{CallContext, SimulationRequest};

use crate::{engine::SimulationEngine, error::Result, trace::extract_outcome};

/// Which `EntryPoint` entry the simulated transaction calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimulationMode {
    /// `handleOps([op], beneficiary)`, validation and execution.
    #[default]
    HandleOps,
    /// `simulateValidation(op)`, validation only.
    SimulateValidation,
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandleOps => f.write_str("handle-ops"),
            Self::SimulateValidation => f.write_str("simulate-validation"),
        }
    }
}

impl FromStr for SimulationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "handle-ops" | "handleOps" => Ok(Self::HandleOps),
            "simulate-validation" | "simulateValidation" => Ok(Self::SimulateValidation),
            other => Err(format!("unknown simulation mode {other:?}")),
        }
    }
}

/// Settings for the simulated bundle transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// `handleOps` or `simulateValidation`.
    pub mode: SimulationMode,
    /// Gas limit of the simulated transaction.
    pub gas: U256,
    /// Gas price of the simulated transaction.
    pub gas_price: U256,
    /// Transaction sender; the beneficiary when unset.
    pub caller: Option<Address>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            mode: SimulationMode::HandleOps,
            gas: U256::from(15_000_000u64),
            gas_price: U256::ZERO,
            caller: None,
        }
    }
}

/// Dry-runs user operations against a [`SimulationEngine`] before they reach a bundler.
#[derive(Debug)]
pub struct PreflightSimulator<E> {
    engine: Arc<E>,
    config: SimulatorConfig,
}

impl<E> Clone for PreflightSimulator<E> {
    fn clone(&self) -> Self {
        Self { engine: Arc::clone(&self.engine), config: self.config.clone() }
    }
}

impl<E: SimulationEngine> PreflightSimulator<E> {
    /// Simulator over `engine`.
    pub fn new(engine: Arc<E>, config: SimulatorConfig) -> Self {
        Self { engine, config }
    }

    /// Simulation settings.
    pub const fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// The transaction that submits `draft` to `entry_point`.
    pub fn build_request(
        &self,
        draft: &UserOperationDraft,
        entry_point: Address,
        beneficiary: Address,
    ) -> Result<SimulationRequest> {
        let packed = draft.pack()?;
        let call = match self.config.mode {
            SimulationMode::HandleOps => KnownCall::HandleOps { ops: vec![packed], beneficiary },
            SimulationMode::SimulateValidation => KnownCall::SimulateValidation(packed),
        };
        Ok(SimulationRequest {
            from: self.config.caller.unwrap_or(beneficiary),
            to: entry_point,
            gas: self.config.gas,
            gas_price: self.config.gas_price,
            value: U256::ZERO,
            data: call.abi_encode(),
        })
    }

    /// Simulates `draft` as of `at_time` (unix seconds), or the latest block when `None`.
    ///
    /// Reverts come back as an unsuccessful [`SimulationResult`]; `Err` means the simulation
    /// itself could not run.
    pub async fn simulate(
        &self,
        ctx: &CallContext,
        draft: &UserOperationDraft,
        entry_point: Address,
        beneficiary: Address,
        at_time: Option<u64>,
    ) -> Result<SimulationResult> {
        let start = Instant::now();
        let request = self.build_request(draft, entry_point, beneficiary)?;
        let raw = self.engine.simulate_transaction(ctx, &request, at_time).await?;
        let result = extract_outcome(raw);

        if result.success {
            info!(
                sender = %draft.sender,
                mode = %self.config.mode,
                duration_ms = start.elapsed().as_millis(),
                "simulation succeeded"
            );
        } else {
            warn!(
                sender = %draft.sender,
                mode = %self.config.mode,
                code = ?result.code,
                reason = result.reason.as_deref(),
                duration_ms = start.elapsed().as_millis(),
                "simulation reverted"
            );
        }
        Ok(result)
    }
}
