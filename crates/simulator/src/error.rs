//! Simulation and scenario failures.

use userop_core::PackingError;
use userop_rpc_client::RpcError;
use userop_signer::SignerError;

/// Failures that prevent a simulation from producing a [`userop_core::SimulationResult`].
///
/// A simulated revert is not an error; it is reported through the result.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    /// The simulation endpoint failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Signing a scenario run failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// The operation could not be packed.
    #[error(transparent)]
    Packing(#[from] PackingError),
    /// The base operation lacks what the scenario needs to corrupt.
    #[error("scenario {scenario} unsupported: {reason}")]
    ScenarioUnsupported {
        /// `AAxx` name.
        scenario: &'static str,
        /// What the base operation is missing.
        reason: &'static str,
    },
    /// A scenario task panicked or was aborted.
    #[error("scenario task failed: {0}")]
    Task(String),
}

/// Result alias for simulator operations.
pub type Result<T, E = SimulatorError> = std::result::Result<T, E>;
