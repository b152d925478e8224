//! Pipeline failures, tagged with the stage that failed.

use userop_core::{CoreError, PackingError, PipelineStage, SimulationResult};
use userop_rpc_client::RpcError;
use userop_signer::SignerError;
use userop_simulator::SimulatorError;

/// Why an operation attempt stopped. Nothing is retried or corrected automatically.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed input, rejected before any network call.
    #[error("invalid input: {0}")]
    Input(#[from] CoreError),
    /// A gas or paymaster value does not fit the packed layout.
    #[error(transparent)]
    Packing(#[from] PackingError),
    /// A remote call failed.
    #[error("{stage} failed: {source}")]
    Rpc {
        /// Stage the call belonged to.
        stage: PipelineStage,
        /// Underlying failure.
        #[source]
        source: RpcError,
    },
    /// The signer refused or failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// Simulation could not run.
    #[error(transparent)]
    Simulator(#[from] SimulatorError),
    /// Pre-flight simulation predicts the `EntryPoint` will reject the operation.
    #[error("simulation rejected the operation: {}", .0.describe())]
    SimulationRejected(Box<SimulationResult>),
    /// The caller cancelled the attempt.
    #[error("operation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub(crate) fn rpc(stage: PipelineStage, source: RpcError) -> Self {
        if source.is_cancelled() { Self::Cancelled } else { Self::Rpc { stage, source } }
    }

    pub(crate) fn simulator(source: SimulatorError) -> Self {
        match source {
            SimulatorError::Rpc(rpc) => Self::rpc(PipelineStage::Simulating, rpc),
            other => Self::Simulator(other),
        }
    }

    /// Timeouts and transport failures; the caller may retry the attempt.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// No paymaster policy covers the sender/target pair, or the chain lacks a needed endpoint.
    pub const fn is_not_configured(&self) -> bool {
        matches!(self, Self::Rpc { source: RpcError::NotConfigured(_), .. })
    }

    /// The simulated AA code, when simulation rejected the operation.
    pub fn aa_code(&self) -> Option<userop_core::AaCode> {
        match self {
            Self::SimulationRejected(result) => result.code,
            _ => None,
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
