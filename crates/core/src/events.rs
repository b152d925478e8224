//! Progress events emitted while an operation moves through the pipeline.

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    gas::{GasEstimate, ScalingReport},
    simulation::SimulationResult,
};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    /// Draft assembly and nonce resolution.
    Building,
    /// ERC-7677 stub and final paymaster data.
    Sponsoring,
    /// Bundler estimate and scaling.
    Estimating,
    /// userOpHash signature.
    Signing,
    /// Pre-flight dry run.
    Simulating,
    /// Submission and receipt polling.
    Submitting,
    /// Included on chain.
    Done,
    /// Stopped on an error.
    Failed,
}

impl PipelineStage {
    /// Lowercase stage name used as a metric label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Sponsoring => "sponsoring",
            Self::Estimating => "estimating",
            Self::Signing => "signing",
            Self::Simulating => "simulating",
            Self::Submitting => "submitting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of the ERC-7677 handshake completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SponsorshipPhase {
    /// `pm_getPaymasterStubData`.
    Stub,
    /// `pm_getPaymasterData`.
    Final,
}

/// A completed step, with the data the step produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "data", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// Draft assembled with its nonce.
    Building {
        /// Account sending the operation.
        sender: Address,
        /// Resolved nonce.
        nonce: U256,
        /// Whether the operation deploys the sender.
        deploys: bool,
    },
    /// Paymaster fields applied.
    Sponsoring {
        /// Handshake half that completed.
        phase: SponsorshipPhase,
        /// Sponsoring paymaster.
        paymaster: Address,
    },
    /// Scaled gas written into the draft.
    Estimating {
        /// Scaled estimate.
        estimate: GasEstimate,
        /// Risk band of each scaled field.
        report: ScalingReport,
    },
    /// Operation signed.
    #[serde(rename_all = "camelCase")]
    Signing {
        /// Hash that was signed.
        user_op_hash: B256,
    },
    /// Dry run finished.
    Simulating {
        /// Simulated outcome.
        result: SimulationResult,
    },
    /// Accepted by the bundler (user op hash) or the node (transaction hash).
    Submitting {
        /// User op hash or transaction hash.
        hash: B256,
    },
    /// Included on chain.
    #[serde(rename_all = "camelCase")]
    Done {
        /// Hash reported on submission.
        hash: B256,
        /// Transaction that included it.
        transaction_hash: B256,
        /// Whether execution succeeded.
        success: bool,
    },
    /// The attempt stopped.
    Failed {
        /// Stage that was running.
        stage: PipelineStage,
        /// Rendered error.
        error: String,
    },
}

impl PipelineEvent {
    /// The stage this event reports on.
    pub const fn stage(&self) -> PipelineStage {
        match self {
            Self::Building { .. } => PipelineStage::Building,
            Self::Sponsoring { .. } => PipelineStage::Sponsoring,
            Self::Estimating { .. } => PipelineStage::Estimating,
            Self::Signing { .. } => PipelineStage::Signing,
            Self::Simulating { .. } => PipelineStage::Simulating,
            Self::Submitting { .. } => PipelineStage::Submitting,
            Self::Done { .. } => PipelineStage::Done,
            Self::Failed { .. } => PipelineStage::Failed,
        }
    }

    /// Whether no further events follow.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_tagged_union() {
        let event = PipelineEvent::Signing { user_op_hash: B256::repeat_byte(0xab) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "signing");
        assert_eq!(json["data"]["userOpHash"], format!("0x{}", "ab".repeat(32)));

        let failed = PipelineEvent::Failed {
            stage: PipelineStage::Sponsoring,
            error: "paymaster not configured".to_string(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["stage"], "failed");
        assert_eq!(json["data"]["stage"], "sponsoring");
        assert_eq!(serde_json::from_value::<PipelineEvent>(json).unwrap(), failed);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(PipelineStage::Building < PipelineStage::Sponsoring);
        assert!(PipelineStage::Simulating < PipelineStage::Submitting);
        assert!(PipelineEvent::Done {
            hash: B256::ZERO,
            transaction_hash: B256::ZERO,
            success: true
        }
        .is_terminal());
        assert_eq!(
            PipelineEvent::Submitting { hash: B256::ZERO }.stage(),
            PipelineStage::Submitting
        );
    }
}
