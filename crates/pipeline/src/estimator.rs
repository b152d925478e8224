//! Bundler gas estimation and scaling.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, hex};
use tracing::debug;
use userop_core::{GasEstimate, GasScaling, ScalingReport, UserOperationDraft};
use userop_rpc_client::{BundlerClient, CallContext, RpcError};

/// Placeholder ECDSA signature with the maximum `s` and a valid `v`, so signature recovery
/// in the account costs what a real signature costs.
pub const DUMMY_SIGNATURE: [u8; 65] = hex!(
    "fffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
);

/// Bundler gas estimation followed by caller-controlled scaling.
#[derive(Debug, Clone)]
pub struct GasEstimator {
    bundler: Arc<BundlerClient>,
}

impl GasEstimator {
    /// Estimator backed by `bundler`.
    pub const fn new(bundler: Arc<BundlerClient>) -> Self {
        Self { bundler }
    }

    /// Asks the bundler for an estimate. An unsigned draft is sent with
    /// [`DUMMY_SIGNATURE`]; paymaster fields present on the draft are included.
    pub async fn estimate(
        &self,
        ctx: &CallContext,
        draft: &UserOperationDraft,
        entry_point: Address,
    ) -> Result<GasEstimate, RpcError> {
        let estimate = if draft.signature.is_empty() {
            let mut probe = draft.clone();
            probe.signature = Bytes::from_static(&DUMMY_SIGNATURE);
            self.bundler.estimate_user_operation_gas(ctx, &probe, entry_point).await?
        } else {
            self.bundler.estimate_user_operation_gas(ctx, draft, entry_point).await?
        };
        debug!(
            sender = %draft.sender,
            call_gas_limit = %estimate.call_gas_limit,
            verification_gas_limit = %estimate.verification_gas_limit,
            pre_verification_gas = %estimate.pre_verification_gas,
            "bundler gas estimate"
        );
        Ok(estimate)
    }

    /// Estimates, scales and returns the scaled estimate with its risk report.
    pub async fn estimate_scaled(
        &self,
        ctx: &CallContext,
        draft: &UserOperationDraft,
        entry_point: Address,
        scaling: &GasScaling,
    ) -> Result<(GasEstimate, ScalingReport), RpcError> {
        let estimate = self.estimate(ctx, draft, entry_point).await?;
        Ok((scaling.apply(&estimate), scaling.report()))
    }
}
