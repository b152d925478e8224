//! The user operation pipeline: nonce resolution, gas estimation, submission and the
//! staged driver that ties them to the paymaster, signer and simulator.
//!
//! [`Pipeline::run`] takes one [`OperationRequest`] through build, sponsor-stub, estimate,
//! sponsor-final, sign, optional simulation, submission and receipt polling, emitting a
//! [`userop_core::PipelineEvent`] after each stage.

pub mod error;
pub mod estimator;
mod metrics;
pub mod nonce;
pub mod pipeline;
pub mod submission;

pub use error::{PipelineError, Result};
pub use estimator::{DUMMY_SIGNATURE, GasEstimator};
pub use nonce::resolve_nonce;
pub use pipeline::{
    DelegatedOutcome, FactoryDeployment, OperationRequest, Pipeline, PipelineConfig,
    PipelineOutcome, Sponsorship,
};
pub use submission::{
    DEFAULT_DELEGATED_GAS_LIMIT, DelegatedSubmission, DelegatedSubmitter, DelegationRequest,
    SubmissionClient,
};
