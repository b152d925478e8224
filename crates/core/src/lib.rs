//! Building blocks for ERC-4337 user operations: selector and calldata encoding, gas field
//! packing, draft assembly, hashing, paymaster payloads and simulation outcomes.
//!
//! Nothing in this crate performs I/O; the RPC clients and the pipeline live in
//! `userop-rpc-client` and `userop-pipeline`.

pub mod abi;
pub mod authorization;
pub mod builder;
pub mod error;
pub mod events;
pub mod gas;
pub mod logger;
pub mod packing;
pub mod selector;
pub mod simulation;
pub mod sponsorship;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod user_operation;

pub use abi::{Call, KnownCall, PackedUserOperation};
pub use authorization::{AuthorizationTupleOrder, authorization_tuple, unsigned_authorization};
pub use builder::{CallEncoding, DraftBuilder, GasDefaults, new_draft};
pub use error::{CoreError, PackingError, SelectorError};
pub use events::{PipelineEvent, PipelineStage, SponsorshipPhase};
pub use gas::{GasEstimate, GasScaling, RiskBand, ScalingReport};
pub use selector::{SelectorEntry, parse_selector_list, selector_of};
pub use simulation::{AaCode, SimulationResult};
pub use sponsorship::{PaymasterContext, PaymasterData, PaymasterFields, PaymasterStubData};
pub use user_operation::{
    EntryPointVersion, SigningDomain, TypedUserOperation, UserOperationDraft, user_op_hash,
};
