//! Remote collaborators of the user operation pipeline: the ERC-4337 bundler, the ERC-7677
//! paymaster service, a vendor simulation endpoint and the chain's public RPC.
//!
//! Every call takes a [`CallContext`] carrying the operation's cancellation token and the
//! per-call deadline.

mod bundler;
mod context;
mod error;
mod paymaster;
mod public;
mod receipt;
mod registry;
mod simulation;
mod transport;

pub use bundler::BundlerClient;
pub use context::{CallContext, DEFAULT_CALL_TIMEOUT};
pub use error::RpcError;
pub use paymaster::PaymasterClient;
pub use public::PublicClient;
pub use receipt::{IncludedTransaction, ReceiptPolling, UserOperationReceipt};
pub use registry::{ChainEndpoints, ClientRegistry, RegistryConfig};
pub use simulation::{DEFAULT_SIMULATION_METHOD, SimulationRequest, SimulationRpcClient};
pub use transport::JsonRpcTransport;

pub use tokio_util::sync::CancellationToken;
