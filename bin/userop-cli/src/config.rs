use std::{path::PathBuf, sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use reqwest::Url;
use userop_core::{AuthorizationTupleOrder, Call, EntryPointVersion, GasScaling, logger::LogFormat};
use userop_pipeline::PipelineConfig;
use userop_rpc_client::{ChainEndpoints, ClientRegistry, ReceiptPolling, RegistryConfig};
use userop_signer::{LocalKeySigner, SignatureEngine, SignatureStrategy};
use userop_simulator::{Scenario, SimulationMode, SimulatorConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, sponsor, estimate, sign, optionally simulate and submit a user operation
    Send(SendArgs),
    /// Send a self-delegating EIP-7702 transaction from the signer's account
    Delegate(DelegateArgs),
    /// Parse a comma separated list of selectors or function signatures
    Selectors(SelectorsArgs),
    /// Sign an EIP-7702 authorization and print it in both tuple orders
    Authorize(AuthorizeArgs),
    /// Print the userOpHash of a JSON user operation
    Hash(HashArgs),
    /// Run the AA error scenario suite against the simulation endpoint
    Scenarios(ScenariosArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Chain the operation targets
    #[arg(long, global = true, env = "USEROP_CHAIN_ID", default_value = "84532")]
    pub chain_id: u64,

    /// EntryPoint version (v0.7 or v0.8)
    #[arg(long, global = true, env = "USEROP_ENTRY_POINT_VERSION", default_value = "v0.8")]
    pub entry_point_version: EntryPointVersion,

    /// EntryPoint address; the canonical deployment of the version when unset
    #[arg(long, global = true, env = "USEROP_ENTRY_POINT")]
    pub entry_point: Option<Address>,

    /// ERC-4337 bundler RPC, needed by `send`
    #[arg(long, global = true, env = "USEROP_BUNDLER_URL")]
    pub bundler_url: Option<Url>,

    /// Node RPC used for nonces, code and raw transactions
    #[arg(long, global = true, env = "USEROP_RPC_URL")]
    pub rpc_url: Option<Url>,

    /// ERC-7677 paymaster service
    #[arg(long, global = true, env = "USEROP_PAYMASTER_URL")]
    pub paymaster_url: Option<Url>,

    /// Bearer token for the paymaster service
    #[arg(long, global = true, env = "USEROP_PAYMASTER_TOKEN", hide_env_values = true)]
    pub paymaster_token: Option<String>,

    /// Simulation RPC
    #[arg(long, global = true, env = "USEROP_SIMULATION_URL")]
    pub simulation_url: Option<Url>,

    /// Simulation method name
    #[arg(long, global = true, env = "USEROP_SIMULATION_METHOD")]
    pub simulation_method: Option<String>,

    /// Hex private key of the local signer
    #[arg(long, global = true, env = "USEROP_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// How user operations are signed (raw-hash or typed-data)
    #[arg(long, global = true, env = "USEROP_SIGNATURE_STRATEGY", default_value = "typed-data")]
    pub signature_strategy: SignatureStrategy,

    /// Timeout of each network call, in milliseconds
    #[arg(long, global = true, env = "USEROP_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// How long to wait for inclusion, in seconds
    #[arg(long, global = true, env = "USEROP_RECEIPT_TIMEOUT_SECS", default_value = "60")]
    pub receipt_timeout_secs: u64,

    /// Receipt poll interval, in milliseconds
    #[arg(long, global = true, env = "USEROP_POLL_INTERVAL_MS", default_value = "2000")]
    pub poll_interval_ms: u64,

    #[arg(long, global = true, env = "USEROP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// pretty or json
    #[arg(long, global = true, env = "USEROP_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

impl GlobalArgs {
    pub fn entry_point(&self) -> Address {
        self.entry_point.unwrap_or_else(|| self.entry_point_version.address())
    }

    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn receipt_polling(&self) -> ReceiptPolling {
        ReceiptPolling::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_secs(self.receipt_timeout_secs),
        )
    }

    pub fn signer(&self) -> anyhow::Result<SignatureEngine> {
        let key = self
            .private_key
            .as_deref()
            .context("a signer is required: set --private-key or USEROP_PRIVATE_KEY")?;
        let signer = LocalKeySigner::from_private_key(key)?;
        Ok(SignatureEngine::new(Arc::new(signer), self.signature_strategy))
    }

    pub fn paymaster_token(&self) -> anyhow::Result<&str> {
        self.paymaster_token
            .as_deref()
            .context("sponsorship needs --paymaster-token or USEROP_PAYMASTER_TOKEN")
    }

    /// Registry with this chain's endpoints. The node URL is required; user operations also
    /// need a bundler URL.
    pub fn registry(&self) -> anyhow::Result<ClientRegistry> {
        let rpc_url = self.rpc_url.clone().context("--rpc-url is required")?;
        let endpoints = ChainEndpoints {
            bundler_url: self.bundler_url.clone(),
            rpc_url,
            paymaster_url: self.paymaster_url.clone(),
            simulation_url: self.simulation_url.clone(),
            simulation_method: self.simulation_method.clone(),
        };
        let http = reqwest::Client::builder().timeout(self.call_timeout()).build()?;
        Ok(ClientRegistry::with_http(
            RegistryConfig::default().with_chain(self.chain_id, endpoints),
            http,
        ))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::for_version(self.chain_id, self.entry_point_version);
        config.entry_point = self.entry_point();
        config.call_timeout = self.call_timeout();
        config.receipt_polling = self.receipt_polling();
        config
    }
}

/// `TARGET[:VALUE[:DATA]]`, value in wei (decimal or hex), data as hex.
pub fn parse_call(input: &str) -> Result<Call, String> {
    let mut parts = input.splitn(3, ':');
    let target = parts.next().unwrap_or_default();
    let value = parts.next().unwrap_or_default();
    let data = parts.next().unwrap_or_default();
    Call::parse(target, value, data).map_err(|e| e.to_string())
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Smart account sending the operation
    #[arg(long)]
    pub sender: Address,

    /// Call to make, as TARGET[:VALUE[:DATA]]; repeat for a batch
    #[arg(long = "call", required = true, value_parser = parse_call)]
    pub calls: Vec<Call>,

    /// Use the call data as the operation's calldata instead of wrapping it in execute
    #[arg(long)]
    pub direct: bool,

    /// Factory deploying the sender on first use
    #[arg(long, requires = "owner")]
    pub factory: Option<Address>,

    /// Owner passed to createAccount
    #[arg(long)]
    pub owner: Option<Address>,

    /// Salt passed to createAccount
    #[arg(long, default_value = "0")]
    pub salt: U256,

    /// Request paymaster sponsorship for this function (signature or 0x selector)
    #[arg(long)]
    pub sponsor_selector: Option<String>,

    /// Sponsorship validity window, unix seconds, as AFTER:UNTIL
    #[arg(long, requires = "sponsor_selector")]
    pub sponsor_window: Option<String>,

    /// Percentage applied to every bundler gas estimate
    #[arg(long, default_value = "100")]
    pub gas_percent: u32,

    /// Percentage applied to the call gas estimate only
    #[arg(long)]
    pub call_gas_percent: Option<u32>,

    /// Percentage applied to the verification gas estimate only
    #[arg(long)]
    pub verification_gas_percent: Option<u32>,

    /// Percentage applied to the pre-verification gas estimate only
    #[arg(long)]
    pub pre_verification_gas_percent: Option<u32>,

    /// Dry-run the signed operation before submitting it
    #[arg(long)]
    pub simulate: bool,

    /// handle-ops or simulate-validation
    #[arg(long, default_value = "handle-ops")]
    pub simulation_mode: SimulationMode,

    /// Beneficiary of the simulated handleOps; the signer when unset
    #[arg(long)]
    pub beneficiary: Option<Address>,

    /// Attach an EIP-7702 authorization delegating the sender to this contract
    #[arg(long)]
    pub delegate: Option<Address>,

    /// Account nonce signed into the authorization
    #[arg(long, requires = "delegate")]
    pub authorization_nonce: Option<u64>,
}

impl SendArgs {
    pub fn gas_scaling(&self) -> GasScaling {
        GasScaling {
            call_gas_percent: self.call_gas_percent.unwrap_or(self.gas_percent),
            verification_gas_percent: self.verification_gas_percent.unwrap_or(self.gas_percent),
            pre_verification_gas_percent: self
                .pre_verification_gas_percent
                .unwrap_or(self.gas_percent),
        }
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig { mode: self.simulation_mode, ..Default::default() }
    }

    pub fn sponsor_window(&self) -> anyhow::Result<Option<(u64, u64)>> {
        let Some(window) = self.sponsor_window.as_deref() else {
            return Ok(None);
        };
        let (after, until) =
            window.split_once(':').context("--sponsor-window must be AFTER:UNTIL")?;
        Ok(Some((after.trim().parse()?, until.trim().parse()?)))
    }
}

#[derive(Args, Debug)]
pub struct DelegateArgs {
    /// Contract the signer's account delegates to
    #[arg(long)]
    pub delegate: Address,

    /// Calls run through the delegated code, as TARGET[:VALUE[:DATA]]
    #[arg(long = "call", value_parser = parse_call)]
    pub calls: Vec<Call>,

    #[arg(long, default_value_t = userop_pipeline::DEFAULT_DELEGATED_GAS_LIMIT)]
    pub gas_limit: u64,
}

#[derive(Args, Debug)]
pub struct SelectorsArgs {
    /// e.g. "mint(),mintTo(address,uint256),0xa9059cbb"
    pub input: String,
}

#[derive(Args, Debug)]
pub struct AuthorizeArgs {
    /// Contract to delegate to
    #[arg(long)]
    pub delegate: Address,

    /// Current account nonce
    #[arg(long)]
    pub nonce: u64,

    /// Tuple order of the `tuple` field (parity-first or signature-first)
    #[arg(long, default_value = "parity-first")]
    pub order: AuthorizationTupleOrder,
}

#[derive(Args, Debug)]
pub struct HashArgs {
    /// JSON user operation in RPC form; stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ScenariosArgs {
    /// Valid JSON user operation of a deployed sender to corrupt
    #[arg(long)]
    pub draft: PathBuf,

    /// Factory used by the AA10 preset
    #[arg(long)]
    pub factory: Option<Address>,

    /// Beneficiary of the simulated handleOps; the signer when unset
    #[arg(long)]
    pub beneficiary: Option<Address>,

    /// Block time forced on every simulation
    #[arg(long)]
    pub at_time: Option<u64>,

    /// Presets to run, e.g. AA23,AA25; all when omitted
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<Scenario>,
}
