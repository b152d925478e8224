//! The linear operation pipeline and the progress events it emits.

use std::{sync::Arc, time::Duration};

use alloy_eips::eip7702::SignedAuthorization;
use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types::TransactionReceipt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use userop_core::{
    Call, CallEncoding, DraftBuilder, EntryPointVersion, GasDefaults, GasScaling, PaymasterContext,
    PipelineEvent, PipelineStage, RiskBand, ScalingReport, SimulationResult, SponsorshipPhase,
    UserOperationDraft,
};
use userop_rpc_client::{
    CallContext, ClientRegistry, DEFAULT_CALL_TIMEOUT, ReceiptPolling, UserOperationReceipt,
};
use userop_signer::{SignatureEngine, SigningTarget};
use userop_simulator::{PreflightSimulator, SimulatorConfig};

use crate::{
    error::{PipelineError, Result},
    estimator::GasEstimator,
    metrics::StageTimer,
    nonce::resolve_nonce,
    submission::{DelegatedSubmitter, DelegationRequest, SubmissionClient},
};

/// Chain and behaviour settings shared by every operation a [`Pipeline`] runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chain the operations run on.
    pub chain_id: u64,
    /// `EntryPoint` version, which selects the hashing scheme.
    pub version: EntryPointVersion,
    /// `EntryPoint` address.
    pub entry_point: Address,
    /// Placeholder gas written into new drafts.
    pub gas_defaults: GasDefaults,
    /// Percentages applied to the bundler estimate.
    pub gas_scaling: GasScaling,
    /// Dry-run the signed operation before handing it to the bundler.
    pub simulate: bool,
    /// Settings of the pre-flight simulation.
    pub simulator: SimulatorConfig,
    /// Beneficiary for simulated `handleOps`; the signer's address when unset.
    pub beneficiary: Option<Address>,
    /// Per network call.
    pub call_timeout: Duration,
    /// How long and how often to wait for the receipt.
    pub receipt_polling: ReceiptPolling,
}

impl PipelineConfig {
    /// Defaults for `chain_id` on the v0.8 `EntryPoint`.
    pub fn new(chain_id: u64) -> Self {
        Self::for_version(chain_id, EntryPointVersion::V08)
    }

    /// Defaults for `chain_id` on the canonical `EntryPoint` of `version`.
    pub fn for_version(chain_id: u64, version: EntryPointVersion) -> Self {
        Self {
            chain_id,
            version,
            entry_point: version.address(),
            gas_defaults: GasDefaults::default(),
            gas_scaling: GasScaling::default(),
            simulate: false,
            simulator: SimulatorConfig::default(),
            beneficiary: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            receipt_polling: ReceiptPolling::default(),
        }
    }

    /// The signing target derived from chain, version and `EntryPoint`.
    pub const fn target(&self) -> SigningTarget {
        SigningTarget::new(self.entry_point, self.version, self.chain_id)
    }
}

/// Counterfactual deployment of the sender through `factory.createAccount(owner, salt)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryDeployment {
    /// Factory contract.
    pub factory: Address,
    /// Owner of the new account.
    pub owner: Address,
    /// CREATE2 salt.
    pub salt: U256,
}

/// Paymaster sponsorship: the bearer token and the context sent on both ERC-7677 calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sponsorship {
    /// Bearer token for the paymaster service.
    pub token: String,
    /// Context sent on both calls.
    pub context: PaymasterContext,
}

/// One operation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    /// Smart account sending the operation.
    pub sender: Address,
    /// Calls to execute, at least one.
    pub calls: Vec<Call>,
    /// How a single call is encoded.
    pub encoding: CallEncoding,
    /// Deploys the sender when it has no code yet.
    pub factory: Option<FactoryDeployment>,
    /// Paymaster sponsorship, when requested.
    pub sponsorship: Option<Sponsorship>,
    /// EIP-7702 authorization attached unmodified as `eip7702Auth`.
    pub authorization: Option<SignedAuthorization>,
}

impl OperationRequest {
    /// An unsponsored request using `execute` encoding.
    pub const fn new(sender: Address, calls: Vec<Call>) -> Self {
        Self {
            sender,
            calls,
            encoding: CallEncoding::Execute,
            factory: None,
            sponsorship: None,
            authorization: None,
        }
    }

    /// Overrides the call encoding.
    pub const fn encoding(mut self, encoding: CallEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Deploys the sender through a factory.
    pub const fn with_factory(mut self, factory: FactoryDeployment) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sponsors the operation through the paymaster registered for the chain.
    pub fn sponsored(mut self, token: impl Into<String>, context: PaymasterContext) -> Self {
        self.sponsorship = Some(Sponsorship { token: token.into(), context });
        self
    }

    /// Attaches a signed EIP-7702 authorization.
    pub fn with_authorization(mut self, authorization: SignedAuthorization) -> Self {
        self.authorization = Some(authorization);
        self
    }
}

/// What a completed user operation attempt produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The signed operation as submitted.
    pub draft: UserOperationDraft,
    /// Hash the bundler returned.
    pub user_op_hash: B256,
    /// Risk bands of the gas scaling.
    pub report: ScalingReport,
    /// Pre-flight outcome, when simulation ran.
    pub simulation: Option<SimulationResult>,
    /// Bundler receipt.
    pub receipt: UserOperationReceipt,
}

/// What a completed delegated transaction produced.
#[derive(Debug, Clone)]
pub struct DelegatedOutcome {
    /// Hash of the type-4 transaction.
    pub transaction_hash: B256,
    /// Authorization carried by the transaction.
    pub authorization: SignedAuthorization,
    /// Node receipt.
    pub receipt: TransactionReceipt,
}

/// Forwards events to the subscriber and tracks the current stage.
struct Progress<'a> {
    events: &'a mpsc::Sender<PipelineEvent>,
    stage: PipelineStage,
    timer: Option<StageTimer>,
}

impl<'a> Progress<'a> {
    const fn new(events: &'a mpsc::Sender<PipelineEvent>) -> Self {
        Self { events, stage: PipelineStage::Building, timer: None }
    }

    fn enter(&mut self, stage: PipelineStage) {
        if let Some(timer) = self.timer.take() {
            timer.finish(true);
        }
        debug!(stage = %stage, "entering pipeline stage");
        self.stage = stage;
        self.timer = Some(StageTimer::start(stage));
    }

    async fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).await.is_err() {
            debug!(stage = %self.stage, "progress receiver dropped");
        }
    }

    async fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if let Some(timer) = self.timer.take() {
                timer.finish(false);
            }
            warn!(stage = %self.stage, error = %err, "operation failed");
            self.emit(PipelineEvent::Failed { stage: self.stage, error: err.to_string() }).await;
        } else if let Some(timer) = self.timer.take() {
            timer.finish(true);
        }
        result
    }
}

fn ensure_active(ctx: &CallContext) -> Result<()> {
    if ctx.is_cancelled() { Err(PipelineError::Cancelled) } else { Ok(()) }
}

/// Drives operations through build, sponsor, estimate, sign, simulate and submit.
///
/// Stages of one operation run strictly in order. Independent operations may run
/// concurrently on the same `Pipeline`; they share only the registry's clients.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<ClientRegistry>,
    signer: SignatureEngine,
    config: PipelineConfig,
}

impl Pipeline {
    /// A pipeline drawing clients from `registry` and signing with `signer`.
    pub const fn new(
        registry: Arc<ClientRegistry>,
        signer: SignatureEngine,
        config: PipelineConfig,
    ) -> Self {
        Self { registry, signer, config }
    }

    /// Settings shared by every run.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The signature engine.
    pub const fn signer(&self) -> &SignatureEngine {
        &self.signer
    }

    /// Runs one user operation attempt, reporting each completed stage on `events`.
    ///
    /// Ends with either [`PipelineEvent::Done`] or [`PipelineEvent::Failed`]. Cancelling
    /// `cancel` abandons the attempt at the next suspension point and discards any
    /// response still in flight.
    pub async fn run(
        &self,
        request: OperationRequest,
        events: &mpsc::Sender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome> {
        let ctx = CallContext::new(cancel, self.config.call_timeout);
        let mut progress = Progress::new(events);
        let result = self.drive(&ctx, request, &mut progress).await;
        progress.finish(result).await
    }

    async fn drive(
        &self,
        ctx: &CallContext,
        request: OperationRequest,
        progress: &mut Progress<'_>,
    ) -> Result<PipelineOutcome> {
        let chain_id = self.config.chain_id;
        let entry_point = self.config.entry_point;

        progress.enter(PipelineStage::Building);
        let mut builder = DraftBuilder::for_sender(request.sender)
            .calls(request.calls)
            .encoding(request.encoding)
            .gas_defaults(self.config.gas_defaults);
        if let Some(deployment) = request.factory {
            builder = builder.with_factory(deployment.factory, deployment.owner, deployment.salt);
        }
        let mut draft = builder.build()?;
        let building = |e| PipelineError::rpc(PipelineStage::Building, e);
        let bundler = self.registry.bundler(chain_id).map_err(building)?;
        let public = self.registry.public(chain_id).map_err(building)?;
        let paymaster = match &request.sponsorship {
            Some(sponsorship) => Some(
                self.registry
                    .paymaster(chain_id, &sponsorship.token)
                    .map_err(|e| PipelineError::rpc(PipelineStage::Sponsoring, e))?,
            ),
            None => None,
        };
        draft.nonce = resolve_nonce(ctx, &public, entry_point, &draft).await.map_err(building)?;
        draft.eip7702_auth = request.authorization;
        progress
            .emit(PipelineEvent::Building {
                sender: draft.sender,
                nonce: draft.nonce,
                deploys: draft.factory.is_some(),
            })
            .await;

        let sponsoring = |e| PipelineError::rpc(PipelineStage::Sponsoring, e);
        let mut stub_is_final = false;
        if let (Some(client), Some(sponsorship)) = (&paymaster, &request.sponsorship) {
            ensure_active(ctx)?;
            progress.enter(PipelineStage::Sponsoring);
            let stub = client
                .get_stub_data(ctx, &draft, entry_point, chain_id, &sponsorship.context)
                .await
                .map_err(sponsoring)?;
            stub.fields.apply_to(&mut draft);
            stub_is_final = stub.is_final;
            progress
                .emit(PipelineEvent::Sponsoring {
                    phase: SponsorshipPhase::Stub,
                    paymaster: stub.fields.paymaster,
                })
                .await;
        }

        ensure_active(ctx)?;
        progress.enter(PipelineStage::Estimating);
        let (estimate, report) = GasEstimator::new(Arc::clone(&bundler))
            .estimate_scaled(ctx, &draft, entry_point, &self.config.gas_scaling)
            .await
            .map_err(|e| PipelineError::rpc(PipelineStage::Estimating, e))?;
        estimate.apply_to(&mut draft)?;
        if report.overall() == RiskBand::HighRisk {
            warn!(sender = %draft.sender, band = %report.overall(), "gas scaled below 80% of the estimate");
        }
        progress.emit(PipelineEvent::Estimating { estimate, report }).await;

        if let (Some(client), Some(sponsorship)) = (&paymaster, &request.sponsorship) {
            ensure_active(ctx)?;
            progress.enter(PipelineStage::Sponsoring);
            if !stub_is_final {
                let data = client
                    .get_final_data(ctx, &draft, entry_point, chain_id, &sponsorship.context)
                    .await
                    .map_err(sponsoring)?;
                data.fields.apply_to(&mut draft);
            }
            progress
                .emit(PipelineEvent::Sponsoring {
                    phase: SponsorshipPhase::Final,
                    paymaster: draft.paymaster.unwrap_or_default(),
                })
                .await;
        }

        ensure_active(ctx)?;
        progress.enter(PipelineStage::Signing);
        let user_op_hash = self.signer.sign_in_place(&mut draft, &self.config.target()).await?;
        progress.emit(PipelineEvent::Signing { user_op_hash }).await;

        let simulation = if self.config.simulate {
            ensure_active(ctx)?;
            progress.enter(PipelineStage::Simulating);
            let engine = self
                .registry
                .simulation(chain_id)
                .map_err(|e| PipelineError::rpc(PipelineStage::Simulating, e))?;
            let beneficiary = self.config.beneficiary.unwrap_or_else(|| self.signer.address());
            let result = PreflightSimulator::new(engine, self.config.simulator.clone())
                .simulate(ctx, &draft, entry_point, beneficiary, None)
                .await
                .map_err(PipelineError::simulator)?;
            progress.emit(PipelineEvent::Simulating { result: result.clone() }).await;
            if !result.success {
                return Err(PipelineError::SimulationRejected(Box::new(result)));
            }
            Some(result)
        } else {
            None
        };

        ensure_active(ctx)?;
        progress.enter(PipelineStage::Submitting);
        let submission = SubmissionClient::new(bundler);
        let hash = submission.submit(ctx, &draft, entry_point).await?;
        progress.emit(PipelineEvent::Submitting { hash }).await;

        let receipt = submission.wait_for_receipt(ctx, hash, self.config.receipt_polling).await?;
        progress.enter(PipelineStage::Done);
        progress
            .emit(PipelineEvent::Done {
                hash,
                transaction_hash: receipt.receipt.transaction_hash,
                success: receipt.success,
            })
            .await;
        info!(
            sender = %draft.sender,
            user_op_hash = %hash,
            transaction_hash = %receipt.receipt.transaction_hash,
            success = receipt.success,
            "user operation completed"
        );

        Ok(PipelineOutcome { draft, user_op_hash: hash, report, simulation, receipt })
    }

    /// Sends a self-delegating EIP-7702 transaction from the signer's account and waits for
    /// it to be mined. No bundler or paymaster is involved.
    pub async fn run_delegated(
        &self,
        request: DelegationRequest,
        events: &mpsc::Sender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> Result<DelegatedOutcome> {
        let ctx = CallContext::new(cancel, self.config.call_timeout);
        let mut progress = Progress::new(events);
        let result = self.drive_delegated(&ctx, request, &mut progress).await;
        progress.finish(result).await
    }

    async fn drive_delegated(
        &self,
        ctx: &CallContext,
        mut request: DelegationRequest,
        progress: &mut Progress<'_>,
    ) -> Result<DelegatedOutcome> {
        let chain_id = self.config.chain_id;
        let building = |e| PipelineError::rpc(PipelineStage::Building, e);

        progress.enter(PipelineStage::Building);
        let public = self.registry.public(chain_id).map_err(building)?;
        let authority = self.signer.address();
        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => public.get_transaction_count(ctx, authority).await.map_err(building)?,
        };
        request.nonce = Some(nonce);
        progress
            .emit(PipelineEvent::Building {
                sender: authority,
                nonce: U256::from(nonce),
                deploys: false,
            })
            .await;

        ensure_active(ctx)?;
        progress.enter(PipelineStage::Submitting);
        let submission = DelegatedSubmitter::new(public);
        let sent = submission.submit(ctx, &self.signer, chain_id, &request).await?;
        progress.emit(PipelineEvent::Submitting { hash: sent.transaction_hash }).await;

        let receipt = submission
            .wait_for_receipt(ctx, sent.transaction_hash, self.config.receipt_polling)
            .await?;
        progress.enter(PipelineStage::Done);
        progress
            .emit(PipelineEvent::Done {
                hash: sent.transaction_hash,
                transaction_hash: sent.transaction_hash,
                success: receipt.status(),
            })
            .await;

        Ok(DelegatedOutcome {
            transaction_hash: sent.transaction_hash,
            authorization: sent.authorization,
            receipt,
        })
    }
}
