use std::sync::Arc;

use anyhow::Context;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::info;
use userop_core::{CallEncoding, PaymasterContext, PipelineEvent, selector_of};
use userop_pipeline::{DelegationRequest, FactoryDeployment, OperationRequest, Pipeline};
use userop_rpc_client::CancellationToken;

use crate::config::{DelegateArgs, GlobalArgs, SendArgs};

/// Prints every progress event as one JSON line.
fn print_events() -> (mpsc::Sender<PipelineEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(16);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
            }
        }
    });
    (tx, printer)
}

/// Cancels the token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, abandoning operation");
            token.cancel();
        }
    });
    cancel
}

pub(crate) async fn run(global: &GlobalArgs, args: SendArgs) -> anyhow::Result<()> {
    let signer = global.signer()?;
    let registry = Arc::new(global.registry()?);

    let mut config = global.pipeline_config();
    config.gas_scaling = args.gas_scaling();
    config.simulate = args.simulate;
    config.simulator = args.simulator_config();
    config.beneficiary = args.beneficiary;

    let encoding = if args.direct { CallEncoding::Direct } else { CallEncoding::Execute };
    let sponsor_target = args.calls.first().map(|call| call.target);
    let mut request = OperationRequest::new(args.sender, args.calls.clone()).encoding(encoding);

    if let (Some(factory), Some(owner)) = (args.factory, args.owner) {
        request = request.with_factory(FactoryDeployment { factory, owner, salt: args.salt });
    }
    if let Some(selector) = args.sponsor_selector.as_deref() {
        let target = sponsor_target.context("sponsorship needs at least one call")?;
        let mut context = PaymasterContext::new(target, selector_of(selector)?);
        if let Some((after, until)) = args.sponsor_window()? {
            context = context.with_validity(after, until);
        }
        request = request.sponsored(global.paymaster_token()?, context);
    }
    if let Some(delegate) = args.delegate {
        let nonce = args
            .authorization_nonce
            .context("--authorization-nonce is required with --delegate")?;
        let authorization = signer.sign_authorization(delegate, global.chain_id, nonce).await?;
        request = request.with_authorization(authorization);
    }

    let pipeline = Pipeline::new(registry, signer, config);
    let (events, printer) = print_events();
    let outcome = pipeline.run(request, &events, cancel_on_interrupt()).await;
    drop(events);
    printer.await?;

    let outcome = outcome?;
    info!(
        user_op_hash = %outcome.user_op_hash,
        transaction_hash = %outcome.receipt.receipt.transaction_hash,
        success = outcome.receipt.success,
        risk = %outcome.report.overall(),
        "done"
    );
    Ok(())
}

pub(crate) async fn run_delegated(global: &GlobalArgs, args: DelegateArgs) -> anyhow::Result<()> {
    let pipeline =
        Pipeline::new(Arc::new(global.registry()?), global.signer()?, global.pipeline_config());

    let mut request = DelegationRequest::new(args.delegate, args.calls);
    request.gas_limit = args.gas_limit;

    let (events, printer) = print_events();
    let outcome = pipeline.run_delegated(request, &events, cancel_on_interrupt()).await;
    drop(events);
    printer.await?;

    let outcome = outcome?;
    info!(
        transaction_hash = %outcome.transaction_hash,
        authority = %pipeline.signer().address(),
        delegate = %outcome.authorization.address,
        success = outcome.receipt.status(),
        "delegation done"
    );
    Ok(())
}
