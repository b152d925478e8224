use std::sync::Arc;

use anyhow::bail;
use tracing::{info, warn};
use userop_rpc_client::CallContext;
use userop_signer::SigningTarget;
use userop_simulator::{
    PreflightSimulator, Scenario, ScenarioBase, ScenarioSuite, SimulatorConfig, SimulatorError,
};

use crate::{
    config::{GlobalArgs, ScenariosArgs},
    tools::read_draft,
};

pub(crate) async fn run(global: &GlobalArgs, args: ScenariosArgs) -> anyhow::Result<()> {
    let signer = global.signer()?;
    let registry = global.registry()?;
    let engine = registry.simulation(global.chain_id)?;

    let base = ScenarioBase {
        draft: read_draft(Some(&args.draft))?,
        target: SigningTarget::new(global.entry_point(), global.entry_point_version, global.chain_id),
        beneficiary: args.beneficiary.unwrap_or_else(|| signer.address()),
        factory: args.factory,
        at_time: args.at_time,
    };
    let simulator = PreflightSimulator::new(engine, SimulatorConfig::default());
    let suite = ScenarioSuite::new(simulator, signer, base);

    let scenarios = if args.only.is_empty() { Scenario::ALL.to_vec() } else { args.only };
    let ctx = CallContext::default().with_timeout(global.call_timeout());
    let mut failed = 0usize;
    for (scenario, result) in suite.run_all(&ctx, &scenarios).await {
        match result {
            Ok(report) => {
                println!("{}", serde_json::to_string(&report)?);
                if report.passed() {
                    info!(%scenario, "scenario passed");
                } else {
                    failed += 1;
                    warn!(
                        %scenario,
                        broken = %report.broken.describe(),
                        fixed = %report.fixed.describe(),
                        "scenario failed"
                    );
                }
            }
            Err(e @ SimulatorError::ScenarioUnsupported { .. }) => {
                warn!(%scenario, reason = %e, "scenario skipped");
            }
            Err(e) => {
                failed += 1;
                warn!(%scenario, error = %e, "scenario could not run");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} scenarios failed", scenarios.len());
    }
    Ok(())
}
