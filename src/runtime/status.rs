use crate::runtime::{Backend, CliArgs};
use crate::utils::config::{GasPolicy, LabConfig};
use alloy::primitives::utils::format_ether;

pub fn describe_gas_policy(policy: GasPolicy) -> String {
    match policy {
        GasPolicy::FixedCeiling(cap) => format!("fixed:{cap}"),
        GasPolicy::EstimateWithMargin {
            margin_bps,
            ceiling,
        } => format!("estimate+{margin_bps}bps<= {ceiling}"),
    }
}

pub fn emit_startup_status(cli: &CliArgs, config: &LabConfig) {
    let endpoint = match cli.backend {
        Backend::Sim => "in-process".to_string(),
        Backend::Rpc => config.rpc_url.clone(),
    };
    tracing::info!(
        "[OPS] Lab resolved: command={} backend={} endpoint={} artifacts={}",
        cli.command.as_str(),
        cli.backend.as_str(),
        endpoint,
        config.artifacts_dir.display()
    );
    tracing::info!(
        "[OPS] Tx policy: gas={} tx_timeout={}ms receipt_poll={}ms read_retries={} min_identity_balance={} ETH session_wait={}ms",
        describe_gas_policy(config.gas_policy),
        config.tx_timeout.as_millis(),
        config.receipt_poll.as_millis(),
        config.rpc_read_retries,
        format_ether(config.min_identity_balance_wei),
        config.session_wait.as_millis()
    );
    if cli.backend == Backend::Sim && cli.artifacts_dir.is_some() {
        tracing::warn!("[OPS] --artifacts is ignored by the simulated chain.");
    }
}
