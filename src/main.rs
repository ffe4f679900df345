//! Operator entry point: run catalog scenarios against a dev node and report the verdicts.

use exploit_lab::chain::rpc_node::RpcNode;
use exploit_lab::chain::sim::SimChain;
use exploit_lab::chain::ChainNode;
use exploit_lab::executor::NodeSession;
use exploit_lab::report::{
    exit_code, exit_code_for_error, render_catalog, render_deployments, render_outcome, EXIT_OK,
    EXIT_USAGE,
};
use exploit_lab::runtime::{
    emit_startup_status, parse_cli_args, print_usage, Backend, CliArgs, Command,
};
use exploit_lab::scenario::catalog::{deploy_reference_set, descriptor, plan};
use exploit_lab::scenario::{execute_scenario, AbortHandle, ScenarioId};
use exploit_lab::utils::config::LabConfig;
use exploit_lab::utils::env_guard::harden_env_setup;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn connect(cli: &CliArgs, config: &LabConfig) -> anyhow::Result<Arc<dyn ChainNode>> {
    let node: Arc<dyn ChainNode> = match cli.backend {
        Backend::Sim => Arc::new(SimChain::new()),
        Backend::Rpc => Arc::new(RpcNode::connect(config)?),
    };
    Ok(node)
}

fn spawn_abort_on_ctrl_c() -> AbortHandle {
    let abort = AbortHandle::new();
    let signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("[LAB] Ctrl-C received; stopping before the next step.");
            signal.abort();
        }
    });
    abort
}

async fn run_scenario(
    session: &NodeSession,
    config: &LabConfig,
    id: ScenarioId,
    abort: &AbortHandle,
) -> i32 {
    let scenario = plan(id);
    let invariant = descriptor(id).invariant;
    match execute_scenario(session, config, &scenario, &invariant, abort.clone()).await {
        Ok(outcome) => {
            print!("{}", render_outcome(&outcome, &invariant));
            exit_code(&outcome)
        }
        Err(err) => {
            eprintln!("[LAB] {id} failed: {err}");
            exit_code_for_error(&err)
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = parse_cli_args().inspect_err(|_| print_usage())?;
    if cli.command == Command::Help {
        print_usage();
        return Ok(EXIT_OK);
    }

    harden_env_setup(cli.command.needs_node() && cli.backend == Backend::Rpc);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = LabConfig::load()?;
    cli.apply(&mut config);
    emit_startup_status(&cli, &config);

    if cli.command == Command::List {
        print!("{}", render_catalog());
        return Ok(EXIT_OK);
    }

    let node = connect(&cli, &config)?;
    let session = NodeSession::acquire(node, config.session_wait).await?;
    let abort = spawn_abort_on_ctrl_c();

    let code = match cli.command {
        Command::Run { scenario } => run_scenario(&session, &config, scenario, &abort).await,
        Command::RunAll => {
            let mut worst = EXIT_OK;
            for id in ScenarioId::ALL {
                if abort.is_aborted() {
                    break;
                }
                worst = worst.max(run_scenario(&session, &config, id, &abort).await);
            }
            worst
        }
        Command::DeployAll => {
            let handles = deploy_reference_set(&session, &config).await?;
            print!("{}", render_deployments(&handles));
            EXIT_OK
        }
        Command::List | Command::Help => EXIT_OK,
    };
    tracing::info!(
        "[LAB] {} finished with exit code {code} after {}ms on {}",
        cli.command.as_str(),
        session.held_for().as_millis(),
        session.endpoint()
    );
    Ok(code)
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[LAB] {err:#}");
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}
