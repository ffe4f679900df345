use crate::scenario::ScenarioId;
use crate::utils::config::{validate_http_url, LabConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Run { scenario: ScenarioId },
    RunAll,
    DeployAll,
    Help,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Run { .. } => "run",
            Self::RunAll => "run-all",
            Self::DeployAll => "deploy-all",
            Self::Help => "help",
        }
    }

    /// Whether this command talks to a chain at all.
    pub fn needs_node(&self) -> bool {
        matches!(self, Self::Run { .. } | Self::RunAll | Self::DeployAll)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process simulated dev chain.
    Sim,
    /// External dev node over JSON-RPC.
    Rpc,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Rpc => "rpc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: Command,
    pub backend: Backend,
    pub rpc_url: Option<String>,
    pub artifacts_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Command-line overrides win over environment-derived config.
    pub fn apply(&self, config: &mut LabConfig) {
        if let Some(url) = &self.rpc_url {
            config.rpc_url = url.clone();
        }
        if let Some(dir) = &self.artifacts_dir {
            config.artifacts_dir = dir.clone();
        }
    }
}

fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn backend_default_from_env() -> Backend {
    match std::env::var("LAB_USE_SIM").ok().and_then(|raw| parse_bool_flag(&raw)) {
        Some(true) => Backend::Sim,
        _ => Backend::Rpc,
    }
}

pub fn print_usage() {
    eprintln!(
        "Usage: exploit_lab <command> [options]\n\n\
         Commands:\n  \
           list                 Show the scenario catalog\n  \
           run <scenario>       Run one scenario and verify its invariant\n  \
           run-all              Run every catalog scenario in order\n  \
           deploy-all           Deploy the reference contract set and print addresses\n\n\
         Options:\n  \
           --sim                Use the in-process simulated chain\n  \
           --rpc-url, -r <URL>  Dev node endpoint (default: LAB_RPC_URL)\n  \
           --artifacts, -a <DIR> Compiled contract artifacts (default: LAB_ARTIFACTS_DIR)\n  \
           --help, -h           Show this message"
    );
}

pub fn parse_cli_args_from_iter<I, S>(args: I) -> anyhow::Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut command: Option<Command> = None;
    let mut help = false;
    let mut sim = false;
    let mut rpc_url: Option<String> = None;
    let mut artifacts_dir: Option<PathBuf> = None;

    let mut iter = args.into_iter().map(|arg| arg.as_ref().to_string());
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => help = true,
            "--sim" => sim = true,
            "--rpc-url" | "-r" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("missing value for {arg}"))?;
                validate_http_url("--rpc-url", &value)?;
                rpc_url = Some(value);
            }
            "--artifacts" | "-a" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("missing value for {arg}"))?;
                artifacts_dir = Some(PathBuf::from(value));
            }
            other if other.starts_with('-') => {
                return Err(anyhow::anyhow!("unknown argument '{other}'"));
            }
            word => {
                if command.is_some() {
                    return Err(anyhow::anyhow!("unexpected argument '{word}'"));
                }
                command = Some(match word {
                    "list" => Command::List,
                    "run-all" => Command::RunAll,
                    "deploy-all" => Command::DeployAll,
                    "run" => {
                        let raw = iter
                            .next()
                            .ok_or_else(|| anyhow::anyhow!("`run` needs a scenario name"))?;
                        let scenario = raw.parse::<ScenarioId>().map_err(anyhow::Error::msg)?;
                        Command::Run { scenario }
                    }
                    other => return Err(anyhow::anyhow!("unknown command '{other}'")),
                });
            }
        }
    }

    if sim && rpc_url.is_some() {
        return Err(anyhow::anyhow!("--sim and --rpc-url are mutually exclusive"));
    }
    let backend = if sim {
        Backend::Sim
    } else if rpc_url.is_some() {
        Backend::Rpc
    } else {
        backend_default_from_env()
    };

    let command = if help {
        Command::Help
    } else {
        command.ok_or_else(|| anyhow::anyhow!("no command given"))?
    };
    Ok(CliArgs {
        command,
        backend,
        rpc_url,
        artifacts_dir,
    })
}

pub fn parse_cli_args() -> anyhow::Result<CliArgs> {
    parse_cli_args_from_iter(std::env::args().skip(1))
}
