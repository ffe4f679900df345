//! Scenario model and the provision → run → verify pipeline.

pub mod catalog;
pub mod invariants;
pub mod runner;

pub use catalog::{ScenarioDescriptor, ScenarioId};
pub use invariants::{Clause, Invariant, InvariantVerifier, Verdict};
pub use runner::{RunResult, ScenarioRunner};

use crate::contracts::abi::{
    IBadAccessControl, ILogic, ILottery, IProxy, IReentrancyAttacker, IVulnerableVault,
};
use crate::contracts::ContractKind;
use crate::error::{InvariantViolation, LabError, Result, StepCause, StepFailure};
use crate::executor::{AccountProvisioner, ContractHandle, Identity, NodeSession};
use crate::utils::config::LabConfig;
use alloy::primitives::{utils::format_ether, Address, Bytes, U256};
use alloy::sol_types::SolCall;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-scenario state machine. Only moves forward; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Created,
    Deploying,
    Funding,
    Attacking,
    Settling,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deploying => "deploying",
            Self::Funding => "funding",
            Self::Attacking => "attacking",
            Self::Settling => "settling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract entry points a scenario can invoke. Address arguments are scenario labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deposit,
    Withdraw,
    Attack,
    Collect,
    Enter,
    ClaimPrize { guess: U256 },
    SetOwner { owner: String },
    WithdrawAll,
    UpgradeTo { implementation: String },
    Sweep { to: String },
}

impl Call {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Deposit | Self::Enter => Phase::Funding,
            Self::Withdraw | Self::Collect => Phase::Settling,
            Self::Attack
            | Self::ClaimPrize { .. }
            | Self::SetOwner { .. }
            | Self::WithdrawAll
            | Self::UpgradeTo { .. }
            | Self::Sweep { .. } => Phase::Attacking,
        }
    }

    pub fn encode(&self, bindings: &Bindings) -> std::result::Result<Bytes, StepCause> {
        let data = match self {
            Self::Deposit => IVulnerableVault::depositCall {}.abi_encode(),
            Self::Withdraw => IVulnerableVault::withdrawCall {}.abi_encode(),
            Self::Attack => IReentrancyAttacker::attackCall {}.abi_encode(),
            Self::Collect => IReentrancyAttacker::collectCall {}.abi_encode(),
            Self::Enter => ILottery::enterCall {}.abi_encode(),
            Self::ClaimPrize { guess } => ILottery::claimPrizeCall { guess: *guess }.abi_encode(),
            Self::SetOwner { owner } => IBadAccessControl::setOwnerCall {
                newOwner: bindings.address(owner)?,
            }
            .abi_encode(),
            Self::WithdrawAll => IBadAccessControl::withdrawAllCall {}.abi_encode(),
            Self::UpgradeTo { implementation } => IProxy::upgradeToCall {
                newImplementation: bindings.address(implementation)?,
            }
            .abi_encode(),
            Self::Sweep { to } => ILogic::sweepCall {
                to: bindings.address(to)?,
            }
            .abi_encode(),
        };
        Ok(data.into())
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => f.write_str("deposit()"),
            Self::Withdraw => f.write_str("withdraw()"),
            Self::Attack => f.write_str("attack()"),
            Self::Collect => f.write_str("collect()"),
            Self::Enter => f.write_str("enter()"),
            Self::ClaimPrize { guess } => write!(f, "claimPrize({guess})"),
            Self::SetOwner { owner } => write!(f, "setOwner({owner})"),
            Self::WithdrawAll => f.write_str("withdrawAll()"),
            Self::UpgradeTo { implementation } => write!(f, "upgradeTo({implementation})"),
            Self::Sweep { to } => write!(f, "sweep({to})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Deploy {
        label: String,
        contract: ContractKind,
        from: String,
        args: Vec<String>,
    },
    /// Plain value transfer into `to` (hits its receive hook).
    Fund {
        from: String,
        to: String,
        amount: U256,
    },
    Invoke {
        from: String,
        target: String,
        call: Call,
        value: U256,
        gas_limit: Option<u64>,
    },
    AdvanceTime {
        seconds: u64,
    },
    MineBlock,
    /// `collect()` on an attacker contract by its owner.
    Collect {
        from: String,
        target: String,
    },
}

impl Step {
    pub fn deploy(label: &str, contract: ContractKind, from: &str, args: &[&str]) -> Self {
        Self::Deploy {
            label: label.to_string(),
            contract,
            from: from.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn fund(from: &str, to: &str, amount: U256) -> Self {
        Self::Fund {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        }
    }

    pub fn invoke(from: &str, target: &str, call: Call) -> Self {
        Self::Invoke {
            from: from.to_string(),
            target: target.to_string(),
            call,
            value: U256::ZERO,
            gas_limit: None,
        }
    }

    pub fn collect(from: &str, target: &str) -> Self {
        Self::Collect {
            from: from.to_string(),
            target: target.to_string(),
        }
    }

    /// Attach `msg.value` to an `Invoke`; other steps are returned unchanged.
    pub fn with_value(mut self, amount: U256) -> Self {
        if let Self::Invoke { value, .. } = &mut self {
            *value = amount;
        }
        self
    }

    /// Pin the gas limit of an `Invoke`, bypassing the configured gas policy.
    pub fn with_gas_limit(mut self, limit: u64) -> Self {
        if let Self::Invoke { gas_limit, .. } = &mut self {
            *gas_limit = Some(limit);
        }
        self
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::Deploy { .. } => Phase::Deploying,
            Self::Fund { .. } => Phase::Funding,
            Self::Invoke { call, .. } => call.phase(),
            Self::AdvanceTime { .. } | Self::MineBlock => Phase::Attacking,
            Self::Collect { .. } => Phase::Settling,
        }
    }

    /// Native currency this step moves out of its sender.
    pub fn value(&self) -> U256 {
        match self {
            Self::Fund { amount, .. } => *amount,
            Self::Invoke { value, .. } => *value,
            _ => U256::ZERO,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deploy {
                label,
                contract,
                from,
                args,
            } => {
                write!(f, "deploy {contract} as {label} from {from}")?;
                if !args.is_empty() {
                    write!(f, " ({})", args.join(", "))?;
                }
                Ok(())
            }
            Self::Fund { from, to, amount } => {
                write!(f, "fund {to} with {} ETH from {from}", format_ether(*amount))
            }
            Self::Invoke {
                from,
                target,
                call,
                value,
                ..
            } => {
                write!(f, "invoke {target}.{call} from {from}")?;
                if !value.is_zero() {
                    write!(f, " with {} ETH", format_ether(*value))?;
                }
                Ok(())
            }
            Self::AdvanceTime { seconds } => write!(f, "advance time by {seconds}s"),
            Self::MineBlock => f.write_str("mine block"),
            Self::Collect { from, target } => write!(f, "collect {target} to {from}"),
        }
    }
}

/// An ordered step plan plus the identity roles it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub roles: Vec<String>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: &str, roles: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn largest_step_value(&self) -> U256 {
        self.steps
            .iter()
            .map(Step::value)
            .max()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Identity(Identity),
    Contract(ContractHandle),
}

impl Binding {
    pub fn address(&self) -> Address {
        match self {
            Self::Identity(identity) => identity.address,
            Self::Contract(handle) => handle.address,
        }
    }
}

/// Label → identity/contract table of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    entries: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn ensure_free(&self, label: &str) -> std::result::Result<(), StepCause> {
        if self.entries.contains_key(label) {
            return Err(StepCause::DuplicateLabel(label.to_string()));
        }
        Ok(())
    }

    pub fn bind_identity(&mut self, identity: Identity) -> std::result::Result<(), StepCause> {
        self.ensure_free(&identity.label)?;
        self.entries
            .insert(identity.label.clone(), Binding::Identity(identity));
        Ok(())
    }

    pub fn bind_contract(&mut self, handle: ContractHandle) -> std::result::Result<(), StepCause> {
        self.ensure_free(&handle.label)?;
        self.entries
            .insert(handle.label.clone(), Binding::Contract(handle));
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Binding> {
        self.entries.get(label)
    }

    pub fn address(&self, label: &str) -> std::result::Result<Address, StepCause> {
        self.get(label)
            .map(Binding::address)
            .ok_or_else(|| StepCause::UnboundLabel(label.to_string()))
    }

    /// Senders must be identities; contracts cannot sign.
    pub fn identity(&self, label: &str) -> std::result::Result<&Identity, StepCause> {
        match self.get(label) {
            Some(Binding::Identity(identity)) => Ok(identity),
            _ => Err(StepCause::UnboundLabel(label.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(label, binding)| (label.as_str(), binding))
    }
}

/// Cooperative cancellation, observed by the runner between steps.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A finished run plus its verdict. The verdict is only read when the run completed.
///
/// A verifier that could not read the post-state leaves `verify_error` set; the run and its
/// balance snapshots are kept either way.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub run: RunResult,
    pub verdict: Option<Verdict>,
    pub verify_error: Option<LabError>,
}

impl ScenarioOutcome {
    pub fn into_result(self) -> Result<Verdict> {
        if let Some(failure) = self.run.failure {
            return Err(LabError::Step(failure));
        }
        if let Some(err) = self.verify_error {
            return Err(err);
        }
        match self.verdict {
            Some(verdict) => Ok(verdict.into_result()?),
            None => Err(LabError::Invariant(
                crate::error::InvariantError::NotSettled(self.run.phase),
            )),
        }
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        self.run.failure.as_ref()
    }

    pub fn violation(&self) -> Option<InvariantViolation> {
        self.verdict
            .as_ref()
            .and_then(|verdict| verdict.clone().into_result().err())
    }
}

/// Provision identities, run `scenario` to a terminal state, then verify `invariant` once.
///
/// Provisioning problems are returned as errors. Step failures, violated invariants and
/// verifier errors are carried in the outcome so observed balances can still be reported.
pub async fn execute_scenario(
    session: &NodeSession,
    config: &LabConfig,
    scenario: &Scenario,
    invariant: &Invariant,
    abort: AbortHandle,
) -> Result<ScenarioOutcome> {
    let roles: Vec<&str> = scenario.roles.iter().map(String::as_str).collect();
    let identities = AccountProvisioner::new(session.node(), config.min_identity_balance_wei)
        .provision(&roles, scenario.largest_step_value())
        .await?;

    let run = ScenarioRunner::new(session, config)
        .with_abort(abort)
        .run(scenario, identities)
        .await;

    let mut outcome = ScenarioOutcome {
        run,
        verdict: None,
        verify_error: None,
    };
    if outcome.run.is_completed() {
        match InvariantVerifier::new(session.node())
            .verify(&scenario.name, invariant, &outcome.run)
            .await
        {
            Ok(verdict) => outcome.verdict = Some(verdict),
            Err(err) => {
                tracing::warn!("[VERIFY] {}: could not evaluate invariant: {err}", scenario.name);
                outcome.verify_error = Some(err);
            }
        }
    }
    Ok(outcome)
}
