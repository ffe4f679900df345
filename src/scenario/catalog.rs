//! Fixed registry of the lab's exploit scenarios.

use crate::contracts::ContractKind;
use crate::error::Result;
use crate::executor::{AccountProvisioner, ContractDeployer, ContractHandle, NodeSession};
use crate::scenario::invariants::{Clause, Invariant};
use crate::scenario::{Call, Scenario, Step};
use crate::utils::config::LabConfig;
use crate::utils::constants::{
    DEFAULT_GAS_CEILING, LOTTERY_DRAW_DELAY_SECS, ONE_ETHER, TENTH_ETHER,
};
use alloy::primitives::{Address, U256};
use std::fmt;
use std::str::FromStr;

pub const OWNER: &str = "owner";
pub const ATTACKER: &str = "attacker";
pub const USER1: &str = "user1";
pub const USER2: &str = "user2";

pub const ROLES: [&str; 4] = [OWNER, ATTACKER, USER1, USER2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    Reentrancy,
    Randomness,
    AccessControl,
    UnsafeProxy,
}

impl ScenarioId {
    pub const ALL: [ScenarioId; 4] = [
        Self::Reentrancy,
        Self::Randomness,
        Self::AccessControl,
        Self::UnsafeProxy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reentrancy => "reentrancy",
            Self::Randomness => "randomness",
            Self::AccessControl => "access-control",
            Self::UnsafeProxy => "unsafe-proxy",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Self::Reentrancy => "vault pays out before zeroing the caller; attacker re-enters withdraw",
            Self::Randomness => "lottery seeds its draw from block values an attacker contract can read",
            Self::AccessControl => "anyone can call setOwner, then drain through withdrawAll",
            Self::UnsafeProxy => "unprotected upgradeTo swaps in logic that sweeps the proxy",
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|id| id.as_str()).collect();
                format!("unknown scenario `{raw}` (expected one of: {})", known.join(", "))
            })
    }
}

/// What a scenario attacks, with what, and which post-state proves it worked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioDescriptor {
    pub id: ScenarioId,
    pub target: ContractKind,
    pub attacker: Option<ContractKind>,
    pub invariant: Invariant,
}

pub fn descriptor(id: ScenarioId) -> ScenarioDescriptor {
    let (target, attacker, clauses) = match id {
        ScenarioId::Reentrancy => (
            ContractKind::VulnerableVault,
            Some(ContractKind::ReentrancyAttacker),
            vec![
                Clause::balance_zero("vault"),
                Clause::balance_increased(ATTACKER),
            ],
        ),
        ScenarioId::Randomness => (
            ContractKind::Lottery,
            Some(ContractKind::LotteryAttack),
            vec![
                Clause::collection_empty("lottery"),
                Clause::balance_increased(ATTACKER),
            ],
        ),
        ScenarioId::AccessControl => (
            ContractKind::BadAccessControl,
            None,
            vec![
                Clause::owner_is("bank", ATTACKER),
                Clause::balance_zero("bank"),
                Clause::balance_increased(ATTACKER),
            ],
        ),
        ScenarioId::UnsafeProxy => (
            ContractKind::Proxy,
            Some(ContractKind::MaliciousLogic),
            vec![
                Clause::implementation_is("proxy", "rogue_logic"),
                Clause::balance_zero("proxy"),
                Clause::balance_increased(ATTACKER),
            ],
        ),
    };
    ScenarioDescriptor {
        id,
        target,
        attacker,
        invariant: Invariant::all(clauses),
    }
}

pub fn plan(id: ScenarioId) -> Scenario {
    let scenario = Scenario::new(id.as_str(), &ROLES);
    match id {
        ScenarioId::Reentrancy => scenario
            .step(Step::deploy("vault", ContractKind::VulnerableVault, OWNER, &[]))
            .step(Step::deploy(
                "attacker_contract",
                ContractKind::ReentrancyAttacker,
                ATTACKER,
                &["vault"],
            ))
            .step(Step::invoke(USER1, "vault", Call::Deposit).with_value(ONE_ETHER))
            .step(Step::invoke(USER2, "vault", Call::Deposit).with_value(ONE_ETHER))
            .step(Step::fund(ATTACKER, "attacker_contract", ONE_ETHER))
            .step(
                Step::invoke(ATTACKER, "attacker_contract", Call::Attack)
                    .with_gas_limit(DEFAULT_GAS_CEILING),
            )
            .step(Step::collect(ATTACKER, "attacker_contract")),
        ScenarioId::Randomness => scenario
            .step(Step::deploy("lottery", ContractKind::Lottery, OWNER, &[]))
            .step(Step::invoke(USER1, "lottery", Call::Enter).with_value(TENTH_ETHER))
            .step(Step::invoke(USER2, "lottery", Call::Enter).with_value(TENTH_ETHER))
            .step(Step::deploy(
                "lottery_attack",
                ContractKind::LotteryAttack,
                ATTACKER,
                &["lottery"],
            ))
            .step(Step::AdvanceTime {
                seconds: LOTTERY_DRAW_DELAY_SECS,
            })
            .step(Step::MineBlock)
            .step(Step::invoke(ATTACKER, "lottery_attack", Call::Attack).with_value(TENTH_ETHER))
            .step(Step::MineBlock),
        ScenarioId::AccessControl => scenario
            .step(Step::deploy("bank", ContractKind::BadAccessControl, OWNER, &[]))
            .step(Step::invoke(USER1, "bank", Call::Deposit).with_value(ONE_ETHER))
            .step(Step::invoke(USER2, "bank", Call::Deposit).with_value(ONE_ETHER))
            .step(Step::invoke(
                ATTACKER,
                "bank",
                Call::SetOwner {
                    owner: ATTACKER.to_string(),
                },
            ))
            .step(Step::invoke(ATTACKER, "bank", Call::WithdrawAll)),
        ScenarioId::UnsafeProxy => scenario
            .step(Step::deploy("logic_v1", ContractKind::LogicV1, OWNER, &[]))
            .step(Step::deploy("proxy", ContractKind::Proxy, OWNER, &["logic_v1"]))
            .step(Step::fund(USER1, "proxy", ONE_ETHER))
            .step(Step::fund(USER2, "proxy", ONE_ETHER))
            .step(Step::deploy(
                "rogue_logic",
                ContractKind::MaliciousLogic,
                ATTACKER,
                &[],
            ))
            .step(Step::invoke(
                ATTACKER,
                "proxy",
                Call::UpgradeTo {
                    implementation: "rogue_logic".to_string(),
                },
            ))
            .step(Step::invoke(
                ATTACKER,
                "proxy",
                Call::Sweep {
                    to: ATTACKER.to_string(),
                },
            )),
    }
}

/// Contracts deployed by `deploy-all`, in dependency order. `Proxy` binds to the `LogicV1`.
pub const DEPLOY_ALL: [ContractKind; 4] = [
    ContractKind::VulnerableVault,
    ContractKind::BadAccessControl,
    ContractKind::LogicV1,
    ContractKind::Proxy,
];

/// Deploy [`DEPLOY_ALL`] from the first node account, outside any scenario.
pub async fn deploy_reference_set(
    session: &NodeSession,
    config: &LabConfig,
) -> Result<Vec<ContractHandle>> {
    let identities = AccountProvisioner::new(session.node(), config.min_identity_balance_wei)
        .provision(&[OWNER], U256::ZERO)
        .await?;
    let Some(owner) = identities.first() else {
        return Ok(Vec::new());
    };
    let deployer = ContractDeployer::new(
        session.node(),
        config.tx_timeout,
        config.gas_policy.ceiling(),
    );

    let mut handles: Vec<ContractHandle> = Vec::with_capacity(DEPLOY_ALL.len());
    for kind in DEPLOY_ALL {
        let args: Vec<Address> = match kind {
            ContractKind::Proxy => handles
                .iter()
                .filter(|handle| handle.kind == ContractKind::LogicV1)
                .map(|handle| handle.address)
                .collect(),
            _ => Vec::new(),
        };
        let label = kind.artifact_name().to_ascii_lowercase();
        let handle = deployer.deploy(&label, kind, owner, &args).await?;
        tracing::info!(
            "[DEPLOY] {kind} at {:#x} (block #{})",
            handle.address,
            handle.block_number
        );
        handles.push(handle);
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Phase;

    #[test]
    fn test_scenario_ids_parse_and_round_trip() {
        for id in ScenarioId::ALL {
            assert_eq!(id.as_str().parse::<ScenarioId>(), Ok(id));
        }
        assert_eq!("Access_Control".parse::<ScenarioId>(), Ok(ScenarioId::AccessControl));
        let err = "flash-loan".parse::<ScenarioId>().expect_err("not in catalog");
        assert!(err.contains("reentrancy"));
    }

    #[test]
    fn test_every_plan_deploys_its_descriptor_contracts() {
        for id in ScenarioId::ALL {
            let descriptor = descriptor(id);
            let deployed: Vec<ContractKind> = plan(id)
                .steps
                .iter()
                .filter_map(|step| match step {
                    Step::Deploy { contract, .. } => Some(*contract),
                    _ => None,
                })
                .collect();
            assert!(deployed.contains(&descriptor.target), "{id} deploys its target");
            if let Some(attacker) = descriptor.attacker {
                assert!(deployed.contains(&attacker), "{id} deploys its attacker");
            }
        }
    }

    #[test]
    fn test_plans_reach_attacking_and_need_at_most_one_ether_per_step() {
        for id in ScenarioId::ALL {
            let plan = plan(id);
            assert!(
                plan.steps.iter().any(|s| s.phase() == Phase::Attacking),
                "{id} has an attack step"
            );
            assert!(plan.largest_step_value() <= ONE_ETHER);
        }
    }

    #[test]
    fn test_randomness_plan_advances_past_the_draw_delay_before_attacking() {
        let plan = plan(ScenarioId::Randomness);
        let advance = plan
            .steps
            .iter()
            .position(|s| matches!(s, Step::AdvanceTime { seconds } if *seconds >= LOTTERY_DRAW_DELAY_SECS))
            .expect("time is advanced");
        let attack = plan
            .steps
            .iter()
            .position(|s| matches!(s, Step::Invoke { call: Call::Attack, .. }))
            .expect("attack step");
        assert!(advance < attack);
        assert!(matches!(plan.steps[advance + 1], Step::MineBlock));
    }
}
