//! Behavioural models of the lab contracts, driven by real ABI calldata.
//!
//! Each model mirrors the Solidity it stands in for, flaws included: the vault pays out
//! before it zeroes the caller's balance, the lottery seeds its draw from block values,
//! `setOwner` and `upgradeTo` have no access check.

use super::exec::{Exec, Frame, Halt, SLOAD_GAS, SSTORE_GAS};
use crate::contracts::abi::{
    IBadAccessControl, ILogic, ILottery, ILotteryAttack, IProxy, IReentrancyAttacker,
    IVulnerableVault,
};
use crate::contracts::{decode_address_args, lottery_answer, ContractKind};
use crate::utils::constants::{LOTTERY_DRAW_DELAY_SECS, ONE_ETHER, TENTH_ETHER};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolInterface};
use std::collections::HashMap;

const MALICIOUS_LOGIC_VERSION: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SimContract {
    Vault {
        balances: HashMap<Address, U256>,
    },
    ReentrancyAttacker {
        owner: Address,
        vault: Address,
    },
    Lottery {
        players: Vec<Address>,
        round_start: u64,
    },
    LotteryAttack {
        owner: Address,
        lottery: Address,
    },
    BadAccessControl {
        owner: Address,
        deposits: HashMap<Address, U256>,
    },
    LogicV1,
    MaliciousLogic,
    Proxy {
        implementation: Address,
    },
}

impl SimContract {
    pub fn kind(&self) -> ContractKind {
        match self {
            Self::Vault { .. } => ContractKind::VulnerableVault,
            Self::ReentrancyAttacker { .. } => ContractKind::ReentrancyAttacker,
            Self::Lottery { .. } => ContractKind::Lottery,
            Self::LotteryAttack { .. } => ContractKind::LotteryAttack,
            Self::BadAccessControl { .. } => ContractKind::BadAccessControl,
            Self::LogicV1 => ContractKind::LogicV1,
            Self::MaliciousLogic => ContractKind::MaliciousLogic,
            Self::Proxy { .. } => ContractKind::Proxy,
        }
    }

    /// Storage slots written by the constructor.
    pub fn storage_slots(&self) -> u64 {
        match self {
            Self::Vault { .. } | Self::LogicV1 | Self::MaliciousLogic => 0,
            Self::Lottery { .. } | Self::BadAccessControl { .. } | Self::Proxy { .. } => 1,
            Self::ReentrancyAttacker { .. } | Self::LotteryAttack { .. } => 2,
        }
    }

    pub fn construct(
        kind: ContractKind,
        deployer: Address,
        constructor_args: &[u8],
        timestamp: u64,
    ) -> Result<Self, Halt> {
        let args = decode_address_args(constructor_args)
            .filter(|args| args.len() == kind.constructor_arity())
            .ok_or_else(|| Halt::revert("bad constructor arguments"))?;
        let bound = || match args.first() {
            Some(target) if !target.is_zero() => Ok(*target),
            _ => Err(Halt::revert("zero address")),
        };

        Ok(match kind {
            ContractKind::VulnerableVault => Self::Vault {
                balances: HashMap::new(),
            },
            ContractKind::ReentrancyAttacker => Self::ReentrancyAttacker {
                owner: deployer,
                vault: bound()?,
            },
            ContractKind::Lottery => Self::Lottery {
                players: Vec::new(),
                round_start: timestamp,
            },
            ContractKind::LotteryAttack => Self::LotteryAttack {
                owner: deployer,
                lottery: bound()?,
            },
            ContractKind::BadAccessControl => Self::BadAccessControl {
                owner: deployer,
                deposits: HashMap::new(),
            },
            ContractKind::LogicV1 => Self::LogicV1,
            ContractKind::MaliciousLogic => Self::MaliciousLogic,
            ContractKind::Proxy => Self::Proxy {
                implementation: bound()?,
            },
        })
    }
}

fn unknown_selector() -> Halt {
    Halt::revert("function selector not recognised")
}

fn layout_mismatch() -> Halt {
    Halt::revert("storage layout mismatch")
}

/// Run the code of `frame.code` against `frame.this`.
pub(crate) fn execute(exec: &mut Exec<'_>, frame: &Frame, data: &[u8]) -> Result<Bytes, Halt> {
    match frame.code {
        ContractKind::VulnerableVault => vault(exec, frame, data),
        ContractKind::ReentrancyAttacker => reentrancy_attacker(exec, frame, data),
        ContractKind::Lottery => lottery(exec, frame, data),
        ContractKind::LotteryAttack => lottery_attack(exec, frame, data),
        ContractKind::BadAccessControl => bad_access_control(exec, frame, data),
        ContractKind::Proxy => proxy(exec, frame, data),
        ContractKind::LogicV1 | ContractKind::MaliciousLogic => logic(exec, frame, data),
    }
}

fn vault_ledger<'a>(
    exec: &'a mut Exec<'_>,
    at: Address,
) -> Result<&'a mut HashMap<Address, U256>, Halt> {
    match exec.world.contracts.get_mut(&at) {
        Some(SimContract::Vault { balances }) => Ok(balances),
        _ => Err(layout_mismatch()),
    }
}

fn vault(exec: &mut Exec<'_>, frame: &Frame, data: &[u8]) -> Result<Bytes, Halt> {
    if data.is_empty() {
        exec.charge(SSTORE_GAS)?;
        *vault_ledger(exec, frame.this)?
            .entry(frame.sender)
            .or_default() += frame.value;
        return Ok(Bytes::new());
    }

    match IVulnerableVault::IVulnerableVaultCalls::abi_decode(data, true)
        .map_err(|_| unknown_selector())?
    {
        IVulnerableVault::IVulnerableVaultCalls::deposit(_) => {
            exec.charge(SSTORE_GAS)?;
            *vault_ledger(exec, frame.this)?
                .entry(frame.sender)
                .or_default() += frame.value;
            Ok(Bytes::new())
        }
        IVulnerableVault::IVulnerableVaultCalls::withdraw(_) => {
            exec.charge(SLOAD_GAS)?;
            let owed = vault_ledger(exec, frame.this)?
                .get(&frame.sender)
                .copied()
                .unwrap_or_default();
            if owed.is_zero() {
                return Err(Halt::revert("nothing to withdraw"));
            }
            // Interaction before effect: the payee can call back in while `owed` still stands.
            exec.call(frame, frame.sender, owed, &[])?;
            exec.charge(SSTORE_GAS)?;
            vault_ledger(exec, frame.this)?.insert(frame.sender, U256::ZERO);
            Ok(Bytes::new())
        }
        IVulnerableVault::IVulnerableVaultCalls::balances(call) => {
            exec.charge(SLOAD_GAS)?;
            let held = vault_ledger(exec, frame.this)?
                .get(&call.account)
                .copied()
                .unwrap_or_default();
            Ok(IVulnerableVault::balancesCall::abi_encode_returns(&(held,)).into())
        }
    }
}

fn reentrancy_attacker(exec: &mut Exec<'_>, frame: &Frame, data: &[u8]) -> Result<Bytes, Halt> {
    exec.charge(SLOAD_GAS)?;
    let (owner, target) = match exec.world.contracts.get(&frame.this) {
        Some(SimContract::ReentrancyAttacker { owner, vault }) => (*owner, *vault),
        _ => return Err(layout_mismatch()),
    };
    let withdraw = IVulnerableVault::withdrawCall {}.abi_encode();

    if data.is_empty() {
        if frame.sender == target && exec.balance(target) >= ONE_ETHER {
            exec.call(frame, target, U256::ZERO, &withdraw)?;
        }
        return Ok(Bytes::new());
    }

    match IReentrancyAttacker::IReentrancyAttackerCalls::abi_decode(data, true)
        .map_err(|_| unknown_selector())?
    {
        IReentrancyAttacker::IReentrancyAttackerCalls::attack(_) => {
            if exec.balance(frame.this) < ONE_ETHER {
                return Err(Halt::revert("fund the attacker first"));
            }
            let deposit = IVulnerableVault::depositCall {}.abi_encode();
            exec.call(frame, target, ONE_ETHER, &deposit)?;
            exec.call(frame, target, U256::ZERO, &withdraw)?;
            Ok(Bytes::new())
        }
        IReentrancyAttacker::IReentrancyAttackerCalls::collect(_) => {
            if frame.sender != owner {
                return Err(Halt::revert("not owner"));
            }
            let loot = exec.balance(frame.this);
            exec.call(frame, owner, loot, &[])?;
            Ok(Bytes::new())
        }
    }
}

fn lottery(exec: &mut Exec<'_>, frame: &Frame, data: &[u8]) -> Result<Bytes, Halt> {
    let call = ILottery::ILotteryCalls::abi_decode(data, true).map_err(|_| unknown_selector())?;
    let block = exec.block;
    let Some(SimContract::Lottery {
        players,
        round_start,
    }) = exec.world.contracts.get_mut(&frame.this)
    else {
        return Err(layout_mismatch());
    };

    match call {
        ILottery::ILotteryCalls::enter(_) => {
            if frame.value != TENTH_ETHER {
                return Err(Halt::revert("entry fee is exactly 0.1 ether"));
            }
            players.push(frame.sender);
            exec.charge(SSTORE_GAS)?;
            Ok(Bytes::new())
        }
        ILottery::ILotteryCalls::getPlayers(_) => {
            let listed = players.clone();
            exec.charge(SLOAD_GAS * (1 + listed.len() as u64))?;
            Ok(ILottery::getPlayersCall::abi_encode_returns(&(listed,)).into())
        }
        ILottery::ILotteryCalls::claimPrize(claim) => {
            if players.is_empty() {
                return Err(Halt::revert("no players"));
            }
            if block.timestamp < round_start.saturating_add(LOTTERY_DRAW_DELAY_SECS) {
                return Err(Halt::revert("round still open"));
            }
            if claim.guess != lottery_answer(block.timestamp, block.prevrandao, players.len()) {
                return Err(Halt::revert("wrong guess"));
            }
            players.clear();
            *round_start = block.timestamp;
            exec.charge(SSTORE_GAS * 2)?;
            let pot = exec.balance(frame.this);
            exec.call(frame, frame.sender, pot, &[])?;
            Ok(Bytes::new())
        }
    }
}

fn lottery_attack(exec: &mut Exec<'_>, frame: &Frame, data: &[u8]) -> Result<Bytes, Halt> {
    if data.is_empty() {
        return Ok(Bytes::new());
    }
    let ILotteryAttack::ILotteryAttackCalls::attack(_) =
        ILotteryAttack::ILotteryAttackCalls::abi_decode(data, true)
            .map_err(|_| unknown_selector())?;

    exec.charge(SLOAD_GAS)?;
    let (owner, target) = match exec.world.contracts.get(&frame.this) {
        Some(SimContract::LotteryAttack { owner, lottery }) => (*owner, *lottery),
        _ => return Err(layout_mismatch()),
    };
    if frame.value != TENTH_ETHER {
        return Err(Halt::revert("send exactly the entry fee"));
    }

    exec.call(frame, target, TENTH_ETHER, &ILottery::enterCall {}.abi_encode())?;
    let raw = exec.call(
        frame,
        target,
        U256::ZERO,
        &ILottery::getPlayersCall {}.abi_encode(),
    )?;
    let players = ILottery::getPlayersCall::abi_decode_returns(&raw, true)
        .map_err(|_| Halt::revert("malformed getPlayers return"))?
        ._0;
    let guess = lottery_answer(exec.block.timestamp, exec.block.prevrandao, players.len());
    exec.call(
        frame,
        target,
        U256::ZERO,
        &ILottery::claimPrizeCall { guess }.abi_encode(),
    )?;

    let winnings = exec.balance(frame.this);
    exec.call(frame, owner, winnings, &[])?;
    Ok(Bytes::new())
}

fn bad_access_control(exec: &mut Exec<'_>, frame: &Frame, data: &[u8]) -> Result<Bytes, Halt> {
    let call = if data.is_empty() {
        IBadAccessControl::IBadAccessControlCalls::deposit(IBadAccessControl::depositCall {})
    } else {
        IBadAccessControl::IBadAccessControlCalls::abi_decode(data, true)
            .map_err(|_| unknown_selector())?
    };
    let Some(SimContract::BadAccessControl { owner, deposits }) =
        exec.world.contracts.get_mut(&frame.this)
    else {
        return Err(layout_mismatch());
    };

    match call {
        IBadAccessControl::IBadAccessControlCalls::deposit(_) => {
            *deposits.entry(frame.sender).or_default() += frame.value;
            exec.charge(SSTORE_GAS)?;
            Ok(Bytes::new())
        }
        IBadAccessControl::IBadAccessControlCalls::owner(_) => {
            let current = *owner;
            exec.charge(SLOAD_GAS)?;
            Ok(IBadAccessControl::ownerCall::abi_encode_returns(&(current,)).into())
        }
        IBadAccessControl::IBadAccessControlCalls::setOwner(update) => {
            *owner = update.newOwner;
            exec.charge(SSTORE_GAS)?;
            Ok(Bytes::new())
        }
        IBadAccessControl::IBadAccessControlCalls::withdrawAll(_) => {
            let current = *owner;
            if frame.sender != current {
                return Err(Halt::revert("not owner"));
            }
            exec.charge(SLOAD_GAS)?;
            let held = exec.balance(frame.this);
            exec.call(frame, current, held, &[])?;
            Ok(Bytes::new())
        }
    }
}

fn proxy(exec: &mut Exec<'_>, frame: &Frame, data: &[u8]) -> Result<Bytes, Halt> {
    if data.is_empty() {
        return Ok(Bytes::new());
    }
    exec.charge(SLOAD_GAS)?;
    let implementation = match exec.world.contracts.get(&frame.this) {
        Some(SimContract::Proxy { implementation }) => *implementation,
        _ => return Err(layout_mismatch()),
    };

    match IProxy::IProxyCalls::abi_decode(data, true) {
        Ok(IProxy::IProxyCalls::implementation(_)) => {
            Ok(IProxy::implementationCall::abi_encode_returns(&(implementation,)).into())
        }
        Ok(IProxy::IProxyCalls::upgradeTo(upgrade)) => {
            if let Some(SimContract::Proxy { implementation }) =
                exec.world.contracts.get_mut(&frame.this)
            {
                *implementation = upgrade.newImplementation;
            }
            exec.charge(SSTORE_GAS)?;
            Ok(Bytes::new())
        }
        Err(_) => exec.delegate(frame, implementation, data),
    }
}

fn logic(exec: &mut Exec<'_>, frame: &Frame, data: &[u8]) -> Result<Bytes, Halt> {
    let call = ILogic::ILogicCalls::abi_decode(data, true).map_err(|_| unknown_selector())?;
    match (frame.code, call) {
        (ContractKind::LogicV1, ILogic::ILogicCalls::version(_)) => {
            Ok(ILogic::versionCall::abi_encode_returns(&(U256::from(1u64),)).into())
        }
        (ContractKind::MaliciousLogic, ILogic::ILogicCalls::version(_)) => Ok(
            ILogic::versionCall::abi_encode_returns(&(U256::from(MALICIOUS_LOGIC_VERSION),))
                .into(),
        ),
        (ContractKind::MaliciousLogic, ILogic::ILogicCalls::sweep(sweep)) => {
            let held = exec.balance(frame.this);
            exec.call(frame, sweep.to, held, &[])?;
            Ok(Bytes::new())
        }
        _ => Err(unknown_selector()),
    }
}
