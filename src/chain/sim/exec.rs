use super::contracts::{self, SimContract};
use crate::contracts::ContractKind;
use alloy::primitives::{Address, Bytes, B256, U256};
use std::collections::HashMap;

pub(crate) const TX_BASE_GAS: u64 = 21_000;
pub(crate) const CREATE_GAS: u64 = 32_000;
pub(crate) const CODE_DEPOSIT_GAS: u64 = 120_000;
pub(crate) const CALL_GAS: u64 = 2_600;
pub(crate) const VALUE_TRANSFER_GAS: u64 = 9_000;
pub(crate) const SLOAD_GAS: u64 = 2_100;
pub(crate) const SSTORE_GAS: u64 = 5_000;
pub(crate) const MAX_CALL_DEPTH: usize = 1_024;

const CALLDATA_BYTE_GAS: u64 = 16;

pub(crate) fn calldata_gas(data: &[u8]) -> u64 {
    data.len() as u64 * CALLDATA_BYTE_GAS
}

/// Account state of the simulated chain. Cloned as the pre-transaction snapshot.
#[derive(Debug, Clone, Default)]
pub(crate) struct World {
    pub balances: HashMap<Address, U256>,
    pub nonces: HashMap<Address, u64>,
    pub contracts: HashMap<Address, SimContract>,
}

impl World {
    pub fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    pub fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    pub fn bump_nonce(&mut self, address: Address) {
        *self.nonces.entry(address).or_default() += 1;
    }

    pub fn debit(&mut self, address: Address, amount: U256) {
        let entry = self.balances.entry(address).or_default();
        *entry = entry.saturating_sub(amount);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockEnv {
    pub number: u64,
    pub timestamp: u64,
    pub prevrandao: B256,
}

/// Why execution stopped early. Any halt rolls back the whole transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Halt {
    Revert(String),
    OutOfGas,
    CallDepth,
}

impl Halt {
    pub fn revert(reason: impl Into<String>) -> Self {
        Self::Revert(reason.into())
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Revert(reason) => reason.clone(),
            Self::OutOfGas => "out of gas".to_string(),
            Self::CallDepth => "max call depth exceeded".to_string(),
        }
    }
}

/// One activation record: whose storage and balance (`this`) runs which code.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub this: Address,
    pub code: ContractKind,
    pub sender: Address,
    pub value: U256,
    pub depth: usize,
}

pub(crate) struct Exec<'w> {
    pub world: &'w mut World,
    pub block: BlockEnv,
    gas_limit: u64,
    gas_used: u64,
}

impl<'w> Exec<'w> {
    pub fn new(world: &'w mut World, block: BlockEnv, gas_limit: u64) -> Self {
        Self {
            world,
            block,
            gas_limit,
            gas_used: 0,
        }
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn charge(&mut self, gas: u64) -> Result<(), Halt> {
        let next = self.gas_used.saturating_add(gas);
        if next > self.gas_limit {
            self.gas_used = self.gas_limit;
            return Err(Halt::OutOfGas);
        }
        self.gas_used = next;
        Ok(())
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.world.balance(address)
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), Halt> {
        if value.is_zero() {
            return Ok(());
        }
        let available = self.world.balance(from);
        if available < value {
            return Err(Halt::revert("insufficient balance for transfer"));
        }
        self.world.balances.insert(from, available - value);
        *self.world.balances.entry(to).or_default() += value;
        Ok(())
    }

    fn enter(
        &mut self,
        depth: usize,
        sender: Address,
        to: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Halt> {
        self.transfer(sender, to, value)?;
        let Some(code) = self.world.contracts.get(&to).map(SimContract::kind) else {
            return Ok(Bytes::new());
        };
        let frame = Frame {
            this: to,
            code,
            sender,
            value,
            depth,
        };
        contracts::execute(self, &frame, data)
    }

    /// Outermost call of a transaction. Consumes the sender's nonce and intrinsic gas.
    pub fn transact(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Halt> {
        self.world.bump_nonce(from);
        self.charge(TX_BASE_GAS + calldata_gas(data))?;
        self.enter(0, from, to, value, data)
    }

    /// Message call issued from inside `parent`.
    pub fn call(
        &mut self,
        parent: &Frame,
        to: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Halt> {
        let depth = parent.depth + 1;
        if depth > MAX_CALL_DEPTH {
            return Err(Halt::CallDepth);
        }
        let transfer_gas = if value.is_zero() { 0 } else { VALUE_TRANSFER_GAS };
        self.charge(CALL_GAS + transfer_gas + calldata_gas(data))?;
        self.enter(depth, parent.this, to, value, data)
    }

    /// Run the code deployed at `code_at` against the storage and balance of `parent.this`.
    pub fn delegate(
        &mut self,
        parent: &Frame,
        code_at: Address,
        data: &[u8],
    ) -> Result<Bytes, Halt> {
        let depth = parent.depth + 1;
        if depth > MAX_CALL_DEPTH {
            return Err(Halt::CallDepth);
        }
        self.charge(CALL_GAS + calldata_gas(data))?;
        let Some(code) = self.world.contracts.get(&code_at).map(SimContract::kind) else {
            return Ok(Bytes::new());
        };
        let frame = Frame {
            code,
            depth,
            ..*parent
        };
        contracts::execute(self, &frame, data)
    }

    /// Creation transaction: deploys `kind` at the address derived from the deployer's nonce.
    pub fn create(
        &mut self,
        deployer: Address,
        kind: ContractKind,
        constructor_args: &[u8],
    ) -> Result<Address, Halt> {
        let address = deployer.create(self.world.nonce(deployer));
        self.world.bump_nonce(deployer);
        self.charge(TX_BASE_GAS + CREATE_GAS + CODE_DEPOSIT_GAS + calldata_gas(constructor_args))?;
        let contract =
            SimContract::construct(kind, deployer, constructor_args, self.block.timestamp)?;
        self.charge(SSTORE_GAS * contract.storage_slots())?;
        self.world.contracts.insert(address, contract);
        Ok(address)
    }
}
