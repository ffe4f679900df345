//! Deterministic in-process dev chain.
//!
//! Automines one block per transaction, like a Hardhat/Anvil node in its default mode.
//! State changes of a halted transaction are rolled back; gas is still charged.

mod contracts;
mod exec;

use crate::chain::{BlockHeader, BlockTag, ChainNode, DeployRequest, TxReceipt, TxRequest};
use crate::contracts::ContractKind;
use crate::error::NodeError;
use crate::utils::constants::{DEV_CHAIN_ID, MAX_TX_GAS, MIN_TX_GAS, ONE_ETHER};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use exec::{BlockEnv, Exec, World};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const GAS_PRICE_WEI: u64 = 1_000_000_000;
pub const DEFAULT_ACCOUNT_COUNT: usize = 10;
pub const DEFAULT_ACCOUNT_ETHER: u64 = 10_000;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

fn dev_account(index: usize) -> Address {
    let seed = keccak256(format!("exploit-lab/dev-account/{index}"));
    Address::from_slice(&seed[12..])
}

fn prevrandao(chain_id: u64, number: u64) -> B256 {
    let mut seed = [0u8; 16];
    seed[..8].copy_from_slice(&chain_id.to_be_bytes());
    seed[8..].copy_from_slice(&number.to_be_bytes());
    keccak256(seed)
}

enum TxAction {
    Call { to: Address, data: Bytes },
    Create { kind: ContractKind, args: Bytes },
}

struct SimState {
    world: World,
    blocks: Vec<BlockHeader>,
    pending_timestamp: Option<u64>,
    receipts: HashMap<B256, TxReceipt>,
}

impl SimState {
    fn head(&self) -> BlockHeader {
        self.blocks.last().copied().unwrap_or(BlockHeader {
            number: 0,
            timestamp: GENESIS_TIMESTAMP,
        })
    }

    fn pending_block(&self) -> BlockEnv {
        let head = self.head();
        let number = head.number + 1;
        BlockEnv {
            number,
            timestamp: self.pending_timestamp.unwrap_or(head.timestamp + 1),
            prevrandao: prevrandao(DEV_CHAIN_ID, number),
        }
    }

    fn seal(&mut self, block: BlockEnv) -> BlockHeader {
        self.pending_timestamp = None;
        let header = BlockHeader {
            number: block.number,
            timestamp: block.timestamp,
        };
        self.blocks.push(header);
        header
    }
}

pub struct SimChain {
    endpoint: String,
    accounts: Vec<Address>,
    state: Mutex<SimState>,
    stall_confirmations: AtomicBool,
}

impl Default for SimChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChain {
    pub fn new() -> Self {
        Self::with_accounts(DEFAULT_ACCOUNT_COUNT, ONE_ETHER * U256::from(DEFAULT_ACCOUNT_ETHER))
    }

    /// A chain whose genesis funds `count` unlocked accounts with `balance` wei each.
    pub fn with_accounts(count: usize, balance: U256) -> Self {
        let accounts: Vec<Address> = (0..count).map(dev_account).collect();
        let mut world = World::default();
        for account in &accounts {
            world.balances.insert(*account, balance);
        }
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        Self {
            endpoint: format!("sim://{instance}"),
            accounts,
            state: Mutex::new(SimState {
                world,
                blocks: vec![BlockHeader {
                    number: 0,
                    timestamp: GENESIS_TIMESTAMP,
                }],
                pending_timestamp: None,
                receipts: HashMap::new(),
            }),
            stall_confirmations: AtomicBool::new(false),
        }
    }

    /// While set, transactions still execute but their receipts are never delivered.
    pub fn set_stall_confirmations(&self, stalled: bool) {
        self.stall_confirmations.store(stalled, Ordering::SeqCst);
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(
        &self,
        from: Address,
        value: U256,
        gas_limit: u64,
        action: TxAction,
    ) -> Result<B256, NodeError> {
        if gas_limit < MIN_TX_GAS {
            return Err(NodeError::Rejected(format!(
                "intrinsic gas too low: gas {gas_limit}, minimum needed {MIN_TX_GAS}"
            )));
        }
        if gas_limit > MAX_TX_GAS {
            return Err(NodeError::Rejected(format!(
                "gas limit {gas_limit} exceeds block gas limit {MAX_TX_GAS}"
            )));
        }

        let mut state = self.state();
        if !self.accounts.contains(&from) {
            return Err(NodeError::Rejected(format!(
                "unknown account {from:#x}: sender is not unlocked"
            )));
        }
        let max_fee = U256::from(gas_limit) * U256::from(GAS_PRICE_WEI);
        let upfront = max_fee.saturating_add(value);
        let available = state.world.balance(from);
        if available < upfront {
            return Err(NodeError::Rejected(format!(
                "insufficient funds for gas * price + value: have {available} want {upfront}"
            )));
        }

        let nonce = state.world.nonce(from);
        let block = state.pending_block();
        let snapshot = state.world.clone();

        let (outcome, gas_used) = {
            let mut exec = Exec::new(&mut state.world, block, gas_limit);
            let outcome = match action {
                TxAction::Call { to, data } => exec.transact(from, to, value, &data).map(|_| None),
                TxAction::Create { kind, args } => {
                    if !value.is_zero() {
                        Err(exec::Halt::revert("constructor is not payable"))
                    } else {
                        exec.create(from, kind, &args).map(Some)
                    }
                }
            };
            (outcome, exec.gas_used())
        };

        let (success, contract_address, revert_reason) = match outcome {
            Ok(created) => (true, created, None),
            Err(halt) => {
                state.world = snapshot;
                state.world.bump_nonce(from);
                (false, None, Some(halt.reason()))
            }
        };
        state
            .world
            .debit(from, U256::from(gas_used) * U256::from(GAS_PRICE_WEI));

        let header = state.seal(block);
        let mut preimage = Vec::with_capacity(36);
        preimage.extend_from_slice(from.as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(self.endpoint.as_bytes());
        let tx_hash = keccak256(preimage);

        match &revert_reason {
            Some(reason) => tracing::debug!(
                "[SIM] block #{} tx {tx_hash:#x} reverted ({reason}), gas {gas_used}",
                header.number
            ),
            None => tracing::debug!(
                "[SIM] block #{} ts={} tx {tx_hash:#x} mined, gas {gas_used}",
                header.number,
                header.timestamp
            ),
        }

        state.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: header.number,
                success,
                gas_used,
                contract_address,
                revert_reason,
            },
        );
        Ok(tx_hash)
    }

    fn dry_run(&self, from: Address, to: Address, value: U256, data: &[u8]) -> Result<(Bytes, u64), NodeError> {
        let state = self.state();
        let mut world = state.world.clone();
        let block = state.pending_block();
        drop(state);

        let mut exec = Exec::new(&mut world, block, MAX_TX_GAS);
        let output = exec
            .transact(from, to, value, data)
            .map_err(|halt| NodeError::Reverted {
                reason: halt.reason(),
            })?;
        Ok((output, exec.gas_used()))
    }
}

#[async_trait]
impl ChainNode for SimChain {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn accounts(&self) -> Result<Vec<Address>, NodeError> {
        Ok(self.accounts.clone())
    }

    async fn deploy_contract(&self, request: DeployRequest) -> Result<B256, NodeError> {
        self.apply(
            request.from,
            U256::ZERO,
            request.gas_limit,
            TxAction::Create {
                kind: request.contract,
                args: request.constructor_args,
            },
        )
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256, NodeError> {
        self.apply(
            request.from,
            request.value,
            request.gas_limit,
            TxAction::Call {
                to: request.to,
                data: request.data,
            },
        )
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<TxReceipt, NodeError> {
        if self.stall_confirmations.load(Ordering::SeqCst) {
            tokio::time::sleep(timeout).await;
            return Err(NodeError::Timeout {
                waited_ms: timeout.as_millis() as u64,
                context: format!("receipt for {tx_hash:#x}"),
            });
        }
        self.state()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| NodeError::UnknownTransaction(format!("{tx_hash:#x}")))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError> {
        self.dry_run(Address::ZERO, to, U256::ZERO, &data)
            .map(|(output, _)| output)
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, NodeError> {
        self.dry_run(request.from, request.to, request.value, &request.data)
            .map(|(_, gas)| gas)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, NodeError> {
        Ok(self.state().world.balance(address))
    }

    async fn get_block(&self, tag: BlockTag) -> Result<BlockHeader, NodeError> {
        let state = self.state();
        match tag {
            BlockTag::Latest => Ok(state.head()),
            BlockTag::Number(n) => usize::try_from(n)
                .ok()
                .and_then(|idx| state.blocks.get(idx).copied())
                .ok_or_else(|| NodeError::Decode(format!("block {tag} not found"))),
        }
    }

    async fn set_next_block_timestamp(&self, timestamp: u64) -> Result<(), NodeError> {
        let mut state = self.state();
        let latest = state.head().timestamp;
        if timestamp <= latest {
            return Err(NodeError::Rejected(format!(
                "timestamp {timestamp} is lower than or equal to previous block's timestamp {latest}"
            )));
        }
        state.pending_timestamp = Some(timestamp);
        Ok(())
    }

    async fn mine_block(&self) -> Result<BlockHeader, NodeError> {
        let mut state = self.state();
        let block = state.pending_block();
        let header = state.seal(block);
        tracing::debug!("[SIM] mined empty block #{} ts={}", header.number, header.timestamp);
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::abi::IVulnerableVault;
    use alloy::sol_types::SolCall;

    fn transfer(from: Address, to: Address, value: U256) -> TxRequest {
        TxRequest {
            from,
            to,
            data: Bytes::new(),
            value,
            gas_limit: 21_000,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_genesis_accounts_are_distinct_and_funded() {
        let chain = SimChain::new();
        let accounts = chain.accounts().await.expect("accounts");
        assert_eq!(accounts.len(), DEFAULT_ACCOUNT_COUNT);
        let mut unique = accounts.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), accounts.len());
        assert_eq!(
            chain.get_balance(accounts[3]).await.expect("balance"),
            ONE_ETHER * U256::from(DEFAULT_ACCOUNT_ETHER)
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_transfer_mines_one_block_and_charges_gas() {
        let chain = SimChain::new();
        let accounts = chain.accounts().await.expect("accounts");
        let before = chain.get_balance(accounts[0]).await.expect("balance");

        let hash = chain
            .send_transaction(transfer(accounts[0], accounts[1], ONE_ETHER))
            .await
            .expect("submitted");
        let receipt = chain
            .wait_for_receipt(hash, Duration::from_secs(1))
            .await
            .expect("mined");
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.gas_used, 21_000);

        let after = chain.get_balance(accounts[0]).await.expect("balance");
        let fee = U256::from(21_000u64 * GAS_PRICE_WEI);
        assert_eq!(before - after, ONE_ETHER + fee);
        let head = chain.get_block(BlockTag::Latest).await.expect("head");
        assert_eq!(head.timestamp, GENESIS_TIMESTAMP + 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_reverted_call_rolls_back_but_charges_fee() {
        let chain = SimChain::new();
        let accounts = chain.accounts().await.expect("accounts");
        let hash = chain
            .deploy_contract(DeployRequest {
                from: accounts[0],
                contract: ContractKind::VulnerableVault,
                constructor_args: Bytes::new(),
                gas_limit: 3_000_000,
            })
            .await
            .expect("deploy submitted");
        let vault = chain
            .wait_for_receipt(hash, Duration::from_secs(1))
            .await
            .expect("mined")
            .contract_address
            .expect("vault address");

        let before = chain.get_balance(accounts[1]).await.expect("balance");
        let hash = chain
            .send_transaction(TxRequest {
                from: accounts[1],
                to: vault,
                data: IVulnerableVault::withdrawCall {}.abi_encode().into(),
                value: U256::ZERO,
                gas_limit: 100_000,
            })
            .await
            .expect("submitted");
        let receipt = chain
            .wait_for_receipt(hash, Duration::from_secs(1))
            .await
            .expect("mined");
        assert!(!receipt.success);
        assert_eq!(receipt.revert_reason.as_deref(), Some("nothing to withdraw"));
        let after = chain.get_balance(accounts[1]).await.expect("balance");
        assert_eq!(
            before - after,
            U256::from(receipt.gas_used) * U256::from(GAS_PRICE_WEI)
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_next_timestamp_must_exceed_head() {
        let chain = SimChain::new();
        let err = chain
            .set_next_block_timestamp(GENESIS_TIMESTAMP)
            .await
            .expect_err("equal timestamp is rejected");
        assert!(matches!(err, NodeError::Rejected(_)));

        chain
            .set_next_block_timestamp(GENESIS_TIMESTAMP + 600)
            .await
            .expect("future timestamp accepted");
        let mined = chain.mine_block().await.expect("mined");
        assert_eq!(mined.timestamp, GENESIS_TIMESTAMP + 600);
        let next = chain.mine_block().await.expect("mined");
        assert_eq!(next.timestamp, GENESIS_TIMESTAMP + 601);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_underfunded_sender_is_rejected_before_execution() {
        let chain = SimChain::with_accounts(2, U256::from(1_000u64));
        let accounts = chain.accounts().await.expect("accounts");
        let err = chain
            .send_transaction(transfer(accounts[0], accounts[1], U256::from(1u64)))
            .await
            .expect_err("cannot cover gas");
        assert!(err.to_string().contains("insufficient funds"));
        let head = chain.get_block(BlockTag::Latest).await.expect("head");
        assert_eq!(head.number, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_stalled_confirmations_time_out() {
        let chain = SimChain::new();
        let accounts = chain.accounts().await.expect("accounts");
        chain.set_stall_confirmations(true);
        let hash = chain
            .send_transaction(transfer(accounts[0], accounts[1], U256::from(1u64)))
            .await
            .expect("submitted");
        let err = chain
            .wait_for_receipt(hash, Duration::from_millis(20))
            .await
            .expect_err("receipt withheld");
        assert!(matches!(err, NodeError::Timeout { .. }));
    }
}
