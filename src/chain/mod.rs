//! Node RPC surface consumed by the harness.
//!
//! [`ChainNode`] is the only way the harness touches chain state. Two backends exist:
//! [`rpc_node::RpcNode`] drives a Hardhat/Anvil dev node over HTTP, and
//! [`sim::SimChain`] is a deterministic in-process chain used by tests and `--sim` runs.

pub mod rpc_node;
pub mod sim;

use crate::contracts::ContractKind;
use crate::error::NodeError;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl From<BlockTag> for BlockNumberOrTag {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => BlockNumberOrTag::Latest,
            BlockTag::Number(n) => BlockNumberOrTag::Number(n),
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Number(n) => write!(f, "#{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub timestamp: u64,
}

/// A state-changing call from an unlocked dev-node account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub from: Address,
    pub contract: ContractKind,
    /// ABI-encoded constructor arguments, appended to the creation bytecode.
    pub constructor_args: Bytes,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
    /// Decoded revert reason when the node reports one.
    pub revert_reason: Option<String>,
}

#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Stable identity of the node's timeline; scenarios sharing it must not overlap.
    fn endpoint(&self) -> &str;

    async fn accounts(&self) -> Result<Vec<Address>, NodeError>;

    /// Submit a creation transaction. Returns the transaction hash.
    async fn deploy_contract(&self, request: DeployRequest) -> Result<B256, NodeError>;

    /// Submit a transaction. Returns the transaction hash.
    async fn send_transaction(&self, request: TxRequest) -> Result<B256, NodeError>;

    /// Block until the transaction is mined or `timeout` elapses.
    async fn wait_for_receipt(&self, tx_hash: B256, timeout: Duration)
        -> Result<TxReceipt, NodeError>;

    /// Read-only call against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError>;

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, NodeError>;

    async fn get_balance(&self, address: Address) -> Result<U256, NodeError>;

    async fn get_block(&self, tag: BlockTag) -> Result<BlockHeader, NodeError>;

    /// Pin the timestamp of the next mined block.
    async fn set_next_block_timestamp(&self, timestamp: u64) -> Result<(), NodeError>;

    /// Mine an empty block now and return its header.
    async fn mine_block(&self) -> Result<BlockHeader, NodeError>;
}
