use crate::chain::{BlockHeader, BlockTag, ChainNode, DeployRequest, TxReceipt, TxRequest};
use crate::contracts::artifacts::ArtifactStore;
use crate::error::NodeError;
use crate::utils::config::LabConfig;
use crate::utils::hex::{parse_quantity, quantity};
use crate::utils::rpc::{classify_rpc_error, run_with_retry};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Block, BlockTransactionsKind, TransactionReceipt};
use alloy::transports::http::Http;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::time::{Duration, Instant};

pub type HttpProvider = RootProvider<Http<Client>>;

/// A Hardhat or Anvil dev node reached over HTTP JSON-RPC.
///
/// Transactions are sent with `eth_sendTransaction` from the node's unlocked accounts, so
/// the node signs, fills nonces and mines (automine) on its own.
pub struct RpcNode {
    provider: HttpProvider,
    url: String,
    artifacts: ArtifactStore,
    receipt_poll: Duration,
    read_retries: usize,
}

fn header_from_block(block: &Block) -> BlockHeader {
    BlockHeader {
        number: block.header.number,
        timestamp: block.header.timestamp,
    }
}

fn receipt_from_rpc(receipt: &TransactionReceipt) -> Result<TxReceipt, NodeError> {
    let block_number = receipt.block_number.ok_or_else(|| {
        NodeError::Decode(format!(
            "receipt for {:#x} has no block number",
            receipt.transaction_hash
        ))
    })?;
    let success = receipt.status();
    Ok(TxReceipt {
        tx_hash: receipt.transaction_hash,
        block_number,
        success,
        gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
        contract_address: receipt.contract_address,
        // Typed receipts carry no reason; Hardhat reports it on the send instead.
        revert_reason: (!success).then(|| "execution reverted".to_string()),
    })
}

impl RpcNode {
    pub fn connect(config: &LabConfig) -> Result<Self, NodeError> {
        let url = config
            .rpc_url
            .parse::<reqwest::Url>()
            .map_err(|e| NodeError::Transport(format!("invalid RPC url `{}`: {e}", config.rpc_url)))?;
        let provider = ProviderBuilder::new().on_http(url);
        let artifacts = ArtifactStore::new(config.artifacts_dir.clone());
        tracing::info!(
            "[RPC] {} (creation bytecode from {})",
            config.rpc_url,
            artifacts.root().display()
        );
        Ok(Self {
            provider,
            url: config.rpc_url.clone(),
            artifacts,
            receipt_poll: config.receipt_poll,
            read_retries: config.rpc_read_retries,
        })
    }

    async fn request<R>(&self, method: &'static str, params: Value) -> Result<R, NodeError>
    where
        R: serde::de::DeserializeOwned + Send + Sync + Unpin + std::fmt::Debug + 'static,
    {
        self.provider
            .raw_request::<_, R>(Cow::Borrowed(method), params)
            .await
            .map_err(|e| classify_rpc_error(&e.to_string()))
    }

    async fn read<R>(&self, method: &'static str, params: Value) -> Result<R, NodeError>
    where
        R: serde::de::DeserializeOwned + Send + Sync + Unpin + std::fmt::Debug + 'static,
    {
        run_with_retry(self.read_retries, method, || {
            let params = params.clone();
            async move { self.request::<R>(method, params).await }
        })
        .await
    }

    async fn submit(&self, tx: Value) -> Result<B256, NodeError> {
        let hash: B256 = self.request("eth_sendTransaction", json!([tx])).await?;
        tracing::debug!("[RPC] submitted {hash:#x}");
        Ok(hash)
    }
}

#[async_trait]
impl ChainNode for RpcNode {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn accounts(&self) -> Result<Vec<Address>, NodeError> {
        run_with_retry(self.read_retries, "eth_accounts", || async {
            self.provider
                .get_accounts()
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    async fn deploy_contract(&self, request: DeployRequest) -> Result<B256, NodeError> {
        let bytecode = self
            .artifacts
            .bytecode(request.contract)
            .map_err(|e| NodeError::Rejected(e.to_string()))?;
        let mut init_code = bytecode.to_vec();
        init_code.extend_from_slice(&request.constructor_args);
        self.submit(json!({
            "from": request.from,
            "data": Bytes::from(init_code),
            "gas": quantity(request.gas_limit),
        }))
        .await
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256, NodeError> {
        self.submit(json!({
            "from": request.from,
            "to": request.to,
            "data": request.data,
            "value": request.value,
            "gas": quantity(request.gas_limit),
        }))
        .await
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<TxReceipt, NodeError> {
        let started = Instant::now();
        loop {
            let receipt = run_with_retry(
                self.read_retries,
                "eth_getTransactionReceipt",
                move || async move {
                    self.provider
                        .get_transaction_receipt(tx_hash)
                        .await
                        .map_err(|e| classify_rpc_error(&e.to_string()))
                },
            )
            .await?;
            if let Some(receipt) = receipt {
                return receipt_from_rpc(&receipt);
            }
            if started.elapsed() >= timeout {
                return Err(NodeError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                    context: format!("receipt for {tx_hash:#x}"),
                });
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError> {
        self.read("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, NodeError> {
        let raw: String = self
            .read(
                "eth_estimateGas",
                json!([{
                    "from": request.from,
                    "to": request.to,
                    "data": request.data,
                    "value": request.value,
                }]),
            )
            .await?;
        parse_quantity(&raw).ok_or_else(|| NodeError::Decode(format!("gas estimate `{raw}`")))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, NodeError> {
        run_with_retry(self.read_retries, "eth_getBalance", move || async move {
            self.provider
                .get_balance(address)
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await
    }

    async fn get_block(&self, tag: BlockTag) -> Result<BlockHeader, NodeError> {
        let block = run_with_retry(self.read_retries, "eth_getBlockByNumber", move || async move {
            self.provider
                .get_block_by_number(tag.into(), BlockTransactionsKind::Hashes)
                .await
                .map_err(|e| classify_rpc_error(&e.to_string()))
        })
        .await?;
        block
            .as_ref()
            .map(header_from_block)
            .ok_or_else(|| NodeError::Decode(format!("block {tag} not found")))
    }

    async fn set_next_block_timestamp(&self, timestamp: u64) -> Result<(), NodeError> {
        let _: Value = self
            .request("evm_setNextBlockTimestamp", json!([timestamp]))
            .await?;
        Ok(())
    }

    async fn mine_block(&self) -> Result<BlockHeader, NodeError> {
        let _: Value = self.request("evm_mine", json!([])).await?;
        self.get_block(BlockTag::Latest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anvil_receipt(status: &str, contract_address: Value) -> TransactionReceipt {
        serde_json::from_value(json!({
            "type": "0x2",
            "status": status,
            "cumulativeGasUsed": "0x5208",
            "logs": [],
            "logsBloom": format!("0x{}", "0".repeat(512)),
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "transactionIndex": "0x0",
            "blockHash": format!("0x{}", "cd".repeat(32)),
            "blockNumber": "0x5",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "to": null,
            "contractAddress": contract_address,
        }))
        .expect("anvil receipt shape")
    }

    #[test]
    fn test_receipt_from_rpc_reads_status_and_contract_address() {
        let mined = anvil_receipt("0x1", json!("0x5fbdb2315678afecb367f032d93f642f64180aa3"));
        let receipt = receipt_from_rpc(&mined).expect("mined receipt");
        assert_eq!(receipt.tx_hash, B256::repeat_byte(0xab));
        assert_eq!(receipt.block_number, 5);
        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 21_000);
        assert!(receipt.contract_address.is_some());
        assert_eq!(receipt.revert_reason, None);

        let reverted = receipt_from_rpc(&anvil_receipt("0x0", Value::Null)).expect("receipt");
        assert!(!reverted.success);
        assert_eq!(reverted.contract_address, None);
        assert_eq!(reverted.revert_reason.as_deref(), Some("execution reverted"));
    }

    #[test]
    fn test_block_tags_map_to_rpc_tags() {
        assert_eq!(
            alloy::eips::BlockNumberOrTag::from(BlockTag::Number(42)),
            alloy::eips::BlockNumberOrTag::Number(42)
        );
        assert_eq!(
            alloy::eips::BlockNumberOrTag::from(BlockTag::Latest),
            alloy::eips::BlockNumberOrTag::Latest
        );
    }

    #[test]
    fn test_connect_rejects_unparseable_url() {
        let config = LabConfig {
            rpc_url: "not a url".to_string(),
            ..LabConfig::default()
        };
        assert!(matches!(
            RpcNode::connect(&config),
            Err(NodeError::Transport(_))
        ));
    }
}
