use crate::chain::{ChainNode, DeployRequest};
use crate::contracts::{encode_address_args, ContractKind};
use crate::error::{DeploymentError, NodeError};
use crate::executor::provisioner::Identity;
use alloy::primitives::{Address, B256};
use std::time::Duration;

/// A deployed contract bound to a scenario label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    pub label: String,
    pub kind: ContractKind,
    pub address: Address,
    /// Identity that sent the creation transaction.
    pub deployer: Address,
    pub deploy_tx: B256,
    pub block_number: u64,
}

pub struct ContractDeployer<'a> {
    node: &'a dyn ChainNode,
    tx_timeout: Duration,
    gas_limit: u64,
}

impl<'a> ContractDeployer<'a> {
    pub fn new(node: &'a dyn ChainNode, tx_timeout: Duration, gas_limit: u64) -> Self {
        Self {
            node,
            tx_timeout,
            gas_limit,
        }
    }

    /// Deploy `kind` from `deployer` and wait until the creation transaction is mined.
    ///
    /// Constructor dependencies (an attacker bound to its target) must already be deployed;
    /// the caller orders them.
    pub async fn deploy(
        &self,
        label: &str,
        kind: ContractKind,
        deployer: &Identity,
        constructor_args: &[Address],
    ) -> Result<ContractHandle, DeploymentError> {
        let contract = kind.to_string();
        if constructor_args.len() != kind.constructor_arity() {
            return Err(DeploymentError::ConstructorArity {
                contract,
                expected: kind.constructor_arity(),
                got: constructor_args.len(),
            });
        }

        let request = DeployRequest {
            from: deployer.address,
            contract: kind,
            constructor_args: encode_address_args(constructor_args),
            gas_limit: self.gas_limit,
        };
        let tx_hash = self
            .node
            .deploy_contract(request)
            .await
            .map_err(|e| match e {
                NodeError::Reverted { reason } => DeploymentError::Reverted {
                    contract: contract.clone(),
                    reason,
                },
                source => DeploymentError::Node {
                    contract: contract.clone(),
                    source,
                },
            })?;
        tracing::debug!("[DEPLOY] {label} ({kind}) submitted as {tx_hash:#x}");

        let receipt = self
            .node
            .wait_for_receipt(tx_hash, self.tx_timeout)
            .await
            .map_err(|e| match e {
                NodeError::Timeout { waited_ms, .. } => DeploymentError::Timeout {
                    contract: contract.clone(),
                    waited_ms,
                },
                source => DeploymentError::Node {
                    contract: contract.clone(),
                    source,
                },
            })?;
        if !receipt.success {
            return Err(DeploymentError::Reverted {
                contract,
                reason: receipt
                    .revert_reason
                    .unwrap_or_else(|| "constructor reverted".to_string()),
            });
        }
        let address = receipt
            .contract_address
            .ok_or(DeploymentError::MissingAddress {
                contract: contract.clone(),
            })?;

        tracing::info!(
            "[DEPLOY] {label} ({kind}) at {address:#x} by {} in block #{}",
            deployer.label,
            receipt.block_number
        );
        Ok(ContractHandle {
            label: label.to_string(),
            kind,
            address,
            deployer: deployer.address,
            deploy_tx: tx_hash,
            block_number: receipt.block_number,
        })
    }
}
