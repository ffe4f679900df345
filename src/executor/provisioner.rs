use crate::chain::ChainNode;
use crate::error::ProvisioningError;
use alloy::primitives::{Address, U256};
use tokio::sync::OnceCell;

/// An unlocked dev-node account acting under a scenario role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub label: String,
    pub address: Address,
}

/// Hands out distinct, funded node accounts.
///
/// The node's account list is read once and cached, so repeated provisioning in one
/// process always maps role `i` to the same address.
pub struct AccountProvisioner<'a> {
    node: &'a dyn ChainNode,
    min_balance: U256,
    accounts: OnceCell<Vec<Address>>,
}

impl<'a> AccountProvisioner<'a> {
    pub fn new(node: &'a dyn ChainNode, min_balance: U256) -> Self {
        Self {
            node,
            min_balance,
            accounts: OnceCell::new(),
        }
    }

    async fn accounts(&self) -> Result<&[Address], ProvisioningError> {
        let accounts = self
            .accounts
            .get_or_try_init(|| async {
                let listed = self.node.accounts().await.map_err(ProvisioningError::Node)?;
                tracing::debug!("[PROVISION] node exposes {} account(s)", listed.len());
                Ok::<_, ProvisioningError>(listed)
            })
            .await?;
        Ok(accounts.as_slice())
    }

    /// Bind `roles[i]` to the node's `i`-th account, checking each holds at least
    /// `max(min_balance, largest_step_value)`.
    pub async fn provision(
        &self,
        roles: &[&str],
        largest_step_value: U256,
    ) -> Result<Vec<Identity>, ProvisioningError> {
        let accounts = self.accounts().await?;
        if accounts.len() < roles.len() {
            return Err(ProvisioningError::InsufficientIdentities {
                requested: roles.len(),
                available: accounts.len(),
            });
        }

        let required = self.min_balance.max(largest_step_value);
        let mut identities = Vec::with_capacity(roles.len());
        for (role, address) in roles.iter().zip(accounts.iter().copied()) {
            let balance = self
                .node
                .get_balance(address)
                .await
                .map_err(ProvisioningError::Node)?;
            if balance < required {
                return Err(ProvisioningError::Underfunded {
                    address,
                    balance,
                    required,
                });
            }
            tracing::info!("[PROVISION] {role} -> {address:#x}");
            identities.push(Identity {
                label: (*role).to_string(),
                address,
            });
        }
        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::sim::SimChain;
    use crate::utils::constants::ONE_ETHER;

    #[tokio::test(flavor = "current_thread")]
    async fn test_provision_is_stable_across_calls() {
        let chain = SimChain::new();
        let provisioner = AccountProvisioner::new(&chain, ONE_ETHER);
        let first = provisioner
            .provision(&["owner", "attacker"], ONE_ETHER)
            .await
            .expect("two identities");
        let second = provisioner
            .provision(&["owner", "attacker"], ONE_ETHER)
            .await
            .expect("two identities");
        assert_eq!(first, second);
        assert_ne!(first[0].address, first[1].address);
        assert_eq!(first[1].label, "attacker");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_provision_rejects_short_roster() {
        let chain = SimChain::with_accounts(2, ONE_ETHER * U256::from(100u64));
        let provisioner = AccountProvisioner::new(&chain, ONE_ETHER);
        let err = provisioner
            .provision(&["owner", "attacker", "user1"], U256::ZERO)
            .await
            .expect_err("only two accounts");
        assert_eq!(
            err,
            ProvisioningError::InsufficientIdentities {
                requested: 3,
                available: 2
            }
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_provision_rejects_underfunded_identity() {
        let chain = SimChain::with_accounts(4, ONE_ETHER);
        let provisioner = AccountProvisioner::new(&chain, ONE_ETHER);
        let err = provisioner
            .provision(&["owner"], ONE_ETHER * U256::from(2u64))
            .await
            .expect_err("1 ether is below the largest step value");
        assert!(matches!(err, ProvisioningError::Underfunded { .. }));
    }
}
