pub mod clock;
pub mod deployer;
pub mod provisioner;
pub mod session;

pub use clock::{next_block_target, ChainClock};
pub use deployer::{ContractDeployer, ContractHandle};
pub use provisioner::{AccountProvisioner, Identity};
pub use session::NodeSession;

use crate::chain::{ChainNode, TxReceipt, TxRequest};
use crate::error::NodeError;
use std::time::Duration;

/// Submit one transaction and suspend until it is mined or `timeout` elapses.
///
/// A mined-but-reverted transaction is returned as `Ok` with `success == false`; callers
/// decide whether that is a failure. Nothing here resubmits.
pub async fn submit_and_confirm(
    node: &dyn ChainNode,
    request: TxRequest,
    timeout: Duration,
) -> Result<TxReceipt, NodeError> {
    let tx_hash = node.send_transaction(request).await?;
    tracing::debug!("[RUNNER] awaiting receipt for {tx_hash:#x}");
    node.wait_for_receipt(tx_hash, timeout).await
}
