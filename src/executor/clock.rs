use crate::chain::{BlockHeader, BlockTag, ChainNode};
use crate::error::ClockOrderingError;

/// Timestamp the next block must carry after advancing by `seconds`.
///
/// Offsets compound on an already scheduled target that has not been mined yet. The result
/// is always strictly greater than `latest`, including for `seconds == 0`.
pub fn next_block_target(
    latest: u64,
    scheduled: Option<u64>,
    seconds: u64,
) -> Result<u64, ClockOrderingError> {
    let overflow = ClockOrderingError::Overflow { latest, seconds };
    let base = match scheduled {
        Some(pending) if pending > latest => pending,
        _ => latest,
    };
    let target = base.checked_add(seconds).ok_or(overflow.clone())?;
    let floor = latest.checked_add(1).ok_or(overflow)?;
    Ok(target.max(floor))
}

/// Drives the node's notion of time. Always reads the head before computing a target.
pub struct ChainClock<'a> {
    node: &'a dyn ChainNode,
    scheduled: Option<u64>,
}

impl<'a> ChainClock<'a> {
    pub fn new(node: &'a dyn ChainNode) -> Self {
        Self {
            node,
            scheduled: None,
        }
    }

    /// Timestamp pinned for the next block, if one is pending.
    pub fn scheduled(&self) -> Option<u64> {
        self.scheduled
    }

    async fn latest(&self) -> Result<BlockHeader, ClockOrderingError> {
        self.node
            .get_block(BlockTag::Latest)
            .await
            .map_err(ClockOrderingError::Node)
    }

    /// Read the head, dropping a pinned target that an earlier transaction block already used.
    pub async fn sync_head(&mut self) -> Result<BlockHeader, ClockOrderingError> {
        let head = self.latest().await?;
        if let Some(pinned) = self.scheduled.filter(|pinned| head.timestamp >= *pinned) {
            tracing::debug!(
                "[CLOCK] pinned ts={pinned} already consumed by block #{}",
                head.number
            );
            self.scheduled = None;
        }
        Ok(head)
    }

    pub async fn advance_time(&mut self, seconds: u64) -> Result<u64, ClockOrderingError> {
        let head = self.sync_head().await?;
        let target = next_block_target(head.timestamp, self.scheduled, seconds)?;
        self.node
            .set_next_block_timestamp(target)
            .await
            .map_err(ClockOrderingError::Node)?;
        self.scheduled = Some(target);
        tracing::info!(
            "[CLOCK] +{seconds}s: next block after #{} (ts={}) pinned to ts={target}",
            head.number,
            head.timestamp
        );
        Ok(target)
    }

    /// Pin an absolute timestamp for the next block.
    pub async fn set_next_timestamp(&mut self, timestamp: u64) -> Result<(), ClockOrderingError> {
        let head = self.sync_head().await?;
        if timestamp <= head.timestamp {
            return Err(ClockOrderingError::NotIncreasing {
                requested: timestamp,
                latest: head.timestamp,
            });
        }
        self.node
            .set_next_block_timestamp(timestamp)
            .await
            .map_err(ClockOrderingError::Node)?;
        self.scheduled = Some(timestamp);
        Ok(())
    }

    pub async fn mine_block(&mut self) -> Result<BlockHeader, ClockOrderingError> {
        self.sync_head().await?;
        let mined = self
            .node
            .mine_block()
            .await
            .map_err(ClockOrderingError::Node)?;
        if let Some(scheduled) = self.scheduled.take() {
            if mined.timestamp < scheduled {
                return Err(ClockOrderingError::NotHonoured {
                    scheduled,
                    mined: mined.timestamp,
                });
            }
            if mined.timestamp != scheduled {
                tracing::warn!(
                    "[CLOCK] block #{} mined at ts={} instead of scheduled ts={scheduled}",
                    mined.number,
                    mined.timestamp
                );
            }
        }
        tracing::info!("[CLOCK] mined block #{} ts={}", mined.number, mined.timestamp);
        Ok(mined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::sim::{SimChain, GENESIS_TIMESTAMP};
    use crate::chain::TxRequest;
    use alloy::primitives::{Bytes, U256};
    use std::time::Duration;

    #[test]
    fn test_zero_advance_still_moves_forward() {
        assert_eq!(next_block_target(100, None, 0), Ok(101));
        assert_eq!(next_block_target(100, Some(100), 0), Ok(101));
        assert_eq!(next_block_target(100, Some(160), 0), Ok(160));
    }

    #[test]
    fn test_offsets_compound_on_pending_target() {
        assert_eq!(next_block_target(100, Some(160), 60), Ok(220));
        assert_eq!(next_block_target(100, Some(90), 60), Ok(160));
    }

    #[test]
    fn test_overflow_is_reported() {
        assert_eq!(
            next_block_target(u64::MAX - 1, None, 5),
            Err(ClockOrderingError::Overflow {
                latest: u64::MAX - 1,
                seconds: 5
            })
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_advance_then_mine_lands_on_target() {
        let chain = SimChain::new();
        let mut clock = ChainClock::new(&chain);
        clock.advance_time(60).await.expect("scheduled");
        let target = clock.advance_time(60).await.expect("compounded");
        assert_eq!(target, GENESIS_TIMESTAMP + 120);
        let mined = clock.mine_block().await.expect("mined");
        assert_eq!(mined.timestamp, GENESIS_TIMESTAMP + 120);
        assert_eq!(clock.scheduled(), None);

        let err = clock
            .set_next_timestamp(GENESIS_TIMESTAMP + 120)
            .await
            .expect_err("equal to head");
        assert!(matches!(err, ClockOrderingError::NotIncreasing { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_target_used_by_transaction_block_is_dropped() {
        let chain = SimChain::new();
        let accounts = chain.accounts().await.expect("accounts");
        let mut clock = ChainClock::new(&chain);
        let target = clock.advance_time(60).await.expect("scheduled");

        let hash = chain
            .send_transaction(TxRequest {
                from: accounts[0],
                to: accounts[1],
                data: Bytes::new(),
                value: U256::from(1u64),
                gas_limit: 21_000,
            })
            .await
            .expect("submitted");
        chain
            .wait_for_receipt(hash, Duration::from_secs(1))
            .await
            .expect("mined");

        let head = clock.sync_head().await.expect("head");
        assert_eq!(head.timestamp, target);
        assert_eq!(clock.scheduled(), None);

        let mined = clock.mine_block().await.expect("mined");
        assert_eq!(mined.timestamp, target + 1);
    }
}
