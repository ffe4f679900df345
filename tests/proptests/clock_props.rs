use exploit_lab::chain::sim::SimChain;
use exploit_lab::chain::{BlockTag, ChainNode};
use exploit_lab::executor::{next_block_target, ChainClock};
use proptest::prelude::*;

const LATEST_MAX: u64 = u64::MAX / 4;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

proptest! {
    #[test]
    fn proptest_target_is_strictly_after_latest(
        latest in 0..LATEST_MAX,
        scheduled in proptest::option::of(0..LATEST_MAX),
        seconds in 0u64..1_000_000,
    ) {
        let target = next_block_target(latest, scheduled, seconds).expect("no overflow in range");
        prop_assert!(target > latest);
        prop_assert!(target >= latest + seconds);
    }

    #[test]
    fn proptest_offsets_compound(
        latest in 0..LATEST_MAX,
        first in 0u64..1_000_000,
        second in 0u64..1_000_000,
    ) {
        let once = next_block_target(latest, None, first).expect("first");
        let twice = next_block_target(latest, Some(once), second).expect("second");
        prop_assert_eq!(twice, once + second);
    }

    #[test]
    fn proptest_stale_schedule_is_ignored(
        latest in 1..LATEST_MAX,
        behind in 0u64..1_000,
        seconds in 0u64..1_000_000,
    ) {
        let stale = latest.saturating_sub(behind);
        prop_assert_eq!(
            next_block_target(latest, Some(stale), seconds),
            next_block_target(latest, None, seconds)
        );
    }

    #[test]
    fn proptest_mined_blocks_honour_advances(advances in proptest::collection::vec(0u64..3_600, 1..8)) {
        let rt = runtime();
        rt.block_on(async {
            let chain = SimChain::new();
            let mut clock = ChainClock::new(&chain);
            let mut previous = chain.get_block(BlockTag::Latest).await.expect("genesis");
            for seconds in advances {
                let target = clock.advance_time(seconds).await.expect("schedulable");
                let mined = clock.mine_block().await.expect("mined");
                assert_eq!(mined.timestamp, target);
                assert!(mined.timestamp > previous.timestamp);
                assert_eq!(mined.number, previous.number + 1);
                previous = mined;
            }
        });
    }
}
