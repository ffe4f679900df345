use alloy::primitives::U256;

/// 1 ether in wei.
pub const ONE_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 0.1 ether in wei (lottery entry fee).
pub const TENTH_ETHER: U256 = U256::from_limbs([100_000_000_000_000_000, 0, 0, 0]);

/// Gas ceiling used by the lab scripts for attack transactions.
pub const DEFAULT_GAS_CEILING: u64 = 3_000_000;

/// Seconds a lottery round stays open before a prize can be claimed.
pub const LOTTERY_DRAW_DELAY_SECS: u64 = 60;

pub const MIN_TX_GAS: u64 = 21_000;
pub const MAX_TX_GAS: u64 = 30_000_000;

/// Default chain id of Hardhat/Anvil dev nodes.
pub const DEV_CHAIN_ID: u64 = 31_337;
